use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::categories::CategoriesRegistry;
use crate::client::PlaylistSource;
use crate::errors::PlaylistError;
use crate::models::PlaylistItem;

pub const DEFAULT_CONCURRENCY: usize = 5;

/// Notifications published while playlists are traversed. Within one playlist
/// items arrive in page order; across playlists events interleave.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectEvent {
    PlaylistsStart,
    PlaylistStart(String),
    PageStart(String),
    Item(PlaylistItem),
    PlaylistComplete(String),
    PlaylistAbort(String),
    PlaylistsComplete,
}

struct Delivery {
    event: CollectEvent,
    handled: oneshot::Sender<()>,
}

/// Producer half of an event channel. A send completes only once the receiver
/// has finished with the event, so state changed while handling it (such as a
/// cancelled token) is visible to the producer's next check.
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::Sender<Delivery>,
}

impl EventSender {
    /// Returns `false` when the receiver is gone.
    pub async fn send(&self, event: CollectEvent) -> bool {
        let (handled, done) = oneshot::channel();
        if self.tx.send(Delivery { event, handled }).await.is_err() {
            return false;
        }
        // An error here means the receiver was dropped mid-handling.
        done.await.is_ok()
    }
}

pub struct EventReceiver {
    rx: mpsc::Receiver<Delivery>,
    in_hand: Option<oneshot::Sender<()>>,
}

impl EventReceiver {
    /// Marks the previously returned event as handled and waits for the next
    /// one. Yields `None` once every sender is dropped.
    pub async fn recv(&mut self) -> Option<CollectEvent> {
        self.release();
        let delivery = self.rx.recv().await?;
        self.in_hand = Some(delivery.handled);
        Some(delivery.event)
    }

    fn release(&mut self) {
        if let Some(handled) = self.in_hand.take() {
            let _ = handled.send(());
        }
    }
}

pub fn event_channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::channel(1);
    (EventSender { tx }, EventReceiver { rx, in_hand: None })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaylistOutcome {
    Completed { items: usize },
    Aborted { items: usize },
    /// Admitted after cancellation; nothing was fetched or emitted.
    Skipped,
}

pub struct PlaylistCollector<S> {
    source: Arc<S>,
    concurrency: usize,
}

impl<S> PlaylistCollector<S>
where
    S: PlaylistSource + 'static,
{
    pub fn new(source: S) -> Self {
        Self::with_concurrency(source, DEFAULT_CONCURRENCY)
    }

    pub fn with_concurrency(source: S, concurrency: usize) -> Self {
        Self::from_shared(Arc::new(source), concurrency)
    }

    pub fn from_shared(source: Arc<S>, concurrency: usize) -> Self {
        Self {
            source,
            concurrency: concurrency.max(1),
        }
    }

    pub fn source(&self) -> &S {
        self.source.as_ref()
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Walks every page of one playlist. Cancellation is checked before each
    /// page fetch and before each item; a fetch already issued is not undone.
    /// The receiver must be drained concurrently, since every emission waits
    /// for it.
    pub async fn process_playlist_items_for(
        &self,
        playlist_id: &str,
        cancel: &CancellationToken,
        events: &EventSender,
    ) -> Result<PlaylistOutcome, PlaylistError> {
        traverse_playlist(self.source.as_ref(), playlist_id, cancel, events).await
    }

    /// Fetches the owned playlists, registers unseen ones, then traverses
    /// every syncable playlist. `PlaylistsStart` precedes the listing call.
    pub async fn process_playlist_items(
        &self,
        registry: &mut CategoriesRegistry,
        cancel: CancellationToken,
        events: EventSender,
    ) -> Result<(), PlaylistError> {
        emit(&events, CollectEvent::PlaylistsStart).await;
        let playlists = self.source.fetch_playlists().await?;
        let added = registry.add_playlists_as_new_categories(&playlists);
        debug!(
            discovered = playlists.len(),
            added, "merged owned playlists into categories"
        );
        let ids = registry.syncable_playlist_ids();
        self.run_playlists(ids, cancel, events).await
    }

    /// Traverses the given playlists with at most `concurrency` of them active
    /// at once and resolves after every task has settled.
    ///
    /// The first failing task cancels its siblings cooperatively; its error is
    /// returned once they have all stopped. The caller's token is never
    /// cancelled by this method.
    pub async fn process_playlists(
        &self,
        playlist_ids: Vec<String>,
        cancel: CancellationToken,
        events: EventSender,
    ) -> Result<(), PlaylistError> {
        emit(&events, CollectEvent::PlaylistsStart).await;
        self.run_playlists(playlist_ids, cancel, events).await
    }

    async fn run_playlists(
        &self,
        playlist_ids: Vec<String>,
        cancel: CancellationToken,
        events: EventSender,
    ) -> Result<(), PlaylistError> {
        info!(
            playlists = playlist_ids.len(),
            concurrency = self.concurrency,
            "collecting playlist items"
        );

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let batch = cancel.child_token();
        let mut join_set: JoinSet<Result<PlaylistOutcome, PlaylistError>> = JoinSet::new();

        for playlist_id in playlist_ids {
            let source = Arc::clone(&self.source);
            let semaphore = Arc::clone(&semaphore);
            let batch = batch.clone();
            let events = events.clone();

            join_set.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|_| PlaylistError::Other("并发限制器已关闭".to_string()))?;
                if batch.is_cancelled() {
                    trace!(
                        playlist_id = %playlist_id,
                        "skipping playlist admitted after cancellation"
                    );
                    return Ok(PlaylistOutcome::Skipped);
                }
                let result =
                    traverse_playlist(source.as_ref(), &playlist_id, &batch, &events).await;
                if let Err(err) = &result {
                    warn!(
                        playlist_id = %playlist_id,
                        error = %err,
                        auth_or_quota = err.is_auth_or_quota(),
                        "playlist traversal failed"
                    );
                    batch.cancel();
                }
                result
            });
        }

        let mut first_error: Option<PlaylistError> = None;
        while let Some(joined) = join_set.join_next().await {
            let result = joined.unwrap_or_else(|join_err| {
                batch.cancel();
                Err(PlaylistError::Other(format!("播放列表任务异常退出: {join_err}")))
            });
            if let Err(err) = result {
                first_error.get_or_insert(err);
            }
        }

        if let Some(err) = first_error {
            return Err(err);
        }
        emit(&events, CollectEvent::PlaylistsComplete).await;
        Ok(())
    }
}

async fn traverse_playlist<S>(
    source: &S,
    playlist_id: &str,
    cancel: &CancellationToken,
    events: &EventSender,
) -> Result<PlaylistOutcome, PlaylistError>
where
    S: PlaylistSource + ?Sized,
{
    emit(events, CollectEvent::PlaylistStart(playlist_id.to_string())).await;

    let mut cursor: Option<String> = None;
    let mut emitted = 0usize;
    loop {
        if cancel.is_cancelled() {
            info!(playlist_id, items = emitted, "playlist aborted");
            emit(events, CollectEvent::PlaylistAbort(playlist_id.to_string())).await;
            return Ok(PlaylistOutcome::Aborted { items: emitted });
        }

        emit(events, CollectEvent::PageStart(playlist_id.to_string())).await;
        let page = source
            .fetch_playlist_items(playlist_id, cursor.as_deref())
            .await?;

        for item in page.items {
            if cancel.is_cancelled() {
                break;
            }
            if !item.has_video_id() {
                trace!(playlist_id, "skipping item without video id");
                continue;
            }
            emit(events, CollectEvent::Item(item)).await;
            emitted += 1;
        }

        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    info!(playlist_id, items = emitted, "playlist complete");
    emit(events, CollectEvent::PlaylistComplete(playlist_id.to_string())).await;
    Ok(PlaylistOutcome::Completed { items: emitted })
}

async fn emit(events: &EventSender, event: CollectEvent) {
    if !events.send(event).await {
        trace!("event receiver dropped");
    }
}
