use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::runtime::Builder;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::auth::{AuthAcquirer, DevicePromptCallback, OAuthClient, OAuthEndpoints, PersistedTokens};
use crate::categories::CategoriesRegistry;
use crate::client::{ClientOptions, PlaylistSource, YoutubeClient};
use crate::collector::{
    event_channel, CollectEvent, EventReceiver, PlaylistCollector, DEFAULT_CONCURRENCY,
};
use crate::config::Configuration;
use crate::csv_utils::{write_records, write_records_to_path, VideoRecord};
use crate::errors::{ExportError, PlaylistError};
use crate::video_index::VideoIndex;

#[derive(Debug, Clone)]
pub struct ExportProgress {
    pub current: u64,
    pub total: Option<u64>,
}

pub type ProgressCallback = Arc<dyn Fn(ExportProgress) + Send + Sync + 'static>;
pub type EventCallback = Arc<dyn Fn(&CollectEvent) + Send + Sync + 'static>;

#[derive(Clone, Default)]
pub struct CollectOptions {
    /// Stop after this many items; 0 means no limit.
    pub max_items: u64,
    pub progress_callback: Option<ProgressCallback>,
    pub event_callback: Option<EventCallback>,
}

#[derive(Debug, Clone)]
pub struct CollectResult {
    pub index: VideoIndex,
    pub processed_count: u64,
    pub cancelled: bool,
    pub elapsed: Duration,
}

/// Runs the collector and folds its items into a [`VideoIndex`]. This task is
/// the only writer of the index; it cancels the run once `max_items` items
/// have been taken.
pub async fn collect_videos<S>(
    collector: &PlaylistCollector<S>,
    registry: &mut CategoriesRegistry,
    options: &CollectOptions,
) -> Result<CollectResult, PlaylistError>
where
    S: PlaylistSource + 'static,
{
    let started = Instant::now();
    let cancel = CancellationToken::new();
    let (events, receiver) = event_channel();

    let producer = collector.process_playlist_items(registry, cancel.clone(), events);
    let consumer = consume_events(receiver, &cancel, options);
    let (produced, (index, processed_count)) = tokio::join!(producer, consumer);
    produced?;

    let elapsed = started.elapsed();
    info!(
        videos = index.len(),
        processed = processed_count,
        elapsed_ms = elapsed.as_millis() as u64,
        "collection finished"
    );
    Ok(CollectResult {
        index,
        processed_count,
        cancelled: cancel.is_cancelled(),
        elapsed,
    })
}

async fn consume_events(
    mut receiver: EventReceiver,
    cancel: &CancellationToken,
    options: &CollectOptions,
) -> (VideoIndex, u64) {
    let mut index = VideoIndex::new();
    let mut processed: u64 = 0;
    let limit = (options.max_items > 0).then_some(options.max_items);

    while let Some(event) = receiver.recv().await {
        if let Some(callback) = options.event_callback.as_ref() {
            callback(&event);
        }
        let CollectEvent::Item(item) = event else {
            continue;
        };
        if limit.is_some_and(|max| processed >= max) {
            cancel.cancel();
            continue;
        }
        index.add_item(&item);
        processed += 1;
        if let Some(callback) = options.progress_callback.as_ref() {
            callback(ExportProgress {
                current: processed,
                total: limit,
            });
        }
        if limit.is_some_and(|max| processed >= max) {
            cancel.cancel();
        }
    }
    (index, processed)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportTarget {
    File(PathBuf),
    Stdout,
}

#[derive(Clone)]
pub struct ExportOptions {
    pub configuration: Configuration,
    pub target: ExportTarget,
    pub encoding: String,
    pub max_items: u64,
    pub concurrency: usize,
    pub timeout_secs: u64,
    pub resolve_labels: bool,
    pub base_url: Option<String>,
    pub oauth_endpoints: Option<OAuthEndpoints>,
    pub progress_callback: Option<ProgressCallback>,
    pub event_callback: Option<EventCallback>,
    pub device_prompt: Option<DevicePromptCallback>,
}

impl ExportOptions {
    pub fn new(configuration: Configuration, target: ExportTarget) -> Self {
        Self {
            configuration,
            target,
            encoding: "utf-8".to_string(),
            max_items: 0,
            concurrency: DEFAULT_CONCURRENCY,
            timeout_secs: 30,
            resolve_labels: false,
            base_url: None,
            oauth_endpoints: None,
            progress_callback: None,
            event_callback: None,
            device_prompt: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExportResult {
    pub target: ExportTarget,
    pub video_count: usize,
    pub processed_count: u64,
    pub cancelled: bool,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct DumpResult {
    pub path: PathBuf,
    pub added: usize,
    pub total: usize,
}

pub async fn export_playlists(options: ExportOptions) -> Result<ExportResult, ExportError> {
    let client = connect(&options).await?;
    let mut registry = load_registry(&options.configuration)?;
    let collector = PlaylistCollector::with_concurrency(client, options.concurrency);

    let collect_options = CollectOptions {
        max_items: options.max_items,
        progress_callback: options.progress_callback.clone(),
        event_callback: options.event_callback.clone(),
    };
    let collected = collect_videos(&collector, &mut registry, &collect_options)
        .await
        .map_err(|err| ExportError::from(err).context("抓取播放列表失败"))?;

    let labels = options.resolve_labels.then_some(&registry);
    let records: Vec<VideoRecord> = collected
        .index
        .iter()
        .map(|video| VideoRecord::from_video(video, labels))
        .collect();

    match &options.target {
        ExportTarget::File(path) => {
            write_records_to_path(path, &options.encoding, &records)?;
        }
        ExportTarget::Stdout => {
            let stdout = io::stdout();
            let mut lock = stdout.lock();
            write_records(&mut lock, &options.encoding, &records)?;
        }
    }

    Ok(ExportResult {
        target: options.target,
        video_count: collected.index.len(),
        processed_count: collected.processed_count,
        cancelled: collected.cancelled,
        elapsed: collected.elapsed,
    })
}

pub fn export_playlists_blocking(options: ExportOptions) -> Result<ExportResult, ExportError> {
    block_on(export_playlists(options))
}

/// Merges the user's playlists into the category file and writes it back.
pub async fn dump_categories(options: ExportOptions) -> Result<DumpResult, ExportError> {
    let client = connect(&options).await?;
    let mut registry = load_registry(&options.configuration)?;
    let playlists = client.fetch_playlists().await?;
    let added = registry.add_playlists_as_new_categories(&playlists);
    let path = options.configuration.categories.file.clone();
    registry.write_to_file(&path)?;
    Ok(DumpResult {
        path,
        added,
        total: registry.len(),
    })
}

pub fn dump_categories_blocking(options: ExportOptions) -> Result<DumpResult, ExportError> {
    block_on(dump_categories(options))
}

async fn connect(options: &ExportOptions) -> Result<YoutubeClient, ExportError> {
    let auth = &options.configuration.auth;
    let timeout = Duration::from_secs(options.timeout_secs);
    let mut oauth = OAuthClient::new(&auth.client_id, &auth.client_secret, timeout)?;
    if let Some(endpoints) = options.oauth_endpoints.clone() {
        oauth = oauth.with_endpoints(endpoints);
    }
    let persisted = PersistedTokens::load(&auth.token_file)?;
    let mut acquirer = AuthAcquirer::new(oauth, persisted);
    if let Some(prompt) = options.device_prompt.clone() {
        acquirer = acquirer.with_prompt(prompt);
    }
    let token = acquirer
        .acquire()
        .await
        .map_err(|err| ExportError::from(err).context("获取访问令牌失败"))?;

    let client = YoutubeClient::new(ClientOptions {
        timeout,
        access_token: Some(token.access_token),
        extra_headers: Default::default(),
        base_url: options.base_url.clone(),
    })?;
    Ok(client)
}

fn load_registry(configuration: &Configuration) -> Result<CategoriesRegistry, ExportError> {
    let mut registry = CategoriesRegistry::new();
    registry
        .add_categories_from_file(&configuration.categories.file)
        .map_err(|err| ExportError::from(err).context("加载分类文件失败"))?;
    Ok(registry)
}

fn block_on<F, T>(future: F) -> Result<T, ExportError>
where
    F: std::future::Future<Output = Result<T, ExportError>>,
{
    let rt = Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| PlaylistError::Other(format!("Tokio运行时初始化失败: {err}")))?;
    rt.block_on(future)
}
