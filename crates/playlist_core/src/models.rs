use serde::{Deserialize, Serialize};

pub const CATEGORY_TYPE_PLAYLIST: &str = "playlist";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Playlist {
    pub id: String,
    pub title: Option<String>,
    pub item_count: Option<u64>,
}

/// One entry of a playlist page. An empty `video_id` marks an upstream record
/// without a video reference; the collector skips those.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlaylistItem {
    pub playlist_id: String,
    pub video_id: String,
    pub kind: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub published_at: Option<String>,
    pub channel_title: Option<String>,
    pub position: Option<u32>,
}

impl PlaylistItem {
    pub fn new(playlist_id: impl Into<String>, video_id: impl Into<String>) -> Self {
        Self {
            playlist_id: playlist_id.into(),
            video_id: video_id.into(),
            ..Self::default()
        }
    }

    pub fn has_video_id(&self) -> bool {
        !self.video_id.trim().is_empty()
    }
}

/// A single page returned by the listing API. `next_cursor` is `None` on the
/// last page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
    pub total_results: Option<u64>,
}

impl<T> Page<T> {
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_cursor: None,
            total_results: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Category {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub syncable: bool,
}

impl Category {
    pub fn playlist(id: impl Into<String>, label: impl Into<String>, syncable: bool) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            kind: CATEGORY_TYPE_PLAYLIST.to_string(),
            syncable,
        }
    }

    pub fn is_syncable_playlist(&self) -> bool {
        self.kind == CATEGORY_TYPE_PLAYLIST && self.syncable
    }
}

/// Category record as read from disk, before required fields are checked.
#[derive(Debug, Clone, Deserialize)]
pub struct RawCategory {
    pub id: Option<String>,
    pub label: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub syncable: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    pub next_page_token: Option<String>,
    pub page_info: Option<PageInfo>,
    pub etag: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub total_results: Option<u64>,
    pub results_per_page: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorEnvelope {
    pub error: ApiErrorBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    pub code: Option<u16>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistPayload {
    pub id: Option<String>,
    pub snippet: Option<PlaylistSnippet>,
    pub content_details: Option<PlaylistContentDetails>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistSnippet {
    pub title: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistContentDetails {
    pub item_count: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistItemPayload {
    pub id: Option<String>,
    pub snippet: Option<PlaylistItemSnippet>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistItemSnippet {
    pub playlist_id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub published_at: Option<String>,
    pub video_owner_channel_title: Option<String>,
    pub position: Option<u32>,
    pub resource_id: Option<ResourceId>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceId {
    pub kind: Option<String>,
    pub video_id: Option<String>,
}

impl PlaylistPayload {
    pub fn into_playlist(self) -> Option<Playlist> {
        let id = self.id.filter(|id| !id.trim().is_empty())?;
        Some(Playlist {
            id,
            title: self.snippet.and_then(|snippet| snippet.title),
            item_count: self.content_details.and_then(|details| details.item_count),
        })
    }
}

impl PlaylistItemPayload {
    /// Records without an id are dropped. A missing playlist id falls back to
    /// the playlist that was requested.
    pub fn into_item(self, requested_playlist_id: &str) -> Option<PlaylistItem> {
        self.id.as_ref().filter(|id| !id.trim().is_empty())?;
        let snippet = self.snippet?;
        let (kind, video_id) = match snippet.resource_id {
            Some(resource) => (resource.kind, resource.video_id.unwrap_or_default()),
            None => (None, String::new()),
        };
        Some(PlaylistItem {
            playlist_id: snippet
                .playlist_id
                .unwrap_or_else(|| requested_playlist_id.to_string()),
            video_id,
            kind,
            title: snippet.title,
            description: snippet.description,
            published_at: snippet.published_at,
            channel_title: snippet.video_owner_channel_title,
            position: snippet.position,
        })
    }
}
