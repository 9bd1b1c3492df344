use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION},
    Client,
};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::errors::PlaylistError;
use crate::models::{
    ApiErrorEnvelope, ListResponse, Page, Playlist, PlaylistItem, PlaylistItemPayload,
    PlaylistPayload,
};

pub const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";
pub const PLAYLISTS_PATH: &str = "/playlists";
pub const PLAYLIST_ITEMS_PATH: &str = "/playlistItems";
pub const PAGE_SIZE: u32 = 50;

pub const DEFAULT_HEADERS: [(&str, &str); 2] = [
    ("user-agent", "myti/0.1 (playlist exporter)"),
    ("accept", "application/json"),
];

/// Paginated listing contract the collector runs against.
#[async_trait]
pub trait PlaylistSource: Send + Sync {
    /// All playlists owned by the authenticated user. Implementations exhaust
    /// upstream pagination before returning.
    async fn fetch_playlists(&self) -> Result<Vec<Playlist>, PlaylistError>;

    async fn fetch_playlist_items(
        &self,
        playlist_id: &str,
        cursor: Option<&str>,
    ) -> Result<Page<PlaylistItem>, PlaylistError>;
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub timeout: Duration,
    pub access_token: Option<String>,
    pub extra_headers: HashMap<String, String>,
    pub base_url: Option<String>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            access_token: None,
            extra_headers: HashMap::new(),
            base_url: None,
        }
    }
}

#[derive(Clone)]
pub struct YoutubeClient {
    client: Client,
    base_url: String,
    options: ClientOptions,
}

impl YoutubeClient {
    pub fn new(options: ClientOptions) -> Result<Self, PlaylistError> {
        let mut headers = HeaderMap::new();
        for (name, value) in DEFAULT_HEADERS.iter() {
            headers.insert(
                HeaderName::from_static(name),
                HeaderValue::from_static(value),
            );
        }
        if let Some(token) = &options.access_token {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {token}"))
                    .map_err(|err| PlaylistError::Auth(format!("访问令牌格式无效: {err}")))?,
            );
        }
        for (key, value) in &options.extra_headers {
            let header_name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|err| PlaylistError::Config(format!("Header名无效: {err}")))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|err| PlaylistError::Config(format!("Header值无效: {err}")))?;
            headers.insert(header_name, header_value);
        }

        let client = Client::builder()
            .timeout(options.timeout)
            .default_headers(headers)
            .build()
            .map_err(PlaylistError::Request)?;

        let base_url = options.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        Url::parse(base_url)
            .map_err(|err| PlaylistError::Config(format!("接口地址无效: {err}")))?;
        let base_url = base_url.trim_end_matches('/').to_string();

        Ok(Self {
            client,
            base_url,
            options,
        })
    }

    pub async fn fetch_playlists_page(
        &self,
        cursor: Option<&str>,
    ) -> Result<Page<Playlist>, PlaylistError> {
        let mut params = vec![
            ("part", "snippet,contentDetails".to_string()),
            ("mine", "true".to_string()),
            ("maxResults", PAGE_SIZE.to_string()),
        ];
        if let Some(cursor) = cursor {
            params.push(("pageToken", cursor.to_string()));
        }
        let payload: ListResponse<PlaylistPayload> =
            self.request(PLAYLISTS_PATH, &params).await?;
        Ok(Page {
            total_results: payload.page_info.and_then(|info| info.total_results),
            next_cursor: payload.next_page_token.filter(|token| !token.is_empty()),
            items: payload
                .items
                .into_iter()
                .filter_map(PlaylistPayload::into_playlist)
                .collect(),
        })
    }

    async fn request<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, PlaylistError> {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.client.get(&url);
        for (k, v) in params {
            req = req.query(&[(k, v.as_str())]);
        }
        let response = req.send().await.map_err(PlaylistError::Request)?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(PlaylistError::Request)?;
        if !status.is_success() {
            let message = serde_json::from_slice::<ApiErrorEnvelope>(&bytes)
                .ok()
                .and_then(|envelope| envelope.error.message)
                .unwrap_or_else(|| status.to_string());
            return Err(PlaylistError::Api {
                status: status.as_u16(),
                message,
            });
        }
        serde_json::from_slice(&bytes).map_err(|err| PlaylistError::InvalidJson(err.to_string()))
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }
}

#[async_trait]
impl PlaylistSource for YoutubeClient {
    async fn fetch_playlists(&self) -> Result<Vec<Playlist>, PlaylistError> {
        let mut cursor: Option<String> = None;
        let mut playlists = Vec::new();
        loop {
            let page = self.fetch_playlists_page(cursor.as_deref()).await?;
            playlists.extend(page.items);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        debug!(count = playlists.len(), "fetched owned playlists");
        Ok(playlists)
    }

    async fn fetch_playlist_items(
        &self,
        playlist_id: &str,
        cursor: Option<&str>,
    ) -> Result<Page<PlaylistItem>, PlaylistError> {
        let mut params = vec![
            ("part", "snippet".to_string()),
            ("playlistId", playlist_id.to_string()),
            ("maxResults", PAGE_SIZE.to_string()),
        ];
        if let Some(cursor) = cursor {
            params.push(("pageToken", cursor.to_string()));
        }
        let payload: ListResponse<PlaylistItemPayload> =
            self.request(PLAYLIST_ITEMS_PATH, &params).await?;
        let items: Vec<PlaylistItem> = payload
            .items
            .into_iter()
            .filter_map(|item| item.into_item(playlist_id))
            .collect();
        debug!(playlist_id, count = items.len(), "fetched playlist page");
        Ok(Page {
            total_results: payload.page_info.and_then(|info| info.total_results),
            next_cursor: payload.next_page_token.filter(|token| !token.is_empty()),
            items,
        })
    }
}
