pub mod auth;
pub mod categories;
pub mod client;
pub mod collector;
pub mod config;
pub mod csv_utils;
pub mod errors;
pub mod export;
pub mod models;
pub mod video_index;

pub use auth::{AuthAcquirer, DeviceCode, OAuthClient, OAuthEndpoints, PersistedTokens, TokenData};
pub use categories::CategoriesRegistry;
pub use client::{ClientOptions, PlaylistSource, YoutubeClient, DEFAULT_HEADERS, PAGE_SIZE};
pub use collector::{
    event_channel, CollectEvent, EventReceiver, EventSender, PlaylistCollector, PlaylistOutcome,
    DEFAULT_CONCURRENCY,
};
pub use config::{Configuration, Conventions, PartialConfiguration};
pub use csv_utils::{escape_newlines, write_records, write_records_to_path, VideoRecord, FIELDNAMES};
pub use errors::{ExportError, PlaylistError};
pub use export::{
    collect_videos,
    dump_categories,
    dump_categories_blocking,
    export_playlists,
    export_playlists_blocking,
    CollectOptions,
    CollectResult,
    DumpResult,
    EventCallback,
    ExportOptions,
    ExportProgress,
    ExportResult,
    ExportTarget,
    ProgressCallback,
};
pub use models::{Category, Page, Playlist, PlaylistItem};
pub use video_index::{Video, VideoIndex};

pub use tokio_util::sync::CancellationToken;
