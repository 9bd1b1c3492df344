use std::fs;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use httpmock::prelude::*;
use playlist_core::auth::OAuthEndpoints;
use playlist_core::config::{AuthConfiguration, CategoriesConfiguration};
use playlist_core::{
    export_playlists, write_records_to_path, AuthAcquirer, CategoriesRegistry, Category,
    ClientOptions, Configuration, Conventions, DeviceCode, ExportOptions, ExportTarget,
    OAuthClient, PersistedTokens, PlaylistError, PlaylistSource, TokenData, VideoIndex,
    VideoRecord, YoutubeClient,
};
use serde_json::json;
use tempfile::tempdir;

type TestResult<T> = std::result::Result<T, Box<dyn std::error::Error>>;

fn client_for(server: &MockServer) -> Result<YoutubeClient, PlaylistError> {
    YoutubeClient::new(ClientOptions {
        access_token: Some("TOKEN".to_string()),
        base_url: Some(server.base_url()),
        ..ClientOptions::default()
    })
}

fn endpoints_for(server: &MockServer) -> OAuthEndpoints {
    OAuthEndpoints {
        device_code_url: server.url("/device/code"),
        token_url: server.url("/token"),
    }
}

fn saved_token() -> TokenData {
    TokenData {
        access_token: "ATOKEN_PERS".to_string(),
        refresh_token: Some("RTOKEN_PERS".to_string()),
        expires_in: Some(3599),
        scope: Some("scope".to_string()),
        token_type: Some("Bearer".to_string()),
    }
}

#[tokio::test]
async fn playlist_items_are_mapped_with_cursor() -> TestResult<()> {
    let server = MockServer::start_async().await;

    let first = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/playlistItems")
                .query_param("playlistId", "PL1")
                .query_param("part", "snippet")
                .query_param("maxResults", "50")
                .header("authorization", "Bearer TOKEN");
            then.status(200).json_body(json!({
                "nextPageToken": "NEXT",
                "pageInfo": { "totalResults": 3 },
                "items": [
                    {
                        "id": "item-1",
                        "snippet": {
                            "playlistId": "PL1",
                            "title": "First video",
                            "description": "line one\nline two",
                            "publishedAt": "2024-01-02T03:04:05Z",
                            "videoOwnerChannelTitle": "Channel",
                            "position": 0,
                            "resourceId": { "kind": "youtube#video", "videoId": "v1" }
                        }
                    },
                    { "id": "item-2", "snippet": { "playlistId": "PL1", "title": "Deleted video" } },
                    { "snippet": { "playlistId": "PL1", "resourceId": { "videoId": "v3" } } }
                ]
            }));
        })
        .await;

    let second = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/playlistItems")
                .query_param("playlistId", "PL2")
                .query_param("pageToken", "NEXT");
            then.status(200).json_body(json!({ "items": [] }));
        })
        .await;

    let client = client_for(&server)?;
    let page = client.fetch_playlist_items("PL1", None).await?;
    assert_eq!(page.next_cursor.as_deref(), Some("NEXT"));
    assert_eq!(page.total_results, Some(3));
    assert_eq!(page.items.len(), 2);

    let video = &page.items[0];
    assert_eq!(video.video_id, "v1");
    assert_eq!(video.kind.as_deref(), Some("youtube#video"));
    assert_eq!(video.channel_title.as_deref(), Some("Channel"));
    assert_eq!(video.position, Some(0));
    assert!(!page.items[1].has_video_id());

    let last = client.fetch_playlist_items("PL2", Some("NEXT")).await?;
    assert!(last.items.is_empty());
    assert_eq!(last.next_cursor, None);

    first.assert_async().await;
    second.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn owned_playlists_are_listed() -> TestResult<()> {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/playlists")
                .query_param("mine", "true")
                .query_param("maxResults", "50");
            then.status(200).json_body(json!({
                "items": [
                    { "id": "PL1", "snippet": { "title": "Music" }, "contentDetails": { "itemCount": 12 } },
                    { "snippet": { "title": "no id" } },
                    { "id": "PL2" }
                ]
            }));
        })
        .await;

    let playlists = client_for(&server)?.fetch_playlists().await?;
    assert_eq!(playlists.len(), 2);
    assert_eq!(playlists[0].title.as_deref(), Some("Music"));
    assert_eq!(playlists[0].item_count, Some(12));
    assert_eq!(playlists[1].title, None);
    mock.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn quota_errors_are_surfaced() -> TestResult<()> {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/playlistItems");
            then.status(403).json_body(json!({
                "error": { "code": 403, "message": "quotaExceeded" }
            }));
        })
        .await;

    let err = client_for(&server)?
        .fetch_playlist_items("PL1", None)
        .await
        .unwrap_err();
    match &err {
        PlaylistError::Api { status, message } => {
            assert_eq!(*status, 403);
            assert_eq!(message, "quotaExceeded");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.is_auth_or_quota());
    Ok(())
}

#[tokio::test]
async fn responses_without_items_yield_empty_pages() -> TestResult<()> {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/playlistItems");
            then.status(200)
                .json_body(json!({ "pageInfo": { "totalResults": 0 } }));
        })
        .await;

    let page = client_for(&server)?
        .fetch_playlist_items("PL1", None)
        .await?;
    assert!(page.items.is_empty());
    assert_eq!(page.next_cursor, None);
    assert_eq!(page.total_results, Some(0));
    Ok(())
}

#[test]
fn invalid_base_url_is_rejected() {
    let result = YoutubeClient::new(ClientOptions {
        base_url: Some("not a url".to_string()),
        ..ClientOptions::default()
    });
    assert!(matches!(result, Err(PlaylistError::Config(_))));
}

#[test]
fn write_csv_with_gbk_encoding() -> TestResult<()> {
    let dir = tempdir()?;
    let csv_path = dir.path().join("out").join("videos.csv");
    let mut index = VideoIndex::new();
    index.add_item(&playlist_core::PlaylistItem {
        title: Some("测试标题".to_string()),
        description: Some("第一行\n第二行".to_string()),
        ..playlist_core::PlaylistItem::new("PL1", "v1")
    });
    index.add_item(&playlist_core::PlaylistItem::new("PL2", "v1"));

    let mut registry = CategoriesRegistry::new();
    registry.add_categories(vec![Category::playlist("PL1", "音乐", true)])?;
    let records: Vec<VideoRecord> = index
        .iter()
        .map(|video| VideoRecord::from_video(video, Some(&registry)))
        .collect();

    write_records_to_path(&csv_path, "gbk", &records)?;

    let bytes = fs::read(&csv_path)?;
    let (content, _, had_errors) = encoding_rs::GBK.decode(&bytes);
    assert!(!had_errors);
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines[0], "video_id,playlist_ids,title,channel_title,description");
    assert_eq!(lines[1], "v1,音乐:PL2,测试标题,,第一行\\n第二行");
    Ok(())
}

#[test]
fn categories_file_round_trip() -> TestResult<()> {
    let dir = tempdir()?;
    let path = dir.path().join("categories.config.json");

    let mut missing = CategoriesRegistry::new();
    missing.add_categories_from_file(&path)?;
    assert!(missing.is_empty());

    let mut registry = CategoriesRegistry::new();
    registry.add_categories(vec![
        Category::playlist("PL1", "Music", true),
        Category::playlist("PL2", "Talks", false),
    ])?;
    registry.write_to_file(&path)?;

    let mut loaded = CategoriesRegistry::new();
    loaded.add_categories_from_file(&path)?;
    assert_eq!(loaded.to_categories(), registry.to_categories());
    assert_eq!(loaded.syncable_playlist_ids(), vec!["PL1"]);

    fs::write(&path, r#"[{"id":"PL3","type":"playlist","syncable":true}]"#)?;
    let err = CategoriesRegistry::new()
        .add_categories_from_file(&path)
        .unwrap_err();
    assert!(matches!(err, PlaylistError::InvalidCategory(_)));
    Ok(())
}

#[tokio::test]
async fn saved_token_is_refreshed_and_persisted() -> TestResult<()> {
    let server = MockServer::start_async().await;
    let refresh = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/token")
                .body_contains("grant_type=refresh_token")
                .body_contains("refresh_token=RTOKEN_PERS");
            then.status(200).json_body(json!({
                "access_token": "new_access_token",
                "expires_in": 3600,
                "token_type": "Bearer"
            }));
        })
        .await;

    let dir = tempdir()?;
    let token_file = dir.path().join("OAUTH.json");
    fs::write(&token_file, serde_json::to_string(&saved_token())?)?;

    let oauth = OAuthClient::new("id", "secret", Duration::from_secs(5))?
        .with_endpoints(endpoints_for(&server));
    let mut acquirer = AuthAcquirer::new(oauth, PersistedTokens::load(&token_file)?);
    let token = acquirer.acquire().await?;

    assert_eq!(token.access_token, "new_access_token");
    assert_eq!(token.refresh_token.as_deref(), Some("RTOKEN_PERS"));
    let stored = PersistedTokens::load(&token_file)?;
    assert_eq!(stored.token_data(), Some(&token));
    refresh.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn device_flow_runs_without_saved_token() -> TestResult<()> {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/device/code");
            then.status(200).json_body(json!({
                "device_code": "DEVICE",
                "user_code": "123456",
                "verification_url": "http://example.com",
                "expires_in": 600,
                "interval": 0
            }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/token")
                .body_contains("device_code=DEVICE");
            then.status(200).json_body(json!({
                "access_token": "ATOKEN_REQ",
                "refresh_token": "RTOKEN_REQ",
                "expires_in": 3600,
                "scope": "scope",
                "token_type": "Bearer"
            }));
        })
        .await;

    let dir = tempdir()?;
    let token_file = dir.path().join("state").join("OAUTH.json");
    let prompted: Arc<Mutex<Vec<DeviceCode>>> = Arc::default();
    let sink = Arc::clone(&prompted);

    let oauth = OAuthClient::new("id", "secret", Duration::from_secs(5))?
        .with_endpoints(endpoints_for(&server));
    let mut acquirer = AuthAcquirer::new(oauth, PersistedTokens::load(&token_file)?)
        .with_prompt(Arc::new(move |code: &DeviceCode| {
            sink.lock().unwrap().push(code.clone());
        }));
    let token = acquirer.acquire().await?;

    assert_eq!(token.access_token, "ATOKEN_REQ");
    assert_eq!(prompted.lock().unwrap()[0].user_code, "123456");
    assert!(PersistedTokens::load(&token_file)?.exists());
    Ok(())
}

#[tokio::test]
async fn export_writes_deduplicated_videos() -> TestResult<()> {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/token");
            then.status(200).json_body(json!({
                "access_token": "TOKEN",
                "expires_in": 3600
            }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/playlists")
                .header("authorization", "Bearer TOKEN");
            then.status(200).json_body(json!({
                "items": [
                    { "id": "P1", "snippet": { "title": "First" } },
                    { "id": "P2", "snippet": { "title": "Second" } }
                ]
            }));
        })
        .await;
    for (playlist, videos) in [("P1", ["v1", "v2"]), ("P2", ["v2", "v3"])] {
        let items: Vec<_> = videos
            .iter()
            .enumerate()
            .map(|(position, video)| {
                json!({
                    "id": format!("{playlist}-{video}"),
                    "snippet": {
                        "playlistId": playlist,
                        "title": format!("title {video}"),
                        "position": position,
                        "resourceId": { "videoId": video }
                    }
                })
            })
            .collect();
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/playlistItems")
                    .query_param("playlistId", playlist);
                then.status(200).json_body(json!({ "items": items }));
            })
            .await;
    }

    let dir = tempdir()?;
    let token_file = dir.path().join("OAUTH.json");
    fs::write(&token_file, serde_json::to_string(&saved_token())?)?;
    let categories_file = dir.path().join("categories.config.json");
    let output = dir.path().join("myti.csv");

    let configuration = Configuration {
        auth: AuthConfiguration {
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            token_file,
        },
        categories: CategoriesConfiguration {
            file: categories_file,
        },
        conventions: Conventions::default(),
    };
    let mut options = ExportOptions::new(configuration, ExportTarget::File(output.clone()));
    options.base_url = Some(server.base_url());
    options.oauth_endpoints = Some(endpoints_for(&server));
    options.concurrency = 2;

    let result = export_playlists(options).await?;
    assert_eq!(result.video_count, 3);
    assert_eq!(result.processed_count, 4);
    assert!(!result.cancelled);

    let content = fs::read_to_string(&output)?;
    let v2_row = content
        .lines()
        .find(|line| line.starts_with("v2,"))
        .ok_or("missing v2 row")?;
    assert!(v2_row.starts_with("v2,P1:P2,") || v2_row.starts_with("v2,P2:P1,"));
    assert_eq!(content.lines().count(), 4);
    Ok(())
}
