use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::PlaylistError;

pub const DEVICE_CODE_URL: &str = "https://oauth2.googleapis.com/device/code";
pub const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const READONLY_SCOPE: &str = "https://www.googleapis.com/auth/youtube.readonly";

const DEVICE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";
const SLOW_DOWN_STEP_SECS: u64 = 5;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenData {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl TokenData {
    /// Combines a refresh response with the saved token: the fresh access token
    /// wins, the saved refresh token is kept when the response omits one.
    pub fn merged_with_saved(self, saved: &TokenData) -> TokenData {
        TokenData {
            refresh_token: self.refresh_token.or_else(|| saved.refresh_token.clone()),
            scope: self.scope.or_else(|| saved.scope.clone()),
            token_type: self.token_type.or_else(|| saved.token_type.clone()),
            ..self
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct DeviceCode {
    pub device_code: String,
    pub user_code: String,
    #[serde(alias = "verification_uri")]
    pub verification_url: String,
    pub expires_in: u64,
    #[serde(default = "default_interval")]
    pub interval: u64,
}

fn default_interval() -> u64 {
    5
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TokenResponse {
    Error {
        error: String,
        error_description: Option<String>,
    },
    Success(TokenData),
}

#[derive(Debug, Clone)]
pub struct OAuthEndpoints {
    pub device_code_url: String,
    pub token_url: String,
}

impl Default for OAuthEndpoints {
    fn default() -> Self {
        Self {
            device_code_url: DEVICE_CODE_URL.to_string(),
            token_url: TOKEN_URL.to_string(),
        }
    }
}

#[derive(Clone)]
pub struct OAuthClient {
    client: Client,
    client_id: String,
    client_secret: String,
    scope: String,
    endpoints: OAuthEndpoints,
}

impl OAuthClient {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, PlaylistError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(PlaylistError::Request)?;
        Ok(Self {
            client,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scope: READONLY_SCOPE.to_string(),
            endpoints: OAuthEndpoints::default(),
        })
    }

    pub fn with_endpoints(mut self, endpoints: OAuthEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    pub async fn request_device_code(&self) -> Result<DeviceCode, PlaylistError> {
        let response = self
            .client
            .post(&self.endpoints.device_code_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("scope", self.scope.as_str()),
            ])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PlaylistError::Auth(format!("获取设备码失败: {status}")));
        }
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|err| PlaylistError::InvalidJson(err.to_string()))
    }

    /// Polls the token endpoint until the user approves the device code.
    pub async fn poll_device_token(&self, device: &DeviceCode) -> Result<TokenData, PlaylistError> {
        let mut interval = device.interval;
        let deadline = tokio::time::Instant::now() + Duration::from_secs(device.expires_in);
        loop {
            let response = self
                .token_request(&[
                    ("client_id", self.client_id.as_str()),
                    ("client_secret", self.client_secret.as_str()),
                    ("device_code", device.device_code.as_str()),
                    ("grant_type", DEVICE_GRANT_TYPE),
                ])
                .await?;
            match response {
                TokenResponse::Success(token) => return Ok(token),
                TokenResponse::Error { error, .. } if error == "authorization_pending" => {}
                TokenResponse::Error { error, .. } if error == "slow_down" => {
                    interval += SLOW_DOWN_STEP_SECS;
                }
                TokenResponse::Error {
                    error,
                    error_description,
                } => {
                    return Err(PlaylistError::Auth(format!(
                        "获取访问令牌失败: {error} {}",
                        error_description.unwrap_or_default()
                    )))
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(PlaylistError::Auth("设备码已过期".to_string()));
            }
            debug!(interval, "authorization pending");
            tokio::time::sleep(Duration::from_secs(interval)).await;
        }
    }

    pub async fn refresh_access_token(
        &self,
        refresh_token: &str,
    ) -> Result<TokenData, PlaylistError> {
        match self
            .token_request(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .await?
        {
            TokenResponse::Success(token) => Ok(token),
            TokenResponse::Error {
                error,
                error_description,
            } => Err(PlaylistError::Auth(format!(
                "刷新访问令牌失败: {error} {}",
                error_description.unwrap_or_default()
            ))),
        }
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenResponse, PlaylistError> {
        let response = self
            .client
            .post(&self.endpoints.token_url)
            .form(form)
            .send()
            .await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|err| PlaylistError::InvalidJson(err.to_string()))
    }
}

/// Token data stored as a single JSON file.
#[derive(Debug, Clone)]
pub struct PersistedTokens {
    path: PathBuf,
    token_data: Option<TokenData>,
}

impl PersistedTokens {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, PlaylistError> {
        let path = path.into();
        let token_data = if path.exists() {
            let content = fs::read_to_string(&path)?;
            let data: TokenData = serde_json::from_str(&content)
                .map_err(|err| PlaylistError::Auth(format!("令牌文件无效: {err}")))?;
            ensure_refresh_token(&data)?;
            Some(data)
        } else {
            None
        };
        Ok(Self { path, token_data })
    }

    pub fn exists(&self) -> bool {
        self.token_data.is_some()
    }

    pub fn token_data(&self) -> Option<&TokenData> {
        self.token_data.as_ref()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&mut self, token_data: TokenData) -> Result<(), PlaylistError> {
        ensure_refresh_token(&token_data)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(&token_data)
            .map_err(|err| PlaylistError::InvalidJson(err.to_string()))?;
        fs::write(&self.path, json)?;
        self.token_data = Some(token_data);
        Ok(())
    }
}

fn ensure_refresh_token(data: &TokenData) -> Result<(), PlaylistError> {
    match data.refresh_token.as_deref() {
        Some(token) if !token.is_empty() => Ok(()),
        _ => Err(PlaylistError::Auth("令牌数据缺少refresh_token".to_string())),
    }
}

/// Receives the verification URL and user code of a device authorization.
pub type DevicePromptCallback = Arc<dyn Fn(&DeviceCode) + Send + Sync + 'static>;

pub struct AuthAcquirer {
    oauth: OAuthClient,
    persisted: PersistedTokens,
    prompt: Option<DevicePromptCallback>,
}

impl AuthAcquirer {
    pub fn new(oauth: OAuthClient, persisted: PersistedTokens) -> Self {
        Self {
            oauth,
            persisted,
            prompt: None,
        }
    }

    pub fn with_prompt(mut self, prompt: DevicePromptCallback) -> Self {
        self.prompt = Some(prompt);
        self
    }

    /// Refreshes the saved token, or runs the device flow when none is saved.
    /// The resulting token data is written back to the token file.
    pub async fn acquire(&mut self) -> Result<TokenData, PlaylistError> {
        let token_data = match self.persisted.token_data().cloned() {
            Some(saved) => {
                let refresh_token = saved.refresh_token.clone().unwrap_or_default();
                debug!(path = %self.persisted.path().display(), "refreshing saved token");
                self.oauth
                    .refresh_access_token(&refresh_token)
                    .await?
                    .merged_with_saved(&saved)
            }
            None => self.authorize_device().await?,
        };
        self.persisted.write(token_data.clone())?;
        Ok(token_data)
    }

    async fn authorize_device(&self) -> Result<TokenData, PlaylistError> {
        info!("no saved token found, starting device authorization");
        let device = self.oauth.request_device_code().await?;
        if let Some(prompt) = &self.prompt {
            prompt(&device);
        }
        self.oauth.poll_device_token(&device).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_prefers_fresh_access_token() {
        let saved = TokenData {
            access_token: "old".to_string(),
            refresh_token: Some("refresh".to_string()),
            expires_in: Some(10),
            scope: Some("scope".to_string()),
            token_type: Some("Bearer".to_string()),
        };
        let fresh = TokenData {
            access_token: "new".to_string(),
            refresh_token: None,
            expires_in: Some(3600),
            scope: None,
            token_type: None,
        };
        let merged = fresh.merged_with_saved(&saved);
        assert_eq!(merged.access_token, "new");
        assert_eq!(merged.refresh_token.as_deref(), Some("refresh"));
        assert_eq!(merged.expires_in, Some(3600));
        assert_eq!(merged.scope.as_deref(), Some("scope"));
    }
}
