use std::fs;
use std::path::{Path, PathBuf};

use dirs_next::{config_dir, data_local_dir};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::PlaylistError;

const APP_DIR: &str = "myti";
pub const CONFIG_FILE_NAME: &str = "config.json";
pub const CATEGORIES_FILE_NAME: &str = "categories.config.json";
pub const TOKEN_FILE_NAME: &str = "OAUTH.json";

pub const ENV_CLIENT_ID: &str = "MYTI_AUTH_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "MYTI_AUTH_CLIENT_SECRET";
pub const ENV_TOKEN_FILE: &str = "MYTI_AUTH_TOKEN_FILE";
pub const ENV_CATEGORIES_FILE: &str = "MYTI_CATEGORIES_FILE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthConfiguration {
    pub client_id: String,
    pub client_secret: String,
    pub token_file: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoriesConfiguration {
    pub file: PathBuf,
}

/// Where configuration and state live on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conventions {
    pub config_dir: PathBuf,
    pub state_dir: PathBuf,
    pub config_file_name: String,
    pub categories_file_name: String,
    pub token_file_name: String,
}

impl Default for Conventions {
    fn default() -> Self {
        Self {
            config_dir: app_dir(config_dir()),
            state_dir: app_dir(data_local_dir()),
            config_file_name: CONFIG_FILE_NAME.to_string(),
            categories_file_name: CATEGORIES_FILE_NAME.to_string(),
            token_file_name: TOKEN_FILE_NAME.to_string(),
        }
    }
}

impl Conventions {
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(&self.config_file_name)
    }
}

/// A partially specified configuration. Used for the config file, the
/// environment and explicit overrides alike.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PartialConfiguration {
    pub auth: PartialAuth,
    pub categories: PartialCategories,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PartialAuth {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub token_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartialCategories {
    pub file: Option<PathBuf>,
}

impl PartialConfiguration {
    /// Fills every unset field from `lower`.
    pub fn or(self, lower: PartialConfiguration) -> PartialConfiguration {
        PartialConfiguration {
            auth: PartialAuth {
                client_id: self.auth.client_id.or(lower.auth.client_id),
                client_secret: self.auth.client_secret.or(lower.auth.client_secret),
                token_file: self.auth.token_file.or(lower.auth.token_file),
            },
            categories: PartialCategories {
                file: self.categories.file.or(lower.categories.file),
            },
        }
    }

    pub fn from_env<F>(lookup: F) -> PartialConfiguration
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        PartialConfiguration {
            auth: PartialAuth {
                client_id: get(ENV_CLIENT_ID),
                client_secret: get(ENV_CLIENT_SECRET),
                token_file: get(ENV_TOKEN_FILE).map(PathBuf::from),
            },
            categories: PartialCategories {
                file: get(ENV_CATEGORIES_FILE).map(PathBuf::from),
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<PartialConfiguration, PlaylistError> {
        if !path.exists() {
            debug!(path = %path.display(), "config file not found");
            return Ok(PartialConfiguration::default());
        }
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|err| PlaylistError::Config(format!("{}: {err}", path.display())))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    pub auth: AuthConfiguration,
    pub categories: CategoriesConfiguration,
    pub conventions: Conventions,
}

impl Configuration {
    /// Resolves overrides, then process environment, then the config file,
    /// then defaults.
    pub fn load(
        overrides: PartialConfiguration,
        conventions: Conventions,
    ) -> Result<Self, PlaylistError> {
        Self::resolve(overrides, conventions, |key| std::env::var(key).ok())
    }

    pub fn resolve<F>(
        overrides: PartialConfiguration,
        conventions: Conventions,
        env: F,
    ) -> Result<Self, PlaylistError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let from_file = PartialConfiguration::from_file(&conventions.config_file())?;
        let merged = overrides
            .or(PartialConfiguration::from_env(env))
            .or(from_file);

        let client_id = merged
            .auth
            .client_id
            .ok_or_else(|| PlaylistError::Config(format!("缺少client id ({ENV_CLIENT_ID})")))?;
        let client_secret = merged.auth.client_secret.ok_or_else(|| {
            PlaylistError::Config(format!("缺少client secret ({ENV_CLIENT_SECRET})"))
        })?;
        let token_file = merged
            .auth
            .token_file
            .unwrap_or_else(|| conventions.state_dir.join(&conventions.token_file_name));
        let categories_file = merged
            .categories
            .file
            .unwrap_or_else(|| conventions.config_dir.join(&conventions.categories_file_name));

        Ok(Self {
            auth: AuthConfiguration {
                client_id,
                client_secret,
                token_file,
            },
            categories: CategoriesConfiguration {
                file: categories_file,
            },
            conventions,
        })
    }
}

fn app_dir(base: Option<PathBuf>) -> PathBuf {
    let mut path = base.unwrap_or_else(|| PathBuf::from("."));
    path.push(APP_DIR);
    path
}
