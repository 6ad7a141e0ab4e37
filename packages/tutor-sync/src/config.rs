use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub const RECENT_RESULTS_LIMIT: usize = 20;
pub const PRONUNCIATION_HISTORY_LIMIT: usize = 10;
pub const CHAT_HISTORY_LIMIT: usize = 50;
pub const VOCAB_STATS_WINDOW_DAYS: i64 = 7;

const DEFAULT_REMOTE_TIMEOUT_MS: u64 = 2000;
const DEFAULT_FIRESTORE_BASE_URL: &str = "https://firestore.googleapis.com/v1";

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub local: LocalStoreConfig,
    pub remote: RemoteConfig,
    pub log_level: String,
}

impl SyncConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            local: LocalStoreConfig::from_env()?,
            remote: RemoteConfig::from_env()?,
            log_level,
        })
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            local: LocalStoreConfig {
                path: default_local_db_path(),
                max_pages: None,
            },
            remote: RemoteConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LocalStoreConfig {
    pub path: PathBuf,
    /// Optional `PRAGMA max_page_count` cap on the database file.
    pub max_pages: Option<u32>,
}

impl LocalStoreConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let path = std::env::var("TUTOR_LOCAL_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_local_db_path());

        let max_pages = match std::env::var("TUTOR_LOCAL_MAX_PAGES").ok() {
            Some(raw) => Some(raw.parse::<u32>().map_err(|_| ConfigError::Invalid {
                key: "TUTOR_LOCAL_MAX_PAGES",
                value: raw,
            })?),
            None => None,
        };

        Ok(Self { path, max_pages })
    }
}

#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Upper bound for every remote read or write before the local path is taken.
    pub timeout: Duration,
    pub firestore_project_id: Option<String>,
    pub firestore_base_url: String,
}

impl RemoteConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let timeout_ms = match std::env::var("TUTOR_REMOTE_TIMEOUT_MS").ok() {
            Some(raw) => raw.parse::<u64>().map_err(|_| ConfigError::Invalid {
                key: "TUTOR_REMOTE_TIMEOUT_MS",
                value: raw,
            })?,
            None => DEFAULT_REMOTE_TIMEOUT_MS,
        };

        let firestore_project_id = std::env::var("TUTOR_FIRESTORE_PROJECT_ID")
            .ok()
            .filter(|value| !value.trim().is_empty());

        let firestore_base_url = std::env::var("TUTOR_FIRESTORE_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_FIRESTORE_BASE_URL.to_string());

        Ok(Self {
            timeout: Duration::from_millis(timeout_ms),
            firestore_project_id,
            firestore_base_url,
        })
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_REMOTE_TIMEOUT_MS),
            firestore_project_id: None,
            firestore_base_url: DEFAULT_FIRESTORE_BASE_URL.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

pub fn default_local_db_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("com.tutor.app")
        .join("local.db")
}
