//! Settings, `.env` loading and on-disk locations.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::poller::DEFAULT_POLL_INTERVAL;
use crate::validate::{FileValidator, MAX_FILE_SIZE};

const APP_DIR: &str = "relaychat";

pub struct PathManager;

impl PathManager {
    pub fn data_dir() -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join(APP_DIR))
    }

    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(APP_DIR))
    }

    pub fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|d| d.join("config.toml"))
    }

    /// Where the session correlation id is kept between runs.
    pub fn session_path() -> Option<PathBuf> {
        Self::data_dir().map(|d| d.join("session_id"))
    }

    pub fn log_file_path() -> Option<PathBuf> {
        Self::data_dir().map(|d| d.join("logs").join("relaychat.log"))
    }
}

/// Load environment variables from ./.env, then ~/.env. Variables that are
/// already set are never overwritten, so the local file wins.
pub fn load_env_file() {
    dotenv::dotenv().ok();
    if let Some(home) = dirs::home_dir() {
        dotenv::from_path(home.join(".env")).ok();
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Endpoints {
    pub submit: String,
    pub upload: String,
    pub status: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Endpoints {
            submit: "http://localhost:3000/api/chat".to_string(),
            upload: "http://localhost:3000/api/upload".to_string(),
            status: "http://localhost:3000/api/job-status".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct UploadSettings {
    pub max_file_size: u64,
    /// Empty accepts every type.
    pub allowed_types: Vec<String>,
}

impl Default for UploadSettings {
    fn default() -> Self {
        UploadSettings {
            max_file_size: MAX_FILE_SIZE,
            allowed_types: [
                "image/png",
                "image/jpeg",
                "image/gif",
                "image/webp",
                "application/pdf",
                "text/plain",
                "audio/mpeg",
                "audio/wav",
                "video/mp4",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PollingSettings {
    pub interval_secs: u64,
}

impl Default for PollingSettings {
    fn default() -> Self {
        PollingSettings {
            interval_secs: DEFAULT_POLL_INTERVAL.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ToolSettings {
    /// The one tool that stays selected across turns.
    pub persistent: Option<String>,
}

impl Default for ToolSettings {
    fn default() -> Self {
        ToolSettings {
            persistent: Some("continuous".to_string()),
        }
    }
}

/// Application settings stored in config.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    pub endpoints: Endpoints,
    pub uploads: UploadSettings,
    pub polling: PollingSettings,
    pub tools: ToolSettings,
    pub request_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            endpoints: Endpoints::default(),
            uploads: UploadSettings::default(),
            polling: PollingSettings::default(),
            tools: ToolSettings::default(),
            request_timeout_secs: 120,
        }
    }
}

impl Settings {
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Loads `path` when given; otherwise the default config file if it
    /// exists, else built-in defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match PathManager::config_path() {
            Some(default_path) if default_path.exists() => Self::load(&default_path),
            _ => Ok(Self::default()),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.polling.interval_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn validator(&self) -> FileValidator {
        FileValidator::new(self.uploads.max_file_size, self.uploads.allowed_types.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let settings = Settings::from_toml_str(
            r#"
            request_timeout_secs = 30

            [endpoints]
            submit = "https://chat.example/api/chat"

            [polling]
            interval_secs = 5
            "#,
        )
        .unwrap();

        assert_eq!(settings.endpoints.submit, "https://chat.example/api/chat");
        assert_eq!(settings.endpoints.upload, Endpoints::default().upload);
        assert_eq!(settings.poll_interval(), Duration::from_secs(5));
        assert_eq!(settings.request_timeout(), Duration::from_secs(30));
        assert_eq!(settings.uploads, UploadSettings::default());
        assert_eq!(settings.tools.persistent.as_deref(), Some("continuous"));
    }

    #[test]
    fn zero_interval_is_clamped() {
        let settings = Settings::from_toml_str("[polling]\ninterval_secs = 0").unwrap();
        assert_eq!(settings.poll_interval(), Duration::from_secs(1));
    }

    #[test]
    fn empty_tools_table_uses_defaults() {
        let settings = Settings::from_toml_str("[tools]\n").unwrap();
        assert_eq!(settings.tools, ToolSettings::default());
    }

    #[test]
    fn load_reports_missing_and_invalid_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(matches!(Settings::load(&missing), Err(ConfigError::Read { .. })));

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "endpoints = 3").unwrap();
        assert!(matches!(Settings::load(&bad), Err(ConfigError::Parse { .. })));

        let good = dir.path().join("good.toml");
        std::fs::write(&good, "[uploads]\nmax_file_size = 10\nallowed_types = []").unwrap();
        let settings = Settings::load(&good).unwrap();
        assert_eq!(settings.uploads.max_file_size, 10);
        assert!(settings.uploads.allowed_types.is_empty());
    }
}
