//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Generation coordinator configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// How many times to re-read a peer's in-progress row before giving up
    /// on waiting and generating locally.
    #[serde(default = "default_poll_attempts")]
    pub poll_attempts: u32,
    /// Spacing between poll attempts, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Action endpoint path used for temporary placeholder URLs.
    #[serde(default = "default_placeholder_path")]
    pub placeholder_path: String,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            poll_attempts: default_poll_attempts(),
            poll_interval_ms: default_poll_interval_ms(),
            placeholder_path: default_placeholder_path(),
        }
    }
}

fn default_poll_attempts() -> u32 {
    crate::DEFAULT_POLL_ATTEMPTS
}

fn default_poll_interval_ms() -> u64 {
    crate::DEFAULT_POLL_INTERVAL_MS
}

fn default_placeholder_path() -> String {
    "/actions/assets/generate-transform".to_string()
}

/// Artifact storage configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    Filesystem {
        /// Storage root directory.
        path: PathBuf,
        /// Public base URL the backend serves artifacts under. A backend
        /// without a root URL cannot serve transform URLs at all.
        root_url: Option<String>,
    },
}

impl StorageConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            StorageConfig::Filesystem { path, .. } => {
                if path.as_os_str().is_empty() {
                    return Err("filesystem storage path must not be empty".to_string());
                }
                Ok(())
            }
        }
    }
}

/// Metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetadataConfig {
    /// SQLite database path.
    pub db_path: PathBuf,
    /// Busy timeout in seconds for concurrent access.
    #[serde(default = "default_busy_timeout_secs")]
    pub busy_timeout_secs: u64,
}

fn default_busy_timeout_secs() -> u64 {
    5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generator_defaults() {
        let config: GeneratorConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.poll_attempts, 30);
        assert_eq!(config.poll_interval_ms, 1000);
    }

    #[test]
    fn storage_config_validates_path() {
        let config = StorageConfig::Filesystem {
            path: PathBuf::new(),
            root_url: None,
        };
        assert!(config.validate().is_err());

        let config = StorageConfig::Filesystem {
            path: PathBuf::from("/var/darkroom"),
            root_url: Some("https://cdn.example.com/transforms".to_string()),
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn storage_config_tagged_format() {
        let json = r#"{"type":"filesystem","path":"/srv/artifacts","root_url":null}"#;
        let config: StorageConfig = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
    }
}
