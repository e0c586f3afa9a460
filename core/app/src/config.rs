//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use nivelver_common::{Error, Result};
use nivelver_crypto::KdfParams;
use nivelver_sync::SyncMode;

/// Configuration file name inside the config directory.
pub const CONFIG_FILENAME: &str = "config.json";

/// Directory name used under the platform data and config directories.
pub const APP_DIRNAME: &str = "nivelver";

/// Default database location: `<data dir>/nivelver/nivelver.db`.
pub fn default_database_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIRNAME)
        .join("nivelver.db")
}

/// Default config location: `<config dir>/nivelver/config.json`.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIRNAME)
        .join(CONFIG_FILENAME)
}

/// Which cloud backend to use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudConfig {
    /// Backend name (e.g., "memory", "firestore").
    pub provider: String,
    /// Backend-specific configuration.
    #[serde(default)]
    pub config: serde_json::Value,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            provider: "memory".to_string(),
            config: serde_json::Value::Null,
        }
    }
}

/// Reconciliation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Run a pull in the background when the application starts.
    pub sync_on_start: bool,
    /// Seconds between periodic full syncs; unset for manual only.
    pub interval_secs: Option<u64>,
}

impl SyncSettings {
    pub fn mode(&self) -> SyncMode {
        SyncMode::from_interval_secs(self.interval_secs)
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            sync_on_start: true,
            interval_secs: None,
        }
    }
}

/// Endpoint probed to tell the user whether they are online.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReachabilityConfig {
    pub host: String,
    pub port: u16,
    pub timeout_ms: u64,
}

impl Default for ReachabilityConfig {
    fn default() -> Self {
        Self {
            host: "firestore.googleapis.com".to_string(),
            port: 443,
            timeout_ms: 1500,
        }
    }
}

/// Top-level application configuration.
///
/// Every section has defaults, so an empty JSON object is a valid file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// SQLite database file.
    pub database_path: PathBuf,
    pub cloud: CloudConfig,
    pub sync: SyncSettings,
    /// Argon2id cost for new password digests.
    pub hashing: KdfParams,
    pub reachability: ReachabilityConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            cloud: CloudConfig::default(),
            sync: SyncSettings::default(),
            hashing: KdfParams::default(),
            reachability: ReachabilityConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a file. A missing file yields defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(json) => {
                let config = Self::from_json(&json)?;
                config.validate()?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Write configuration to a file, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Check values that serde cannot.
    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::InvalidInput("database_path cannot be empty".to_string()));
        }
        if self.cloud.provider.trim().is_empty() {
            return Err(Error::InvalidInput("cloud.provider cannot be empty".to_string()));
        }
        if self.sync.interval_secs == Some(0) {
            return Err(Error::InvalidInput(
                "sync.interval_secs must be positive; omit it for manual sync".to_string(),
            ));
        }
        if self.reachability.timeout_ms == 0 {
            return Err(Error::InvalidInput(
                "reachability.timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Serialize configuration to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_object_is_default() {
        let config = AppConfig::from_json("{}").unwrap();
        assert_eq!(config, AppConfig::default());
        assert!(config.sync.sync_on_start);
        assert_eq!(config.sync.mode(), SyncMode::Manual);
        assert_eq!(config.cloud.provider, "memory");
    }

    #[test]
    fn test_config_serialization() {
        let config = AppConfig {
            database_path: PathBuf::from("/tmp/nivelver.db"),
            cloud: CloudConfig {
                provider: "firestore".to_string(),
                config: json!({ "project_id": "nivelver-app" }),
            },
            sync: SyncSettings {
                sync_on_start: false,
                interval_secs: Some(300),
            },
            hashing: KdfParams::interactive(),
            reachability: ReachabilityConfig::default(),
        };

        let restored = AppConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(restored, config);
        assert!(matches!(restored.sync.mode(), SyncMode::Periodic { .. }));
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut config = AppConfig::default();
        config.sync.interval_secs = Some(0);
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.reachability.timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.cloud.provider = " ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_missing_file_is_default() {
        let tmp = tempfile::tempdir().unwrap();
        let config = AppConfig::load(tmp.path().join("absent.json")).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_save_and_load() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join(CONFIG_FILENAME);

        let mut config = AppConfig::default();
        config.database_path = tmp.path().join("db.sqlite");
        config.save(&path).unwrap();

        assert_eq!(AppConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_load_invalid_json() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(CONFIG_FILENAME);
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(AppConfig::load(&path), Err(Error::Serialization(_))));
    }
}
