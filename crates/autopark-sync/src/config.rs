//! # Store Configuration
//!
//! Per-device configuration for the offline-first store.
//!
//! This is deliberately separate from `app_settings`: tariffs and business
//! data replicate through the remote store, while the device identity and
//! connection tuning must exist before any connection is made.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     AUTOPARK_REMOTE_URL=https://db.autoparking.pe                      │
//! │     AUTOPARK_DEVICE_ID=abc-123                                         │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/autopark/autopark.toml (Linux)                           │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     auto-generated device_id, local-only mode                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [device]
//! id = "550e8400-e29b-41d4-a716-446655440000"
//! name = "Caseta 1"
//!
//! [remote]
//! url = "https://db.autoparking.pe"
//! api_key = "service-key"
//!
//! [tuning]
//! remote_timeout_secs = 5
//! replay_poll_secs = 5
//! max_replay_attempts = 10
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};

// =============================================================================
// Device Configuration
// =============================================================================

/// Configuration for this device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Unique device identifier (UUID v4).
    /// Auto-generated on first run if not provided.
    pub id: String,

    /// Human-readable device name (e.g., "Caseta 1", "Entrada Norte").
    #[serde(default = "default_device_name")]
    pub name: String,
}

fn default_device_name() -> String {
    "Caseta Principal".to_string()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            id: Uuid::new_v4().to_string(),
            name: default_device_name(),
        }
    }
}

// =============================================================================
// Remote Configuration
// =============================================================================

/// Remote relational store endpoint.
///
/// When `url` is absent the store runs local-only: writes hit SQLite
/// directly and nothing is ever queued.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the REST-style remote store.
    #[serde(default)]
    pub url: Option<String>,

    /// API key sent with every request.
    #[serde(default)]
    pub api_key: Option<String>,
}

// =============================================================================
// Tuning
// =============================================================================

/// Timeouts and retry behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuningConfig {
    /// Bound on every remote call in the register/exit/settings paths
    /// (seconds). On expiry the call is treated as unreachable and the
    /// offline-queue path takes over.
    #[serde(default = "default_remote_timeout")]
    pub remote_timeout_secs: u64,

    /// Interval between replay worker wake-ups (seconds).
    #[serde(default = "default_replay_poll")]
    pub replay_poll_secs: u64,

    /// Attempts before a queue entry is skipped with a warning.
    #[serde(default = "default_max_replay_attempts")]
    pub max_replay_attempts: i64,

    /// Queue entries fetched per drain pass.
    #[serde(default = "default_queue_batch_size")]
    pub queue_batch_size: u32,

    /// Initial backoff for the reconnection probe (milliseconds).
    #[serde(default = "default_probe_initial_backoff")]
    pub probe_initial_backoff_ms: u64,

    /// Maximum backoff for the reconnection probe (seconds).
    #[serde(default = "default_probe_max_backoff")]
    pub probe_max_backoff_secs: u64,
}

fn default_remote_timeout() -> u64 {
    5
}
fn default_replay_poll() -> u64 {
    5
}
fn default_max_replay_attempts() -> i64 {
    10
}
fn default_queue_batch_size() -> u32 {
    100
}
fn default_probe_initial_backoff() -> u64 {
    500
}
fn default_probe_max_backoff() -> u64 {
    60
}

impl Default for TuningConfig {
    fn default() -> Self {
        TuningConfig {
            remote_timeout_secs: default_remote_timeout(),
            replay_poll_secs: default_replay_poll(),
            max_replay_attempts: default_max_replay_attempts(),
            queue_batch_size: default_queue_batch_size(),
            probe_initial_backoff_ms: default_probe_initial_backoff(),
            probe_max_backoff_secs: default_probe_max_backoff(),
        }
    }
}

/// Runtime view of [`TuningConfig`] with parsed durations.
#[derive(Debug, Clone)]
pub struct StoreTuning {
    pub remote_timeout: Duration,
    pub replay_poll: Duration,
    pub max_replay_attempts: i64,
    pub queue_batch_size: u32,
    pub probe_initial_backoff: Duration,
    pub probe_max_backoff: Duration,
}

impl Default for StoreTuning {
    fn default() -> Self {
        TuningConfig::default().runtime()
    }
}

impl TuningConfig {
    /// Converts to the runtime representation.
    pub fn runtime(&self) -> StoreTuning {
        StoreTuning {
            remote_timeout: Duration::from_secs(self.remote_timeout_secs),
            replay_poll: Duration::from_secs(self.replay_poll_secs),
            max_replay_attempts: self.max_replay_attempts,
            queue_batch_size: self.queue_batch_size,
            probe_initial_backoff: Duration::from_millis(self.probe_initial_backoff_ms),
            probe_max_backoff: Duration::from_secs(self.probe_max_backoff_secs),
        }
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete per-device configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParkingConfig {
    /// Device-specific configuration.
    #[serde(default)]
    pub device: DeviceConfig,

    /// Remote store endpoint.
    #[serde(default)]
    pub remote: RemoteConfig,

    /// Timeouts and retry behavior.
    #[serde(default)]
    pub tuning: TuningConfig,
}

impl ParkingConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (autopark.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> StoreResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading store config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load store config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> StoreResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| StoreError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| StoreError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Store config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> StoreResult<()> {
        if self.device.id.is_empty() {
            return Err(StoreError::InvalidConfig("device id must not be empty".into()));
        }

        if let Some(ref url) = self.remote.url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(StoreError::InvalidConfig(format!(
                    "remote URL must start with http:// or https://, got: {url}"
                )));
            }
        }

        if self.tuning.remote_timeout_secs == 0 {
            return Err(StoreError::InvalidConfig(
                "remote_timeout_secs must be greater than 0".into(),
            ));
        }

        if self.tuning.queue_batch_size == 0 {
            return Err(StoreError::InvalidConfig(
                "queue_batch_size must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(id) = std::env::var("AUTOPARK_DEVICE_ID") {
            debug!(device_id = %id, "Overriding device ID from environment");
            self.device.id = id;
        }

        if let Ok(name) = std::env::var("AUTOPARK_DEVICE_NAME") {
            self.device.name = name;
        }

        if let Ok(url) = std::env::var("AUTOPARK_REMOTE_URL") {
            debug!(url = %url, "Overriding remote URL from environment");
            self.remote.url = Some(url);
        }

        if let Ok(key) = std::env::var("AUTOPARK_REMOTE_API_KEY") {
            self.remote.api_key = Some(key);
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("pe", "autoparking", "autopark")
            .map(|dirs| dirs.config_dir().join("autopark.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Returns the device ID.
    pub fn device_id(&self) -> &str {
        &self.device.id
    }

    /// Whether a remote endpoint is configured.
    pub fn is_remote_configured(&self) -> bool {
        self.remote.url.is_some()
    }

    /// Runtime tuning values.
    pub fn tuning(&self) -> StoreTuning {
        self.tuning.runtime()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ParkingConfig::default();
        assert!(!config.device.id.is_empty()); // Auto-generated
        assert!(!config.is_remote_configured());
        assert_eq!(config.tuning.remote_timeout_secs, 5);
        assert_eq!(config.tuning.max_replay_attempts, 10);
    }

    #[test]
    fn test_config_validation() {
        let mut config = ParkingConfig::default();
        assert!(config.validate().is_ok());

        config.device.id = String::new();
        assert!(config.validate().is_err());

        config.device.id = "device-1".to_string();
        config.remote.url = Some("ftp://wrong".to_string());
        assert!(config.validate().is_err());

        config.remote.url = Some("https://db.autoparking.pe".to_string());
        assert!(config.validate().is_ok());

        config.tuning.remote_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = ParkingConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[device]"));
        assert!(toml_str.contains("[tuning]"));

        let parsed: ParkingConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.device.id, config.device.id);
    }

    #[test]
    fn test_partial_file_gets_defaults() {
        let parsed: ParkingConfig = toml::from_str(
            r#"
            [remote]
            url = "https://db.autoparking.pe"
            "#,
        )
        .unwrap();

        assert!(parsed.is_remote_configured());
        assert!(!parsed.device.id.is_empty());
        assert_eq!(parsed.tuning.replay_poll_secs, 5);
    }

    #[test]
    fn test_tuning_runtime_conversion() {
        let tuning = TuningConfig::default().runtime();
        assert_eq!(tuning.remote_timeout, Duration::from_secs(5));
        assert_eq!(tuning.probe_initial_backoff, Duration::from_millis(500));
    }
}
