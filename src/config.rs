//! Configuration loading and management.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono_tz::Tz;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

/// Sync engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Pause after each status emission, in milliseconds.
    pub status_delay_ms: u64,
    /// IANA zone used for activity day boundaries and upload context.
    pub time_zone: String,
    /// Device identifier for records that carry none.
    pub fallback_device_model: String,
    /// Whether workout and activity totals come from platform aggregation.
    pub use_platform_aggregates: bool,
    /// Where the change token is persisted.
    pub change_token_path: PathBuf,
}

impl Default for SyncConfig {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            status_delay_ms: 100,
            time_zone: "UTC".to_string(),
            fallback_device_model: "unknown".to_string(),
            use_platform_aggregates: true,
            change_token_path: data_dir.join("change_token.json"),
        }
    }
}

impl SyncConfig {
    /// Loads configuration from default locations.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Loads configuration, optionally from a specific file.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // SYNHEART_SYNC_* overrides
        figment = figment.merge(Env::prefixed("SYNHEART_SYNC_"));

        Ok(figment.extract()?)
    }

    /// Parsed [`SyncConfig::time_zone`]
    pub fn time_zone(&self) -> Result<Tz> {
        self.time_zone
            .parse()
            .map_err(|_| SyncError::InvalidTimezone(self.time_zone.clone()))
    }

    pub fn status_delay(&self) -> Duration {
        Duration::from_millis(self.status_delay_ms)
    }
}

/// Returns the platform-specific config directory for synheart-sync.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("synheart-sync"))
}

/// Returns the platform-specific data directory for synheart-sync.
///
/// On Linux: `~/.local/share/synheart-sync`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("synheart-sync"))
}
