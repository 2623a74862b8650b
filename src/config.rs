//! Process and runtime configuration
//!
//! Two layers: [`WatchConfig`] is read once from the environment at start
//! (paths, endpoints, cadence), while [`ConfigFile`] holds the settings a user
//! edits at runtime and is re-read before every cycle.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::alerts::AlertSettings;
use crate::digest::DigestSettings;
use crate::store::{JsonUnit, PersistenceError};

pub const DEFAULT_LEADERBOARD_URL: &str = "https://lb-be-4.cortensor.network/leaderboard";
pub const DEFAULT_RPC_URL: &str = "https://sepolia-rollup.arbitrum.io/rpc";

/// Static process configuration
#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub host: String,
    pub port: u16,
    /// Directory holding every persisted JSON file
    pub data_dir: PathBuf,
    /// Hot-reloaded settings file
    pub config_path: PathBuf,
    pub poll_interval: Duration,
    pub leaderboard_url: String,
    pub rpc_url: String,
    /// Upper bound on concurrent balance queries
    pub max_concurrency: usize,
    pub fetch_timeout: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            data_dir: PathBuf::from("."),
            config_path: PathBuf::from("config.json"),
            poll_interval: Duration::from_secs(60),
            leaderboard_url: DEFAULT_LEADERBOARD_URL.to_string(),
            rpc_url: DEFAULT_RPC_URL.to_string(),
            max_concurrency: 16,
            fetch_timeout: Duration::from_secs(15),
        }
    }
}

impl WatchConfig {
    /// Build from environment variables, falling back to defaults
    ///
    /// MINERWATCH_HOST, MINERWATCH_PORT, MINERWATCH_DATA_DIR, MINERWATCH_CONFIG,
    /// MINERWATCH_POLL_SECS, MINERWATCH_LEADERBOARD_URL, MINERWATCH_RPC_URL,
    /// MINERWATCH_MAX_CONCURRENCY
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let data_dir = std::env::var("MINERWATCH_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);
        let config_path = std::env::var("MINERWATCH_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("config.json"));

        Self {
            host: std::env::var("MINERWATCH_HOST").unwrap_or(defaults.host),
            port: parse_env("MINERWATCH_PORT").unwrap_or(defaults.port),
            data_dir,
            config_path,
            poll_interval: parse_env::<u64>("MINERWATCH_POLL_SECS")
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.poll_interval),
            leaderboard_url: std::env::var("MINERWATCH_LEADERBOARD_URL")
                .unwrap_or(defaults.leaderboard_url),
            rpc_url: std::env::var("MINERWATCH_RPC_URL").unwrap_or(defaults.rpc_url),
            max_concurrency: parse_env::<usize>("MINERWATCH_MAX_CONCURRENCY")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_concurrency),
            fetch_timeout: defaults.fetch_timeout,
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Contents of the runtime settings file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    pub alert_settings: AlertSettings,
    pub stats_bot: DigestSettings,
}

/// The hot-reloaded settings file
#[derive(Debug, Clone)]
pub struct ConfigFile {
    unit: JsonUnit<RuntimeSettings>,
}

impl ConfigFile {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            unit: JsonUnit::new(path),
        }
    }

    /// Current settings; a missing or invalid file yields defaults
    /// (alerts disabled)
    pub fn load(&self) -> RuntimeSettings {
        self.unit.load()
    }

    pub fn save(&self, settings: &RuntimeSettings) -> Result<(), PersistenceError> {
        self.unit.save(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_disables_alerts() {
        let dir = tempfile::tempdir().unwrap();
        let file = ConfigFile::new(dir.path().join("config.json"));

        let settings = file.load();
        assert!(!settings.alert_settings.telegram_enabled);
        assert!(!settings.stats_bot.enabled);
    }

    #[test]
    fn test_reload_sees_edits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let file = ConfigFile::new(&path);

        std::fs::write(
            &path,
            r#"{"alert_settings": {"telegram_enabled": true, "bot_token": "t", "chat_id": "c",
                "low_balance_alert": 0.5, "critical_balance_alert": 0.1, "miner_offline_minutes": 5},
                "column_widths": {}}"#,
        )
        .unwrap();
        assert!(file.load().alert_settings.channel_status().is_ready());

        let mut settings = file.load();
        settings.alert_settings.miner_offline_minutes = 10.0;
        file.save(&settings).unwrap();
        assert_eq!(file.load().alert_settings.offline_after_seconds(), 600);
    }
}
