//! Periodic stats digest
//!
//! A human-readable summary of the latest snapshot, sent on a timer or on
//! demand. Digests bypass de-duplication: the same text may legitimately be
//! sent twice.

pub mod format;

pub use format::{render, DigestLayout, Metric, EMPTY_DIGEST};

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::alerts::{AlertEngine, AlertSettings};
use crate::config::ConfigFile;
use crate::driver::PollingDriver;
use crate::fetch::StatsSnapshot;
use crate::store::JsonUnit;

pub const HISTORY_FILE: &str = "bot_stats.json";

/// Oldest history entries are dropped past this length
pub const MAX_HISTORY: usize = 1000;

/// `stats_bot` section of the config file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DigestSettings {
    pub enabled: bool,
    pub interval_hours: u64,
    pub metrics: Vec<Metric>,
    pub include_header: bool,
    pub include_timestamp: bool,
    pub compare_over_time: bool,
}

impl Default for DigestSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_hours: 1,
            metrics: Metric::ALL.to_vec(),
            include_header: true,
            include_timestamp: false,
            compare_over_time: false,
        }
    }
}

impl DigestSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_hours.max(1) * 3600)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: String,
    pub data: StatsSnapshot,
}

/// Builds digests, keeps their history and sends them through the engine
pub struct StatsDigest {
    engine: Arc<AlertEngine>,
    history: JsonUnit<Vec<HistoryEntry>>,
}

impl StatsDigest {
    pub fn open(engine: Arc<AlertEngine>, data_dir: impl AsRef<Path>) -> Self {
        Self {
            engine,
            history: JsonUnit::new(data_dir.as_ref().join(HISTORY_FILE)),
        }
    }

    /// Record `snapshot` in the history and send its digest
    ///
    /// Delivery uses `alerts` for the channel rather than the engine's cycle
    /// settings. Returns whether the channel accepted the message.
    pub async fn send_now(
        &self,
        snapshot: &StatsSnapshot,
        settings: &DigestSettings,
        alerts: &AlertSettings,
    ) -> Result<bool, DigestError> {
        if settings.metrics.is_empty() {
            return Err(DigestError::NoMetrics);
        }

        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let message = self.record_and_render(snapshot, settings, &timestamp);

        let sent = self.engine.send_with(&message, alerts).await;
        if sent {
            tracing::info!("Stats digest sent");
        } else {
            tracing::warn!("Stats digest was not delivered");
        }
        Ok(sent)
    }

    fn record_and_render(
        &self,
        snapshot: &StatsSnapshot,
        settings: &DigestSettings,
        timestamp: &str,
    ) -> String {
        let mut history = self.history.load();
        history.push(HistoryEntry {
            timestamp: timestamp.to_string(),
            data: snapshot.clone(),
        });
        if history.len() > MAX_HISTORY {
            let excess = history.len() - MAX_HISTORY;
            history.drain(..excess);
        }
        if let Err(e) = self.history.save(&history) {
            tracing::warn!(error = %e, "Failed to save digest history");
        }

        let previous = if settings.compare_over_time && history.len() >= 2 {
            Some(&history[history.len() - 2].data)
        } else {
            None
        };

        let layout = DigestLayout {
            metrics: &settings.metrics,
            include_header: settings.include_header,
            timestamp: settings.include_timestamp.then_some(timestamp),
            previous,
        };

        render(snapshot, &layout)
    }

    /// Spawn the digest timer
    ///
    /// Settings are re-read from `config` every minute, so enabling the
    /// digest or changing its interval takes effect without a restart.
    pub fn start(
        self: Arc<Self>,
        driver: Arc<PollingDriver>,
        config: ConfigFile,
    ) -> (mpsc::Sender<()>, tokio::task::JoinHandle<()>) {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(60));
            let mut last_sent: Option<Instant> = None;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let runtime = config.load();
                        let settings = &runtime.stats_bot;
                        if !settings.enabled {
                            continue;
                        }
                        if last_sent.map(|t| t.elapsed() < settings.interval()).unwrap_or(false) {
                            continue;
                        }
                        // First enabled tick only arms the timer.
                        if last_sent.is_none() {
                            last_sent = Some(Instant::now());
                            continue;
                        }

                        let Some(snapshot) = driver.last_snapshot() else {
                            tracing::debug!("No snapshot yet, digest skipped");
                            continue;
                        };
                        let result = self
                            .send_now(&snapshot, settings, &runtime.alert_settings)
                            .await;
                        match result {
                            Ok(_) => last_sent = Some(Instant::now()),
                            Err(e) => tracing::warn!(error = %e, "Digest skipped"),
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        tracing::info!("Digest timer shutting down");
                        break;
                    }
                }
            }
        });

        (shutdown_tx, handle)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DigestError {
    #[error("No metrics selected")]
    NoMetrics,

    #[error("No stats collected yet")]
    NoData,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::testing::RecordingChannel;
    use crate::fetch::{MinerStats, StageCounter};
    use crate::store::StateStore;

    fn alerts() -> AlertSettings {
        AlertSettings {
            telegram_enabled: true,
            bot_token: "token".to_string(),
            chat_id: "chat".to_string(),
            ..Default::default()
        }
    }

    /// The engine's own settings stay disabled; digests bring their own
    fn engine(dir: &Path, channel: Arc<RecordingChannel>) -> Arc<AlertEngine> {
        Arc::new(AlertEngine::new(
            StateStore::open(dir),
            channel,
            AlertSettings::default(),
        ))
    }

    fn snapshot_with_ping(ping: u64) -> StatsSnapshot {
        let mut snapshot = StatsSnapshot::default();
        snapshot.miners.insert(
            "0x0000000000000000000000000000000000012345".to_string(),
            MinerStats {
                ping,
                precommit: StageCounter::default(),
                commit: StageCounter::default(),
                prepare: StageCounter::default(),
                create: StageCounter::default(),
                last_active: String::new(),
                last_active_timestamp: 0,
                eth_balance: None,
            },
        );
        snapshot
    }

    #[tokio::test]
    async fn test_send_now_bypasses_dedup() {
        let dir = tempfile::tempdir().unwrap();
        let channel = Arc::new(RecordingChannel::new());
        let digest = StatsDigest::open(engine(dir.path(), channel.clone()), dir.path());
        let settings = DigestSettings {
            metrics: vec![Metric::Ping],
            ..Default::default()
        };

        let snapshot = snapshot_with_ping(4);
        assert!(digest.send_now(&snapshot, &settings, &alerts()).await.unwrap());
        assert!(digest.send_now(&snapshot, &settings, &alerts()).await.unwrap());

        assert_eq!(channel.sent(), vec!["...12345: | ping: 4", "...12345: | ping: 4"]);
        assert!(StateStore::open(dir.path()).load_sent().is_empty());
    }

    #[tokio::test]
    async fn test_compare_uses_previous_history_entry() {
        let dir = tempfile::tempdir().unwrap();
        let channel = Arc::new(RecordingChannel::new());
        let digest = StatsDigest::open(engine(dir.path(), channel.clone()), dir.path());
        let settings = DigestSettings {
            metrics: vec![Metric::Ping],
            include_header: false,
            compare_over_time: true,
            ..Default::default()
        };

        digest.send_now(&snapshot_with_ping(4), &settings, &alerts()).await.unwrap();
        digest.send_now(&snapshot_with_ping(7), &settings, &alerts()).await.unwrap();

        assert_eq!(channel.sent(), vec!["ping: 4", "ping: 7 🟢▲3"]);

        let history: Vec<HistoryEntry> =
            serde_json::from_slice(&std::fs::read(dir.path().join(HISTORY_FILE)).unwrap())
                .unwrap();
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn test_no_metrics_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let channel = Arc::new(RecordingChannel::new());
        let digest = StatsDigest::open(engine(dir.path(), channel.clone()), dir.path());
        let settings = DigestSettings {
            metrics: Vec::new(),
            ..Default::default()
        };

        let result = digest.send_now(&StatsSnapshot::default(), &settings, &alerts()).await;
        assert!(matches!(result, Err(DigestError::NoMetrics)));
        assert_eq!(channel.call_count(), 0);
    }

    #[test]
    fn test_settings_defaults() {
        let settings: DigestSettings = serde_json::from_str(r#"{"enabled": true}"#).unwrap();
        assert!(settings.enabled);
        assert_eq!(settings.metrics.len(), 6);
        assert_eq!(settings.interval(), Duration::from_secs(3600));
    }
}
