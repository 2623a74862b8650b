//! Alert engine: liveness transitions, balance thresholds, de-duplicated delivery

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use super::config::{AlertSettings, ChannelStatus, Credentials};
use super::event::{self, AlertEvent, AlertKind};
use super::notifier::NotificationChannel;
use crate::store::{MinerStatus, PersistenceError, StateStore};

pub const TEST_MESSAGE: &str = "Test alert from ETH Miner Dashboard";

/// Decides when to alert and delivers through a [`NotificationChannel`]
///
/// Persisted state (status map, sent set) is re-read from the store on every
/// decision, so several processes may share one data directory. Nothing here
/// holds a lock across a network call.
pub struct AlertEngine {
    store: StateStore,
    channel: Arc<dyn NotificationChannel>,
    settings: RwLock<AlertSettings>,
    /// Messages delivered since the last `begin_cycle`
    session: Mutex<Vec<String>>,
}

impl AlertEngine {
    pub fn new(
        store: StateStore,
        channel: Arc<dyn NotificationChannel>,
        settings: AlertSettings,
    ) -> Self {
        Self {
            store,
            channel,
            settings: RwLock::new(settings),
            session: Mutex::new(Vec::new()),
        }
    }

    /// Swap in a fresh settings snapshot
    pub fn apply_settings(&self, settings: AlertSettings) {
        *self.settings.write() = settings;
    }

    pub fn settings(&self) -> AlertSettings {
        self.settings.read().clone()
    }

    pub fn channel_status(&self) -> ChannelStatus {
        self.settings.read().channel_status()
    }

    /// Reset the session log at the start of a poll cycle
    pub fn begin_cycle(&self) {
        self.session.lock().clear();
    }

    /// Messages delivered since the last `begin_cycle`, oldest first
    pub fn session_alerts(&self) -> Vec<String> {
        self.session.lock().clone()
    }

    /// Record an observation and alert if it flips the stored status
    ///
    /// The first observation of a miner only sets its baseline. The new
    /// status is persisted before delivery is attempted and is kept even if
    /// delivery fails.
    pub async fn evaluate_liveness(
        &self,
        miner_id: &str,
        observed_offline: bool,
        now: i64,
    ) -> Option<AlertEvent> {
        let current = MinerStatus::from_offline(observed_offline);
        let mut statuses = self.store.load_status();
        let previous = statuses.insert(miner_id.to_string(), current);

        tracing::debug!(
            miner = %event::short_id(miner_id),
            current = %current,
            previous = ?previous,
            "Liveness observation"
        );

        if previous == Some(current) {
            return None;
        }

        if let Err(e) = self.store.save_status(&statuses) {
            tracing::error!(
                miner = %event::short_id(miner_id),
                error = %e,
                "Failed to persist miner status"
            );
        }

        // First sighting is a baseline, not a transition.
        if previous.is_none() {
            return None;
        }

        let (kind, message) = if current.is_offline() {
            (AlertKind::Offline, event::offline_message(miner_id))
        } else {
            (AlertKind::Online, event::online_message(miner_id))
        };

        let delivered = self.send(&message, false).await;

        Some(AlertEvent {
            kind,
            miner_id: miner_id.to_string(),
            message,
            at: now,
            delivered,
        })
    }

    /// Alert when `balance` is strictly below a threshold; critical wins over low
    pub async fn evaluate_balance(
        &self,
        miner_id: &str,
        balance: f64,
        now: i64,
    ) -> Option<AlertEvent> {
        let (critical, low) = {
            let settings = self.settings.read();
            (settings.critical_balance_alert, settings.low_balance_alert)
        };

        let (kind, message) = if balance < critical {
            (
                AlertKind::CriticalBalance,
                event::critical_balance_message(miner_id, balance),
            )
        } else if balance < low {
            (
                AlertKind::LowBalance,
                event::low_balance_message(miner_id, balance),
            )
        } else {
            return None;
        };

        let delivered = self.send(&message, false).await;

        Some(AlertEvent {
            kind,
            miner_id: miner_id.to_string(),
            message,
            at: now,
            delivered,
        })
    }

    /// Deliver `message`, returning whether the channel accepted it
    ///
    /// Unless `skip_duplicate_check` is set, the sent set is reloaded from
    /// disk first and a message already in it is dropped without a network
    /// call. Failures leave all state untouched.
    pub async fn send(&self, message: &str, skip_duplicate_check: bool) -> bool {
        let Some(credentials) = ready_credentials(&self.settings.read()) else {
            return false;
        };
        self.deliver(&credentials, message, skip_duplicate_check).await
    }

    /// Deliver `message` with the channel settings in `settings`
    ///
    /// Used outside the poll cycle (digests), so the cycle's settings
    /// snapshot is left alone. No de-duplication.
    pub async fn send_with(&self, message: &str, settings: &AlertSettings) -> bool {
        let Some(credentials) = ready_credentials(settings) else {
            return false;
        };
        self.deliver(&credentials, message, true).await
    }

    async fn deliver(
        &self,
        credentials: &Credentials,
        message: &str,
        skip_duplicate_check: bool,
    ) -> bool {
        if !skip_duplicate_check && self.store.load_sent().contains(message) {
            tracing::info!(message = %message, "Skipping duplicate alert");
            return false;
        }

        if let Err(e) = self.channel.deliver(credentials, message).await {
            tracing::error!(error = %e, message = %message, "Failed to send alert");
            return false;
        }

        tracing::info!(message = %message, "Alert sent");
        self.session.lock().push(message.to_string());

        if !skip_duplicate_check {
            // Reload again so concurrent writers' entries survive our rewrite.
            let mut sent = self.store.load_sent();
            sent.insert(message.to_string());
            if let Err(e) = self.store.save_sent(&sent) {
                tracing::error!(error = %e, "Failed to persist sent alerts");
            }
        }

        true
    }

    /// Send the fixed test message with `settings`, bypassing
    /// de-duplication and the session log
    pub async fn send_test(&self, settings: &AlertSettings) -> bool {
        let Some(credentials) = ready_credentials(settings) else {
            return false;
        };

        match self.channel.deliver(&credentials, TEST_MESSAGE).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(error = %e, "Error sending test message");
                false
            }
        }
    }

    /// Forget every sent alert and every stored status
    pub fn clear_history(&self) -> Result<(), PersistenceError> {
        self.store.clear_all()
    }
}

fn ready_credentials(settings: &AlertSettings) -> Option<Credentials> {
    if !settings.telegram_enabled {
        tracing::info!("Telegram alerts are disabled");
        return None;
    }

    let credentials = settings.credentials();
    if credentials.is_none() {
        tracing::warn!("Telegram bot token or chat ID is missing");
    }
    credentials
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::testing::RecordingChannel;
    use crate::store::StatusMap;

    const MINER: &str = "0xABCD00000000000000000000000000000000001234";

    fn ready_settings() -> AlertSettings {
        AlertSettings {
            telegram_enabled: true,
            bot_token: "token".to_string(),
            chat_id: "chat".to_string(),
            ..Default::default()
        }
    }

    fn engine_in(dir: &std::path::Path, channel: Arc<RecordingChannel>) -> AlertEngine {
        AlertEngine::new(StateStore::open(dir), channel, ready_settings())
    }

    #[tokio::test]
    async fn test_first_observation_is_baseline() {
        let dir = tempfile::tempdir().unwrap();
        let channel = Arc::new(RecordingChannel::new());
        let engine = engine_in(dir.path(), channel.clone());

        assert!(engine.evaluate_liveness(MINER, true, 0).await.is_none());
        assert!(engine.evaluate_liveness(MINER, true, 60).await.is_none());

        let stored = StateStore::open(dir.path()).load_status();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored.get(MINER), Some(&MinerStatus::Offline));
        assert_eq!(channel.call_count(), 0);
    }

    #[tokio::test]
    async fn test_repeated_offline_alerts_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(dir.path());
        let mut map = StatusMap::new();
        map.insert(MINER.to_string(), MinerStatus::Online);
        store.save_status(&map).unwrap();

        let channel = Arc::new(RecordingChannel::new());
        let engine = engine_in(dir.path(), channel.clone());

        let first = engine.evaluate_liveness(MINER, true, 0).await;
        let second = engine.evaluate_liveness(MINER, true, 60).await;

        assert_eq!(first.map(|e| e.kind), Some(AlertKind::Offline));
        assert!(second.is_none());
        assert_eq!(channel.call_count(), 1);
    }

    #[tokio::test]
    async fn test_transition_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let channel = Arc::new(RecordingChannel::new());
        let engine = engine_in(dir.path(), channel.clone());
        let store = StateStore::open(dir.path());

        // baseline
        engine.evaluate_liveness(MINER, false, -60).await;

        let a = engine.evaluate_liveness(MINER, true, 0).await.unwrap();
        assert_eq!(a.message, "🚨 Miner OFFLINE: 0xABCD...1234");
        assert!(a.delivered);
        assert_eq!(store.load_status().get(MINER), Some(&MinerStatus::Offline));

        assert!(engine.evaluate_liveness(MINER, true, 60).await.is_none());

        let b = engine.evaluate_liveness(MINER, false, 120).await.unwrap();
        assert_eq!(b.message, "✅ Miner BACK ONLINE: 0xABCD...1234");
        assert_ne!(a.message, b.message);
        assert_eq!(b.at, 120);
        assert_eq!(store.load_status().get(MINER), Some(&MinerStatus::Online));

        assert_eq!(channel.sent(), vec![a.message, b.message]);
    }

    #[tokio::test]
    async fn test_alert_count_matches_flips() {
        let dir = tempfile::tempdir().unwrap();
        let channel = Arc::new(RecordingChannel::new());
        let engine = engine_in(dir.path(), channel.clone());

        let observations = [false, false, true, true, true, false, true, false, false];
        let mut fired = 0;
        for (t, offline) in observations.iter().enumerate() {
            if engine.evaluate_liveness(MINER, *offline, t as i64).await.is_some() {
                fired += 1;
            }
        }

        let flips = observations.windows(2).filter(|w| w[0] != w[1]).count();
        assert_eq!(fired, flips);
    }

    #[tokio::test]
    async fn test_failed_delivery_keeps_transition() {
        let dir = tempfile::tempdir().unwrap();
        let channel = Arc::new(RecordingChannel::failing());
        let engine = engine_in(dir.path(), channel.clone());

        engine.evaluate_liveness(MINER, false, 0).await;
        let event = engine.evaluate_liveness(MINER, true, 60).await.unwrap();

        assert!(!event.delivered);
        assert_eq!(
            StateStore::open(dir.path()).load_status().get(MINER),
            Some(&MinerStatus::Offline)
        );
        assert!(StateStore::open(dir.path()).load_sent().is_empty());
        assert!(engine.session_alerts().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_message_skips_network() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(dir.path());
        store.save_sent(&["already".to_string()].into()).unwrap();

        let channel = Arc::new(RecordingChannel::new());
        let engine = engine_in(dir.path(), channel.clone());

        assert!(!engine.send("already", false).await);
        assert_eq!(channel.call_count(), 0);

        assert!(engine.send("already", true).await);
        assert_eq!(channel.call_count(), 1);
    }

    #[tokio::test]
    async fn test_sent_set_picks_up_other_writers() {
        let dir = tempfile::tempdir().unwrap();
        let channel = Arc::new(RecordingChannel::new());
        let engine = engine_in(dir.path(), channel.clone());

        // Another process records the message after the engine was built.
        StateStore::open(dir.path())
            .save_sent(&["written elsewhere".to_string()].into())
            .unwrap();

        assert!(!engine.send("written elsewhere", false).await);
        assert_eq!(channel.call_count(), 0);
    }

    #[tokio::test]
    async fn test_send_records_session_and_sent_set() {
        let dir = tempfile::tempdir().unwrap();
        let channel = Arc::new(RecordingChannel::new());
        let engine = engine_in(dir.path(), channel.clone());

        assert!(engine.send("deduped", false).await);
        assert!(engine.send("digest", true).await);

        assert_eq!(engine.session_alerts(), vec!["deduped", "digest"]);
        let sent = StateStore::open(dir.path()).load_sent();
        assert!(sent.contains("deduped"));
        assert!(!sent.contains("digest"));

        engine.begin_cycle();
        assert!(engine.session_alerts().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_channel_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let channel = Arc::new(RecordingChannel::new());
        let engine = engine_in(dir.path(), channel.clone());

        engine.apply_settings(AlertSettings::default());
        assert_eq!(engine.channel_status(), ChannelStatus::Disabled);
        assert!(!engine.send("hello", false).await);

        engine.apply_settings(AlertSettings {
            telegram_enabled: true,
            ..Default::default()
        });
        assert_eq!(engine.channel_status(), ChannelStatus::MissingCredentials);
        assert!(!engine.send("hello", false).await);
        assert!(!engine.send_test(&engine.settings()).await);

        assert_eq!(channel.call_count(), 0);
    }

    #[tokio::test]
    async fn test_critical_wins_over_low() {
        let dir = tempfile::tempdir().unwrap();
        let channel = Arc::new(RecordingChannel::new());
        let engine = engine_in(dir.path(), channel.clone());

        let event = engine.evaluate_balance(MINER, 0.05, 0).await.unwrap();
        assert_eq!(event.kind, AlertKind::CriticalBalance);
        assert!(event.message.starts_with("CRITICAL"));

        assert_eq!(channel.call_count(), 1);
        assert!(channel.sent().iter().all(|m| !m.starts_with("WARNING")));
    }

    #[tokio::test]
    async fn test_balance_thresholds_are_strict() {
        let dir = tempfile::tempdir().unwrap();
        let channel = Arc::new(RecordingChannel::new());
        let engine = engine_in(dir.path(), channel.clone());

        assert!(engine.evaluate_balance(MINER, 0.5, 0).await.is_none());
        assert!(engine.evaluate_balance(MINER, 1.0, 0).await.is_none());

        let event = engine.evaluate_balance(MINER, 0.1, 0).await.unwrap();
        assert_eq!(event.kind, AlertKind::LowBalance);
    }

    #[tokio::test]
    async fn test_repeated_balance_is_suppressed_by_text() {
        let dir = tempfile::tempdir().unwrap();
        let channel = Arc::new(RecordingChannel::new());
        let engine = engine_in(dir.path(), channel.clone());

        let first = engine.evaluate_balance(MINER, 0.3, 0).await.unwrap();
        let repeat = engine.evaluate_balance(MINER, 0.3, 0).await.unwrap();
        let changed = engine.evaluate_balance(MINER, 0.29, 0).await.unwrap();

        assert!(first.delivered);
        assert!(!repeat.delivered);
        assert!(changed.delivered);
        assert_eq!(channel.call_count(), 2);
    }

    #[tokio::test]
    async fn test_clear_history_allows_resend() {
        let dir = tempfile::tempdir().unwrap();
        let channel = Arc::new(RecordingChannel::new());
        let engine = engine_in(dir.path(), channel.clone());

        assert!(engine.send("once", false).await);
        assert!(!engine.send("once", false).await);

        engine.clear_history().unwrap();
        assert!(engine.send("once", false).await);
        assert_eq!(channel.call_count(), 2);
    }

    #[tokio::test]
    async fn test_balance_event_uses_cycle_clock() {
        let dir = tempfile::tempdir().unwrap();
        let channel = Arc::new(RecordingChannel::new());
        let engine = engine_in(dir.path(), channel.clone());

        let event = engine.evaluate_balance(MINER, 0.05, 1_234).await.unwrap();
        assert_eq!(event.at, 1_234);
    }

    #[tokio::test]
    async fn test_out_of_cycle_sends_leave_settings_alone() {
        let dir = tempfile::tempdir().unwrap();
        let channel = Arc::new(RecordingChannel::new());
        let engine = AlertEngine::new(
            StateStore::open(dir.path()),
            channel.clone(),
            AlertSettings::default(),
        );

        assert!(engine.send_test(&ready_settings()).await);
        assert!(engine.send_with("digest", &ready_settings()).await);
        assert!(engine.send_with("digest", &ready_settings()).await);
        assert!(!engine.send_with("digest", &AlertSettings::default()).await);

        assert_eq!(engine.settings(), AlertSettings::default());
        assert_eq!(channel.call_count(), 3);
        assert!(StateStore::open(dir.path()).load_sent().is_empty());
    }

    #[tokio::test]
    async fn test_send_test_bypasses_dedup() {
        let dir = tempfile::tempdir().unwrap();
        let channel = Arc::new(RecordingChannel::new());
        let engine = engine_in(dir.path(), channel.clone());

        assert!(engine.send_test(&engine.settings()).await);
        assert!(engine.send_test(&engine.settings()).await);
        assert_eq!(channel.sent(), vec![TEST_MESSAGE, TEST_MESSAGE]);
        assert!(engine.session_alerts().is_empty());
        assert!(StateStore::open(dir.path()).load_sent().is_empty());
    }
}
