//! Poll cycle driver
//!
//! One cycle: reload settings, fetch stats for every registered miner,
//! evaluate each miner through the alert engine one at a time, and publish
//! a report. Cycles never overlap; a request that arrives while one is in
//! flight is rejected.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::time;

use crate::alerts::{AlertEngine, AlertEvent};
use crate::config::ConfigFile;
use crate::fetch::{MinerStats, StatsSnapshot, StatsSource};
use crate::miners::MinerRegistry;

/// One miner's line in a cycle report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinerRow {
    pub miner_id: String,
    pub is_offline: bool,
    /// `None` when the miner was not on the leaderboard this cycle
    pub stats: Option<MinerStats>,
}

/// Result of one poll cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    /// Unix seconds
    pub generated_at: i64,
    pub rows: Vec<MinerRow>,
    /// Events fired this cycle, delivered or not
    pub events: Vec<AlertEvent>,
    /// Messages actually delivered this cycle
    pub alerts: Vec<String>,
    pub rpc_call_count: u64,
}

/// Owns the polling cadence and all cross-cycle state
pub struct PollingDriver {
    registry: Arc<MinerRegistry>,
    source: Arc<dyn StatsSource>,
    engine: Arc<AlertEngine>,
    config: ConfigFile,
    interval: Duration,
    running: Arc<AtomicBool>,
    shutdown: Notify,
    busy: AtomicBool,
    /// Set after the first completed cycle; balance alerts wait for it
    initialized: AtomicBool,
    last_report: RwLock<Option<CycleReport>>,
    last_snapshot: RwLock<Option<StatsSnapshot>>,
}

/// Clears the busy flag when a cycle ends, however it ends
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl PollingDriver {
    pub fn new(
        registry: Arc<MinerRegistry>,
        source: Arc<dyn StatsSource>,
        engine: Arc<AlertEngine>,
        config: ConfigFile,
        interval: Duration,
    ) -> Self {
        Self {
            registry,
            source,
            engine,
            config,
            interval,
            running: Arc::new(AtomicBool::new(false)),
            shutdown: Notify::new(),
            busy: AtomicBool::new(false),
            initialized: AtomicBool::new(false),
            last_report: RwLock::new(None),
            last_snapshot: RwLock::new(None),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    pub fn last_report(&self) -> Option<CycleReport> {
        self.last_report.read().clone()
    }

    pub fn last_snapshot(&self) -> Option<StatsSnapshot> {
        self.last_snapshot.read().clone()
    }

    /// Run one full cycle at `now` (unix seconds)
    pub async fn run_cycle(&self, now: i64) -> Result<CycleReport, DriverError> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(DriverError::Busy);
        }
        let _guard = BusyGuard(&self.busy);

        let settings = self.config.load().alert_settings;
        let offline_after = settings.offline_after_seconds();
        self.engine.apply_settings(settings);
        self.engine.begin_cycle();

        let miners = self.registry.load();
        let snapshot = self.source.collect(&miners, now).await;
        let check_balances = self.initialized.load(Ordering::SeqCst);

        let mut rows = Vec::with_capacity(miners.len());
        let mut events = Vec::new();

        for miner_id in &miners {
            let stats = snapshot.get(miner_id).cloned();
            let is_offline = stats
                .as_ref()
                .map(|s| s.is_offline(now, offline_after))
                .unwrap_or(true);

            if let Some(event) = self.engine.evaluate_liveness(miner_id, is_offline, now).await {
                events.push(event);
            }

            if check_balances {
                if let Some(balance) = stats.as_ref().and_then(|s| s.eth_balance) {
                    let event = self.engine.evaluate_balance(miner_id, balance, now).await;
                    if let Some(event) = event {
                        events.push(event);
                    }
                }
            }

            rows.push(MinerRow {
                miner_id: miner_id.clone(),
                is_offline,
                stats,
            });
        }

        let report = CycleReport {
            generated_at: now,
            rows,
            events,
            alerts: self.engine.session_alerts(),
            rpc_call_count: snapshot.meta.rpc_call_count,
        };

        tracing::info!(
            miners = miners.len(),
            events = report.events.len(),
            delivered = report.alerts.len(),
            "Poll cycle complete"
        );

        *self.last_snapshot.write() = Some(snapshot);
        *self.last_report.write() = Some(report.clone());
        self.initialized.store(true, Ordering::SeqCst);

        Ok(report)
    }

    /// Start the background polling loop
    ///
    /// Only the wait between ticks races against shutdown; a cycle that has
    /// started always runs to completion.
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);

        tokio::spawn(async move {
            tracing::info!("Polling driver started with interval {:?}", self.interval);

            let mut interval = time::interval(self.interval);

            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = self.shutdown.notified() => break,
                }
                if !self.running.load(Ordering::SeqCst) {
                    break;
                }

                let now = chrono::Utc::now().timestamp();
                match self.run_cycle(now).await {
                    Ok(_) => {}
                    Err(DriverError::Busy) => {
                        tracing::debug!("Previous cycle still running, tick skipped");
                    }
                }
            }

            self.running.store(false, Ordering::SeqCst);
            tracing::info!("Polling driver stopped");
        })
    }

    /// Stop the loop once the current cycle, if any, has finished
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.shutdown.notify_one();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("A poll cycle is already running")]
    Busy,
}
