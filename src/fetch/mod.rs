//! Stats collection from the leaderboard and the chain
//!
//! Both upstreams may fail independently. A failed leaderboard fetch yields
//! an empty snapshot (every miner reads as offline) and a failed balance
//! query yields an unknown balance; neither aborts the cycle.

pub mod leaderboard;
pub mod rpc;
pub mod stats;

pub use leaderboard::{LeaderboardClient, LeaderboardEntry};
pub use rpc::BalanceClient;
pub use stats::{describe_last_active, MinerStats, RpcMeta, Stage, StageCounter, StatsSnapshot};

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use crate::miners::is_valid_address;
use crate::store::JsonUnit;

pub const STATS_FILE: &str = "stats.json";

/// Produces one snapshot per poll cycle
#[async_trait]
pub trait StatsSource: Send + Sync {
    /// Collect stats for `miners`; never fails, degrades to missing data
    async fn collect(&self, miners: &[String], now: i64) -> StatsSnapshot;
}

/// Leaderboard + JSON-RPC stats source
pub struct HttpStatsSource {
    leaderboard: LeaderboardClient,
    balances: BalanceClient,
    max_concurrency: usize,
    /// Where the raw blob is written after each collection
    blob: Option<JsonUnit<StatsSnapshot>>,
}

impl HttpStatsSource {
    pub fn new(leaderboard: LeaderboardClient, balances: BalanceClient) -> Self {
        Self {
            leaderboard,
            balances,
            max_concurrency: 16,
            blob: None,
        }
    }

    /// Cap on in-flight balance queries
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Write `stats.json` to `path` after every collection
    pub fn with_blob_path(mut self, path: impl Into<PathBuf>) -> Self {
        let path: PathBuf = path.into();
        self.blob = Some(JsonUnit::new(path));
        self
    }

    async fn fetch_balances(&self, miners: &[String]) -> HashMap<String, f64> {
        let client = &self.balances;
        let valid: Vec<String> = miners
            .iter()
            .filter(|m| is_valid_address(m))
            .cloned()
            .collect();

        stream::iter(valid)
            .map(|address| async move {
                let result = client.balance(&address).await;
                (address, result)
            })
            .buffer_unordered(self.max_concurrency)
            .filter_map(|(address, result)| async move {
                match result {
                    Ok(balance) => Some((address, balance)),
                    Err(e) => {
                        tracing::warn!(miner = %address, error = %e, "Balance query failed");
                        None
                    }
                }
            })
            .collect()
            .await
    }
}

#[async_trait]
impl StatsSource for HttpStatsSource {
    async fn collect(&self, miners: &[String], now: i64) -> StatsSnapshot {
        let (entries, balances) =
            tokio::join!(self.leaderboard.fetch(), self.fetch_balances(miners));

        let entries = entries.unwrap_or_else(|e| {
            tracing::error!(error = %e, "Leaderboard fetch failed");
            Vec::new()
        });

        let snapshot = build_snapshot(
            miners,
            &entries,
            &balances,
            RpcMeta {
                rpc_call_count: self.balances.call_count(),
                timestamp: now,
            },
            now,
        );

        if let Some(blob) = &self.blob {
            if let Err(e) = blob.save(&snapshot) {
                tracing::warn!(path = %blob.path().display(), error = %e, "Failed to write stats blob");
            }
        }

        tracing::debug!(
            listed = entries.len(),
            tracked = snapshot.miners.len(),
            balances = balances.len(),
            "Stats collected"
        );

        snapshot
    }
}

/// Keep only registered miners from the leaderboard and attach balances
pub fn build_snapshot(
    miners: &[String],
    entries: &[LeaderboardEntry],
    balances: &HashMap<String, f64>,
    meta: RpcMeta,
    now: i64,
) -> StatsSnapshot {
    let registered: HashSet<&str> = miners.iter().map(String::as_str).collect();

    let miners = entries
        .iter()
        .filter(|entry| registered.contains(entry.miner.as_str()))
        .map(|entry| {
            let balance = balances.get(&entry.miner).copied();
            (entry.miner.clone(), entry.to_stats(balance, now))
        })
        .collect();

    StatsSnapshot { meta, miners }
}

/// Fetch errors
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Unexpected status {0}")]
    Status(u16),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_build_snapshot_filters_unregistered() {
        let entries = leaderboard::parse_entries(vec![
            serde_json::json!({ "miner": "0xaaa", "last_active": 100 }),
            serde_json::json!({ "miner": "0xstranger", "last_active": 100 }),
        ]);
        let mut balances = HashMap::new();
        balances.insert("0xaaa".to_string(), 0.75);

        let miners = vec!["0xaaa".to_string(), "0xmissing".to_string()];
        let snapshot = build_snapshot(&miners, &entries, &balances, RpcMeta::default(), 160);

        assert_eq!(snapshot.miners.len(), 1);
        let stats = snapshot.get("0xaaa").unwrap();
        assert_eq!(stats.eth_balance, Some(0.75));
        assert_eq!(stats.last_active, "1 min 0 sec ago");
        assert!(snapshot.get("0xmissing").is_none());
    }

    #[test]
    fn test_mistyped_entry_keeps_miner_online() {
        let miner = "0x1234567890abcdef1234567890abcdef12345678";
        let entries = leaderboard::parse_entries(vec![serde_json::json!({
            "miner": miner,
            "last_active": 1000,
            "ping_counter": 12.0,
            "precommitPoint": 3
        })]);

        let miners = vec![miner.to_string()];
        let snapshot = build_snapshot(&miners, &entries, &HashMap::new(), RpcMeta::default(), 1010);

        let stats = snapshot.get(miner).unwrap();
        assert_eq!(stats.ping, 12);
        assert!(!stats.is_offline(1010, 300));
    }

    #[tokio::test]
    async fn test_unreachable_upstreams_degrade_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let source = HttpStatsSource::new(
            LeaderboardClient::new("http://127.0.0.1:1/leaderboard", Duration::from_millis(500)),
            BalanceClient::new("http://127.0.0.1:1", Duration::from_millis(500)),
        )
        .with_max_concurrency(2)
        .with_blob_path(dir.path().join(STATS_FILE));

        let miners = vec!["0x1234567890abcdef1234567890abcdef12345678".to_string()];
        let snapshot = source.collect(&miners, 1_000).await;

        assert!(snapshot.miners.is_empty());
        assert_eq!(snapshot.meta.timestamp, 1_000);

        let written: StatsSnapshot =
            serde_json::from_slice(&std::fs::read(dir.path().join(STATS_FILE)).unwrap()).unwrap();
        assert_eq!(written, snapshot);
    }
}
