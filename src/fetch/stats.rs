//! Per-miner stats as collected each cycle

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Points scored against attempts for one pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StageCounter {
    #[serde(default)]
    pub point: f64,
    #[serde(default = "default_counter")]
    pub counter: f64,
}

fn default_counter() -> f64 {
    1.0
}

impl Default for StageCounter {
    fn default() -> Self {
        Self {
            point: 0.0,
            counter: default_counter(),
        }
    }
}

impl StageCounter {
    pub fn new(point: f64, counter: f64) -> Self {
        Self { point, counter }
    }

    /// Success rate in percent, one decimal place
    pub fn percent(&self) -> f64 {
        if self.counter == 0.0 {
            return 0.0;
        }
        round_to(self.point / self.counter * 100.0, 1)
    }
}

/// One miner's row in the raw stats blob
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinerStats {
    #[serde(default)]
    pub ping: u64,
    #[serde(default)]
    pub precommit: StageCounter,
    #[serde(default)]
    pub commit: StageCounter,
    #[serde(default)]
    pub prepare: StageCounter,
    #[serde(default)]
    pub create: StageCounter,
    /// Human-readable age, e.g. `3 min 12 sec ago`
    #[serde(default)]
    pub last_active: String,
    /// Unix seconds; 0 when unknown
    #[serde(default)]
    pub last_active_timestamp: i64,
    /// `None` when the balance query failed or was skipped
    #[serde(default)]
    pub eth_balance: Option<f64>,
}

impl MinerStats {
    pub fn stage(&self, stage: Stage) -> &StageCounter {
        match stage {
            Stage::Precommit => &self.precommit,
            Stage::Commit => &self.commit,
            Stage::Prepare => &self.prepare,
            Stage::Create => &self.create,
        }
    }

    /// Offline when never active or idle for longer than `offline_after_seconds`
    pub fn is_offline(&self, now: i64, offline_after_seconds: i64) -> bool {
        if self.last_active_timestamp <= 0 {
            return true;
        }
        now - self.last_active_timestamp > offline_after_seconds
    }
}

/// The four pipeline stages reported by the leaderboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Precommit,
    Commit,
    Prepare,
    Create,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::Precommit, Stage::Commit, Stage::Prepare, Stage::Create];

    pub fn name(self) -> &'static str {
        match self {
            Stage::Precommit => "precommit",
            Stage::Commit => "commit",
            Stage::Prepare => "prepare",
            Stage::Create => "create",
        }
    }
}

/// Bookkeeping written alongside the stats
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RpcMeta {
    pub rpc_call_count: u64,
    pub timestamp: i64,
}

/// Everything fetched in one cycle, keyed by miner id
///
/// Serializes to the `stats.json` layout: one key per miner plus
/// `__rpc_meta__`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    #[serde(rename = "__rpc_meta__", default)]
    pub meta: RpcMeta,
    #[serde(flatten)]
    pub miners: BTreeMap<String, MinerStats>,
}

impl StatsSnapshot {
    pub fn get(&self, miner_id: &str) -> Option<&MinerStats> {
        self.miners.get(miner_id)
    }
}

/// Render a last-active timestamp relative to `now`
pub fn describe_last_active(timestamp: i64, now: i64) -> String {
    if timestamp <= 0 {
        return "Unknown".to_string();
    }

    let seconds = (now - timestamp).max(0);
    if seconds < 60 {
        format!("{} sec ago", seconds)
    } else if seconds < 3600 {
        format!("{} min {} sec ago", seconds / 60, seconds % 60)
    } else if seconds < 86400 {
        format!("{} hr {} min ago", seconds / 3600, (seconds % 3600) / 60)
    } else {
        format!("{} days ago", seconds / 86400)
    }
}

pub(crate) fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
