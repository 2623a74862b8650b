//! Leaderboard HTTP client

use std::time::Duration;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::stats::{describe_last_active, MinerStats, StageCounter};
use super::FetchError;

/// One miner object as listed by the leaderboard
///
/// Only `miner` is required. Every other field is read leniently: a missing
/// or wrongly typed value counts as absent, so missing counters become 1 and
/// missing points become 0. Numeric strings are accepted.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub miner: String,
    #[serde(rename = "ping_counter", default, deserialize_with = "lenient_count")]
    pub ping_counter: Option<u64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub precommit_point: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub precommit_counter: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub commit_point: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub commit_counter: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub prepare_point: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub prepare_counter: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub create_point: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub create_counter: Option<f64>,
    /// Unix seconds
    #[serde(rename = "last_active", default, deserialize_with = "lenient_number")]
    pub last_active: Option<f64>,
}

fn number_from(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|n| n.is_finite())
}

fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(number_from))
}

fn lenient_count<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(number_from)
        .filter(|n| *n >= 0.0)
        .map(|n| n as u64))
}

fn stage(point: Option<f64>, counter: Option<f64>) -> StageCounter {
    StageCounter::new(point.unwrap_or(0.0), counter.unwrap_or(1.0))
}

impl LeaderboardEntry {
    /// Convert to a stats row; the balance is filled in separately
    pub fn to_stats(&self, balance: Option<f64>, now: i64) -> MinerStats {
        let last_active_timestamp = self.last_active.unwrap_or(0.0) as i64;

        MinerStats {
            ping: self.ping_counter.unwrap_or(0),
            precommit: stage(self.precommit_point, self.precommit_counter),
            commit: stage(self.commit_point, self.commit_counter),
            prepare: stage(self.prepare_point, self.prepare_counter),
            create: stage(self.create_point, self.create_counter),
            last_active: describe_last_active(last_active_timestamp, now),
            last_active_timestamp,
            eth_balance: balance,
        }
    }
}

/// Client for the leaderboard listing
#[derive(Debug, Clone)]
pub struct LeaderboardClient {
    http_client: reqwest::Client,
    url: String,
}

impl LeaderboardClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http_client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            url: url.into(),
        }
    }

    /// Fetch every listed miner
    ///
    /// Entries without a `miner` address are skipped rather than failing the
    /// batch.
    pub async fn fetch(&self) -> Result<Vec<LeaderboardEntry>, FetchError> {
        let response = self
            .http_client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FetchError::Status(response.status().as_u16()));
        }

        let raw: Vec<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| FetchError::Deserialization(e.to_string()))?;

        Ok(parse_entries(raw))
    }
}

pub(crate) fn parse_entries(raw: Vec<serde_json::Value>) -> Vec<LeaderboardEntry> {
    raw.into_iter()
        .filter_map(|value| match serde_json::from_value::<LeaderboardEntry>(value) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping leaderboard entry without a miner address");
                None
            }
        })
        .collect()
}
