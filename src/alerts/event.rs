//! Alert events and their message text

use serde::{Deserialize, Serialize};

/// The fixed set of things the engine alerts on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Offline,
    Online,
    CriticalBalance,
    LowBalance,
}

/// A fired alert, returned whether or not delivery succeeded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub kind: AlertKind,
    pub miner_id: String,
    pub message: String,
    /// Unix seconds
    pub at: i64,
    pub delivered: bool,
}

/// `0xABCD...1234`: first 6 and last 4 characters of an id
pub fn short_id(miner_id: &str) -> String {
    format!("{}...{}", head(miner_id, 6), tail(miner_id, 4))
}

fn head(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

fn tail(s: &str, n: usize) -> &str {
    let count = s.chars().count();
    if count <= n {
        return s;
    }
    match s.char_indices().nth(count - n) {
        Some((idx, _)) => &s[idx..],
        None => s,
    }
}

pub fn offline_message(miner_id: &str) -> String {
    format!("🚨 Miner OFFLINE: {}", short_id(miner_id))
}

pub fn online_message(miner_id: &str) -> String {
    format!("✅ Miner BACK ONLINE: {}", short_id(miner_id))
}

/// Whole amounts keep a trailing `.0` so the text stays stable for de-duplication
fn eth_amount(balance: f64) -> String {
    if balance.is_finite() && balance.fract() == 0.0 {
        format!("{:.1}", balance)
    } else {
        balance.to_string()
    }
}

pub fn critical_balance_message(miner_id: &str, balance: f64) -> String {
    format!(
        "CRITICAL: Miner {}... balance {} ETH",
        head(miner_id, 6),
        eth_amount(balance)
    )
}

pub fn low_balance_message(miner_id: &str, balance: f64) -> String {
    format!(
        "WARNING: Miner {}... balance {} ETH",
        head(miner_id, 6),
        eth_amount(balance)
    )
}
