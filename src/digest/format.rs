//! Digest message layout

use serde::{Deserialize, Serialize};

use crate::fetch::{MinerStats, Stage, StatsSnapshot};

pub const EMPTY_DIGEST: &str = "Stats Bot Test: No real data matched. Test message.";

/// A column that can be included in the digest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Ping,
    Precommit,
    Commit,
    Prepare,
    Create,
    EthBalance,
}

impl Metric {
    pub const ALL: [Metric; 6] = [
        Metric::Ping,
        Metric::Precommit,
        Metric::Commit,
        Metric::Prepare,
        Metric::Create,
        Metric::EthBalance,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Metric::Ping => "ping",
            Metric::Precommit => "PC",
            Metric::Commit => "CO",
            Metric::Prepare => "PP",
            Metric::Create => "CR",
            Metric::EthBalance => "eth",
        }
    }

    fn stage(self) -> Option<Stage> {
        match self {
            Metric::Precommit => Some(Stage::Precommit),
            Metric::Commit => Some(Stage::Commit),
            Metric::Prepare => Some(Stage::Prepare),
            Metric::Create => Some(Stage::Create),
            Metric::Ping | Metric::EthBalance => None,
        }
    }

    fn number(self, stats: &MinerStats) -> Option<f64> {
        match self {
            Metric::Ping => Some(stats.ping as f64),
            Metric::EthBalance => stats.eth_balance,
            _ => None,
        }
    }
}

/// Layout switches for one digest
#[derive(Debug, Clone, Default)]
pub struct DigestLayout<'a> {
    pub metrics: &'a [Metric],
    pub include_header: bool,
    /// Leading `📅 <timestamp>` line
    pub timestamp: Option<&'a str>,
    /// Snapshot to diff against, when comparing over time
    pub previous: Option<&'a StatsSnapshot>,
}

/// Render one line per miner, separated by blank lines
pub fn render(snapshot: &StatsSnapshot, layout: &DigestLayout<'_>) -> String {
    let mut lines = Vec::new();

    if let Some(timestamp) = layout.timestamp {
        lines.push(format!("📅 {}", timestamp));
    }

    for (addr, stats) in &snapshot.miners {
        let previous = layout.previous.and_then(|p| p.get(addr));
        let mut parts = Vec::new();

        if layout.include_header {
            parts.push(format!("...{}:", last_chars(addr, 5)));
        }

        for metric in layout.metrics {
            parts.push(render_metric(*metric, stats, previous, layout.previous.is_some()));
        }

        if !parts.is_empty() {
            lines.push(parts.join(" | "));
        }
    }

    if lines.is_empty() {
        EMPTY_DIGEST.to_string()
    } else {
        lines.join("\n\n")
    }
}

fn render_metric(
    metric: Metric,
    stats: &MinerStats,
    previous: Option<&MinerStats>,
    compare: bool,
) -> String {
    let label = metric.label();

    if let Some(stage) = metric.stage() {
        let counter = stats.stage(stage);
        let percent = counter.percent();
        let mut text = format!(
            "{}: {}/{} ({:.1}%)",
            label, counter.point, counter.counter, percent
        );

        if compare {
            let prev_percent = previous.map(|p| p.stage(stage).percent()).unwrap_or(0.0);
            text.push_str(&delta(percent - prev_percent, "%"));
        }
        return text;
    }

    match metric.number(stats) {
        Some(value) => {
            let shown = if metric == Metric::Ping {
                (value as i64).to_string()
            } else if value.is_finite() && value.fract() == 0.0 {
                format!("{:.1}", value)
            } else {
                value.to_string()
            };
            let mut text = format!("{}: {}", label, shown);
            if compare {
                if let Some(prev) = previous.and_then(|p| metric.number(p)) {
                    let diff = value - prev;
                    if metric == Metric::Ping {
                        text.push_str(&count_delta(diff as i64));
                    } else {
                        text.push_str(&delta(diff, ""));
                    }
                }
            }
            text
        }
        None => format!("{}: N/A", label),
    }
}

fn delta(diff: f64, unit: &str) -> String {
    let diff = (diff * 10.0).round() / 10.0;
    if diff > 0.0 {
        format!(" 🟢▲{:.1}{}", diff, unit)
    } else if diff < 0.0 {
        format!(" 🔴▼{:.1}{}", diff.abs(), unit)
    } else {
        format!(" ➖0.0{}", unit)
    }
}

/// Ping is a whole count, so its change has no decimal part
fn count_delta(diff: i64) -> String {
    if diff > 0 {
        format!(" 🟢▲{}", diff)
    } else if diff < 0 {
        format!(" 🔴▼{}", diff.abs())
    } else {
        " ➖0.0".to_string()
    }
}

fn last_chars(s: &str, n: usize) -> &str {
    let count = s.chars().count();
    if count <= n {
        return s;
    }
    s.char_indices()
        .nth(count - n)
        .map(|(idx, _)| &s[idx..])
        .unwrap_or(s)
}
