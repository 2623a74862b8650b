//! Alert settings

use serde::{Deserialize, Serialize};

/// Alert settings as stored in the `alert_settings` section of the config file
///
/// Read-only to the engine; a fresh snapshot is applied before every cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertSettings {
    /// Master switch for the Telegram channel
    pub telegram_enabled: bool,
    pub bot_token: String,
    pub chat_id: String,
    /// Balances strictly below this raise a WARNING
    pub low_balance_alert: f64,
    /// Balances strictly below this raise a CRITICAL (checked before low)
    pub critical_balance_alert: f64,
    /// Minutes without activity before a miner counts as offline
    pub miner_offline_minutes: f64,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            telegram_enabled: false,
            bot_token: String::new(),
            chat_id: String::new(),
            low_balance_alert: 0.5,
            critical_balance_alert: 0.1,
            miner_offline_minutes: 5.0,
        }
    }
}

impl AlertSettings {
    pub fn offline_after_seconds(&self) -> i64 {
        (self.miner_offline_minutes * 60.0) as i64
    }

    /// Credentials, if both token and chat id are present
    pub fn credentials(&self) -> Option<Credentials> {
        let bot_token = self.bot_token.trim();
        let chat_id = self.chat_id.trim();

        if bot_token.is_empty() || chat_id.is_empty() {
            return None;
        }

        Some(Credentials {
            bot_token: bot_token.to_string(),
            chat_id: chat_id.to_string(),
        })
    }

    pub fn channel_status(&self) -> ChannelStatus {
        if !self.telegram_enabled {
            ChannelStatus::Disabled
        } else if self.credentials().is_none() {
            ChannelStatus::MissingCredentials
        } else {
            ChannelStatus::Ready
        }
    }
}

/// Telegram bot credentials
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub bot_token: String,
    pub chat_id: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("bot_token", &"<redacted>")
            .field("chat_id", &self.chat_id)
            .finish()
    }
}

/// Whether alerts can currently be delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    Disabled,
    MissingCredentials,
    Ready,
}

impl ChannelStatus {
    pub fn is_ready(self) -> bool {
        self == ChannelStatus::Ready
    }
}
