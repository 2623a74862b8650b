//! Notification channel for alert delivery

use std::time::Duration;

use async_trait::async_trait;

use super::config::Credentials;

pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Fixed bound on a single delivery attempt
pub const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// A sink for alert text
///
/// Implementations make a single attempt and report the outcome; retrying
/// is left to the next poll cycle.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn deliver(&self, credentials: &Credentials, text: &str) -> Result<(), NotifierError>;
}

/// Telegram Bot API `sendMessage` channel
#[derive(Debug, Clone)]
pub struct TelegramNotifier {
    client: reqwest::Client,
    api_base: String,
}

impl TelegramNotifier {
    pub fn new() -> Self {
        Self::with_api_base(TELEGRAM_API_BASE)
    }

    /// Point the notifier at a different API host (tests, proxies)
    pub fn with_api_base(api_base: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(SEND_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    fn send_message_url(&self, bot_token: &str) -> String {
        format!("{}/bot{}/sendMessage", self.api_base, bot_token)
    }
}

impl Default for TelegramNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationChannel for TelegramNotifier {
    async fn deliver(&self, credentials: &Credentials, text: &str) -> Result<(), NotifierError> {
        let url = self.send_message_url(&credentials.bot_token);

        let response = self
            .client
            .get(&url)
            .query(&[("chat_id", credentials.chat_id.as_str()), ("text", text)])
            .timeout(SEND_TIMEOUT)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    NotifierError::Timeout
                } else {
                    // The URL embeds the bot token.
                    NotifierError::Transport(
                        e.to_string().replace(&credentials.bot_token, "<redacted>"),
                    )
                }
            })?;

        let status = response.status();
        tracing::debug!(status = %status, "Telegram response");

        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifierError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}

/// Notifier errors
#[derive(Debug, thiserror::Error)]
pub enum NotifierError {
    #[error("Request timed out")]
    Timeout,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("API returned status {status}: {body}")]
    Api { status: u16, body: String },
}
