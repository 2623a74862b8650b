//! Alerting core
//!
//! Turns per-miner observations into at most one notification per real
//! state change, with message-level de-duplication persisted across restarts.

pub mod config;
pub mod engine;
pub mod event;
pub mod notifier;

pub use config::{AlertSettings, ChannelStatus, Credentials};
pub use engine::AlertEngine;
pub use event::{AlertEvent, AlertKind};
pub use notifier::{NotificationChannel, NotifierError, TelegramNotifier};

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::{Credentials, NotificationChannel, NotifierError};

    /// Channel that records every delivery attempt
    pub struct RecordingChannel {
        sent: Mutex<Vec<String>>,
        fail: AtomicBool,
    }

    impl RecordingChannel {
        pub fn new() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                fail: AtomicBool::new(false),
            }
        }

        pub fn failing() -> Self {
            let channel = Self::new();
            channel.fail.store(true, Ordering::SeqCst);
            channel
        }

        pub fn sent(&self) -> Vec<String> {
            self.sent.lock().clone()
        }

        pub fn call_count(&self) -> usize {
            self.sent.lock().len()
        }
    }

    #[async_trait]
    impl NotificationChannel for RecordingChannel {
        async fn deliver(&self, _credentials: &Credentials, text: &str) -> Result<(), NotifierError> {
            self.sent.lock().push(text.to_string());
            if self.fail.load(Ordering::SeqCst) {
                Err(NotifierError::Api {
                    status: 500,
                    body: "boom".to_string(),
                })
            } else {
                Ok(())
            }
        }
    }
}
