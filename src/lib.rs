//! minerwatch: Miner Liveness and Balance Watcher
//!
//! Polls a leaderboard service and a blockchain RPC endpoint for a set of
//! registered miner addresses and sends Telegram alerts when a miner goes
//! offline, comes back online, or runs low on funds.
//!
//! # Features
//!
//! - **Exactly-once liveness alerts**: one alert per persisted status flip,
//!   never on first sighting
//! - **Balance thresholds**: critical and low, strict less-than
//! - **Message de-duplication**: sent alerts are persisted and re-checked
//!   before every delivery, across restarts and processes
//! - **Bounded fan-out**: balance queries run concurrently with a cap
//! - **Hot-reloaded settings**: the config file is re-read every cycle
//! - **Stats digest**: periodic or on-demand summary message
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use minerwatch::alerts::{AlertEngine, AlertSettings, TelegramNotifier};
//! use minerwatch::store::StateStore;
//!
//! # async fn run() {
//! let engine = AlertEngine::new(
//!     StateStore::open("./data"),
//!     Arc::new(TelegramNotifier::new()),
//!     AlertSettings::default(),
//! );
//!
//! let now = chrono::Utc::now().timestamp();
//! if let Some(event) = engine.evaluate_liveness("0xABCD...", true, now).await {
//!     println!("{}", event.message);
//! }
//! # }
//! ```

pub mod alerts;
pub mod api;
pub mod config;
pub mod digest;
pub mod driver;
pub mod fetch;
pub mod miners;
pub mod store;

// Re-export commonly used types
pub use alerts::{AlertEngine, AlertEvent, AlertKind, AlertSettings};
pub use config::{ConfigFile, WatchConfig};
pub use driver::{CycleReport, PollingDriver};
pub use store::{MinerStatus, StateStore};
