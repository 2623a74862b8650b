//! Miner status map and sent-alert set

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{JsonUnit, PersistenceError};

pub const STATUS_FILE: &str = "miner_status.json";
pub const SENT_ALERTS_FILE: &str = "sent_alerts.json";

/// Last known liveness of a miner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MinerStatus {
    Online,
    Offline,
}

impl MinerStatus {
    pub fn from_offline(offline: bool) -> Self {
        if offline {
            MinerStatus::Offline
        } else {
            MinerStatus::Online
        }
    }

    pub fn is_offline(self) -> bool {
        self == MinerStatus::Offline
    }
}

impl fmt::Display for MinerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MinerStatus::Online => write!(f, "online"),
            MinerStatus::Offline => write!(f, "offline"),
        }
    }
}

/// miner id -> last persisted status
pub type StatusMap = BTreeMap<String, MinerStatus>;

/// Exact message strings already delivered through the deduplicated path
pub type SentAlertSet = BTreeSet<String>;

/// Both persisted units behind one handle
#[derive(Debug, Clone)]
pub struct StateStore {
    status: JsonUnit<StatusMap>,
    sent: JsonUnit<SentAlertSet>,
}

impl StateStore {
    /// Open the store rooted at `data_dir`; files are created lazily on first save
    pub fn open(data_dir: impl AsRef<Path>) -> Self {
        let dir = data_dir.as_ref();
        Self {
            status: JsonUnit::new(dir.join(STATUS_FILE)),
            sent: JsonUnit::new(dir.join(SENT_ALERTS_FILE)),
        }
    }

    pub fn load_status(&self) -> StatusMap {
        self.status.load()
    }

    pub fn save_status(&self, map: &StatusMap) -> Result<(), PersistenceError> {
        self.status.save(map)
    }

    pub fn load_sent(&self) -> SentAlertSet {
        self.sent.load()
    }

    pub fn save_sent(&self, sent: &SentAlertSet) -> Result<(), PersistenceError> {
        self.sent.save(sent)
    }

    /// Empty both units
    pub fn clear_all(&self) -> Result<(), PersistenceError> {
        self.sent.clear()?;
        tracing::info!("All persistent alerts cleared");
        self.status.clear()?;
        tracing::info!("Miner status history cleared");
        Ok(())
    }
}
