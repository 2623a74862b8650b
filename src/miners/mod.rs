//! Registry of tracked miner addresses

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::store::{JsonUnit, PersistenceError};

pub const MINERS_FILE: &str = "miners.json";

/// On-disk shape of the registry
///
/// Older files hold a bare list; they are accepted and rewritten as
/// `{"miners": [...]}` on first load.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RegistryFile {
    Current { miners: Vec<String> },
    Legacy(Vec<String>),
}

impl Default for RegistryFile {
    fn default() -> Self {
        RegistryFile::Current { miners: Vec::new() }
    }
}

/// Miner list persisted in `miners.json`
pub struct MinerRegistry {
    unit: JsonUnit<RegistryFile>,
    /// Serializes read-modify-write within this process
    write_lock: Mutex<()>,
}

impl MinerRegistry {
    pub fn open(data_dir: impl AsRef<Path>) -> Self {
        Self::with_path(data_dir.as_ref().join(MINERS_FILE))
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        let path: PathBuf = path.into();
        Self {
            unit: JsonUnit::new(path),
            write_lock: Mutex::new(()),
        }
    }

    /// Current miner ids, in registration order
    pub fn load(&self) -> Vec<String> {
        match self.unit.load() {
            RegistryFile::Current { miners } => miners,
            RegistryFile::Legacy(miners) => {
                match self.save(&miners) {
                    Ok(()) => tracing::info!("Converted legacy miners file to the current format"),
                    Err(e) => tracing::warn!(error = %e, "Failed to rewrite legacy miners file"),
                }
                miners
            }
        }
    }

    fn save(&self, miners: &[String]) -> Result<(), PersistenceError> {
        self.unit.save(&RegistryFile::Current {
            miners: miners.to_vec(),
        })
    }

    pub fn add(&self, miner_id: &str) -> Result<(), RegistryError> {
        let miner_id = miner_id.trim();
        if miner_id.is_empty() {
            return Err(RegistryError::EmptyId);
        }

        let _guard = self.write_lock.lock();
        let mut miners = self.load();
        if miners.iter().any(|m| m == miner_id) {
            return Err(RegistryError::AlreadyExists(miner_id.to_string()));
        }

        miners.push(miner_id.to_string());
        self.save(&miners)?;
        tracing::info!(miner = %miner_id, "Miner added");
        Ok(())
    }

    pub fn remove(&self, miner_id: &str) -> Result<(), RegistryError> {
        let miner_id = miner_id.trim();
        if miner_id.is_empty() {
            return Err(RegistryError::EmptyId);
        }

        let _guard = self.write_lock.lock();
        let mut miners = self.load();
        let before = miners.len();
        miners.retain(|m| m != miner_id);
        if miners.len() == before {
            return Err(RegistryError::NotFound(miner_id.to_string()));
        }

        self.save(&miners)?;
        tracing::info!(miner = %miner_id, "Miner removed");
        Ok(())
    }
}

/// `0x` followed by 40 hex digits
pub fn is_valid_address(addr: &str) -> bool {
    static ADDRESS: OnceLock<Regex> = OnceLock::new();
    ADDRESS
        .get_or_init(|| Regex::new(r"^0x[0-9a-fA-F]{40}$").expect("valid address regex"))
        .is_match(addr)
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Miner address is empty")]
    EmptyId,

    #[error("Miner already exists: {0}")]
    AlreadyExists(String),

    #[error("Miner not found: {0}")]
    NotFound(String),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),
}
