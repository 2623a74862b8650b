//! Persisted alert state
//!
//! Small JSON files that survive restarts. Every unit is a cache of alerting
//! decisions, not a system of record, so reads never fail: a missing or
//! unreadable file is treated as empty.

pub mod state;

pub use state::{MinerStatus, SentAlertSet, StateStore, StatusMap};

use std::fs::OpenOptions;
use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

/// A single JSON-encoded value stored in one file
#[derive(Debug, Clone)]
pub struct JsonUnit<T> {
    path: PathBuf,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonUnit<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            _marker: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the unit from disk, falling back to `T::default()`
    pub fn load(&self) -> T {
        match self.try_load() {
            Ok(Some(value)) => value,
            Ok(None) => T::default(),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to load state file");
                T::default()
            }
        }
    }

    fn try_load(&self) -> Result<Option<T>, PersistenceError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let data = std::fs::read(&self.path)?;
        let value = serde_json::from_slice(&data)
            .map_err(|e| PersistenceError::Deserialization(e.to_string()))?;
        Ok(Some(value))
    }

    /// Overwrite the unit with `value`
    ///
    /// Written to a sibling temp file first and renamed into place, so a
    /// reader never sees a half-written file.
    pub fn save(&self, value: &T) -> Result<(), PersistenceError> {
        let data = serde_json::to_vec_pretty(value)
            .map_err(|e| PersistenceError::Serialization(e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let tmp = self.path.with_extension("json.tmp");
        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp)?;
            file.write_all(&data)?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp, &self.path)?;

        Ok(())
    }

    /// Reset the unit to an empty value
    pub fn clear(&self) -> Result<(), PersistenceError> {
        self.save(&T::default())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),
}
