use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::block::Block;
use super::transaction::Transaction;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Snapshot format error: {0}")]
    Format(#[from] serde_json::Error),
}

/// Everything written to the snapshot file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainSnapshot {
    pub chain: Vec<Block>,

    #[serde(default)]
    pub pending_transactions: Vec<Transaction>,

    pub saved_at: DateTime<Utc>,
}

/// A JSON file holding the last saved chain and pending pool
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        SnapshotStore {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the snapshot, or `None` if no file exists yet
    pub fn load(&self) -> Result<Option<ChainSnapshot>, StorageError> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(self.io_error(source)),
        };

        Ok(Some(serde_json::from_slice(&raw)?))
    }

    /// Writes the snapshot to a sibling temporary file, then renames it over
    /// the previous one
    pub fn save(&self, chain: &[Block], pending: &[Transaction]) -> Result<(), StorageError> {
        let snapshot = ChainSnapshot {
            chain: chain.to_vec(),
            pending_transactions: pending.to_vec(),
            saved_at: Utc::now(),
        };
        let encoded = serde_json::to_vec_pretty(&snapshot)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| self.io_error(source))?;
        }

        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, encoded).map_err(|source| self.io_error(source))?;
        fs::rename(&staging, &self.path).map_err(|source| self.io_error(source))?;

        debug!("Saved {} blocks to {}", chain.len(), self.path.display());
        Ok(())
    }

    fn io_error(&self, source: io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.clone(),
            source,
        }
    }
}
