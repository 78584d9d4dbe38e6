//! Partial-progress checkpoints for geocoding runs.
//!
//! Only final outcomes are stored. Deferred records are left out so the
//! next run submits them again. Entries are keyed by record id, so
//! re-recording a record replaces its entry instead of duplicating it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::GeocodeOutcome;

/// Errors from reading or writing a checkpoint.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// Filesystem failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The checkpoint file is not valid JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Storage for geocoding outcomes keyed by record id.
pub trait CheckpointStore: Send {
    /// Returns every stored outcome.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError`] if the backing store cannot be read.
    fn load(&self) -> Result<BTreeMap<i64, GeocodeOutcome>, CheckpointError>;

    /// Stores the final outcomes among `entries`; deferred outcomes are
    /// ignored.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError`] if the backing store cannot be written.
    fn record(&mut self, entries: &[(i64, GeocodeOutcome)]) -> Result<(), CheckpointError>;
}

fn merge_final(target: &mut BTreeMap<i64, GeocodeOutcome>, entries: &[(i64, GeocodeOutcome)]) -> usize {
    let mut stored = 0;
    for (object_id, outcome) in entries {
        if outcome.is_final() {
            target.insert(*object_id, outcome.clone());
            stored += 1;
        }
    }
    stored
}

/// In-memory checkpoint, for runs that do not need to survive a restart.
#[derive(Debug, Default)]
pub struct MemoryCheckpoint {
    entries: BTreeMap<i64, GeocodeOutcome>,
}

impl CheckpointStore for MemoryCheckpoint {
    fn load(&self) -> Result<BTreeMap<i64, GeocodeOutcome>, CheckpointError> {
        Ok(self.entries.clone())
    }

    fn record(&mut self, entries: &[(i64, GeocodeOutcome)]) -> Result<(), CheckpointError> {
        merge_final(&mut self.entries, entries);
        Ok(())
    }
}

/// One persisted checkpoint row.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CheckpointEntry {
    object_id: i64,
    outcome: GeocodeOutcome,
}

/// JSON-file checkpoint.
///
/// The whole file is rewritten after every recorded batch, via a sibling
/// temporary file and a rename so an interrupted write never leaves a
/// truncated checkpoint behind.
#[derive(Debug)]
pub struct JsonFileCheckpoint {
    path: PathBuf,
    entries: BTreeMap<i64, GeocodeOutcome>,
}

impl JsonFileCheckpoint {
    /// Opens the checkpoint at `path`, starting empty if the file does
    /// not exist.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError`] if the file exists but cannot be read
    /// or parsed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CheckpointError> {
        let path = path.into();
        let mut entries = BTreeMap::new();

        if path.exists() {
            let text = std::fs::read_to_string(&path)?;
            let rows: Vec<CheckpointEntry> = serde_json::from_str(&text)?;
            for row in rows {
                entries.insert(row.object_id, row.outcome);
            }
            log::info!(
                "Resuming from checkpoint {} ({} records)",
                path.display(),
                entries.len()
            );
        }

        Ok(Self { path, entries })
    }

    /// Path of the checkpoint file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self) -> Result<(), CheckpointError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let rows: Vec<CheckpointEntry> = self
            .entries
            .iter()
            .map(|(object_id, outcome)| CheckpointEntry {
                object_id: *object_id,
                outcome: outcome.clone(),
            })
            .collect();

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        std::fs::write(&tmp, serde_json::to_vec_pretty(&rows)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl CheckpointStore for JsonFileCheckpoint {
    fn load(&self) -> Result<BTreeMap<i64, GeocodeOutcome>, CheckpointError> {
        Ok(self.entries.clone())
    }

    fn record(&mut self, entries: &[(i64, GeocodeOutcome)]) -> Result<(), CheckpointError> {
        if merge_final(&mut self.entries, entries) > 0 {
            self.write()?;
        }
        Ok(())
    }
}
