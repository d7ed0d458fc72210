use std::{
    sync::{Arc, Mutex},
    time::{SystemTime, UNIX_EPOCH},
};

use log::{info, warn};

use crate::{
    err::{Result, SnapshotError},
    serializer::SnapshotSerializer,
    snapshot::{ModelEntry, Snapshot},
};

/// Outcome of startup recovery.
#[derive(Debug, PartialEq, Eq)]
pub enum Restored {
    /// Nothing was ever saved under the name.
    Empty,
    Snapshot(Snapshot),
}

#[derive(Debug, Default)]
struct ManagerState {
    sequence: u64,
    created_at: u64,
    models: Vec<ModelEntry>,
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Turns runtime state changes into snapshots with increasing sequences.
///
/// Sequences continue from whatever [`SnapshotManager::restore`] found.
pub struct SnapshotManager {
    serializer: Arc<dyn SnapshotSerializer>,
    name: String,
    state: Mutex<ManagerState>,
}

impl SnapshotManager {
    pub fn new<S: Into<String>>(serializer: Arc<dyn SnapshotSerializer>, name: S) -> Self {
        Self {
            serializer,
            name: name.into(),
            state: Mutex::new(ManagerState::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Load the last saved snapshot. An unreadable one is an error, not
    /// [`Restored::Empty`].
    pub fn restore(&self) -> Result<Restored> {
        let snapshot = match self.serializer.get_snapshot(&self.name) {
            Ok(s) => s,
            Err(e) if e.is_not_found() => {
                info!("snapshot {} not found, start empty", self.name);
                return Ok(Restored::Empty);
            }
            Err(e) => return Err(e),
        };

        let mut state = self.state.lock().unwrap();
        state.sequence = snapshot.sequence;
        state.created_at = snapshot.created_at;
        state.models = snapshot.models.clone();
        info!(
            "snapshot {} restored, sequence {}, {} models",
            self.name,
            snapshot.sequence,
            snapshot.models.len()
        );
        Ok(Restored::Snapshot(snapshot))
    }

    /// Models as of the last recorded snapshot.
    pub fn models(&self) -> Vec<ModelEntry> {
        self.state.lock().unwrap().models.clone()
    }

    /// Apply `f` to the model list and persist the result as a new snapshot.
    ///
    /// On a stale sequence the stored snapshot is re-read and adopted before
    /// the error is returned, so calling again applies the change on top of
    /// what the other writer saved.
    pub fn update<F: FnOnce(&mut Vec<ModelEntry>)>(&self, f: F) -> Result<Snapshot> {
        let mut state = self.state.lock().unwrap();
        let sequence = state.sequence.checked_add(1).ok_or_else(|| {
            SnapshotError::Encoding(format!("snapshot {} sequence exhausted", self.name))
        })?;
        let mut models = state.models.clone();
        f(&mut models);

        let snapshot = Snapshot {
            name: self.name.clone(),
            created_at: now_millis().max(state.created_at),
            sequence,
            models,
        };
        match self.serializer.save_snapshot(&snapshot) {
            Ok(()) => {
                state.sequence = snapshot.sequence;
                state.created_at = snapshot.created_at;
                state.models = snapshot.models.clone();
                Ok(snapshot)
            }
            Err(SnapshotError::InvariantViolation {
                name,
                stored,
                attempted,
            }) => {
                warn!(
                    "snapshot {} sequence {} stale, stored {}",
                    name, attempted, stored
                );
                match self.serializer.get_snapshot(&self.name) {
                    Ok(current) => {
                        state.sequence = current.sequence;
                        state.created_at = state.created_at.max(current.created_at);
                        state.models = current.models;
                    }
                    Err(e) => {
                        warn!("snapshot {} reload after stale write: {}", self.name, e);
                        return Err(e);
                    }
                }
                Err(SnapshotError::InvariantViolation {
                    name,
                    stored,
                    attempted,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Record a loaded model. Loading a loaded (name, version) replaces it in place.
    pub fn load_model(&self, entry: ModelEntry) -> Result<Snapshot> {
        self.update(|models| {
            match models.iter().position(|m| m.key() == entry.key()) {
                Some(idx) => models[idx] = entry,
                None => models.push(entry),
            }
        })
    }

    pub fn unload_model(&self, model_name: &str, version: &str) -> Result<Snapshot> {
        self.update(|models| models.retain(|m| m.key() != (model_name, version)))
    }

    pub fn scale_workers(&self, model_name: &str, version: &str, workers: u32) -> Result<Snapshot> {
        self.update(|models| {
            if let Some(m) = models.iter_mut().find(|m| m.key() == (model_name, version)) {
                m.worker_count = workers;
            }
        })
    }
}
