use std::collections::{BTreeMap, HashSet};

/// State of one loaded model at capture time.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ModelEntry {
    pub model_name: String,
    pub version: String,
    pub worker_count: u32,
    /// Opaque to storage. Sorted so equality and encoding are deterministic.
    pub runtime_params: BTreeMap<String, String>,
}

impl ModelEntry {
    pub fn new<N: Into<String>, V: Into<String>>(model_name: N, version: V, worker_count: u32) -> Self {
        Self {
            model_name: model_name.into(),
            version: version.into(),
            worker_count,
            runtime_params: BTreeMap::new(),
        }
    }

    pub fn with_param<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.runtime_params.insert(key.into(), value.into());
        self
    }

    pub fn key(&self) -> (&str, &str) {
        (&self.model_name, &self.version)
    }
}

/// Versioned record of serving runtime state.
///
/// A stored snapshot is never modified. A newer state is a new value with a
/// strictly greater `sequence`, see [`Snapshot::successor`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Snapshot {
    pub name: String,
    /// Milliseconds since the UNIX epoch.
    pub created_at: u64,
    pub sequence: u64,
    /// Load order, replayed as is.
    pub models: Vec<ModelEntry>,
}

impl Snapshot {
    pub fn new<S: Into<String>>(name: S, sequence: u64, created_at: u64) -> Self {
        Self {
            name: name.into(),
            created_at,
            sequence,
            models: Vec::new(),
        }
    }

    pub fn with_model(mut self, entry: ModelEntry) -> Self {
        self.models.push(entry);
        self
    }

    /// Copy of this snapshot under the next sequence, same models.
    pub fn successor(&self, sequence: u64, created_at: u64) -> Self {
        Self {
            name: self.name.clone(),
            created_at: created_at.max(self.created_at),
            sequence,
            models: self.models.clone(),
        }
    }

    pub fn model(&self, model_name: &str, version: &str) -> Option<&ModelEntry> {
        self.models
            .iter()
            .find(|m| m.model_name == model_name && m.version == version)
    }

    /// First (modelName, version) pair that occurs more than once.
    pub fn find_duplicate(&self) -> Option<&ModelEntry> {
        let mut seen = HashSet::with_capacity(self.models.len());
        self.models.iter().find(|m| !seen.insert(m.key()))
    }

    pub fn total_workers(&self) -> u64 {
        self.models.iter().map(|m| m.worker_count as u64).sum()
    }
}
