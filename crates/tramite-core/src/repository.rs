//! Progress Persistence
//!
//! Progress is persisted as one entry per procedure id so a session can be
//! resumed. `ProgressRepository` hides the backend; a JSON file and an
//! in-memory key-value map are provided.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{debug, info};

use crate::error::{FlowError, FlowResult};
use crate::state::ProgressState;

/// Progress of every procedure, keyed by procedure id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProgressSnapshot {
    entries: BTreeMap<String, ProgressState>,
}

impl ProgressSnapshot {
    pub fn insert(&mut self, state: ProgressState) {
        self.entries.insert(state.procedure_id.clone(), state);
    }

    pub fn get(&self, procedure_id: &str) -> Option<&ProgressState> {
        self.entries.get(procedure_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_states(self) -> impl Iterator<Item = ProgressState> {
        self.entries.into_values()
    }

    /// Flatten to `procedure id → serialized state`
    pub fn to_flat(&self) -> FlowResult<BTreeMap<String, String>> {
        self.entries
            .iter()
            .map(|(id, state)| -> FlowResult<(String, String)> {
                Ok((id.clone(), serde_json::to_string(state)?))
            })
            .collect()
    }

    pub fn from_flat(flat: &BTreeMap<String, String>) -> FlowResult<Self> {
        let mut snapshot = Self::default();
        for (id, raw) in flat {
            let state: ProgressState = serde_json::from_str(raw)?;
            if &state.procedure_id != id {
                return Err(FlowError::CorruptProgress(format!(
                    "progress stored under '{}' belongs to '{}'",
                    id, state.procedure_id
                )));
            }
            snapshot.insert(state);
        }
        Ok(snapshot)
    }
}

impl FromIterator<ProgressState> for ProgressSnapshot {
    fn from_iter<I: IntoIterator<Item = ProgressState>>(iter: I) -> Self {
        let mut snapshot = Self::default();
        for state in iter {
            snapshot.insert(state);
        }
        snapshot
    }
}

/// Persistence for progress snapshots
pub trait ProgressRepository: Send + Sync {
    fn load(&self) -> FlowResult<ProgressSnapshot>;
    fn save(&self, snapshot: &ProgressSnapshot) -> FlowResult<()>;
}

/// Snapshot stored as a single JSON document
pub struct JsonFileRepository {
    path: PathBuf,
}

impl JsonFileRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ProgressRepository for JsonFileRepository {
    /// A missing file is an empty snapshot
    fn load(&self) -> FlowResult<ProgressSnapshot> {
        if !self.path.exists() {
            debug!("No progress file at {}", self.path.display());
            return Ok(ProgressSnapshot::default());
        }

        let content = std::fs::read_to_string(&self.path)?;
        let snapshot: ProgressSnapshot = serde_json::from_str(&content)?;
        info!(
            "Loaded progress for {} procedure(s) from {}",
            snapshot.len(),
            self.path.display()
        );
        Ok(snapshot)
    }

    /// Written to a sibling temp file first, then renamed over the target
    fn save(&self, snapshot: &ProgressSnapshot) -> FlowResult<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        serde_json::to_writer_pretty(&mut tmp, snapshot)?;
        tmp.flush()?;
        tmp.persist(&self.path).map_err(|e| FlowError::Io(e.error))?;

        debug!(
            "Saved progress for {} procedure(s) to {}",
            snapshot.len(),
            self.path.display()
        );
        Ok(())
    }
}

/// Flat key-value repository held in memory
#[derive(Default)]
pub struct MemoryRepository {
    inner: RwLock<BTreeMap<String, String>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw stored value for a procedure
    pub fn raw(&self, procedure_id: &str) -> Option<String> {
        self.inner
            .read()
            .ok()
            .and_then(|kv| kv.get(procedure_id).cloned())
    }
}

impl ProgressRepository for MemoryRepository {
    fn load(&self) -> FlowResult<ProgressSnapshot> {
        let kv = self
            .inner
            .read()
            .map_err(|e| FlowError::LockPoisoned(e.to_string()))?;
        ProgressSnapshot::from_flat(&kv)
    }

    fn save(&self, snapshot: &ProgressSnapshot) -> FlowResult<()> {
        let flat = snapshot.to_flat()?;
        let mut kv = self
            .inner
            .write()
            .map_err(|e| FlowError::LockPoisoned(e.to_string()))?;
        *kv = flat;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::Phase;
    use crate::state::Branch;

    fn sample_state() -> ProgressState {
        let mut state = ProgressState::new("pasaporte");
        state.answer("curp", true);
        state.skip("fotografias");
        state.transition_to(Phase::Requirements);
        state.branches.push(Branch::new(
            "pasaporte",
            "acta_nacimiento",
            "acta_nacimiento_menor",
            "Sin acta de nacimiento",
        ));
        state
    }

    #[test]
    fn test_flat_round_trip() {
        let snapshot: ProgressSnapshot = vec![sample_state(), ProgressState::new("licencia")]
            .into_iter()
            .collect();

        let flat = snapshot.to_flat().unwrap();
        assert_eq!(flat.len(), 2);
        assert!(flat.contains_key("pasaporte"));

        let restored = ProgressSnapshot::from_flat(&flat).unwrap();
        assert_eq!(restored, snapshot);
    }

    #[test]
    fn test_from_flat_rejects_mismatched_key() {
        let state = ProgressState::new("licencia");
        let mut flat = BTreeMap::new();
        flat.insert(
            "pasaporte".to_string(),
            serde_json::to_string(&state).unwrap(),
        );
        assert!(ProgressSnapshot::from_flat(&flat).is_err());
    }

    #[test]
    fn test_json_file_repository() {
        let dir = tempfile::tempdir().unwrap();
        let repo = JsonFileRepository::new(dir.path().join("nested").join("progress.json"));

        assert!(repo.load().unwrap().is_empty());

        let snapshot: ProgressSnapshot = std::iter::once(sample_state()).collect();
        repo.save(&snapshot).unwrap();
        assert_eq!(repo.load().unwrap(), snapshot);
    }

    #[test]
    fn test_memory_repository_stores_flat_entries() {
        let repo = MemoryRepository::new();
        let snapshot: ProgressSnapshot = std::iter::once(sample_state()).collect();

        repo.save(&snapshot).unwrap();
        assert!(repo.raw("pasaporte").is_some());
        assert_eq!(repo.load().unwrap(), snapshot);
    }
}
