//! Progress Store
//!
//! Single source of truth for procedure progress: one map keyed by procedure
//! id. Each entry sits behind its own mutex so operations on the same
//! procedure are serialized while different procedures never wait on each
//! other beyond the map lookup. Which procedure is "current" is the caller's
//! business.
//!
//! Branch management lives here too: a branch is recorded on the parent and
//! its target procedure gets its own progress entry.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::catalog::{Catalog, Prerequisite};
use crate::error::{FlowError, FlowResult};
use crate::guards::PhaseGuard;
use crate::phase::Phase;
use crate::repository::ProgressSnapshot;
use crate::resolver::RequirementResolver;
use crate::segmentation::Segmentation;
use crate::state::{Blocker, Branch, PrerequisiteStatus, ProgressState};

type Entry = Arc<Mutex<ProgressState>>;

/// Holds and transitions the progress of every open procedure
pub struct ProgressStore {
    catalog: Arc<Catalog>,
    resolver: Arc<RequirementResolver>,
    guard: PhaseGuard,
    entries: RwLock<HashMap<String, Entry>>,
}

impl ProgressStore {
    pub fn new(resolver: Arc<RequirementResolver>) -> Self {
        Self {
            catalog: resolver.catalog().clone(),
            guard: PhaseGuard::new(resolver.clone()),
            resolver,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Start a procedure, or resume it when progress already exists
    pub fn start(&self, procedure_id: &str, reset: bool) -> FlowResult<ProgressState> {
        if !self.catalog.contains(procedure_id) {
            return Err(FlowError::UnknownProcedure(procedure_id.to_string()));
        }

        let mut entries = self
            .entries
            .write()
            .map_err(|e| FlowError::LockPoisoned(e.to_string()))?;

        let state = ProgressState::new(procedure_id);

        if let Some(entry) = entries.get(procedure_id) {
            let mut current = lock(entry)?;
            if !reset {
                debug!("Resuming procedure {}", procedure_id);
                return Ok(current.clone());
            }
            // Same entry, so callers already holding it see the reset
            *current = state.clone();
            info!(procedure = procedure_id, reset, "Procedure started");
            return Ok(state);
        }

        entries.insert(
            procedure_id.to_string(),
            Arc::new(Mutex::new(state.clone())),
        );
        info!(procedure = procedure_id, reset, "Procedure started");
        Ok(state)
    }

    pub fn is_started(&self, procedure_id: &str) -> bool {
        self.entries
            .read()
            .map(|entries| entries.contains_key(procedure_id))
            .unwrap_or(false)
    }

    /// Copy of the progress for a started procedure
    pub fn get(&self, procedure_id: &str) -> FlowResult<ProgressState> {
        self.with_state(procedure_id, |state| Ok(state.clone()))
    }

    /// Guarded phase change
    pub fn change_phase(&self, procedure_id: &str, next: Phase) -> FlowResult<ProgressState> {
        self.with_state(procedure_id, |state| self.transition(state, next))
    }

    /// Move to the next phase this procedure uses
    pub fn advance(&self, procedure_id: &str) -> FlowResult<ProgressState> {
        let procedure = self
            .catalog
            .procedure(procedure_id)
            .ok_or_else(|| FlowError::UnknownProcedure(procedure_id.to_string()))?;

        self.with_state(procedure_id, |state| match procedure.next_phase(state.phase) {
            Some(next) => self.transition(state, next),
            None => Ok(state.clone()),
        })
    }

    fn transition(&self, state: &mut ProgressState, next: Phase) -> FlowResult<ProgressState> {
        if state.phase == next {
            return Ok(state.clone());
        }

        let result = self.guard.evaluate(state, next);
        if !result.passed {
            warn!(
                procedure = %state.procedure_id,
                from = %state.phase,
                to = %next,
                "Phase change rejected"
            );
            return Err(FlowError::PhaseBlocked {
                procedure_id: state.procedure_id.clone(),
                from: state.phase,
                to: next,
                blockers: result.blockers,
            });
        }

        let from = state.phase;
        state.transition_to(next);
        info!(procedure = %state.procedure_id, %from, to = %next, "Phase changed");
        Ok(state.clone())
    }

    pub fn answer_prerequisite(
        &self,
        procedure_id: &str,
        prerequisite_id: &str,
        value: bool,
    ) -> FlowResult<ProgressState> {
        self.with_state(procedure_id, |state| {
            state.answer(prerequisite_id, value);
            debug!(procedure = procedure_id, prerequisite = prerequisite_id, value, "Answered");
            Ok(state.clone())
        })
    }

    /// Count a prerequisite as satisfied without claiming the applicant has it
    pub fn skip_prerequisite(
        &self,
        procedure_id: &str,
        prerequisite_id: &str,
    ) -> FlowResult<ProgressState> {
        self.with_state(procedure_id, |state| {
            state.skip(prerequisite_id);
            debug!(procedure = procedure_id, prerequisite = prerequisite_id, "Skipped");
            Ok(state.clone())
        })
    }

    /// Replace the applicant situation (segmentation restarted)
    pub fn set_segmentation(
        &self,
        procedure_id: &str,
        segmentation: Segmentation,
    ) -> FlowResult<ProgressState> {
        self.with_state(procedure_id, |state| {
            state.set_segmentation(segmentation);
            Ok(state.clone())
        })
    }

    pub fn mark_document(
        &self,
        procedure_id: &str,
        document_id: &str,
        uploaded: bool,
    ) -> FlowResult<ProgressState> {
        self.with_state(procedure_id, |state| {
            state.mark_document(document_id, uploaded);
            Ok(state.clone())
        })
    }

    /// Open a sub-procedure to produce a missing prerequisite.
    ///
    /// Returns the already-open branch when one targets the same procedure.
    pub fn open_branch(
        &self,
        procedure_id: &str,
        target_procedure_id: &str,
        prerequisite_id: &str,
        reason: &str,
    ) -> FlowResult<Branch> {
        if !self.catalog.contains(target_procedure_id) {
            return Err(FlowError::UnknownProcedure(target_procedure_id.to_string()));
        }
        // Fail before touching the target when the parent was never started
        let parent = self.entry(procedure_id)?;

        let branch = {
            let mut state = lock(&parent)?;
            if let Some(existing) = state.active_branch_for(target_procedure_id) {
                debug!(
                    procedure = procedure_id,
                    target = target_procedure_id,
                    "Branch already open"
                );
                return Ok(existing.clone());
            }

            let branch = Branch::new(procedure_id, target_procedure_id, prerequisite_id, reason);
            state.branches.push(branch.clone());
            state.touch();
            branch
        };

        self.start(target_procedure_id, false)?;
        info!(
            procedure = procedure_id,
            target = target_procedure_id,
            branch = %branch.branch_id,
            "Branch opened"
        );
        Ok(branch)
    }

    /// Close an open branch; a non-cancelled close satisfies its prerequisite
    pub fn close_branch(
        &self,
        procedure_id: &str,
        branch_id: Uuid,
        cancelled: bool,
    ) -> FlowResult<ProgressState> {
        self.with_state(procedure_id, |state| {
            let branch = state
                .branch_mut(branch_id)
                .ok_or_else(|| FlowError::BranchNotFound {
                    procedure_id: procedure_id.to_string(),
                    branch_id,
                })?;
            // A closed branch keeps its outcome; reopening means a new branch
            if branch.state.is_terminal() {
                return Err(FlowError::BranchClosed {
                    procedure_id: procedure_id.to_string(),
                    branch_id,
                    state: branch.state,
                });
            }
            branch.close(cancelled);
            let prerequisite_id = branch.prerequisite_id.clone();

            if cancelled {
                state.touch();
            } else {
                state.answer(&prerequisite_id, true);
            }
            info!(procedure = procedure_id, branch = %branch_id, cancelled, "Branch closed");
            Ok(state.clone())
        })
    }

    /// Summary for rendering a procedure's progress
    pub fn status(&self, procedure_id: &str) -> FlowResult<ProgressSummary> {
        let procedure = self
            .catalog
            .procedure(procedure_id)
            .ok_or_else(|| FlowError::UnknownProcedure(procedure_id.to_string()))?;
        let state = self.get(procedure_id)?;

        let segmentation = state.segmentation.clone().unwrap_or_default();
        let prerequisites = self
            .resolver
            .resolve_for(procedure, &segmentation)
            .into_iter()
            .map(|p| PrerequisiteProgress {
                status: state.prerequisite_status(&p.id),
                prerequisite: p,
            })
            .collect();

        let sequence = procedure.phase_sequence();
        let progress = if state.phase.is_terminal() {
            100.0
        } else {
            let completed = state
                .completed_phases
                .iter()
                .filter(|p| sequence.contains(p))
                .count() as f32;
            let estimated_total = sequence.len().saturating_sub(1) as f32;
            if estimated_total > 0.0 {
                ((completed / estimated_total) * 100.0).min(99.0)
            } else {
                0.0
            }
        };

        Ok(ProgressSummary {
            procedure_id: procedure_id.to_string(),
            phase: state.phase,
            phase_title: procedure
                .phase_content(state.phase)
                .map(|c| c.title.clone()),
            next_phase: procedure.next_phase(state.phase),
            blockers: self.guard.current_blockers(&state),
            open_branches: state.open_branches().cloned().collect(),
            prerequisites,
            progress,
        })
    }

    /// Snapshot of every procedure's progress
    pub fn export(&self) -> FlowResult<ProgressSnapshot> {
        let entries = self
            .entries
            .read()
            .map_err(|e| FlowError::LockPoisoned(e.to_string()))?;

        let mut snapshot = ProgressSnapshot::default();
        for entry in entries.values() {
            snapshot.insert(lock(entry)?.clone());
        }
        Ok(snapshot)
    }

    /// Replace in-memory progress with a snapshot
    pub fn import(&self, snapshot: ProgressSnapshot) -> FlowResult<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| FlowError::LockPoisoned(e.to_string()))?;

        entries.clear();
        for state in snapshot.into_states() {
            if !self.catalog.contains(&state.procedure_id) {
                warn!(
                    "Restoring progress for procedure {} which is not in the catalog",
                    state.procedure_id
                );
            }
            entries.insert(state.procedure_id.clone(), Arc::new(Mutex::new(state)));
        }
        info!("Restored progress for {} procedure(s)", entries.len());
        Ok(())
    }

    fn entry(&self, procedure_id: &str) -> FlowResult<Entry> {
        let entries = self
            .entries
            .read()
            .map_err(|e| FlowError::LockPoisoned(e.to_string()))?;
        entries
            .get(procedure_id)
            .cloned()
            .ok_or_else(|| FlowError::NotStarted(procedure_id.to_string()))
    }

    fn with_state<T>(
        &self,
        procedure_id: &str,
        f: impl FnOnce(&mut ProgressState) -> FlowResult<T>,
    ) -> FlowResult<T> {
        let entry = self.entry(procedure_id)?;
        let mut state = lock(&entry)?;
        f(&mut state)
    }
}

fn lock(entry: &Entry) -> FlowResult<std::sync::MutexGuard<'_, ProgressState>> {
    entry
        .lock()
        .map_err(|e| FlowError::LockPoisoned(e.to_string()))
}

/// Resolved prerequisite with the applicant's standing on it
#[derive(Debug, Clone, Serialize)]
pub struct PrerequisiteProgress {
    pub prerequisite: Prerequisite,
    pub status: PrerequisiteStatus,
}

/// Progress of one procedure with blockers and open branches
#[derive(Debug, Clone, Serialize)]
pub struct ProgressSummary {
    pub procedure_id: String,
    pub phase: Phase,
    pub phase_title: Option<String>,
    pub next_phase: Option<Phase>,
    pub prerequisites: Vec<PrerequisiteProgress>,
    pub blockers: Vec<Blocker>,
    pub open_branches: Vec<Branch>,
    pub progress: f32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogLoader;
    use crate::state::BranchState;

    const CATALOG: &str = r#"{
        "procedures": [
            {
                "id": "acta_nacimiento",
                "prerequisites": [
                    { "id": "curp", "name": "CURP", "kind": "document" }
                ]
            },
            {
                "id": "licencia",
                "prerequisites": [
                    { "id": "acta", "name": "Acta", "kind": "document", "related_procedure_id": "acta_nacimiento" },
                    { "id": "foto", "name": "Foto", "kind": "file" },
                    { "id": "examen", "name": "Examen", "kind": "validation", "optional": true }
                ],
                "phases": [
                    { "phase": "information", "title": "Información" },
                    { "phase": "requirements", "title": "Requisitos" },
                    { "phase": "payment", "title": "Pago" },
                    { "phase": "tracking", "title": "Seguimiento" }
                ]
            }
        ]
    }"#;

    fn store() -> ProgressStore {
        let catalog = Arc::new(CatalogLoader::from_json_str(CATALOG).unwrap());
        ProgressStore::new(Arc::new(RequirementResolver::new(catalog)))
    }

    #[test]
    fn test_start_resumes_unless_reset() {
        let store = store();
        store.start("licencia", false).unwrap();
        store.answer_prerequisite("licencia", "foto", true).unwrap();

        let resumed = store.start("licencia", false).unwrap();
        assert_eq!(resumed.answers.get("foto"), Some(&true));

        let fresh = store.start("licencia", true).unwrap();
        assert!(fresh.answers.is_empty());
        assert!(store.get("licencia").unwrap().answers.is_empty());
    }

    #[test]
    fn test_unknown_and_unstarted_procedures_fail() {
        let store = store();
        assert!(matches!(
            store.start("pasaporte", false),
            Err(FlowError::UnknownProcedure(_))
        ));
        assert!(matches!(
            store.answer_prerequisite("licencia", "foto", true),
            Err(FlowError::NotStarted(_))
        ));
        assert!(!store.is_started("licencia"));
    }

    #[test]
    fn test_advance_skips_missing_documentation_phase() {
        let store = store();
        store.start("licencia", false).unwrap();

        let state = store.advance("licencia").unwrap();
        assert_eq!(state.phase, Phase::Requirements);

        let err = store.advance("licencia").unwrap_err();
        assert_eq!(err.blockers().len(), 2);

        store.answer_prerequisite("licencia", "acta", true).unwrap();
        store.skip_prerequisite("licencia", "foto").unwrap();

        let state = store.advance("licencia").unwrap();
        assert_eq!(state.phase, Phase::Payment);
        assert_eq!(
            state.completed_phases,
            vec![Phase::Information, Phase::Requirements]
        );
    }

    #[test]
    fn test_same_phase_is_noop() {
        let store = store();
        store.start("licencia", false).unwrap();
        let state = store.change_phase("licencia", Phase::Information).unwrap();
        assert!(state.completed_phases.is_empty());
        assert!(state.history.is_empty());
    }

    #[test]
    fn test_branch_duplicate_suppression() {
        let store = store();
        store.start("licencia", false).unwrap();

        let first = store
            .open_branch("licencia", "acta_nacimiento", "acta", "Sin acta")
            .unwrap();
        let second = store
            .open_branch("licencia", "acta_nacimiento", "acta", "Otra vez")
            .unwrap();

        assert_eq!(first.branch_id, second.branch_id);
        assert_eq!(first.state, BranchState::InProgress);
        assert!(store.is_started("acta_nacimiento"));
        assert_eq!(store.get("licencia").unwrap().branches.len(), 1);

        store
            .close_branch("licencia", first.branch_id, true)
            .unwrap();
        let third = store
            .open_branch("licencia", "acta_nacimiento", "acta", "Nuevo intento")
            .unwrap();
        assert_ne!(first.branch_id, third.branch_id);
    }

    #[test]
    fn test_close_branch_answers_prerequisite() {
        let store = store();
        store.start("licencia", false).unwrap();
        store.answer_prerequisite("licencia", "acta", false).unwrap();

        let branch = store
            .open_branch("licencia", "acta_nacimiento", "acta", "Sin acta")
            .unwrap();
        let state = store
            .close_branch("licencia", branch.branch_id, false)
            .unwrap();

        assert_eq!(state.answers.get("acta"), Some(&true));
        assert_eq!(state.branches[0].state, BranchState::Completed);

        assert!(matches!(
            store.close_branch("licencia", Uuid::new_v4(), false),
            Err(FlowError::BranchNotFound { .. })
        ));
    }

    #[test]
    fn test_status_reports_progress() {
        let store = store();
        store.start("licencia", false).unwrap();
        store.change_phase("licencia", Phase::Requirements).unwrap();
        store.answer_prerequisite("licencia", "acta", false).unwrap();

        let status = store.status("licencia").unwrap();
        assert_eq!(status.phase_title.as_deref(), Some("Requisitos"));
        assert_eq!(status.next_phase, Some(Phase::Payment));
        assert_eq!(status.prerequisites.len(), 3);
        assert_eq!(status.prerequisites[0].status, PrerequisiteStatus::Missing);
        assert_eq!(status.blockers.len(), 2);
        assert!((status.progress - 100.0 / 3.0).abs() < 0.01);
    }

    #[test]
    fn test_export_import() {
        let store = store();
        store.start("licencia", false).unwrap();
        store.answer_prerequisite("licencia", "foto", true).unwrap();
        let snapshot = store.export().unwrap();

        let restored = self::store();
        restored.import(snapshot).unwrap();
        assert_eq!(
            restored.get("licencia").unwrap(),
            store.get("licencia").unwrap()
        );
    }

    #[test]
    fn test_closed_branch_cannot_be_closed_again() {
        let store = store();
        store.start("licencia", false).unwrap();
        store.answer_prerequisite("licencia", "acta", false).unwrap();

        let branch = store
            .open_branch("licencia", "acta_nacimiento", "acta", "Sin acta")
            .unwrap();
        store
            .close_branch("licencia", branch.branch_id, true)
            .unwrap();

        let err = store
            .close_branch("licencia", branch.branch_id, false)
            .unwrap_err();
        assert!(matches!(
            err,
            FlowError::BranchClosed {
                state: BranchState::Cancelled,
                ..
            }
        ));

        let state = store.get("licencia").unwrap();
        assert_eq!(state.branches[0].state, BranchState::Cancelled);
        assert_eq!(state.answers.get("acta"), Some(&false));
    }

    #[test]
    fn test_open_branch_rejects_unknown_target_and_unstarted_parent() {
        let store = store();
        store.start("licencia", false).unwrap();
        assert!(matches!(
            store.open_branch("licencia", "visa", "acta", "Sin acta"),
            Err(FlowError::UnknownProcedure(id)) if id == "visa"
        ));

        let unstarted = self::store();
        assert!(matches!(
            unstarted.open_branch("licencia", "acta_nacimiento", "acta", "Sin acta"),
            Err(FlowError::NotStarted(id)) if id == "licencia"
        ));
        assert!(!unstarted.is_started("acta_nacimiento"));
    }

    #[test]
    fn test_reset_keeps_entry_shared() {
        let store = store();
        store.start("licencia", false).unwrap();
        let held = store.entry("licencia").unwrap();

        store.start("licencia", true).unwrap();
        lock(&held).unwrap().answer("foto", true);

        assert_eq!(store.get("licencia").unwrap().answers.get("foto"), Some(&true));
    }

    #[test]
    fn test_concurrent_answers_are_serialized_per_procedure() {
        let store = store();
        store.start("licencia", false).unwrap();
        store.start("acta_nacimiento", false).unwrap();

        std::thread::scope(|s| {
            for worker in 0..8 {
                let store = &store;
                s.spawn(move || {
                    for i in 0..50 {
                        let value = (worker + i) % 2 == 0;
                        store.answer_prerequisite("licencia", "acta", value).unwrap();
                        store
                            .answer_prerequisite("licencia", &format!("w{}", worker), true)
                            .unwrap();
                        store
                            .answer_prerequisite("acta_nacimiento", "curp", value)
                            .unwrap();
                    }
                });
            }
        });

        let licencia = store.get("licencia").unwrap();
        // One shared key plus one key per worker, none lost
        assert_eq!(licencia.answers.len(), 9);
        assert!(licencia.answers.contains_key("acta"));
        assert!((0..8).all(|w| licencia.answers.get(&format!("w{}", w)) == Some(&true)));
        assert_eq!(licencia.phase, Phase::Information);

        let acta = store.get("acta_nacimiento").unwrap();
        assert_eq!(acta.answers.len(), 1);
        assert!(acta.updated_at >= acta.created_at);
    }
}
