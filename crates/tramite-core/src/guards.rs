//! Phase Guard Evaluation
//!
//! The state machine itself records any transition. Gating lives here:
//! a forward move that lands beyond `requirements` needs every required,
//! resolved prerequisite to be answered `true` or skipped.

use std::sync::Arc;

use crate::phase::Phase;
use crate::resolver::RequirementResolver;
use crate::state::{Blocker, ProgressState};

/// Result of evaluating a guarded transition
#[derive(Debug, Clone, PartialEq)]
pub struct GuardResult {
    pub passed: bool,
    pub blockers: Vec<Blocker>,
}

impl GuardResult {
    pub fn passed() -> Self {
        Self {
            passed: true,
            blockers: Vec::new(),
        }
    }

    pub fn blocked(blockers: Vec<Blocker>) -> Self {
        Self {
            passed: blockers.is_empty(),
            blockers,
        }
    }
}

/// Evaluates phase transitions against the resolved prerequisites
pub struct PhaseGuard {
    resolver: Arc<RequirementResolver>,
}

impl PhaseGuard {
    pub fn new(resolver: Arc<RequirementResolver>) -> Self {
        Self { resolver }
    }

    /// Evaluate the move from the state's current phase to `to`
    pub fn evaluate(&self, state: &ProgressState, to: Phase) -> GuardResult {
        if !state.phase.crosses_requirements_gate(to) {
            return GuardResult::passed();
        }

        let blockers: Vec<Blocker> = self
            .resolver
            .unmet(&state.procedure_id, state)
            .into_iter()
            .map(|u| u.blocker)
            .collect();

        if blockers.is_empty() {
            GuardResult::passed()
        } else {
            tracing::debug!(
                procedure = %state.procedure_id,
                from = %state.phase,
                to = %to,
                "Transition blocked by {} prerequisite(s)",
                blockers.len()
            );
            GuardResult::blocked(blockers)
        }
    }

    /// Blockers between the current phase and the next gated phase
    pub fn current_blockers(&self, state: &ProgressState) -> Vec<Blocker> {
        if state.phase.rank() > Phase::Requirements.rank() {
            return Vec::new();
        }
        self.evaluate(state, Phase::Payment).blockers
    }
}
