//! Error types for the procedure engine
//!
//! Absence of data (no prerequisites, no known location) is never an error.
//! Only operations that would corrupt later transitions fail.

use thiserror::Error;
use uuid::Uuid;

use crate::phase::Phase;
use crate::state::{Blocker, BranchState};

/// Main error type for procedure flow operations
#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Unknown procedure: {0}")]
    UnknownProcedure(String),

    #[error("Procedure {0} has not been started")]
    NotStarted(String),

    #[error("Cannot move {procedure_id} from {from} to {to}: {} blocker(s)", .blockers.len())]
    PhaseBlocked {
        procedure_id: String,
        from: Phase,
        to: Phase,
        blockers: Vec<Blocker>,
    },

    #[error("Branch {branch_id} not found in procedure {procedure_id}")]
    BranchNotFound { procedure_id: String, branch_id: Uuid },

    #[error("Branch {branch_id} of procedure {procedure_id} is already {state}")]
    BranchClosed {
        procedure_id: String,
        branch_id: Uuid,
        state: BranchState,
    },

    #[error("Invalid catalog: {0}")]
    InvalidCatalog(String),

    #[error("Corrupt progress data: {0}")]
    CorruptProgress(String),

    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl FlowError {
    /// Blockers carried by a rejected transition, empty for every other error
    pub fn blockers(&self) -> &[Blocker] {
        match self {
            FlowError::PhaseBlocked { blockers, .. } => blockers,
            _ => &[],
        }
    }
}

pub type FlowResult<T> = Result<T, FlowError>;
