//! Progress State Types
//!
//! Defines the per-procedure progress record, its branches and the blockers
//! reported when a guarded phase transition is rejected.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

use crate::phase::Phase;
use crate::segmentation::Segmentation;

/// Progress of one procedure instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressState {
    /// Procedure this progress belongs to (also its store key)
    pub procedure_id: String,
    /// Current phase
    pub phase: Phase,
    /// Applicant situation, once the segmentation wizard has run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segmentation: Option<Segmentation>,

    /// Prerequisite id → "I have it"
    #[serde(default)]
    pub answers: BTreeMap<String, bool>,
    /// Prerequisites answered `true` only because the applicant skipped them
    #[serde(default)]
    pub skipped: BTreeSet<String>,
    /// Phases already left behind, in the order they were completed
    #[serde(default)]
    pub completed_phases: Vec<Phase>,
    /// Sub-procedures opened to satisfy missing prerequisites
    #[serde(default)]
    pub branches: Vec<Branch>,
    /// Document id → uploaded
    #[serde(default)]
    pub documents: BTreeMap<String, bool>,
    /// History of phase transitions
    #[serde(default)]
    pub history: Vec<PhaseTransition>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProgressState {
    /// Fresh progress at the `information` phase
    pub fn new(procedure_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            procedure_id: procedure_id.into(),
            phase: Phase::Information,
            segmentation: None,
            answers: BTreeMap::new(),
            skipped: BTreeSet::new(),
            completed_phases: Vec::new(),
            branches: Vec::new(),
            documents: BTreeMap::new(),
            history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Record a phase change; the left phase is marked completed once
    pub fn transition_to(&mut self, to: Phase) {
        let from = std::mem::replace(&mut self.phase, to);
        if !self.completed_phases.contains(&from) {
            self.completed_phases.push(from);
        }

        let now = Utc::now();
        self.history.push(PhaseTransition {
            from,
            to,
            transitioned_at: now,
        });
        self.updated_at = now;
    }

    /// A genuine answer replaces any earlier skip
    pub fn answer(&mut self, prerequisite_id: &str, value: bool) {
        self.answers.insert(prerequisite_id.to_string(), value);
        self.skipped.remove(prerequisite_id);
        self.touch();
    }

    pub fn skip(&mut self, prerequisite_id: &str) {
        self.answers.insert(prerequisite_id.to_string(), true);
        self.skipped.insert(prerequisite_id.to_string());
        self.touch();
    }

    pub fn mark_document(&mut self, document_id: &str, uploaded: bool) {
        self.documents.insert(document_id.to_string(), uploaded);
        self.touch();
    }

    pub fn set_segmentation(&mut self, segmentation: Segmentation) {
        self.segmentation = Some(segmentation);
        self.touch();
    }

    /// Does this prerequisite count as satisfied for phase gating?
    pub fn is_satisfied(&self, prerequisite_id: &str) -> bool {
        self.answers.get(prerequisite_id).copied().unwrap_or(false)
    }

    pub fn prerequisite_status(&self, prerequisite_id: &str) -> PrerequisiteStatus {
        if self.skipped.contains(prerequisite_id) {
            return PrerequisiteStatus::Skipped;
        }
        match self.answers.get(prerequisite_id) {
            Some(true) => PrerequisiteStatus::Have,
            Some(false) => PrerequisiteStatus::Missing,
            None => PrerequisiteStatus::Unanswered,
        }
    }

    pub fn branch(&self, branch_id: Uuid) -> Option<&Branch> {
        self.branches.iter().find(|b| b.branch_id == branch_id)
    }

    pub fn branch_mut(&mut self, branch_id: Uuid) -> Option<&mut Branch> {
        self.branches.iter_mut().find(|b| b.branch_id == branch_id)
    }

    /// Non-terminal branch already open for a target procedure
    pub fn active_branch_for(&self, target_procedure_id: &str) -> Option<&Branch> {
        self.branches
            .iter()
            .find(|b| b.target_procedure_id == target_procedure_id && !b.state.is_terminal())
    }

    pub fn open_branches(&self) -> impl Iterator<Item = &Branch> {
        self.branches.iter().filter(|b| !b.state.is_terminal())
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Record of a phase transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub from: Phase,
    pub to: Phase,
    pub transitioned_at: DateTime<Utc>,
}

/// How the applicant stands on a single prerequisite
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrerequisiteStatus {
    Unanswered,
    Have,
    Missing,
    Skipped,
}

impl PrerequisiteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unanswered => "unanswered",
            Self::Have => "have",
            Self::Missing => "missing",
            Self::Skipped => "skipped",
        }
    }
}

impl std::fmt::Display for PrerequisiteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// State of a branch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BranchState {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl BranchState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl std::fmt::Display for BranchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A dependent sub-procedure opened to satisfy a missing prerequisite
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    pub branch_id: Uuid,
    /// Procedure the applicant has to go through first
    pub target_procedure_id: String,
    /// Procedure that spawned this branch
    pub parent_procedure_id: String,
    pub state: BranchState,
    pub reason: String,
    /// Prerequisite of the parent this branch produces
    pub prerequisite_id: String,
    pub opened_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
}

impl Branch {
    pub fn new(
        parent_procedure_id: impl Into<String>,
        target_procedure_id: impl Into<String>,
        prerequisite_id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            branch_id: Uuid::new_v4(),
            target_procedure_id: target_procedure_id.into(),
            parent_procedure_id: parent_procedure_id.into(),
            state: BranchState::InProgress,
            reason: reason.into(),
            prerequisite_id: prerequisite_id.into(),
            opened_at: Utc::now(),
            closed_at: None,
        }
    }

    pub fn close(&mut self, cancelled: bool) {
        self.state = if cancelled {
            BranchState::Cancelled
        } else {
            BranchState::Completed
        };
        self.closed_at = Some(Utc::now());
    }
}

/// A reason a guarded phase transition is rejected
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blocker {
    pub blocker_type: BlockerType,
    /// Human-readable description
    pub description: String,
}

impl Blocker {
    pub fn new(blocker_type: BlockerType, description: impl Into<String>) -> Self {
        Self {
            blocker_type,
            description: description.into(),
        }
    }

    pub fn prerequisite_id(&self) -> &str {
        match &self.blocker_type {
            BlockerType::Unanswered { prerequisite_id }
            | BlockerType::Missing {
                prerequisite_id, ..
            } => prerequisite_id,
        }
    }
}

/// Types of blockers with their specific data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum BlockerType {
    /// Applicant has not said whether they have it
    Unanswered { prerequisite_id: String },

    /// Applicant said they do not have it
    Missing {
        prerequisite_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        related_procedure_id: Option<String>,
    },
}

impl BlockerType {
    /// Suggested way out of this blocker
    pub fn suggested_action(&self) -> SuggestedAction {
        match self {
            BlockerType::Unanswered { prerequisite_id } => SuggestedAction::Answer {
                prerequisite_id: prerequisite_id.clone(),
            },
            BlockerType::Missing {
                related_procedure_id: Some(target),
                prerequisite_id,
            } => SuggestedAction::OpenBranch {
                target_procedure_id: target.clone(),
                prerequisite_id: prerequisite_id.clone(),
            },
            BlockerType::Missing {
                prerequisite_id, ..
            } => SuggestedAction::Obtain {
                prerequisite_id: prerequisite_id.clone(),
            },
        }
    }
}

/// What the UI can offer to resolve a blocker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "action")]
pub enum SuggestedAction {
    Answer { prerequisite_id: String },
    OpenBranch {
        target_procedure_id: String,
        prerequisite_id: String,
    },
    /// Nothing in the catalog produces it; the applicant must get it elsewhere
    Obtain { prerequisite_id: String },
}
