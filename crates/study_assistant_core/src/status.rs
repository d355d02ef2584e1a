//! crates/study_assistant_core/src/status.rs
//!
//! The processing state machine: the three task kinds, the per-task status,
//! the derived document status and the rules that tie them together.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

//=========================================================================================
// Task Kinds
//=========================================================================================

/// One of the content generation units every document owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Summary,
    Quiz,
    Flashcards,
}

impl TaskKind {
    /// Every kind, in the order tasks are created and reported.
    pub const ALL: [TaskKind; 3] = [TaskKind::Summary, TaskKind::Quiz, TaskKind::Flashcards];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Summary => "summary",
            TaskKind::Quiz => "quiz",
            TaskKind::Flashcards => "flashcards",
        }
    }
}

impl Display for TaskKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "summary" => Ok(TaskKind::Summary),
            "quiz" => Ok(TaskKind::Quiz),
            "flashcards" | "flashcard" => Ok(TaskKind::Flashcards),
            _ => Err(UnknownVariant::new("task kind", s)),
        }
    }
}

//=========================================================================================
// Task Status
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 4] = [
        TaskStatus::Pending,
        TaskStatus::Processing,
        TaskStatus::Completed,
        TaskStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Processing => "PROCESSING",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Failed => "FAILED",
        }
    }

    /// True while the task still has work ahead of it.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::Processing)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// The lifecycle edges a task may take.
    ///
    /// `Failed -> Processing` lets a failed task be dispatched again directly,
    /// `Failed -> Pending` is the explicit regeneration reset. Terminal states
    /// never move back otherwise.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Failed, Processing)
                | (Failed, Pending)
        )
    }
}

impl Display for TaskStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(TaskStatus::Pending),
            "PROCESSING" => Ok(TaskStatus::Processing),
            "COMPLETED" => Ok(TaskStatus::Completed),
            "FAILED" => Ok(TaskStatus::Failed),
            _ => Err(UnknownVariant::new("task status", s)),
        }
    }
}

//=========================================================================================
// Document Status
//=========================================================================================

/// Aggregate status of a document. Always derived from its task statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentStatus {
    Uploaded,
    Processing,
    Ready,
    Error,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Uploaded => "UPLOADED",
            DocumentStatus::Processing => "PROCESSING",
            DocumentStatus::Ready => "READY",
            DocumentStatus::Error => "ERROR",
        }
    }
}

impl Display for DocumentStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// Computes the overall status of a document from its task statuses.
///
/// Only the multiset of statuses matters, so the result is the same no matter
/// in which order the tasks settled.
pub fn derive_overall_status<I>(statuses: I) -> DocumentStatus
where
    I: IntoIterator<Item = TaskStatus>,
{
    let mut all_pending = true;
    let mut in_flight = false;
    let mut failed = false;

    for status in statuses {
        all_pending &= status == TaskStatus::Pending;
        in_flight |= status.is_in_flight();
        failed |= status == TaskStatus::Failed;
    }

    if all_pending {
        DocumentStatus::Uploaded
    } else if in_flight {
        DocumentStatus::Processing
    } else if failed {
        DocumentStatus::Error
    } else {
        DocumentStatus::Ready
    }
}

/// Returned when a stored or user-supplied string names no known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown {what}: '{value}'")]
pub struct UnknownVariant {
    what: &'static str,
    value: String,
}

impl UnknownVariant {
    fn new(what: &'static str, value: &str) -> Self {
        Self {
            what,
            value: value.to_string(),
        }
    }
}
