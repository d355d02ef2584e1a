//! crates/study_assistant_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::status::{derive_overall_status, DocumentStatus, TaskKind, TaskStatus};

//=========================================================================================
// Generated Content
//=========================================================================================

/// The opaque payload produced by the generation service for one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "format", content = "data", rename_all = "snake_case")]
pub enum GeneratedContent {
    /// Free text, used for summaries.
    Text(String),
    /// Structured JSON, used for quizzes and flashcards.
    Structured(serde_json::Value),
}

impl GeneratedContent {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            GeneratedContent::Text(text) => Some(text),
            GeneratedContent::Structured(_) => None,
        }
    }

    /// The payload as JSON, with text wrapped in a JSON string.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            GeneratedContent::Text(text) => serde_json::Value::String(text.clone()),
            GeneratedContent::Structured(value) => value.clone(),
        }
    }
}

//=========================================================================================
// Task Updates and Transition Errors
//=========================================================================================

/// A requested change to a single content task.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskUpdate {
    /// The task was dispatched to the generation service.
    Start,
    /// Generation succeeded.
    Complete(GeneratedContent),
    /// Generation failed with the given message.
    Fail(String),
    /// Regeneration was requested for a failed task.
    Reset,
    /// The content of a settled task was replaced by hand.
    Replace(GeneratedContent),
}

impl TaskUpdate {
    /// The status the task ends up in when the update is applied.
    pub fn target_status(&self) -> TaskStatus {
        match self {
            TaskUpdate::Start => TaskStatus::Processing,
            TaskUpdate::Complete(_) | TaskUpdate::Replace(_) => TaskStatus::Completed,
            TaskUpdate::Fail(_) => TaskStatus::Failed,
            TaskUpdate::Reset => TaskStatus::Pending,
        }
    }
}

/// Why an update was refused. The task is left untouched in every case.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("The {kind} task cannot move from {from} to {to}")]
    InvalidTransition {
        kind: TaskKind,
        from: TaskStatus,
        to: TaskStatus,
    },
    #[error("The {kind} task cannot be regenerated while {sibling} is still {status}")]
    SiblingInFlight {
        kind: TaskKind,
        sibling: TaskKind,
        status: TaskStatus,
    },
    #[error("Corrupt {kind} task: {reason}")]
    Corrupt { kind: TaskKind, reason: String },
}

//=========================================================================================
// Content Task
//=========================================================================================

/// One generation unit (summary, quiz or flashcards) of a document.
///
/// `content` is present iff the task is `Completed` and `error` is present iff
/// it is `Failed`. The fields are private so every change goes through
/// [`ContentTask::apply`].
#[derive(Debug, Clone, PartialEq)]
pub struct ContentTask {
    kind: TaskKind,
    status: TaskStatus,
    content: Option<GeneratedContent>,
    error: Option<String>,
    updated_at: DateTime<Utc>,
}

impl ContentTask {
    pub fn pending(kind: TaskKind, now: DateTime<Utc>) -> Self {
        Self {
            kind,
            status: TaskStatus::Pending,
            content: None,
            error: None,
            updated_at: now,
        }
    }

    /// Rebuilds a task from persisted fields, checking the content/error invariant.
    pub fn restore(
        kind: TaskKind,
        status: TaskStatus,
        content: Option<GeneratedContent>,
        error: Option<String>,
        updated_at: DateTime<Utc>,
    ) -> Result<Self, TransitionError> {
        let corrupt = |reason: &str| TransitionError::Corrupt {
            kind,
            reason: reason.to_string(),
        };
        if content.is_some() != (status == TaskStatus::Completed) {
            return Err(corrupt("content must be present exactly when completed"));
        }
        if error.is_some() != (status == TaskStatus::Failed) {
            return Err(corrupt("error must be present exactly when failed"));
        }
        Ok(Self {
            kind,
            status,
            content,
            error,
            updated_at,
        })
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn content(&self) -> Option<&GeneratedContent> {
        self.content.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Applies an update. Returns `Ok(false)` when the update repeats the
    /// current terminal state exactly, in which case nothing changes.
    pub fn apply(&mut self, update: TaskUpdate, now: DateTime<Utc>) -> Result<bool, TransitionError> {
        if self.is_repeat_of(&update) {
            return Ok(false);
        }

        let to = update.target_status();
        let allowed = match update {
            TaskUpdate::Replace(_) => self.status.is_terminal(),
            _ => self.status.can_transition_to(to),
        };
        if !allowed {
            return Err(TransitionError::InvalidTransition {
                kind: self.kind,
                from: self.status,
                to,
            });
        }

        let (content, error) = match update {
            TaskUpdate::Start | TaskUpdate::Reset => (None, None),
            TaskUpdate::Complete(content) | TaskUpdate::Replace(content) => (Some(content), None),
            TaskUpdate::Fail(message) => (None, Some(message)),
        };
        self.status = to;
        self.content = content;
        self.error = error;
        self.updated_at = now;
        Ok(true)
    }

    fn is_repeat_of(&self, update: &TaskUpdate) -> bool {
        match update {
            TaskUpdate::Complete(content) | TaskUpdate::Replace(content) => {
                self.status == TaskStatus::Completed && self.content.as_ref() == Some(content)
            }
            TaskUpdate::Fail(message) => {
                self.status == TaskStatus::Failed && self.error.as_deref() == Some(message.as_str())
            }
            TaskUpdate::Start | TaskUpdate::Reset => false,
        }
    }
}

//=========================================================================================
// Task Set
//=========================================================================================

/// Exactly one task of every kind.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSet {
    summary: ContentTask,
    quiz: ContentTask,
    flashcards: ContentTask,
}

impl TaskSet {
    pub fn pending(now: DateTime<Utc>) -> Self {
        Self {
            summary: ContentTask::pending(TaskKind::Summary, now),
            quiz: ContentTask::pending(TaskKind::Quiz, now),
            flashcards: ContentTask::pending(TaskKind::Flashcards, now),
        }
    }

    /// Assembles a set from persisted tasks, which must cover every kind once.
    pub fn from_tasks(tasks: impl IntoIterator<Item = ContentTask>) -> Result<Self, TransitionError> {
        let mut summary = None;
        let mut quiz = None;
        let mut flashcards = None;

        for task in tasks {
            let kind = task.kind();
            let slot = match kind {
                TaskKind::Summary => &mut summary,
                TaskKind::Quiz => &mut quiz,
                TaskKind::Flashcards => &mut flashcards,
            };
            if slot.replace(task).is_some() {
                return Err(TransitionError::Corrupt {
                    kind,
                    reason: "duplicate task".to_string(),
                });
            }
        }

        let missing = |kind| TransitionError::Corrupt {
            kind,
            reason: "missing task".to_string(),
        };
        Ok(Self {
            summary: summary.ok_or_else(|| missing(TaskKind::Summary))?,
            quiz: quiz.ok_or_else(|| missing(TaskKind::Quiz))?,
            flashcards: flashcards.ok_or_else(|| missing(TaskKind::Flashcards))?,
        })
    }

    pub fn get(&self, kind: TaskKind) -> &ContentTask {
        match kind {
            TaskKind::Summary => &self.summary,
            TaskKind::Quiz => &self.quiz,
            TaskKind::Flashcards => &self.flashcards,
        }
    }

    fn get_mut(&mut self, kind: TaskKind) -> &mut ContentTask {
        match kind {
            TaskKind::Summary => &mut self.summary,
            TaskKind::Quiz => &mut self.quiz,
            TaskKind::Flashcards => &mut self.flashcards,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ContentTask> {
        [&self.summary, &self.quiz, &self.flashcards].into_iter()
    }

    pub fn overall_status(&self) -> DocumentStatus {
        derive_overall_status(self.iter().map(ContentTask::status))
    }
}

//=========================================================================================
// Document
//=========================================================================================

/// An uploaded document and its three content tasks.
///
/// There is deliberately no status field: [`Document::status`] is always
/// computed from the tasks.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub size: u64,
    pub file_type: String,
    pub upload_date: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    tasks: TaskSet,
}

impl Document {
    pub fn new(owner_id: Uuid, name: &str, size: u64, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            name: name.to_string(),
            size,
            file_type: file_type_for(name).to_string(),
            upload_date: now,
            updated_at: now,
            tasks: TaskSet::pending(now),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: Uuid,
        owner_id: Uuid,
        name: String,
        size: u64,
        file_type: String,
        upload_date: DateTime<Utc>,
        updated_at: DateTime<Utc>,
        tasks: TaskSet,
    ) -> Self {
        Self {
            id,
            owner_id,
            name,
            size,
            file_type,
            upload_date,
            updated_at,
            tasks,
        }
    }

    pub fn status(&self) -> DocumentStatus {
        self.tasks.overall_status()
    }

    pub fn tasks(&self) -> &TaskSet {
        &self.tasks
    }

    pub fn task(&self, kind: TaskKind) -> &ContentTask {
        self.tasks.get(kind)
    }

    /// Applies an update to one task and refreshes `updated_at` if anything
    /// changed.
    ///
    /// A reset is refused while any sibling task is still pending or
    /// processing, so regeneration only starts once the document has settled.
    pub fn apply(
        &mut self,
        kind: TaskKind,
        update: TaskUpdate,
        now: DateTime<Utc>,
    ) -> Result<bool, TransitionError> {
        if update == TaskUpdate::Reset {
            if let Some(sibling) = self
                .tasks
                .iter()
                .find(|task| task.kind() != kind && task.status().is_in_flight())
            {
                return Err(TransitionError::SiblingInFlight {
                    kind,
                    sibling: sibling.kind(),
                    status: sibling.status(),
                });
            }
        }

        let changed = self.tasks.get_mut(kind).apply(update, now)?;
        if changed {
            self.updated_at = now;
        }
        Ok(changed)
    }

    /// Messages of every failed task, prefixed with the task kind.
    pub fn error_summary(&self) -> Option<String> {
        let messages: Vec<String> = self
            .tasks
            .iter()
            .filter_map(|task| task.error().map(|error| format!("{}: {}", task.kind(), error)))
            .collect();
        if messages.is_empty() {
            None
        } else {
            Some(messages.join("; "))
        }
    }
}

/// The raw bytes of an uploaded document, as handed to the generation service.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub document_id: Uuid,
    pub name: String,
    pub file_type: String,
    pub bytes: Bytes,
}

/// Maps a file name's extension to the MIME type recorded for the document.
pub fn file_type_for(file_name: &str) -> &'static str {
    let extension = match file_name.rsplit_once('.') {
        Some((_, extension)) => extension.to_ascii_lowercase(),
        None => String::new(),
    };
    match extension.as_str() {
        "pdf" => "application/pdf",
        "doc" | "docx" => "application/msword",
        "ppt" | "pptx" => "application/vnd.ms-powerpoint",
        "txt" => "text/plain",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(value: &str) -> GeneratedContent {
        GeneratedContent::Text(value.to_string())
    }

    fn document() -> Document {
        Document::new(Uuid::new_v4(), "lecture.pdf", 1024, Utc::now())
    }

    fn settle(doc: &mut Document, kind: TaskKind, update: TaskUpdate) {
        doc.apply(kind, TaskUpdate::Start, Utc::now()).unwrap();
        doc.apply(kind, update, Utc::now()).unwrap();
    }

    #[test]
    fn new_document_has_three_pending_tasks() {
        let doc = document();
        assert_eq!(doc.status(), DocumentStatus::Uploaded);
        assert_eq!(doc.file_type, "application/pdf");
        for kind in TaskKind::ALL {
            let task = doc.task(kind);
            assert_eq!(task.kind(), kind);
            assert_eq!(task.status(), TaskStatus::Pending);
            assert!(task.content().is_none());
            assert!(task.error().is_none());
        }
    }

    #[test]
    fn status_follows_tasks_through_the_lifecycle() {
        let mut doc = document();

        doc.apply(TaskKind::Summary, TaskUpdate::Start, Utc::now()).unwrap();
        assert_eq!(doc.status(), DocumentStatus::Processing);

        doc.apply(TaskKind::Summary, TaskUpdate::Complete(text("short")), Utc::now())
            .unwrap();
        settle(&mut doc, TaskKind::Quiz, TaskUpdate::Fail("model overloaded".into()));
        assert_eq!(doc.status(), DocumentStatus::Processing);

        settle(&mut doc, TaskKind::Flashcards, TaskUpdate::Complete(text("cards")));
        assert_eq!(doc.status(), DocumentStatus::Error);
        assert_eq!(doc.error_summary().as_deref(), Some("quiz: model overloaded"));
    }

    #[test]
    fn completing_sets_content_and_failing_sets_error() {
        let mut doc = document();
        settle(&mut doc, TaskKind::Summary, TaskUpdate::Complete(text("abc")));
        let summary = doc.task(TaskKind::Summary);
        assert_eq!(summary.content(), Some(&text("abc")));
        assert!(summary.error().is_none());

        settle(&mut doc, TaskKind::Quiz, TaskUpdate::Fail("boom".into()));
        let quiz = doc.task(TaskKind::Quiz);
        assert!(quiz.content().is_none());
        assert_eq!(quiz.error(), Some("boom"));
    }

    #[test]
    fn invalid_transitions_are_rejected_without_change() {
        let mut doc = document();
        let before = doc.clone();

        let err = doc
            .apply(TaskKind::Quiz, TaskUpdate::Complete(text("early")), Utc::now())
            .unwrap_err();
        assert_eq!(
            err,
            TransitionError::InvalidTransition {
                kind: TaskKind::Quiz,
                from: TaskStatus::Pending,
                to: TaskStatus::Completed,
            }
        );
        assert_eq!(doc, before);

        doc.apply(TaskKind::Quiz, TaskUpdate::Start, Utc::now()).unwrap();
        assert!(doc.apply(TaskKind::Quiz, TaskUpdate::Start, Utc::now()).is_err());
    }

    #[test]
    fn repeating_a_terminal_update_is_a_no_op() {
        let mut doc = document();
        settle(&mut doc, TaskKind::Summary, TaskUpdate::Complete(text("same")));
        let snapshot = doc.clone();

        let changed = doc
            .apply(TaskKind::Summary, TaskUpdate::Complete(text("same")), Utc::now())
            .unwrap();
        assert!(!changed);
        assert_eq!(doc, snapshot);

        assert!(doc
            .apply(TaskKind::Summary, TaskUpdate::Complete(text("other")), Utc::now())
            .is_err());
        assert_eq!(doc, snapshot);
    }

    #[test]
    fn reset_requires_failed_task_and_settled_siblings() {
        let mut doc = document();
        settle(&mut doc, TaskKind::Summary, TaskUpdate::Complete(text("s")));
        settle(&mut doc, TaskKind::Quiz, TaskUpdate::Fail("timeout".into()));

        let err = doc.apply(TaskKind::Quiz, TaskUpdate::Reset, Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            TransitionError::SiblingInFlight {
                sibling: TaskKind::Flashcards,
                status: TaskStatus::Pending,
                ..
            }
        ));

        settle(&mut doc, TaskKind::Flashcards, TaskUpdate::Complete(text("f")));
        assert!(doc.apply(TaskKind::Summary, TaskUpdate::Reset, Utc::now()).is_err());

        assert!(doc.apply(TaskKind::Quiz, TaskUpdate::Reset, Utc::now()).unwrap());
        let quiz = doc.task(TaskKind::Quiz);
        assert_eq!(quiz.status(), TaskStatus::Pending);
        assert!(quiz.error().is_none());
        assert_eq!(doc.status(), DocumentStatus::Processing);
    }

    #[test]
    fn replace_only_applies_to_settled_tasks() {
        let mut doc = document();
        assert!(doc
            .apply(TaskKind::Summary, TaskUpdate::Replace(text("manual")), Utc::now())
            .is_err());

        settle(&mut doc, TaskKind::Summary, TaskUpdate::Fail("bad".into()));
        assert!(doc
            .apply(TaskKind::Summary, TaskUpdate::Replace(text("manual")), Utc::now())
            .unwrap());
        assert_eq!(doc.task(TaskKind::Summary).status(), TaskStatus::Completed);

        assert!(doc
            .apply(TaskKind::Summary, TaskUpdate::Replace(text("edited")), Utc::now())
            .unwrap());
        assert_eq!(doc.task(TaskKind::Summary).content(), Some(&text("edited")));
    }

    #[test]
    fn restore_checks_invariants() {
        let now = Utc::now();
        assert!(ContentTask::restore(TaskKind::Quiz, TaskStatus::Completed, None, None, now).is_err());
        assert!(ContentTask::restore(TaskKind::Quiz, TaskStatus::Failed, None, None, now).is_err());
        assert!(
            ContentTask::restore(TaskKind::Quiz, TaskStatus::Pending, None, Some("x".into()), now)
                .is_err()
        );

        let tasks = vec![
            ContentTask::pending(TaskKind::Summary, now),
            ContentTask::pending(TaskKind::Summary, now),
            ContentTask::pending(TaskKind::Flashcards, now),
        ];
        assert!(TaskSet::from_tasks(tasks).is_err());
        assert!(TaskSet::from_tasks(vec![ContentTask::pending(TaskKind::Quiz, now)]).is_err());
    }

    #[test]
    fn file_types_follow_extension() {
        assert_eq!(file_type_for("notes.TXT"), "text/plain");
        assert_eq!(file_type_for("slides.pptx"), "application/vnd.ms-powerpoint");
        assert_eq!(file_type_for("scan.jpeg"), "image/jpeg");
        assert_eq!(file_type_for("README"), "application/octet-stream");
    }
}
