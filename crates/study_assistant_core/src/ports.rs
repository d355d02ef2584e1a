//! crates/study_assistant_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or APIs.

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::{Document, GeneratedContent, SourceDocument, TaskUpdate, TransitionError};
use crate::status::{TaskKind, TaskStatus};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

impl From<TransitionError> for PortError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::Corrupt { .. } => PortError::Unexpected(err.to_string()),
            _ => PortError::Conflict(err.to_string()),
        }
    }
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

/// Failure modes of a single generation call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    #[error("Generation timed out after {0:?}")]
    Timeout(Duration),
    #[error("Generation service error: {0}")]
    Remote(String),
    #[error("Invalid input for generation: {0}")]
    InvalidInput(String),
}

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// Durable storage of documents and their content tasks.
///
/// Implementations must serialize `update_task` calls per document so that
/// concurrent updates to different tasks of one document are never lost, while
/// different documents do not contend with each other.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Creates a document with three pending tasks.
    async fn create_document(&self, owner_id: Uuid, name: &str, content: Bytes) -> PortResult<Document>;

    /// Fails with `NotFound` if the document is missing or owned by someone else.
    async fn get_document(&self, document_id: Uuid, owner_id: Uuid) -> PortResult<Document>;

    /// All documents of an owner, newest upload first.
    async fn list_documents(&self, owner_id: Uuid) -> PortResult<Vec<Document>>;

    async fn get_source(&self, document_id: Uuid) -> PortResult<SourceDocument>;

    /// Atomically applies one task update and returns the resulting snapshot.
    /// Refused transitions surface as `Conflict` and change nothing.
    async fn update_task(
        &self,
        document_id: Uuid,
        kind: TaskKind,
        update: TaskUpdate,
    ) -> PortResult<Document>;

    async fn delete_document(&self, document_id: Uuid, owner_id: Uuid) -> PortResult<()>;

    /// Every task currently in `status`, across all owners.
    async fn tasks_with_status(&self, status: TaskStatus) -> PortResult<Vec<(Uuid, TaskKind)>>;
}

#[async_trait]
pub trait ContentGenerationService: Send + Sync {
    /// Produces the content of one task kind for a document.
    async fn generate(
        &self,
        kind: TaskKind,
        document: &SourceDocument,
    ) -> Result<GeneratedContent, GenerationError>;
}
