//! services/api/src/processing/coordinator.rs
//!
//! The processing coordinator drives a document from upload through the three
//! generation tasks. It owns no state of its own: every change goes through the
//! `DocumentStore`, and the overall status is always derived from the tasks.

use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use study_assistant_core::{
    domain::{Document, GeneratedContent, SourceDocument, TaskUpdate},
    ports::{ContentGenerationService, DocumentStore, PortError, PortResult},
    status::{TaskKind, TaskStatus},
};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::generation_task::generation_process;

/// Resolves to the final status of one generation task.
pub type GenerationHandle = JoinHandle<PortResult<TaskStatus>>;

/// A freshly uploaded document and the generation tasks started for it.
pub struct UploadedDocument {
    pub document: Document,
    pub dispatches: Vec<(TaskKind, GenerationHandle)>,
}

#[derive(Clone)]
pub struct ProcessingCoordinator {
    store: Arc<dyn DocumentStore>,
    generator: Arc<dyn ContentGenerationService>,
    generation_timeout: Duration,
}

impl ProcessingCoordinator {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        generator: Arc<dyn ContentGenerationService>,
        generation_timeout: Duration,
    ) -> Self {
        Self {
            store,
            generator,
            generation_timeout,
        }
    }

    /// Stores a new document and dispatches all three generation tasks.
    ///
    /// The returned document is the snapshot taken at creation, so its status
    /// is always UPLOADED.
    pub async fn upload(&self, owner_id: Uuid, name: &str, content: Bytes) -> PortResult<UploadedDocument> {
        let name = match name.trim() {
            "" => "unknown",
            trimmed => trimmed,
        };
        if content.is_empty() {
            return Err(PortError::Validation(format!("File {} is empty", name)));
        }

        let document = self.store.create_document(owner_id, name, content).await?;
        info!("Document {} uploaded, dispatching generation", document.id);
        let dispatches = self.dispatch_all(document.id);
        Ok(UploadedDocument {
            document,
            dispatches,
        })
    }

    /// Starts one independent tokio task per kind.
    pub fn dispatch_all(&self, document_id: Uuid) -> Vec<(TaskKind, GenerationHandle)> {
        TaskKind::ALL
            .into_iter()
            .map(|kind| (kind, self.request_generation(document_id, kind)))
            .collect()
    }

    /// Dispatches generation of `kind` in the background.
    ///
    /// The task must be PENDING or FAILED; otherwise the handle resolves to a
    /// `Conflict` and nothing is generated.
    pub fn request_generation(&self, document_id: Uuid, kind: TaskKind) -> GenerationHandle {
        let store = self.store.clone();
        let generator = self.generator.clone();
        let timeout = self.generation_timeout;

        tokio::spawn(async move {
            let result = generation_process(store, generator, timeout, document_id, kind).await;
            if let Err(e) = &result {
                error!("Generation of {} for document {} did not complete: {}", kind, document_id, e);
            }
            result
        })
    }

    /// Settles tasks left behind by a previous process. Call once at startup,
    /// before any generation is dispatched.
    ///
    /// Tasks still PROCESSING have lost their worker and are marked FAILED so
    /// they can be retried. PENDING tasks were never started and are dispatched.
    pub async fn recover_interrupted(&self) -> PortResult<Vec<(TaskKind, GenerationHandle)>> {
        for (document_id, kind) in self.store.tasks_with_status(TaskStatus::Processing).await? {
            let update = TaskUpdate::Fail("Generation was interrupted before it finished".to_string());
            match self.store.update_task(document_id, kind, update).await {
                Ok(_) => warn!("Marked interrupted {} of document {} as failed", kind, document_id),
                Err(e @ (PortError::Conflict(_) | PortError::NotFound(_))) => {
                    warn!("Skipped recovery of {} for document {}: {}", kind, document_id, e)
                }
                Err(e) => return Err(e),
            }
        }

        let pending = self.store.tasks_with_status(TaskStatus::Pending).await?;
        Ok(pending
            .into_iter()
            .map(|(document_id, kind)| (kind, self.request_generation(document_id, kind)))
            .collect())
    }

    /// Resets a failed task to PENDING and dispatches it again.
    ///
    /// Refused with `Conflict` unless the task is FAILED and no other task of
    /// the document is still pending or processing.
    pub async fn retry(
        &self,
        document_id: Uuid,
        owner_id: Uuid,
        kind: TaskKind,
    ) -> PortResult<(Document, GenerationHandle)> {
        self.store.get_document(document_id, owner_id).await?;
        let document = self.store.update_task(document_id, kind, TaskUpdate::Reset).await?;
        info!("Retrying {} for document {}", kind, document_id);
        Ok((document, self.request_generation(document_id, kind)))
    }

    /// Replaces the summary by hand once the summary task has settled.
    pub async fn update_summary(
        &self,
        document_id: Uuid,
        owner_id: Uuid,
        summary: &str,
    ) -> PortResult<Document> {
        if summary.trim().is_empty() {
            return Err(PortError::Validation("Summary must not be blank".to_string()));
        }
        self.store.get_document(document_id, owner_id).await?;
        self.store
            .update_task(
                document_id,
                TaskKind::Summary,
                TaskUpdate::Replace(GeneratedContent::Text(summary.to_string())),
            )
            .await
    }

    pub async fn document(&self, document_id: Uuid, owner_id: Uuid) -> PortResult<Document> {
        self.store.get_document(document_id, owner_id).await
    }

    pub async fn list(&self, owner_id: Uuid) -> PortResult<Vec<Document>> {
        self.store.list_documents(owner_id).await
    }

    /// The uploaded bytes, for the owner only.
    pub async fn source(&self, document_id: Uuid, owner_id: Uuid) -> PortResult<SourceDocument> {
        self.store.get_document(document_id, owner_id).await?;
        self.store.get_source(document_id).await
    }

    pub async fn delete(&self, document_id: Uuid, owner_id: Uuid) -> PortResult<()> {
        self.store.delete_document(document_id, owner_id).await
    }
}
