//! services/api/src/processing/generation_task.rs
//!
//! This module contains the asynchronous "worker" function responsible for
//! generating one kind of study material for one document.

use std::sync::Arc;
use std::time::{Duration, Instant};
use study_assistant_core::{
    domain::{Document, TaskUpdate},
    ports::{ContentGenerationService, DocumentStore, GenerationError, PortError, PortResult},
    status::{TaskKind, TaskStatus},
};
use tracing::{error, info, warn};
use uuid::Uuid;

/// How often the terminal state of a task is written before giving up.
const TERMINAL_WRITE_ATTEMPTS: u32 = 3;
const TERMINAL_WRITE_BACKOFF: Duration = Duration::from_millis(50);

/// Runs a single generation task from dispatch to its terminal state.
///
/// The task is moved to PROCESSING first; if that transition is refused the
/// error is returned and the generation service is never called. Every
/// generation failure, including the timeout, is recorded on the task as
/// FAILED rather than returned, so only storage errors escape.
///
/// The terminal write is retried on storage errors. If the generated content
/// still cannot be stored, the task is recorded as FAILED instead so that it
/// never stays in PROCESSING.
pub async fn generation_process(
    store: Arc<dyn DocumentStore>,
    generator: Arc<dyn ContentGenerationService>,
    generation_timeout: Duration,
    document_id: Uuid,
    kind: TaskKind,
) -> PortResult<TaskStatus> {
    let source = store.get_source(document_id).await?;
    store.update_task(document_id, kind, TaskUpdate::Start).await?;
    info!("Generating {} for document {} ({})", kind, document_id, source.name);

    let started = Instant::now();
    let outcome = match tokio::time::timeout(generation_timeout, generator.generate(kind, &source)).await {
        Ok(result) => result,
        Err(_) => Err(GenerationError::Timeout(generation_timeout)),
    };

    let update = match outcome {
        Ok(content) => {
            info!(
                "⏱️ {} for document {} took {:?}",
                kind,
                document_id,
                started.elapsed()
            );
            TaskUpdate::Complete(content)
        }
        Err(e) => {
            warn!("Failed to generate {} for document {}: {}", kind, document_id, e);
            TaskUpdate::Fail(e.to_string())
        }
    };

    let document = match record_outcome(store.as_ref(), document_id, kind, update.clone()).await {
        Err(PortError::Unexpected(e)) if matches!(update, TaskUpdate::Complete(_)) => {
            error!(
                "Could not store {} for document {}, marking it failed: {}",
                kind, document_id, e
            );
            let fallback = TaskUpdate::Fail(format!("Generated content could not be stored: {}", e));
            record_outcome(store.as_ref(), document_id, kind, fallback).await?
        }
        result => result?,
    };
    Ok(document.task(kind).status())
}

/// Writes a terminal update, retrying storage errors with a linear backoff.
/// Refused transitions and missing documents are returned at once.
async fn record_outcome(
    store: &dyn DocumentStore,
    document_id: Uuid,
    kind: TaskKind,
    update: TaskUpdate,
) -> PortResult<Document> {
    let mut attempt = 1;
    loop {
        match store.update_task(document_id, kind, update.clone()).await {
            Err(PortError::Unexpected(e)) if attempt < TERMINAL_WRITE_ATTEMPTS => {
                warn!(
                    "Attempt {} to record {} for document {} failed: {}",
                    attempt, kind, document_id, e
                );
                tokio::time::sleep(TERMINAL_WRITE_BACKOFF * attempt).await;
                attempt += 1;
            }
            result => return result,
        }
    }
}
