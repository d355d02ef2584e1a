//! services/api/src/web/views.rs
//!
//! JSON payloads of the REST API. Statuses are rendered with their
//! SCREAMING_SNAKE_CASE names, keys in camelCase.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use study_assistant_core::{
    domain::Document,
    status::{DocumentStatus, TaskKind, TaskStatus},
};
use utoipa::ToSchema;
use uuid::Uuid;

//=========================================================================================
// Upload
//=========================================================================================

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadedDocumentView {
    pub id: Uuid,
    pub name: String,
    #[schema(value_type = String, example = "UPLOADED")]
    pub status: DocumentStatus,
}

/// The response payload sent after an upload.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub document_ids: Vec<Uuid>,
    pub documents: Vec<UploadedDocumentView>,
    /// `success`, or `partial_success` when some files were rejected.
    pub status: String,
    pub errors: Vec<String>,
}

impl UploadResponse {
    pub fn new(documents: Vec<UploadedDocumentView>, errors: Vec<String>) -> Self {
        let status = if errors.is_empty() {
            "success"
        } else {
            "partial_success"
        };
        Self {
            document_ids: documents.iter().map(|d| d.id).collect(),
            documents,
            status: status.to_string(),
            errors,
        }
    }
}

//=========================================================================================
// Listing
//=========================================================================================

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DocumentListItem {
    pub id: Uuid,
    pub name: String,
    pub size: u64,
    #[serde(rename = "type")]
    pub file_type: String,
    pub upload_date: DateTime<Utc>,
    #[schema(value_type = String, example = "READY")]
    pub status: DocumentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DocumentListResponse {
    pub documents: Vec<DocumentListItem>,
}

impl From<&Document> for DocumentListItem {
    fn from(doc: &Document) -> Self {
        Self {
            id: doc.id,
            name: doc.name.clone(),
            size: doc.size,
            file_type: doc.file_type.clone(),
            upload_date: doc.upload_date,
            status: doc.status(),
            summary: task_text(doc, TaskKind::Summary),
        }
    }
}

//=========================================================================================
// Status and Content
//=========================================================================================

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DocumentStatusView {
    pub document_id: Uuid,
    pub document_name: String,
    #[schema(value_type = String, example = "PROCESSING")]
    pub overall_status: DocumentStatus,
    #[schema(value_type = String, example = "COMPLETED")]
    pub summary_status: TaskStatus,
    #[schema(value_type = String, example = "PROCESSING")]
    pub quiz_status: TaskStatus,
    #[schema(value_type = String, example = "PENDING")]
    pub flashcard_status: TaskStatus,
    pub upload_date: DateTime<Utc>,
    /// The messages of failed tasks, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&Document> for DocumentStatusView {
    fn from(doc: &Document) -> Self {
        Self {
            document_id: doc.id,
            document_name: doc.name.clone(),
            overall_status: doc.status(),
            summary_status: doc.task(TaskKind::Summary).status(),
            quiz_status: doc.task(TaskKind::Quiz).status(),
            flashcard_status: doc.task(TaskKind::Flashcards).status(),
            upload_date: doc.upload_date,
            error: doc.error_summary(),
        }
    }
}

/// Everything generated for a document so far. Fields of unfinished tasks are null.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DocumentContentView {
    pub id: Uuid,
    pub original_name: String,
    pub summary: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub quiz_data: Option<serde_json::Value>,
    #[schema(value_type = Option<Object>)]
    pub flashcard_data: Option<serde_json::Value>,
    #[schema(value_type = String, example = "READY")]
    pub status: DocumentStatus,
    #[schema(value_type = String)]
    pub summary_status: TaskStatus,
    #[schema(value_type = String)]
    pub quiz_status: TaskStatus,
    #[schema(value_type = String)]
    pub flashcard_status: TaskStatus,
    pub upload_date: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Document> for DocumentContentView {
    fn from(doc: &Document) -> Self {
        let structured = |kind| doc.task(kind).content().map(|content| content.to_json());
        Self {
            id: doc.id,
            original_name: doc.name.clone(),
            summary: task_text(doc, TaskKind::Summary),
            quiz_data: structured(TaskKind::Quiz),
            flashcard_data: structured(TaskKind::Flashcards),
            status: doc.status(),
            summary_status: doc.task(TaskKind::Summary).status(),
            quiz_status: doc.task(TaskKind::Quiz).status(),
            flashcard_status: doc.task(TaskKind::Flashcards).status(),
            upload_date: doc.upload_date,
            updated_at: doc.updated_at,
        }
    }
}

fn task_text(doc: &Document, kind: TaskKind) -> Option<String> {
    doc.task(kind)
        .content()
        .and_then(|content| content.as_text())
        .map(str::to_string)
}

//=========================================================================================
// Requests and Task Views
//=========================================================================================

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UpdateSummaryRequest {
    pub summary: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RetryResponse {
    pub document_id: Uuid,
    #[schema(value_type = String, example = "quiz")]
    pub kind: TaskKind,
    #[schema(value_type = String, example = "PENDING")]
    pub task_status: TaskStatus,
}
