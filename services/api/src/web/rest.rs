//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::error::port_error_response;
use crate::web::middleware::CurrentUser;
use crate::web::state::AppState;
use crate::web::views::{
    DocumentContentView, DocumentListItem, DocumentListResponse, DocumentStatusView,
    RetryResponse, UpdateSummaryRequest, UploadResponse, UploadedDocumentView,
};
use axum::{
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json},
    Extension,
};
use std::sync::Arc;
use study_assistant_core::{ports::PortError, status::TaskKind};
use tracing::{error, info, warn};
use utoipa::OpenApi;
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        upload_documents_handler,
        list_documents_handler,
        document_status_handler,
        document_content_handler,
        update_summary_handler,
        retry_task_handler,
        download_document_handler,
        delete_document_handler,
    ),
    components(
        schemas(
            UploadResponse,
            UploadedDocumentView,
            DocumentListResponse,
            DocumentListItem,
            DocumentStatusView,
            DocumentContentView,
            UpdateSummaryRequest,
            RetryResponse
        )
    ),
    tags(
        (name = "Study Assistant API", description = "Document upload and generated study materials.")
    )
)]
pub struct ApiDoc;

type HandlerError = (StatusCode, String);

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Upload one or more documents.
///
/// Every file part is stored separately and its summary, quiz and flashcards
/// are generated in the background. Rejected files are reported in `errors`.
#[utoipa::path(
    post,
    path = "/documents/upload",
    request_body(content_type = "multipart/form-data", description = "One or more files."),
    responses(
        (status = 201, description = "At least one document was stored", body = UploadResponse),
        (status = 400, description = "No file could be stored"),
        (status = 401, description = "Missing or invalid x-user-id header")
    ),
    params(
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn upload_documents_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, HandlerError> {
    let mut documents = Vec::new();
    let mut errors = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            format!("Failed to read multipart data: {}", e),
        )
    })? {
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let data = match field.bytes().await {
            Ok(data) => data,
            Err(e) => {
                errors.push(format!("Error uploading file {}: {}", file_name, e));
                continue;
            }
        };

        match app_state.coordinator.upload(user_id, &file_name, data).await {
            Ok(uploaded) => documents.push(UploadedDocumentView {
                id: uploaded.document.id,
                name: uploaded.document.name.clone(),
                status: uploaded.document.status(),
            }),
            Err(PortError::Validation(message)) => errors.push(message),
            Err(e) => {
                error!("Failed to store {} for user {}: {}", file_name, user_id, e);
                errors.push(format!("Error uploading file {}", file_name));
            }
        }
    }

    if documents.is_empty() {
        if errors.is_empty() {
            return Err((
                StatusCode::BAD_REQUEST,
                "Multipart form must include a file".to_string(),
            ));
        }
        return Err((
            StatusCode::BAD_REQUEST,
            format!("All file uploads failed: {}", errors.join(", ")),
        ));
    }

    info!(
        "User {} uploaded {} document(s), {} rejected",
        user_id,
        documents.len(),
        errors.len()
    );
    Ok((StatusCode::CREATED, Json(UploadResponse::new(documents, errors))))
}

/// List the caller's documents, newest first.
#[utoipa::path(
    get,
    path = "/documents",
    responses(
        (status = 200, description = "The caller's documents", body = DocumentListResponse),
        (status = 401, description = "Missing or invalid x-user-id header")
    ),
    params(
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn list_documents_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, HandlerError> {
    let documents = app_state
        .coordinator
        .list(user_id)
        .await
        .map_err(port_error_response)?;

    Ok(Json(DocumentListResponse {
        documents: documents.iter().map(DocumentListItem::from).collect(),
    }))
}

/// Processing status of one document and each of its tasks.
#[utoipa::path(
    get,
    path = "/documents/{id}/status",
    responses(
        (status = 200, description = "Current status", body = DocumentStatusView),
        (status = 404, description = "Document not found")
    ),
    params(
        ("id" = Uuid, Path, description = "The document ID."),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn document_status_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path(document_id): Path<Uuid>,
) -> Result<impl IntoResponse, HandlerError> {
    let document = app_state
        .coordinator
        .document(document_id, user_id)
        .await
        .map_err(port_error_response)?;
    Ok(Json(DocumentStatusView::from(&document)))
}

/// The generated study materials of one document.
#[utoipa::path(
    get,
    path = "/documents/{id}/content",
    responses(
        (status = 200, description = "Generated content so far", body = DocumentContentView),
        (status = 404, description = "Document not found")
    ),
    params(
        ("id" = Uuid, Path, description = "The document ID."),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn document_content_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path(document_id): Path<Uuid>,
) -> Result<impl IntoResponse, HandlerError> {
    let document = app_state
        .coordinator
        .document(document_id, user_id)
        .await
        .map_err(port_error_response)?;
    Ok(Json(DocumentContentView::from(&document)))
}

/// Replace the summary with an edited version.
#[utoipa::path(
    put,
    path = "/documents/{id}/summary",
    request_body = UpdateSummaryRequest,
    responses(
        (status = 200, description = "Summary replaced", body = DocumentContentView),
        (status = 400, description = "Blank summary"),
        (status = 404, description = "Document not found"),
        (status = 409, description = "The summary is still being generated")
    ),
    params(
        ("id" = Uuid, Path, description = "The document ID."),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn update_summary_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path(document_id): Path<Uuid>,
    Json(request): Json<UpdateSummaryRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let document = app_state
        .coordinator
        .update_summary(document_id, user_id, &request.summary)
        .await
        .map_err(port_error_response)?;
    Ok(Json(DocumentContentView::from(&document)))
}

/// Regenerate a failed task.
#[utoipa::path(
    post,
    path = "/documents/{id}/tasks/{kind}/retry",
    responses(
        (status = 202, description = "Regeneration started", body = RetryResponse),
        (status = 400, description = "Unknown task kind"),
        (status = 404, description = "Document not found"),
        (status = 409, description = "The task has not failed, or another task is still running")
    ),
    params(
        ("id" = Uuid, Path, description = "The document ID."),
        ("kind" = String, Path, description = "summary, quiz or flashcards."),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn retry_task_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path((document_id, kind)): Path<(Uuid, String)>,
) -> Result<impl IntoResponse, HandlerError> {
    let kind = kind
        .parse::<TaskKind>()
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

    let (document, _generation) = app_state
        .coordinator
        .retry(document_id, user_id, kind)
        .await
        .map_err(|e| {
            warn!("Retry of {} for document {} refused: {}", kind, document_id, e);
            port_error_response(e)
        })?;

    let response = RetryResponse {
        document_id,
        kind,
        task_status: document.task(kind).status(),
    };
    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// Download the originally uploaded file.
#[utoipa::path(
    get,
    path = "/documents/{id}/download",
    responses(
        (status = 200, description = "The uploaded file"),
        (status = 404, description = "Document not found")
    ),
    params(
        ("id" = Uuid, Path, description = "The document ID."),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn download_document_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path(document_id): Path<Uuid>,
) -> Result<impl IntoResponse, HandlerError> {
    let source = app_state
        .coordinator
        .source(document_id, user_id)
        .await
        .map_err(port_error_response)?;

    let disposition = format!("attachment; filename=\"{}\"", header_safe(&source.name));
    Ok((
        [
            (header::CONTENT_TYPE, source.file_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        source.bytes,
    ))
}

/// Delete a document and everything generated for it.
#[utoipa::path(
    delete,
    path = "/documents/{id}",
    responses(
        (status = 204, description = "Document deleted"),
        (status = 404, description = "Document not found")
    ),
    params(
        ("id" = Uuid, Path, description = "The document ID."),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn delete_document_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path(document_id): Path<Uuid>,
) -> Result<impl IntoResponse, HandlerError> {
    app_state
        .coordinator
        .delete(document_id, user_id)
        .await
        .map_err(port_error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Keeps a file name usable inside a quoted header parameter.
fn header_safe(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c == ' ' || (c.is_ascii_graphic() && c != '"' && c != '\\') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names_are_sanitized_for_headers() {
        assert_eq!(header_safe("lecture 1.pdf"), "lecture 1.pdf");
        assert_eq!(header_safe("\"quoted\".txt"), "_quoted_.txt");
        assert_eq!(header_safe("résumé.txt"), "r_sum_.txt");
    }
}
