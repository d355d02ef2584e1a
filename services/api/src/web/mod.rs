//! services/api/src/web/mod.rs
//!
//! The HTTP surface of the service.

pub mod middleware;
pub mod rest;
pub mod state;
pub mod views;

pub use middleware::require_auth;
pub use rest::ApiDoc;

use crate::config::ConfigError;
use crate::web::state::AppState;
use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method,
    },
    middleware as axum_middleware,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Builds the document API router. Every route requires the `x-user-id` header.
pub fn build_router(app_state: Arc<AppState>) -> Result<Router, ConfigError> {
    let origin = app_state
        .config
        .cors_origin
        .parse::<HeaderValue>()
        .map_err(|e| ConfigError::InvalidValue("CORS_ORIGIN".to_string(), e.to_string()))?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            AUTHORIZATION,
            CONTENT_TYPE,
            ACCEPT,
            HeaderName::from_static(middleware::USER_ID_HEADER),
        ]);

    let document_routes = Router::new()
        .route("/documents", get(rest::list_documents_handler))
        .route("/documents/upload", post(rest::upload_documents_handler))
        .route("/documents/{id}", delete(rest::delete_document_handler))
        .route("/documents/{id}/status", get(rest::document_status_handler))
        .route("/documents/{id}/content", get(rest::document_content_handler))
        .route("/documents/{id}/summary", put(rest::update_summary_handler))
        .route("/documents/{id}/download", get(rest::download_document_handler))
        .route(
            "/documents/{id}/tasks/{kind}/retry",
            post(rest::retry_task_handler),
        )
        .layer(axum_middleware::from_fn(require_auth));

    Ok(Router::new()
        .merge(document_routes)
        .layer(DefaultBodyLimit::max(app_state.config.max_upload_bytes))
        .layer(cors)
        .with_state(app_state))
}
