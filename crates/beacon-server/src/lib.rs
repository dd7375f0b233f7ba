//! Beacon server library logic.

pub mod api_incidents;
pub mod api_services;
pub mod api_sse;
pub mod api_status;
pub mod background;
pub mod config;

use axum::{
    extract::DefaultBodyLimit,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post, put},
    Extension, Json, Router,
};
use beacon_db::DbPool;
use beacon_engine::{ChangeDetector, EngineError};
use beacon_status::StoreError;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: DbPool,
    /// The single entry point for status mutation; also owns the broadcast
    /// bus that the SSE stream subscribes to.
    pub detector: ChangeDetector,
    /// Trailing window, in hours, for incidents on the status document.
    pub incident_window_hours: u32,
}

/// Maximum request body size (1 MiB). All write payloads are small JSON.
const MAX_REQUEST_BODY_BYTES: usize = 1024 * 1024;

/// Maps a [`StoreError`] to an HTTP error response, logging database errors.
///
/// `NotFound` → 404, `InvalidStatus` → 422, everything else → 500.
pub(crate) fn store_error_response(e: StoreError) -> Response {
    let status = match &e {
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        StoreError::InvalidStatus(_) => StatusCode::UNPROCESSABLE_ENTITY,
        StoreError::Database(err) => {
            tracing::error!(error = %err, "store operation failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(json!({ "error": e.to_string() }))).into_response()
}

/// Maps an [`EngineError`] to an HTTP error response.
///
/// Store errors map as in [`store_error_response`]; a proposal that lost the
/// serialization race after internal retries → 409; everything else → 500.
pub(crate) fn engine_error_response(e: EngineError) -> Response {
    match e {
        EngineError::Store(store_err) => store_error_response(store_err),
        EngineError::ConflictRetryable { .. } => (
            StatusCode::CONFLICT,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
        other => {
            tracing::error!(error = %other, "status change failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": other.to_string() })),
            )
                .into_response()
        }
    }
}

/// Error response for an unavailable connection pool.
pub(crate) fn pool_error_response(e: r2d2::Error) -> Response {
    tracing::error!(error = %e, "database pool unavailable");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "database unavailable" })),
    )
        .into_response()
}

/// Error response for a cancelled or panicked blocking task.
pub(crate) fn join_error_response() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "blocking task failed" })),
    )
        .into_response()
}

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/status", get(api_status::get_status_handler))
        .route(
            "/api/organizations",
            post(api_services::create_organization_handler),
        )
        .route(
            "/api/organizations/{organizationId}",
            delete(api_services::delete_organization_handler),
        )
        .route(
            "/api/services",
            post(api_services::create_service_handler)
                .get(api_services::list_services_handler),
        )
        .route(
            "/api/services/{serviceId}/status",
            put(api_services::update_status_handler),
        )
        .route(
            "/api/services/{serviceId}/transitions",
            get(api_status::get_transitions_handler),
        )
        .route(
            "/api/incidents",
            post(api_incidents::create_incident_handler),
        )
        .route(
            "/api/incidents/{incidentId}",
            patch(api_incidents::update_incident_handler),
        )
        .route("/events/status", get(api_sse::get_status_stream_handler))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(Extension(Arc::new(state)))
}
