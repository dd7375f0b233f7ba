//! Organization and service API handlers, including the operator status
//! write entry point (`PUT /api/services/{serviceId}/status`).

use crate::{
    engine_error_response, join_error_response, store_error_response, AppState,
};
use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use beacon_status::store::{self, CreateServiceParams, Organization, Service};
use beacon_types::{ChangeActor, ServiceStatus};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

/// Maximum length for an organization or service name.
const MAX_NAME_LEN: usize = 256;

#[derive(Debug, Deserialize)]
pub struct CreateOrganizationRequest {
    pub name: String,
}

/// POST /api/organizations
pub async fn create_organization_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<CreateOrganizationRequest>,
) -> Result<(StatusCode, Json<Organization>), Response> {
    if payload.name.is_empty() || payload.name.len() > MAX_NAME_LEN {
        return Err(bad_request("name must be 1-256 characters"));
    }

    let pool = state.pool.clone();
    let org = tokio::task::spawn_blocking(move || {
        let conn = pool.get().map_err(crate::pool_error_response)?;
        store::create_organization(&conn, &payload.name).map_err(|e| {
            // Unique name collision -> 409 Conflict
            if let store::StoreError::Database(rusqlite::Error::SqliteFailure(code, _)) = &e {
                if code.code == rusqlite::ErrorCode::ConstraintViolation {
                    return conflict(&e);
                }
            }
            store_error_response(e)
        })
    })
    .await
    .map_err(|_| join_error_response())??;

    Ok((StatusCode::CREATED, Json(org)))
}

/// DELETE /api/organizations/{organizationId}
///
/// Cascades to the organization's services, incidents, and transition
/// history.
pub async fn delete_organization_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(org_id): Path<i64>,
) -> Result<StatusCode, Response> {
    let pool = state.pool.clone();
    tokio::task::spawn_blocking(move || {
        let conn = pool.get().map_err(crate::pool_error_response)?;
        store::delete_organization(&conn, org_id).map_err(store_error_response)
    })
    .await
    .map_err(|_| join_error_response())??;

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct CreateServiceRequest {
    pub organization_id: i64,
    pub name: String,
    /// Initial status label; defaults to `Operational`.
    pub status: Option<String>,
    #[serde(default)]
    pub auto_check: bool,
    pub check_url: Option<String>,
}

/// POST /api/services
pub async fn create_service_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<CreateServiceRequest>,
) -> Result<(StatusCode, Json<Service>), Response> {
    if payload.name.is_empty() || payload.name.len() > MAX_NAME_LEN {
        return Err(bad_request("name must be 1-256 characters"));
    }

    let status = match payload.status.as_deref() {
        Some(label) => label
            .parse::<ServiceStatus>()
            .map_err(|e| unprocessable(&e))?,
        None => ServiceStatus::Operational,
    };

    let params = CreateServiceParams {
        organization_id: payload.organization_id,
        name: payload.name,
        status,
        auto_check: payload.auto_check,
        check_url: payload.check_url,
    };

    let pool = state.pool.clone();
    let service = tokio::task::spawn_blocking(move || {
        let conn = pool.get().map_err(crate::pool_error_response)?;
        store::create_service(&conn, &params).map_err(store_error_response)
    })
    .await
    .map_err(|_| join_error_response())??;

    Ok((StatusCode::CREATED, Json(service)))
}

/// Response wrapper for the service list.
#[derive(Debug, Serialize)]
pub struct ServicesResponse {
    pub services: Vec<Service>,
    pub count: usize,
}

/// GET /api/services
pub async fn list_services_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<ServicesResponse>, Response> {
    let pool = state.pool.clone();
    let services = tokio::task::spawn_blocking(move || {
        let conn = pool.get().map_err(crate::pool_error_response)?;
        store::list_services(&conn).map_err(store_error_response)
    })
    .await
    .map_err(|_| join_error_response())??;

    let count = services.len();
    Ok(Json(ServicesResponse { services, count }))
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

/// PUT /api/services/{serviceId}/status
///
/// The operator write entry point. Routes the proposal through the change
/// detector, so it shares per-service serialization, transition recording,
/// and broadcast with the poller path. Responds with the change event for an
/// accepted transition, or `{"changed": false}` for a proposal equal to the
/// current status.
pub async fn update_status_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(service_id): Path<i64>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<serde_json::Value>, Response> {
    let new_status = payload
        .status
        .parse::<ServiceStatus>()
        .map_err(|e| unprocessable(&e))?;

    let outcome = state
        .detector
        .apply_status_change(service_id, new_status, ChangeActor::Operator)
        .await
        .map_err(engine_error_response)?;

    match outcome {
        Some(event) => Ok(Json(json!({ "changed": true, "event": event }))),
        None => Ok(Json(json!({ "changed": false }))),
    }
}

fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}

fn unprocessable(e: &impl std::fmt::Display) -> Response {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(json!({ "error": e.to_string() })),
    )
        .into_response()
}

fn conflict(e: &impl std::fmt::Display) -> Response {
    (
        StatusCode::CONFLICT,
        Json(json!({ "error": e.to_string() })),
    )
        .into_response()
}
