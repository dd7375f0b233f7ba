//! Incident API handlers.

use crate::{join_error_response, store_error_response, AppState};
use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use beacon_status::store::{self, CreateIncidentParams, Incident};
use beacon_types::IncidentStatus;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

/// Maximum length for an incident description.
const MAX_DESCRIPTION_LEN: usize = 4096;

#[derive(Debug, Deserialize)]
pub struct CreateIncidentRequest {
    pub service_id: i64,
    /// Lifecycle status label; defaults to `Ongoing`.
    pub status: Option<String>,
    pub description: String,
}

/// POST /api/incidents
pub async fn create_incident_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<CreateIncidentRequest>,
) -> Result<(StatusCode, Json<Incident>), Response> {
    if payload.description.is_empty() || payload.description.len() > MAX_DESCRIPTION_LEN {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "description must be 1-4096 characters" })),
        )
            .into_response());
    }

    let status = match payload.status.as_deref() {
        Some(label) => parse_incident_status(label)?,
        None => IncidentStatus::Ongoing,
    };

    let params = CreateIncidentParams {
        service_id: payload.service_id,
        status,
        description: payload.description,
    };

    let pool = state.pool.clone();
    let incident = tokio::task::spawn_blocking(move || {
        let conn = pool.get().map_err(crate::pool_error_response)?;
        store::create_incident(&conn, &params).map_err(store_error_response)
    })
    .await
    .map_err(|_| join_error_response())??;

    Ok((StatusCode::CREATED, Json(incident)))
}

#[derive(Debug, Deserialize)]
pub struct UpdateIncidentRequest {
    pub status: String,
}

/// PATCH /api/incidents/{incidentId}
///
/// Updates the lifecycle status; setting `Resolved` also sets the resolved
/// flag.
pub async fn update_incident_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(incident_id): Path<i64>,
    Json(payload): Json<UpdateIncidentRequest>,
) -> Result<Json<Incident>, Response> {
    let status = parse_incident_status(&payload.status)?;

    let pool = state.pool.clone();
    let incident = tokio::task::spawn_blocking(move || {
        let conn = pool.get().map_err(crate::pool_error_response)?;
        store::update_incident_status(&conn, incident_id, status).map_err(store_error_response)
    })
    .await
    .map_err(|_| join_error_response())??;

    Ok(Json(incident))
}

fn parse_incident_status(label: &str) -> Result<IncidentStatus, Response> {
    label.parse::<IncidentStatus>().map_err(|e| {
        (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response()
    })
}
