//! Read-side status API handlers.
//!
//! Provides:
//! - `GET /api/status` — the aggregated status document
//! - `GET /api/services/{serviceId}/transitions` — per-service history

use crate::{join_error_response, store_error_response, AppState};
use axum::{
    extract::{Extension, Path, Query},
    response::Response,
    Json,
};
use beacon_status::store::{self, Incident, StatusTransition};
use beacon_status::{compute_overall_status, correlate_incidents};
use beacon_types::{OverallStatus, ServiceStatus};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One service on the status document, with its recent incidents attached.
#[derive(Debug, Serialize)]
pub struct ServiceSummary {
    pub id: i64,
    pub name: String,
    pub status: ServiceStatus,
    pub incidents: Vec<Incident>,
}

/// Incident counters across the trailing window.
#[derive(Debug, Serialize)]
pub struct IncidentCount {
    pub total: usize,
    pub ongoing: usize,
}

/// The aggregated status document returned by `GET /api/status`.
#[derive(Debug, Serialize)]
pub struct StatusDocument {
    pub overall_status: OverallStatus,
    pub services: Vec<ServiceSummary>,
    pub incident_count: IncidentCount,
    pub last_updated: String,
}

/// Handler for `GET /api/status`.
///
/// Fetches all services and the trailing incident window in one blocking
/// pass, then derives the overall status (highest severity wins, `Unknown`
/// for an empty service list) and groups incidents per service.
pub async fn get_status_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<StatusDocument>, Response> {
    let pool = state.pool.clone();
    let window = state.incident_window_hours;

    let (services, incidents) = tokio::task::spawn_blocking(move || {
        let conn = pool.get().map_err(crate::pool_error_response)?;
        let services = store::list_services(&conn).map_err(store_error_response)?;
        let incidents =
            store::recent_incidents(&conn, window).map_err(store_error_response)?;
        Ok::<_, Response>((services, incidents))
    })
    .await
    .map_err(|_| join_error_response())??;

    let statuses: Vec<ServiceStatus> = services.iter().map(|s| s.status).collect();
    let overall_status = compute_overall_status(&statuses);
    let mut rollup = correlate_incidents(&incidents);

    let services = services
        .into_iter()
        .map(|service| ServiceSummary {
            incidents: rollup.by_service.remove(&service.id).unwrap_or_default(),
            id: service.id,
            name: service.name,
            status: service.status,
        })
        .collect();

    Ok(Json(StatusDocument {
        overall_status,
        services,
        incident_count: IncidentCount {
            total: rollup.total,
            ongoing: rollup.ongoing,
        },
        last_updated: chrono::Utc::now().to_rfc3339(),
    }))
}

/// Query parameters for `GET /api/services/{serviceId}/transitions`.
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// Maximum number of transitions to return (default: 50, max: 500).
    pub limit: Option<u32>,
}

/// Response wrapper for the transition history.
#[derive(Debug, Serialize)]
pub struct TransitionsResponse {
    /// The recorded transitions, newest first.
    pub transitions: Vec<StatusTransition>,
    /// The number of transitions returned.
    pub count: usize,
}

/// Handler for `GET /api/services/{serviceId}/transitions`.
pub async fn get_transitions_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(service_id): Path<i64>,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<TransitionsResponse>, Response> {
    let limit = params.limit.unwrap_or(50).clamp(1, 500);

    let pool = state.pool.clone();
    let transitions = tokio::task::spawn_blocking(move || {
        let conn = pool.get().map_err(crate::pool_error_response)?;
        store::transition_history(&conn, service_id, limit).map_err(store_error_response)
    })
    .await
    .map_err(|_| join_error_response())??;

    let count = transitions.len();
    Ok(Json(TransitionsResponse { transitions, count }))
}
