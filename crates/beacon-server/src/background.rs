//! Background tasks for the Beacon server.
//!
//! Wires the uptime poller to an HTTP health prober: each auto-checked
//! service with a `check_url` is probed with a GET request, and the response
//! class maps to a candidate status.

use crate::config::PollerConfig;
use crate::AppState;
use beacon_db::DbPool;
use beacon_engine::{HealthCheck, HealthCheckError, PollerHandle, UptimePoller};
use beacon_status::store;
use beacon_types::ServiceStatus;
use futures_util::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;

/// Health check that probes a service's `check_url` over HTTP.
///
/// Response classification: 2xx → `Operational`, 5xx or connection failure →
/// `Outage`, anything else (including a probe timeout) → `Degraded`. A
/// service without a `check_url` is reported as a check error, which the
/// poller logs and skips for the tick.
pub struct HttpHealthCheck {
    pool: DbPool,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpHealthCheck {
    pub fn new(pool: DbPool, timeout: Duration) -> Self {
        Self {
            pool,
            client: reqwest::Client::new(),
            timeout,
        }
    }
}

impl HealthCheck for HttpHealthCheck {
    fn check_health(
        &self,
        service_id: i64,
    ) -> BoxFuture<'_, Result<ServiceStatus, HealthCheckError>> {
        Box::pin(async move {
            let pool = self.pool.clone();
            let service = tokio::task::spawn_blocking(move || {
                let conn = pool
                    .get()
                    .map_err(|e| HealthCheckError(format!("database pool: {e}")))?;
                store::get_service(&conn, service_id).map_err(|e| HealthCheckError(e.to_string()))
            })
            .await
            .map_err(|_| HealthCheckError("service lookup task failed".to_string()))??;

            let url = service
                .check_url
                .ok_or_else(|| HealthCheckError(format!("service {service_id} has no check url")))?;

            match self.client.get(&url).timeout(self.timeout).send().await {
                Ok(resp) if resp.status().is_success() => Ok(ServiceStatus::Operational),
                Ok(resp) if resp.status().is_server_error() => Ok(ServiceStatus::Outage),
                Ok(_) => Ok(ServiceStatus::Degraded),
                Err(e) if e.is_timeout() => Ok(ServiceStatus::Degraded),
                Err(_) => Ok(ServiceStatus::Outage),
            }
        })
    }
}

/// Starts the uptime poller with the HTTP health prober.
pub fn start_uptime_poller(state: &AppState, config: &PollerConfig) -> PollerHandle {
    let checker = Arc::new(HttpHealthCheck::new(
        state.pool.clone(),
        Duration::from_millis(config.probe_timeout_ms),
    ));
    UptimePoller::new(
        state.detector.clone(),
        state.pool.clone(),
        checker,
        Duration::from_secs(config.interval_seconds),
    )
    .spawn()
}
