//! Background uptime poller.
//!
//! A repeating task that, on every tick, asks the external health-check
//! collaborator for a candidate status of each service configured for
//! automated checks and routes it through the change detector — the same
//! path operator writes take. A collaborator failure is logged and skips
//! that service for the tick; it never stops the loop.
//!
//! The loop is an explicit state machine (`Idle → Ticking → (Idle |
//! Stopping) → Stopped`) observable through a `watch` channel, so a stop
//! request mid-tick can be exercised deterministically in tests. A stop
//! request terminates the loop within one tick interval.

use crate::detector::ChangeDetector;
use beacon_db::DbPool;
use beacon_status::store;
use beacon_types::ChangeActor;
use beacon_types::ServiceStatus;
use futures_util::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;

/// Error returned by the health-check collaborator.
#[derive(Debug, Clone, thiserror::Error)]
#[error("health check failed: {0}")]
pub struct HealthCheckError(pub String);

/// External health-check collaborator.
///
/// Implementations derive a candidate status for a service (typically by
/// probing it over the network). Tests substitute scripted fakes.
pub trait HealthCheck: Send + Sync + 'static {
    fn check_health(
        &self,
        service_id: i64,
    ) -> BoxFuture<'_, Result<ServiceStatus, HealthCheckError>>;
}

/// Lifecycle states of the poller loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    /// Waiting for the next tick interval.
    Idle,
    /// Evaluating services.
    Ticking,
    /// Stop requested; finishing or abandoning the current tick.
    Stopping,
    /// The loop has exited.
    Stopped,
}

/// Periodically re-derives service status from health checks.
pub struct UptimePoller {
    detector: ChangeDetector,
    pool: DbPool,
    checker: Arc<dyn HealthCheck>,
    interval: Duration,
}

impl UptimePoller {
    pub fn new(
        detector: ChangeDetector,
        pool: DbPool,
        checker: Arc<dyn HealthCheck>,
        interval: Duration,
    ) -> Self {
        Self {
            detector,
            pool,
            checker,
            interval,
        }
    }

    /// Starts the poller loop and returns a handle for observation and
    /// cancellation.
    pub fn spawn(self) -> PollerHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(PollerState::Idle);
        let task = tokio::spawn(self.run(stop_rx, state_tx));
        PollerHandle {
            stop_tx,
            state_rx,
            task,
        }
    }

    async fn run(self, mut stop_rx: watch::Receiver<bool>, state_tx: watch::Sender<PollerState>) {
        tracing::info!(interval_ms = self.interval.as_millis() as u64, "starting uptime poller");

        loop {
            state_tx.send_replace(PollerState::Idle);
            tokio::select! {
                changed = stop_rx.changed() => {
                    // A dropped handle counts as a stop request.
                    if changed.is_err() || *stop_rx.borrow() {
                        state_tx.send_replace(PollerState::Stopping);
                        break;
                    }
                }
                () = sleep(self.interval) => {
                    state_tx.send_replace(PollerState::Ticking);
                    self.tick(&stop_rx).await;
                    if *stop_rx.borrow() {
                        state_tx.send_replace(PollerState::Stopping);
                        break;
                    }
                }
            }
        }

        state_tx.send_replace(PollerState::Stopped);
        tracing::info!("uptime poller stopped");
    }

    /// One evaluation pass over all auto-checked services.
    ///
    /// The pass is abandoned between services once a stop has been
    /// requested; per-service work already in flight completes through the
    /// detector, so no state is left inconsistent.
    async fn tick(&self, stop_rx: &watch::Receiver<bool>) {
        let pool = self.pool.clone();
        let services = tokio::task::spawn_blocking(move || {
            let conn = pool.get().map_err(|e| e.to_string())?;
            store::list_auto_check_services(&conn).map_err(|e| e.to_string())
        })
        .await;

        let services = match services {
            Ok(Ok(services)) => services,
            Ok(Err(e)) => {
                tracing::error!(error = %e, "failed to list services for poll tick");
                return;
            }
            Err(e) => {
                tracing::error!(error = %e, "poll tick join error");
                return;
            }
        };

        for service in services {
            if *stop_rx.borrow() {
                tracing::debug!("stop requested, abandoning poll tick");
                return;
            }

            let candidate = match self.checker.check_health(service.id).await {
                Ok(candidate) => candidate,
                Err(e) => {
                    tracing::warn!(
                        service_id = service.id,
                        error = %e,
                        "health check failed, skipping service for this tick"
                    );
                    continue;
                }
            };

            match self
                .detector
                .apply_status_change(service.id, candidate, ChangeActor::Poller)
                .await
            {
                Ok(Some(event)) => {
                    tracing::info!(
                        service_id = service.id,
                        to = event.to.as_str(),
                        "poller recorded status change"
                    );
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(
                        service_id = service.id,
                        error = %e,
                        "failed to apply polled status, skipping service for this tick"
                    );
                }
            }
        }
    }
}

/// Handle to a running poller.
pub struct PollerHandle {
    stop_tx: watch::Sender<bool>,
    state_rx: watch::Receiver<PollerState>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// Requests cancellation. The loop exits within one tick interval.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// The poller's current lifecycle state.
    pub fn state(&self) -> PollerState {
        *self.state_rx.borrow()
    }

    /// Waits until the poller reaches the given state.
    pub async fn wait_for(&mut self, state: PollerState) {
        let _ = self.state_rx.wait_for(|s| *s == state).await;
    }

    /// Requests cancellation and waits for the loop to exit.
    pub async fn shutdown(self) {
        let _ = self.stop_tx.send(true);
        let _ = self.task.await;
    }
}
