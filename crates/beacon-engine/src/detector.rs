//! The change detector: the single choke point for status mutation.
//!
//! Every status write — operator action or poller tick — goes through
//! [`ChangeDetector::apply_status_change`]. It serializes per service,
//! records the transition and its incident bookkeeping in one transaction,
//! and publishes exactly one change event per accepted transition. No code
//! path may update status any other way, which is what keeps history and
//! broadcast consistent with each other.

use crate::bus::StatusBus;
use crate::error::EngineError;
use crate::locks::ServiceLocks;
use beacon_db::DbPool;
use beacon_status::store::{self, StatusTransition};
use beacon_status::StoreError;
use beacon_types::{ChangeActor, ChangeEvent, IncidentStatus, ServiceStatus};
use rusqlite::Connection;
use std::time::Duration;

/// How a status transition relates to incident bookkeeping.
///
/// The coupling between transitions and incidents is an explicit policy, not
/// inferred behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IncidentPolicy {
    /// Transitions never touch incidents; operators manage them by hand.
    #[default]
    Manual,
    /// Entering `Outage` auto-opens an `Ongoing` incident (its id is
    /// correlated on the change event); leaving `Outage` resolves the
    /// service's ongoing incidents.
    OpenOnOutage,
}

/// Bounded internal retries for busy/locked contention before surfacing
/// `ConflictRetryable`.
const MAX_BUSY_RETRIES: u32 = 3;

/// Delay between busy retries.
const BUSY_RETRY_DELAY: Duration = Duration::from_millis(25);

/// Applies status changes and propagates the resulting events.
#[derive(Clone)]
pub struct ChangeDetector {
    pool: DbPool,
    bus: StatusBus,
    locks: ServiceLocks,
    policy: IncidentPolicy,
}

impl ChangeDetector {
    pub fn new(pool: DbPool, bus: StatusBus, policy: IncidentPolicy) -> Self {
        Self {
            pool,
            bus,
            locks: ServiceLocks::new(),
            policy,
        }
    }

    /// The bus this detector publishes to.
    pub fn bus(&self) -> &StatusBus {
        &self.bus
    }

    /// Proposes a new status for a service and, if it differs from the
    /// current one, records the transition and broadcasts a change event.
    ///
    /// Returns `Ok(Some(event))` for an accepted transition and `Ok(None)`
    /// when the proposal matched the current status (no event, no
    /// broadcast). Busy/locked database contention is retried a bounded
    /// number of times before surfacing as
    /// [`EngineError::ConflictRetryable`].
    pub async fn apply_status_change(
        &self,
        service_id: i64,
        new_status: ServiceStatus,
        actor: ChangeActor,
    ) -> Result<Option<ChangeEvent>, EngineError> {
        // Per-service serialization point shared by the operator and poller
        // paths. Unrelated services proceed in parallel.
        let _guard = self.locks.acquire(service_id).await;

        let mut attempts = 0;
        loop {
            attempts += 1;

            let pool = self.pool.clone();
            let policy = self.policy;
            let result = tokio::task::spawn_blocking(move || {
                propose_and_correlate(&pool, service_id, new_status, actor, policy)
            })
            .await
            .map_err(|_| EngineError::TaskJoin)?;

            match result {
                Ok(event) => {
                    if let Some(ref event) = event {
                        tracing::info!(
                            service_id,
                            from = event.from.as_str(),
                            to = event.to.as_str(),
                            actor = actor.as_str(),
                            "status transition recorded"
                        );
                        self.bus.publish(event);
                    }
                    return Ok(event);
                }
                Err(err) if err.is_busy() => {
                    if attempts > MAX_BUSY_RETRIES {
                        return Err(EngineError::ConflictRetryable {
                            service_id,
                            attempts,
                        });
                    }
                    tracing::debug!(service_id, attempts, "database busy, retrying proposal");
                    tokio::time::sleep(BUSY_RETRY_DELAY).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Blocking body of a status proposal: transition, incident policy, event.
///
/// A single transaction spans the transition and the incident bookkeeping.
/// If the incident write fails, the transition rolls back with it, so a
/// committed row always has a corresponding broadcast event — and a busy
/// retry of the whole body starts from the pre-proposal state.
fn propose_and_correlate(
    pool: &DbPool,
    service_id: i64,
    new_status: ServiceStatus,
    actor: ChangeActor,
    policy: IncidentPolicy,
) -> Result<Option<ChangeEvent>, EngineError> {
    let conn = pool
        .get()
        .map_err(|e| EngineError::CollaboratorUnavailable(format!("database pool: {e}")))?;

    let tx = conn.unchecked_transaction().map_err(StoreError::from)?;
    let service = store::get_service(&tx, service_id)?;
    let proposal = store::propose_status_tx(&tx, service_id, new_status, actor)?;

    let Some(transition) = proposal.transition else {
        tx.commit().map_err(StoreError::from)?;
        return Ok(None);
    };

    let incident_id = apply_incident_policy(&tx, policy, &transition, &service.name)
        .map_err(EngineError::Store)?;
    tx.commit().map_err(StoreError::from)?;

    Ok(Some(ChangeEvent {
        service_id,
        service_name: service.name,
        from: transition.from,
        to: transition.to,
        actor,
        incident_id,
        recorded_at: transition.recorded_at,
    }))
}

/// Applies the configured incident policy to an accepted transition.
///
/// Returns the correlated incident id, if the policy produced one.
fn apply_incident_policy(
    conn: &Connection,
    policy: IncidentPolicy,
    transition: &StatusTransition,
    service_name: &str,
) -> Result<Option<i64>, StoreError> {
    match policy {
        IncidentPolicy::Manual => Ok(None),
        IncidentPolicy::OpenOnOutage => {
            if transition.to == ServiceStatus::Outage {
                let incident = store::create_incident(
                    conn,
                    &store::CreateIncidentParams {
                        service_id: transition.service_id,
                        status: IncidentStatus::Ongoing,
                        description: format!("{service_name} is experiencing an outage"),
                    },
                )?;
                Ok(Some(incident.id))
            } else if transition.from == ServiceStatus::Outage {
                let resolved = store::resolve_ongoing_incidents(conn, transition.service_id)?;
                Ok(resolved.first().copied())
            } else {
                Ok(None)
            }
        }
    }
}
