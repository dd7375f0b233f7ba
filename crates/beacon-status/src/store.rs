//! Persistence operations for services, incidents, and the transition log.
//!
//! Function-per-operation style over a `&Connection`. The transition log is
//! append-only: rows are only ever written by [`propose_status`] (or its
//! in-transaction body [`propose_status_tx`]), inside the same transaction
//! that updates `services.status`, so current status and the newest log
//! entry can never disagree.

use beacon_types::{ChangeActor, IncidentStatus, ServiceStatus};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    InvalidStatus(#[from] beacon_types::ParseStatusError),
}

/// An organization owning a set of services.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Organization {
    /// Internal database ID.
    pub id: i64,
    /// Unique display name.
    pub name: String,
    /// Creation timestamp (ISO 8601).
    pub created_at: String,
    /// Last update timestamp (ISO 8601).
    pub updated_at: String,
}

/// A monitored service with its current operational status.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Service {
    /// Internal database ID.
    pub id: i64,
    /// Owning organization.
    pub organization_id: i64,
    /// Display name of the service.
    pub name: String,
    /// Current operational status; never null.
    pub status: ServiceStatus,
    /// Whether the uptime poller re-evaluates this service.
    pub auto_check: bool,
    /// URL probed by the HTTP health checker, if any.
    pub check_url: Option<String>,
    /// Creation timestamp (ISO 8601).
    pub created_at: String,
    /// Last update timestamp (ISO 8601).
    pub updated_at: String,
}

/// An incident logged against a service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Incident {
    /// Internal database ID.
    pub id: i64,
    /// Owning service.
    pub service_id: i64,
    /// Lifecycle status.
    pub status: IncidentStatus,
    /// Free-text description.
    pub description: String,
    /// Whether the incident is resolved.
    pub resolved: bool,
    /// Creation timestamp (ISO 8601).
    pub created_at: String,
    /// Last update timestamp (ISO 8601).
    pub updated_at: String,
}

/// One recorded status transition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusTransition {
    /// Internal database ID.
    pub id: i64,
    /// Service the transition belongs to.
    pub service_id: i64,
    /// Status before the transition.
    pub from: ServiceStatus,
    /// Status after the transition.
    pub to: ServiceStatus,
    /// Which path produced the transition.
    pub actor: ChangeActor,
    /// Per-service monotonically increasing sequence number.
    pub seq: i64,
    /// Timestamp (ISO 8601).
    pub recorded_at: String,
}

/// Outcome of [`propose_status`].
#[derive(Debug, Clone, PartialEq)]
pub struct StatusProposal {
    /// Whether the proposal changed anything.
    pub changed: bool,
    /// The appended transition, present iff `changed`.
    pub transition: Option<StatusTransition>,
}

/// Parameters for creating a new service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateServiceParams {
    pub organization_id: i64,
    pub name: String,
    pub status: ServiceStatus,
    pub auto_check: bool,
    pub check_url: Option<String>,
}

/// Parameters for creating a new incident.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateIncidentParams {
    pub service_id: i64,
    pub status: IncidentStatus,
    pub description: String,
}

/// Creates a new organization.
pub fn create_organization(conn: &Connection, name: &str) -> Result<Organization, StoreError> {
    let org = conn.query_row(
        "INSERT INTO organizations (name) VALUES (?1)
         RETURNING id, name, created_at, updated_at",
        [name],
        |row| {
            Ok(Organization {
                id: row.get(0)?,
                name: row.get(1)?,
                created_at: row.get(2)?,
                updated_at: row.get(3)?,
            })
        },
    )?;
    Ok(org)
}

/// Deletes an organization, cascading to its services, incidents, and
/// transition history.
pub fn delete_organization(conn: &Connection, org_id: i64) -> Result<(), StoreError> {
    let count = conn.execute("DELETE FROM organizations WHERE id = ?1", [org_id])?;
    if count == 0 {
        return Err(StoreError::NotFound(format!("organization {org_id}")));
    }
    Ok(())
}

/// Creates a new service.
pub fn create_service(
    conn: &Connection,
    params: &CreateServiceParams,
) -> Result<Service, StoreError> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM organizations WHERE id = ?1)",
        [params.organization_id],
        |row| row.get(0),
    )?;
    if !exists {
        return Err(StoreError::NotFound(format!(
            "organization {}",
            params.organization_id
        )));
    }

    conn.query_row(
        "INSERT INTO services (organization_id, name, status, auto_check, check_url)
         VALUES (?1, ?2, ?3, ?4, ?5)
         RETURNING id, organization_id, name, status, auto_check, check_url, created_at, updated_at",
        params![
            params.organization_id,
            params.name,
            params.status.as_str(),
            params.auto_check,
            params.check_url,
        ],
        map_row_to_service,
    )
    .map_err(StoreError::Database)
}

/// Retrieves a service by ID.
pub fn get_service(conn: &Connection, service_id: i64) -> Result<Service, StoreError> {
    conn.query_row(
        "SELECT id, organization_id, name, status, auto_check, check_url, created_at, updated_at
         FROM services WHERE id = ?1",
        [service_id],
        map_row_to_service,
    )
    .optional()?
    .ok_or_else(|| StoreError::NotFound(format!("service {service_id}")))
}

/// Lists all services, ordered by name.
pub fn list_services(conn: &Connection) -> Result<Vec<Service>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, organization_id, name, status, auto_check, check_url, created_at, updated_at
         FROM services ORDER BY name ASC",
    )?;
    let rows = stmt.query_map([], map_row_to_service)?;
    let mut services = Vec::new();
    for row in rows {
        services.push(row?);
    }
    Ok(services)
}

/// Lists services configured for automated health checks.
pub fn list_auto_check_services(conn: &Connection) -> Result<Vec<Service>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, organization_id, name, status, auto_check, check_url, created_at, updated_at
         FROM services WHERE auto_check = 1 ORDER BY id ASC",
    )?;
    let rows = stmt.query_map([], map_row_to_service)?;
    let mut services = Vec::new();
    for row in rows {
        services.push(row?);
    }
    Ok(services)
}

/// Returns the current status of a service.
pub fn current_status(conn: &Connection, service_id: i64) -> Result<ServiceStatus, StoreError> {
    let status: Option<String> = conn
        .query_row(
            "SELECT status FROM services WHERE id = ?1",
            [service_id],
            |row| row.get(0),
        )
        .optional()?;
    let status = status.ok_or_else(|| StoreError::NotFound(format!("service {service_id}")))?;
    Ok(status.parse()?)
}

/// Proposes a new status for a service.
///
/// Reads the current status, compares, and — if different — atomically
/// updates the service row and appends exactly one transition, all inside a
/// single transaction. A proposal equal to the current status commits a
/// no-op with `changed = false`, which makes retries idempotent and keeps
/// the transition log free of redundant entries.
///
/// The transition's per-service `seq` is assigned by a
/// `COALESCE(MAX(seq), 0) + 1` subquery within the INSERT itself, so two
/// writers can never observe the same maximum and produce duplicates.
pub fn propose_status(
    conn: &Connection,
    service_id: i64,
    new_status: ServiceStatus,
    actor: ChangeActor,
) -> Result<StatusProposal, StoreError> {
    let tx = conn.unchecked_transaction()?;
    let proposal = propose_status_tx(&tx, service_id, new_status, actor)?;
    tx.commit()?;
    Ok(proposal)
}

/// Statement body of [`propose_status`], run inside the caller's open
/// transaction.
///
/// For callers that must commit the transition atomically with writes of
/// their own (the change detector couples incident bookkeeping to it): an
/// error after this returns rolls the transition back along with
/// everything else in the caller's transaction.
pub fn propose_status_tx(
    conn: &Connection,
    service_id: i64,
    new_status: ServiceStatus,
    actor: ChangeActor,
) -> Result<StatusProposal, StoreError> {
    let current: Option<String> = conn
        .query_row(
            "SELECT status FROM services WHERE id = ?1",
            [service_id],
            |row| row.get(0),
        )
        .optional()?;
    let current: ServiceStatus = current
        .ok_or_else(|| StoreError::NotFound(format!("service {service_id}")))?
        .parse()?;

    if current == new_status {
        return Ok(StatusProposal {
            changed: false,
            transition: None,
        });
    }

    conn.execute(
        "UPDATE services SET status = ?1, updated_at = datetime('now') WHERE id = ?2",
        params![new_status.as_str(), service_id],
    )?;

    let transition = conn.query_row(
        "INSERT INTO status_transitions (service_id, from_status, to_status, actor, seq)
         VALUES (
            ?1, ?2, ?3, ?4,
            (SELECT COALESCE(MAX(seq), 0) + 1 FROM status_transitions WHERE service_id = ?1)
         )
         RETURNING id, service_id, from_status, to_status, actor, seq, recorded_at",
        params![
            service_id,
            current.as_str(),
            new_status.as_str(),
            actor.as_str(),
        ],
        map_row_to_transition,
    )?;

    Ok(StatusProposal {
        changed: true,
        transition: Some(transition),
    })
}

/// Lists recorded transitions for a service, newest first.
pub fn transition_history(
    conn: &Connection,
    service_id: i64,
    limit: u32,
) -> Result<Vec<StatusTransition>, StoreError> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM services WHERE id = ?1)",
        [service_id],
        |row| row.get(0),
    )?;
    if !exists {
        return Err(StoreError::NotFound(format!("service {service_id}")));
    }

    let limit = limit.min(500);
    let mut stmt = conn.prepare(
        "SELECT id, service_id, from_status, to_status, actor, seq, recorded_at
         FROM status_transitions
         WHERE service_id = ?1
         ORDER BY seq DESC
         LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![service_id, limit], map_row_to_transition)?;
    let mut transitions = Vec::new();
    for row in rows {
        transitions.push(row?);
    }
    Ok(transitions)
}

/// Creates a new incident against a service.
pub fn create_incident(
    conn: &Connection,
    params: &CreateIncidentParams,
) -> Result<Incident, StoreError> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM services WHERE id = ?1)",
        [params.service_id],
        |row| row.get(0),
    )?;
    if !exists {
        return Err(StoreError::NotFound(format!(
            "service {}",
            params.service_id
        )));
    }

    conn.query_row(
        "INSERT INTO incidents (service_id, status, description, resolved)
         VALUES (?1, ?2, ?3, ?4)
         RETURNING id, service_id, status, description, resolved, created_at, updated_at",
        params![
            params.service_id,
            params.status.as_str(),
            params.description,
            params.status == IncidentStatus::Resolved,
        ],
        map_row_to_incident,
    )
    .map_err(StoreError::Database)
}

/// Updates an incident's lifecycle status.
///
/// Setting the status to `Resolved` also sets the resolved flag; any other
/// status clears it.
pub fn update_incident_status(
    conn: &Connection,
    incident_id: i64,
    status: IncidentStatus,
) -> Result<Incident, StoreError> {
    conn.query_row(
        "UPDATE incidents
         SET status = ?1, resolved = ?2, updated_at = datetime('now')
         WHERE id = ?3
         RETURNING id, service_id, status, description, resolved, created_at, updated_at",
        params![
            status.as_str(),
            status == IncidentStatus::Resolved,
            incident_id,
        ],
        map_row_to_incident,
    )
    .optional()?
    .ok_or_else(|| StoreError::NotFound(format!("incident {incident_id}")))
}

/// Marks every ongoing incident of a service as resolved.
///
/// Returns the IDs of the incidents that were resolved, newest first. Used
/// by the `OpenOnOutage` incident policy when a service leaves `Outage`.
pub fn resolve_ongoing_incidents(
    conn: &Connection,
    service_id: i64,
) -> Result<Vec<i64>, StoreError> {
    let mut stmt = conn.prepare(
        "UPDATE incidents
         SET status = 'Resolved', resolved = 1, updated_at = datetime('now')
         WHERE service_id = ?1 AND resolved = 0 AND status = 'Ongoing'
         RETURNING id",
    )?;
    let rows = stmt.query_map([service_id], |row| row.get(0))?;
    let mut ids: Vec<i64> = Vec::new();
    for row in rows {
        ids.push(row?);
    }
    ids.sort_unstable_by(|a, b| b.cmp(a));
    Ok(ids)
}

/// Lists incidents created within the trailing window, newest first.
///
/// `window_hours` is interpolated directly; it is a `u32`, so this is safe.
pub fn recent_incidents(conn: &Connection, window_hours: u32) -> Result<Vec<Incident>, StoreError> {
    let sql = format!(
        "SELECT id, service_id, status, description, resolved, created_at, updated_at
         FROM incidents
         WHERE created_at >= datetime('now', '-{} hours')
         ORDER BY created_at DESC, id DESC",
        window_hours
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], map_row_to_incident)?;
    let mut incidents = Vec::new();
    for row in rows {
        incidents.push(row?);
    }
    Ok(incidents)
}

fn map_row_to_service(row: &Row) -> rusqlite::Result<Service> {
    let status_str: String = row.get(3)?;
    let status: ServiceStatus = status_str.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Service {
        id: row.get(0)?,
        organization_id: row.get(1)?,
        name: row.get(2)?,
        status,
        auto_check: row.get(4)?,
        check_url: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn map_row_to_incident(row: &Row) -> rusqlite::Result<Incident> {
    let status_str: String = row.get(2)?;
    let status: IncidentStatus = status_str.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Incident {
        id: row.get(0)?,
        service_id: row.get(1)?,
        status,
        description: row.get(3)?,
        resolved: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn map_row_to_transition(row: &Row) -> rusqlite::Result<StatusTransition> {
    let from_str: String = row.get(2)?;
    let from: ServiceStatus = from_str.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let to_str: String = row.get(3)?;
    let to: ServiceStatus = to_str.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let actor_str: String = row.get(4)?;
    let actor: ChangeActor = actor_str.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(StatusTransition {
        id: row.get(0)?,
        service_id: row.get(1)?,
        from,
        to,
        actor,
        seq: row.get(5)?,
        recorded_at: row.get(6)?,
    })
}
