//! Shared types and constants for the Beacon status page.
//!
//! This crate provides the foundational types used across all Beacon crates:
//! service and incident status enums, the severity ordering used by the
//! aggregator, and the change-event payload delivered to live subscribers.
//!
//! No crate in the workspace depends on anything *except* `beacon-types` for
//! cross-cutting type definitions. This keeps the dependency graph clean and
//! prevents circular dependencies.

use serde::{Deserialize, Serialize};

/// Operational status of a single service.
///
/// Statuses are severity-ordered: `Outage` (3) > `Degraded` (2) >
/// `Operational` (1). The aggregator reports the highest severity present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceStatus {
    /// The service is fully functional.
    Operational,
    /// The service is up but impaired.
    Degraded,
    /// The service is down.
    Outage,
}

impl ServiceStatus {
    /// Returns the canonical string label for this status.
    ///
    /// This is the value stored in the `services.status` column and used in
    /// API payloads.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Operational => "Operational",
            Self::Degraded => "Degraded",
            Self::Outage => "Outage",
        }
    }

    /// Returns the numeric severity of this status (higher is worse).
    pub fn severity(self) -> u8 {
        match self {
            Self::Operational => 1,
            Self::Degraded => 2,
            Self::Outage => 3,
        }
    }
}

impl std::fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ServiceStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Operational" => Ok(Self::Operational),
            "Degraded" => Ok(Self::Degraded),
            "Outage" => Ok(Self::Outage),
            _ => Err(ParseStatusError(s.to_string())),
        }
    }
}

/// Error returned when parsing a string outside the enumerated status set.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid status: {0}")]
pub struct ParseStatusError(pub String);

/// Overall system status derived from all service statuses.
///
/// `Unknown` is the sentinel for an empty service list; the remaining
/// variants carry the highest per-service severity observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverallStatus {
    /// No services are registered.
    Unknown,
    /// All services operational.
    Operational,
    /// At least one service degraded, none in outage.
    Degraded,
    /// At least one service in outage.
    Outage,
}

impl OverallStatus {
    /// Returns the canonical string label for this status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::Operational => "Operational",
            Self::Degraded => "Degraded",
            Self::Outage => "Outage",
        }
    }
}

impl From<ServiceStatus> for OverallStatus {
    fn from(status: ServiceStatus) -> Self {
        match status {
            ServiceStatus::Operational => Self::Operational,
            ServiceStatus::Degraded => Self::Degraded,
            ServiceStatus::Outage => Self::Outage,
        }
    }
}

impl std::fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of an incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IncidentStatus {
    /// The incident is active.
    Ongoing,
    /// The incident has been resolved.
    Resolved,
    /// Planned maintenance or a scheduled event.
    Scheduled,
}

impl IncidentStatus {
    /// Returns the canonical string label for this status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ongoing => "Ongoing",
            Self::Resolved => "Resolved",
            Self::Scheduled => "Scheduled",
        }
    }
}

impl std::fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for IncidentStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Ongoing" => Ok(Self::Ongoing),
            "Resolved" => Ok(Self::Resolved),
            "Scheduled" => Ok(Self::Scheduled),
            _ => Err(ParseStatusError(s.to_string())),
        }
    }
}

/// The actor responsible for a status change.
///
/// Every transition row records which path produced it: an operator action
/// through the write API, or the background uptime poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeActor {
    /// An operator-driven update through the write API.
    Operator,
    /// The background uptime poller.
    Poller,
}

impl ChangeActor {
    /// Returns the canonical string label for this actor.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Operator => "operator",
            Self::Poller => "poller",
        }
    }
}

impl std::fmt::Display for ChangeActor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ChangeActor {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "operator" => Ok(Self::Operator),
            "poller" => Ok(Self::Poller),
            _ => Err(ParseStatusError(s.to_string())),
        }
    }
}

/// Notification payload describing one accepted status transition.
///
/// Produced exactly once per recorded transition and delivered to live
/// subscribers through the broadcast bus. Not persisted beyond the
/// transition log itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Id of the service whose status changed.
    pub service_id: i64,
    /// Display name of the service at the time of the change.
    pub service_name: String,
    /// Status before the change.
    pub from: ServiceStatus,
    /// Status after the change.
    pub to: ServiceStatus,
    /// Which path produced the change.
    pub actor: ChangeActor,
    /// Incident correlated with this transition, if the incident policy
    /// opened or resolved one.
    pub incident_id: Option<i64>,
    /// Timestamp of the transition row (ISO 8601).
    pub recorded_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trip() {
        for status in [
            ServiceStatus::Operational,
            ServiceStatus::Degraded,
            ServiceStatus::Outage,
        ] {
            let parsed: ServiceStatus = status.as_str().parse().expect("should parse own label");
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn status_rejects_unknown_labels() {
        assert!("operational".parse::<ServiceStatus>().is_err());
        assert!("Unknown".parse::<ServiceStatus>().is_err());
        assert!("".parse::<ServiceStatus>().is_err());
    }

    #[test]
    fn severity_ordering() {
        assert!(ServiceStatus::Outage.severity() > ServiceStatus::Degraded.severity());
        assert!(ServiceStatus::Degraded.severity() > ServiceStatus::Operational.severity());
    }

    #[test]
    fn overall_from_service_status() {
        assert_eq!(
            OverallStatus::from(ServiceStatus::Outage),
            OverallStatus::Outage
        );
        assert_eq!(OverallStatus::Unknown.as_str(), "Unknown");
    }

    #[test]
    fn change_event_serializes_with_labels() {
        let event = ChangeEvent {
            service_id: 7,
            service_name: "api".to_string(),
            from: ServiceStatus::Operational,
            to: ServiceStatus::Outage,
            actor: ChangeActor::Poller,
            incident_id: None,
            recorded_at: "2026-01-01 00:00:00".to_string(),
        };
        let json = serde_json::to_value(&event).expect("should serialize");
        assert_eq!(json["from"], "Operational");
        assert_eq!(json["to"], "Outage");
        assert_eq!(json["actor"], "poller");
    }
}
