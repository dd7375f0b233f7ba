//! Pure aggregation over already-fetched state.
//!
//! Nothing here touches the database: the read path fetches services and
//! recent incidents once, then derives the overall status and the incident
//! rollup in memory. Safe to call arbitrarily often.

use crate::store::Incident;
use beacon_types::{OverallStatus, ServiceStatus};
use std::collections::HashMap;

/// Computes the overall system status from per-service statuses.
///
/// Severity ordering: `Outage` > `Degraded` > `Operational`; the result is
/// the highest severity present. Total over its input: the empty list maps
/// to [`OverallStatus::Unknown`]. Single pass, O(n).
pub fn compute_overall_status(statuses: &[ServiceStatus]) -> OverallStatus {
    let mut worst: Option<ServiceStatus> = None;
    for &status in statuses {
        match worst {
            Some(current) if current.severity() >= status.severity() => {}
            _ => worst = Some(status),
        }
    }
    match worst {
        Some(status) => status.into(),
        None => OverallStatus::Unknown,
    }
}

/// Incidents grouped by service, with window-wide counts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IncidentRollup {
    /// Incidents per service id, preserving the input (newest-first) order.
    pub by_service: HashMap<i64, Vec<Incident>>,
    /// Total number of incidents in the window.
    pub total: usize,
    /// Number of unresolved incidents in the window.
    pub ongoing: usize,
}

/// Groups a window of incidents by service id.
///
/// The input is expected newest-first (as returned by
/// [`crate::store::recent_incidents`], which applies the time window);
/// per-group order is preserved. Pure grouping and counting — no queries.
pub fn correlate_incidents(incidents: &[Incident]) -> IncidentRollup {
    let mut rollup = IncidentRollup::default();
    for incident in incidents {
        rollup.total += 1;
        if !incident.resolved {
            rollup.ongoing += 1;
        }
        rollup
            .by_service
            .entry(incident.service_id)
            .or_default()
            .push(incident.clone());
    }
    rollup
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_types::IncidentStatus;

    fn incident(id: i64, service_id: i64, resolved: bool) -> Incident {
        Incident {
            id,
            service_id,
            status: if resolved {
                IncidentStatus::Resolved
            } else {
                IncidentStatus::Ongoing
            },
            description: format!("incident {id}"),
            resolved,
            created_at: "2026-01-01 00:00:00".to_string(),
            updated_at: "2026-01-01 00:00:00".to_string(),
        }
    }

    #[test]
    fn overall_status_highest_severity_wins() {
        use ServiceStatus::*;
        assert_eq!(
            compute_overall_status(&[Operational, Degraded, Operational]),
            OverallStatus::Degraded
        );
        assert_eq!(
            compute_overall_status(&[Operational, Operational]),
            OverallStatus::Operational
        );
        assert_eq!(
            compute_overall_status(&[Outage, Degraded]),
            OverallStatus::Outage
        );
    }

    #[test]
    fn overall_status_empty_is_unknown() {
        assert_eq!(compute_overall_status(&[]), OverallStatus::Unknown);
    }

    #[test]
    fn correlate_groups_and_counts() {
        // Newest first, as the store returns them.
        let incidents = vec![
            incident(4, 2, false),
            incident(3, 1, true),
            incident(2, 2, false),
            incident(1, 1, false),
        ];

        let rollup = correlate_incidents(&incidents);
        assert_eq!(rollup.total, 4);
        assert_eq!(rollup.ongoing, 3);

        let for_two = &rollup.by_service[&2];
        assert_eq!(
            for_two.iter().map(|i| i.id).collect::<Vec<_>>(),
            vec![4, 2],
            "per-group order stays newest-first"
        );
        assert_eq!(rollup.by_service[&1].len(), 2);
        assert!(!rollup.by_service.contains_key(&3));
    }

    #[test]
    fn correlate_empty_window() {
        let rollup = correlate_incidents(&[]);
        assert_eq!(rollup.total, 0);
        assert_eq!(rollup.ongoing, 0);
        assert!(rollup.by_service.is_empty());
    }
}
