//! Status store and aggregation for the Beacon status page.
//!
//! Implements the durable record of services and their current status, the
//! append-only transition log, incident bookkeeping, and the pure
//! aggregation functions that derive the externally visible system summary.
//!
//! All persistence operations are synchronous `rusqlite` functions over a
//! `&Connection`; async callers wrap them in `tokio::task::spawn_blocking`
//! (see `beacon-engine`). The one write path with real invariants is
//! [`store::propose_status`]: it reads, compares, and — only on difference —
//! updates the service row and appends exactly one transition inside a
//! single transaction.

mod aggregate;
pub mod store;

pub use aggregate::{compute_overall_status, correlate_incidents, IncidentRollup};
pub use store::{
    CreateIncidentParams, CreateServiceParams, Incident, Organization, Service, StatusProposal,
    StatusTransition, StoreError,
};
