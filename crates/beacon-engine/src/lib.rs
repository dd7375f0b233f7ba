//! Change detection and real-time propagation for the Beacon status page.
//!
//! This is the async layer between the synchronous status store and the
//! outside world:
//!
//! - [`detector::ChangeDetector`] is the single choke point for status
//!   mutation: every write — operator or poller — goes through
//!   [`detector::ChangeDetector::apply_status_change`], which serializes
//!   per service, records the transition, and publishes the change event.
//! - [`bus::StatusBus`] fans change events out to live subscribers without
//!   ever blocking the publisher on subscriber I/O.
//! - [`poller::UptimePoller`] periodically re-derives status from an
//!   external health-check collaborator and feeds the results through the
//!   same detector path.

pub mod bus;
pub mod detector;
mod error;
mod locks;
pub mod poller;

pub use bus::{OverflowPolicy, StatusBus, Subscription};
pub use detector::{ChangeDetector, IncidentPolicy};
pub use error::EngineError;
pub use locks::ServiceLocks;
pub use poller::{HealthCheck, HealthCheckError, PollerHandle, PollerState, UptimePoller};
