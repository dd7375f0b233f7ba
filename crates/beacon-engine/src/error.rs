//! Error types for the engine layer.

use beacon_status::StoreError;

/// Errors that can occur while applying or propagating a status change.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A store operation failed (`NotFound`, `InvalidStatus`, or a database
    /// error that is not busy/locked contention).
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The proposal kept losing the per-service serialization race after
    /// bounded internal retries. Not a data-integrity failure; the caller
    /// may retry.
    #[error("status proposal for service {service_id} lost the serialization race after {attempts} attempts")]
    ConflictRetryable {
        /// The contended service.
        service_id: i64,
        /// How many attempts were made before giving up.
        attempts: u32,
    },

    /// A collaborator (health check or persistence pool) was transiently
    /// unreachable.
    #[error("collaborator unavailable: {0}")]
    CollaboratorUnavailable(String),

    /// A blocking task was cancelled or panicked.
    #[error("blocking task failed to complete")]
    TaskJoin,
}

impl EngineError {
    /// Whether this error is SQLite busy/locked contention that a bounded
    /// retry may resolve.
    pub(crate) fn is_busy(&self) -> bool {
        if let Self::Store(StoreError::Database(rusqlite::Error::SqliteFailure(err, _))) = self {
            matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            )
        } else {
            false
        }
    }
}
