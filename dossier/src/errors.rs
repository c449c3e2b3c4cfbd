//! Error types for the dossier research core.
//!
//! The taxonomy separates caller-facing state errors (invalid transitions,
//! conflicts) from provider-side failures, which are never surfaced as errors:
//! they are classified and absorbed into fallback results by the resilience
//! layer.

use thiserror::Error;
use uuid::Uuid;

/// The main error type for dossier operations.
#[derive(Debug, Clone, Error)]
pub enum DossierError {
    /// An operation was attempted against a job or iteration in the wrong state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The requested job does not exist.
    #[error("Job not found: {0}")]
    JobNotFound(Uuid),

    /// The requested iteration does not exist on the job.
    #[error("Iteration {number} not found on job {job_id}")]
    IterationNotFound {
        /// The job ID.
        job_id: Uuid,
        /// The missing iteration number.
        number: u32,
    },

    /// A concurrent operation conflicted with this one; the caller should
    /// retry the whole operation.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A consolidated analysis already exists and `force` was not set.
    #[error("Consolidated analysis already exists for job {0}; pass force=true to replace it")]
    AlreadyExists(Uuid),

    /// Consolidation was requested with fewer than the minimum completed
    /// iterations.
    #[error("Insufficient data: {found} completed iterations, {required} required")]
    InsufficientData {
        /// Completed iterations found on the job.
        found: usize,
        /// Minimum required for consolidation.
        required: usize,
    },

    /// The job was cancelled before the operation could take effect.
    #[error("Job cancelled: {0}")]
    Cancelled(String),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DossierError {
    /// Creates an invalid-state error.
    #[must_use]
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    /// Creates a conflict error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Returns true if the error is a state or conflict error, which callers
    /// must handle themselves rather than expect the core to absorb.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvalidState(_)
                | Self::Conflict(_)
                | Self::AlreadyExists(_)
                | Self::InsufficientData { .. }
        )
    }
}

/// Convenience alias for dossier results.
pub type Result<T> = std::result::Result<T, DossierError>;
