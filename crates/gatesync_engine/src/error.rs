//! Error types for the sync engine.

use gatesync_core::{DiffError, EntityKind, ErrorSet, GraphError, Operation, StateError};
use thiserror::Error;

/// Result type for admin API calls.
pub type AdminResult<T> = Result<T, AdminError>;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors returned by an admin API client.
///
/// Every error is either transient (worth retrying) or permanent; see
/// [`AdminError::is_retryable`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdminError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The request timed out.
    #[error("request timed out")]
    Timeout,

    /// The gateway answered with a non-success status.
    #[error("HTTP {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body or reason.
        message: String,
    },

    /// The response body could not be decoded.
    #[error("cannot decode response: {0}")]
    Decode(String),

    /// The request could not be built from the record.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl AdminError {
    /// Creates a retryable transport error.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Creates an error for an HTTP status.
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    /// Returns true if this error can be retried.
    ///
    /// Transport failures, timeouts, HTTP 429 and 5xx are transient; other
    /// statuses and decoding failures are permanent.
    pub fn is_retryable(&self) -> bool {
        match self {
            AdminError::Transport { retryable, .. } => *retryable,
            AdminError::Timeout => true,
            AdminError::Status { status, .. } => *status == 429 || *status >= 500,
            AdminError::Decode(_) | AdminError::InvalidRequest(_) => false,
        }
    }

    /// Returns true for HTTP 404.
    pub fn is_not_found(&self) -> bool {
        matches!(self, AdminError::Status { status: 404, .. })
    }
}

/// Why a single change event did not apply.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChangeError {
    /// The admin API rejected the call.
    #[error("{operation} {kind} {entity}: {source} (after {attempts} attempt(s))")]
    Failed {
        /// The operation.
        operation: Operation,
        /// Entity kind.
        kind: EntityKind,
        /// Entity label.
        entity: String,
        /// Calls made, retries included.
        attempts: u32,
        /// The last error.
        #[source]
        source: AdminError,
    },

    /// A change this one depends on failed.
    #[error("{operation} {kind} {entity}: skipped due to dependency failure ({dependency})")]
    Skipped {
        /// The operation.
        operation: Operation,
        /// Entity kind.
        kind: EntityKind,
        /// Entity label.
        entity: String,
        /// The change that failed first.
        dependency: String,
    },

    /// The run was cancelled before this change was dispatched.
    #[error("{operation} {kind} {entity}: cancelled")]
    Cancelled {
        /// The operation.
        operation: Operation,
        /// Entity kind.
        kind: EntityKind,
        /// Entity label.
        entity: String,
    },
}

/// Errors that can occur during a sync run.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Admin API error outside of change application.
    #[error("admin API error: {0}")]
    Admin(#[from] AdminError),

    /// A state aggregate could not be built.
    #[error("invalid state: {0}")]
    State(#[from] StateError),

    /// The dependency graph is invalid.
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// The diff could not be computed.
    #[error("diff failed: {0}")]
    Diff(#[from] DiffError),

    /// One or more changes did not apply.
    #[error("{0}")]
    Changes(ErrorSet<ChangeError>),

    /// Sync was cancelled.
    #[error("sync cancelled")]
    Cancelled,
}

impl From<ErrorSet<ChangeError>> for SyncError {
    fn from(errors: ErrorSet<ChangeError>) -> Self {
        Self::Changes(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(AdminError::transient("connection reset").is_retryable());
        assert!(!AdminError::permanent("invalid certificate").is_retryable());
        assert!(AdminError::Timeout.is_retryable());
        assert!(AdminError::status(429, "slow down").is_retryable());
        assert!(AdminError::status(503, "unavailable").is_retryable());
        assert!(!AdminError::status(400, "schema violation").is_retryable());
        assert!(!AdminError::status(409, "unique constraint").is_retryable());
        assert!(!AdminError::Decode("eof".into()).is_retryable());
    }

    #[test]
    fn error_display() {
        let err = ChangeError::Skipped {
            operation: Operation::Create,
            kind: EntityKind::Route,
            entity: "r1".into(),
            dependency: "create service svc1".into(),
        };
        assert_eq!(
            err.to_string(),
            "create route r1: skipped due to dependency failure (create service svc1)"
        );

        let err = ChangeError::Failed {
            operation: Operation::Delete,
            kind: EntityKind::Consumer,
            entity: "alice".into(),
            attempts: 1,
            source: AdminError::status(400, "referenced"),
        };
        assert_eq!(
            err.to_string(),
            "delete consumer alice: HTTP 400: referenced (after 1 attempt(s))"
        );
    }

    #[test]
    fn change_errors_aggregate() {
        let set: ErrorSet<ChangeError> = vec![ChangeError::Cancelled {
            operation: Operation::Update,
            kind: EntityKind::Plugin,
            entity: "cors".into(),
        }]
        .into_iter()
        .collect();
        let err = SyncError::from(set);
        assert_eq!(err.to_string(), "1 error occurred:\n\tupdate plugin cors: cancelled");
    }
}
