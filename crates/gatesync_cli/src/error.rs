//! CLI error type.

use gatesync_core::{DiffError, GraphError, StateError};
use gatesync_engine::SyncError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

/// Errors surfaced to the user.
#[derive(Error, Debug)]
pub enum CliError {
    /// Reading or writing a file failed.
    #[error("{}: {source}", path.display())]
    Io {
        /// The file.
        path: PathBuf,
        /// The cause.
        #[source]
        source: std::io::Error,
    },

    /// A state file is not valid JSON for the record shape.
    #[error("{}: invalid state file: {source}", path.display())]
    Parse {
        /// The file.
        path: PathBuf,
        /// The cause.
        #[source]
        source: serde_json::Error,
    },

    /// A `--header` value is malformed.
    #[error("invalid header '{0}': expected key:value")]
    InvalidHeader(String),

    /// The admin address cannot be used.
    #[error("invalid admin address '{address}': {reason}")]
    InvalidAddress {
        /// The configured address.
        address: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The HTTP client could not be built.
    #[error("cannot build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    /// The desired state is inconsistent.
    #[error("invalid desired state: {0}")]
    State(#[from] StateError),

    /// The dependency graph is invalid.
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Diffing failed.
    #[error("diff failed: {0}")]
    Diff(#[from] DiffError),

    /// Talking to the gateway or applying changes failed.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// The async runtime or a worker task failed.
    #[error("runtime error: {0}")]
    Runtime(String),
}

impl CliError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
