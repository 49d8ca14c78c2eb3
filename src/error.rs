// ABOUTME: Crate-wide error type for drivers, connections, dispatch and chains.
// ABOUTME: Uses thiserror, with an ErrorKind for programmatic branching.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::capability::Capability;

/// Boxed error produced by a backend call.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("no connection established")]
    NoConnection,

    #[error("unregistered driver: {0}")]
    UnregisteredDriver(String),

    #[error("connection is closed")]
    ConnectionClosed,

    #[error("connection has not begun")]
    NotBegun,

    #[error("invalid uri '{uri}': {reason}")]
    InvalidUri { uri: String, reason: String },

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("unsupported service: {0}")]
    UnsupportedService(String),

    #[error("operation '{capability}' is not supported by service '{service}'")]
    UnsupportedOperation {
        capability: Capability,
        service: String,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("unknown method: {0}")]
    UnknownMethod(String),

    #[error("unknown kind: {0}")]
    UnknownKind(String),

    #[error("step '{step}' needs a {resource} provisioned by an earlier step")]
    MissingPrerequisite { step: String, resource: &'static str },

    #[error("chain has already been committed")]
    ChainFinished,

    #[error("{call} failed: {source}")]
    Backend {
        call: String,
        #[source]
        source: BoxError,
    },

    #[error("command exited with status {code}: {stderr}")]
    ExecFailed { code: i64, stderr: String },

    #[error("configuration file not found in {0}")]
    ConfigNotFound(PathBuf),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Opening, beginning, using or closing a connection failed.
    Connection,
    /// The backend does not offer the requested service or capability.
    Unsupported,
    /// The caller's cancellation token fired.
    Cancelled,
    /// The request or chain was malformed or used out of order.
    Request,
    /// A backend call failed.
    Backend,
    /// Configuration could not be loaded.
    Config,
}

impl Error {
    /// Wrap a backend failure with the name of the call that produced it.
    pub fn backend(call: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Error::Backend {
            call: call.into(),
            source: source.into(),
        }
    }

    /// Returns the error kind for programmatic handling.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NoConnection
            | Error::UnregisteredDriver(_)
            | Error::ConnectionClosed
            | Error::NotBegun
            | Error::InvalidUri { .. }
            | Error::Timeout(_) => ErrorKind::Connection,
            Error::UnsupportedService(_) | Error::UnsupportedOperation { .. } => {
                ErrorKind::Unsupported
            }
            Error::Cancelled => ErrorKind::Cancelled,
            Error::InvalidRequest(_)
            | Error::UnknownMethod(_)
            | Error::UnknownKind(_)
            | Error::MissingPrerequisite { .. }
            | Error::ChainFinished => ErrorKind::Request,
            Error::Backend { .. } | Error::ExecFailed { .. } | Error::Io(_) | Error::Json(_) => {
                ErrorKind::Backend
            }
            Error::ConfigNotFound(_) | Error::InvalidConfig(_) | Error::Yaml(_) => {
                ErrorKind::Config
            }
        }
    }

    /// True for unsupported-service and unsupported-operation errors.
    pub fn is_unsupported(&self) -> bool {
        self.kind() == ErrorKind::Unsupported
    }
}
