//! Error Types
//!
//! Two layers of errors flow through the ingestion pipeline:
//!
//! - [`PortError`] is what adapters (blob, metadata, payload, graph, queue,
//!   notification) return. It never crosses the orchestrator/reconciler boundary.
//! - [`IngestError`] is the caller-facing taxonomy. Adapter failures are rewrapped
//!   as [`IngestError::Upstream`], keeping the original error as the `source`.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error returned by any port adapter
#[derive(Error, Debug, Clone)]
pub enum PortError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Timeout error: operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    #[error("Channel closed: {0}")]
    Closed(String),
}

/// Result type for port operations
pub type PortResult<T> = Result<T, PortError>;

impl PortError {
    /// Create a generic backend error
    pub fn backend<S: Into<String>>(msg: S) -> Self {
        Self::Backend(msg.into())
    }

    /// Create a serialization error
    pub fn serialization<S: Into<String>>(msg: S) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create an unavailable error
    pub fn unavailable<S: Into<String>>(msg: S) -> Self {
        Self::Unavailable(msg.into())
    }

    /// Check if the error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::Unavailable(_) | Self::Timeout { .. } | Self::Conflict(_)
        )
    }
}

impl From<std::io::Error> for PortError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for PortError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// The external collaborator an upstream failure came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Port {
    Blob,
    Metadata,
    Payload,
    Graph,
    Queue,
    Notification,
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Port::Blob => "blob store",
            Port::Metadata => "metadata store",
            Port::Payload => "payload store",
            Port::Graph => "graph store",
            Port::Queue => "job queue",
            Port::Notification => "notification gateway",
        };
        f.write_str(name)
    }
}

/// Caller-facing error taxonomy for workspace and ingestion operations
#[derive(Error, Debug)]
pub enum IngestError {
    /// Malformed input, e.g. missing required fields
    #[error("validation failed: {0}")]
    Validation(String),

    /// Workspace or document absent
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Caller does not own the workspace
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// A trusted internal message contradicts stored state
    #[error("data integrity violation: {0}")]
    Integrity(String),

    /// Any store/queue/blob adapter failure
    #[error("upstream {port} failure: {source}")]
    Upstream {
        port: Port,
        #[source]
        source: PortError,
    },
}

/// Result type for workspace and ingestion operations
pub type IngestResult<T> = Result<T, IngestError>;

impl IngestError {
    /// Create a validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    pub fn workspace_not_found(id: impl fmt::Display) -> Self {
        Self::NotFound {
            kind: "workspace",
            id: id.to_string(),
        }
    }

    pub fn document_not_found(id: impl fmt::Display) -> Self {
        Self::NotFound {
            kind: "document",
            id: id.to_string(),
        }
    }

    /// Adapter for `map_err` that wraps a port failure as upstream
    ///
    /// ```
    /// use assay_core::error::{IngestError, Port, PortError};
    ///
    /// let failed: Result<(), PortError> = Err(PortError::backend("disk full"));
    /// let err = failed.map_err(IngestError::upstream(Port::Metadata)).unwrap_err();
    /// assert!(matches!(err, IngestError::Upstream { port: Port::Metadata, .. }));
    /// ```
    pub fn upstream(port: Port) -> impl FnOnce(PortError) -> IngestError {
        move |source| IngestError::Upstream { port, source }
    }

    /// Whether redelivering the message that produced this error can never succeed
    ///
    /// Permanent failures are routed to the dead-letter path by the result consumer.
    pub fn is_permanent(&self) -> bool {
        !matches!(self, Self::Upstream { .. })
    }

    /// HTTP-equivalent status code
    pub fn status(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::Forbidden(_) => 403,
            Self::NotFound { .. } => 404,
            Self::Integrity(_) => 500,
            Self::Upstream { .. } => 502,
        }
    }

    /// Stable problem type slug
    pub fn problem_type(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation-error",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound { .. } => "not-found",
            Self::Integrity(_) => "integrity-violation",
            Self::Upstream { .. } => "upstream-failure",
        }
    }

    /// Render as a structured problem payload
    ///
    /// Upstream failures only name the collaborator; the adapter's own message
    /// stays in the error chain for logs.
    pub fn problem(&self) -> Problem {
        let (title, detail) = match self {
            Self::Validation(msg) => ("Invalid request", msg.clone()),
            Self::Forbidden(msg) => ("Forbidden", msg.clone()),
            Self::NotFound { kind, id } => ("Not found", format!("{} {} does not exist", kind, id)),
            Self::Integrity(msg) => ("Data integrity violation", msg.clone()),
            Self::Upstream { port, .. } => {
                ("Upstream failure", format!("the {} is unavailable", port))
            }
        };

        Problem {
            problem_type: self.problem_type().to_string(),
            title: title.to_string(),
            status: self.status(),
            detail,
        }
    }
}

/// Structured error payload rendered to API callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    #[serde(rename = "type")]
    pub problem_type: String,
    pub title: String,
    pub status: u16,
    pub detail: String,
}

impl From<&IngestError> for Problem {
    fn from(err: &IngestError) -> Self {
        err.problem()
    }
}
