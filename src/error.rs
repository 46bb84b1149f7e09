//! Error types for the pipeline seams that terminate the process.
//!
//! Each fatal path carries its own exit status so operators can tell a
//! failed collection pass from a listener or network failure.

use crate::types::Labels;

/// Process exit statuses
pub mod exit {
    pub const COLLECTION_FAILED: u8 = 1;
    pub const CONFIG_INVALID: u8 = 2;
    pub const BIND_FAILED: u8 = 3;
    pub const SEND_FAILED: u8 = 4;
    pub const DUPLICATE_REGISTRATION: u8 = 5;
}

/// Errors raised by a metric sink while recording
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// The same name and label set was registered twice in one process.
    #[error("metric {name} with labels {labels:?} is already registered")]
    DuplicateRegistration { name: String, labels: Labels },

    /// The registry refused the metric (bad label name, conflicting help, ...).
    #[error("metric {name} rejected by registry: {reason}")]
    Rejected { name: String, reason: String },
}

/// Reasons a collection pass is aborted
#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    #[error("collector {name} failed: {source:#}")]
    Collector {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("collector {name} tried to register a duplicate metric: {source}")]
    DuplicateRegistration {
        name: String,
        #[source]
        source: SinkError,
    },

    #[error("collector {name} did not finish within {secs}s")]
    Timeout { name: String, secs: u64 },

    #[error("collection cancelled while running {name}")]
    Cancelled { name: String },
}

impl CollectError {
    pub fn exit_code(&self) -> u8 {
        match self {
            CollectError::DuplicateRegistration { .. } => exit::DUPLICATE_REGISTRATION,
            _ => exit::COLLECTION_FAILED,
        }
    }
}

/// Errors from the push-mode network sender
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("failed to resolve {addr}: {source}")]
    Resolve {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} did not resolve to any address")]
    NoAddress(String),

    #[error("I/O error talking to server: {0}")]
    Io(#[from] std::io::Error),

    #[error("server did not answer within {0}s")]
    Timeout(u64),

    #[error("malformed server response: {0}")]
    Protocol(String),

    #[error("failed to encode or decode payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("server answered {response}: {info}")]
    Rejected { response: String, info: String },
}

/// Errors from the dispatch stage
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("metrics server stopped: {0}")]
    Serve(#[source] std::io::Error),

    #[error("failed to send batch: {0}")]
    Send(#[from] SendError),
}

impl DispatchError {
    pub fn exit_code(&self) -> u8 {
        match self {
            DispatchError::Bind { .. } | DispatchError::Serve(_) => exit::BIND_FAILED,
            DispatchError::Send(_) => exit::SEND_FAILED,
        }
    }
}
