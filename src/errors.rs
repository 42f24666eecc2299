//! Error types for the explorer core.
//!
//! Library functions return [`ExplorerError`]; the binary and the config
//! loader sit at the edge and use `anyhow`.  Nothing here is fatal to the
//! host: every variant ends up as a user-visible notification or a log line.

use thiserror::Error;

/// Errors raised by the path, URI and transfer layers.
#[derive(Debug, Error)]
pub enum ExplorerError {
    /// The URI could not be split into scheme, path and query.
    #[error("Invalid resource URI '{uri}': {reason}")]
    InvalidUri { uri: String, reason: String },

    /// The URI uses a scheme other than the configured one.
    #[error("Unsupported URI scheme '{found}' (expected '{expected}')")]
    UnsupportedScheme { expected: String, found: String },

    /// The URI carries no `resourceId` query parameter.
    #[error("URI '{uri}' is missing the resourceId query parameter")]
    MissingResourceId { uri: String },

    /// A line from the transfer engine is not a status record we understand.
    #[error("Malformed status line: {reason}")]
    MalformedStatus { reason: String },

    /// The requested `--from-to` pairing does not match the locations.
    #[error("Transfer direction {from_to} does not match {source_kind} -> {destination_kind}")]
    InvalidFromTo {
        from_to: String,
        source_kind: &'static str,
        destination_kind: &'static str,
    },

    /// The transfer engine could not be started.
    #[error("Failed to start transfer engine '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Any other I/O failure while talking to the engine.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ExplorerError {
    /// Stable short code for logs and metric labels.
    pub fn code(&self) -> &'static str {
        match self {
            ExplorerError::InvalidUri { .. } => "InvalidUri",
            ExplorerError::UnsupportedScheme { .. } => "UnsupportedScheme",
            ExplorerError::MissingResourceId { .. } => "MissingResourceId",
            ExplorerError::MalformedStatus { .. } => "MalformedStatus",
            ExplorerError::InvalidFromTo { .. } => "InvalidFromTo",
            ExplorerError::Spawn { .. } => "SpawnFailed",
            ExplorerError::Io(_) => "IoError",
        }
    }

    pub(crate) fn malformed(reason: impl std::fmt::Display) -> Self {
        ExplorerError::MalformedStatus {
            reason: reason.to_string(),
        }
    }
}

impl From<serde_json::Error> for ExplorerError {
    fn from(err: serde_json::Error) -> Self {
        ExplorerError::malformed(err)
    }
}

/// Convenience alias used across the library.
pub type Result<T> = std::result::Result<T, ExplorerError>;
