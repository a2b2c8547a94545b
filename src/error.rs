//! Notifier error types.
//!
//! The retry-relevant error classes for the live link are carried by
//! [`crate::transport::LinkError`]; this module holds the crate-wide error
//! enum used by configuration, the fetch/update pipeline, and the binary.

use thiserror::Error;

/// Notifier errors.
#[derive(Error, Debug)]
pub enum NotifierError {
    /// Network communication error.
    #[error("Network error: {0}")]
    Network(String),

    /// Protocol-level error (malformed command stream).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Peer speaks a newer protocol; payload carries the update URL.
    #[error("Protocol version mismatch")]
    VersionMismatch {
        /// Server-supplied URL of the replacement binary.
        update_url: String,
    },

    /// HTTP fetch pipeline failure (resolve, connect, or read stage).
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// Update artifact failed signature verification.
    #[error("Verification error: {0}")]
    Verification(String),

    /// External installer rejected the verified update.
    #[error("Install error: {0}")]
    Install(String),

    /// Malformed or unusable update URL.
    #[error("Invalid update URL: {0}")]
    UpdateUrl(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for notifier operations
pub type Result<T> = std::result::Result<T, NotifierError>;

impl From<toml::de::Error> for NotifierError {
    fn from(err: toml::de::Error) -> Self {
        NotifierError::Config(err.to_string())
    }
}
