//! Error types for the lease client.
//!
//! All fallible operations in this crate return [`Result<T>`], which uses
//! the [`Error`] enum for error variants.

use std::time::Duration;

/// Errors that can occur while acquiring, renewing, or releasing a lease.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File system I/O error (config file).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error (config file).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Socket creation or configuration error.
    ///
    /// Typically occurs when binding to port 68 without administrator
    /// privileges, or when broadcast cannot be enabled. Always fatal.
    #[error("Socket error: {0}")]
    Socket(String),

    /// A datagram could not be sent or received.
    ///
    /// Fatal during acquisition, logged and retried during renewal.
    #[error("Transport error: {0}")]
    Transport(String),

    /// No datagram arrived within the receive timeout.
    #[error("No reply within {0:?}")]
    Timeout(Duration),

    /// Malformed protocol message.
    ///
    /// Covers unknown message kinds, a wrong number of OFFER/ACK fields,
    /// unparseable addresses, and non-numeric lease durations.
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Invalid client configuration.
    ///
    /// Returned by [`Config::validate`](crate::Config::validate).
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Every DISCOVER/REQUEST attempt of an acquisition failed.
    #[error("No lease acquired after {attempts} attempts")]
    AcquisitionFailed { attempts: u32 },

    /// Cancellation arrived before a lease was bound.
    #[error("Cancelled before a lease was bound")]
    Cancelled,

    /// A client task panicked or was aborted.
    #[error("Client task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl Error {
    /// Returns true for failures that count as one lost attempt
    /// (no reply, or a reply that could not be used).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Timeout(_) | Error::InvalidMessage(_))
    }
}

/// A specialized Result type for lease client operations.
pub type Result<T> = std::result::Result<T, Error>;
