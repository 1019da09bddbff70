//! Error types for the telemetry relay.
//!
//! Every fallible operation in the crate returns [`Result`], whose error type is
//! [`RelayError`]. Errors carry structured context so the ingestion loop can log
//! them without allocating on the hot path.
//!
//! ## Error Categories
//!
//! - **Decode Errors**: A datagram is too short for the structure being read
//! - **Bind Errors**: A UDP or HTTP listener could not be bound at startup
//! - **I/O Errors**: Transport read failures on an already-bound socket
//! - **Config Errors**: Invalid values rejected before the relay starts
//! - **Serialize Errors**: A record could not be encoded for a subscriber
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use paddock::RelayError;
//!
//! let error = RelayError::truncated("PacketHeader", 29, 12);
//! assert!(!error.is_retryable());
//! for suggestion in error.recovery_suggestions() {
//!     println!("  - {}", suggestion);
//! }
//! ```

use std::net::SocketAddr;
use thiserror::Error;

/// Result type alias for relay operations.
pub type Result<T, E = RelayError> = std::result::Result<T, E>;

/// Main error type for relay operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RelayError {
    #[error("{structure} needs {needed} bytes, datagram has {available}")]
    Truncated { structure: &'static str, needed: usize, available: usize },

    #[error("Failed to bind {what} on {addr}")]
    Bind {
        what: &'static str,
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Transport I/O error")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration for {setting}: {reason}")]
    Config { setting: &'static str, reason: String },

    #[error("Failed to serialize telemetry record")]
    Serialize(#[from] serde_json::Error),
}

impl RelayError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            RelayError::Io(_) => true,
            RelayError::Bind { .. } => true,
            RelayError::Truncated { .. } => false,
            RelayError::Config { .. } => false,
            RelayError::Serialize(_) => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            RelayError::Truncated { .. } => vec![
                "Check the game's UDP format setting matches the relay",
                "Verify nothing between game and relay truncates datagrams",
            ],
            RelayError::Bind { .. } => vec![
                "Check no other process is listening on the same port",
                "Use a port above 1024 or run with sufficient privileges",
                "Verify the bind host is an address of this machine",
            ],
            RelayError::Io(_) => vec![
                "Check network interface status",
                "Transient errors are retried automatically",
            ],
            RelayError::Config { .. } => vec![
                "Run with --help to see accepted values",
                "Check environment variables overriding flags",
            ],
            RelayError::Serialize(_) => vec!["Report the packet that produced the record"],
        }
    }

    /// Helper constructor for short-buffer decode failures.
    pub fn truncated(structure: &'static str, needed: usize, available: usize) -> Self {
        RelayError::Truncated { structure, needed, available }
    }

    /// Helper constructor for listener bind failures.
    pub fn bind_failed(what: &'static str, addr: SocketAddr, source: std::io::Error) -> Self {
        RelayError::Bind { what, addr, source }
    }

    /// Helper constructor for configuration errors.
    pub fn config(setting: &'static str, reason: impl Into<String>) -> Self {
        RelayError::Config { setting, reason: reason.into() }
    }
}
