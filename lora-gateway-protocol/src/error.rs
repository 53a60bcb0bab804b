//! Error handling for the gateway control protocol
//!
//! This module provides a single error type for every protocol operation.
//! Errors are automatically converted from underlying library errors using `thiserror`.
//!
//! ## Error Categories
//!
//! Every variant belongs to exactly one [`ErrorCategory`]:
//!
//! ### Transport
//! The byte channel to the device failed or closed. Surfaced to the consumer,
//! forces the connection back to `Idle`, never retried automatically.
//!
//! ### Protocol parse
//! A frame received from the device was malformed (bad listing line, broken
//! `FILE_START` marker, invalid configuration JSON). The frame is logged and
//! skipped; the connection stays up.
//!
//! ### Validation
//! A command was rejected locally before any byte reached the wire (not
//! connected, invalid radio configuration, transfer already running).
//!
//! ### Storage
//! The download sink could not persist a finished file.
//!
//! ## Usage
//!
//! ```rust
//! use lora_gateway_protocol::{ErrorCategory, ProtocolError, Result};
//!
//! fn require_connection(connected: bool) -> Result<()> {
//!     if !connected {
//!         return Err(ProtocolError::NotConnected);
//!     }
//!     Ok(())
//! }
//!
//! let err = require_connection(false).unwrap_err();
//! assert_eq!(err.category(), ErrorCategory::Validation);
//! ```

use thiserror::Error;

/// Result type for protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Failure scope of a [`ProtocolError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Channel closed or failed; scoped to the connection
    Transport,
    /// Malformed inbound frame; scoped to that frame
    ProtocolParse,
    /// Command rejected locally; nothing was sent
    Validation,
    /// Finished download could not be stored
    Storage,
    /// Operation stopped on request
    Cancelled,
}

/// Errors that can occur during protocol operations
///
/// # Automatic Conversions
///
/// - `std::io::Error` → `ProtocolError::Io`
/// - `serde_json::Error` → `ProtocolError::Json`
///
/// # Examples
///
/// ```rust
/// use lora_gateway_protocol::ProtocolError;
///
/// let error = ProtocolError::NotConnected;
/// assert_eq!(error.to_string(), "Not connected");
///
/// let error = ProtocolError::InvalidFrame("missing size".to_string());
/// assert_eq!(error.to_string(), "Invalid frame: missing size");
/// ```
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// I/O error (socket, file system)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Transport layer error (Bluetooth stack, GATT service lookup)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Operation timed out
    #[error("Connection timeout: {0}")]
    Timeout(String),

    /// Connection refused by the remote device
    #[error("Connection refused: {0}")]
    ConnectionRefused(String),

    /// Connection closed while an operation depended on it
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    /// Malformed inbound frame
    ///
    /// ```rust
    /// use lora_gateway_protocol::ProtocolError;
    ///
    /// let error = ProtocolError::InvalidFrame("bad,xyz".to_string());
    /// assert!(!error.is_recoverable());
    /// ```
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Command attempted while the connection is not established
    #[error("Not connected")]
    NotConnected,

    /// Radio configuration or command argument rejected locally
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A transfer of the same direction is already running on this connection
    #[error("Transfer in progress: {0}")]
    TransferInProgress(String),

    /// Operation cancelled
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// Operation attempted in an invalid state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Permission denied (download directory, local file)
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Resource exhausted (disk full)
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),
}

impl ProtocolError {
    /// Convert a generic I/O error into a more specific variant
    ///
    /// # Examples
    ///
    /// ```rust
    /// use lora_gateway_protocol::ProtocolError;
    /// use std::io::{Error, ErrorKind};
    ///
    /// let io_error = Error::new(ErrorKind::TimedOut, "no answer");
    /// let error = ProtocolError::from_io_error(io_error, "connecting to gateway");
    ///
    /// assert!(matches!(error, ProtocolError::Timeout(_)));
    /// ```
    pub fn from_io_error(error: std::io::Error, context: &str) -> Self {
        use std::io::ErrorKind;

        match error.kind() {
            ErrorKind::TimedOut => ProtocolError::Timeout(format!("{}: {}", context, error)),
            ErrorKind::ConnectionRefused => {
                ProtocolError::ConnectionRefused(format!("{}: {}", context, error))
            }
            ErrorKind::PermissionDenied => {
                ProtocolError::PermissionDenied(format!("{}: {}", context, error))
            }
            ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof => ProtocolError::ConnectionClosed(format!(
                "{}: connection interrupted ({})",
                context, error
            )),
            _ => ProtocolError::Io(error),
        }
    }

    /// Which failure scope this error belongs to
    pub fn category(&self) -> ErrorCategory {
        match self {
            ProtocolError::Io(_)
            | ProtocolError::Transport(_)
            | ProtocolError::Timeout(_)
            | ProtocolError::ConnectionRefused(_)
            | ProtocolError::ConnectionClosed(_) => ErrorCategory::Transport,
            ProtocolError::Json(_) | ProtocolError::InvalidFrame(_) => {
                ErrorCategory::ProtocolParse
            }
            ProtocolError::NotConnected
            | ProtocolError::InvalidConfig(_)
            | ProtocolError::TransferInProgress(_)
            | ProtocolError::InvalidState(_) => ErrorCategory::Validation,
            ProtocolError::PermissionDenied(_) | ProtocolError::ResourceExhausted(_) => {
                ErrorCategory::Storage
            }
            ProtocolError::Cancelled(_) => ErrorCategory::Cancelled,
        }
    }

    /// Check if a new explicit attempt might succeed
    ///
    /// Nothing is retried automatically; this only informs the consumer.
    ///
    /// ```rust
    /// use lora_gateway_protocol::ProtocolError;
    ///
    /// assert!(ProtocolError::Timeout("connect".to_string()).is_recoverable());
    /// assert!(!ProtocolError::InvalidConfig("bw=100".to_string()).is_recoverable());
    /// ```
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ProtocolError::Timeout(_)
                | ProtocolError::ConnectionRefused(_)
                | ProtocolError::ConnectionClosed(_)
                | ProtocolError::Transport(_)
                | ProtocolError::Io(_)
                | ProtocolError::TransferInProgress(_)
        )
    }

    /// Get a user-friendly error message suitable for display
    ///
    /// ```rust
    /// use lora_gateway_protocol::ProtocolError;
    ///
    /// assert_eq!(
    ///     ProtocolError::NotConnected.user_message(),
    ///     "Not connected to a gateway. Connect first."
    /// );
    /// ```
    pub fn user_message(&self) -> String {
        match self {
            ProtocolError::NotConnected => "Not connected to a gateway. Connect first.".to_string(),
            ProtocolError::Timeout(msg) => {
                format!("Connection timeout: {}. Check the device is powered and in range.", msg)
            }
            ProtocolError::ConnectionRefused(_) => {
                "Connection refused. Check the device is paired.".to_string()
            }
            ProtocolError::ConnectionClosed(msg) => format!("Connection lost: {}.", msg),
            ProtocolError::Transport(msg) => {
                format!("Bluetooth error: {}. Check the adapter is powered.", msg)
            }
            ProtocolError::InvalidConfig(msg) => format!("Invalid radio configuration: {}.", msg),
            ProtocolError::InvalidFrame(msg) => format!("Invalid data received: {}.", msg),
            ProtocolError::TransferInProgress(msg) => {
                format!("{}. Wait for the current transfer to finish.", msg)
            }
            ProtocolError::Cancelled(msg) => format!("Operation cancelled: {}.", msg),
            ProtocolError::InvalidState(msg) => format!("Invalid state: {}.", msg),
            ProtocolError::PermissionDenied(msg) => {
                format!("Permission denied: {}. Check directory permissions.", msg)
            }
            ProtocolError::ResourceExhausted(msg) => {
                format!("Resource exhausted: {}. Free up space and try again.", msg)
            }
            ProtocolError::Io(e) => format!("I/O error: {}.", e),
            ProtocolError::Json(e) => format!("Data format error: {}.", e),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        ProtocolError::InvalidState(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ProtocolError::NotConnected;
        assert_eq!(error.to_string(), "Not connected");

        let error = ProtocolError::InvalidConfig("bandwidth 100".to_string());
        assert_eq!(error.to_string(), "Invalid configuration: bandwidth 100");

        let error = ProtocolError::ConnectionClosed("unexpected disconnect".to_string());
        assert_eq!(error.to_string(), "Connection closed: unexpected disconnect");
    }

    #[test]
    fn test_io_error_conversion() {
        use std::io::{Error, ErrorKind};

        let io_error = Error::new(ErrorKind::NotFound, "file not found");
        let protocol_error: ProtocolError = io_error.into();

        assert!(matches!(protocol_error, ProtocolError::Io(_)));
        assert!(protocol_error.to_string().contains("file not found"));
        assert_eq!(protocol_error.category(), ErrorCategory::Transport);
    }

    #[test]
    fn test_json_error_is_parse_category() {
        let json_error = serde_json::from_str::<serde_json::Value>(r#"{"bw":"#).unwrap_err();
        let protocol_error: ProtocolError = json_error.into();

        assert!(matches!(protocol_error, ProtocolError::Json(_)));
        assert_eq!(protocol_error.category(), ErrorCategory::ProtocolParse);
    }

    #[test]
    fn test_from_io_error_classification() {
        use std::io::{Error, ErrorKind};

        let err = ProtocolError::from_io_error(Error::new(ErrorKind::BrokenPipe, "gone"), "write");
        assert!(matches!(err, ProtocolError::ConnectionClosed(_)));

        let err =
            ProtocolError::from_io_error(Error::new(ErrorKind::ConnectionRefused, "no"), "connect");
        assert!(matches!(err, ProtocolError::ConnectionRefused(_)));

        let err = ProtocolError::from_io_error(Error::new(ErrorKind::Other, "odd"), "read");
        assert!(matches!(err, ProtocolError::Io(_)));
    }

    #[test]
    fn test_validation_errors_are_not_recoverable_by_retry() {
        assert_eq!(ProtocolError::NotConnected.category(), ErrorCategory::Validation);
        assert!(!ProtocolError::NotConnected.is_recoverable());
        assert!(!ProtocolError::InvalidConfig("x".into()).is_recoverable());
        assert_eq!(
            ProtocolError::TransferInProgress("upload".into()).category(),
            ErrorCategory::Validation
        );
    }
}
