//! Error types for the MAX! Cube core.
//!
//! Errors are split by the operation that produces them so callers can tell a
//! transient network failure apart from a programming error at the call site.

use std::time::Duration;

/// Socket-level failures talking to the Cube.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Connection to the cube is not open")]
    NotConnected,

    #[error("Cube closed the connection before a complete response")]
    Closed,

    #[error("Cube sent a line longer than {0} bytes")]
    LineTooLong(usize),

    #[error("No response from the cube within {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConnectionError {
    /// Whether this failure was the bounded wait running out.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ConnectionError::Timeout(_))
    }
}

/// A single record or line the decoder could not make sense of.
///
/// Per-record decode errors are logged and skipped; only a payload that
/// cannot yield a snapshot at all is escalated to [`UpdateError`].
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Invalid base64 in {record} payload: {source}")]
    Base64 {
        record: char,
        #[source]
        source: base64::DecodeError,
    },

    #[error("Truncated {what}: needed {needed} bytes, {available} available")]
    Truncated {
        what: &'static str,
        needed: usize,
        available: usize,
    },

    #[error("Malformed {record} line: {reason}")]
    Malformed { record: char, reason: String },

    #[error("Invalid RF address: {0:?}")]
    InvalidAddress(String),
}

/// Failure to produce a snapshot from the Cube.
#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Cube response is missing its {0} line")]
    MissingRecord(char),
}

/// Failure of a write command (temperature / mode).
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// The caller supplied an absent or unencodable value.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The device lacks state needed to complete the command.
    #[error("Invalid device state: {0}")]
    InvalidState(String),

    #[error("Cube rejected the command (result code {0})")]
    Rejected(u8),

    #[error("Unexpected acknowledgement from cube: {0:?}")]
    BadAcknowledgement(String),

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),
}
