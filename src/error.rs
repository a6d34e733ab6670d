//! Error types for EEG stream generation and reception.
//!
//! All errors implement `std::error::Error` and carry enough context to decide
//! whether a failure is recovered locally (reconnect, resynchronize, skip a row)
//! or must be reported to the caller of `start()` / `connect()`.
//!
//! ## Error Categories
//!
//! - **Network Errors**: bind, connect, read and write failures on stream sockets
//! - **Framing Errors**: corrupt or undecodable wire packets
//! - **Source Errors**: malformed replay rows and end-of-replay
//! - **Configuration Errors**: invalid parameters and unreadable config documents
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use eeglink::StreamError;
//!
//! let error = StreamError::connect_failed("127.0.0.1:50012", std::io::ErrorKind::ConnectionRefused.into());
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for stream operations.
pub type Result<T, E = StreamError> = std::result::Result<T, E>;

/// Packet-level faults found while decoding the wire format.
///
/// Every variant is recovered inside the parser by dropping one byte and
/// rescanning for the next sync marker.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum FramingError {
    #[error("Packet truncated: needed {needed} bytes, found {found}")]
    Truncated { needed: usize, found: usize },

    #[error("Missing sync marker, found [{found_0:#04x}, {found_1:#04x}]")]
    MissingSync { found_0: u8, found_1: u8 },

    #[error("Unsupported protocol version {found:#04x}")]
    UnsupportedVersion { found: u8 },

    #[error("Declared payload length {declared} outside accepted bound (max {maximum}, multiple of 3)")]
    LengthOutOfBounds { declared: u16, maximum: u16 },

    #[error("Channel count mismatch: expected {expected}, packet declares {found}")]
    ChannelCountMismatch { expected: usize, found: usize },

    #[error("Checksum mismatch: expected {expected:#04x}, computed {computed:#04x}")]
    ChecksumMismatch { expected: u8, computed: u8 },

    #[error("Invalid trailer [{found_0:#04x}, {found_1:#04x}]")]
    InvalidTrailer { found_0: u8, found_1: u8 },
}

/// Main error type for stream operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum StreamError {
    #[error("Failed to bind {addr}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to connect to {endpoint}")]
    Connect {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Socket read failed")]
    Read {
        #[source]
        source: std::io::Error,
    },

    #[error("Socket write failed")]
    Write {
        #[source]
        source: std::io::Error,
    },

    #[error("Framing error: {0}")]
    Framing(#[from] FramingError),

    #[error("Malformed replay row at line {line}: {details}")]
    Source { line: usize, details: String },

    #[error("Replay source exhausted after {rows} rows")]
    EndOfReplay { rows: usize },

    #[error("File error: {path}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error in {context}: {details}")]
    Parse { context: String, details: String },

    #[error("Invalid configuration: {details}")]
    Config { details: String },

    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("Cannot {operation} while {state}")]
    InvalidState { operation: String, state: String },
}

impl StreamError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            StreamError::Connect { .. } => true,
            StreamError::Read { .. } => true,
            StreamError::Write { .. } => true,
            StreamError::Timeout { .. } => true,
            StreamError::Framing(_) => true,
            StreamError::Source { .. } => true,
            StreamError::Bind { .. } => false,
            StreamError::EndOfReplay { .. } => false,
            StreamError::File { .. } => false,
            StreamError::Parse { .. } => false,
            StreamError::Config { .. } => false,
            StreamError::InvalidState { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            StreamError::Bind { .. } => vec![
                "Check that no other generator is listening on the port",
                "Choose a different port in the configuration",
                "Verify the host address belongs to this machine",
            ],
            StreamError::Connect { .. } => vec![
                "Ensure the generator is running and listening",
                "Check host and port in the receiver configuration",
                "Check firewall rules on both machines",
            ],
            StreamError::Read { .. } | StreamError::Write { .. } => vec![
                "Check that the peer is still running",
                "Verify network connectivity",
            ],
            StreamError::Framing(_) => vec![
                "Verify both sides use the same protocol version",
                "Verify both sides use the same channel count",
            ],
            StreamError::Source { .. } => vec![
                "Check the replay table for missing or non-numeric cells",
                "Ensure every row has at least one value per channel",
            ],
            StreamError::EndOfReplay { .. } => vec![
                "Use the cycle end policy to loop the replay table",
                "Restart the generator to replay from the beginning",
            ],
            StreamError::File { .. } => vec![
                "Check file exists and is readable",
                "Check file permissions",
            ],
            StreamError::Parse { .. } => vec![
                "Check the configuration document syntax",
                "Compare field names against the documented defaults",
            ],
            StreamError::Config { .. } => vec![
                "Correct the reported parameter",
                "Fall back to the default configuration",
            ],
            StreamError::Timeout { .. } => vec![
                "Increase timeout duration",
                "Check that the peer is consuming data",
            ],
            StreamError::InvalidState { .. } => vec![
                "Stop or disconnect before starting a new session",
            ],
        }
    }

    /// Helper constructor for file errors with path context.
    pub fn file_error(path: PathBuf, source: std::io::Error) -> Self {
        StreamError::File { path, source }
    }

    /// Helper constructor for bind errors.
    pub fn bind_failed(addr: impl Into<String>, source: std::io::Error) -> Self {
        StreamError::Bind { addr: addr.into(), source }
    }

    /// Helper constructor for connect errors.
    pub fn connect_failed(endpoint: impl Into<String>, source: std::io::Error) -> Self {
        StreamError::Connect { endpoint: endpoint.into(), source }
    }

    /// Helper constructor for configuration errors.
    pub fn config(details: impl Into<String>) -> Self {
        StreamError::Config { details: details.into() }
    }

    /// Helper constructor for malformed replay rows.
    pub fn source_row(line: usize, details: impl Into<String>) -> Self {
        StreamError::Source { line, details: details.into() }
    }

    /// Helper constructor for state machine misuse.
    pub fn invalid_state(operation: impl Into<String>, state: impl Into<String>) -> Self {
        StreamError::InvalidState { operation: operation.into(), state: state.into() }
    }
}
