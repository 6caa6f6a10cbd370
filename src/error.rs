//! Error types for capture replay.
//!
//! Every fallible operation in the crate returns [`ReplayError`]. The variants
//! follow the life of a replay run:
//!
//! - **Trace Errors**: the capture cannot be opened, or a record inside it is malformed
//! - **Transport Errors**: the destination cannot be resolved or a datagram cannot be sent
//! - **Configuration Errors**: a configuration value or file is invalid
//!
//! ## Fatal vs. recoverable
//!
//! All variants abort a run under the default policies. [`ReplayError::is_fatal`]
//! reports whether a hardened caller may skip the failure and keep going:
//!
//! ```rust
//! use pcap2sflow::ReplayError;
//!
//! let error = ReplayError::send_failed("127.0.0.1:6343", "connection refused");
//! if !error.is_fatal() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```
//!
//! ## Helper Constructors
//!
//! ```rust
//! use pcap2sflow::ReplayError;
//! use std::path::PathBuf;
//!
//! let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
//! let open_error = ReplayError::trace_open_io(PathBuf::from("/tmp/trace.pcap"), io_err);
//! let corrupt_error = ReplayError::trace_corrupt(3, "record body truncated");
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for replay operations.
pub type Result<T, E = ReplayError> = std::result::Result<T, E>;

/// Main error type for replay operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ReplayError {
    #[error("Cannot open trace {path}: {reason}")]
    TraceOpen {
        path: PathBuf,
        reason: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Corrupt trace record at frame {frame_index}: {details}")]
    TraceCorrupt { frame_index: u64, details: String },

    #[error("Failed to send sFlow datagram to {destination}: {reason}")]
    Send {
        destination: String,
        reason: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Cannot resolve destination '{target}'")]
    Resolve {
        target: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Invalid configuration for '{field}': {details}")]
    Config { field: String, details: String },

    #[error(
        "Flow sample {sample_sequence} encodes to {encoded_len} bytes, above the {max_datagram_size} byte datagram ceiling"
    )]
    OversizeSample { sample_sequence: u32, encoded_len: usize, max_datagram_size: usize },
}

impl ReplayError {
    /// Returns whether this error must end the replay run.
    ///
    /// Only send failures are non-fatal: sFlow tolerates datagram loss, so a
    /// caller running with [`SendErrorPolicy::Skip`](crate::SendErrorPolicy)
    /// may drop the datagram and continue.
    pub fn is_fatal(&self) -> bool {
        match self {
            ReplayError::TraceOpen { .. } => true,
            ReplayError::TraceCorrupt { .. } => true,
            ReplayError::Send { .. } => false,
            ReplayError::Resolve { .. } => true,
            ReplayError::Config { .. } => true,
            ReplayError::OversizeSample { .. } => true,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            ReplayError::TraceOpen { .. } => vec![
                "Check the trace file exists and is readable",
                "Verify the file is a classic libpcap capture (not pcapng)",
                "Check the capture link type is Ethernet, raw IP, PPP or 802.11",
            ],
            ReplayError::TraceCorrupt { .. } => vec![
                "Verify the capture was not truncated while copying",
                "Re-save the capture with a packet analyzer to repair record headers",
            ],
            ReplayError::Send { .. } => vec![
                "Check the collector host and port",
                "Verify a route to the collector exists",
                "Lower the maximum datagram size or set a capture length limit",
            ],
            ReplayError::Resolve { .. } => vec![
                "Use the host:port form, e.g. 127.0.0.1:6343",
                "Check DNS resolution for the collector host",
            ],
            ReplayError::Config { .. } => vec![
                "Check the configuration value ranges",
                "Verify the YAML configuration file syntax",
            ],
            ReplayError::OversizeSample { .. } => vec![
                "Raise the maximum datagram size",
                "Set a capture length limit to truncate large frames",
                "Switch the oversize policy to emit-alone",
            ],
        }
    }

    /// Helper constructor for trace open failures caused by I/O.
    pub fn trace_open_io(path: PathBuf, source: std::io::Error) -> Self {
        ReplayError::TraceOpen { path, reason: source.to_string(), source: Some(source) }
    }

    /// Helper constructor for trace open failures caused by the file contents.
    pub fn trace_open(path: PathBuf, reason: impl Into<String>) -> Self {
        ReplayError::TraceOpen { path, reason: reason.into(), source: None }
    }

    /// Helper constructor for malformed frame records.
    pub fn trace_corrupt(frame_index: u64, details: impl Into<String>) -> Self {
        ReplayError::TraceCorrupt { frame_index, details: details.into() }
    }

    /// Helper constructor for send failures without an underlying socket error.
    pub fn send_failed(destination: impl Into<String>, reason: impl Into<String>) -> Self {
        ReplayError::Send { destination: destination.into(), reason: reason.into(), source: None }
    }

    /// Helper constructor for socket-level send failures.
    pub fn send_io(destination: impl Into<String>, source: std::io::Error) -> Self {
        ReplayError::Send {
            destination: destination.into(),
            reason: source.to_string(),
            source: Some(source),
        }
    }

    /// Helper constructor for configuration errors.
    pub fn config(field: impl Into<String>, details: impl Into<String>) -> Self {
        ReplayError::Config { field: field.into(), details: details.into() }
    }
}
