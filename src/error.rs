//! Error types for the serial-to-fix pipeline.
//!
//! Only session-terminal failures are represented by [`RelayError`]. Problems
//! with individual sentences (desynchronised frames, checksum mismatches,
//! malformed fields) never surface as errors to the caller; they are absorbed
//! by the pipeline and counted in [`PipelineStats`](crate::PipelineStats).
//!
//! ## Error Categories
//!
//! - **Transport Errors**: the handle could not be opened, configured or read
//! - **Configuration Errors**: invalid or unreadable [`RelayConfig`](crate::RelayConfig)
//! - **Supervision Errors**: single-session policy and consent gate refusals
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use gpsrelay::RelayError;
//!
//! let error = RelayError::transport_read("ttyACM0", "device reported EIO");
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for relay operations.
pub type Result<T, E = RelayError> = std::result::Result<T, E>;

/// Boxed error source carried by transport failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for session and supervisor operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RelayError {
    #[error("Failed to open transport {transport}: {reason}")]
    TransportOpen {
        transport: String,
        reason: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Read failed on transport {transport}: {reason}")]
    TransportRead {
        transport: String,
        reason: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    #[error("Configuration file error: {path}")]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error in {context}: {details}")]
    Parse { context: String, details: String },

    #[error("A device session is already active (session {session_id})")]
    SessionActive { session_id: u64 },

    #[error("Synthetic location input has not been permitted")]
    ConsentDenied,

    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("Session task failed: {reason}")]
    SessionTask { reason: String },

    #[error("Relay has been shut down")]
    Shutdown,
}

impl RelayError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            RelayError::TransportRead { .. } => true,
            RelayError::Timeout { .. } => true,
            RelayError::SessionActive { .. } => true,
            RelayError::TransportOpen { .. } => false,
            RelayError::Config { .. } => false,
            RelayError::ConfigFile { .. } => false,
            RelayError::Parse { .. } => false,
            RelayError::ConsentDenied => false,
            RelayError::SessionTask { .. } => false,
            RelayError::Shutdown => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            RelayError::TransportOpen { .. } => vec![
                "Check the receiver is plugged in and powered",
                "Verify permission to open the serial device",
                "Confirm the baud rate and framing match the receiver",
            ],
            RelayError::TransportRead { .. } => vec![
                "Check the USB cable and connector",
                "Reattach the receiver to start a new session",
                "Increase the restart policy failure limit",
            ],
            RelayError::Config { .. } => vec![
                "Check configuration values against their documented ranges",
                "Remove the offending key to fall back to the default",
            ],
            RelayError::ConfigFile { .. } => vec![
                "Check the configuration file exists and is readable",
                "Check file permissions",
            ],
            RelayError::Parse { .. } => vec![
                "Check the configuration is valid YAML",
                "Verify field names and value types",
            ],
            RelayError::SessionActive { .. } => vec![
                "Detach the active receiver before attaching another",
                "Wait for the active session to terminate",
            ],
            RelayError::ConsentDenied => vec![
                "Enable synthetic location input in the platform settings",
                "Attach the receiver again once consent is granted",
            ],
            RelayError::Timeout { .. } => vec![
                "Increase timeout duration",
                "Verify the receiver is streaming sentences",
            ],
            RelayError::SessionTask { .. } => vec![
                "Inspect logs for a panic inside the session task",
                "Reattach the receiver to start a new session",
            ],
            RelayError::Shutdown => vec!["Create a new relay to accept devices again"],
        }
    }

    /// Helper constructor for open/configure failures.
    pub fn transport_open(transport: impl Into<String>, reason: impl Into<String>) -> Self {
        RelayError::TransportOpen { transport: transport.into(), reason: reason.into(), source: None }
    }

    /// Helper constructor for open/configure failures with source.
    pub fn transport_open_with_source(
        transport: impl Into<String>,
        reason: impl Into<String>,
        source: BoxError,
    ) -> Self {
        RelayError::TransportOpen {
            transport: transport.into(),
            reason: reason.into(),
            source: Some(source),
        }
    }

    /// Helper constructor for read failures.
    pub fn transport_read(transport: impl Into<String>, reason: impl Into<String>) -> Self {
        RelayError::TransportRead { transport: transport.into(), reason: reason.into(), source: None }
    }

    /// Helper constructor for read failures with source.
    pub fn transport_read_with_source(
        transport: impl Into<String>,
        reason: impl Into<String>,
        source: BoxError,
    ) -> Self {
        RelayError::TransportRead {
            transport: transport.into(),
            reason: reason.into(),
            source: Some(source),
        }
    }

    /// Helper constructor for configuration validation errors.
    pub fn config(reason: impl Into<String>) -> Self {
        RelayError::Config { reason: reason.into() }
    }

    /// Helper constructor for configuration file errors with path context.
    pub fn config_file(path: PathBuf, source: std::io::Error) -> Self {
        RelayError::ConfigFile { path, source }
    }

    /// Whether this error ends a session before it ever streamed.
    pub fn is_open_failure(&self) -> bool {
        matches!(self, RelayError::TransportOpen { .. })
    }
}

impl From<serde_yaml_ng::Error> for RelayError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        RelayError::Parse { context: "relay configuration".to_string(), details: err.to_string() }
    }
}
