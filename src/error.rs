//! Error types for the acquisition bridge.
//!
//! Everything below the sweep level is recovered locally: send failures and
//! timeouts abort only the current sweep, disconnects return the session to
//! its reconnect loop, and protocol anomalies (chunk overflow, out-of-range
//! frequency indices) are logged as warnings rather than surfaced here.
//! No error in this module is ever fatal to the process.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for bridge operations.
pub type Result<T, E = BridgeError> = std::result::Result<T, E>;

/// Main error type for bridge operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum BridgeError {
    #[error("failed to open instrument link: {reason}")]
    TransportOpen {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("command send failed: {context}")]
    Send { context: String },

    #[error("chunk {chunk} did not complete within {timeout:?}")]
    ChunkTimeout { chunk: u32, timeout: Duration },

    #[error("instrument link disconnected")]
    Disconnected,

    #[error("malformed sample block: got {len} bytes, need {expected}")]
    MalformedBlock { len: usize, expected: usize },

    #[error("sweep completed but no point produced a usable minimum")]
    NoFiniteMinimum,

    #[error("invalid sweep configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("notification send failed: {reason}")]
    Notify { reason: String },
}

impl BridgeError {
    /// Returns whether this error is potentially recoverable through retry.
    ///
    /// Retryable errors leave the connection lifecycle in a state where the
    /// next trigger (or the reconnect loop) can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            BridgeError::TransportOpen { .. } => true,
            BridgeError::Send { .. } => true,
            BridgeError::ChunkTimeout { .. } => true,
            BridgeError::Disconnected => true,
            BridgeError::Notify { .. } => true,
            BridgeError::MalformedBlock { .. } => false,
            BridgeError::NoFiniteMinimum => false,
            BridgeError::InvalidConfig { .. } => false,
        }
    }

    /// Helper constructor for transport open failures.
    pub fn transport_open(reason: impl Into<String>) -> Self {
        BridgeError::TransportOpen { reason: reason.into(), source: None }
    }

    /// Helper constructor for transport open failures with a source.
    pub fn transport_open_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        BridgeError::TransportOpen { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for command send failures.
    pub fn send_failed(context: impl Into<String>) -> Self {
        BridgeError::Send { context: context.into() }
    }

    /// Helper constructor for configuration validation failures.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        BridgeError::InvalidConfig { reason: reason.into() }
    }

    /// Helper constructor for notification failures.
    pub fn notify_failed(reason: impl Into<String>) -> Self {
        BridgeError::Notify { reason: reason.into() }
    }
}
