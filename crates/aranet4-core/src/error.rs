//! Error types for aranet4-core.
//!
//! Every failure of a [`Session`](crate::Session) operation surfaces to its
//! immediate caller as one of the variants below.
//!
//! # Recovery
//!
//! | Error Type | Strategy |
//! |------------|----------|
//! | [`Error::DeviceUnreachable`] | Call `connect()` again, then retry the operation |
//! | [`Error::IncompleteHistory`] | Retry the fetch; partial data was discarded |
//! | [`Error::UnsupportedFirmware`] | Do not retry |
//! | [`Error::MalformedPayload`] | Do not retry that decode; the session stays usable |
//! | [`Error::InvalidRequest`] | Fix the request; nothing was sent to the device |
//! | [`Error::Cancelled`] | Operation was intentionally cancelled |
//! | [`Error::InvalidConfig`] | Fix configuration and restart |
//!
//! Write failures while a history command is being sent are never retried
//! automatically: re-sending a half-delivered command is not idempotent.

use std::time::Duration;

use aranet4_types::{ParseError, Sensor};
use thiserror::Error;

/// Errors that can occur when talking to an Aranet4.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Connection or transport failure. Fatal to the in-flight call; the
    /// session may `connect()` again.
    #[error("Device unreachable: {reason}")]
    DeviceUnreachable {
        /// The structured reason for the failure.
        reason: ConnectionFailureReason,
    },

    /// The firmware revision maps to no known capability profile, or the
    /// resolved profile lacks what the operation needs.
    #[error("Unsupported firmware '{revision}': {detail}")]
    UnsupportedFirmware {
        /// Revision string reported by the device.
        revision: String,
        /// What is missing or unrecognised.
        detail: String,
    },

    /// A payload did not match its byte layout.
    #[error("Malformed payload: {0}")]
    MalformedPayload(#[from] ParseError),

    /// Caller-supplied request violates a precondition. Rejected before any I/O.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// History transfer ended before all expected records arrived.
    #[error("Incomplete history for {sensor}: received {received} of {expected} records")]
    IncompleteHistory {
        /// Sensor whose pass was interrupted.
        sensor: Sensor,
        /// Records assembled before the transfer stopped.
        received: usize,
        /// Records the range called for.
        expected: usize,
    },

    /// Operation was cancelled.
    #[error("Operation cancelled")]
    Cancelled,

    /// Required BLE characteristic not found on device.
    #[error("Characteristic not found: {uuid} (searched in {service_count} services)")]
    CharacteristicNotFound {
        /// The UUID that was not found.
        uuid: String,
        /// Number of services that were searched.
        service_count: usize,
    },

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Structured reasons for [`Error::DeviceUnreachable`].
///
/// This enum is marked `#[non_exhaustive]` to allow adding new reasons
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConnectionFailureReason {
    /// Bluetooth adapter not available or powered off.
    AdapterUnavailable,
    /// No peripheral matched the address or name filter.
    DeviceNotFound {
        /// Address or name filter that was searched for.
        identifier: String,
    },
    /// Operation attempted without an open connection.
    NotConnected,
    /// A suspension point exceeded its timeout.
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout duration.
        duration: Duration,
    },
    /// The device dropped the connection.
    Disconnected,
    /// Generic BLE error.
    BleError(String),
    /// Other/unknown error.
    Other(String),
}

impl std::fmt::Display for ConnectionFailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AdapterUnavailable => write!(f, "Bluetooth adapter unavailable"),
            Self::DeviceNotFound { identifier } => write!(f, "device '{}' not found", identifier),
            Self::NotConnected => write!(f, "not connected"),
            Self::Timeout {
                operation,
                duration,
            } => write!(f, "'{}' timed out after {:?}", operation, duration),
            Self::Disconnected => write!(f, "device disconnected"),
            Self::BleError(msg) => write!(f, "BLE error: {}", msg),
            Self::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl Error {
    /// Create a [`Error::DeviceUnreachable`] with a structured reason.
    pub fn unreachable(reason: ConnectionFailureReason) -> Self {
        Self::DeviceUnreachable { reason }
    }

    /// Operation attempted without an open connection.
    pub fn not_connected() -> Self {
        Self::unreachable(ConnectionFailureReason::NotConnected)
    }

    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::unreachable(ConnectionFailureReason::Timeout {
            operation: operation.into(),
            duration,
        })
    }

    /// Create a device not found error for a specific identifier.
    pub fn device_not_found(identifier: impl Into<String>) -> Self {
        Self::unreachable(ConnectionFailureReason::DeviceNotFound {
            identifier: identifier.into(),
        })
    }

    /// Create an unsupported firmware error.
    pub fn unsupported_firmware(revision: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::UnsupportedFirmware {
            revision: revision.into(),
            detail: detail.into(),
        }
    }

    /// Create an invalid request error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Create a characteristic not found error.
    pub fn characteristic_not_found(uuid: impl Into<String>, service_count: usize) -> Self {
        Self::CharacteristicNotFound {
            uuid: uuid.into(),
            service_count,
        }
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Whether repeating the operation (after reconnecting if needed) may
    /// succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::DeviceUnreachable { .. } | Self::IncompleteHistory { .. }
        )
    }
}

impl From<btleplug::Error> for Error {
    fn from(err: btleplug::Error) -> Self {
        let reason = match err {
            btleplug::Error::NotConnected => ConnectionFailureReason::NotConnected,
            btleplug::Error::DeviceNotFound => ConnectionFailureReason::DeviceNotFound {
                identifier: String::new(),
            },
            btleplug::Error::TimedOut(duration) => ConnectionFailureReason::Timeout {
                operation: "bluetooth".to_string(),
                duration,
            },
            other => ConnectionFailureReason::BleError(other.to_string()),
        };
        Self::DeviceUnreachable { reason }
    }
}

/// Result type alias using aranet4-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
