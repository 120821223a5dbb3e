//! Error types for payload decoding in aranet4-types.

use thiserror::Error;

/// Errors that can occur when decoding Aranet4 GATT payloads.
///
/// This error type is transport-agnostic and does not include
/// BLE-specific errors (those belong in aranet4-core).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// The buffer is shorter than the layout requires.
    #[error("{what} requires {expected} bytes, got {actual}")]
    InsufficientBytes {
        /// What was being decoded.
        what: &'static str,
        /// Minimum number of bytes required.
        expected: usize,
        /// Number of bytes actually received.
        actual: usize,
    },

    /// A field held a value the layout does not allow.
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// A history selector byte did not name a known sensor.
    #[error("Unknown sensor selector: 0x{0:02X}")]
    UnknownSensor(u8),
}

impl ParseError {
    pub(crate) fn insufficient(what: &'static str, expected: usize, actual: usize) -> Self {
        Self::InsufficientBytes {
            what,
            expected,
            actual,
        }
    }
}

/// Result type alias using aranet4-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
