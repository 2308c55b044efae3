//! Error types for data parsing in wearlink-types.

use thiserror::Error;

/// Errors that can occur when parsing wearable sensor payloads.
///
/// This error type is platform-agnostic and does not include
/// BLE-specific errors (those belong in wearlink-core).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// Payload is shorter than the minimum the format requires.
    #[error("insufficient payload: requires {expected} bytes, got {actual}")]
    InsufficientBytes {
        /// Minimum number of bytes required.
        expected: usize,
        /// Number of bytes actually received.
        actual: usize,
    },

    /// A field carried a value outside its valid range.
    #[error("invalid value: {0}")]
    InvalidValue(String),
}

/// Result type alias using wearlink-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
