//! Error types for wearlink-core.
//!
//! This module defines all errors that can occur on the BLE heart-rate
//! path and the vendor bridge.
//!
//! # Propagation policy
//!
//! Validation errors (missing or invalid arguments, SDK not initialized)
//! are surfaced synchronously from the triggering request. Failures that
//! occur after a request has already succeeded (most importantly a
//! connection that later drops) are never retried by this crate: they
//! are reported once on the relevant event channel and the affected
//! session or stream is torn down.
//!
//! In stub mode (vendor SDK absent) read-only queries degrade to empty
//! results instead of failing; only operations that require live vendor
//! hardware surface [`Error::SdkNotAvailable`] or
//! [`Error::NotInitialized`].

use std::time::Duration;

use thiserror::Error;

use wearlink_types::ParseError;

/// Errors that can occur when bridging wearable sensors.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error
/// variants in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Bluetooth Low Energy error from the underlying stack.
    #[error("Bluetooth error: {0}")]
    Bluetooth(btleplug::Error),

    /// The local radio is absent or powered off.
    #[error("Bluetooth unavailable: {0}")]
    BluetoothUnavailable(BluetoothUnavailableReason),

    /// Bluetooth authorization was refused.
    #[error("Bluetooth permission denied")]
    PermissionDenied,

    /// Device not found during scan, connection, or pairing.
    #[error("Device not found: {0}")]
    DeviceNotFound(DeviceNotFoundReason),

    /// Connection attempt failed.
    #[error("Connection failed: {reason}")]
    ConnectFailed {
        /// The device identifier that failed to connect, if known.
        device_id: Option<String>,
        /// The structured reason for the failure.
        reason: ConnectFailureReason,
    },

    /// Notification subscription failed after connecting.
    #[error("Subscribe failed for characteristic {uuid}: {reason}")]
    SubscribeFailed {
        /// The characteristic UUID.
        uuid: String,
        /// The reason for the failure.
        reason: String,
    },

    /// The peer closed the link or the radio dropped mid-stream.
    ///
    /// Delivered on the sample channel, not returned from a request.
    #[error("Device disconnected: {device_id}")]
    DeviceDisconnected {
        /// Identifier of the device that dropped.
        device_id: String,
    },

    /// A request was missing a required argument or carried an invalid one.
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// The vendor SDK is not linked into this build.
    #[error("Vendor SDK is not available")]
    SdkNotAvailable,

    /// A vendor operation was attempted before a successful initialize.
    #[error("Vendor SDK not initialized")]
    NotInitialized,

    /// A second initialize was issued while one is still in flight.
    #[error("SDK initialization already in progress")]
    InitializationPending,

    /// A heart-rate payload violated the decoder's length precondition.
    ///
    /// Should not occur on conformant hardware; treated as a contract
    /// failure, not a recoverable user-facing error.
    #[error("Malformed heart-rate payload: {0}")]
    MalformedPayload(#[from] ParseError),

    /// Operation timed out.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout duration.
        duration: Duration,
    },

    /// Operation was cancelled.
    #[error("Operation cancelled")]
    Cancelled,
}

/// Structured reasons for connection failures.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new reasons
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConnectFailureReason {
    /// A connect attempt is already outstanding on this session.
    AttemptInProgress,
    /// The link dropped before streaming was established.
    DroppedDuringSetup,
    /// Connection attempt timed out.
    Timeout,
    /// The required service or characteristic was not found on the device.
    ProfileMissing,
    /// Generic BLE error.
    BleError(String),
    /// Other/unknown error.
    Other(String),
}

impl std::fmt::Display for ConnectFailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AttemptInProgress => write!(f, "a connect attempt is already in progress"),
            Self::DroppedDuringSetup => write!(f, "link dropped during connection setup"),
            Self::Timeout => write!(f, "connection timed out"),
            Self::ProfileMissing => write!(f, "heart-rate profile not found on device"),
            Self::BleError(msg) => write!(f, "BLE error: {}", msg),
            Self::Other(msg) => write!(f, "{}", msg),
        }
    }
}

/// Reason why the local Bluetooth radio is unavailable.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum BluetoothUnavailableReason {
    /// No Bluetooth adapter present on the host.
    NoAdapter,
    /// The adapter is present but powered off.
    PoweredOff,
}

impl std::fmt::Display for BluetoothUnavailableReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoAdapter => write!(f, "no Bluetooth adapter available"),
            Self::PoweredOff => write!(f, "Bluetooth is turned off"),
        }
    }
}

/// Reason why a device was not found.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum DeviceNotFoundReason {
    /// Device with the given identifier is not known to the system.
    NotFound {
        /// The identifier that was looked up.
        identifier: String,
    },
    /// The identifier was not observed during the current scan session.
    NotScanned {
        /// The identifier that was looked up.
        identifier: String,
    },
}

impl std::fmt::Display for DeviceNotFoundReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { identifier } => write!(f, "device '{}' not found", identifier),
            Self::NotScanned { identifier } => {
                write!(f, "device '{}' was not seen in the current scan", identifier)
            }
        }
    }
}

impl Error {
    /// Create a device-not-found error for a specific identifier.
    pub fn device_not_found(identifier: impl Into<String>) -> Self {
        Self::DeviceNotFound(DeviceNotFoundReason::NotFound {
            identifier: identifier.into(),
        })
    }

    /// Create a not-scanned error for a pairing identifier.
    pub fn device_not_scanned(identifier: impl Into<String>) -> Self {
        Self::DeviceNotFound(DeviceNotFoundReason::NotScanned {
            identifier: identifier.into(),
        })
    }

    /// Create a connect failure with a structured reason.
    pub fn connect_failed(device_id: Option<String>, reason: ConnectFailureReason) -> Self {
        Self::ConnectFailed { device_id, reason }
    }

    /// Create a subscribe failure.
    pub fn subscribe_failed(uuid: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SubscribeFailed {
            uuid: uuid.into(),
            reason: reason.into(),
        }
    }

    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create an invalid-arguments error.
    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::InvalidArguments(message.into())
    }
}

impl From<btleplug::Error> for Error {
    fn from(err: btleplug::Error) -> Self {
        match err {
            btleplug::Error::PermissionDenied => Error::PermissionDenied,
            other => Error::Bluetooth(other),
        }
    }
}

/// Result type alias using wearlink-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
