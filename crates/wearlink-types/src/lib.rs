//! Platform-agnostic types for wearlink wearable sensor bridging.
//!
//! This crate provides shared types used by the BLE heart-rate path and
//! the vendor fitness-device bridge in wearlink-core:
//!
//! - Data types for scan hits, samples, vendor devices and sync progress
//! - The pure Heart-Rate Measurement characteristic decoder
//! - UUID constants for the standard heart-rate profile
//! - Error types for payload parsing
//!
//! # Example
//!
//! ```
//! use wearlink_types::HrmMeasurement;
//!
//! let measurement = HrmMeasurement::from_bytes(&[0x00, 0x48]).unwrap();
//! assert_eq!(measurement.bpm, 72.0);
//! ```

pub mod error;
pub mod measurement;
pub mod types;
pub mod uuid;

pub use error::{ParseError, ParseResult};
pub use measurement::{HrmMeasurement, MIN_MEASUREMENT_BYTES};
pub use types::{
    AccessPoint, AccelSample, HeartRateSample, RealTimeDataType, RealTimeFrame, ScanHit,
    ScannedVendorDevice, SyncDirection, SyncProgress, VendorConnectionState, VendorDevice,
    VendorDeviceKind, SOURCE_BLE_HRM,
};
pub use uuid as uuids;
