//! Core library bridging a host application to wearable biometric
//! sensors over two independent channels:
//!
//! - the standards-based BLE heart-rate profile (scan, connect,
//!   subscribe, decode), and
//! - a proprietary vendor fitness-device SDK that may or may not be
//!   linked at runtime.
//!
//! # Features
//!
//! - **Device discovery**: deduplicated, timeout-driven scans for
//!   heart-rate monitors
//! - **Connection sessions**: explicit state machine from connect to
//!   streaming, with decoded samples on one stream
//! - **Vendor bridge**: scanning, pairing, real-time streaming and sync
//!   against a registry of paired devices, in linked or stub mode
//! - **Event routing**: one single-subscriber channel per event category
//!
//! # Quick Start
//!
//! ```no_run
//! use wearlink_core::scan::{HrScanner, ScanConfig};
//! use wearlink_core::session::HrSession;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let scanner = HrScanner::create().await?;
//!     let hits = scanner.scan(ScanConfig::default()).await?;
//!     println!("Found {} monitors", hits.len());
//!
//!     if let Some(hit) = hits.first() {
//!         let session = HrSession::new(scanner.adapter().clone());
//!         let mut samples = session.subscribe_samples();
//!         session.connect(&hit.device_id, "session-1").await?;
//!         if let Some(Ok(sample)) = samples.recv().await {
//!             println!("{} bpm", sample.bpm);
//!         }
//!         session.disconnect().await?;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Vendor SDK modes
//!
//! The vendor bridge is constructed once with an [`sdk::SdkHandle`]:
//! `probe()` yields stub mode when the proprietary SDK is not linked,
//! and every vendor operation then degrades to a safe default. Linking
//! an SDK implementation switches the same external contract to live
//! hardware.

pub mod bridge;
pub mod error;
pub mod mock;
pub mod registry;
pub mod router;
pub mod scan;
pub mod sdk;
pub mod session;
pub mod util;

// Re-export the shared types crate
pub use wearlink_types as types;

// Core exports
pub use bridge::{BridgeConfig, VendorBridge};
pub use error::{
    BluetoothUnavailableReason, ConnectFailureReason, DeviceNotFoundReason, Error, Result,
};
pub use mock::MockVendorSdk;
pub use registry::VendorDeviceRegistry;
pub use router::{ConnectionEvent, EventRouter, Outlet};
pub use scan::{HrScanner, ScanConfig};
pub use sdk::{SdkHandle, VendorCallback, VendorSdk};
pub use session::{ConnectionConfig, HrSession, SampleResult, SessionState};

// Re-export the most-used payload types
pub use wearlink_types::{
    HeartRateSample, HrmMeasurement, RealTimeDataType, RealTimeFrame, ScanHit,
    ScannedVendorDevice, SyncDirection, SyncProgress, VendorConnectionState, VendorDevice,
    VendorDeviceKind,
};

/// Type alias for a shared bridge reference.
///
/// `VendorBridge` intentionally does not implement `Clone`; wrap it in
/// `Arc` to share it across tasks.
pub type SharedBridge = std::sync::Arc<VendorBridge>;
