//! Vendor SDK capability boundary.
//!
//! The proprietary fitness SDK may or may not be linked into a build.
//! This module abstracts it behind the [`VendorSdk`] trait and selects
//! between a linked implementation and stub behavior once, at bridge
//! construction, via [`SdkHandle`]. The rest of the crate never probes
//! for the SDK again.
//!
//! The SDK's callback-heavy listener interfaces are collapsed into one
//! inbound channel of tagged [`VendorCallback`] variants; the bridge
//! consumes that channel on a single serialized delivery task so callers
//! observe events in the order the vendor stack produced them.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::router::ConnectionEvent;
use wearlink_types::{
    AccessPoint, RealTimeDataType, RealTimeFrame, ScannedVendorDevice, SyncProgress,
    VendorConnectionState, VendorDevice, VendorDeviceKind,
};

/// A tagged event pushed by the vendor stack.
///
/// Each vendor callback type maps to one variant constructor.
#[derive(Debug, Clone)]
pub enum VendorCallback {
    /// A device connected, disconnected, or failed to connect.
    Connection(ConnectionEvent),
    /// One or more devices were reported by an active scan.
    Scanned(Vec<ScannedVendorDevice>),
    /// An active scan failed.
    ScanFailed {
        /// Vendor-specific error code, if any.
        code: Option<i32>,
    },
    /// A real-time sample arrived for the streaming device.
    RealTime(RealTimeFrame),
    /// Sync progressed or completed.
    SyncProgress(SyncProgress),
}

/// Sender half of the vendor callback channel.
pub type CallbackSender = mpsc::UnboundedSender<VendorCallback>;

/// Receiver half of the vendor callback channel.
pub type CallbackReceiver = mpsc::UnboundedReceiver<VendorCallback>;

/// Create the inbound callback channel a bridge consumes.
pub fn callback_channel() -> (CallbackSender, CallbackReceiver) {
    mpsc::unbounded_channel()
}

/// Operations the proprietary vendor SDK provides.
///
/// Implementations wrap the real SDK; [`crate::mock::MockVendorSdk`]
/// implements it for tests. Addresses passed here are the transient
/// radio addresses resolved by the registry, never unit ids.
///
/// Asynchronous results (scan hits, connection changes, real-time data,
/// sync progress) are delivered through the [`CallbackSender`] attached
/// with [`VendorSdk::attach_listener`], from whatever thread the vendor
/// stack chooses.
#[async_trait]
pub trait VendorSdk: Send + Sync {
    /// Attach the callback channel. Called once by the bridge.
    fn attach_listener(&self, sender: CallbackSender);

    /// Detach from the vendor stack's listener registries.
    fn detach(&self);

    /// Initialize the SDK with a license key.
    ///
    /// Returns `Ok(true)` on success, `Ok(false)` when the vendor
    /// rejected the license.
    async fn initialize(&self, license_key: &str) -> Result<bool>;

    /// Start scanning for nearby devices of the given kinds.
    ///
    /// An empty kind slice scans for everything.
    async fn start_scanning(&self, kinds: &[VendorDeviceKind], timeout: Duration) -> Result<()>;

    /// Stop an active scan. Must be a no-op when no scan is running.
    async fn stop_scanning(&self) -> Result<()>;

    /// Pair a device seen during the current scan session.
    async fn pair_device(&self, identifier: &str) -> Result<VendorDevice>;

    /// Remove a paired device, optionally deleting its on-device data.
    async fn forget_device(&self, address: &str, delete_data: bool) -> Result<()>;

    /// List currently paired devices.
    async fn paired_devices(&self) -> Result<Vec<VendorDevice>>;

    /// Query the connection state of a paired device.
    async fn connection_state(&self, address: &str) -> Result<VendorConnectionState>;

    /// Query the battery level of a paired device, if reachable.
    async fn battery_level(&self, address: &str) -> Result<Option<u8>>;

    /// Request a data sync. Progress arrives on the callback channel.
    async fn request_sync(&self, address: &str) -> Result<()>;

    /// Enable real-time streaming of the given data types.
    async fn enable_real_time(
        &self,
        address: &str,
        types: &[RealTimeDataType],
    ) -> Result<()>;

    /// Disable real-time streaming of the given data types.
    async fn disable_real_time(
        &self,
        address: &str,
        types: &[RealTimeDataType],
    ) -> Result<()>;

    /// Scan for WiFi access points visible to the device.
    async fn scan_access_points(&self, address: &str) -> Result<Vec<AccessPoint>>;

    /// Store WiFi credentials on the device.
    async fn store_access_point(&self, address: &str, ssid: &str, password: &str) -> Result<()>;
}

/// Handle to the vendor SDK, fixed at bridge construction.
///
/// `Linked` carries a live SDK implementation; `Stub` means the SDK is
/// absent and every vendor operation degrades to a safe default without
/// starting any background work.
#[derive(Clone)]
pub enum SdkHandle {
    /// The vendor SDK is linked and usable.
    Linked(Arc<dyn VendorSdk>),
    /// The vendor SDK is absent.
    Stub,
}

impl SdkHandle {
    /// Probe the build for a linked vendor SDK.
    ///
    /// The open-source build carries no vendor SDK, so this returns
    /// `Stub`; deployments that link the SDK construct the bridge with
    /// [`SdkHandle::linked`] instead.
    pub fn probe() -> Self {
        SdkHandle::Stub
    }

    /// Wrap a linked SDK implementation.
    pub fn linked(sdk: Arc<dyn VendorSdk>) -> Self {
        SdkHandle::Linked(sdk)
    }

    /// Whether a linked SDK is present.
    pub fn is_available(&self) -> bool {
        matches!(self, SdkHandle::Linked(_))
    }

    /// Borrow the linked SDK, if present.
    pub fn sdk(&self) -> Option<&Arc<dyn VendorSdk>> {
        match self {
            SdkHandle::Linked(sdk) => Some(sdk),
            SdkHandle::Stub => None,
        }
    }
}

impl std::fmt::Debug for SdkHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SdkHandle::Linked(_) => f.write_str("SdkHandle::Linked"),
            SdkHandle::Stub => f.write_str("SdkHandle::Stub"),
        }
    }
}
