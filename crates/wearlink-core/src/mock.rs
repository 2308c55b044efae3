//! Mock vendor SDK implementation for testing.
//!
//! This module provides a mock that can stand in for the proprietary
//! vendor SDK without requiring the real dependency or hardware.
//!
//! # Features
//!
//! - **Failure injection**: fail initialization, pairing, or listing
//! - **Latency simulation**: add artificial delays to async operations
//! - **Scripted results**: preset scan results, paired devices, battery
//!   levels and access points
//! - **Callback injection**: push [`VendorCallback`] events through the
//!   attached listener as if the vendor stack produced them

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::sdk::{CallbackSender, VendorCallback, VendorSdk};
use wearlink_types::{
    AccessPoint, RealTimeDataType, ScannedVendorDevice, VendorConnectionState, VendorDevice,
    VendorDeviceKind,
};

/// A mock vendor SDK for testing.
///
/// Implements [`VendorSdk`] so a bridge constructed with
/// `SdkHandle::linked(Arc::new(MockVendorSdk::new()))` exercises the
/// full linked-mode code path.
pub struct MockVendorSdk {
    listener: Mutex<Option<CallbackSender>>,
    initialized: AtomicBool,
    /// Simulated latency for initialize and pairing, in milliseconds.
    init_latency_ms: AtomicU64,
    pair_latency_ms: AtomicU64,
    fail_initialize: AtomicBool,
    reject_license: AtomicBool,
    fail_pairing: AtomicBool,
    fail_listing: AtomicBool,
    next_unit_id: AtomicU64,
    paired: RwLock<Vec<VendorDevice>>,
    scan_results: RwLock<Vec<ScannedVendorDevice>>,
    battery: RwLock<HashMap<String, u8>>,
    access_points: RwLock<Vec<AccessPoint>>,
    stored_access_points: RwLock<Vec<(String, String, String)>>,
    scan_count: AtomicU32,
    stop_scan_count: AtomicU32,
    sync_requests: RwLock<Vec<String>>,
    enabled_streams: RwLock<Vec<(String, Vec<RealTimeDataType>)>>,
    disabled_streams: RwLock<Vec<(String, Vec<RealTimeDataType>)>>,
    detached: AtomicBool,
}

impl std::fmt::Debug for MockVendorSdk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockVendorSdk")
            .field("initialized", &self.initialized.load(Ordering::Relaxed))
            .field("scan_count", &self.scan_count.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Default for MockVendorSdk {
    fn default() -> Self {
        Self::new()
    }
}

impl MockVendorSdk {
    /// Create a mock with no scripted state.
    pub fn new() -> Self {
        Self {
            listener: Mutex::new(None),
            initialized: AtomicBool::new(false),
            init_latency_ms: AtomicU64::new(0),
            pair_latency_ms: AtomicU64::new(0),
            fail_initialize: AtomicBool::new(false),
            reject_license: AtomicBool::new(false),
            fail_pairing: AtomicBool::new(false),
            fail_listing: AtomicBool::new(false),
            // Random base so unit ids from different mocks don't collide
            next_unit_id: AtomicU64::new(1000 + u64::from(rand::random::<u16>())),
            paired: RwLock::new(Vec::new()),
            scan_results: RwLock::new(Vec::new()),
            battery: RwLock::new(HashMap::new()),
            access_points: RwLock::new(Vec::new()),
            stored_access_points: RwLock::new(Vec::new()),
            scan_count: AtomicU32::new(0),
            stop_scan_count: AtomicU32::new(0),
            sync_requests: RwLock::new(Vec::new()),
            enabled_streams: RwLock::new(Vec::new()),
            disabled_streams: RwLock::new(Vec::new()),
            detached: AtomicBool::new(false),
        }
    }

    /// Script the devices reported by the next scan.
    pub fn set_scan_results(&self, devices: Vec<ScannedVendorDevice>) {
        *self.scan_results.write().expect("mock lock poisoned") = devices;
    }

    /// Script the paired-device list.
    pub fn set_paired_devices(&self, devices: Vec<VendorDevice>) {
        *self.paired.write().expect("mock lock poisoned") = devices;
    }

    /// Script a battery level for an address.
    pub fn set_battery_level(&self, address: &str, level: u8) {
        self.battery
            .write()
            .expect("mock lock poisoned")
            .insert(address.to_string(), level);
    }

    /// Script the access points visible to any device.
    pub fn set_access_points(&self, points: Vec<AccessPoint>) {
        *self.access_points.write().expect("mock lock poisoned") = points;
    }

    /// Make `initialize` return an error.
    pub fn fail_initialize(&self, fail: bool) {
        self.fail_initialize.store(fail, Ordering::Relaxed);
    }

    /// Make `initialize` report a rejected license (`Ok(false)`).
    pub fn reject_license(&self, reject: bool) {
        self.reject_license.store(reject, Ordering::Relaxed);
    }

    /// Make `pair_device` fail.
    pub fn fail_pairing(&self, fail: bool) {
        self.fail_pairing.store(fail, Ordering::Relaxed);
    }

    /// Make `paired_devices` fail.
    pub fn fail_listing(&self, fail: bool) {
        self.fail_listing.store(fail, Ordering::Relaxed);
    }

    /// Add artificial latency to `initialize`.
    pub fn set_init_latency(&self, latency: Duration) {
        self.init_latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Add artificial latency to `pair_device`.
    pub fn set_pair_latency(&self, latency: Duration) {
        self.pair_latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Push a callback through the attached listener, as the vendor
    /// stack would from one of its threads.
    pub fn emit(&self, callback: VendorCallback) -> bool {
        self.listener
            .lock()
            .expect("mock lock poisoned")
            .as_ref()
            .is_some_and(|tx| tx.send(callback).is_ok())
    }

    /// Number of times scanning was started.
    pub fn scan_count(&self) -> u32 {
        self.scan_count.load(Ordering::Relaxed)
    }

    /// Number of times scanning was stopped.
    pub fn stop_scan_count(&self) -> u32 {
        self.stop_scan_count.load(Ordering::Relaxed)
    }

    /// Addresses sync was requested for.
    pub fn sync_requests(&self) -> Vec<String> {
        self.sync_requests
            .read()
            .expect("mock lock poisoned")
            .clone()
    }

    /// Streams enabled so far, in call order.
    pub fn enabled_streams(&self) -> Vec<(String, Vec<RealTimeDataType>)> {
        self.enabled_streams
            .read()
            .expect("mock lock poisoned")
            .clone()
    }

    /// Streams disabled so far, in call order.
    pub fn disabled_streams(&self) -> Vec<(String, Vec<RealTimeDataType>)> {
        self.disabled_streams
            .read()
            .expect("mock lock poisoned")
            .clone()
    }

    /// Credentials stored via `store_access_point`.
    pub fn stored_access_points(&self) -> Vec<(String, String, String)> {
        self.stored_access_points
            .read()
            .expect("mock lock poisoned")
            .clone()
    }

    /// Whether `detach` was called.
    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Relaxed)
    }

    fn mock_error(what: &str) -> Error {
        Error::Bluetooth(btleplug::Error::RuntimeError(format!(
            "mock {} failure",
            what
        )))
    }
}

#[async_trait]
impl VendorSdk for MockVendorSdk {
    fn attach_listener(&self, sender: CallbackSender) {
        *self.listener.lock().expect("mock lock poisoned") = Some(sender);
    }

    fn detach(&self) {
        self.detached.store(true, Ordering::Relaxed);
        self.listener.lock().expect("mock lock poisoned").take();
    }

    async fn initialize(&self, _license_key: &str) -> Result<bool> {
        let latency = self.init_latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.fail_initialize.load(Ordering::Relaxed) {
            return Err(Self::mock_error("initialize"));
        }
        if self.reject_license.load(Ordering::Relaxed) {
            return Ok(false);
        }
        self.initialized.store(true, Ordering::Relaxed);
        Ok(true)
    }

    async fn start_scanning(
        &self,
        _kinds: &[VendorDeviceKind],
        _timeout: Duration,
    ) -> Result<()> {
        self.scan_count.fetch_add(1, Ordering::Relaxed);
        let results = self.scan_results.read().expect("mock lock poisoned").clone();
        if !results.is_empty() {
            self.emit(VendorCallback::Scanned(results));
        }
        Ok(())
    }

    async fn stop_scanning(&self) -> Result<()> {
        self.stop_scan_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn pair_device(&self, identifier: &str) -> Result<VendorDevice> {
        let latency = self.pair_latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.fail_pairing.load(Ordering::Relaxed) {
            return Err(Self::mock_error("pairing"));
        }

        let scanned = self
            .scan_results
            .read()
            .expect("mock lock poisoned")
            .iter()
            .find(|d| d.identifier == identifier)
            .cloned()
            .ok_or_else(|| Error::device_not_scanned(identifier))?;

        let device = VendorDevice {
            unit_id: self.next_unit_id.fetch_add(1, Ordering::Relaxed),
            address: Some(scanned.identifier.clone()),
            name: scanned.name.clone(),
            kind: scanned.kind,
            connection_state: VendorConnectionState::Connected,
            firmware_version: None,
        };
        self.paired
            .write()
            .expect("mock lock poisoned")
            .push(device.clone());
        Ok(device)
    }

    async fn forget_device(&self, address: &str, _delete_data: bool) -> Result<()> {
        self.paired
            .write()
            .expect("mock lock poisoned")
            .retain(|d| d.address.as_deref() != Some(address));
        Ok(())
    }

    async fn paired_devices(&self) -> Result<Vec<VendorDevice>> {
        if self.fail_listing.load(Ordering::Relaxed) {
            return Err(Self::mock_error("listing"));
        }
        Ok(self.paired.read().expect("mock lock poisoned").clone())
    }

    async fn connection_state(&self, address: &str) -> Result<VendorConnectionState> {
        Ok(self
            .paired
            .read()
            .expect("mock lock poisoned")
            .iter()
            .find(|d| d.address.as_deref() == Some(address))
            .map(|d| d.connection_state)
            .unwrap_or_default())
    }

    async fn battery_level(&self, address: &str) -> Result<Option<u8>> {
        Ok(self
            .battery
            .read()
            .expect("mock lock poisoned")
            .get(address)
            .copied())
    }

    async fn request_sync(&self, address: &str) -> Result<()> {
        self.sync_requests
            .write()
            .expect("mock lock poisoned")
            .push(address.to_string());
        Ok(())
    }

    async fn enable_real_time(
        &self,
        address: &str,
        types: &[RealTimeDataType],
    ) -> Result<()> {
        self.enabled_streams
            .write()
            .expect("mock lock poisoned")
            .push((address.to_string(), types.to_vec()));
        Ok(())
    }

    async fn disable_real_time(
        &self,
        address: &str,
        types: &[RealTimeDataType],
    ) -> Result<()> {
        self.disabled_streams
            .write()
            .expect("mock lock poisoned")
            .push((address.to_string(), types.to_vec()));
        Ok(())
    }

    async fn scan_access_points(&self, _address: &str) -> Result<Vec<AccessPoint>> {
        Ok(self.access_points.read().expect("mock lock poisoned").clone())
    }

    async fn store_access_point(&self, address: &str, ssid: &str, password: &str) -> Result<()> {
        self.stored_access_points
            .write()
            .expect("mock lock poisoned")
            .push((address.to_string(), ssid.to_string(), password.to_string()));
        Ok(())
    }
}
