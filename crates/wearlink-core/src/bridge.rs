//! Vendor fitness-device bridge.
//!
//! The bridge orchestrates vendor scanning, pairing, streaming and sync
//! against the [`VendorDeviceRegistry`] and pushes all asynchronous
//! results through the [`EventRouter`]. It operates in exactly one of
//! two modes, selected once at construction:
//!
//! - **Linked**: a vendor SDK implementation is present. Its callbacks
//!   are consumed by a single serialized delivery task, so events
//!   concerning one device reach the caller in the order the vendor
//!   stack produced them even though producers are concurrent.
//! - **Stub**: the SDK is absent. Every operation returns a harmless
//!   empty/false result or a fixed typed error, and no background work
//!   is started. Read-only queries degrade to empty results so caller
//!   code paths stay uniform across environments.
//!
//! Failures after a request has succeeded are never retried here; they
//! are reported once on the relevant event channel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::registry::VendorDeviceRegistry;
use crate::router::EventRouter;
use crate::sdk::{SdkHandle, VendorCallback, VendorSdk, callback_channel};
use wearlink_types::{
    AccessPoint, RealTimeDataType, ScannedVendorDevice, VendorConnectionState, VendorDevice,
    VendorDeviceKind,
};

/// Configuration for the vendor bridge.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Scan duration used when the caller does not specify one.
    pub default_scan_timeout: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            default_scan_timeout: Duration::from_secs(30),
        }
    }
}

impl BridgeConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default scan timeout.
    #[must_use]
    pub fn default_scan_timeout(mut self, timeout: Duration) -> Self {
        self.default_scan_timeout = timeout;
        self
    }
}

/// SDK initialization lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InitState {
    Idle,
    Pending,
    Ready,
}

/// The one active real-time streaming target.
#[derive(Debug, Clone)]
struct ActiveStream {
    unit_id: u64,
    address: String,
    types: Vec<RealTimeDataType>,
}

/// Bridge between the caller and the vendor fitness-device SDK.
pub struct VendorBridge {
    sdk: SdkHandle,
    config: BridgeConfig,
    registry: VendorDeviceRegistry,
    router: Arc<EventRouter>,
    init_state: StdMutex<InitState>,
    /// Devices seen during the current scan session, keyed by identifier.
    /// Distinct from the paired-device registry: these are candidates
    /// for pairing, discarded when a new scan starts.
    scan_session: Arc<StdMutex<HashMap<String, ScannedVendorDevice>>>,
    active_stream: Mutex<Option<ActiveStream>>,
    pairing: StdMutex<Option<CancellationToken>>,
    delivery_cancel: CancellationToken,
    delivery_task: StdMutex<Option<JoinHandle<()>>>,
    disposed: AtomicBool,
}

impl VendorBridge {
    /// Create a bridge, probing the build for a linked vendor SDK.
    pub fn probe() -> Self {
        Self::new(SdkHandle::probe())
    }

    /// Create a bridge with an explicit SDK handle.
    pub fn new(sdk: SdkHandle) -> Self {
        Self::with_config(sdk, BridgeConfig::default())
    }

    /// Create a bridge with custom configuration.
    ///
    /// In Linked mode this attaches the callback channel and starts the
    /// serialized delivery task; in Stub mode no background work starts.
    pub fn with_config(sdk: SdkHandle, config: BridgeConfig) -> Self {
        let router = Arc::new(EventRouter::new());
        let scan_session = Arc::new(StdMutex::new(HashMap::new()));
        let delivery_cancel = CancellationToken::new();

        let delivery_task = sdk.sdk().map(|linked| {
            let (tx, rx) = callback_channel();
            linked.attach_listener(tx);
            spawn_delivery_loop(
                rx,
                Arc::clone(&router),
                Arc::clone(&scan_session),
                delivery_cancel.clone(),
            )
        });

        if sdk.is_available() {
            info!("vendor bridge running in linked mode");
        } else {
            info!("vendor SDK absent, bridge running in stub mode");
        }

        Self {
            sdk,
            config,
            registry: VendorDeviceRegistry::new(),
            router,
            init_state: StdMutex::new(InitState::Idle),
            scan_session,
            active_stream: Mutex::new(None),
            pairing: StdMutex::new(None),
            delivery_cancel,
            delivery_task: StdMutex::new(delivery_task),
            disposed: AtomicBool::new(false),
        }
    }

    /// The bridge's event channels.
    pub fn events(&self) -> &Arc<EventRouter> {
        &self.router
    }

    /// The paired-device registry.
    pub fn registry(&self) -> &VendorDeviceRegistry {
        &self.registry
    }

    /// Whether a linked vendor SDK is present.
    pub fn is_available(&self) -> bool {
        self.sdk.is_available()
    }

    /// Whether the SDK has been successfully initialized.
    pub fn is_initialized(&self) -> bool {
        *self.init_state.lock().expect("init lock poisoned") == InitState::Ready
    }

    /// Initialize the vendor SDK with a license key.
    ///
    /// Single in-flight initialization: a second call while one is
    /// pending is rejected with [`Error::InitializationPending`]. After
    /// a successful initialize further calls return `Ok(true)` without
    /// touching the SDK again.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArguments`] when the license key is empty
    /// - [`Error::SdkNotAvailable`] in stub mode
    #[tracing::instrument(level = "info", skip_all)]
    pub async fn initialize(&self, license_key: &str) -> Result<bool> {
        if license_key.is_empty() {
            return Err(Error::invalid_arguments("license key is required"));
        }
        let Some(sdk) = self.sdk.sdk() else {
            return Err(Error::SdkNotAvailable);
        };

        {
            let mut state = self.init_state.lock().expect("init lock poisoned");
            match *state {
                InitState::Pending => return Err(Error::InitializationPending),
                InitState::Ready => return Ok(true),
                InitState::Idle => *state = InitState::Pending,
            }
        }

        let result = sdk.initialize(license_key).await;

        let mut state = self.init_state.lock().expect("init lock poisoned");
        match result {
            Ok(true) => {
                *state = InitState::Ready;
                info!("vendor SDK initialized");
                Ok(true)
            }
            Ok(false) => {
                *state = InitState::Idle;
                warn!("vendor SDK rejected the license key");
                Ok(false)
            }
            Err(e) => {
                *state = InitState::Idle;
                Err(e)
            }
        }
    }

    /// Start scanning for vendor devices.
    ///
    /// Begins a new scan session: devices from the previous session are
    /// discarded, and any scan already running is implicitly stopped
    /// first. Normalized scan records arrive on the scanned-devices
    /// event channel.
    pub async fn start_scanning(
        &self,
        kinds: Option<&[VendorDeviceKind]>,
        timeout: Option<Duration>,
    ) -> Result<()> {
        let sdk = self.require_initialized()?;

        self.scan_session
            .lock()
            .expect("scan session lock poisoned")
            .clear();

        // A second start implicitly restarts the scan
        if let Err(e) = sdk.stop_scanning().await {
            debug!("stopping previous scan failed: {}", e);
        }

        sdk.start_scanning(
            kinds.unwrap_or_default(),
            timeout.unwrap_or(self.config.default_scan_timeout),
        )
        .await
    }

    /// Stop an active vendor scan. Idempotent.
    pub async fn stop_scanning(&self) -> Result<()> {
        match self.sdk.sdk() {
            Some(sdk) => sdk.stop_scanning().await,
            None => Ok(()),
        }
    }

    /// Pair a device seen during the current scan session.
    ///
    /// # Errors
    ///
    /// - [`Error::DeviceNotFound`] when the identifier was not observed
    ///   in the current scan session
    /// - [`Error::Cancelled`] when [`VendorBridge::cancel_pairing`] wins
    ///   before the vendor confirms
    #[tracing::instrument(level = "info", skip(self), fields(identifier = %identifier))]
    pub async fn pair_device(&self, identifier: &str) -> Result<VendorDevice> {
        let sdk = self.require_initialized()?;
        if identifier.is_empty() {
            return Err(Error::invalid_arguments("device identifier is required"));
        }

        let seen = self
            .scan_session
            .lock()
            .expect("scan session lock poisoned")
            .contains_key(identifier);
        if !seen {
            return Err(Error::device_not_scanned(identifier));
        }

        let token = CancellationToken::new();
        *self.pairing.lock().expect("pairing lock poisoned") = Some(token.clone());

        // Cancellation only wins while the vendor has not yet confirmed;
        // once pair_device resolves, the pairing stands and callers must
        // forget the device to undo it
        let result = tokio::select! {
            _ = token.cancelled() => Err(Error::Cancelled),
            paired = sdk.pair_device(identifier) => paired,
        };

        self.pairing.lock().expect("pairing lock poisoned").take();

        if result.is_ok() {
            // Bring the unit-id/address map up to date; resolve() retries
            // lazily if this fails
            let _ = self.registry.refresh(&self.sdk).await;
        }
        result
    }

    /// Cancel an in-flight pairing. No-op when nothing is pending, and
    /// never stops scanning.
    pub fn cancel_pairing(&self) {
        if let Some(token) = self.pairing.lock().expect("pairing lock poisoned").take() {
            token.cancel();
        }
    }

    /// Remove a paired device.
    ///
    /// A unit id that does not resolve to an address is treated as a
    /// successful no-op: there is nothing to forget.
    pub async fn forget_device(&self, unit_id: u64, delete_data: bool) -> Result<()> {
        let Some(sdk) = self.sdk.sdk() else {
            return Ok(());
        };
        let Some(address) = self.registry.resolve(&self.sdk, unit_id).await else {
            debug!(unit_id, "forget: unit id not paired, nothing to do");
            return Ok(());
        };
        sdk.forget_device(&address, delete_data).await?;
        let _ = self.registry.refresh(&self.sdk).await;
        Ok(())
    }

    /// List currently paired vendor devices.
    ///
    /// In stub mode this degrades to an empty list. In linked mode it
    /// refreshes the registry wholesale from the SDK.
    pub async fn get_paired_devices(&self) -> Result<Vec<VendorDevice>> {
        if !self.sdk.is_available() {
            return Ok(Vec::new());
        }
        self.require_initialized()?;
        self.registry.refresh(&self.sdk).await
    }

    /// Query the connection state of a paired device.
    ///
    /// Unknown unit ids and stub mode both report `Disconnected`.
    pub async fn get_connection_state(&self, unit_id: u64) -> VendorConnectionState {
        let Some(sdk) = self.sdk.sdk() else {
            return VendorConnectionState::Disconnected;
        };
        let Some(address) = self.registry.resolve(&self.sdk, unit_id).await else {
            return VendorConnectionState::Disconnected;
        };
        sdk.connection_state(&address).await.unwrap_or_default()
    }

    /// Request a data sync. Progress and completion arrive on the
    /// sync-progress event channel, never synchronously.
    pub async fn request_sync(&self, unit_id: u64) -> Result<()> {
        let Some(sdk) = self.sdk.sdk() else {
            return Ok(());
        };
        if let Some(address) = self.registry.resolve(&self.sdk, unit_id).await {
            sdk.request_sync(&address).await?;
        }
        Ok(())
    }

    /// Query the battery level of a paired device.
    ///
    /// `None` when the SDK is absent, the unit id does not resolve, or
    /// the device does not report a level.
    pub async fn get_battery_level(&self, unit_id: u64) -> Result<Option<u8>> {
        let Some(sdk) = self.sdk.sdk() else {
            return Ok(None);
        };
        let Some(address) = self.registry.resolve(&self.sdk, unit_id).await else {
            return Ok(None);
        };
        sdk.battery_level(&address).await
    }

    /// Start real-time streaming from a paired device.
    ///
    /// `data_types` carries wire names; unknown names are silently
    /// dropped from the requested set. When no set is given (or an empty
    /// one), the default set is used. If every requested name is
    /// unknown, nothing is enabled. Any previously streaming device is
    /// implicitly stopped first.
    #[tracing::instrument(level = "info", skip(self, data_types))]
    pub async fn start_streaming(
        &self,
        unit_id: u64,
        data_types: Option<&[String]>,
    ) -> Result<()> {
        let sdk = self.require_initialized()?;

        self.stop_streaming(None).await?;

        let types: Vec<RealTimeDataType> = match data_types {
            None => RealTimeDataType::DEFAULT_SET.to_vec(),
            Some(names) if names.is_empty() => RealTimeDataType::DEFAULT_SET.to_vec(),
            Some(names) => RealTimeDataType::parse_set(names),
        };
        if types.is_empty() {
            debug!("requested data types all unknown, nothing to stream");
            return Ok(());
        }

        let Some(address) = self.registry.resolve(&self.sdk, unit_id).await else {
            warn!(unit_id, "cannot stream: unit id does not resolve to an address");
            return Ok(());
        };

        sdk.enable_real_time(&address, &types).await?;
        *self.active_stream.lock().await = Some(ActiveStream {
            unit_id,
            address,
            types,
        });
        Ok(())
    }

    /// Stop real-time streaming.
    ///
    /// With no unit id, stops whatever device is currently streaming.
    /// Idempotent: a no-op when nothing is active.
    pub async fn stop_streaming(&self, unit_id: Option<u64>) -> Result<()> {
        let Some(sdk) = self.sdk.sdk() else {
            return Ok(());
        };
        let Some(active) = self.active_stream.lock().await.take() else {
            return Ok(());
        };

        let address = match unit_id {
            Some(uid) => self
                .registry
                .resolve(&self.sdk, uid)
                .await
                .unwrap_or_else(|| active.address.clone()),
            None => active.address.clone(),
        };

        if let Err(e) = sdk.disable_real_time(&address, &active.types).await {
            debug!("disabling real-time data failed: {}", e);
        }
        Ok(())
    }

    /// The unit id currently streaming, if any.
    pub async fn streaming_unit(&self) -> Option<u64> {
        self.active_stream.lock().await.as_ref().map(|s| s.unit_id)
    }

    /// Read logged heart-rate records for a time range.
    ///
    /// Historical reads are intentionally unimplemented: they always
    /// return an empty list after argument validation, in every mode.
    pub async fn read_logged_heart_rate(
        &self,
        unit_id: Option<u64>,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<serde_json::Value>> {
        self.empty_logged_read(unit_id, start_ms, end_ms)
    }

    /// Read logged stress records for a time range. Always empty.
    pub async fn read_logged_stress(
        &self,
        unit_id: Option<u64>,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<serde_json::Value>> {
        self.empty_logged_read(unit_id, start_ms, end_ms)
    }

    /// Read logged respiration records for a time range. Always empty.
    pub async fn read_logged_respiration(
        &self,
        unit_id: Option<u64>,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<serde_json::Value>> {
        self.empty_logged_read(unit_id, start_ms, end_ms)
    }

    /// Read wellness epochs for a time range. Always empty.
    pub async fn read_wellness_epochs(
        &self,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<serde_json::Value>> {
        self.empty_logged_read(None, start_ms, end_ms)
    }

    /// Read wellness summaries for a time range. Always empty.
    pub async fn read_wellness_summaries(
        &self,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<serde_json::Value>> {
        self.empty_logged_read(None, start_ms, end_ms)
    }

    /// Read sleep sessions for a time range. Always empty.
    pub async fn read_sleep_sessions(
        &self,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<serde_json::Value>> {
        self.empty_logged_read(None, start_ms, end_ms)
    }

    /// Read activity summaries for a time range. Always empty.
    pub async fn read_activity_summaries(
        &self,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<serde_json::Value>> {
        self.empty_logged_read(None, start_ms, end_ms)
    }

    /// Shared validation for the logged-data stubs.
    fn empty_logged_read(
        &self,
        _unit_id: Option<u64>,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<serde_json::Value>> {
        if end_ms < start_ms {
            return Err(Error::invalid_arguments(
                "end time must not precede start time",
            ));
        }
        Ok(Vec::new())
    }

    /// Scan for WiFi access points visible to a device.
    ///
    /// Degrades to an empty list in stub mode or when the unit id does
    /// not resolve.
    pub async fn scan_access_points(&self, unit_id: u64) -> Result<Vec<AccessPoint>> {
        let Some(sdk) = self.sdk.sdk() else {
            return Ok(Vec::new());
        };
        self.require_initialized()?;
        let Some(address) = self.registry.resolve(&self.sdk, unit_id).await else {
            return Ok(Vec::new());
        };
        sdk.scan_access_points(&address).await
    }

    /// Store WiFi credentials on a device.
    pub async fn store_access_point(
        &self,
        unit_id: u64,
        ssid: &str,
        password: &str,
    ) -> Result<()> {
        if ssid.is_empty() {
            return Err(Error::invalid_arguments("ssid is required"));
        }
        let Some(sdk) = self.sdk.sdk() else {
            return Ok(());
        };
        self.require_initialized()?;
        let Some(address) = self.registry.resolve(&self.sdk, unit_id).await else {
            return Err(Error::device_not_found(format!("unit {}", unit_id)));
        };
        sdk.store_access_point(&address, ssid, password).await
    }

    /// Tear down the bridge: cancel outstanding timers and pairings,
    /// stop the delivery loop and detach from the vendor stack.
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.cancel_pairing();
        self.delivery_cancel.cancel();
        if let Some(task) = self
            .delivery_task
            .lock()
            .expect("delivery lock poisoned")
            .take()
        {
            task.abort();
        }

        if let Some(sdk) = self.sdk.sdk() {
            if let Err(e) = sdk.stop_scanning().await {
                debug!("stopping scan during dispose failed: {}", e);
            }
            if let Some(active) = self.active_stream.lock().await.take() {
                let _ = sdk.disable_real_time(&active.address, &active.types).await;
            }
            sdk.detach();
        }
        info!("vendor bridge disposed");
    }

    /// Guard for operations that need a successfully initialized SDK.
    fn require_initialized(&self) -> Result<&Arc<dyn VendorSdk>> {
        let sdk = self.sdk.sdk().ok_or(Error::NotInitialized)?;
        if *self.init_state.lock().expect("init lock poisoned") != InitState::Ready {
            return Err(Error::NotInitialized);
        }
        Ok(sdk)
    }
}

impl std::fmt::Debug for VendorBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VendorBridge")
            .field("mode", &self.sdk)
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}

impl Drop for VendorBridge {
    fn drop(&mut self) {
        if !self.disposed.load(Ordering::SeqCst) {
            self.delivery_cancel.cancel();
            if let Ok(mut guard) = self.delivery_task.lock() {
                if let Some(task) = guard.take() {
                    task.abort();
                }
            }
            if self.sdk.is_available() {
                warn!("vendor bridge dropped without dispose(), listeners may leak");
            }
        }
    }
}

/// Consume vendor callbacks on one task, preserving producer order.
fn spawn_delivery_loop(
    mut rx: crate::sdk::CallbackReceiver,
    router: Arc<EventRouter>,
    scan_session: Arc<StdMutex<HashMap<String, ScannedVendorDevice>>>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                callback = rx.recv() => {
                    let Some(callback) = callback else { break };
                    match callback {
                        VendorCallback::Connection(event) => {
                            router.emit_connection_state(event);
                        }
                        VendorCallback::Scanned(batch) => {
                            {
                                let mut session = scan_session
                                    .lock()
                                    .expect("scan session lock poisoned");
                                for device in &batch {
                                    session.insert(device.identifier.clone(), device.clone());
                                }
                            }
                            router.emit_scanned_devices(batch);
                        }
                        VendorCallback::ScanFailed { code } => {
                            warn!(?code, "vendor device scan failed");
                        }
                        VendorCallback::RealTime(frame) => {
                            // A frame carrying only timestamp/deviceId is
                            // noise from an empty vendor callback
                            if frame.has_payload() {
                                router.emit_real_time(frame);
                            } else {
                                debug!("suppressing empty real-time frame");
                            }
                        }
                        VendorCallback::SyncProgress(progress) => {
                            router.emit_sync_progress(progress);
                        }
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stub_bridge_reports_unavailable() {
        let bridge = VendorBridge::probe();
        assert!(!bridge.is_available());
        assert!(!bridge.is_initialized());
    }

    #[tokio::test]
    async fn test_stub_initialize_is_typed_error() {
        let bridge = VendorBridge::probe();
        let err = bridge.initialize("license-123").await.unwrap_err();
        assert!(matches!(err, Error::SdkNotAvailable));
    }

    #[tokio::test]
    async fn test_empty_license_rejected_before_mode_check() {
        let bridge = VendorBridge::probe();
        let err = bridge.initialize("").await.unwrap_err();
        assert!(matches!(err, Error::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn test_bridge_config_builder() {
        let config = BridgeConfig::new().default_scan_timeout(Duration::from_secs(10));
        assert_eq!(config.default_scan_timeout, Duration::from_secs(10));
    }
}
