//! Heart-rate monitor connection session.
//!
//! A session owns at most one active BLE peripheral connection and walks
//! it through an explicit state machine:
//!
//! ```text
//! Idle -> Connecting -> ServiceDiscovery -> Subscribing -> Streaming -> Disconnected
//! ```
//!
//! The error states `ConnectFailed` and `SubscribeFailed` are terminal
//! and return to `Idle` on acknowledgement. Starting a new connection
//! implicitly invalidates any prior session's identity; old and new GATT
//! objects are never merged.
//!
//! While streaming, every Heart-Rate Measurement notification is decoded
//! and pushed to the sample outlet. An externally triggered disconnect
//! is reported once as [`Error::DeviceDisconnected`] on the sample
//! outlet and the session is torn down; it is never retried here.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use btleplug::api::{Central, CentralEvent, Characteristic, Peripheral as _};
use btleplug::platform::{Adapter, Peripheral};
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ConnectFailureReason, Error, Result};
use crate::router::Outlet;
use crate::util::{create_identifier, now_millis};
use wearlink_types::uuids::HEART_RATE_MEASUREMENT;
use wearlink_types::{HeartRateSample, HrmMeasurement, SOURCE_BLE_HRM};

/// Result type delivered on the sample outlet: a decoded sample, or a
/// terminal [`Error::DeviceDisconnected`] when the link drops.
pub type SampleResult = std::result::Result<HeartRateSample, Error>;

/// Lifecycle state of a [`HrSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No connection and no attempt outstanding.
    Idle,
    /// Link-layer connection in progress.
    Connecting,
    /// Connected, discovering the heart-rate service.
    ServiceDiscovery,
    /// Enabling notifications on the measurement characteristic.
    Subscribing,
    /// Receiving measurement notifications.
    Streaming,
    /// The peer or radio dropped the link while streaming.
    Disconnected,
    /// Terminal: the connection attempt failed. Acknowledge to reset.
    ConnectFailed,
    /// Terminal: notification subscription failed. Acknowledge to reset.
    SubscribeFailed,
}

impl SessionState {
    /// Whether a connect attempt is currently outstanding.
    pub fn is_setup_phase(&self) -> bool {
        matches!(
            self,
            SessionState::Connecting | SessionState::ServiceDiscovery | SessionState::Subscribing
        )
    }
}

/// Reject a connect when one is outstanding, otherwise claim the state.
///
/// The existing attempt is never mutated by a rejected call.
fn begin_connect(state: &mut SessionState) -> Result<()> {
    if state.is_setup_phase() {
        return Err(Error::connect_failed(
            None,
            ConnectFailureReason::AttemptInProgress,
        ));
    }
    *state = SessionState::Connecting;
    Ok(())
}

/// Acknowledge a terminal error state, returning the machine to idle.
fn acknowledge(state: &mut SessionState) {
    if matches!(
        state,
        SessionState::ConnectFailed | SessionState::SubscribeFailed
    ) {
        *state = SessionState::Idle;
    }
}

/// Timeouts for the connection setup phases.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Timeout for establishing the link-layer connection.
    pub connect_timeout: Duration,
    /// Timeout for service discovery after connecting.
    pub discovery_timeout: Duration,
    /// Timeout for enabling notifications.
    pub subscribe_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(15),
            discovery_timeout: Duration::from_secs(10),
            subscribe_timeout: Duration::from_secs(10),
        }
    }
}

impl ConnectionConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connection timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the service discovery timeout.
    #[must_use]
    pub fn discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }

    /// Set the subscribe timeout.
    #[must_use]
    pub fn subscribe_timeout(mut self, timeout: Duration) -> Self {
        self.subscribe_timeout = timeout;
        self
    }
}

/// State held for the one live connection.
struct ActiveLink {
    peripheral: Peripheral,
    device_id: String,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

/// Owns one BLE heart-rate monitor connection at a time.
pub struct HrSession {
    adapter: Adapter,
    config: ConnectionConfig,
    state: Arc<StdMutex<SessionState>>,
    link: Mutex<Option<ActiveLink>>,
    samples: Arc<Outlet<SampleResult>>,
}

impl HrSession {
    /// Create a session on a specific adapter.
    pub fn new(adapter: Adapter) -> Self {
        Self::with_config(adapter, ConnectionConfig::default())
    }

    /// Create a session with custom timeouts.
    pub fn with_config(adapter: Adapter, config: ConnectionConfig) -> Self {
        Self {
            adapter,
            config,
            state: Arc::new(StdMutex::new(SessionState::Idle)),
            link: Mutex::new(None),
            samples: Arc::new(Outlet::new()),
        }
    }

    /// Current state of the session state machine.
    pub fn state(&self) -> SessionState {
        *self.state.lock().expect("session state lock poisoned")
    }

    /// Whether the session is currently streaming samples.
    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Streaming
    }

    /// Subscribe to the sample outlet, replacing any previous subscriber.
    pub fn subscribe_samples(&self) -> mpsc::UnboundedReceiver<SampleResult> {
        self.samples.subscribe()
    }

    /// Acknowledge a terminal `ConnectFailed`/`SubscribeFailed` state.
    pub fn acknowledge_failure(&self) {
        acknowledge(&mut self.state.lock().expect("session state lock poisoned"));
    }

    /// Connect to a heart-rate monitor and start streaming samples.
    ///
    /// The device is looked up by id among previously scanned or
    /// system-known peripherals. On success the session discovers the
    /// heart-rate service, enables measurement notifications and moves
    /// to `Streaming`. Only one connect attempt may be outstanding: a
    /// second call during setup is rejected with `ConnectFailed` and
    /// does not disturb the attempt in flight.
    ///
    /// # Errors
    ///
    /// - [`Error::DeviceNotFound`] when the id matches no known peripheral
    /// - [`Error::ConnectFailed`] when any setup phase fails or the link
    ///   drops before streaming is established
    #[tracing::instrument(level = "info", skip(self), fields(device_id = %device_id))]
    pub async fn connect(&self, device_id: &str, session_id: &str) -> Result<()> {
        {
            let mut state = self.state.lock().expect("session state lock poisoned");
            begin_connect(&mut state)?;
        }

        // A new connection invalidates any prior session's identity
        self.teardown_link().await;

        let peripheral = match self.find_peripheral(device_id).await {
            Ok(Some(p)) => p,
            Ok(None) => {
                self.set_state(SessionState::Idle);
                return Err(Error::device_not_found(device_id));
            }
            Err(e) => {
                self.set_state(SessionState::Idle);
                return Err(e);
            }
        };

        info!("connecting to heart-rate monitor");
        match timeout(self.config.connect_timeout, peripheral.connect()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return Err(self.fail(
                    SessionState::ConnectFailed,
                    Error::connect_failed(
                        Some(device_id.to_string()),
                        ConnectFailureReason::BleError(e.to_string()),
                    ),
                ));
            }
            Err(_) => {
                return Err(self.fail(
                    SessionState::ConnectFailed,
                    Error::connect_failed(
                        Some(device_id.to_string()),
                        ConnectFailureReason::Timeout,
                    ),
                ));
            }
        }

        self.set_state(SessionState::ServiceDiscovery);

        debug!("discovering services");
        match timeout(
            self.config.discovery_timeout,
            peripheral.discover_services(),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = peripheral.disconnect().await;
                return Err(self.fail(
                    SessionState::ConnectFailed,
                    Error::connect_failed(
                        Some(device_id.to_string()),
                        ConnectFailureReason::BleError(e.to_string()),
                    ),
                ));
            }
            Err(_) => {
                let _ = peripheral.disconnect().await;
                return Err(self.fail(
                    SessionState::ConnectFailed,
                    Error::connect_failed(
                        Some(device_id.to_string()),
                        ConnectFailureReason::Timeout,
                    ),
                ));
            }
        }

        let Some(characteristic) = find_characteristic(&peripheral, HEART_RATE_MEASUREMENT) else {
            let _ = peripheral.disconnect().await;
            return Err(self.fail(
                SessionState::SubscribeFailed,
                Error::connect_failed(
                    Some(device_id.to_string()),
                    ConnectFailureReason::ProfileMissing,
                ),
            ));
        };

        self.set_state(SessionState::Subscribing);

        debug!("enabling measurement notifications");
        match timeout(
            self.config.subscribe_timeout,
            peripheral.subscribe(&characteristic),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = peripheral.disconnect().await;
                return Err(self.fail(
                    SessionState::SubscribeFailed,
                    Error::connect_failed(
                        Some(device_id.to_string()),
                        ConnectFailureReason::BleError(e.to_string()),
                    ),
                ));
            }
            Err(_) => {
                let _ = peripheral.disconnect().await;
                return Err(self.fail(
                    SessionState::SubscribeFailed,
                    Error::connect_failed(
                        Some(device_id.to_string()),
                        ConnectFailureReason::Timeout,
                    ),
                ));
            }
        }

        let notifications = match peripheral.notifications().await {
            Ok(stream) => stream,
            Err(e) => {
                let _ = peripheral.disconnect().await;
                return Err(self.fail(
                    SessionState::SubscribeFailed,
                    Error::subscribe_failed(
                        HEART_RATE_MEASUREMENT.to_string(),
                        e.to_string(),
                    ),
                ));
            }
        };

        let adapter_events = match self.adapter.events().await {
            Ok(stream) => stream,
            Err(e) => {
                let _ = peripheral.disconnect().await;
                return Err(self.fail(
                    SessionState::SubscribeFailed,
                    Error::subscribe_failed(HEART_RATE_MEASUREMENT.to_string(), e.to_string()),
                ));
            }
        };

        let device_name = peripheral
            .properties()
            .await
            .ok()
            .flatten()
            .and_then(|p| p.local_name)
            .unwrap_or_default();

        let cancel = CancellationToken::new();
        let mut tasks = Vec::with_capacity(2);

        // Notification pump: decode and decorate each measurement
        {
            let samples = Arc::clone(&self.samples);
            let cancel = cancel.clone();
            let device_id = device_id.to_string();
            let device_name = device_name.clone();
            let session_id = session_id.to_string();
            let mut stream = notifications;

            tasks.push(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        note = stream.next() => {
                            let Some(note) = note else { break };
                            if note.uuid != HEART_RATE_MEASUREMENT {
                                continue;
                            }
                            match HrmMeasurement::from_bytes(&note.value) {
                                Ok(m) => {
                                    let sample = HeartRateSample {
                                        timestamp_ms: now_millis(),
                                        bpm: m.bpm,
                                        source: SOURCE_BLE_HRM.to_string(),
                                        device_id: device_id.clone(),
                                        device_name: device_name.clone(),
                                        session_id: session_id.clone(),
                                        rr_intervals_ms: m.rr_intervals_ms,
                                    };
                                    if !samples.emit(Ok(sample)) {
                                        debug!("sample dropped, no subscriber");
                                    }
                                }
                                // Contract violation on non-conformant
                                // hardware: log and drop, keep streaming
                                Err(e) => warn!("malformed measurement payload: {}", e),
                            }
                        }
                    }
                }
            }));
        }

        // Disconnect watcher: an external drop mid-stream is reported
        // once on the sample outlet, then the session stays Disconnected
        {
            let samples = Arc::clone(&self.samples);
            let state = Arc::clone(&self.state);
            let cancel = cancel.clone();
            let watched_id = peripheral.id();
            let device_id = device_id.to_string();
            let mut events = adapter_events;

            tasks.push(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        event = events.next() => {
                            match event {
                                Some(CentralEvent::DeviceDisconnected(id)) if id == watched_id => {
                                    let was_streaming = {
                                        let mut s = state.lock().expect("session state lock poisoned");
                                        if *s == SessionState::Streaming {
                                            *s = SessionState::Disconnected;
                                            true
                                        } else {
                                            false
                                        }
                                    };
                                    if was_streaming {
                                        warn!(device = %device_id, "heart-rate monitor disconnected");
                                        samples.emit(Err(Error::DeviceDisconnected {
                                            device_id: device_id.clone(),
                                        }));
                                    }
                                    break;
                                }
                                Some(_) => {}
                                None => break,
                            }
                        }
                    }
                }
            }));
        }

        *self.link.lock().await = Some(ActiveLink {
            peripheral,
            device_id: device_id.to_string(),
            cancel,
            tasks,
        });
        self.set_state(SessionState::Streaming);

        info!("streaming heart-rate samples");
        Ok(())
    }

    /// Disconnect and return to `Idle`.
    ///
    /// Idempotent: safe to call from any state, never errors.
    #[tracing::instrument(level = "info", skip(self))]
    pub async fn disconnect(&self) -> Result<()> {
        self.teardown_link().await;
        self.set_state(SessionState::Idle);
        Ok(())
    }

    fn set_state(&self, state: SessionState) {
        *self.state.lock().expect("session state lock poisoned") = state;
    }

    /// Move to a terminal failure state and hand back the error.
    fn fail(&self, state: SessionState, err: Error) -> Error {
        self.set_state(state);
        err
    }

    /// Cancel pump tasks and release the peripheral, if a link exists.
    async fn teardown_link(&self) {
        let link = self.link.lock().await.take();
        if let Some(link) = link {
            link.cancel.cancel();
            for task in link.tasks {
                task.abort();
            }
            if let Err(e) = link.peripheral.disconnect().await {
                debug!(device = %link.device_id, "disconnect during teardown failed: {}", e);
            }
        }
    }

    /// Look up a system-known peripheral by identifier.
    async fn find_peripheral(&self, identifier: &str) -> Result<Option<Peripheral>> {
        let identifier_lower = identifier.to_lowercase();
        let peripherals = self.adapter.peripherals().await?;

        for peripheral in peripherals {
            if let Ok(Some(props)) = peripheral.properties().await {
                let id = create_identifier(&props.address.to_string(), &peripheral.id());
                if id.to_lowercase() == identifier_lower {
                    return Ok(Some(peripheral));
                }
            }
        }
        Ok(None)
    }
}

impl std::fmt::Debug for HrSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HrSession")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Drop for HrSession {
    fn drop(&mut self) {
        // Best-effort cleanup; callers SHOULD disconnect() explicitly
        if let Ok(mut guard) = self.link.try_lock() {
            if let Some(link) = guard.take() {
                warn!(
                    device = %link.device_id,
                    "session dropped without disconnect(), cancelling stream tasks"
                );
                link.cancel.cancel();
                for task in link.tasks {
                    task.abort();
                }
                if let Ok(handle) = tokio::runtime::Handle::try_current() {
                    let peripheral = link.peripheral;
                    handle.spawn(async move {
                        let _ = peripheral.disconnect().await;
                    });
                }
            }
        }
    }
}

/// Find a characteristic by UUID after service discovery.
fn find_characteristic(peripheral: &Peripheral, uuid: Uuid) -> Option<Characteristic> {
    peripheral
        .characteristics()
        .into_iter()
        .find(|c| c.uuid == uuid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_phase_states() {
        assert!(SessionState::Connecting.is_setup_phase());
        assert!(SessionState::ServiceDiscovery.is_setup_phase());
        assert!(SessionState::Subscribing.is_setup_phase());

        assert!(!SessionState::Idle.is_setup_phase());
        assert!(!SessionState::Streaming.is_setup_phase());
        assert!(!SessionState::Disconnected.is_setup_phase());
        assert!(!SessionState::ConnectFailed.is_setup_phase());
    }

    #[test]
    fn test_begin_connect_rejects_outstanding_attempt() {
        let mut state = SessionState::Connecting;
        let err = begin_connect(&mut state).unwrap_err();
        assert!(matches!(
            err,
            Error::ConnectFailed {
                reason: ConnectFailureReason::AttemptInProgress,
                ..
            }
        ));
        // The attempt in flight is not disturbed
        assert_eq!(state, SessionState::Connecting);
    }

    #[test]
    fn test_begin_connect_from_quiescent_states() {
        for start in [
            SessionState::Idle,
            SessionState::Streaming,
            SessionState::Disconnected,
            SessionState::ConnectFailed,
            SessionState::SubscribeFailed,
        ] {
            let mut state = start;
            begin_connect(&mut state).unwrap();
            assert_eq!(state, SessionState::Connecting);
        }
    }

    #[test]
    fn test_acknowledge_resets_only_error_states() {
        let mut state = SessionState::ConnectFailed;
        acknowledge(&mut state);
        assert_eq!(state, SessionState::Idle);

        let mut state = SessionState::SubscribeFailed;
        acknowledge(&mut state);
        assert_eq!(state, SessionState::Idle);

        let mut state = SessionState::Streaming;
        acknowledge(&mut state);
        assert_eq!(state, SessionState::Streaming);
    }

    #[test]
    fn test_connection_config_builder() {
        let config = ConnectionConfig::new()
            .connect_timeout(Duration::from_secs(20))
            .discovery_timeout(Duration::from_secs(5))
            .subscribe_timeout(Duration::from_secs(3));
        assert_eq!(config.connect_timeout, Duration::from_secs(20));
        assert_eq!(config.discovery_timeout, Duration::from_secs(5));
        assert_eq!(config.subscribe_timeout, Duration::from_secs(3));
    }
}
