//! Per-category event broadcast points with single-subscriber semantics.
//!
//! Each event category (connection state, scanned devices, real-time
//! frames, sync progress) has one [`Outlet`]: at most one active
//! subscriber at a time, a new subscription silently replaces the
//! previous one, and events emitted with no subscriber are dropped,
//! never queued.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use wearlink_types::{RealTimeFrame, ScannedVendorDevice, SyncProgress, VendorConnectionState};

/// Connection-state change pushed by the vendor bridge.
///
/// Serializable for logging and IPC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionEvent {
    /// The new connection state.
    pub state: VendorConnectionState,
    /// Unit id of the affected device, if known.
    pub device_id: Option<u64>,
    /// Failure description when `state` is `Failed`.
    pub error: Option<String>,
    /// Wall-clock timestamp in milliseconds since the Unix epoch.
    pub timestamp_ms: i64,
}

/// A single-subscriber event outlet.
///
/// Unlike a broadcast channel there is no fan-out: subscribing replaces
/// whatever receiver was active before, and emitting without a
/// subscriber drops the event.
#[derive(Debug)]
pub struct Outlet<T> {
    sender: Mutex<Option<mpsc::UnboundedSender<T>>>,
}

impl<T> Outlet<T> {
    /// Create an outlet with no subscriber.
    pub fn new() -> Self {
        Self {
            sender: Mutex::new(None),
        }
    }

    /// Subscribe to this outlet, replacing any previous subscriber.
    ///
    /// The previous subscriber's receiver stops yielding items once its
    /// sender is dropped here.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.sender.lock().expect("outlet lock poisoned") = Some(tx);
        rx
    }

    /// Detach the current subscriber, if any.
    pub fn unsubscribe(&self) {
        *self.sender.lock().expect("outlet lock poisoned") = None;
    }

    /// Emit an event to the active subscriber.
    ///
    /// Returns `true` if the event was delivered. Events emitted with no
    /// subscriber, or after the subscriber dropped its receiver, return
    /// `false` and the stale sender is cleared.
    pub fn emit(&self, event: T) -> bool {
        let mut guard = self.sender.lock().expect("outlet lock poisoned");
        match guard.as_ref() {
            Some(tx) => {
                if tx.send(event).is_ok() {
                    true
                } else {
                    // Receiver was dropped; clear so future emits are cheap
                    *guard = None;
                    false
                }
            }
            None => false,
        }
    }

    /// Whether an active subscriber is attached.
    pub fn has_subscriber(&self) -> bool {
        self.sender
            .lock()
            .expect("outlet lock poisoned")
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }
}

impl<T> Default for Outlet<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// The vendor bridge's four event categories.
#[derive(Debug, Default)]
pub struct EventRouter {
    connection_state: Outlet<ConnectionEvent>,
    scanned_devices: Outlet<Vec<ScannedVendorDevice>>,
    real_time: Outlet<RealTimeFrame>,
    sync_progress: Outlet<SyncProgress>,
}

impl EventRouter {
    /// Create a router with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to connection-state events.
    pub fn subscribe_connection_state(&self) -> mpsc::UnboundedReceiver<ConnectionEvent> {
        self.connection_state.subscribe()
    }

    /// Subscribe to scanned-device batches.
    pub fn subscribe_scanned_devices(&self) -> mpsc::UnboundedReceiver<Vec<ScannedVendorDevice>> {
        self.scanned_devices.subscribe()
    }

    /// Subscribe to real-time frames.
    pub fn subscribe_real_time(&self) -> mpsc::UnboundedReceiver<RealTimeFrame> {
        self.real_time.subscribe()
    }

    /// Subscribe to sync-progress updates.
    pub fn subscribe_sync_progress(&self) -> mpsc::UnboundedReceiver<SyncProgress> {
        self.sync_progress.subscribe()
    }

    pub(crate) fn emit_connection_state(&self, event: ConnectionEvent) -> bool {
        self.connection_state.emit(event)
    }

    pub(crate) fn emit_scanned_devices(&self, batch: Vec<ScannedVendorDevice>) -> bool {
        self.scanned_devices.emit(batch)
    }

    pub(crate) fn emit_real_time(&self, frame: RealTimeFrame) -> bool {
        self.real_time.emit(frame)
    }

    pub(crate) fn emit_sync_progress(&self, progress: SyncProgress) -> bool {
        self.sync_progress.emit(progress)
    }
}
