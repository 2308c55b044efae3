//! Heart-rate monitor discovery and scanning.
//!
//! Scanning is a collect-then-deliver accumulator, not a live stream:
//! advertisements matching the heart-rate service are deduplicated by
//! device id (first occurrence wins) and the full list is delivered once
//! the timeout elapses or the scan is stopped.

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use btleplug::api::{Central, CentralEvent, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, PeripheralId};
use futures::StreamExt;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{BluetoothUnavailableReason, Error, Result};
use crate::util::create_identifier;
use wearlink_types::ScanHit;
use wearlink_types::uuids::HEART_RATE_SERVICE;

/// Options for a heart-rate monitor scan.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// How long to collect advertisements before delivering results.
    pub timeout: Duration,
    /// Keep only devices whose name starts with this prefix.
    ///
    /// Unnamed devices are excluded only when a non-empty prefix is set.
    pub name_prefix: Option<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            name_prefix: None,
        }
    }
}

impl ScanConfig {
    /// Create scan options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the collection timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the collection timeout in milliseconds.
    #[must_use]
    pub fn timeout_ms(self, millis: u64) -> Self {
        self.timeout(Duration::from_millis(millis))
    }

    /// Set the name prefix filter.
    #[must_use]
    pub fn name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = Some(prefix.into());
        self
    }
}

/// Get the first available Bluetooth adapter.
///
/// # Errors
///
/// Returns [`Error::BluetoothUnavailable`] when the host has no adapter,
/// before any scan timer is started.
pub async fn get_adapter() -> Result<Adapter> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;

    adapters.into_iter().next().ok_or(Error::BluetoothUnavailable(
        BluetoothUnavailableReason::NoAdapter,
    ))
}

/// Scanner for BLE peripherals advertising the heart-rate service.
pub struct HrScanner {
    adapter: Adapter,
    /// Token for the scan currently collecting, if any.
    active: Mutex<Option<CancellationToken>>,
}

impl HrScanner {
    /// Create a scanner on a specific adapter.
    pub fn new(adapter: Adapter) -> Self {
        Self {
            adapter,
            active: Mutex::new(None),
        }
    }

    /// Create a scanner on the first available adapter.
    pub async fn create() -> Result<Self> {
        Ok(Self::new(get_adapter().await?))
    }

    /// Borrow the underlying adapter.
    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    /// Scan for heart-rate monitors.
    ///
    /// Filters advertisements to the heart-rate service, deduplicates by
    /// device id (first occurrence wins; later advertisements from the
    /// same id are dropped, not merged) and returns the accumulated hits
    /// once the timeout elapses. A zero timeout returns immediately.
    ///
    /// Starting a new scan discards the previous scan session.
    ///
    /// # Errors
    ///
    /// Fails before the timer starts with [`Error::PermissionDenied`]
    /// when authorization is refused, or a Bluetooth error when the scan
    /// cannot be started.
    #[tracing::instrument(level = "info", skip_all, fields(timeout_ms = config.timeout.as_millis() as u64))]
    pub async fn scan(&self, config: ScanConfig) -> Result<Vec<ScanHit>> {
        let mut events = self.adapter.events().await?;

        let filter = ScanFilter {
            services: vec![HEART_RATE_SERVICE],
        };
        if let Err(e) = self.adapter.start_scan(filter).await {
            return Err(match Error::from(e) {
                Error::PermissionDenied => Error::PermissionDenied,
                // A scan that cannot start means the radio is off or
                // otherwise unusable
                Error::Bluetooth(inner) => {
                    debug!("scan could not start: {}", inner);
                    Error::BluetoothUnavailable(BluetoothUnavailableReason::PoweredOff)
                }
                other => other,
            });
        }

        let cancel = CancellationToken::new();
        {
            let mut active = self.active.lock().expect("scan lock poisoned");
            // A restart implicitly ends the previous scan session
            if let Some(previous) = active.replace(cancel.clone()) {
                previous.cancel();
            }
        }

        let deadline = Instant::now() + config.timeout;
        let mut hits: Vec<ScanHit> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        if !config.timeout.is_zero() {
            loop {
                tokio::select! {
                    _ = sleep_until(deadline) => break,
                    _ = cancel.cancelled() => {
                        debug!("scan stopped before timeout");
                        break;
                    }
                    event = events.next() => {
                        match event {
                            Some(CentralEvent::DeviceDiscovered(id)) => {
                                self.collect_hit(&id, &config, &mut seen, &mut hits).await;
                            }
                            Some(_) => {}
                            None => break,
                        }
                    }
                }
            }
        }

        self.active.lock().expect("scan lock poisoned").take();
        if let Err(e) = self.adapter.stop_scan().await {
            debug!("stopping scan after collection failed: {}", e);
        }

        info!("scan complete, {} device(s)", hits.len());
        Ok(hits)
    }

    /// Stop an active scan, delivering whatever has been collected.
    ///
    /// Idempotent: calling with no active scan is a no-op, not an error.
    pub fn stop_scan(&self) {
        if let Some(token) = self.active.lock().expect("scan lock poisoned").take() {
            token.cancel();
        }
    }

    /// Record one discovered peripheral, applying dedup and filters.
    async fn collect_hit(
        &self,
        id: &PeripheralId,
        config: &ScanConfig,
        seen: &mut HashSet<String>,
        hits: &mut Vec<ScanHit>,
    ) {
        let Ok(peripheral) = self.adapter.peripheral(id).await else {
            return;
        };
        let Ok(Some(props)) = peripheral.properties().await else {
            return;
        };

        // Some backends deliver every advertisement regardless of the
        // scan filter; re-check when the advertised service list is known
        if !props.services.is_empty() && !props.services.contains(&HEART_RATE_SERVICE) {
            return;
        }

        let device_id = create_identifier(&props.address.to_string(), id);

        // First occurrence claims the id, even when the prefix filter
        // excludes it; later advertisements never replace it
        if !seen.insert(device_id.clone()) {
            return;
        }

        if !passes_prefix(props.local_name.as_deref(), config.name_prefix.as_deref()) {
            return;
        }

        debug!(device = %device_id, name = ?props.local_name, rssi = ?props.rssi, "heart-rate monitor discovered");
        hits.push(ScanHit {
            device_id,
            name: props.local_name.clone(),
            rssi: props.rssi,
        });
    }
}

impl std::fmt::Debug for HrScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HrScanner").finish_non_exhaustive()
    }
}

/// Apply the name-prefix filter rule.
///
/// No prefix or an empty prefix keeps everything, including unnamed
/// devices; a non-empty prefix requires a name starting with it.
fn passes_prefix(name: Option<&str>, prefix: Option<&str>) -> bool {
    match prefix {
        None => true,
        Some(p) if p.is_empty() => true,
        Some(p) => name.is_some_and(|n| n.starts_with(p)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_config_defaults() {
        let config = ScanConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert!(config.name_prefix.is_none());
    }

    #[test]
    fn test_scan_config_builder() {
        let config = ScanConfig::new().timeout_ms(2500).name_prefix("Polar");
        assert_eq!(config.timeout, Duration::from_millis(2500));
        assert_eq!(config.name_prefix.as_deref(), Some("Polar"));
    }

    #[test]
    fn test_prefix_filter_rules() {
        // No prefix keeps everything
        assert!(passes_prefix(Some("Polar H10"), None));
        assert!(passes_prefix(None, None));

        // Empty prefix keeps everything, including unnamed devices
        assert!(passes_prefix(Some("Polar H10"), Some("")));
        assert!(passes_prefix(None, Some("")));

        // Non-empty prefix requires a matching name
        assert!(passes_prefix(Some("Polar H10"), Some("Polar")));
        assert!(!passes_prefix(Some("Wahoo TICKR"), Some("Polar")));
        assert!(!passes_prefix(None, Some("Polar")));
    }
}
