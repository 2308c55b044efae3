//! Paired vendor device registry.
//!
//! Maintains the unit-id to radio-address mapping. Unit ids are the only
//! identity callers hold; addresses are transient and resolved on demand.
//! The cache is lazily repopulated from the vendor SDK's paired-device
//! list whenever a resolve misses; the registry never polls in the
//! background. It is only ever replaced wholesale, never incrementally
//! mutated, so concurrent readers can't observe a partial update.

use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::debug;

use crate::error::Result;
use crate::sdk::SdkHandle;
use wearlink_types::VendorDevice;

/// Cache of paired vendor devices, keyed by unit id.
#[derive(Debug, Default)]
pub struct VendorDeviceRegistry {
    devices: RwLock<HashMap<u64, VendorDevice>>,
}

impl VendorDeviceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a unit id to its current radio address.
    ///
    /// Checks the cache first; on a miss (unknown unit id or a cached
    /// entry without an address) refreshes from the SDK's paired list
    /// and looks again. Returns `None` when the SDK is absent, the
    /// refresh fails, or the device is simply not paired.
    pub async fn resolve(&self, sdk: &SdkHandle, unit_id: u64) -> Option<String> {
        if let Some(address) = self.cached_address(unit_id).await {
            return Some(address);
        }

        if self.refresh(sdk).await.is_err() {
            return None;
        }
        self.cached_address(unit_id).await
    }

    /// Look up a cached address without refreshing.
    async fn cached_address(&self, unit_id: u64) -> Option<String> {
        self.devices
            .read()
            .await
            .get(&unit_id)
            .and_then(|d| d.address.clone())
    }

    /// Repopulate the cache from the SDK's paired-device list.
    ///
    /// The cache is swapped wholesale: a failed listing leaves the
    /// previous contents untouched. With no linked SDK the cache is
    /// cleared, matching an empty paired list.
    pub async fn refresh(&self, sdk: &SdkHandle) -> Result<Vec<VendorDevice>> {
        let listed = match sdk.sdk() {
            Some(sdk) => sdk.paired_devices().await?,
            None => Vec::new(),
        };

        debug!(count = listed.len(), "refreshed paired device registry");

        let rebuilt: HashMap<u64, VendorDevice> =
            listed.iter().map(|d| (d.unit_id, d.clone())).collect();
        *self.devices.write().await = rebuilt;

        Ok(listed)
    }

    /// Get a cached device by unit id.
    pub async fn get(&self, unit_id: u64) -> Option<VendorDevice> {
        self.devices.read().await.get(&unit_id).cloned()
    }

    /// Snapshot of all cached devices.
    pub async fn snapshot(&self) -> Vec<VendorDevice> {
        self.devices.read().await.values().cloned().collect()
    }

    /// Number of cached devices.
    pub async fn len(&self) -> usize {
        self.devices.read().await.len()
    }

    /// Whether the cache is empty.
    pub async fn is_empty(&self) -> bool {
        self.devices.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wearlink_types::{VendorConnectionState, VendorDeviceKind};

    fn device(unit_id: u64, address: Option<&str>) -> VendorDevice {
        VendorDevice {
            unit_id,
            address: address.map(str::to_string),
            name: format!("Unit {}", unit_id),
            kind: VendorDeviceKind::Watch,
            connection_state: VendorConnectionState::Disconnected,
            firmware_version: None,
        }
    }

    #[tokio::test]
    async fn test_resolve_without_sdk_is_none() {
        let registry = VendorDeviceRegistry::new();
        assert_eq!(registry.resolve(&SdkHandle::Stub, 42).await, None);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_refresh_replaces_wholesale() {
        let registry = VendorDeviceRegistry::new();

        // Seed the cache via a stub refresh path by writing directly
        {
            let mut guard = registry.devices.write().await;
            guard.insert(1, device(1, Some("AA:00")));
            guard.insert(2, device(2, Some("BB:00")));
        }
        assert_eq!(registry.len().await, 2);

        // A stub refresh lists nothing; stale entries must not survive
        registry.refresh(&SdkHandle::Stub).await.unwrap();
        assert!(registry.is_empty().await);
        assert_eq!(registry.get(1).await, None);
    }

    #[tokio::test]
    async fn test_cached_address_skips_refresh() {
        let registry = VendorDeviceRegistry::new();
        {
            let mut guard = registry.devices.write().await;
            guard.insert(7, device(7, Some("CC:11")));
        }

        // Stub SDK would clear the cache if a refresh ran; a cache hit
        // must return without touching it
        assert_eq!(
            registry.resolve(&SdkHandle::Stub, 7).await,
            Some("CC:11".to_string())
        );
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_entry_without_address_counts_as_miss() {
        let registry = VendorDeviceRegistry::new();
        {
            let mut guard = registry.devices.write().await;
            guard.insert(9, device(9, None));
        }

        // Address absent: resolve refreshes (stub lists nothing) and misses
        assert_eq!(registry.resolve(&SdkHandle::Stub, 9).await, None);
    }
}
