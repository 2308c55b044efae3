//! Integration tests for the vendor bridge.
//!
//! These run against [`MockVendorSdk`] and need no hardware or vendor
//! dependency. Stub-mode tests construct the bridge the way a build
//! without the SDK would.

use std::sync::Arc;
use std::time::Duration;

use wearlink_core::mock::MockVendorSdk;
use wearlink_core::sdk::{SdkHandle, VendorCallback};
use wearlink_core::{Error, VendorBridge};
use wearlink_types::{
    AccessPoint, RealTimeDataType, RealTimeFrame, ScannedVendorDevice, SyncDirection,
    SyncProgress, VendorConnectionState, VendorDevice, VendorDeviceKind,
};

fn scanned(identifier: &str) -> ScannedVendorDevice {
    ScannedVendorDevice {
        identifier: identifier.to_string(),
        name: format!("Tracker {}", identifier),
        kind: VendorDeviceKind::FitnessTracker,
        rssi: -55,
    }
}

fn paired(unit_id: u64, address: &str) -> VendorDevice {
    VendorDevice {
        unit_id,
        address: Some(address.to_string()),
        name: format!("Unit {}", unit_id),
        kind: VendorDeviceKind::Watch,
        connection_state: VendorConnectionState::Connected,
        firmware_version: Some("12.30".to_string()),
    }
}

fn linked_bridge() -> (Arc<MockVendorSdk>, VendorBridge) {
    let sdk = Arc::new(MockVendorSdk::new());
    let bridge = VendorBridge::new(SdkHandle::linked(sdk.clone()));
    (sdk, bridge)
}

async fn initialized_bridge() -> (Arc<MockVendorSdk>, VendorBridge) {
    let (sdk, bridge) = linked_bridge();
    assert!(bridge.initialize("license-key").await.unwrap());
    (sdk, bridge)
}

// =============================================================================
// Stub mode
// =============================================================================

#[tokio::test]
async fn test_stub_mode_degrades_gracefully_for_every_operation() {
    let bridge = VendorBridge::probe();

    assert!(!bridge.is_available());
    assert!(!bridge.is_initialized());

    // Operations needing live hardware surface typed errors
    assert!(matches!(
        bridge.initialize("key").await.unwrap_err(),
        Error::SdkNotAvailable
    ));
    assert!(matches!(
        bridge.start_scanning(None, None).await.unwrap_err(),
        Error::NotInitialized
    ));
    assert!(matches!(
        bridge.pair_device("AA:01").await.unwrap_err(),
        Error::NotInitialized
    ));
    assert!(matches!(
        bridge.start_streaming(1, None).await.unwrap_err(),
        Error::NotInitialized
    ));

    // Everything else succeeds or degrades to an empty/None result
    bridge.stop_scanning().await.unwrap();
    bridge.cancel_pairing();
    bridge.forget_device(42, true).await.unwrap();
    bridge.stop_streaming(None).await.unwrap();
    bridge.request_sync(42).await.unwrap();
    assert!(bridge.get_paired_devices().await.unwrap().is_empty());
    assert_eq!(
        bridge.get_connection_state(42).await,
        VendorConnectionState::Disconnected
    );
    assert_eq!(bridge.get_battery_level(42).await.unwrap(), None);
    assert!(bridge.scan_access_points(42).await.unwrap().is_empty());
    bridge.store_access_point(42, "home", "secret").await.unwrap();
    assert!(bridge
        .read_logged_heart_rate(Some(42), 0, 1000)
        .await
        .unwrap()
        .is_empty());

    bridge.dispose().await;
}

// =============================================================================
// Initialization
// =============================================================================

#[tokio::test]
async fn test_initialize_succeeds_and_is_idempotent() {
    let (_sdk, bridge) = linked_bridge();

    assert!(bridge.initialize("license").await.unwrap());
    assert!(bridge.is_initialized());

    // A second call after success is a no-op returning true
    assert!(bridge.initialize("license").await.unwrap());
}

#[tokio::test]
async fn test_concurrent_initialize_is_rejected() {
    let sdk = Arc::new(MockVendorSdk::new());
    sdk.set_init_latency(Duration::from_millis(200));
    let bridge = Arc::new(VendorBridge::new(SdkHandle::linked(sdk.clone())));

    let first = {
        let bridge = Arc::clone(&bridge);
        tokio::spawn(async move { bridge.initialize("license").await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = bridge.initialize("license").await.unwrap_err();
    assert!(matches!(err, Error::InitializationPending));

    // The in-flight call is not disturbed by the rejection
    assert!(first.await.unwrap().unwrap());
    assert!(bridge.is_initialized());
}

#[tokio::test]
async fn test_rejected_license_allows_retry() {
    let (sdk, bridge) = linked_bridge();
    sdk.reject_license(true);

    assert!(!bridge.initialize("bad-license").await.unwrap());
    assert!(!bridge.is_initialized());

    sdk.reject_license(false);
    assert!(bridge.initialize("good-license").await.unwrap());
    assert!(bridge.is_initialized());
}

// =============================================================================
// Scanning and pairing
// =============================================================================

#[tokio::test]
async fn test_scan_results_arrive_on_the_scanned_devices_channel() {
    let (sdk, bridge) = initialized_bridge().await;
    sdk.set_scan_results(vec![scanned("AA:01"), scanned("AA:02")]);

    let mut rx = bridge.events().subscribe_scanned_devices();
    bridge.start_scanning(None, None).await.unwrap();

    let batch = rx.recv().await.unwrap();
    assert_eq!(batch.len(), 2);
    assert_eq!(batch[0].identifier, "AA:01");
    assert_eq!(batch[0].kind, VendorDeviceKind::FitnessTracker);
}

#[tokio::test]
async fn test_restarting_a_scan_stops_the_previous_one() {
    let (sdk, bridge) = initialized_bridge().await;

    bridge.start_scanning(None, None).await.unwrap();
    bridge
        .start_scanning(
            Some(&[VendorDeviceKind::Watch]),
            Some(Duration::from_secs(5)),
        )
        .await
        .unwrap();

    assert_eq!(sdk.scan_count(), 2);
    // Each start implicitly stops whatever scan was running
    assert_eq!(sdk.stop_scan_count(), 2);
}

#[tokio::test]
async fn test_pairing_requires_the_identifier_to_be_scanned() {
    let (sdk, bridge) = initialized_bridge().await;
    sdk.set_scan_results(vec![scanned("AA:01")]);

    // Nothing scanned yet in this session
    let err = bridge.pair_device("AA:01").await.unwrap_err();
    assert!(matches!(err, Error::DeviceNotFound(_)));

    let mut rx = bridge.events().subscribe_scanned_devices();
    bridge.start_scanning(None, None).await.unwrap();
    rx.recv().await.unwrap();

    let device = bridge.pair_device("AA:01").await.unwrap();
    assert_eq!(device.address.as_deref(), Some("AA:01"));

    // Pairing refreshed the registry, so the unit id resolves
    assert_eq!(
        bridge.get_connection_state(device.unit_id).await,
        VendorConnectionState::Connected
    );
}

#[tokio::test]
async fn test_new_scan_session_discards_previous_candidates() {
    let (sdk, bridge) = initialized_bridge().await;
    sdk.set_scan_results(vec![scanned("AA:01")]);

    let mut rx = bridge.events().subscribe_scanned_devices();
    bridge.start_scanning(None, None).await.unwrap();
    rx.recv().await.unwrap();

    // Second scan session reports different devices
    sdk.set_scan_results(vec![scanned("BB:07")]);
    bridge.start_scanning(None, None).await.unwrap();
    rx.recv().await.unwrap();

    let err = bridge.pair_device("AA:01").await.unwrap_err();
    assert!(matches!(err, Error::DeviceNotFound(_)));
    bridge.pair_device("BB:07").await.unwrap();
}

#[tokio::test]
async fn test_cancel_pairing_aborts_before_vendor_confirmation() {
    let (sdk, bridge) = initialized_bridge().await;
    sdk.set_scan_results(vec![scanned("AA:01")]);
    sdk.set_pair_latency(Duration::from_millis(500));

    let mut rx = bridge.events().subscribe_scanned_devices();
    bridge.start_scanning(None, None).await.unwrap();
    rx.recv().await.unwrap();

    let bridge = Arc::new(bridge);
    let pairing = {
        let bridge = Arc::clone(&bridge);
        tokio::spawn(async move { bridge.pair_device("AA:01").await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    bridge.cancel_pairing();

    let err = pairing.await.unwrap().unwrap_err();
    assert!(matches!(err, Error::Cancelled));

    // Cancelling again with nothing pending is a no-op
    bridge.cancel_pairing();
}

// =============================================================================
// Registry-backed operations
// =============================================================================

#[tokio::test]
async fn test_forget_device_with_unknown_unit_is_a_no_op() {
    let (_sdk, bridge) = initialized_bridge().await;
    // Nothing paired: nothing to forget, not an error
    bridge.forget_device(9999, true).await.unwrap();
}

#[tokio::test]
async fn test_forget_device_removes_the_pairing() {
    let (sdk, bridge) = initialized_bridge().await;
    sdk.set_paired_devices(vec![paired(77, "CC:01")]);

    assert_eq!(bridge.get_paired_devices().await.unwrap().len(), 1);
    bridge.forget_device(77, false).await.unwrap();
    assert!(bridge.get_paired_devices().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_battery_level_resolves_through_the_registry() {
    let (sdk, bridge) = initialized_bridge().await;
    sdk.set_paired_devices(vec![paired(77, "CC:01")]);
    sdk.set_battery_level("CC:01", 68);

    assert_eq!(bridge.get_battery_level(77).await.unwrap(), Some(68));
    // Unknown unit degrades to None
    assert_eq!(bridge.get_battery_level(78).await.unwrap(), None);
}

#[tokio::test]
async fn test_request_sync_targets_the_resolved_address() {
    let (sdk, bridge) = initialized_bridge().await;
    sdk.set_paired_devices(vec![paired(77, "CC:01")]);

    bridge.request_sync(77).await.unwrap();
    bridge.request_sync(9999).await.unwrap(); // unresolved, silently skipped

    assert_eq!(sdk.sync_requests(), vec!["CC:01".to_string()]);
}

// =============================================================================
// Real-time streaming
// =============================================================================

#[tokio::test]
async fn test_streaming_uses_the_default_type_set() {
    let (sdk, bridge) = initialized_bridge().await;
    sdk.set_paired_devices(vec![paired(77, "CC:01")]);

    bridge.start_streaming(77, None).await.unwrap();
    assert_eq!(bridge.streaming_unit().await, Some(77));

    let enabled = sdk.enabled_streams();
    assert_eq!(enabled.len(), 1);
    assert_eq!(enabled[0].0, "CC:01");
    assert_eq!(enabled[0].1, RealTimeDataType::DEFAULT_SET.to_vec());
}

#[tokio::test]
async fn test_unknown_type_names_are_silently_dropped() {
    let (sdk, bridge) = initialized_bridge().await;
    sdk.set_paired_devices(vec![paired(77, "CC:01")]);

    let names = vec![
        "heart_rate".to_string(),
        "flux_capacitance".to_string(),
        "spo2".to_string(),
    ];
    bridge.start_streaming(77, Some(&names)).await.unwrap();

    let enabled = sdk.enabled_streams();
    assert_eq!(
        enabled[0].1,
        vec![RealTimeDataType::HeartRate, RealTimeDataType::Spo2]
    );
}

#[tokio::test]
async fn test_all_unknown_type_names_enable_nothing() {
    let (sdk, bridge) = initialized_bridge().await;
    sdk.set_paired_devices(vec![paired(77, "CC:01")]);

    let names = vec!["bogus".to_string()];
    bridge.start_streaming(77, Some(&names)).await.unwrap();

    assert!(sdk.enabled_streams().is_empty());
    assert_eq!(bridge.streaming_unit().await, None);
}

#[tokio::test]
async fn test_starting_a_stream_stops_the_previous_target() {
    let (sdk, bridge) = initialized_bridge().await;
    sdk.set_paired_devices(vec![paired(77, "CC:01"), paired(78, "CC:02")]);

    bridge.start_streaming(77, None).await.unwrap();
    bridge.start_streaming(78, None).await.unwrap();

    let disabled = sdk.disabled_streams();
    assert_eq!(disabled.len(), 1);
    assert_eq!(disabled[0].0, "CC:01");
    assert_eq!(bridge.streaming_unit().await, Some(78));
}

#[tokio::test]
async fn test_stop_streaming_without_unit_stops_the_active_device() {
    let (sdk, bridge) = initialized_bridge().await;
    sdk.set_paired_devices(vec![paired(77, "CC:01")]);

    bridge.start_streaming(77, None).await.unwrap();
    bridge.stop_streaming(None).await.unwrap();
    assert_eq!(bridge.streaming_unit().await, None);
    assert_eq!(sdk.disabled_streams()[0].0, "CC:01");

    // Idempotent with nothing active
    bridge.stop_streaming(None).await.unwrap();
    bridge.stop_streaming(Some(77)).await.unwrap();
    assert_eq!(sdk.disabled_streams().len(), 1);
}

#[tokio::test]
async fn test_empty_frames_are_suppressed_on_the_real_time_channel() {
    let (sdk, bridge) = initialized_bridge().await;
    let mut rx = bridge.events().subscribe_real_time();

    // Only timestamp and device id: never delivered
    sdk.emit(VendorCallback::RealTime(RealTimeFrame::new(1_000, Some(77))));

    let mut with_steps = RealTimeFrame::new(2_000, Some(77));
    with_steps.steps = Some(431);
    sdk.emit(VendorCallback::RealTime(with_steps));

    // Delivery is serialized: if the empty frame had passed it would
    // have arrived first
    let frame = rx.recv().await.unwrap();
    assert_eq!(frame.timestamp_ms, 2_000);
    assert_eq!(frame.steps, Some(431));
    assert!(rx.try_recv().is_err());
}

// =============================================================================
// Event channels
// =============================================================================

#[tokio::test]
async fn test_connection_events_pass_through_in_order() {
    let (sdk, bridge) = initialized_bridge().await;
    let mut rx = bridge.events().subscribe_connection_state();

    for (state, error) in [
        (VendorConnectionState::Connecting, None),
        (VendorConnectionState::Connected, None),
        (
            VendorConnectionState::Failed,
            Some("PAIRING_TIMEOUT".to_string()),
        ),
    ] {
        sdk.emit(VendorCallback::Connection(wearlink_core::ConnectionEvent {
            state,
            device_id: Some(77),
            error,
            timestamp_ms: 1_000,
        }));
    }

    assert_eq!(rx.recv().await.unwrap().state, VendorConnectionState::Connecting);
    assert_eq!(rx.recv().await.unwrap().state, VendorConnectionState::Connected);
    let failed = rx.recv().await.unwrap();
    assert_eq!(failed.state, VendorConnectionState::Failed);
    assert_eq!(failed.error.as_deref(), Some("PAIRING_TIMEOUT"));
}

#[tokio::test]
async fn test_sync_progress_is_pushed_never_returned() {
    let (sdk, bridge) = initialized_bridge().await;
    let mut rx = bridge.events().subscribe_sync_progress();

    for (progress, direction) in [
        (0.25, SyncDirection::Download),
        (1.0, SyncDirection::Complete),
    ] {
        sdk.emit(VendorCallback::SyncProgress(SyncProgress {
            progress,
            direction,
            device_id: 77,
        }));
    }

    assert_eq!(rx.recv().await.unwrap().progress, 0.25);
    let done = rx.recv().await.unwrap();
    assert_eq!(done.progress, 1.0);
    assert_eq!(done.direction, SyncDirection::Complete);
}

#[tokio::test]
async fn test_a_new_subscriber_replaces_the_previous_one() {
    let (sdk, bridge) = initialized_bridge().await;

    let mut first = bridge.events().subscribe_real_time();
    let mut second = bridge.events().subscribe_real_time();

    let mut frame = RealTimeFrame::new(1_000, Some(77));
    frame.heart_rate = Some(64);
    sdk.emit(VendorCallback::RealTime(frame));

    assert_eq!(second.recv().await.unwrap().heart_rate, Some(64));
    // The replaced subscriber's stream ends
    assert_eq!(first.recv().await, None);
}

// =============================================================================
// WiFi provisioning and logged reads
// =============================================================================

#[tokio::test]
async fn test_wifi_operations_resolve_through_the_registry() {
    let (sdk, bridge) = initialized_bridge().await;
    sdk.set_paired_devices(vec![paired(77, "CC:01")]);
    sdk.set_access_points(vec![AccessPoint {
        ssid: "home".to_string(),
        signal_strength: -48,
        is_secured: true,
    }]);

    let points = bridge.scan_access_points(77).await.unwrap();
    assert_eq!(points.len(), 1);
    assert!(points[0].is_secured);
    // Unresolved unit degrades to empty
    assert!(bridge.scan_access_points(9999).await.unwrap().is_empty());

    bridge.store_access_point(77, "home", "hunter2").await.unwrap();
    assert_eq!(
        sdk.stored_access_points(),
        vec![(
            "CC:01".to_string(),
            "home".to_string(),
            "hunter2".to_string()
        )]
    );

    // Storing against an unknown unit is an error, unlike the scan
    let err = bridge
        .store_access_point(9999, "home", "hunter2")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DeviceNotFound(_)));

    let err = bridge.store_access_point(77, "", "pw").await.unwrap_err();
    assert!(matches!(err, Error::InvalidArguments(_)));
}

#[tokio::test]
async fn test_logged_reads_return_empty_after_validation() {
    let (_sdk, bridge) = initialized_bridge().await;

    assert!(bridge
        .read_logged_heart_rate(Some(77), 0, 86_400_000)
        .await
        .unwrap()
        .is_empty());
    assert!(bridge
        .read_wellness_epochs(0, 86_400_000)
        .await
        .unwrap()
        .is_empty());
    assert!(bridge
        .read_sleep_sessions(0, 86_400_000)
        .await
        .unwrap()
        .is_empty());

    let err = bridge
        .read_logged_stress(None, 1_000, 500)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArguments(_)));
}

// =============================================================================
// Disposal
// =============================================================================

#[tokio::test]
async fn test_dispose_detaches_and_stops_delivery() {
    let (sdk, bridge) = initialized_bridge().await;
    sdk.set_paired_devices(vec![paired(77, "CC:01")]);
    bridge.start_streaming(77, None).await.unwrap();

    bridge.dispose().await;
    assert!(sdk.is_detached());
    // Streaming was torn down on the way out
    assert_eq!(sdk.disabled_streams().len(), 1);

    // Dispose is idempotent
    bridge.dispose().await;
}
