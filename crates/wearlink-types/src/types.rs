//! Core types for wearable biometric sensor data.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Fixed source tag attached to samples produced by the BLE heart-rate path.
pub const SOURCE_BLE_HRM: &str = "ble_hrm";

/// A device discovered during a BLE heart-rate scan.
///
/// One `ScanHit` is created per unique device per scan session; later
/// advertisements from the same device are dropped, not merged, so the
/// name and signal strength are those of the first observation.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ScanHit {
    /// Opaque device identifier (MAC address or platform UUID).
    pub device_id: String,
    /// Advertised device name, if the advertisement carried one.
    pub name: Option<String>,
    /// Signal strength in dBm at first observation.
    pub rssi: Option<i16>,
}

/// A decoded heart-rate sample, decorated with device identity.
///
/// Produced once per decoded Heart-Rate Measurement notification.
/// Immutable after creation.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HeartRateSample {
    /// Wall-clock timestamp in milliseconds since the Unix epoch.
    pub timestamp_ms: i64,
    /// Heart rate in beats per minute.
    pub bpm: f64,
    /// Source tag, always [`SOURCE_BLE_HRM`] for the BLE path.
    pub source: String,
    /// Identifier of the device that produced the sample.
    pub device_id: String,
    /// Name of the device, empty if unknown.
    pub device_name: String,
    /// Caller-supplied correlation token for the session.
    pub session_id: String,
    /// RR intervals in milliseconds, possibly empty.
    pub rr_intervals_ms: Vec<f64>,
}

/// Category of a vendor fitness device.
///
/// Vendor type codes map to this closed set; codes the table does not
/// know map to [`VendorDeviceKind::Unknown`] rather than a guessed default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[non_exhaustive]
pub enum VendorDeviceKind {
    /// Wrist-worn smartwatch.
    Watch,
    /// Band-style fitness tracker.
    FitnessTracker,
    /// Chest-strap heart-rate sensor.
    ChestStrap,
    /// Unrecognized vendor type code.
    #[default]
    Unknown,
}

impl VendorDeviceKind {
    /// Classify a vendor-reported type code.
    ///
    /// # Examples
    ///
    /// ```
    /// use wearlink_types::VendorDeviceKind;
    ///
    /// assert_eq!(VendorDeviceKind::from_type_code(1), VendorDeviceKind::Watch);
    /// assert_eq!(VendorDeviceKind::from_type_code(0xEE), VendorDeviceKind::Unknown);
    /// ```
    #[must_use]
    pub fn from_type_code(code: u8) -> Self {
        match code {
            1 => VendorDeviceKind::Watch,
            2 => VendorDeviceKind::FitnessTracker,
            3 => VendorDeviceKind::ChestStrap,
            _ => VendorDeviceKind::Unknown,
        }
    }

    /// Wire name used in request/response payloads.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            VendorDeviceKind::Watch => "watch",
            VendorDeviceKind::FitnessTracker => "fitness_tracker",
            VendorDeviceKind::ChestStrap => "chest_strap",
            VendorDeviceKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for VendorDeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection state of a vendor device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[non_exhaustive]
pub enum VendorConnectionState {
    /// Connected and reachable.
    Connected,
    /// Connection attempt in progress.
    Connecting,
    /// Not currently connected.
    #[default]
    Disconnected,
    /// Last connection attempt failed.
    Failed,
}

impl VendorConnectionState {
    /// Wire name used in request/response payloads.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            VendorConnectionState::Connected => "connected",
            VendorConnectionState::Connecting => "connecting",
            VendorConnectionState::Disconnected => "disconnected",
            VendorConnectionState::Failed => "failed",
        }
    }
}

impl fmt::Display for VendorConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A paired vendor fitness device.
///
/// The unit id is the only identity callers are given; it is assigned by
/// the vendor and never changes. The radio address is transient and may
/// be absent until a registry refresh succeeds.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VendorDevice {
    /// Stable vendor-assigned unit identity.
    pub unit_id: u64,
    /// Current radio address, if known. May change across pairings.
    pub address: Option<String>,
    /// Friendly device name.
    pub name: String,
    /// Device category.
    pub kind: VendorDeviceKind,
    /// Last known connection state.
    pub connection_state: VendorConnectionState,
    /// Firmware version, if reported.
    pub firmware_version: Option<String>,
}

/// A vendor device observed during scanning, before pairing.
///
/// Normalized from heterogeneous vendor scan callbacks into one shape.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ScannedVendorDevice {
    /// Transient identifier used to pair the device.
    pub identifier: String,
    /// Friendly name, falling back to the identifier when unnamed.
    pub name: String,
    /// Device category.
    pub kind: VendorDeviceKind,
    /// Signal strength in dBm.
    pub rssi: i16,
}

/// Real-time data types a vendor device can stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[non_exhaustive]
pub enum RealTimeDataType {
    /// Heart rate in beats per minute.
    HeartRate,
    /// Stress score.
    Stress,
    /// Step count.
    Steps,
    /// Heart-rate variability.
    Hrv,
    /// Blood oxygen saturation.
    Spo2,
    /// Respiration rate.
    Respiration,
    /// Raw accelerometer samples.
    Accelerometer,
    /// Body battery energy level.
    BodyBattery,
}

impl RealTimeDataType {
    /// The default streaming set used when a caller does not specify one.
    pub const DEFAULT_SET: &'static [RealTimeDataType] = &[
        RealTimeDataType::HeartRate,
        RealTimeDataType::Stress,
        RealTimeDataType::Steps,
        RealTimeDataType::Hrv,
        RealTimeDataType::Spo2,
        RealTimeDataType::Respiration,
        RealTimeDataType::Accelerometer,
    ];

    /// Parse a wire name into a data type.
    ///
    /// Returns `None` for unknown names so callers can drop them silently
    /// from a requested set instead of rejecting the request.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "heart_rate" | "heartrate" => Some(RealTimeDataType::HeartRate),
            "stress" => Some(RealTimeDataType::Stress),
            "steps" => Some(RealTimeDataType::Steps),
            "hrv" | "heart_rate_variability" => Some(RealTimeDataType::Hrv),
            "spo2" => Some(RealTimeDataType::Spo2),
            "respiration" => Some(RealTimeDataType::Respiration),
            "accelerometer" => Some(RealTimeDataType::Accelerometer),
            "body_battery" => Some(RealTimeDataType::BodyBattery),
            _ => None,
        }
    }

    /// Parse a set of wire names, silently dropping unknown ones.
    #[must_use]
    pub fn parse_set(names: &[String]) -> Vec<Self> {
        let mut types: Vec<Self> = names
            .iter()
            .filter_map(|n| Self::from_name(n))
            .collect();
        types.dedup();
        types
    }
}

/// One accelerometer sample inside a real-time frame.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AccelSample {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Timestamp of the sample in milliseconds since the Unix epoch.
    pub timestamp_ms: i64,
}

/// A normalized real-time frame flattened from a vendor callback payload.
///
/// Every field beyond the timestamp and device id is sparse: a vendor
/// callback carries exactly one data type, so a frame usually has one
/// field set. A frame with no field set is suppressed, never delivered.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RealTimeFrame {
    /// Wall-clock timestamp in milliseconds since the Unix epoch.
    pub timestamp_ms: i64,
    /// Unit id of the originating device, if resolvable.
    pub device_id: Option<u64>,
    /// Heart rate in beats per minute.
    pub heart_rate: Option<u32>,
    /// Stress score.
    pub stress: Option<i32>,
    /// Heart-rate variability in milliseconds.
    pub hrv: Option<u32>,
    /// Beat-to-beat intervals in milliseconds.
    pub bbi_intervals: Option<Vec<u32>>,
    /// Blood oxygen saturation percentage.
    pub spo2: Option<u32>,
    /// Respiration rate in breaths per minute.
    pub respiration: Option<f64>,
    /// Body battery energy level (0-100).
    pub body_battery: Option<u8>,
    /// Cumulative step count.
    pub steps: Option<u64>,
    /// Most recent accelerometer sample.
    pub accelerometer: Option<AccelSample>,
}

impl RealTimeFrame {
    /// Create an empty frame carrying only timestamp and device identity.
    #[must_use]
    pub fn new(timestamp_ms: i64, device_id: Option<u64>) -> Self {
        Self {
            timestamp_ms,
            device_id,
            ..Self::default()
        }
    }

    /// Whether the frame carries at least one field beyond timestamp and
    /// device id. Frames without payload are suppressed at delivery.
    #[must_use]
    pub fn has_payload(&self) -> bool {
        self.heart_rate.is_some()
            || self.stress.is_some()
            || self.hrv.is_some()
            || self.bbi_intervals.is_some()
            || self.spo2.is_some()
            || self.respiration.is_some()
            || self.body_battery.is_some()
            || self.steps.is_some()
            || self.accelerometer.is_some()
    }
}

/// Direction of a device sync operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[non_exhaustive]
pub enum SyncDirection {
    /// Data moving from the device to the host.
    Download,
    /// Data moving from the host to the device.
    Upload,
    /// The sync operation finished.
    Complete,
}

/// Progress update for a device sync operation.
///
/// Progress is monotonically non-decreasing within one sync operation.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SyncProgress {
    /// Fractional progress, 0.0 to 1.0.
    pub progress: f64,
    /// Transfer direction.
    pub direction: SyncDirection,
    /// Unit id of the syncing device.
    pub device_id: u64,
}

/// A WiFi access point visible to a vendor device.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AccessPoint {
    /// Network name.
    pub ssid: String,
    /// Signal strength in dBm.
    pub signal_strength: i16,
    /// Whether the network requires credentials.
    pub is_secured: bool,
}
