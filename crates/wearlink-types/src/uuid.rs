//! Bluetooth UUIDs for the standard heart-rate profile.
//!
//! This module contains the UUIDs needed to discover and subscribe to
//! heart-rate monitors over Bluetooth Low Energy.

use uuid::{Uuid, uuid};

// --- Heart Rate Profile UUIDs ---

/// Heart Rate service (0x180D).
pub const HEART_RATE_SERVICE: Uuid = uuid!("0000180d-0000-1000-8000-00805f9b34fb");

/// Heart Rate Measurement characteristic (0x2A37), notification-based.
pub const HEART_RATE_MEASUREMENT: Uuid = uuid!("00002a37-0000-1000-8000-00805f9b34fb");

/// Body Sensor Location characteristic (0x2A38).
pub const BODY_SENSOR_LOCATION: Uuid = uuid!("00002a38-0000-1000-8000-00805f9b34fb");

/// Client Characteristic Configuration descriptor (0x2902), written to
/// enable notifications on the measurement characteristic.
pub const CLIENT_CHARACTERISTIC_CONFIG: Uuid = uuid!("00002902-0000-1000-8000-00805f9b34fb");

// --- Standard BLE Service UUIDs ---

/// Generic Access Profile (GAP) service.
pub const GAP_SERVICE: Uuid = uuid!("00001800-0000-1000-8000-00805f9b34fb");

/// Device Information service.
pub const DEVICE_INFO_SERVICE: Uuid = uuid!("0000180a-0000-1000-8000-00805f9b34fb");

/// Battery service.
pub const BATTERY_SERVICE: Uuid = uuid!("0000180f-0000-1000-8000-00805f9b34fb");

// --- Characteristic UUIDs ---

/// Device name characteristic.
pub const DEVICE_NAME: Uuid = uuid!("00002a00-0000-1000-8000-00805f9b34fb");

/// Battery level characteristic.
pub const BATTERY_LEVEL: Uuid = uuid!("00002a19-0000-1000-8000-00805f9b34fb");
