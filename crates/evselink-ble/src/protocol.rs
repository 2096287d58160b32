//! GATT identifiers of the wallbox's serial-over-BLE service

use uuid::Uuid;

// ----------------------------------------------------------------------------
// BLE Service and Characteristic UUIDs
// ----------------------------------------------------------------------------

/// Wallbox serial service UUID
pub const EVSE_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000FFF0_0000_1000_8000_00805F9B34FB);

/// Characteristic the wallbox notifies inbound frames on
pub const EVSE_NOTIFY_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x0000FFF1_0000_1000_8000_00805F9B34FB);

/// Characteristic outbound frames are written to
pub const EVSE_WRITE_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x0000FFF2_0000_1000_8000_00805F9B34FB);
