//! Bluetooth UUIDs for the Aranet4.
//!
//! This module contains every UUID the client needs to talk to an Aranet4
//! over Bluetooth Low Energy. Which of them apply to a given device is decided
//! by the capability profile resolved from its firmware revision.

use uuid::{Uuid, uuid};

// --- Saf Tehnika (Aranet) Service UUIDs ---

/// Saf Tehnika custom service UUID for firmware v1.2.0 and newer.
pub const SAF_TEHNIKA_SERVICE_NEW: Uuid = uuid!("0000fce0-0000-1000-8000-00805f9b34fb");

/// Saf Tehnika custom service UUID for firmware versions before v1.2.0.
pub const SAF_TEHNIKA_SERVICE_OLD: Uuid = uuid!("f0cd1400-95da-4f4b-9ac8-aa55d312af0c");

// --- Aranet4 Characteristic UUIDs ---

/// Current reading, sensor values only.
pub const CURRENT_READING_SIMPLE: Uuid = uuid!("f0cd1503-95da-4f4b-9ac8-aa55d312af0c");

/// Current reading including status light, interval and elapsed time.
pub const CURRENT_READING_FULL: Uuid = uuid!("f0cd3001-95da-4f4b-9ac8-aa55d312af0c");

/// Number of readings stored in the device log.
pub const STORED_READINGS: Uuid = uuid!("f0cd2001-95da-4f4b-9ac8-aa55d312af0c");

/// Measurement interval in seconds.
pub const UPDATE_INTERVAL: Uuid = uuid!("f0cd2002-95da-4f4b-9ac8-aa55d312af0c");

/// History pages arrive as notifications on this characteristic.
pub const HISTORY_DATA: Uuid = uuid!("f0cd2003-95da-4f4b-9ac8-aa55d312af0c");

/// Seconds since the last measurement.
pub const SECONDS_SINCE_UPDATE: Uuid = uuid!("f0cd2004-95da-4f4b-9ac8-aa55d312af0c");

/// Command characteristic, used to request history ranges.
pub const HISTORY_COMMAND: Uuid = uuid!("f0cd1402-95da-4f4b-9ac8-aa55d312af0c");

// --- Standard BLE Characteristic UUIDs ---

/// Device name characteristic (GAP).
pub const DEVICE_NAME: Uuid = uuid!("00002a00-0000-1000-8000-00805f9b34fb");

/// Model number string characteristic.
pub const MODEL_NUMBER: Uuid = uuid!("00002a24-0000-1000-8000-00805f9b34fb");

/// Serial number string characteristic.
pub const SERIAL_NUMBER: Uuid = uuid!("00002a25-0000-1000-8000-00805f9b34fb");

/// Hardware revision string characteristic.
pub const HARDWARE_REVISION: Uuid = uuid!("00002a27-0000-1000-8000-00805f9b34fb");

/// Software revision string characteristic. The Aranet4 reports its
/// firmware version here.
pub const SOFTWARE_REVISION: Uuid = uuid!("00002a28-0000-1000-8000-00805f9b34fb");

/// Manufacturer name string characteristic.
pub const MANUFACTURER_NAME: Uuid = uuid!("00002a29-0000-1000-8000-00805f9b34fb");

/// Battery level characteristic.
pub const BATTERY_LEVEL: Uuid = uuid!("00002a19-0000-1000-8000-00805f9b34fb");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_uuids() {
        assert_eq!(
            SAF_TEHNIKA_SERVICE_NEW.to_string(),
            "0000fce0-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(
            SAF_TEHNIKA_SERVICE_OLD.to_string(),
            "f0cd1400-95da-4f4b-9ac8-aa55d312af0c"
        );
    }

    #[test]
    fn test_aranet_characteristics_share_base() {
        // All custom characteristics share the Saf Tehnika base UUID.
        for uuid in [
            CURRENT_READING_SIMPLE,
            CURRENT_READING_FULL,
            STORED_READINGS,
            UPDATE_INTERVAL,
            HISTORY_DATA,
            SECONDS_SINCE_UPDATE,
            HISTORY_COMMAND,
        ] {
            assert!(uuid.to_string().starts_with("f0cd"));
            assert!(uuid.to_string().ends_with("-95da-4f4b-9ac8-aa55d312af0c"));
        }
    }

    #[test]
    fn test_standard_characteristics_use_sig_base() {
        for uuid in [
            DEVICE_NAME,
            MODEL_NUMBER,
            SERIAL_NUMBER,
            HARDWARE_REVISION,
            SOFTWARE_REVISION,
            MANUFACTURER_NAME,
            BATTERY_LEVEL,
        ] {
            assert!(uuid.to_string().ends_with("-0000-1000-8000-00805f9b34fb"));
        }
    }

    #[test]
    fn test_history_characteristics() {
        assert_eq!(
            HISTORY_COMMAND.to_string(),
            "f0cd1402-95da-4f4b-9ac8-aa55d312af0c"
        );
        assert_eq!(
            HISTORY_DATA.to_string(),
            "f0cd2003-95da-4f4b-9ac8-aa55d312af0c"
        );
    }
}
