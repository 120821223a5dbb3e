//! Platform-agnostic types for the Aranet4 CO2 meter.
//!
//! This crate holds everything about the Aranet4 that does not need a
//! Bluetooth stack: the data model returned to callers, the GATT
//! characteristic UUIDs, and the decoders for the fixed byte layouts the
//! device uses. [`aranet4-core`](https://docs.rs/aranet4-core) builds the
//! BLE session on top of it.
//!
//! # Example
//!
//! ```
//! use aranet4_types::{CurrentLayout, CurrentReadings, Sensor};
//! use time::OffsetDateTime;
//!
//! let bytes = [0xFF, 0x01, 0xFA, 0x01, 0x94, 0x27, 45, 90];
//! let now = OffsetDateTime::now_utc();
//! let current = CurrentReadings::decode(CurrentLayout::Simple, &bytes, now)?;
//! assert_eq!(current.reading.value(Sensor::Co2), Some(511.0));
//! assert_eq!(current.reading.value(Sensor::Temperature), Some(25.3));
//! # Ok::<(), aranet4_types::ParseError>(())
//! ```

pub mod error;
pub mod layout;
pub mod types;
pub mod uuid;

pub use error::{ParseError, ParseResult};
pub use layout::{CurrentLayout, HistoryCommand, HistoryPage, RawCurrent};
pub use types::{
    CurrentReadings, DeviceIdentity, DeviceStatus, HistoryEnd, HistoryRange, Reading, Sensor,
    SensorValue, Status,
};
pub use uuid as uuids;

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use time::OffsetDateTime;

    // --- Decoding tests ---

    #[test]
    fn test_co2_and_temperature_example() {
        // CO2 0x01FF = 511 ppm, temperature 0x01FA = 506 -> 25.30 °C
        let bytes: [u8; 13] = [
            0xFF, 0x01, // CO2
            0xFA, 0x01, // temperature
            0x94, 0x27, // pressure = 10132 -> 1013.2 hPa
            45,   // humidity
            85,   // battery
            2,    // status = Yellow
            0x3C, 0x00, // interval = 60
            0x0A, 0x00, // elapsed = 10
        ];

        let current = CurrentReadings::decode(
            CurrentLayout::Full,
            &bytes,
            OffsetDateTime::UNIX_EPOCH + time::Duration::hours(1),
        )
        .unwrap();

        assert_eq!(current.reading.co2(), Some(511.0));
        assert_eq!(current.reading.temperature(), Some(25.3));
        assert_eq!(current.reading.pressure(), Some(1013.2));
        assert_eq!(current.reading.humidity(), Some(45.0));
        assert_eq!(current.battery, 85);
        assert_eq!(current.status, Some(Status::Yellow));
        assert_eq!(current.interval, Some(60));
        assert_eq!(current.elapsed, Some(10));
        assert_eq!(current.reading.timestamp.unix_timestamp(), 3600 - 10);
    }

    #[test]
    fn test_insufficient_bytes_message() {
        let err = CurrentReadings::decode(CurrentLayout::Full, &[0; 5], OffsetDateTime::UNIX_EPOCH)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "full current reading requires 13 bytes, got 5"
        );
    }

    #[test]
    fn test_sensor_wire_ids_round_trip() {
        for sensor in Sensor::ALL {
            assert_eq!(Sensor::from_wire_id(sensor.wire_id()).unwrap(), sensor);
        }
        assert_eq!(Sensor::from_wire_id(0), Err(ParseError::UnknownSensor(0)));
    }

    #[test]
    fn test_status_from_u8() {
        assert_eq!(Status::from(0), Status::Error);
        assert_eq!(Status::from(1), Status::Green);
        assert_eq!(Status::from(2), Status::Yellow);
        assert_eq!(Status::from(3), Status::Red);
        assert_eq!(Status::from(200), Status::Error);
    }

    // --- HistoryRange tests ---

    #[test]
    fn test_history_range_defaults() {
        let range = HistoryRange::default();
        assert_eq!(range, HistoryRange::all());
        assert_eq!(
            range.sensors.iter().copied().collect::<Vec<_>>(),
            Sensor::ALL.to_vec()
        );
    }

    #[test]
    fn test_history_range_deduplicates_sensors() {
        let range = HistoryRange::new([Sensor::Pressure, Sensor::Co2, Sensor::Pressure]);
        assert_eq!(
            range.sensors.into_iter().collect::<Vec<_>>(),
            vec![Sensor::Co2, Sensor::Pressure]
        );
    }

    // --- Serialization tests ---

    #[cfg(feature = "serde")]
    #[test]
    fn test_reading_serializes_sensor_keys() {
        let reading = Reading::historical(3, OffsetDateTime::UNIX_EPOCH)
            .with_value(Sensor::Co2, SensorValue::Measured(612.0))
            .with_value(Sensor::Humidity, SensorValue::Unavailable);

        let json = serde_json::to_value(&reading).unwrap();
        assert_eq!(json["index"], 3);
        assert_eq!(json["values"]["Co2"]["Measured"], 612.0);
        assert_eq!(json["values"]["Humidity"], "Unavailable");

        let back: Reading = serde_json::from_value(json).unwrap();
        assert_eq!(back, reading);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_current_reading_skips_absent_fields() {
        let raw = RawCurrent {
            co2: 400,
            temperature: 400,
            pressure: 10000,
            humidity: 40,
            battery: 99,
            ..Default::default()
        };
        let current = raw.into_readings(OffsetDateTime::UNIX_EPOCH);
        let json = serde_json::to_value(&current).unwrap();
        assert!(json.get("status").is_none());
        assert!(json.get("interval").is_none());
        assert!(json["reading"].get("index").is_none());
    }

    // --- Round-trip properties ---

    fn raw_full() -> impl Strategy<Value = RawCurrent> {
        (
            any::<u16>(),
            any::<u16>(),
            any::<u16>(),
            any::<u8>(),
            any::<u8>(),
            any::<u8>(),
            any::<u16>(),
            any::<u16>(),
        )
            .prop_map(
                |(co2, temperature, pressure, humidity, battery, status, interval, elapsed)| {
                    RawCurrent {
                        co2,
                        temperature,
                        pressure,
                        humidity,
                        battery,
                        status: Some(status),
                        interval: Some(interval),
                        elapsed: Some(elapsed),
                    }
                },
            )
    }

    proptest! {
        #[test]
        fn full_layout_round_trips(raw in raw_full()) {
            let bytes = raw.to_bytes(CurrentLayout::Full);
            prop_assert_eq!(bytes.len(), 13);
            prop_assert_eq!(RawCurrent::from_bytes(CurrentLayout::Full, &bytes).unwrap(), raw);
        }

        #[test]
        fn simple_layout_round_trips(raw in raw_full()) {
            let simple = RawCurrent { status: None, interval: None, elapsed: None, ..raw };
            let bytes = simple.to_bytes(CurrentLayout::Simple);
            prop_assert_eq!(bytes.len(), 8);
            prop_assert_eq!(RawCurrent::from_bytes(CurrentLayout::Simple, &bytes).unwrap(), simple);
        }

        #[test]
        fn decoded_fields_match_scaling(
            co2 in 0u16..0x8000,
            temp in 0u16..0x4000,
            pressure in 0u16..0x8000,
            humidity in 0u8..0x80,
        ) {
            let raw = RawCurrent {
                co2,
                temperature: temp,
                pressure,
                humidity,
                battery: 50,
                ..Default::default()
            };
            let bytes = raw.to_bytes(CurrentLayout::Simple);
            let current =
                CurrentReadings::decode(CurrentLayout::Simple, &bytes, OffsetDateTime::UNIX_EPOCH)
                    .unwrap();
            prop_assert_eq!(current.reading.co2(), Some(f64::from(co2)));
            prop_assert_eq!(current.reading.temperature(), Some(f64::from(temp) / 20.0));
            prop_assert_eq!(current.reading.pressure(), Some(f64::from(pressure) / 10.0));
            prop_assert_eq!(current.reading.humidity(), Some(f64::from(humidity)));
        }

        #[test]
        fn history_command_round_trips(id in 1u8..=4, start in any::<u16>(), end in any::<u16>()) {
            let cmd = HistoryCommand { sensor: Sensor::from_wire_id(id).unwrap(), start, end };
            prop_assert_eq!(HistoryCommand::decode(&cmd.encode()).unwrap(), cmd);
        }

        #[test]
        fn history_page_round_trips(
            id in 1u8..=4,
            first in any::<u16>(),
            values in proptest::collection::vec(any::<u8>(), 0..60),
        ) {
            let sensor = Sensor::from_wire_id(id).unwrap();
            let scale = if sensor == Sensor::Humidity { 1 } else { 7 };
            let page = HistoryPage {
                sensor,
                first_index: first,
                values: values.iter().map(|v| u16::from(*v) * scale).collect(),
            };
            prop_assert_eq!(HistoryPage::decode(&page.encode()).unwrap(), page);
        }
    }
}
