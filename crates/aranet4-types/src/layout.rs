//! Byte layouts of the Aranet4 GATT payloads.
//!
//! Every payload is little-endian with fixed offsets. Decoding is
//! all-or-nothing: a buffer shorter than its layout requires is rejected
//! before any field is read.

use bytes::{Buf, BufMut};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::error::{ParseError, ParseResult};
use crate::types::{CurrentReadings, Reading, Sensor, SensorValue, Status};

/// Minimum number of bytes of the full current-reading layout.
pub const FULL_READING_BYTES: usize = 13;

/// Minimum number of bytes of the simple current-reading layout.
pub const SIMPLE_READING_BYTES: usize = 8;

/// Opcode of the history request written to the command characteristic.
pub const HISTORY_REQUEST: u8 = 0x82;

/// Length of a history command record.
pub const HISTORY_COMMAND_BYTES: usize = 8;

/// Length of the header preceding the values of a history page.
pub const HISTORY_PAGE_HEADER_BYTES: usize = 4;

/// Layout version of a current-reading characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CurrentLayout {
    /// CO2, temperature, pressure, humidity, battery, status light,
    /// interval and elapsed seconds.
    Full,
    /// CO2, temperature, pressure, humidity and battery only.
    Simple,
}

impl CurrentLayout {
    /// Minimum buffer length this layout decodes from.
    #[must_use]
    pub const fn min_len(self) -> usize {
        match self {
            CurrentLayout::Full => FULL_READING_BYTES,
            CurrentLayout::Simple => SIMPLE_READING_BYTES,
        }
    }

    const fn name(self) -> &'static str {
        match self {
            CurrentLayout::Full => "full current reading",
            CurrentLayout::Simple => "simple current reading",
        }
    }
}

/// Undecoded fields of a current-reading payload.
///
/// `status`, `interval` and `elapsed` are only present in the full layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawCurrent {
    pub co2: u16,
    pub temperature: u16,
    pub pressure: u16,
    pub humidity: u8,
    pub battery: u8,
    pub status: Option<u8>,
    pub interval: Option<u16>,
    pub elapsed: Option<u16>,
}

impl RawCurrent {
    /// Split a payload into its raw fields. Bytes past the layout are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InsufficientBytes`] if `data` is shorter than
    /// [`CurrentLayout::min_len`].
    pub fn from_bytes(layout: CurrentLayout, data: &[u8]) -> ParseResult<Self> {
        if data.len() < layout.min_len() {
            return Err(ParseError::insufficient(
                layout.name(),
                layout.min_len(),
                data.len(),
            ));
        }

        let mut buf = data;
        let mut raw = RawCurrent {
            co2: buf.get_u16_le(),
            temperature: buf.get_u16_le(),
            pressure: buf.get_u16_le(),
            humidity: buf.get_u8(),
            battery: buf.get_u8(),
            ..Default::default()
        };

        if layout == CurrentLayout::Full {
            raw.status = Some(buf.get_u8());
            raw.interval = Some(buf.get_u16_le());
            raw.elapsed = Some(buf.get_u16_le());
        }

        Ok(raw)
    }

    /// Serialize into `layout`. Fields the layout does not carry are skipped;
    /// missing full-layout fields are written as zero.
    #[must_use]
    pub fn to_bytes(&self, layout: CurrentLayout) -> Vec<u8> {
        let mut out = Vec::with_capacity(layout.min_len());
        out.put_u16_le(self.co2);
        out.put_u16_le(self.temperature);
        out.put_u16_le(self.pressure);
        out.put_u8(self.humidity);
        out.put_u8(self.battery);
        if layout == CurrentLayout::Full {
            out.put_u8(self.status.unwrap_or_default());
            out.put_u16_le(self.interval.unwrap_or_default());
            out.put_u16_le(self.elapsed.unwrap_or_default());
        }
        out
    }

    /// Convert to typed values. `read_at` is when the payload was read; the
    /// reading is timestamped `read_at - elapsed` when elapsed is known.
    #[must_use]
    pub fn into_readings(self, read_at: OffsetDateTime) -> CurrentReadings {
        let timestamp = read_at - Duration::seconds(i64::from(self.elapsed.unwrap_or(0)));
        let reading = Reading::current(timestamp)
            .with_value(Sensor::Co2, Sensor::Co2.decode_raw(self.co2))
            .with_value(
                Sensor::Temperature,
                Sensor::Temperature.decode_raw(self.temperature),
            )
            .with_value(
                Sensor::Humidity,
                Sensor::Humidity.decode_raw(u16::from(self.humidity)),
            )
            .with_value(Sensor::Pressure, Sensor::Pressure.decode_raw(self.pressure));

        CurrentReadings {
            reading,
            battery: self.battery,
            status: self.status.map(Status::from),
            interval: self.interval,
            elapsed: self.elapsed,
        }
    }
}

impl CurrentReadings {
    /// Decode a current-reading payload.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InsufficientBytes`] if `data` is shorter than the
    /// layout requires.
    pub fn decode(
        layout: CurrentLayout,
        data: &[u8],
        read_at: OffsetDateTime,
    ) -> ParseResult<Self> {
        RawCurrent::from_bytes(layout, data).map(|raw| raw.into_readings(read_at))
    }
}

/// Decode a single-byte characteristic such as the battery level.
pub fn decode_u8(what: &'static str, data: &[u8]) -> ParseResult<u8> {
    data.first()
        .copied()
        .ok_or_else(|| ParseError::insufficient(what, 1, 0))
}

/// Decode a little-endian u16 characteristic (stored count, interval, elapsed).
pub fn decode_u16(what: &'static str, data: &[u8]) -> ParseResult<u16> {
    if data.len() < 2 {
        return Err(ParseError::insufficient(what, 2, data.len()));
    }
    let mut buf = data;
    Ok(buf.get_u16_le())
}

/// Decode a device-information string, dropping NUL padding and whitespace.
#[must_use]
pub fn decode_string(data: &[u8]) -> String {
    String::from_utf8_lossy(data)
        .trim_end_matches('\0')
        .trim()
        .to_string()
}

/// A request for one sensor's values over an inclusive index range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryCommand {
    pub sensor: Sensor,
    pub start: u16,
    pub end: u16,
}

impl HistoryCommand {
    /// Wire form: `[0x82, selector, 0, 0, start u16, end u16]`.
    ///
    /// ```
    /// use aranet4_types::{HistoryCommand, Sensor};
    ///
    /// let cmd = HistoryCommand { sensor: Sensor::Co2, start: 1, end: 0x0102 };
    /// assert_eq!(cmd.encode(), [0x82, 0x04, 0x00, 0x00, 0x01, 0x00, 0x02, 0x01]);
    /// ```
    #[must_use]
    pub fn encode(&self) -> [u8; HISTORY_COMMAND_BYTES] {
        let start = self.start.to_le_bytes();
        let end = self.end.to_le_bytes();
        [
            HISTORY_REQUEST,
            self.sensor.wire_id(),
            0x00,
            0x00,
            start[0],
            start[1],
            end[0],
            end[1],
        ]
    }

    /// Parse a command record.
    ///
    /// # Errors
    ///
    /// Fails if the record is too short, carries another opcode or names an
    /// unknown sensor.
    pub fn decode(data: &[u8]) -> ParseResult<Self> {
        if data.len() < HISTORY_COMMAND_BYTES {
            return Err(ParseError::insufficient(
                "history command",
                HISTORY_COMMAND_BYTES,
                data.len(),
            ));
        }
        let mut buf = data;
        let opcode = buf.get_u8();
        if opcode != HISTORY_REQUEST {
            return Err(ParseError::InvalidValue(format!(
                "unexpected command opcode 0x{opcode:02X}"
            )));
        }
        let sensor = Sensor::from_wire_id(buf.get_u8())?;
        buf.advance(2);
        Ok(Self {
            sensor,
            start: buf.get_u16_le(),
            end: buf.get_u16_le(),
        })
    }
}

/// One notification of a history transfer.
///
/// Wire form: `[selector u8, first_index u16, count u8, count × value]`.
/// Humidity values are one byte wide, all others two. Trailing bytes past
/// `count` values are padding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryPage {
    pub sensor: Sensor,
    /// Log index of the first value in this page.
    pub first_index: u16,
    /// Raw values, decoded with [`Sensor::decode_raw`].
    pub values: Vec<u16>,
}

impl HistoryPage {
    /// Parse a notification payload.
    ///
    /// # Errors
    ///
    /// Fails on a short header, an unknown selector, or a body holding fewer
    /// than `count` values.
    pub fn decode(data: &[u8]) -> ParseResult<Self> {
        if data.len() < HISTORY_PAGE_HEADER_BYTES {
            return Err(ParseError::insufficient(
                "history page header",
                HISTORY_PAGE_HEADER_BYTES,
                data.len(),
            ));
        }

        let mut buf = data;
        let sensor = Sensor::from_wire_id(buf.get_u8())?;
        let first_index = buf.get_u16_le();
        let count = usize::from(buf.get_u8());

        let width = sensor.field_width();
        let needed = HISTORY_PAGE_HEADER_BYTES + count * width;
        if data.len() < needed {
            return Err(ParseError::insufficient("history page", needed, data.len()));
        }

        let values = (0..count)
            .map(|_| {
                if width == 1 {
                    u16::from(buf.get_u8())
                } else {
                    buf.get_u16_le()
                }
            })
            .collect();

        Ok(Self {
            sensor,
            first_index,
            values,
        })
    }

    /// Serialize the page. Humidity values are truncated to one byte.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let width = self.sensor.field_width();
        let mut out = Vec::with_capacity(HISTORY_PAGE_HEADER_BYTES + self.values.len() * width);
        out.put_u8(self.sensor.wire_id());
        out.put_u16_le(self.first_index);
        out.put_u8(u8::try_from(self.values.len()).unwrap_or(u8::MAX));
        for value in self.values.iter().take(usize::from(u8::MAX)) {
            if width == 1 {
                out.put_u8(*value as u8);
            } else {
                out.put_u16_le(*value);
            }
        }
        out
    }

    /// Number of values carried. A page with no values ends the transfer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Typed values in page order.
    pub fn decoded(&self) -> impl Iterator<Item = SensorValue> + '_ {
        self.values.iter().map(|raw| self.sensor.decode_raw(*raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // --- Current reading layouts ---

    #[test]
    fn test_full_layout_requires_13_bytes() {
        let err = RawCurrent::from_bytes(CurrentLayout::Full, &[0u8; 12]).unwrap_err();
        assert_eq!(
            err,
            ParseError::InsufficientBytes {
                what: "full current reading",
                expected: 13,
                actual: 12,
            }
        );
    }

    #[test]
    fn test_simple_layout_is_not_a_truncated_full_layout() {
        // An 8-byte simple payload decodes, the same bytes fail the full layout.
        let bytes = [0xFF, 0x01, 0xFA, 0x01, 0x94, 0x27, 45, 90];
        assert!(RawCurrent::from_bytes(CurrentLayout::Full, &bytes).is_err());

        let raw = RawCurrent::from_bytes(CurrentLayout::Simple, &bytes).unwrap();
        assert_eq!(raw.co2, 511);
        assert_eq!(raw.battery, 90);
        assert_eq!(raw.status, None);
        assert_eq!(raw.interval, None);
        assert_eq!(raw.elapsed, None);
    }

    #[test]
    fn test_simple_layout_ignores_trailing_bytes() {
        let bytes = [0x20, 0x03, 0xC2, 0x01, 0x94, 0x27, 45, 85, 1, 0x2C, 0x01];
        let raw = RawCurrent::from_bytes(CurrentLayout::Simple, &bytes).unwrap();
        assert_eq!(raw.co2, 800);
        assert_eq!(raw.interval, None);
    }

    #[test]
    fn test_into_readings_subtracts_elapsed() {
        let read_at = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let raw = RawCurrent {
            co2: 800,
            temperature: 450,
            pressure: 10132,
            humidity: 45,
            battery: 85,
            status: Some(1),
            interval: Some(300),
            elapsed: Some(120),
        };

        let current = raw.into_readings(read_at);
        assert_eq!(current.reading.index, None);
        assert_eq!(current.reading.timestamp.unix_timestamp(), 1_700_000_000 - 120);
        assert_eq!(current.reading.co2(), Some(800.0));
        assert_eq!(current.reading.temperature(), Some(22.5));
        assert_eq!(current.reading.pressure(), Some(1013.2));
        assert_eq!(current.reading.humidity(), Some(45.0));
        assert_eq!(current.status, Some(Status::Green));
        assert_eq!(current.interval, Some(300));
    }

    #[test]
    fn test_unavailable_markers_do_not_fail_decode() {
        let raw = RawCurrent {
            co2: 0x8000,
            temperature: 0x4000,
            pressure: 0x8000,
            humidity: 0x80,
            battery: 50,
            ..Default::default()
        };
        let bytes = raw.to_bytes(CurrentLayout::Simple);
        let current = CurrentReadings::decode(
            CurrentLayout::Simple,
            &bytes,
            OffsetDateTime::UNIX_EPOCH,
        )
        .unwrap();

        for sensor in Sensor::ALL {
            assert_eq!(current.reading.get(sensor), Some(SensorValue::Unavailable));
        }
        assert_eq!(current.battery, 50);
    }

    #[test]
    fn test_negative_temperature_clamps_to_zero() {
        assert_eq!(
            Sensor::Temperature.decode_raw(0x8001),
            SensorValue::Measured(0.0)
        );
    }

    // --- Scalar characteristics ---

    #[test]
    fn test_decode_u16_and_u8() {
        assert_eq!(decode_u16("interval", &[0x2C, 0x01]).unwrap(), 300);
        assert!(decode_u16("interval", &[0x2C]).is_err());
        assert_eq!(decode_u8("battery", &[77]).unwrap(), 77);
        assert!(decode_u8("battery", &[]).is_err());
    }

    #[test]
    fn test_decode_string_trims_padding() {
        assert_eq!(decode_string(b"v1.4.19\0\0"), "v1.4.19");
        assert_eq!(decode_string(b"Aranet4 1A2B3 "), "Aranet4 1A2B3");
    }

    // --- History command ---

    #[test]
    fn test_history_command_layout() {
        let cmd = HistoryCommand {
            sensor: Sensor::Humidity,
            start: 5,
            end: 300,
        };
        let bytes = cmd.encode();
        assert_eq!(bytes, [0x82, 2, 0, 0, 5, 0, 0x2C, 0x01]);
        assert_eq!(HistoryCommand::decode(&bytes).unwrap(), cmd);
    }

    #[test]
    fn test_history_command_rejects_other_opcode() {
        let mut bytes = HistoryCommand {
            sensor: Sensor::Co2,
            start: 1,
            end: 1,
        }
        .encode();
        bytes[0] = 0x61;
        assert!(matches!(
            HistoryCommand::decode(&bytes),
            Err(ParseError::InvalidValue(_))
        ));
    }

    // --- History pages ---

    #[test]
    fn test_history_page_two_byte_values() {
        let data = [4, 0x0A, 0x00, 2, 0xFF, 0x01, 0x20, 0x03, 0xAA, 0xBB];
        let page = HistoryPage::decode(&data).unwrap();
        assert_eq!(page.sensor, Sensor::Co2);
        assert_eq!(page.first_index, 10);
        assert_eq!(page.values, vec![511, 800]);
    }

    #[test]
    fn test_history_page_one_byte_values() {
        let data = [2, 0x01, 0x00, 3, 40, 41, 0x80];
        let page = HistoryPage::decode(&data).unwrap();
        let decoded: Vec<_> = page.decoded().collect();
        assert_eq!(
            decoded,
            vec![
                SensorValue::Measured(40.0),
                SensorValue::Measured(41.0),
                SensorValue::Unavailable,
            ]
        );
    }

    #[test]
    fn test_history_page_short_body() {
        let data = [1, 0x01, 0x00, 3, 0xC2, 0x01, 0xC2];
        assert_eq!(
            HistoryPage::decode(&data).unwrap_err(),
            ParseError::InsufficientBytes {
                what: "history page",
                expected: 10,
                actual: 7,
            }
        );
    }

    #[test]
    fn test_history_page_unknown_selector() {
        let data = [9, 0x01, 0x00, 0];
        assert_eq!(
            HistoryPage::decode(&data).unwrap_err(),
            ParseError::UnknownSensor(9)
        );
    }

    #[test]
    fn test_empty_history_page() {
        let page = HistoryPage::decode(&[3, 0x07, 0x00, 0]).unwrap();
        assert!(page.is_empty());
        assert_eq!(page.first_index, 7);
    }
}
