//! Core types for Aranet4 sensor data.

use core::fmt;
use std::collections::{BTreeMap, BTreeSet};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::ParseError;

/// A sensor channel of the Aranet4.
///
/// Used both to select what a history request should fetch and as the key of
/// the values carried by a [`Reading`]. The declaration order is the order in
/// which history passes run and values are listed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Sensor {
    /// CO2 concentration in ppm.
    Co2,
    /// Temperature in degrees Celsius.
    Temperature,
    /// Relative humidity in percent.
    Humidity,
    /// Atmospheric pressure in hPa.
    Pressure,
}

impl Sensor {
    /// All sensors, in declaration order.
    pub const ALL: [Sensor; 4] = [
        Sensor::Co2,
        Sensor::Temperature,
        Sensor::Humidity,
        Sensor::Pressure,
    ];

    /// The selector byte the device uses for this sensor in history commands
    /// and history pages.
    ///
    /// ```
    /// use aranet4_types::Sensor;
    ///
    /// assert_eq!(Sensor::Temperature.wire_id(), 1);
    /// assert_eq!(Sensor::Co2.wire_id(), 4);
    /// ```
    #[must_use]
    pub const fn wire_id(self) -> u8 {
        match self {
            Sensor::Temperature => 1,
            Sensor::Humidity => 2,
            Sensor::Pressure => 3,
            Sensor::Co2 => 4,
        }
    }

    /// Look up a sensor from its history selector byte.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::UnknownSensor`] for any byte that does not name
    /// an Aranet4 sensor.
    pub fn from_wire_id(id: u8) -> Result<Self, ParseError> {
        match id {
            1 => Ok(Sensor::Temperature),
            2 => Ok(Sensor::Humidity),
            3 => Ok(Sensor::Pressure),
            4 => Ok(Sensor::Co2),
            other => Err(ParseError::UnknownSensor(other)),
        }
    }

    /// Width in bytes of one value of this sensor inside a history page.
    #[must_use]
    pub const fn field_width(self) -> usize {
        match self {
            Sensor::Humidity => 1,
            _ => 2,
        }
    }

    /// Unit the decoded value is expressed in.
    #[must_use]
    pub const fn unit(self) -> &'static str {
        match self {
            Sensor::Co2 => "ppm",
            Sensor::Temperature => "°C",
            Sensor::Humidity => "%",
            Sensor::Pressure => "hPa",
        }
    }

    /// Convert a raw field into a value in this sensor's unit.
    ///
    /// The device flags a channel that is calibrating or absent with a marker
    /// value; those decode to [`SensorValue::Unavailable`]:
    ///
    /// - CO2 and pressure: bit `0x8000` set
    /// - humidity: bit `0x80` set
    /// - temperature: exactly `0x4000`
    ///
    /// Temperatures above `0x8000` are clamped to 0 °C.
    ///
    /// ```
    /// use aranet4_types::{Sensor, SensorValue};
    ///
    /// assert_eq!(Sensor::Co2.decode_raw(0x01FF), SensorValue::Measured(511.0));
    /// assert_eq!(Sensor::Temperature.decode_raw(0x01FA), SensorValue::Measured(25.3));
    /// assert_eq!(Sensor::Humidity.decode_raw(0x80), SensorValue::Unavailable);
    /// ```
    #[must_use]
    pub fn decode_raw(self, raw: u16) -> SensorValue {
        match self {
            Sensor::Co2 => {
                if raw & 0x8000 != 0 {
                    SensorValue::Unavailable
                } else {
                    SensorValue::Measured(f64::from(raw))
                }
            }
            Sensor::Temperature => match raw {
                0x4000 => SensorValue::Unavailable,
                r if r > 0x8000 => SensorValue::Measured(0.0),
                r => SensorValue::Measured(f64::from(r) / 20.0),
            },
            Sensor::Humidity => {
                if raw & 0x80 != 0 {
                    SensorValue::Unavailable
                } else {
                    SensorValue::Measured(f64::from(raw))
                }
            }
            Sensor::Pressure => {
                if raw & 0x8000 != 0 {
                    SensorValue::Unavailable
                } else {
                    SensorValue::Measured(f64::from(raw) / 10.0)
                }
            }
        }
    }
}

impl fmt::Display for Sensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sensor::Co2 => write!(f, "CO2"),
            Sensor::Temperature => write!(f, "Temperature"),
            Sensor::Humidity => write!(f, "Humidity"),
            Sensor::Pressure => write!(f, "Pressure"),
        }
    }
}

/// A decoded sensor value.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SensorValue {
    /// A measured value in the sensor's unit.
    Measured(f64),
    /// The device reported the channel as not available.
    Unavailable,
}

impl SensorValue {
    /// The measured value, if any.
    #[must_use]
    pub fn value(self) -> Option<f64> {
        match self {
            SensorValue::Measured(v) => Some(v),
            SensorValue::Unavailable => None,
        }
    }

    /// Whether the device reported a measurement.
    #[must_use]
    pub fn is_available(self) -> bool {
        matches!(self, SensorValue::Measured(_))
    }
}

/// CO2 level indicator shown by the device's status light.
///
/// # Ordering
///
/// Status values are ordered by severity: `Error < Green < Yellow < Red`.
///
/// ```
/// use aranet4_types::Status;
///
/// assert_eq!(format!("{}", Status::Green), "Good");
/// assert!(Status::Red > Status::Yellow);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[non_exhaustive]
#[repr(u8)]
pub enum Status {
    /// Error or invalid reading.
    Error = 0,
    /// CO2 level is good (green).
    Green = 1,
    /// CO2 level is moderate (yellow).
    Yellow = 2,
    /// CO2 level is high (red).
    Red = 3,
}

impl From<u8> for Status {
    fn from(value: u8) -> Self {
        match value {
            1 => Status::Green,
            2 => Status::Yellow,
            3 => Status::Red,
            _ => Status::Error,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Error => write!(f, "Error"),
            Status::Green => write!(f, "Good"),
            Status::Yellow => write!(f, "Moderate"),
            Status::Red => write!(f, "High"),
        }
    }
}

/// A timestamped bundle of sensor values.
///
/// Readings returned by a history fetch carry the 1-based position of the
/// record in the device log; current readings carry no index.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Reading {
    /// Position in the device log, `None` for a current reading.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub index: Option<u16>,
    /// When the values were measured.
    pub timestamp: OffsetDateTime,
    /// Values of the sensors that were requested or decoded.
    pub values: BTreeMap<Sensor, SensorValue>,
}

impl Reading {
    /// Create a reading without an index.
    #[must_use]
    pub fn current(timestamp: OffsetDateTime) -> Self {
        Self {
            index: None,
            timestamp,
            values: BTreeMap::new(),
        }
    }

    /// Create an empty reading for position `index` of the device log.
    #[must_use]
    pub fn historical(index: u16, timestamp: OffsetDateTime) -> Self {
        Self {
            index: Some(index),
            timestamp,
            values: BTreeMap::new(),
        }
    }

    /// Add a value, replacing any previous value for the same sensor.
    #[must_use]
    pub fn with_value(mut self, sensor: Sensor, value: SensorValue) -> Self {
        self.values.insert(sensor, value);
        self
    }

    /// The decoded value for `sensor`, if this reading has one.
    #[must_use]
    pub fn get(&self, sensor: Sensor) -> Option<SensorValue> {
        self.values.get(&sensor).copied()
    }

    /// The measured value for `sensor`, if present and available.
    #[must_use]
    pub fn value(&self, sensor: Sensor) -> Option<f64> {
        self.get(sensor).and_then(SensorValue::value)
    }

    pub fn co2(&self) -> Option<f64> {
        self.value(Sensor::Co2)
    }

    pub fn temperature(&self) -> Option<f64> {
        self.value(Sensor::Temperature)
    }

    pub fn humidity(&self) -> Option<f64> {
        self.value(Sensor::Humidity)
    }

    pub fn pressure(&self) -> Option<f64> {
        self.value(Sensor::Pressure)
    }
}

/// Result of reading one of the current-reading characteristics.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CurrentReadings {
    /// The four sensor values. The timestamp is the read time minus
    /// `elapsed` when the layout carries it.
    pub reading: Reading,
    /// Battery level percentage (0-100).
    pub battery: u8,
    /// CO2 status light, full layout only.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub status: Option<Status>,
    /// Measurement interval in seconds, full layout only.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub interval: Option<u16>,
    /// Seconds since the last measurement, full layout only.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub elapsed: Option<u16>,
}

/// Identity strings read once per session from the device information
/// characteristics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeviceIdentity {
    /// Platform address of the peripheral (MAC on Linux/Windows, a UUID on macOS).
    pub address: String,
    pub manufacturer: String,
    pub model: String,
    pub name: String,
    pub serial: String,
    pub hardware_revision: String,
    /// Firmware version, e.g. `v1.4.19`.
    pub software_revision: String,
}

/// Per-poll snapshot of the device's state. Every poll replaces the
/// previous snapshot as a whole.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeviceStatus {
    /// Battery level percentage (0-100).
    pub battery: u8,
    /// Measurement interval in seconds.
    pub interval: u16,
    /// Seconds since the last measurement.
    pub elapsed: u16,
    /// Number of readings held in the device log.
    pub stored_readings: u16,
}

/// Upper bound of a [`HistoryRange`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum HistoryEnd {
    /// Resolve to the number of stored readings at fetch time.
    #[default]
    Latest,
    /// A concrete 1-based index (inclusive).
    Index(u16),
}

/// Which sensors and which part of the device log a history fetch covers.
///
/// Indices are 1-based and inclusive.
///
/// ```
/// use aranet4_types::{HistoryEnd, HistoryRange, Sensor};
///
/// let range = HistoryRange::all();
/// assert_eq!(range.sensors.len(), 4);
/// assert_eq!(range.start, 1);
/// assert_eq!(range.end, HistoryEnd::Latest);
///
/// let co2 = HistoryRange::new([Sensor::Co2]).from_index(10).to_index(20);
/// assert_eq!(co2.end, HistoryEnd::Index(20));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HistoryRange {
    pub sensors: BTreeSet<Sensor>,
    pub start: u16,
    pub end: HistoryEnd,
}

impl HistoryRange {
    /// A range over the whole log for the given sensors.
    pub fn new(sensors: impl IntoIterator<Item = Sensor>) -> Self {
        Self {
            sensors: sensors.into_iter().collect(),
            start: 1,
            end: HistoryEnd::Latest,
        }
    }

    /// Every sensor, whole log.
    #[must_use]
    pub fn all() -> Self {
        Self::new(Sensor::ALL)
    }

    /// Set the first index (inclusive).
    #[must_use]
    pub fn from_index(mut self, start: u16) -> Self {
        self.start = start;
        self
    }

    /// Set the last index (inclusive).
    #[must_use]
    pub fn to_index(mut self, end: u16) -> Self {
        self.end = HistoryEnd::Index(end);
        self
    }

    /// Fetch up to the newest stored reading.
    #[must_use]
    pub fn to_latest(mut self) -> Self {
        self.end = HistoryEnd::Latest;
        self
    }
}

impl Default for HistoryRange {
    fn default() -> Self {
        Self::all()
    }
}
