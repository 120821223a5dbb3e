//! Async BLE GATT client for the Aranet4 CO2 meter.
//!
//! This crate talks to an Aranet4 over Bluetooth Low Energy: it reads the
//! current CO₂, temperature, humidity and pressure values, the device status,
//! and downloads the on-device measurement log.
//!
//! # Features
//!
//! - **Capability profiles**: characteristic UUIDs and byte layouts resolved
//!   from the firmware revision, never guessed
//! - **Current readings**: full and simple layouts
//! - **Historical data**: paged log download with progress and cancellation
//! - **Serialized sessions**: one GATT operation in flight at a time, with a
//!   timeout on every suspension point
//! - **Testing**: an in-memory [`MockTransport`] with failure injection
//!
//! # Platform Differences
//!
//! - **macOS**: Devices are identified by a UUID assigned by CoreBluetooth. It
//!   is stable for a given device on a given Mac, but differs between Macs.
//! - **Linux/Windows**: Devices are identified by their Bluetooth MAC address
//!   (e.g., `AA:BB:CC:DD:EE:FF`).
//!
//! # Quick Start
//!
//! ```no_run
//! use aranet4_core::{HistoryRange, Sensor, Session, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = Session::bluetooth(None, SessionConfig::default()).await?;
//!     session.connect().await?;
//!
//!     let current = session.current_readings().await?;
//!     println!("CO2: {:?} ppm", current.reading.co2());
//!
//!     let log = session.history(&HistoryRange::new([Sensor::Co2])).await?;
//!     println!("{} stored readings", log.len());
//!
//!     session.disconnect().await?;
//!     Ok(())
//! }
//! ```

pub mod ble;
pub mod config;
pub mod error;
pub mod guard;
pub mod history;
pub mod mock;
pub mod profile;
pub mod session;
pub mod transport;

pub use ble::{BtleplugTransport, DiscoveredDevice};
pub use config::{ConfigError, SessionConfig, ValidationError};
pub use error::{ConnectionFailureReason, Error, Result};
pub use guard::{LinkLease, SubscriptionGuard};
pub use history::{HistoryInfo, HistoryOptions, HistoryProgress, HistoryState, ProgressCallback};
pub use mock::{MockEvent, MockTransport, MockTransportBuilder};
pub use profile::{CapabilityProfile, FirmwareVersion, IdentityCharacteristics, ProfileKind};
pub use session::Session;
pub use transport::{NotificationStream, Transport};

// Re-export from aranet4-types
pub use aranet4_types::uuid as uuids;
pub use aranet4_types::{
    CurrentLayout, CurrentReadings, DeviceIdentity, DeviceStatus, HistoryEnd, HistoryRange,
    ParseError, Reading, Sensor, SensorValue, Status,
};
