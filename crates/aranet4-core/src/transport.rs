//! The Bluetooth transport a [`Session`](crate::Session) drives.
//!
//! The session never touches a BLE stack directly. It talks to a
//! [`Transport`], which exposes the handful of GATT primitives the Aranet4
//! protocol needs, keyed by characteristic UUID. [`BtleplugTransport`](crate::BtleplugTransport)
//! implements it over a real adapter; [`MockTransport`](crate::MockTransport)
//! implements it in memory for tests.
//!
//! Implementations do not apply timeouts; the session wraps every call in the
//! timeout configured for that suspension point.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Notification payloads of one subscribed characteristic, in arrival order.
///
/// The stream ends when the subscription ends, for example because the
/// device disconnected.
pub type NotificationStream = Pin<Box<dyn Stream<Item = Vec<u8>> + Send>>;

/// GATT primitives of one peripheral connection.
///
/// Errors from these methods should be [`Error::DeviceUnreachable`] for link
/// failures and [`Error::CharacteristicNotFound`] when the UUID is not exposed
/// by the device.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the connection and discover services.
    async fn connect(&self) -> Result<()>;

    /// Close the connection.
    async fn disconnect(&self) -> Result<()>;

    /// Whether the link is currently up, as far as the stack knows.
    async fn is_connected(&self) -> bool;

    /// Platform address of the connected peripheral.
    async fn address(&self) -> Result<String>;

    /// Services found by discovery on the last connect. No GATT traffic.
    async fn services(&self) -> Result<Vec<Uuid>>;

    /// Read a characteristic value.
    async fn read(&self, characteristic: Uuid) -> Result<Vec<u8>>;

    /// Write a characteristic value, with response.
    async fn write(&self, characteristic: Uuid, data: &[u8]) -> Result<()>;

    /// Enable notifications and return the stream of payloads.
    async fn subscribe(&self, characteristic: Uuid) -> Result<NotificationStream>;

    /// Disable notifications for a characteristic.
    async fn unsubscribe(&self, characteristic: Uuid) -> Result<()>;
}

/// Run a transport call under a timeout, mapping expiry to
/// [`Error::DeviceUnreachable`] with a timeout reason.
pub(crate) async fn with_timeout<R>(
    duration: Duration,
    operation: &str,
    call: impl Future<Output = Result<R>>,
) -> Result<R> {
    tokio::time::timeout(duration, call)
        .await
        .map_err(|_| Error::timeout(operation, duration))?
}
