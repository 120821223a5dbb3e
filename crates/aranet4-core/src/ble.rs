//! Bluetooth LE transport over `btleplug`.
//!
//! [`BtleplugTransport`] locates an Aranet4 either by an explicit identifier
//! (address, platform peripheral ID or name fragment) or, when none is given,
//! by the first peripheral whose advertised name contains
//! [`SessionConfig::name_filter`].

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::StreamExt;
use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::error::{ConnectionFailureReason, Error, Result};
use crate::session::Session;
use crate::transport::{NotificationStream, Transport};

/// A peripheral seen during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    /// Advertised local name.
    pub name: Option<String>,
    /// Identifier usable with [`BtleplugTransport::new`]: the MAC address on
    /// Linux/Windows, the peripheral UUID on macOS.
    pub identifier: String,
    /// Signal strength at discovery time.
    pub rssi: Option<i16>,
}

/// Get the first available Bluetooth adapter.
pub async fn get_adapter() -> Result<Adapter> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;

    adapters
        .into_iter()
        .next()
        .ok_or(Error::unreachable(ConnectionFailureReason::AdapterUnavailable))
}

/// Scan for `config.scan_timeout` and list peripherals whose advertised
/// name contains `config.name_filter`.
pub async fn scan(config: &SessionConfig) -> Result<Vec<DiscoveredDevice>> {
    let adapter = get_adapter().await?;
    info!(
        "Starting BLE scan for {} seconds...",
        config.scan_timeout.as_secs()
    );
    adapter.start_scan(ScanFilter::default()).await?;
    sleep(config.scan_timeout).await;
    adapter.stop_scan().await?;

    let filter = config.name_filter.to_lowercase();
    let mut discovered = Vec::new();
    for peripheral in adapter.peripherals().await? {
        let Ok(Some(props)) = peripheral.properties().await else {
            continue;
        };
        if !props
            .local_name
            .as_deref()
            .is_some_and(|name| matches_name_filter(name, &filter))
        {
            continue;
        }
        discovered.push(DiscoveredDevice {
            name: props.local_name.clone(),
            identifier: create_identifier(&props.address.to_string(), &peripheral.id()),
            rssi: props.rssi,
        });
    }

    info!("Scan complete. Found {} device(s)", discovered.len());
    Ok(discovered)
}

/// Format a peripheral ID as a string.
///
/// On macOS, peripheral IDs are UUIDs. On other platforms, they may be
/// MAC addresses or other formats.
pub fn format_peripheral_id(id: &PeripheralId) -> String {
    format!("{:?}", id)
        .trim_start_matches("PeripheralId(")
        .trim_end_matches(')')
        .to_string()
}

/// Create an identifier string from an address and peripheral ID.
///
/// On macOS where addresses are 00:00:00:00:00:00, uses the peripheral ID.
pub fn create_identifier(address: &str, peripheral_id: &PeripheralId) -> String {
    if is_null_address(address) {
        format_peripheral_id(peripheral_id)
    } else {
        address.to_string()
    }
}

fn is_null_address(address: &str) -> bool {
    address == "00:00:00:00:00:00"
}

/// Case-insensitive substring match of an advertised name. `filter_lower`
/// must already be lowercase.
fn matches_name_filter(name: &str, filter_lower: &str) -> bool {
    name.to_lowercase().contains(filter_lower)
}

/// Whether a peripheral matches a user-supplied identifier: a peripheral ID
/// fragment, a MAC address with or without colons, or a name fragment.
/// `identifier_lower` must already be lowercase.
fn matches_identifier(
    identifier_lower: &str,
    address: &str,
    peripheral_id: &str,
    name: Option<&str>,
) -> bool {
    let address = address.to_lowercase();
    if peripheral_id.to_lowercase().contains(identifier_lower) {
        return true;
    }
    if !is_null_address(&address)
        && (address == identifier_lower
            || address.replace(':', "") == identifier_lower.replace(':', ""))
    {
        return true;
    }
    name.is_some_and(|n| matches_name_filter(n, identifier_lower))
}

struct Link {
    peripheral: Peripheral,
    characteristics: HashMap<Uuid, Characteristic>,
    services: Vec<Uuid>,
}

/// [`Transport`] over a system Bluetooth adapter.
pub struct BtleplugTransport {
    adapter: Adapter,
    identifier: Option<String>,
    name_filter: String,
    scan_timeout: Duration,
    link: RwLock<Option<Link>>,
}

impl std::fmt::Debug for BtleplugTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BtleplugTransport")
            .field("identifier", &self.identifier)
            .field("name_filter", &self.name_filter)
            .field("scan_timeout", &self.scan_timeout)
            .finish_non_exhaustive()
    }
}

impl BtleplugTransport {
    /// Use the first adapter. With `identifier` of `None`, the first device
    /// whose name matches `config.name_filter` is used.
    pub async fn new(identifier: Option<&str>, config: &SessionConfig) -> Result<Self> {
        let adapter = get_adapter().await?;
        Ok(Self::with_adapter(adapter, identifier, config))
    }

    /// Use a specific adapter.
    pub fn with_adapter(
        adapter: Adapter,
        identifier: Option<&str>,
        config: &SessionConfig,
    ) -> Self {
        Self {
            adapter,
            identifier: identifier.map(str::to_string),
            name_filter: config.name_filter.clone(),
            scan_timeout: config.scan_timeout,
            link: RwLock::new(None),
        }
    }

    fn target(&self) -> &str {
        self.identifier.as_deref().unwrap_or(&self.name_filter)
    }

    async fn find_known(&self) -> Result<Option<Peripheral>> {
        let wanted = self.target().to_lowercase();
        for peripheral in self.adapter.peripherals().await? {
            let Ok(Some(props)) = peripheral.properties().await else {
                continue;
            };
            let name = props.local_name.as_deref();
            let matched = if self.identifier.is_some() {
                matches_identifier(
                    &wanted,
                    &props.address.to_string(),
                    &format_peripheral_id(&peripheral.id()),
                    name,
                )
            } else {
                name.is_some_and(|n| matches_name_filter(n, &wanted))
            };
            if matched {
                debug!(name = ?name, "Matched peripheral");
                return Ok(Some(peripheral));
            }
        }
        Ok(None)
    }

    /// Look in the adapter cache first, then scan once.
    async fn locate(&self) -> Result<Peripheral> {
        info!("Looking for device: {}", self.target());
        if let Some(peripheral) = self.find_known().await? {
            info!("Found device in cache (no scan needed)");
            return Ok(peripheral);
        }

        self.adapter.start_scan(ScanFilter::default()).await?;
        sleep(self.scan_timeout).await;
        self.adapter.stop_scan().await?;

        match self.find_known().await? {
            Some(peripheral) => Ok(peripheral),
            None => {
                warn!("Device not found: {}", self.target());
                Err(Error::device_not_found(self.target()))
            }
        }
    }

    async fn characteristic(&self, uuid: Uuid) -> Result<(Peripheral, Characteristic)> {
        let link = self.link.read().await;
        let link = link.as_ref().ok_or_else(Error::not_connected)?;
        let characteristic = link
            .characteristics
            .get(&uuid)
            .cloned()
            .ok_or_else(|| {
                Error::characteristic_not_found(uuid.to_string(), link.services.len())
            })?;
        Ok((link.peripheral.clone(), characteristic))
    }
}

#[async_trait]
impl Transport for BtleplugTransport {
    #[tracing::instrument(level = "info", skip(self), fields(target = %self.target()))]
    async fn connect(&self) -> Result<()> {
        let existing = self.link.read().await.as_ref().map(|l| l.peripheral.clone());
        let peripheral = match existing {
            Some(peripheral) => peripheral,
            None => self.locate().await?,
        };

        info!("Connecting to device...");
        peripheral.connect().await?;
        info!("Discovering services...");
        peripheral.discover_services().await?;

        let services = peripheral.services();
        let mut characteristics = HashMap::new();
        for service in &services {
            debug!("  Service: {}", service.uuid);
            for c in &service.characteristics {
                debug!("    Characteristic: {}", c.uuid);
                characteristics.insert(c.uuid, c.clone());
            }
        }
        debug!("Cached {} characteristics", characteristics.len());

        *self.link.write().await = Some(Link {
            peripheral,
            characteristics,
            services: services.iter().map(|s| s.uuid).collect(),
        });
        Ok(())
    }

    #[tracing::instrument(level = "info", skip(self))]
    async fn disconnect(&self) -> Result<()> {
        let peripheral = self.link.read().await.as_ref().map(|l| l.peripheral.clone());
        match peripheral {
            Some(peripheral) => Ok(peripheral.disconnect().await?),
            None => Ok(()),
        }
    }

    async fn is_connected(&self) -> bool {
        let peripheral = self.link.read().await.as_ref().map(|l| l.peripheral.clone());
        match peripheral {
            Some(peripheral) => peripheral.is_connected().await.unwrap_or(false),
            None => false,
        }
    }

    async fn address(&self) -> Result<String> {
        let peripheral = self
            .link
            .read()
            .await
            .as_ref()
            .map(|l| l.peripheral.clone())
            .ok_or_else(Error::not_connected)?;
        let properties = peripheral.properties().await?;
        Ok(properties
            .map(|p| create_identifier(&p.address.to_string(), &peripheral.id()))
            .unwrap_or_else(|| format_peripheral_id(&peripheral.id())))
    }

    async fn services(&self) -> Result<Vec<Uuid>> {
        let link = self.link.read().await;
        let link = link.as_ref().ok_or_else(Error::not_connected)?;
        Ok(link.services.clone())
    }

    async fn read(&self, characteristic: Uuid) -> Result<Vec<u8>> {
        let (peripheral, c) = self.characteristic(characteristic).await?;
        Ok(peripheral.read(&c).await?)
    }

    async fn write(&self, characteristic: Uuid, data: &[u8]) -> Result<()> {
        let (peripheral, c) = self.characteristic(characteristic).await?;
        Ok(peripheral.write(&c, data, WriteType::WithResponse).await?)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn subscribe(&self, characteristic: Uuid) -> Result<NotificationStream> {
        let (peripheral, c) = self.characteristic(characteristic).await?;
        let notifications = peripheral.notifications().await?;
        peripheral.subscribe(&c).await?;
        let stream = notifications.filter_map(move |n| {
            futures::future::ready((n.uuid == characteristic).then_some(n.value))
        });
        Ok(Box::pin(stream))
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn unsubscribe(&self, characteristic: Uuid) -> Result<()> {
        let (peripheral, c) = self.characteristic(characteristic).await?;
        Ok(peripheral.unsubscribe(&c).await?)
    }
}

impl Session<BtleplugTransport> {
    /// Create a disconnected session for a Bluetooth device.
    ///
    /// ```no_run
    /// use aranet4_core::{Session, SessionConfig};
    ///
    /// #[tokio::main]
    /// async fn main() -> aranet4_core::Result<()> {
    ///     let session = Session::bluetooth(None, SessionConfig::default()).await?;
    ///     session.connect().await?;
    ///     println!("{:?}", session.current_readings().await?);
    ///     Ok(())
    /// }
    /// ```
    pub async fn bluetooth(identifier: Option<&str>, config: SessionConfig) -> Result<Self> {
        let transport = BtleplugTransport::new(identifier, &config).await?;
        Ok(Session::new(transport, config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_filter_is_case_insensitive() {
        assert!(matches_name_filter("Aranet4 1A2B3", "aranet4"));
        assert!(matches_name_filter("ARANET4 1A2B3", "aranet4"));
        assert!(!matches_name_filter("Aranet2 0001", "aranet4"));
    }

    #[test]
    fn test_identifier_matches_address_with_or_without_colons() {
        assert!(matches_identifier("aa:bb:cc:dd:ee:ff", "AA:BB:CC:DD:EE:FF", "hci0/dev", None));
        assert!(matches_identifier("aabbccddeeff", "AA:BB:CC:DD:EE:FF", "hci0/dev", None));
        assert!(!matches_identifier("aa:bb:cc:dd:ee:00", "AA:BB:CC:DD:EE:FF", "hci0/dev", None));
    }

    #[test]
    fn test_identifier_ignores_null_address() {
        assert!(!matches_identifier(
            "00:00:00:00:00:00",
            "00:00:00:00:00:00",
            "a2c1-77",
            None
        ));
    }

    #[test]
    fn test_identifier_matches_peripheral_id_and_name() {
        assert!(matches_identifier(
            "3f2a",
            "00:00:00:00:00:00",
            "3F2A9C10-1111-2222-3333-444455556666",
            None
        ));
        assert!(matches_identifier(
            "1a2b3",
            "00:00:00:00:00:00",
            "x",
            Some("Aranet4 1A2B3")
        ));
    }
}
