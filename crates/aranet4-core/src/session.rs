//! The session façade.
//!
//! A [`Session`] owns one transport connection to one Aranet4. It resolves the
//! device's [`CapabilityProfile`] and [`DeviceIdentity`] once, on the first
//! successful [`connect`](Session::connect), and exposes the read operations
//! on top of them.
//!
//! All operations take `&self` and are serialized through a FIFO async lock:
//! a call issued while another is in flight waits until the first reaches a
//! terminal state. The device cannot handle concurrent GATT transactions, so
//! at most one is ever outstanding. A history transfer whose future is
//! dropped keeps the lock until its unsubscribe has run.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, PoisonError};

use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use aranet4_types::layout::{decode_string, decode_u8, decode_u16};
use aranet4_types::{
    CurrentLayout, CurrentReadings, DeviceIdentity, DeviceStatus, HistoryRange, Reading,
};

use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::guard::LinkLease;
use crate::history::{HistoryEngine, HistoryInfo, HistoryOptions, validate_range};
use crate::profile::{CapabilityProfile, IdentityCharacteristics};
use crate::transport::{Transport, with_timeout};

/// A connection to one Aranet4.
///
/// # Example
///
/// ```
/// use aranet4_core::{HistoryRange, MockTransportBuilder, Sensor, Session, SessionConfig};
///
/// #[tokio::main]
/// async fn main() -> aranet4_core::Result<()> {
///     let transport = MockTransportBuilder::new().history_len(50).build();
///     let session = Session::new(transport, SessionConfig::default());
///     session.connect().await?;
///
///     let co2 = session
///         .history(&HistoryRange::new([Sensor::Co2]).from_index(41))
///         .await?;
///     assert_eq!(co2.len(), 10);
///
///     session.disconnect().await?;
///     Ok(())
/// }
/// ```
pub struct Session<T: Transport + 'static> {
    transport: Arc<T>,
    config: SessionConfig,
    link: Arc<Mutex<()>>,
    connected: AtomicBool,
    identity: OnceLock<DeviceIdentity>,
    profile: OnceLock<CapabilityProfile>,
    cache: std::sync::Mutex<HashMap<Uuid, Vec<u8>>>,
}

impl<T: Transport + 'static> std::fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("connected", &self.connected.load(Ordering::Relaxed))
            .field("identity", &self.identity.get())
            .field("profile", &self.profile.get().map(|p| p.kind))
            .finish_non_exhaustive()
    }
}

impl<T: Transport + 'static> Session<T> {
    /// Create a disconnected session over `transport`.
    pub fn new(transport: T, config: SessionConfig) -> Self {
        Self {
            transport: Arc::new(transport),
            config,
            link: Arc::new(Mutex::new(())),
            connected: AtomicBool::new(false),
            identity: OnceLock::new(),
            profile: OnceLock::new(),
            cache: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Create a session with [`SessionConfig::default`].
    pub fn with_default_config(transport: T) -> Self {
        Self::new(transport, SessionConfig::default())
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Identity read on the first successful connect.
    pub fn identity(&self) -> Option<&DeviceIdentity> {
        self.identity.get()
    }

    /// Profile resolved on the first successful connect.
    pub fn profile(&self) -> Option<&CapabilityProfile> {
        self.profile.get()
    }

    /// Whether the session considers itself connected.
    pub async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Forget values kept by the read cache.
    pub fn clear_cache(&self) {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Connect to the device.
    ///
    /// On first use this also reads the software revision, resolves the
    /// [`CapabilityProfile`], checks that the device exposes the profile's
    /// service and reads the [`DeviceIdentity`]. Later reconnects reuse both.
    /// Calling this while connected is a no-op.
    ///
    /// # Errors
    ///
    /// - [`Error::DeviceUnreachable`] if the link cannot be established
    /// - [`Error::UnsupportedFirmware`] if the revision maps to no known
    ///   layout or its service is missing; the transport is disconnected
    ///   again before returning
    #[tracing::instrument(level = "info", skip(self))]
    pub async fn connect(&self) -> Result<()> {
        let _lease = self.lease().await;
        if self.connected.load(Ordering::Relaxed) {
            debug!("Already connected");
            return Ok(());
        }

        info!("Connecting to device...");
        with_timeout(
            self.config.connect_timeout,
            "connect",
            self.transport.connect(),
        )
        .await?;

        if self.profile.get().is_none()
            && let Err(e) = self.negotiate().await
        {
            warn!(error = %e, "Negotiation failed, dropping connection");
            if let Err(cleanup) = with_timeout(
                self.config.connect_timeout,
                "disconnect",
                self.transport.disconnect(),
            )
            .await
            {
                warn!(error = %cleanup, "Disconnect after failed negotiation also failed");
            }
            return Err(e);
        }

        self.connected.store(true, Ordering::Relaxed);
        if let Some(identity) = self.identity.get() {
            info!(
                name = %identity.name,
                firmware = %identity.software_revision,
                "Connected!"
            );
        }
        Ok(())
    }

    /// Release the connection. Calling this when not connected does nothing.
    #[tracing::instrument(level = "info", skip(self))]
    pub async fn disconnect(&self) -> Result<()> {
        let _lease = self.lease().await;
        if !self.connected.swap(false, Ordering::Relaxed) {
            debug!("Already disconnected");
            return Ok(());
        }
        info!("Disconnecting from device...");
        with_timeout(
            self.config.connect_timeout,
            "disconnect",
            self.transport.disconnect(),
        )
        .await
    }

    /// Read and decode the full current-reading characteristic.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedFirmware`] without any I/O on firmware
    /// that lacks the full layout; use
    /// [`current_readings_simple`](Self::current_readings_simple) there.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn current_readings(&self) -> Result<CurrentReadings> {
        self.read_current(CurrentLayout::Full).await
    }

    /// Read and decode the simple current-reading characteristic, which
    /// carries no interval or elapsed fields.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn current_readings_simple(&self) -> Result<CurrentReadings> {
        self.read_current(CurrentLayout::Simple).await
    }

    /// Read battery, interval, elapsed and the stored-reading count.
    ///
    /// With [`SessionConfig::cache_reads`] set, values read earlier in this
    /// session are reused.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn status(&self) -> Result<DeviceStatus> {
        let _lease = self.lease().await;
        let profile = self.require_connected()?;

        let result = self.fetch_status(profile).await;
        self.settle(result).await
    }

    /// Read the stored-reading count, interval and elapsed seconds that a
    /// history transfer resolves its range and timestamps against.
    ///
    /// Cached like [`status`](Self::status).
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn history_info(&self) -> Result<HistoryInfo> {
        let _lease = self.lease().await;
        let profile = self.require_connected()?;
        let result = self.read_history_info(profile, true).await;
        self.settle(result).await
    }

    /// Fetch the readings in `range`, oldest first.
    ///
    /// See [`history_with_options`](Self::history_with_options).
    pub async fn history(&self, range: &HistoryRange) -> Result<Vec<Reading>> {
        self.history_with_options(range, HistoryOptions::default())
            .await
    }

    /// Fetch the readings in `range` with progress reporting and
    /// cancellation.
    ///
    /// Indices past the stored count are truncated; a range starting past
    /// it yields an empty result. The stored count, interval and elapsed
    /// seconds are always read fresh, never from the read cache.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidRequest`] before any I/O for an empty sensor set,
    ///   a zero start index or `start > end`
    /// - [`Error::IncompleteHistory`] if the transfer ends early
    /// - [`Error::Cancelled`] if the cancellation token fires
    #[tracing::instrument(
        level = "info",
        skip(self, options),
        fields(sensors = range.sensors.len(), start = range.start, end = ?range.end)
    )]
    pub async fn history_with_options(
        &self,
        range: &HistoryRange,
        options: HistoryOptions,
    ) -> Result<Vec<Reading>> {
        validate_range(range)?;

        let lease = self.lease().await;
        let profile = self.require_connected()?;

        let info = match self.read_history_info(profile, false).await {
            Ok(info) => info,
            Err(e) => return self.settle(Err(e)).await,
        };
        let now = OffsetDateTime::now_utc();
        debug!(
            stored = info.stored_readings,
            interval = info.interval,
            elapsed = info.elapsed,
            "History info"
        );

        // The engine owns the lease until it is dropped, after settling.
        let mut engine =
            HistoryEngine::new(&self.transport, profile, &self.config, &options).holding(lease);
        let result = engine.run(range, info, now).await;
        self.settle(result).await
    }

    async fn lease(&self) -> LinkLease {
        Arc::clone(&self.link).lock_owned().await
    }

    async fn read_current(&self, layout: CurrentLayout) -> Result<CurrentReadings> {
        let _lease = self.lease().await;
        let profile = self.require_connected()?;
        let characteristic = profile.current_characteristic(layout)?;

        let result = self.fetch_current(characteristic, layout).await;
        self.settle(result).await
    }

    async fn fetch_current(
        &self,
        characteristic: Uuid,
        layout: CurrentLayout,
    ) -> Result<CurrentReadings> {
        let data = self.read(characteristic, "read current reading").await?;
        Ok(CurrentReadings::decode(layout, &data, OffsetDateTime::now_utc())?)
    }

    async fn fetch_status(&self, profile: &CapabilityProfile) -> Result<DeviceStatus> {
        let battery = self.read_cached(profile.battery, "read battery").await?;
        let info = self.read_history_info(profile, true).await?;
        Ok(DeviceStatus {
            battery: decode_u8("battery level", &battery)?,
            interval: info.interval,
            elapsed: info.elapsed,
            stored_readings: info.stored_readings,
        })
    }

    async fn read_history_info(
        &self,
        profile: &CapabilityProfile,
        cached: bool,
    ) -> Result<HistoryInfo> {
        let characteristics = [
            (profile.stored_readings, "read stored readings"),
            (profile.interval, "read interval"),
            (profile.elapsed, "read elapsed"),
        ];
        let mut values = Vec::with_capacity(characteristics.len());
        for (characteristic, operation) in characteristics {
            let data = if cached {
                self.read_cached(characteristic, operation).await?
            } else {
                self.read(characteristic, operation).await?
            };
            values.push(data);
        }
        Ok(HistoryInfo {
            stored_readings: decode_u16("stored readings", &values[0])?,
            interval: decode_u16("interval", &values[1])?,
            elapsed: decode_u16("elapsed", &values[2])?,
        })
    }

    async fn read(&self, characteristic: Uuid, operation: &str) -> Result<Vec<u8>> {
        with_timeout(
            self.config.read_timeout,
            operation,
            self.transport.read(characteristic),
        )
        .await
    }

    /// Read through the cache when [`SessionConfig::cache_reads`] is set.
    async fn read_cached(&self, characteristic: Uuid, operation: &str) -> Result<Vec<u8>> {
        if !self.config.cache_reads {
            return self.read(characteristic, operation).await;
        }
        let hit = self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&characteristic)
            .cloned();
        if let Some(data) = hit {
            trace!(%characteristic, "Read served from cache");
            return Ok(data);
        }
        let data = self.read(characteristic, operation).await?;
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(characteristic, data.clone());
        Ok(data)
    }

    /// Read a device-information string, treating an absent characteristic
    /// as empty.
    async fn read_string(&self, characteristic: Uuid, operation: &str) -> Result<String> {
        match self.read(characteristic, operation).await {
            Ok(data) => Ok(decode_string(&data)),
            Err(Error::CharacteristicNotFound { uuid, .. }) => {
                debug!(%uuid, "Optional characteristic not exposed");
                Ok(String::new())
            }
            Err(e) => Err(e),
        }
    }

    /// Resolve the profile and read the identity. Runs once per session.
    async fn negotiate(&self) -> Result<()> {
        let revision = self
            .read(
                IdentityCharacteristics::default().software_revision,
                "read software revision",
            )
            .await
            .map(|data| decode_string(&data))?;
        let profile = CapabilityProfile::resolve(&revision)?;
        info!(kind = ?profile.kind, revision = %profile.revision, "Resolved capability profile");

        let services = self.transport.services().await?;
        if !services.contains(&profile.service) {
            warn!(expected = %profile.service, ?services, "Profile service not exposed");
            return Err(Error::unsupported_firmware(
                &profile.revision,
                format!("{:?} firmware expects service {}", profile.kind, profile.service),
            ));
        }

        let ids = profile.identity;
        let identity = DeviceIdentity {
            address: self.transport.address().await?,
            manufacturer: self.read_string(ids.manufacturer, "read manufacturer").await?,
            model: self.read_string(ids.model, "read model").await?,
            name: self.read_string(ids.name, "read device name").await?,
            serial: self.read_string(ids.serial, "read serial number").await?,
            hardware_revision: self
                .read_string(ids.hardware_revision, "read hardware revision")
                .await?,
            software_revision: profile.revision.clone(),
        };
        debug!(?identity, "Device identity");

        let _ = self.identity.set(identity);
        let _ = self.profile.set(profile);
        Ok(())
    }

    fn require_connected(&self) -> Result<&CapabilityProfile> {
        if !self.connected.load(Ordering::Relaxed) {
            return Err(Error::not_connected());
        }
        self.profile.get().ok_or_else(Error::not_connected)
    }

    /// Mark the session disconnected when a failure left the link down.
    async fn settle<R>(&self, result: Result<R>) -> Result<R> {
        if result.is_err() && !self.transport.is_connected().await {
            warn!("Link lost, marking session disconnected");
            self.connected.store(false, Ordering::Relaxed);
        }
        result
    }
}
