//! Mock transport for testing.
//!
//! [`MockTransport`] implements [`Transport`] in memory. It answers reads from
//! a simulated Aranet4 characteristic table and serves history commands the
//! way the device does, by pushing pages onto the subscribed notification
//! stream. Every call is recorded as a [`MockEvent`] so tests can assert on
//! the exact traffic a session produced.
//!
//! # Features
//!
//! - **Failure injection**: refuse connections, fail command writes, drop the
//!   link or stall after a number of pages, corrupt page ordering
//! - **Latency simulation**: delay every request to exercise timeouts
//! - **Runtime control**: change the current reading or drop the link mid-test

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc::{self, UnboundedSender};
use tracing::trace;
use uuid::Uuid;

use aranet4_types::uuid::{
    BATTERY_LEVEL, CURRENT_READING_FULL, CURRENT_READING_SIMPLE, DEVICE_NAME, HARDWARE_REVISION,
    HISTORY_COMMAND, HISTORY_DATA, MANUFACTURER_NAME, MODEL_NUMBER, SECONDS_SINCE_UPDATE,
    SAF_TEHNIKA_SERVICE_NEW, SAF_TEHNIKA_SERVICE_OLD, SERIAL_NUMBER, SOFTWARE_REVISION,
    STORED_READINGS, UPDATE_INTERVAL,
};
use aranet4_types::{CurrentLayout, HistoryCommand, HistoryPage, RawCurrent, Sensor};

use crate::error::{ConnectionFailureReason, Error, Result};
use crate::profile::CapabilityProfile;
use crate::transport::{NotificationStream, Transport};

/// One recorded transport call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEvent {
    Connect,
    Disconnect,
    Read(Uuid),
    Write(Uuid, Vec<u8>),
    Subscribe(Uuid),
    Unsubscribe(Uuid),
}

#[derive(Debug, Clone, Default)]
struct Faults {
    fail_writes: bool,
    disconnect_after_pages: Option<usize>,
    stall_after_pages: Option<usize>,
    empty_page_after_pages: Option<usize>,
    skip_page: Option<usize>,
    foreign_page_before_each: bool,
    stray_notification: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Copy)]
struct LiveState {
    current: RawCurrent,
    interval: u16,
    elapsed: u16,
}

/// An in-memory Aranet4.
///
/// # Example
///
/// ```
/// use aranet4_core::{MockTransportBuilder, Session, SessionConfig};
///
/// #[tokio::main]
/// async fn main() {
///     let transport = MockTransportBuilder::new().co2(640).history_len(12).build();
///     let session = Session::new(transport, SessionConfig::default());
///     session.connect().await.unwrap();
///
///     let current = session.current_readings().await.unwrap();
///     assert_eq!(current.reading.co2(), Some(640.0));
/// }
/// ```
pub struct MockTransport {
    address: String,
    strings: BTreeMap<Uuid, String>,
    services: Vec<Uuid>,
    missing: HashSet<Uuid>,
    history: BTreeMap<Sensor, Vec<u16>>,
    page_size: usize,
    faults: Faults,
    state: Mutex<LiveState>,
    connected: AtomicBool,
    fail_connect: AtomicBool,
    latency_ms: AtomicU64,
    pages_sent: AtomicUsize,
    notifier: Mutex<Option<UnboundedSender<Vec<u8>>>>,
    events: Mutex<Vec<MockEvent>>,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("address", &self.address)
            .field("stored_readings", &self.stored_readings())
            .field("connected", &self.connected.load(Ordering::Relaxed))
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockTransport {
    /// Number of readings in the simulated log.
    pub fn stored_readings(&self) -> u16 {
        let longest = self.history.values().map(Vec::len).max().unwrap_or(0);
        u16::try_from(longest).unwrap_or(u16::MAX)
    }

    /// All recorded calls, oldest first.
    pub fn events(&self) -> Vec<MockEvent> {
        lock(&self.events).clone()
    }

    /// Number of recorded calls matching `predicate`.
    pub fn count_events(&self, predicate: impl Fn(&MockEvent) -> bool) -> usize {
        lock(&self.events).iter().filter(|e| predicate(e)).count()
    }

    /// Forget all recorded calls.
    pub fn clear_events(&self) {
        lock(&self.events).clear();
    }

    // --- Test control methods ---

    /// Replace the current reading.
    pub fn set_current(&self, current: RawCurrent) {
        lock(&self.state).current = current;
    }

    /// Set the seconds since the last measurement.
    pub fn set_elapsed(&self, elapsed: u16) {
        lock(&self.state).elapsed = elapsed;
    }

    /// Set simulated latency for connect, read, write and subscribe.
    ///
    /// Set to `Duration::ZERO` to disable latency simulation.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Make the next connection attempts fail (or succeed again).
    pub fn set_fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::Relaxed);
    }

    /// Simulate the peripheral going out of range: the link drops and any
    /// open notification stream ends.
    pub fn drop_link(&self) {
        self.connected.store(false, Ordering::Relaxed);
        lock(&self.notifier).take();
    }

    fn record(&self, event: MockEvent) {
        trace!(?event, "Mock transport call");
        lock(&self.events).push(event);
    }

    fn check_connected(&self) -> Result<()> {
        if self.connected.load(Ordering::Relaxed) {
            Ok(())
        } else {
            Err(Error::not_connected())
        }
    }

    async fn simulate_latency(&self) {
        let latency = self.latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
    }

    fn check_exposed(&self, characteristic: Uuid) -> Result<()> {
        if self.missing.contains(&characteristic) {
            Err(Error::characteristic_not_found(characteristic.to_string(), 3))
        } else {
            Ok(())
        }
    }

    fn read_value(&self, characteristic: Uuid) -> Result<Vec<u8>> {
        self.check_exposed(characteristic)?;
        let state = *lock(&self.state);

        if let Some(text) = self.strings.get(&characteristic) {
            return Ok(text.as_bytes().to_vec());
        }

        let value = match characteristic {
            CURRENT_READING_FULL => {
                let raw = RawCurrent {
                    interval: Some(state.interval),
                    elapsed: Some(state.elapsed),
                    ..state.current
                };
                raw.to_bytes(CurrentLayout::Full)
            }
            CURRENT_READING_SIMPLE => state.current.to_bytes(CurrentLayout::Simple),
            BATTERY_LEVEL => vec![state.current.battery],
            UPDATE_INTERVAL => state.interval.to_le_bytes().to_vec(),
            SECONDS_SINCE_UPDATE => state.elapsed.to_le_bytes().to_vec(),
            STORED_READINGS => self.stored_readings().to_le_bytes().to_vec(),
            other => return Err(Error::characteristic_not_found(other.to_string(), 3)),
        };
        Ok(value)
    }

    /// Push the pages answering `command` onto the open subscription,
    /// applying any configured faults.
    fn serve_history(&self, command: HistoryCommand) {
        let mut notifier = lock(&self.notifier);
        let Some(sender) = notifier.as_ref() else {
            trace!("History command without a subscriber, nothing sent");
            return;
        };

        let log = self
            .history
            .get(&command.sensor)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let first = usize::from(command.start.max(1)) - 1;
        let last = usize::from(command.end).min(log.len());
        let values = if first < last { &log[first..last] } else { &[][..] };

        if values.is_empty() {
            let empty = HistoryPage {
                sensor: command.sensor,
                first_index: command.start,
                values: Vec::new(),
            };
            let _ = sender.unbounded_send(empty.encode());
            return;
        }

        let foreign = Sensor::ALL
            .into_iter()
            .find(|s| *s != command.sensor)
            .unwrap_or(command.sensor);

        for (page_no, chunk) in values.chunks(self.page_size).enumerate() {
            let sent = self.pages_sent.load(Ordering::Relaxed);
            if self.faults.disconnect_after_pages == Some(sent) {
                self.connected.store(false, Ordering::Relaxed);
                notifier.take();
                return;
            }
            if self.faults.stall_after_pages == Some(sent) {
                return;
            }
            let first_index = command.start + (page_no * self.page_size) as u16;
            if self.faults.empty_page_after_pages == Some(sent) {
                let empty = HistoryPage {
                    sensor: command.sensor,
                    first_index,
                    values: Vec::new(),
                };
                let _ = sender.unbounded_send(empty.encode());
                return;
            }
            if self.faults.skip_page == Some(page_no) {
                continue;
            }
            if let Some(stray) = &self.faults.stray_notification {
                let _ = sender.unbounded_send(stray.clone());
            }
            if self.faults.foreign_page_before_each {
                let decoy = HistoryPage {
                    sensor: foreign,
                    first_index,
                    values: chunk.to_vec(),
                };
                let _ = sender.unbounded_send(decoy.encode());
            }

            let page = HistoryPage {
                sensor: command.sensor,
                first_index,
                values: chunk.to_vec(),
            };
            let _ = sender.unbounded_send(page.encode());
            self.pages_sent.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self) -> Result<()> {
        self.record(MockEvent::Connect);
        self.simulate_latency().await;
        if self.fail_connect.load(Ordering::Relaxed) {
            return Err(Error::device_not_found(self.address.clone()));
        }
        self.connected.store(true, Ordering::Relaxed);
        self.pages_sent.store(0, Ordering::Relaxed);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.record(MockEvent::Disconnect);
        self.connected.store(false, Ordering::Relaxed);
        lock(&self.notifier).take();
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    async fn address(&self) -> Result<String> {
        Ok(self.address.clone())
    }

    async fn services(&self) -> Result<Vec<Uuid>> {
        self.check_connected()?;
        Ok(self.services.clone())
    }

    async fn read(&self, characteristic: Uuid) -> Result<Vec<u8>> {
        self.record(MockEvent::Read(characteristic));
        self.simulate_latency().await;
        self.check_connected()?;
        self.read_value(characteristic)
    }

    async fn write(&self, characteristic: Uuid, data: &[u8]) -> Result<()> {
        self.record(MockEvent::Write(characteristic, data.to_vec()));
        self.simulate_latency().await;
        self.check_connected()?;
        self.check_exposed(characteristic)?;
        if characteristic != HISTORY_COMMAND {
            return Err(Error::characteristic_not_found(characteristic.to_string(), 3));
        }
        if self.faults.fail_writes {
            return Err(Error::unreachable(ConnectionFailureReason::BleError(
                "write rejected by peripheral".to_string(),
            )));
        }
        let command = HistoryCommand::decode(data)?;
        self.serve_history(command);
        Ok(())
    }

    async fn subscribe(&self, characteristic: Uuid) -> Result<NotificationStream> {
        self.record(MockEvent::Subscribe(characteristic));
        self.simulate_latency().await;
        self.check_connected()?;
        self.check_exposed(characteristic)?;
        if characteristic != HISTORY_DATA {
            return Err(Error::characteristic_not_found(characteristic.to_string(), 3));
        }
        let (tx, rx) = mpsc::unbounded();
        *lock(&self.notifier) = Some(tx);
        Ok(Box::pin(rx))
    }

    async fn unsubscribe(&self, characteristic: Uuid) -> Result<()> {
        self.record(MockEvent::Unsubscribe(characteristic));
        self.check_connected()?;
        lock(&self.notifier).take();
        Ok(())
    }
}

/// Builder for creating mock transports with custom settings.
#[derive(Debug, Clone)]
pub struct MockTransportBuilder {
    address: String,
    name: String,
    manufacturer: String,
    model: String,
    serial: String,
    hardware_revision: String,
    software_revision: String,
    services: Option<Vec<Uuid>>,
    current: RawCurrent,
    interval: u16,
    elapsed: u16,
    history: BTreeMap<Sensor, Vec<u16>>,
    page_size: usize,
    missing: HashSet<Uuid>,
    faults: Faults,
    fail_connect: bool,
    latency: Duration,
}

impl Default for MockTransportBuilder {
    fn default() -> Self {
        Self {
            address: "AA:BB:CC:DD:EE:FF".to_string(),
            name: "Aranet4 1A2B3".to_string(),
            manufacturer: "SAF Tehnika".to_string(),
            model: "Aranet4".to_string(),
            serial: "220101A2B3".to_string(),
            hardware_revision: "9".to_string(),
            software_revision: "v1.4.19".to_string(),
            services: None,
            current: RawCurrent {
                co2: 800,
                temperature: 450,
                pressure: 10132,
                humidity: 45,
                battery: 85,
                status: Some(1),
                interval: None,
                elapsed: None,
            },
            interval: 300,
            elapsed: 120,
            history: BTreeMap::new(),
            page_size: 20,
            missing: HashSet::new(),
            faults: Faults::default(),
            fail_connect: false,
            latency: Duration::ZERO,
        }
    }
}

impl MockTransportBuilder {
    /// Create a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the platform address.
    #[must_use]
    pub fn address(mut self, address: &str) -> Self {
        self.address = address.to_string();
        self
    }

    /// Set the advertised device name.
    #[must_use]
    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Set the serial number string.
    #[must_use]
    pub fn serial(mut self, serial: &str) -> Self {
        self.serial = serial.to_string();
        self
    }

    /// Set the software revision the device reports.
    #[must_use]
    pub fn software_revision(mut self, revision: &str) -> Self {
        self.software_revision = revision.to_string();
        self
    }

    /// Set the services discovery reports. By default the device exposes
    /// the service matching its software revision.
    #[must_use]
    pub fn services(mut self, services: Vec<Uuid>) -> Self {
        self.services = Some(services);
        self
    }

    /// Set the raw current reading. Interval and elapsed come from
    /// [`interval`](Self::interval) and [`elapsed`](Self::elapsed).
    #[must_use]
    pub fn current(mut self, current: RawCurrent) -> Self {
        self.current = current;
        self
    }

    /// Set the raw CO2 value in ppm.
    #[must_use]
    pub fn co2(mut self, co2: u16) -> Self {
        self.current.co2 = co2;
        self
    }

    /// Set the raw temperature value (1/20 °C).
    #[must_use]
    pub fn temperature_raw(mut self, raw: u16) -> Self {
        self.current.temperature = raw;
        self
    }

    /// Set the battery level.
    #[must_use]
    pub fn battery(mut self, battery: u8) -> Self {
        self.current.battery = battery;
        self
    }

    /// Set the measurement interval in seconds.
    #[must_use]
    pub fn interval(mut self, interval: u16) -> Self {
        self.interval = interval;
        self
    }

    /// Set the seconds since the last measurement.
    #[must_use]
    pub fn elapsed(mut self, elapsed: u16) -> Self {
        self.elapsed = elapsed;
        self
    }

    /// Fill the log with `len` synthetic readings for every sensor.
    #[must_use]
    pub fn history_len(mut self, len: u16) -> Self {
        for sensor in Sensor::ALL {
            let values = (0..len).map(|i| synthetic_value(sensor, i)).collect();
            self.history.insert(sensor, values);
        }
        self
    }

    /// Set the raw log for one sensor, oldest first.
    #[must_use]
    pub fn history(mut self, sensor: Sensor, values: Vec<u16>) -> Self {
        self.history.insert(sensor, values);
        self
    }

    /// Values per notification page (1..=255).
    #[must_use]
    pub fn page_size(mut self, size: usize) -> Self {
        self.page_size = size.clamp(1, usize::from(u8::MAX));
        self
    }

    /// Hide a characteristic, as firmware that lacks it would.
    #[must_use]
    pub fn missing_characteristic(mut self, characteristic: Uuid) -> Self {
        self.missing.insert(characteristic);
        self
    }

    /// Refuse connection attempts.
    #[must_use]
    pub fn fail_connect(mut self, fail: bool) -> Self {
        self.fail_connect = fail;
        self
    }

    /// Reject history command writes.
    #[must_use]
    pub fn fail_writes(mut self, fail: bool) -> Self {
        self.faults.fail_writes = fail;
        self
    }

    /// Delay every request by `latency`.
    #[must_use]
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Drop the link once `pages` pages have been sent on this connection.
    #[must_use]
    pub fn disconnect_after_pages(mut self, pages: usize) -> Self {
        self.faults.disconnect_after_pages = Some(pages);
        self
    }

    /// Stop sending (without closing the stream) after `pages` pages.
    #[must_use]
    pub fn stall_after_pages(mut self, pages: usize) -> Self {
        self.faults.stall_after_pages = Some(pages);
        self
    }

    /// Answer with an empty page once `pages` pages have been sent.
    #[must_use]
    pub fn empty_page_after_pages(mut self, pages: usize) -> Self {
        self.faults.empty_page_after_pages = Some(pages);
        self
    }

    /// Leave out the page at this position of every answer.
    #[must_use]
    pub fn skip_page(mut self, page: usize) -> Self {
        self.faults.skip_page = Some(page);
        self
    }

    /// Interleave a page for a different sensor before every real page.
    #[must_use]
    pub fn foreign_page_before_each(mut self, enabled: bool) -> Self {
        self.faults.foreign_page_before_each = enabled;
        self
    }

    /// Send this raw payload on the history subscription before every page.
    #[must_use]
    pub fn stray_notification(mut self, payload: Vec<u8>) -> Self {
        self.faults.stray_notification = Some(payload);
        self
    }

    /// Build the mock transport.
    #[must_use]
    pub fn build(self) -> MockTransport {
        let services = self.services.unwrap_or_else(|| {
            CapabilityProfile::resolve(&self.software_revision)
                .map(|profile| vec![profile.service])
                .unwrap_or_else(|_| vec![SAF_TEHNIKA_SERVICE_NEW, SAF_TEHNIKA_SERVICE_OLD])
        });
        let strings = BTreeMap::from([
            (DEVICE_NAME, self.name),
            (MANUFACTURER_NAME, self.manufacturer),
            (MODEL_NUMBER, self.model),
            (SERIAL_NUMBER, self.serial),
            (HARDWARE_REVISION, self.hardware_revision),
            (SOFTWARE_REVISION, self.software_revision),
        ]);

        MockTransport {
            address: self.address,
            strings,
            services,
            missing: self.missing,
            history: self.history,
            page_size: self.page_size,
            faults: self.faults,
            state: Mutex::new(LiveState {
                current: self.current,
                interval: self.interval,
                elapsed: self.elapsed,
            }),
            connected: AtomicBool::new(false),
            fail_connect: AtomicBool::new(self.fail_connect),
            latency_ms: AtomicU64::new(self.latency.as_millis() as u64),
            pages_sent: AtomicUsize::new(0),
            notifier: Mutex::new(None),
            events: Mutex::new(Vec::new()),
        }
    }
}

/// Deterministic, plausible raw values for a generated log.
fn synthetic_value(sensor: Sensor, i: u16) -> u16 {
    match sensor {
        Sensor::Co2 => 450 + (i * 7) % 600,
        Sensor::Temperature => 400 + i % 60,
        Sensor::Humidity => 35 + i % 30,
        Sensor::Pressure => 10_050 + i % 80,
    }
}
