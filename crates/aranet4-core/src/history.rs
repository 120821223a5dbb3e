//! Historical data retrieval.
//!
//! The Aranet4 keeps a log of past measurements and serves it over a
//! page-oriented notification protocol. This module turns that protocol into
//! a single call returning an ordered `Vec<Reading>`.
//!
//! # Index Convention
//!
//! **All history indices are 1-based**, following the device protocol:
//! - Index 1 = oldest reading
//! - Index N = newest reading (where N = stored readings)
//!
//! # Protocol
//!
//! One transfer runs as a bounded state machine:
//!
//! ```text
//! Idle -> CommandSent -> Receiving -> Complete
//!                            |
//!                            +-----> Failed
//! ```
//!
//! The engine subscribes to the history-data characteristic, then serves each
//! requested sensor as one pass: a single command write naming the sensor and
//! the index range, followed by notification pages until the pass holds
//! `end - start + 1` values. Every page is checked against the index the
//! engine expects next. The subscription is released on every exit path.
//!
//! A transfer that stops early fails with [`Error::IncompleteHistory`]; values
//! gathered up to that point are discarded.

use std::sync::Arc;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use aranet4_types::{
    HistoryCommand, HistoryEnd, HistoryPage, HistoryRange, ParseError, Reading, Sensor,
};

use crate::config::SessionConfig;
use crate::error::{ConnectionFailureReason, Error, Result};
use crate::guard::{LinkLease, SubscriptionGuard};
use crate::profile::CapabilityProfile;
use crate::transport::{NotificationStream, Transport, with_timeout};

/// Progress information for a history transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryProgress {
    /// Sensor of the current pass.
    pub sensor: Sensor,
    /// Pass number (1-based, e.g., 1 of 4).
    pub pass: usize,
    /// Total number of passes.
    pub total_passes: usize,
    /// Values received in the current pass.
    pub received: usize,
    /// Values expected per pass.
    pub expected: usize,
}

impl HistoryProgress {
    /// Overall progress across all passes (0.0 to 1.0).
    pub fn overall(&self) -> f32 {
        if self.total_passes == 0 {
            return 1.0;
        }
        let pass_progress = if self.expected > 0 {
            self.received as f32 / self.expected as f32
        } else {
            1.0
        };
        (self.pass.saturating_sub(1) as f32 + pass_progress) / self.total_passes as f32
    }
}

/// Type alias for progress callback function.
pub type ProgressCallback = Arc<dyn Fn(HistoryProgress) + Send + Sync>;

/// Options for a history transfer.
///
/// ```
/// use aranet4_core::HistoryOptions;
/// use tokio_util::sync::CancellationToken;
///
/// let token = CancellationToken::new();
/// let options = HistoryOptions::new()
///     .with_progress(|p| println!("{}: {:.0}%", p.sensor, p.overall() * 100.0))
///     .with_cancellation(token.clone());
/// ```
#[derive(Clone, Default)]
pub struct HistoryOptions {
    /// Progress callback (optional), invoked after every accepted page.
    pub progress_callback: Option<ProgressCallback>,
    /// Token that aborts the transfer when cancelled.
    pub cancellation: Option<CancellationToken>,
}

impl std::fmt::Debug for HistoryOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryOptions")
            .field("progress_callback", &self.progress_callback.is_some())
            .field("cancellation", &self.cancellation)
            .finish()
    }
}

impl HistoryOptions {
    /// Create new history options with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a progress callback.
    #[must_use]
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(HistoryProgress) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Arc::new(callback));
        self
    }

    /// Abort the transfer when `token` is cancelled. The subscription is
    /// released before [`Error::Cancelled`] is returned.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Report progress if a callback is set.
    pub fn report_progress(&self, progress: &HistoryProgress) {
        if let Some(cb) = &self.progress_callback {
            cb(progress.clone());
        }
    }
}

/// Snapshot of the device log used to resolve a [`HistoryRange`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryInfo {
    /// Number of readings stored.
    pub stored_readings: u16,
    /// Measurement interval in seconds.
    pub interval: u16,
    /// Seconds since the newest reading.
    pub elapsed: u16,
}

impl HistoryInfo {
    /// Concrete inclusive index range to fetch, or `None` when nothing in
    /// the log falls inside `range`.
    ///
    /// An end past the stored count is truncated to it.
    pub fn effective_range(&self, range: &HistoryRange) -> Option<(u16, u16)> {
        let end = match range.end {
            HistoryEnd::Latest => self.stored_readings,
            HistoryEnd::Index(end) => end.min(self.stored_readings),
        };
        if range.start == 0 || range.start > end {
            None
        } else {
            Some((range.start, end))
        }
    }

    /// When the reading at `index` was taken, given the log was sampled at
    /// `now`. The newest reading is `now - elapsed`; each older one is one
    /// interval earlier.
    pub fn timestamp_of(&self, index: u16, now: OffsetDateTime) -> OffsetDateTime {
        let age = i64::from(self.stored_readings.saturating_sub(index));
        now - Duration::seconds(i64::from(self.elapsed))
            - Duration::seconds(age * i64::from(self.interval))
    }
}

/// Check caller-supplied preconditions before any I/O.
pub fn validate_range(range: &HistoryRange) -> Result<()> {
    if range.sensors.is_empty() {
        return Err(Error::invalid_request("no sensors requested"));
    }
    if range.start == 0 {
        return Err(Error::invalid_request("history indices start at 1"));
    }
    if let HistoryEnd::Index(end) = range.end
        && range.start > end
    {
        return Err(Error::invalid_request(format!(
            "start index {} is after end index {}",
            range.start, end
        )));
    }
    Ok(())
}

/// States of one history transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryState {
    Idle,
    CommandSent,
    Receiving,
    Complete,
    Failed,
}

/// Runs one history transfer over a subscribed notification stream.
pub struct HistoryEngine<'a, T: Transport + 'static> {
    transport: &'a Arc<T>,
    profile: &'a CapabilityProfile,
    config: &'a SessionConfig,
    options: &'a HistoryOptions,
    lease: Option<LinkLease>,
    state: HistoryState,
}

impl<'a, T: Transport + 'static> HistoryEngine<'a, T> {
    pub fn new(
        transport: &'a Arc<T>,
        profile: &'a CapabilityProfile,
        config: &'a SessionConfig,
        options: &'a HistoryOptions,
    ) -> Self {
        Self {
            transport,
            profile,
            config,
            options,
            lease: None,
            state: HistoryState::Idle,
        }
    }

    /// Hold `lease` for the whole transfer, including an unsubscribe that
    /// runs after the transfer future was dropped.
    #[must_use]
    pub fn holding(mut self, lease: LinkLease) -> Self {
        self.lease = Some(lease);
        self
    }

    /// Current state of the transfer.
    pub fn state(&self) -> HistoryState {
        self.state
    }

    fn transition(&mut self, to: HistoryState) {
        debug!(from = ?self.state, to = ?to, "History state transition");
        self.state = to;
    }

    /// Fetch `range` from a log described by `info`, sampled at `now`.
    ///
    /// The range must already have passed [`validate_range`].
    #[tracing::instrument(
        level = "debug",
        skip_all,
        fields(sensors = range.sensors.len(), start = range.start)
    )]
    pub async fn run(
        &mut self,
        range: &HistoryRange,
        info: HistoryInfo,
        now: OffsetDateTime,
    ) -> Result<Vec<Reading>> {
        let Some((start, end)) = info.effective_range(range) else {
            info!(
                stored = info.stored_readings,
                start = range.start,
                "Requested range is past the stored readings"
            );
            self.transition(HistoryState::Complete);
            return Ok(Vec::new());
        };

        if let Err(e) = self.check_cancelled() {
            self.transition(HistoryState::Failed);
            return Err(e);
        }

        let mut readings: Vec<Reading> = (start..=end)
            .map(|index| Reading::historical(index, info.timestamp_of(index, now)))
            .collect();

        let data = self.profile.history_data;
        let mut stream = match with_timeout(
            self.config.write_timeout,
            "subscribe to history data",
            self.transport.subscribe(data),
        )
        .await
        {
            Ok(stream) => stream,
            Err(e) => {
                self.transition(HistoryState::Failed);
                return Err(e);
            }
        };
        let guard = SubscriptionGuard::new(
            Arc::clone(self.transport),
            data,
            self.config.write_timeout,
        )
        .holding(self.lease.take());

        let sensors: Vec<Sensor> = range.sensors.iter().copied().collect();
        let cancellation = self.options.cancellation.clone();
        let transfer = self.transfer(&mut stream, &sensors, start, end, &mut readings);
        let outcome = match cancellation {
            Some(token) => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => Err(Error::Cancelled),
                    result = transfer => result,
                }
            }
            None => transfer.await,
        };

        match &outcome {
            Ok(()) => self.transition(HistoryState::Complete),
            Err(e) => {
                warn!(error = %e, "History transfer failed");
                self.transition(HistoryState::Failed);
            }
        }

        drop(stream);
        self.lease = guard.release().await;

        outcome?;
        info!(
            readings = readings.len(),
            start, end, "History transfer complete"
        );
        Ok(readings)
    }

    /// Queued pages are consumed without yielding, so the token is also
    /// checked between pages.
    fn check_cancelled(&self) -> Result<()> {
        if self
            .options
            .cancellation
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
        {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    async fn transfer(
        &mut self,
        stream: &mut NotificationStream,
        sensors: &[Sensor],
        start: u16,
        end: u16,
        readings: &mut [Reading],
    ) -> Result<()> {
        let total_passes = sensors.len();
        for (i, sensor) in sensors.iter().copied().enumerate() {
            let pass = i + 1;
            let command = HistoryCommand { sensor, start, end }.encode();
            debug!(%sensor, pass, total_passes, "Requesting history");

            with_timeout(
                self.config.write_timeout,
                "write history command",
                self.transport.write(self.profile.history_command, &command),
            )
            .await
            .map_err(|e| match e {
                Error::DeviceUnreachable { .. } => e,
                other => Error::unreachable(ConnectionFailureReason::Other(format!(
                    "history command write failed: {other}"
                ))),
            })?;
            self.transition(HistoryState::CommandSent);

            self.transition(HistoryState::Receiving);
            self.receive_pass(stream, sensor, pass, total_passes, start, readings)
                .await?;
        }
        Ok(())
    }

    async fn receive_pass(
        &mut self,
        stream: &mut NotificationStream,
        sensor: Sensor,
        pass: usize,
        total_passes: usize,
        start: u16,
        readings: &mut [Reading],
    ) -> Result<()> {
        let expected = readings.len();
        let mut received = 0usize;

        while received < expected {
            self.check_cancelled()?;
            let incomplete = Error::IncompleteHistory {
                sensor,
                received,
                expected,
            };
            let payload =
                match tokio::time::timeout(self.config.notification_timeout, stream.next()).await {
                    Ok(Some(payload)) => payload,
                    Ok(None) => {
                        warn!(%sensor, received, expected, "Notification stream ended");
                        return Err(incomplete);
                    }
                    Err(_) => {
                        warn!(
                            %sensor,
                            received,
                            expected,
                            timeout = ?self.config.notification_timeout,
                            "Timed out waiting for history page"
                        );
                        return Err(incomplete);
                    }
                };

            if payload.first() != Some(&sensor.wire_id()) {
                trace!(
                    selector = ?payload.first(),
                    %sensor,
                    "Ignoring notification for another sensor"
                );
                continue;
            }
            let page = HistoryPage::decode(&payload)?;
            if page.is_empty() {
                warn!(%sensor, received, expected, "Device reported no more records");
                return Err(incomplete);
            }

            let next_index = usize::from(start) + received;
            if usize::from(page.first_index) != next_index {
                return Err(Error::MalformedPayload(ParseError::InvalidValue(format!(
                    "{} page starts at index {}, expected {}",
                    sensor, page.first_index, next_index
                ))));
            }

            let mut taken = 0;
            for (reading, value) in readings[received..].iter_mut().zip(page.decoded()) {
                reading.values.insert(sensor, value);
                taken += 1;
            }
            received += taken;
            trace!(
                %sensor,
                first_index = page.first_index,
                count = page.len(),
                received,
                "History page"
            );

            self.options.report_progress(&HistoryProgress {
                sensor,
                pass,
                total_passes,
                received,
                expected,
            });
        }

        debug!(%sensor, received, "History pass complete");
        Ok(())
    }
}
