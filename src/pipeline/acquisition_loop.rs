//! Acquisition loop: session lifecycle, field reads, and recovery.
//!
//! ```text
//! Connecting -> Authenticated -> Streaming -> ... -> Terminated
//!                                   |   ^
//!                     field timeout v   | first complete read
//!                               Reauthenticating
//! ```
//!
//! Two-tier timeouts drive recovery. Steady-state field reads use a short
//! timeout: the loop itself configures the device to refresh every few
//! seconds, so a field missing past ~1s means the session is gone rather than
//! lagging. Connect / navigate / configure use the long base timeout, and a
//! failure there is fatal. After reauthenticating, field stalls are tolerated
//! until the base timeout elapses (a freshly loaded dashboard may need one
//! refresh to populate); if no complete read arrives by then the loop gives up.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::window::WindowBuffer;
use crate::acquisition::fields::{metadata, parse_metric};
use crate::acquisition::{AcquisitionError, SampleSource, SourceError, RADIO_METRICS};
use crate::config::defaults::{AUTO_REFRESH_OPTION, METRICS_VIEW, PROGRESS_LOG_EVERY};
use crate::config::{Credentials, MonitorConfig};
use crate::types::{DeviceInfo, MetricValue, Sample};

/// Slack granted to an adapter beyond the timeout it was given before the
/// loop stops waiting on it.
const ADAPTER_GRACE: Duration = Duration::from_millis(500);

// ============================================================================
// State
// ============================================================================

/// Acquisition loop state, published on a watch channel for status surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LoopState {
    Connecting,
    Authenticated,
    Streaming,
    Reauthenticating,
    Terminated,
}

impl std::fmt::Display for LoopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Connecting => "Connecting",
            Self::Authenticated => "Authenticated",
            Self::Streaming => "Streaming",
            Self::Reauthenticating => "Reauthenticating",
            Self::Terminated => "Terminated",
        };
        write!(f, "{name}")
    }
}

/// Timing and view settings for one loop.
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub base_timeout: Duration,
    pub field_timeout: Duration,
    pub poll_interval: Duration,
    /// Value written to the device's auto-refresh option (seconds)
    pub refresh_interval_secs: u64,
    /// View carrying the radio metrics
    pub metrics_view: String,
}

impl LoopSettings {
    pub fn from_config(config: &MonitorConfig) -> Self {
        Self {
            base_timeout: config.base_timeout(),
            field_timeout: config.field_timeout(),
            poll_interval: config.poll_interval(),
            refresh_interval_secs: config.auto_refresh_interval_secs,
            ..Self::default()
        }
    }
}

impl Default for LoopSettings {
    fn default() -> Self {
        let config = MonitorConfig::default();
        Self {
            base_timeout: config.base_timeout(),
            field_timeout: config.field_timeout(),
            poll_interval: config.poll_interval(),
            refresh_interval_secs: config.auto_refresh_interval_secs,
            metrics_view: METRICS_VIEW.to_string(),
        }
    }
}

/// Counters returned when the loop stops.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoopReport {
    /// Read cycles started
    pub cycles: u64,
    /// Samples pushed into the window
    pub samples_pushed: u64,
    /// Cycles dropped because a field did not parse
    pub parse_skips: u64,
    /// Cycles voided by a field read failure
    pub voided_cycles: u64,
    /// Completed Streaming -> Reauthenticating transitions
    pub reauthentications: u64,
    /// Metadata read on the first session
    pub device: DeviceInfo,
}

/// How a single read cycle ended.
enum Cycle {
    Pushed,
    Skipped,
    SessionLost(SourceError),
    Cancelled,
}

/// How a session ended.
enum SessionEnd {
    Cancelled,
    Lost(SourceError),
}

// ============================================================================
// Acquisition Loop
// ============================================================================

/// Drives a [`SampleSource`] and feeds the shared [`WindowBuffer`].
///
/// Built with [`new()`](AcquisitionLoop::new), then consumed by
/// [`run()`](AcquisitionLoop::run). The source and its session handle never
/// leave this struct.
pub struct AcquisitionLoop<S: SampleSource> {
    source: S,
    credentials: Credentials,
    buffer: Arc<WindowBuffer>,
    settings: LoopSettings,
    cancel_token: CancellationToken,
    epoch: Instant,
    state: watch::Sender<LoopState>,
    report: LoopReport,
}

impl<S: SampleSource> AcquisitionLoop<S> {
    pub fn new(
        source: S,
        credentials: Credentials,
        buffer: Arc<WindowBuffer>,
        settings: LoopSettings,
        cancel_token: CancellationToken,
    ) -> Self {
        let (state, _) = watch::channel(LoopState::Connecting);
        Self {
            source,
            credentials,
            buffer,
            settings,
            cancel_token,
            epoch: Instant::now(),
            state,
            report: LoopReport::default(),
        }
    }

    /// Subscribe to state transitions.
    pub fn state_watch(&self) -> watch::Receiver<LoopState> {
        self.state.subscribe()
    }

    /// Run until cancelled or a fatal connect/auth error.
    ///
    /// The live session is closed on every exit path.
    pub async fn run(mut self) -> Result<LoopReport, AcquisitionError> {
        info!(source = self.source.source_name(), "Acquisition loop starting");

        let outcome = self.drive().await;
        self.transition(LoopState::Terminated);

        match &outcome {
            Ok(()) => info!(
                samples = self.report.samples_pushed,
                reauthentications = self.report.reauthentications,
                "Acquisition loop stopped"
            ),
            Err(e) => error!(error = %e, "Acquisition loop terminated"),
        }
        outcome.map(|()| self.report)
    }

    async fn drive(&mut self) -> Result<(), AcquisitionError> {
        self.transition(LoopState::Connecting);
        let mut session = match self.connect().await {
            None => return Ok(()),
            Some(result) => result.map_err(|source| AcquisitionError::ConnectOrAuth {
                phase: "connect",
                source,
            })?,
        };

        self.transition(LoopState::Authenticated);
        let mut recovering = false;

        loop {
            let phase = if recovering { "reauthentication" } else { "navigate" };
            match self.prepare_session(&mut session, phase, !recovering).await {
                Ok(true) => {}
                Ok(false) => {
                    self.source.close(session).await;
                    return Ok(());
                }
                Err(e) => {
                    self.source.close(session).await;
                    return Err(e);
                }
            }

            let end = match self.stream(&mut session, recovering).await {
                Ok(end) => end,
                Err(e) => {
                    self.source.close(session).await;
                    return Err(e);
                }
            };

            // The stale session is released before a new one is opened.
            self.source.close(session).await;

            match end {
                SessionEnd::Cancelled => return Ok(()),
                SessionEnd::Lost(cause) => {
                    warn!(cause = %cause, "Session lost, reauthenticating");
                    self.transition(LoopState::Reauthenticating);
                    self.report.reauthentications += 1;
                    session = match self.connect().await {
                        None => return Ok(()),
                        Some(result) => result.map_err(|source| AcquisitionError::ConnectOrAuth {
                            phase: "reauthentication",
                            source,
                        })?,
                    };
                    recovering = true;
                }
            }
        }
    }

    fn transition(&self, next: LoopState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(from = %previous, to = %next, "Acquisition state change");
        }
    }

    async fn connect(&mut self) -> Option<Result<S::Handle, SourceError>> {
        let timeout = self.settings.base_timeout;
        let attempt = self.source.connect(&self.credentials, timeout);
        let bounded = bounded(timeout, attempt, || {
            SourceError::ConnectOrAuth(format!("no response within {}ms", timeout.as_millis()))
        });
        guarded(&self.cancel_token, bounded).await
    }

    /// Configure the device, read metadata (first session only), and move
    /// to the metrics view. A navigation failure is reported under `phase`.
    /// Returns `Ok(false)` if cancelled.
    async fn prepare_session(
        &mut self,
        session: &mut S::Handle,
        phase: &'static str,
        read_metadata: bool,
    ) -> Result<bool, AcquisitionError> {
        let timeout = self.settings.base_timeout;

        let refresh = self.settings.refresh_interval_secs.to_string();
        let configured = guarded(
            &self.cancel_token,
            bounded(
                timeout,
                self.source.configure(session, AUTO_REFRESH_OPTION, &refresh, timeout),
                || SourceError::Configure {
                    option: AUTO_REFRESH_OPTION.to_string(),
                    value: refresh.clone(),
                    message: "timed out".to_string(),
                },
            ),
        )
        .await;
        match configured {
            None => return Ok(false),
            Some(Ok(())) => debug!(interval_secs = %refresh, "Device auto-refresh configured"),
            Some(Err(e)) => warn!(error = %e, "Failed to configure device auto-refresh"),
        }

        let mut info = DeviceInfo::default();
        if read_metadata {
            let Some(model) = self.read_metadata(session, metadata::MODEL).await else {
                return Ok(false);
            };
            let Some(mac) = self.read_metadata(session, metadata::MAC).await else {
                return Ok(false);
            };
            info.model = model;
            info.mac = mac;
        }

        let view = self.settings.metrics_view.clone();
        let navigated = guarded(
            &self.cancel_token,
            bounded(timeout, self.source.navigate(session, &view, timeout), || {
                SourceError::ConnectOrAuth(format!("navigate to {view} timed out"))
            }),
        )
        .await;
        match navigated {
            None => return Ok(false),
            Some(Ok(())) => {}
            Some(Err(source)) => {
                return Err(AcquisitionError::ConnectOrAuth { phase, source });
            }
        }

        if read_metadata {
            let Some(imsi) = self.read_metadata(session, metadata::IMSI).await else {
                return Ok(false);
            };
            let Some(band) = self.read_metadata(session, metadata::BAND).await else {
                return Ok(false);
            };
            info.imsi = imsi;
            info.band = band;
            self.report.device = info;
            let device = &self.report.device;
            let band = device.band_label();
            info!(
                model = device.model.as_deref().unwrap_or("unknown"),
                mac = device.mac.as_deref().unwrap_or("unknown"),
                imsi = device.imsi.as_deref().unwrap_or("unknown"),
                band = band.as_deref().unwrap_or("unknown"),
                "Device identified"
            );
        }

        Ok(true)
    }

    /// Best-effort metadata read. Outer `None` means cancelled.
    async fn read_metadata(&mut self, session: &mut S::Handle, field: &str) -> Option<Option<String>> {
        let timeout = self.settings.base_timeout;
        let read = guarded(
            &self.cancel_token,
            bounded(timeout, self.source.read_field(session, field, timeout), || {
                field_timeout(field, timeout)
            }),
        )
        .await?;
        match read {
            Ok(text) => Some(Some(text)),
            Err(e) => {
                warn!(field, error = %e, "Metadata read failed");
                Some(None)
            }
        }
    }

    /// Read cycles until the session is lost or the loop is cancelled.
    ///
    /// With `recovering`, field stalls are retried until the base timeout
    /// has elapsed; past that the session is declared unrecoverable.
    async fn stream(
        &mut self,
        session: &mut S::Handle,
        mut recovering: bool,
    ) -> Result<SessionEnd, AcquisitionError> {
        let recovery_deadline = Instant::now() + self.settings.base_timeout;
        if !recovering {
            self.transition(LoopState::Streaming);
        }

        loop {
            match self.cycle(session).await {
                Cycle::Cancelled => return Ok(SessionEnd::Cancelled),
                Cycle::SessionLost(cause) if recovering => {
                    if Instant::now() >= recovery_deadline {
                        return Err(AcquisitionError::ConnectOrAuth {
                            phase: "reauthentication",
                            source: SourceError::ConnectOrAuth(format!(
                                "session did not recover within {}ms: {cause}",
                                self.settings.base_timeout.as_millis()
                            )),
                        });
                    }
                    debug!(cause = %cause, "Fields not yet available after reauthentication");
                }
                Cycle::SessionLost(cause) => return Ok(SessionEnd::Lost(cause)),
                Cycle::Pushed | Cycle::Skipped => {
                    if recovering {
                        recovering = false;
                        info!("Session recovered, streaming resumed");
                        self.transition(LoopState::Streaming);
                    }
                }
            }

            let pause = tokio::time::sleep(self.settings.poll_interval);
            if guarded(&self.cancel_token, pause).await.is_none() {
                return Ok(SessionEnd::Cancelled);
            }
        }
    }

    /// One read of every metric. A failed read voids the whole cycle.
    async fn cycle(&mut self, session: &mut S::Handle) -> Cycle {
        self.report.cycles += 1;
        let timeout = self.settings.field_timeout;
        let mut raw = Vec::with_capacity(RADIO_METRICS.len());

        for spec in &RADIO_METRICS {
            let read = guarded(
                &self.cancel_token,
                bounded(timeout, self.source.read_field(session, spec.field, timeout), || {
                    field_timeout(spec.field, timeout)
                }),
            )
            .await;
            match read {
                None => return Cycle::Cancelled,
                Some(Ok(text)) => raw.push((spec, text)),
                Some(Err(e)) => {
                    // A stall is the expected symptom of a dropped session;
                    // anything else is the device refusing us outright.
                    self.report.voided_cycles += 1;
                    if e.is_field_timeout() {
                        debug!(field = spec.field, error = %e, read = raw.len(), "Cycle voided");
                    } else {
                        warn!(field = spec.field, error = %e, read = raw.len(), "Field read rejected, cycle voided");
                    }
                    return Cycle::SessionLost(e);
                }
            }
        }

        let captured_at = self.epoch.elapsed().as_secs_f64();

        let mut values: BTreeMap<String, MetricValue> = BTreeMap::new();
        for (spec, text) in raw {
            match parse_metric(spec, &text) {
                Ok(value) => {
                    values.insert(spec.key.to_string(), value);
                }
                Err(e) => {
                    self.report.parse_skips += 1;
                    warn!(error = %e, "Skipping cycle");
                    return Cycle::Skipped;
                }
            }
        }

        let sample = Sample::new(captured_at, values);
        debug!(captured_at, values = ?sample.values, "Sample captured");
        if self.buffer.push(sample) {
            self.report.samples_pushed += 1;
            if self.report.samples_pushed % PROGRESS_LOG_EVERY == 0 {
                info!(
                    samples = self.report.samples_pushed,
                    window = self.buffer.len(),
                    reauthentications = self.report.reauthentications,
                    "Acquisition progress"
                );
            }
        }
        Cycle::Pushed
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn field_timeout(field: &str, timeout: Duration) -> SourceError {
    SourceError::FieldTimeout {
        field: field.to_string(),
        timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
    }
}

/// Cap an adapter call at `limit` plus a small grace period.
async fn bounded<T, F, E>(limit: Duration, fut: F, on_overrun: E) -> Result<T, SourceError>
where
    F: Future<Output = Result<T, SourceError>>,
    E: FnOnce() -> SourceError,
{
    match tokio::time::timeout(limit + ADAPTER_GRACE, fut).await {
        Ok(result) => result,
        Err(_) => Err(on_overrun()),
    }
}

/// Race a blocking call against cancellation. `None` means cancelled.
async fn guarded<T, F>(cancel_token: &CancellationToken, fut: F) -> Option<T>
where
    F: Future<Output = T>,
{
    tokio::select! {
        biased;
        () = cancel_token.cancelled() => None,
        result = fut => Some(result),
    }
}
