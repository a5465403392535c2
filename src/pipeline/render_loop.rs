//! Render loop: polls the window at a fixed cadence and hands chart frames
//! to a sink.
//!
//! The renderer never talks to the acquisition loop; it only takes
//! `WindowBuffer::snapshot()` on each tick. A slow sink simply misses ticks.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::window::WindowBuffer;
use crate::acquisition::{MetricSpec, RADIO_METRICS};
use crate::types::Sample;

// ============================================================================
// Chart Frame
// ============================================================================

/// now / min / max / avg of one series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeriesStats {
    pub now: f64,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
}

impl SeriesStats {
    /// `None` for an empty series.
    #[allow(clippy::cast_precision_loss)]
    pub fn from_values(values: &[f64]) -> Option<Self> {
        let now = *values.last()?;
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let avg = values.iter().sum::<f64>() / values.len() as f64;
        Some(Self { now, min, max, avg })
    }
}

/// One metric's plot data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub key: &'static str,
    pub unit: &'static str,
    pub y_range: (f64, f64),
    /// `(relative_time, value)`, relative_time in `[-window, 0]`
    pub points: Vec<(f64, f64)>,
    pub stats: Option<SeriesStats>,
}

/// Everything a chart needs for one redraw.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartFrame {
    /// X-axis span `[-window_secs, 0]`
    pub window_secs: f64,
    /// Capture time of the newest sample (acquisition clock)
    pub newest_at: Option<f64>,
    pub sample_count: usize,
    pub series: Vec<Series>,
}

impl ChartFrame {
    /// Build a frame from a window snapshot (oldest first).
    pub fn from_snapshot(samples: &[Sample], window: Duration, metrics: &[MetricSpec]) -> Self {
        let newest_at = samples.last().map(|s| s.captured_at);
        let origin = newest_at.unwrap_or(0.0);

        let series = metrics
            .iter()
            .map(|spec| {
                let points: Vec<(f64, f64)> = samples
                    .iter()
                    .filter_map(|s| {
                        s.value(spec.key)
                            .map(|v| (s.captured_at - origin, v.as_f64()))
                    })
                    .collect();
                let values: Vec<f64> = points.iter().map(|&(_, v)| v).collect();
                Series {
                    key: spec.key,
                    unit: spec.unit,
                    y_range: spec.y_range,
                    stats: SeriesStats::from_values(&values),
                    points,
                }
            })
            .collect();

        Self {
            window_secs: window.as_secs_f64(),
            newest_at,
            sample_count: samples.len(),
            series,
        }
    }

    pub fn series(&self, key: &str) -> Option<&Series> {
        self.series.iter().find(|s| s.key == key)
    }
}

// ============================================================================
// Sinks
// ============================================================================

/// Consumer of chart frames. Called once per render tick.
pub trait ChartSink: Send + 'static {
    fn present(&mut self, frame: &ChartFrame);
}

/// Logs a status line whenever a new sample reaches the chart.
#[derive(Debug, Default)]
pub struct LogSink {
    last_seen: Option<f64>,
}

impl ChartSink for LogSink {
    fn present(&mut self, frame: &ChartFrame) {
        if frame.newest_at.is_none() || frame.newest_at == self.last_seen {
            return;
        }
        self.last_seen = frame.newest_at;

        let line: Vec<String> = frame
            .series
            .iter()
            .filter_map(|s| {
                s.stats.map(|st| {
                    format!(
                        "{} {:.0}{} (min/max/avg {:.0}/{:.0}/{:.1})",
                        s.key, st.now, s.unit, st.min, st.max, st.avg
                    )
                })
            })
            .collect();
        info!(samples = frame.sample_count, "{}", line.join(" | "));
    }
}

/// Latest frame behind a lock, read by the HTTP chart feed.
#[derive(Debug, Clone, Default)]
pub struct SharedFrame {
    inner: Arc<RwLock<Option<ChartFrame>>>,
}

impl SharedFrame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self) -> Option<ChartFrame> {
        self.inner
            .read()
            .unwrap_or_else(|e| {
                warn!("SharedFrame lock poisoned on read, recovering");
                e.into_inner()
            })
            .clone()
    }
}

impl ChartSink for SharedFrame {
    fn present(&mut self, frame: &ChartFrame) {
        let mut slot = self.inner.write().unwrap_or_else(|e| {
            warn!("SharedFrame lock poisoned on write, recovering");
            e.into_inner()
        });
        *slot = Some(frame.clone());
    }
}

/// Fan a frame out to several sinks.
impl ChartSink for Vec<Box<dyn ChartSink>> {
    fn present(&mut self, frame: &ChartFrame) {
        for sink in self.iter_mut() {
            sink.present(frame);
        }
    }
}

// ============================================================================
// Render Loop
// ============================================================================

/// Polls the window every `frame_interval` and presents a frame.
pub struct RenderLoop<K: ChartSink> {
    buffer: Arc<WindowBuffer>,
    frame_interval: Duration,
    metrics: Vec<MetricSpec>,
    sink: K,
    cancel_token: CancellationToken,
}

impl<K: ChartSink> RenderLoop<K> {
    pub fn new(
        buffer: Arc<WindowBuffer>,
        frame_interval: Duration,
        sink: K,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            buffer,
            frame_interval,
            metrics: RADIO_METRICS.to_vec(),
            sink,
            cancel_token,
        }
    }

    /// Render until cancelled. Returns the number of frames presented.
    pub async fn run(mut self) -> u64 {
        let mut ticker = tokio::time::interval(self.frame_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut frames = 0u64;

        debug!(interval_ms = self.frame_interval.as_millis(), "Render loop starting");

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => break,
                _ = ticker.tick() => {
                    let snapshot = self.buffer.snapshot();
                    let frame = ChartFrame::from_snapshot(&snapshot, self.buffer.window(), &self.metrics);
                    self.sink.present(&frame);
                    frames += 1;
                }
            }
        }

        debug!(frames, "Render loop stopped");
        frames
    }
}
