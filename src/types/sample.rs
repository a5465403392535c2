//! Sample types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single metric reading in the numeric domain its field declares.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Integer(i64),
    Float(f64),
}

impl MetricValue {
    /// Widen to `f64` for plotting and statistics.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Integer(v) => v as f64,
            Self::Float(v) => v,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v:.1}"),
        }
    }
}

/// One complete reading of the radio link.
///
/// A sample always carries every field the acquisition cycle asked for;
/// partial cycles are discarded before a `Sample` is ever built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Capture time in seconds on the acquisition clock (monotonic, anchored
    /// at loop start).
    pub captured_at: f64,

    /// Wall-clock capture time, for display and export.
    pub wall_time: DateTime<Utc>,

    /// Metric key (e.g. `rsrp_dbm`) -> value.
    pub values: BTreeMap<String, MetricValue>,
}

impl Sample {
    pub fn new(captured_at: f64, values: BTreeMap<String, MetricValue>) -> Self {
        Self {
            captured_at,
            wall_time: Utc::now(),
            values,
        }
    }

    /// Look up a metric by key.
    pub fn value(&self, key: &str) -> Option<MetricValue> {
        self.values.get(key).copied()
    }

    /// Seconds elapsed between capture and `now` on the same clock.
    pub fn age_at(&self, now: f64) -> f64 {
        now - self.captured_at
    }
}
