//! Field catalog and text-to-value conversion
//!
//! The device dashboard exposes each reading as display text with a unit
//! suffix, e.g. `-85 dBm`, `-10 dB`, `12 dB`. Each metric declares the
//! dashboard field it is read from, the suffix to strip, and its numeric
//! domain.

use super::error::{NumericDomain, ParseError};
use crate::types::MetricValue;

/// One radio metric and where it lives on the dashboard.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricSpec {
    /// Key in the resulting sample (e.g. `rsrp_dbm`)
    pub key: &'static str,
    /// Dashboard field name (e.g. `rsrp_5g`)
    pub field: &'static str,
    /// Display unit suffix stripped before parsing
    pub unit: &'static str,
    pub domain: NumericDomain,
    /// Chart y-range `(min, max)` in `unit`
    pub y_range: (f64, f64),
}

pub const RSRP: MetricSpec = MetricSpec {
    key: "rsrp_dbm",
    field: "rsrp_5g",
    unit: "dBm",
    domain: NumericDomain::Integer,
    y_range: (-140.0, -40.0),
};

pub const RSRQ: MetricSpec = MetricSpec {
    key: "rsrq_db",
    field: "rsrq_5g",
    unit: "dB",
    domain: NumericDomain::Integer,
    y_range: (-20.0, 0.0),
};

pub const SINR: MetricSpec = MetricSpec {
    key: "sinr_db",
    field: "sinr_5g",
    unit: "dB",
    domain: NumericDomain::Integer,
    y_range: (-10.0, 40.0),
};

/// Metrics read on every acquisition cycle, in read order.
pub const RADIO_METRICS: [MetricSpec; 3] = [RSRP, RSRQ, SINR];

/// Identifying metadata fields and the view each is shown on.
pub mod metadata {
    /// Landing view
    pub const MODEL: &str = "span_module_name";
    /// Landing view
    pub const MAC: &str = "span_sysmac";
    /// Metrics view
    pub const IMSI: &str = "imsi";
    /// Metrics view
    pub const BAND: &str = "band5g";
}

/// Strip the unit suffix and convert to the metric's numeric domain.
pub fn parse_metric(spec: &MetricSpec, text: &str) -> Result<MetricValue, ParseError> {
    parse_value(spec.field, spec.unit, spec.domain, text)
}

fn parse_value(
    field: &str,
    unit: &str,
    domain: NumericDomain,
    text: &str,
) -> Result<MetricValue, ParseError> {
    let trimmed = text.trim();
    let residual = if unit.is_empty() {
        trimmed
    } else {
        trimmed.strip_suffix(unit).unwrap_or(trimmed).trim_end()
    };

    if residual.is_empty() {
        return Err(ParseError::Empty {
            field: field.to_string(),
        });
    }

    let not_numeric = || ParseError::NotNumeric {
        field: field.to_string(),
        text: residual.to_string(),
        expected: domain,
    };

    match domain {
        NumericDomain::Integer => residual
            .parse::<i64>()
            .map(MetricValue::Integer)
            .map_err(|_| not_numeric()),
        NumericDomain::Float => residual
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(MetricValue::Float)
            .ok_or_else(not_numeric),
    }
}
