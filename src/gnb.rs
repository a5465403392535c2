//! srsRAN gNB console-log analysis.
//!
//! The gNB prints one metrics row per UE per second. Rows are appended, so the
//! newest reading is the last line of the file. Each row is placed on a
//! relative time axis counting back from the end: the last row is at 0 s, the
//! one before at -1 s, and so on. Rows whose RSRP is `n/a` keep their slot on
//! the axis but contribute no point.

use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

/// Whitespace-separated column holding the UE RSRP (dBm).
pub const RSRP_COLUMN: usize = 13;
/// Whitespace-separated column holding the downlink MCS index.
pub const MCS_COLUMN: usize = 15;
/// Highest valid MCS index.
pub const MAX_MCS: u8 = 31;

#[derive(Debug, Error)]
pub enum GnbLogError {
    #[error("failed to read gNB log {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("line {line}: expected at least {expected} columns, found {found}")]
    ShortRow {
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("line {line}: column {column} is not a valid {what}: '{text}'")]
    BadValue {
        line: usize,
        column: usize,
        what: &'static str,
        text: String,
    },
}

/// One usable metrics row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GnbPoint {
    /// Seconds relative to the newest row (<= 0)
    pub relative_time: f64,
    pub rsrp_dbm: f64,
    pub mcs: u8,
}

/// Parsed log with summary statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GnbReport {
    /// Points ordered newest first
    pub points: Vec<GnbPoint>,
    pub rsrp_min: Option<f64>,
    pub rsrp_max: Option<f64>,
    /// 0 when there are no points
    pub rsrp_avg: f64,
    pub mcs_min: Option<u8>,
    pub mcs_max: Option<u8>,
}

impl GnbReport {
    #[allow(clippy::cast_precision_loss)]
    fn from_points(points: Vec<GnbPoint>) -> Self {
        let rsrp = points.iter().map(|p| p.rsrp_dbm);
        let rsrp_min = rsrp.clone().reduce(f64::min);
        let rsrp_max = rsrp.clone().reduce(f64::max);
        let rsrp_avg = if points.is_empty() {
            0.0
        } else {
            rsrp.sum::<f64>() / points.len() as f64
        };

        Self {
            rsrp_min,
            rsrp_max,
            rsrp_avg,
            mcs_min: points.iter().map(|p| p.mcs).min(),
            mcs_max: points.iter().map(|p| p.mcs).max(),
            points,
        }
    }

    /// Points no older than `window_secs`.
    pub fn within(&self, window_secs: f64) -> impl Iterator<Item = &GnbPoint> {
        self.points
            .iter()
            .filter(move |p| p.relative_time >= -window_secs)
    }
}

/// Header and separator lines carry these markers.
fn is_metrics_row(line: &str) -> bool {
    !line.trim().is_empty() && !line.contains("DL") && !line.contains("rsrp")
}

/// Parse the text of a gNB console log.
pub fn parse_console_log(text: &str) -> Result<GnbReport, GnbLogError> {
    let rows: Vec<(usize, &str)> = text
        .lines()
        .enumerate()
        .filter(|(_, line)| is_metrics_row(line))
        .map(|(idx, line)| (idx + 1, line))
        .collect();

    let mut points = Vec::with_capacity(rows.len());
    for (age, (line_no, line)) in rows.into_iter().rev().enumerate() {
        let columns: Vec<&str> = line.split_whitespace().collect();
        if columns.len() <= MCS_COLUMN {
            return Err(GnbLogError::ShortRow {
                line: line_no,
                expected: MCS_COLUMN + 1,
                found: columns.len(),
            });
        }

        let rsrp_text = columns[RSRP_COLUMN];
        if rsrp_text == "n/a" {
            continue;
        }
        let rsrp_dbm = rsrp_text
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| GnbLogError::BadValue {
                line: line_no,
                column: RSRP_COLUMN,
                what: "RSRP",
                text: rsrp_text.to_string(),
            })?;

        let mcs_text = columns[MCS_COLUMN];
        let mcs = mcs_text
            .parse::<u8>()
            .ok()
            .filter(|m| *m <= MAX_MCS)
            .ok_or_else(|| GnbLogError::BadValue {
                line: line_no,
                column: MCS_COLUMN,
                what: "MCS index",
                text: mcs_text.to_string(),
            })?;

        #[allow(clippy::cast_precision_loss)]
        let relative_time = -(age as f64);
        points.push(GnbPoint {
            relative_time,
            rsrp_dbm,
            mcs,
        });
    }

    Ok(GnbReport::from_points(points))
}

/// Read and parse a gNB console log file.
pub fn load_report(path: &Path) -> Result<GnbReport, GnbLogError> {
    let text = std::fs::read_to_string(path).map_err(|source| GnbLogError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_console_log(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "          -----------------DL-----------------------|------------------UL--------------------\n \
        pci rnti  cqi  ri  mcs  brate   ok  nok  (%)  dl_bs | pusch  rsrp  mcs  brate   ok  nok  (%)    bsr";

    fn row(rsrp: &str, mcs: &str) -> String {
        // 13 filler columns, RSRP at 13, filler at 14, MCS at 15, then a tail.
        format!("  1 4601 15 1 27 9.9M 100 0 0% 0 | 23.5 7 {rsrp} x {mcs} 1.2M 50 0 0% 0")
    }

    #[test]
    fn test_row_layout_matches_columns() {
        let line = row("-71.5", "20");
        let cols: Vec<&str> = line.split_whitespace().collect();
        assert_eq!(cols[RSRP_COLUMN], "-71.5");
        assert_eq!(cols[MCS_COLUMN], "20");
    }

    #[test]
    fn test_newest_row_is_time_zero() {
        let log = format!("{HEADER}\n{}\n{}\n{}\n", row("-80", "10"), row("-75", "12"), row("-70", "14"));
        let report = parse_console_log(&log).unwrap();

        assert_eq!(report.points.len(), 3);
        assert_eq!(report.points[0], GnbPoint { relative_time: 0.0, rsrp_dbm: -70.0, mcs: 14 });
        assert_eq!(report.points[2].relative_time, -2.0);
        assert_eq!(report.rsrp_min, Some(-80.0));
        assert_eq!(report.rsrp_max, Some(-70.0));
        assert_eq!(report.rsrp_avg, -75.0);
        assert_eq!(report.mcs_min, Some(10));
        assert_eq!(report.mcs_max, Some(14));
    }

    #[test]
    fn test_na_rows_keep_their_time_slot() {
        let log = format!("{}\n{}\n{}\n", row("-80", "10"), row("n/a", "0"), row("-70", "14"));
        let report = parse_console_log(&log).unwrap();

        let times: Vec<f64> = report.points.iter().map(|p| p.relative_time).collect();
        assert_eq!(times, vec![0.0, -2.0]);
    }

    #[test]
    fn test_empty_log_has_zero_average() {
        let report = parse_console_log(&format!("{HEADER}\n\n")).unwrap();
        assert!(report.points.is_empty());
        assert_eq!(report.rsrp_avg, 0.0);
        assert_eq!(report.rsrp_min, None);
        assert_eq!(report.mcs_max, None);
    }

    #[test]
    fn test_short_row_reports_line_number() {
        let log = format!("{}\n1 2 3\n", row("-80", "10"));
        match parse_console_log(&log) {
            Err(GnbLogError::ShortRow { line, found, .. }) => {
                assert_eq!(line, 2);
                assert_eq!(found, 3);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_out_of_range_mcs_rejected() {
        let err = parse_console_log(&row("-80", "32")).unwrap_err();
        assert!(matches!(err, GnbLogError::BadValue { column: MCS_COLUMN, .. }));
    }

    #[test]
    fn test_within_window() {
        let log: String = (0..10).map(|_| row("-90", "5") + "\n").collect();
        let report = parse_console_log(&log).unwrap();
        assert_eq!(report.within(3.0).count(), 4);
    }

    #[test]
    fn test_load_report_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gnb_output.txt");
        std::fs::write(&path, format!("{HEADER}\n{}\n", row("-65.5", "27"))).unwrap();

        let report = load_report(&path).unwrap();
        assert_eq!(report.rsrp_avg, -65.5);

        let missing = load_report(&dir.path().join("nope.txt")).unwrap_err();
        assert!(matches!(missing, GnbLogError::Io { .. }));
    }
}
