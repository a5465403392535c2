//! Config validation: misspelled-key detection with Levenshtein suggestions
//! and range checks.
//!
//! Environment variables fail silently when misspelled (`WINDOW_SIZE_SECS`
//! simply falls back to the default), so every variable close to a known key
//! is reported with a "did you mean?" suggestion. Warnings never block startup;
//! range errors do.

use std::collections::HashSet;

use super::defaults::MAX_PLOT_ANIMATION_FPS;
use super::keys;
use super::MonitorConfig;

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, " (did you mean '{s}'?)")?;
        }
        Ok(())
    }
}

/// Every environment key the monitor reads.
pub fn known_config_keys() -> HashSet<&'static str> {
    keys::ALL.iter().copied().collect()
}

fn levenshtein(a: &str, b: &str) -> usize {
    let b_len = b.chars().count();
    if a.is_empty() {
        return b_len;
    }
    if b_len == 0 {
        return a.chars().count();
    }

    let mut prev: Vec<usize> = (0..=b_len).collect();
    let mut curr = vec![0; b_len + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.chars().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_len]
}

/// Closest known key within edit distance 3, if any.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    let mut best: Option<(&str, usize)> = None;
    for &k in known {
        let dist = levenshtein(unknown, k);
        if dist == 0 || dist > 3 {
            continue;
        }
        match best {
            Some((_, best_dist)) if dist >= best_dist => {}
            _ => best = Some((k, dist)),
        }
    }
    best.map(|(k, _)| k.to_string())
}

/// Warn about environment variables that look like misspelled monitor keys.
///
/// Unrelated variables (`PATH`, `HOME`, ...) are far from every known key and
/// produce nothing.
pub fn validate_unknown_keys<'a, I>(present: I) -> Vec<ValidationWarning>
where
    I: IntoIterator<Item = &'a str>,
{
    let known = known_config_keys();
    present
        .into_iter()
        .filter(|key| !known.contains(key))
        .filter_map(|key| {
            suggest_correction(key, &known).map(|suggestion| ValidationWarning {
                field: key.to_string(),
                message: format!("unknown setting '{key}' is ignored"),
                suggestion: Some(suggestion),
            })
        })
        .collect()
}

/// Range checks. Returns `(errors, warnings)`; any error rejects the config.
pub fn validate_ranges(config: &MonitorConfig) -> (Vec<String>, Vec<ValidationWarning>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if config.window_size_secs == 0 {
        errors.push(format!("{} must be > 0", keys::WINDOW_SIZE_SEC));
    }

    if config.plot_animation_fps == 0 || config.plot_animation_fps > MAX_PLOT_ANIMATION_FPS {
        errors.push(format!(
            "{} = {} is outside 1-{MAX_PLOT_ANIMATION_FPS}",
            keys::PLOT_ANIMATION_FPS,
            config.plot_animation_fps
        ));
    }

    if config.default_timeout_ms == 0 {
        errors.push(format!("{} must be > 0", keys::DEFAULT_TIME_OUT_MS));
    }

    if config.field_timeout_ms == 0 {
        errors.push(format!("{} must be > 0", keys::FIELD_TIME_OUT_MS));
    }

    // Two-tier policy: a field stall must be detectable well before a base
    // operation would give up.
    if config.field_timeout_ms >= config.default_timeout_ms {
        errors.push(format!(
            "{} = {} must be shorter than {} = {}",
            keys::FIELD_TIME_OUT_MS,
            config.field_timeout_ms,
            keys::DEFAULT_TIME_OUT_MS,
            config.default_timeout_ms
        ));
    }

    if !config.device_base_url.starts_with("http://") && !config.device_base_url.starts_with("https://") {
        errors.push(format!(
            "{} = {:?} must be an http(s) URL",
            keys::DEVICE_BASE_URL,
            config.device_base_url
        ));
    }

    if config.auto_refresh_interval_secs == 0 {
        warnings.push(ValidationWarning {
            field: keys::AUTO_REFRESH_INTERVAL_SEC.to_string(),
            message: "auto-refresh interval 0 leaves the device dashboard static".to_string(),
            suggestion: None,
        });
    }

    // A field timeout shorter than the device refresh is the intended regime;
    // one far beyond it makes session-loss detection sluggish.
    if config.field_timeout_ms > config.auto_refresh_interval_secs.saturating_mul(2_000) {
        warnings.push(ValidationWarning {
            field: keys::FIELD_TIME_OUT_MS.to_string(),
            message: format!(
                "field timeout {}ms exceeds twice the device refresh interval ({}s)",
                config.field_timeout_ms, config.auto_refresh_interval_secs
            ),
            suggestion: None,
        });
    }

    if config.window_size_secs < config.auto_refresh_interval_secs.saturating_mul(2) {
        warnings.push(ValidationWarning {
            field: keys::WINDOW_SIZE_SEC.to_string(),
            message: format!(
                "window of {}s holds fewer than two device refreshes",
                config.window_size_secs
            ),
            suggestion: None,
        });
    }

    (errors, warnings)
}
