//! Environment-sourced monitor configuration.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use super::defaults;
use super::validation::{validate_ranges, ValidationWarning};

/// Environment keys recognised by [`MonitorConfig::from_lookup`].
pub mod keys {
    pub const WINDOW_SIZE_SEC: &str = "WINDOW_SIZE_SEC";
    pub const DEFAULT_TIME_OUT_MS: &str = "DEFAULT_TIME_OUT_MS";
    pub const FIELD_TIME_OUT_MS: &str = "FIELD_TIME_OUT_MS";
    pub const PLOT_ANIMATION_FPS: &str = "PLOT_ANIMATION_FPS";
    pub const POLL_INTERVAL_MS: &str = "POLL_INTERVAL_MS";
    pub const AUTO_REFRESH_INTERVAL_SEC: &str = "AUTO_REFRESH_INTERVAL_SEC";
    pub const DEVICE_BASE_URL: &str = "DEVICE_BASE_URL";
    pub const WEBUI_USERNAME: &str = "PEGATRON_WEBUI_USERNAME";
    pub const WEBUI_PASSWORD: &str = "PEGATRON_WEBUI_PASSWORD";
    pub const HTTP_ADDR: &str = "LINKSCOPE_HTTP_ADDR";

    /// Every key above, for typo detection.
    pub const ALL: &[&str] = &[
        WINDOW_SIZE_SEC,
        DEFAULT_TIME_OUT_MS,
        FIELD_TIME_OUT_MS,
        PLOT_ANIMATION_FPS,
        POLL_INTERVAL_MS,
        AUTO_REFRESH_INTERVAL_SEC,
        DEVICE_BASE_URL,
        WEBUI_USERNAME,
        WEBUI_PASSWORD,
        HTTP_ADDR,
    ];
}

/// Configuration errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} = {value:?} is not a valid {expected}")]
    Invalid {
        key: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("configuration rejected: {}", .0.join("; "))]
    OutOfRange(Vec<String>),
}

/// Dashboard login. Opaque to the core; only the web adapter reads it.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Runtime configuration for the acquisition and rendering pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Buffer retention and chart x-span (seconds)
    pub window_size_secs: u64,
    /// Base timeout for connect / navigate / configure (ms)
    pub default_timeout_ms: u64,
    /// Steady-state per-field timeout (ms)
    pub field_timeout_ms: u64,
    /// Renderer cadence
    pub plot_animation_fps: u32,
    /// Pause between successful cycles (ms)
    pub poll_interval_ms: u64,
    /// Refresh period pushed to the device (seconds)
    pub auto_refresh_interval_secs: u64,
    /// Dashboard root URL
    pub device_base_url: String,
    /// Dashboard login, if provided
    pub credentials: Option<Credentials>,
    /// Chart feed bind address, if enabled
    pub http_addr: Option<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            window_size_secs: defaults::WINDOW_SIZE_SEC,
            default_timeout_ms: defaults::DEFAULT_TIME_OUT_MS,
            field_timeout_ms: defaults::FIELD_TIME_OUT_MS,
            plot_animation_fps: defaults::PLOT_ANIMATION_FPS,
            poll_interval_ms: defaults::POLL_INTERVAL_MS,
            auto_refresh_interval_secs: defaults::AUTO_REFRESH_INTERVAL_SEC,
            device_base_url: defaults::DEVICE_BASE_URL.to_string(),
            credentials: None,
            http_addr: None,
        }
    }
}

impl MonitorConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load through an arbitrary key lookup. Unset or blank keys fall back to
    /// their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let base = Self::default();

        let credentials = match (get(keys::WEBUI_USERNAME), get(keys::WEBUI_PASSWORD)) {
            (Some(username), Some(password)) => Some(Credentials { username, password }),
            (Some(_), None) => return Err(ConfigError::Missing(keys::WEBUI_PASSWORD)),
            (None, Some(_)) => return Err(ConfigError::Missing(keys::WEBUI_USERNAME)),
            (None, None) => None,
        };

        Ok(Self {
            window_size_secs: parse_or(get(keys::WINDOW_SIZE_SEC), keys::WINDOW_SIZE_SEC, base.window_size_secs)?,
            default_timeout_ms: parse_or(get(keys::DEFAULT_TIME_OUT_MS), keys::DEFAULT_TIME_OUT_MS, base.default_timeout_ms)?,
            field_timeout_ms: parse_or(get(keys::FIELD_TIME_OUT_MS), keys::FIELD_TIME_OUT_MS, base.field_timeout_ms)?,
            plot_animation_fps: parse_or(get(keys::PLOT_ANIMATION_FPS), keys::PLOT_ANIMATION_FPS, base.plot_animation_fps)?,
            poll_interval_ms: parse_or(get(keys::POLL_INTERVAL_MS), keys::POLL_INTERVAL_MS, base.poll_interval_ms)?,
            auto_refresh_interval_secs: parse_or(
                get(keys::AUTO_REFRESH_INTERVAL_SEC),
                keys::AUTO_REFRESH_INTERVAL_SEC,
                base.auto_refresh_interval_secs,
            )?,
            device_base_url: get(keys::DEVICE_BASE_URL)
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(base.device_base_url),
            credentials,
            http_addr: get(keys::HTTP_ADDR),
        })
    }

    /// Reject physically meaningless settings; return the non-fatal warnings.
    pub fn validate(&self) -> Result<Vec<ValidationWarning>, ConfigError> {
        let (errors, warnings) = validate_ranges(self);
        if errors.is_empty() {
            Ok(warnings)
        } else {
            Err(ConfigError::OutOfRange(errors))
        }
    }

    /// Credentials, required by sources that log in to the device.
    pub fn require_credentials(&self) -> Result<&Credentials, ConfigError> {
        self.credentials
            .as_ref()
            .ok_or(ConfigError::Missing(keys::WEBUI_USERNAME))
    }

    pub const fn window(&self) -> Duration {
        Duration::from_secs(self.window_size_secs)
    }

    pub const fn base_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    pub const fn field_timeout(&self) -> Duration {
        Duration::from_millis(self.field_timeout_ms)
    }

    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Time between renderer ticks.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.plot_animation_fps.max(1)))
    }
}

fn parse_or<T: std::str::FromStr>(
    raw: Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
            key,
            value,
            expected: "non-negative integer",
        }),
    }
}
