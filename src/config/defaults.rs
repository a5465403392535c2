//! System-wide default constants.
//!
//! Every tunable the monitor reads from the environment has its fallback
//! here. Grouped by subsystem for easy discovery.

// ============================================================================
// Window / Rendering
// ============================================================================

/// Trailing window retained by the buffer and spanned by the chart x-axis (seconds).
pub const WINDOW_SIZE_SEC: u64 = 60;

/// Renderer polling cadence (frames per second).
pub const PLOT_ANIMATION_FPS: u32 = 2;

/// Upper bound on renderer cadence. Faster redraws only burn CPU; the device
/// refreshes every few seconds at best.
pub const MAX_PLOT_ANIMATION_FPS: u32 = 60;

// ============================================================================
// Acquisition Timeouts
// ============================================================================

/// Base timeout for connect / navigate / configure (milliseconds).
pub const DEFAULT_TIME_OUT_MS: u64 = 5_000;

/// Steady-state per-field read timeout (milliseconds).
///
/// The loop sets the device to refresh every `AUTO_REFRESH_INTERVAL_SEC`, so a
/// field that has not materialised after one second means the session is gone.
pub const FIELD_TIME_OUT_MS: u64 = 1_000;

/// Bounded probe for the "another session is active" control (milliseconds).
pub const CONFLICT_PROBE_TIME_OUT_MS: u64 = 1_000;

/// Pause between successful acquisition cycles (milliseconds).
pub const POLL_INTERVAL_MS: u64 = 200;

/// Refresh interval written to the device dashboard (seconds).
pub const AUTO_REFRESH_INTERVAL_SEC: u64 = 3;

// ============================================================================
// Device
// ============================================================================

/// Dashboard root of the outdoor unit on its default LAN address.
pub const DEVICE_BASE_URL: &str = "http://192.168.225.1";

/// Landing view, where the model name and MAC are shown.
pub const LANDING_VIEW: &str = "/";

/// Cellular status view carrying the radio metrics, IMSI and band.
pub const METRICS_VIEW: &str = "/cellular_info.html";

/// Remote option controlling the dashboard's auto-refresh period.
pub const AUTO_REFRESH_OPTION: &str = "autoRefresh_interval";

/// Control that evicts other active dashboard sessions.
pub const SESSION_CONFLICT_CONTROL: &str = "yes";

// ============================================================================
// Reporting
// ============================================================================

/// Log a progress line every N pushed samples.
pub const PROGRESS_LOG_EVERY: u64 = 50;
