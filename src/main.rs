//! linkscope - live 5G radio-link quality monitor
//!
//! Streams RSRP / RSRQ / SINR from a CPE web dashboard into a sliding window
//! and renders it continuously.
//!
//! # Usage
//!
//! ```bash
//! # Monitor the device configured in .env
//! ./linkscope
//!
//! # Demo without a device, with the chart feed on port 8080
//! ./linkscope --simulate --http 0.0.0.0:8080
//!
//! # Summarize a srsRAN gNB console log
//! ./linkscope gnb-report comp/gnb_output.txt
//! ```
//!
//! # Environment Variables
//!
//! - `PEGATRON_WEBUI_USERNAME` / `PEGATRON_WEBUI_PASSWORD`: dashboard login
//! - `DEVICE_BASE_URL`: dashboard root (default: http://192.168.225.1)
//! - `WINDOW_SIZE_SEC`, `DEFAULT_TIME_OUT_MS`, `FIELD_TIME_OUT_MS`,
//!   `PLOT_ANIMATION_FPS`, `POLL_INTERVAL_MS`, `AUTO_REFRESH_INTERVAL_SEC`
//! - `LINKSCOPE_HTTP_ADDR`: enable the chart feed on this address
//! - `RUST_LOG`: Logging level (default: info)

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use clap::Parser;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use linkscope::acquisition::{SampleSource, SimulatedSource, WebUiSource};
use linkscope::api::{create_app, ApiState};
use linkscope::config::{validation, Credentials, MonitorConfig};
use linkscope::gnb;
use linkscope::pipeline::{
    AcquisitionLoop, ChartSink, LogSink, LoopSettings, RenderLoop, SharedFrame, WindowBuffer,
};

/// How long tasks get to wind down (close the device session) after shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "linkscope")]
#[command(about = "Live 5G radio-link quality monitor (RSRP / RSRQ / SINR)")]
#[command(version)]
struct CliArgs {
    /// Use a synthetic random-walk source instead of the device dashboard
    #[arg(long)]
    simulate: bool,

    /// Expire the simulated session every N metric reads (exercises reauthentication).
    /// N is at least one full cycle of RSRP, RSRQ and SINR.
    #[arg(
        long,
        value_name = "N",
        requires = "simulate",
        value_parser = clap::value_parser!(u64).range(3..)
    )]
    sim_expire_every: Option<u64>,

    /// Serve the chart feed on this address (overrides LINKSCOPE_HTTP_ADDR)
    #[arg(long, value_name = "ADDR")]
    http: Option<String>,

    #[command(subcommand)]
    command: Option<SubCommand>,
}

#[derive(clap::Subcommand, Debug)]
enum SubCommand {
    /// Summarize RSRP and MCS from a srsRAN gNB console log
    GnbReport {
        /// Path to the captured console output
        file: PathBuf,
    },
}

// ============================================================================
// Task Names for Supervisor Logging
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum TaskName {
    Acquisition,
    Renderer,
    HttpServer,
}

impl std::fmt::Display for TaskName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Acquisition => write!(f, "Acquisition"),
            Self::Renderer => write!(f, "Renderer"),
            Self::HttpServer => write!(f, "HttpServer"),
        }
    }
}

// ============================================================================
// Task Spawning
// ============================================================================

/// Spawn the acquisition loop into the JoinSet. A fatal connect/auth error
/// fails the task and brings the supervisor down.
fn spawn_acquisition<S: SampleSource>(
    task_set: &mut JoinSet<Result<TaskName>>,
    acquisition: AcquisitionLoop<S>,
) {
    task_set.spawn(async move {
        info!("[Acquisition] Task starting");

        let report = acquisition.run().await.context("acquisition loop failed")?;
        info!(
            cycles = report.cycles,
            samples = report.samples_pushed,
            parse_skips = report.parse_skips,
            voided = report.voided_cycles,
            reauthentications = report.reauthentications,
            device = ?report.device,
            "[Acquisition] Stopped"
        );
        Ok(TaskName::Acquisition)
    });
}

fn spawn_renderer<K: ChartSink>(task_set: &mut JoinSet<Result<TaskName>>, render: RenderLoop<K>) {
    task_set.spawn(async move {
        info!("[Renderer] Task starting");
        let frames = render.run().await;
        info!(frames, "[Renderer] Stopped");
        Ok(TaskName::Renderer)
    });
}

/// Spawn the HTTP server task into the JoinSet.
fn spawn_http_server(
    task_set: &mut JoinSet<Result<TaskName>>,
    listener: tokio::net::TcpListener,
    app: Router,
    cancel_token: CancellationToken,
) {
    task_set.spawn(async move {
        info!("[HttpServer] Task starting");

        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                cancel_token.cancelled().await;
                info!("[HttpServer] Received shutdown signal");
            })
            .await;

        match result {
            Ok(()) => {
                info!("[HttpServer] Graceful shutdown complete");
                Ok(TaskName::HttpServer)
            }
            Err(e) => {
                error!("[HttpServer] Server error: {}", e);
                Err(anyhow::anyhow!("HTTP server error: {}", e))
            }
        }
    });
}

// ============================================================================
// Supervisor
// ============================================================================

/// Run the supervisor loop: monitor tasks, cancel on failure.
///
/// After cancellation the remaining tasks get [`SHUTDOWN_GRACE`] to finish so
/// the acquisition loop can close its device session.
async fn run_supervisor(
    task_set: &mut JoinSet<Result<TaskName>>,
    cancel_token: CancellationToken,
) -> Result<()> {
    info!("Supervisor: all tasks spawned, monitoring...");

    let mut failure = None;
    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                info!("Supervisor: shutdown signal received");
                break;
            }
            result = task_set.join_next() => {
                match result {
                    Some(Ok(Ok(task_name))) => {
                        info!("Supervisor: task {} completed normally", task_name);
                    }
                    Some(Ok(Err(e))) => {
                        error!("Supervisor: task failed with error: {:#}", e);
                        cancel_token.cancel();
                        failure = Some(e);
                        break;
                    }
                    Some(Err(e)) => {
                        error!("Supervisor: task panicked: {}", e);
                        cancel_token.cancel();
                        failure = Some(anyhow::anyhow!("Task panicked: {}", e));
                        break;
                    }
                    None => {
                        info!("Supervisor: all tasks completed");
                        break;
                    }
                }
            }
        }
    }

    let drain = async {
        while let Some(result) = task_set.join_next().await {
            match result {
                Ok(Ok(task_name)) => info!("Supervisor: task {} stopped", task_name),
                Ok(Err(e)) => warn!("Supervisor: task failed during shutdown: {:#}", e),
                Err(e) => warn!("Supervisor: task panicked during shutdown: {}", e),
            }
        }
    };
    if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
        warn!(
            grace_secs = SHUTDOWN_GRACE.as_secs(),
            "Supervisor: tasks did not stop in time, aborting"
        );
        task_set.abort_all();
    }

    failure.map_or(Ok(()), Err)
}

// ============================================================================
// Monitor Runner
// ============================================================================

/// Run acquisition, rendering and the optional chart feed with any source.
async fn run_monitor<S: SampleSource>(
    source: S,
    credentials: Credentials,
    config: &MonitorConfig,
    http_addr: Option<String>,
    cancel_token: CancellationToken,
) -> Result<()> {
    let source_name = source.source_name().to_string();
    info!(
        source = %source_name,
        window_secs = config.window_size_secs,
        field_timeout_ms = config.field_timeout_ms,
        base_timeout_ms = config.default_timeout_ms,
        fps = config.plot_animation_fps,
        "Starting link monitor"
    );

    let buffer = Arc::new(WindowBuffer::new(config.window()));
    let acquisition = AcquisitionLoop::new(
        source,
        credentials,
        Arc::clone(&buffer),
        LoopSettings::from_config(config),
        cancel_token.clone(),
    );
    let loop_state = acquisition.state_watch();

    let shared = SharedFrame::new();
    let sinks: Vec<Box<dyn ChartSink>> = vec![Box::new(LogSink::default()), Box::new(shared.clone())];
    let render = RenderLoop::new(
        Arc::clone(&buffer),
        config.frame_interval(),
        sinks,
        cancel_token.clone(),
    );

    let mut task_set: JoinSet<Result<TaskName>> = JoinSet::new();

    if let Some(addr) = http_addr {
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind to {}", addr))?;
        info!("Chart feed available at: http://{}/api/v1/chart", addr);

        let app = create_app(ApiState::new(Arc::clone(&buffer), shared, loop_state, source_name));
        spawn_http_server(&mut task_set, listener, app, cancel_token.clone());
    }

    spawn_acquisition(&mut task_set, acquisition);
    spawn_renderer(&mut task_set, render);

    run_supervisor(&mut task_set, cancel_token).await
}

// ============================================================================
// gNB Report
// ============================================================================

fn run_gnb_report(file: &std::path::Path, config: &MonitorConfig) -> Result<()> {
    let report = gnb::load_report(file)?;
    #[allow(clippy::cast_precision_loss)]
    let window = config.window_size_secs as f64;

    info!(
        file = %file.display(),
        rows = report.points.len(),
        in_window = report.within(window).count(),
        window_secs = config.window_size_secs,
        "srsRAN gNB signal analysis"
    );

    match (report.rsrp_min, report.rsrp_max) {
        (Some(min), Some(max)) => {
            info!("gNB RSRP min/max/avg = {min}/{max}/{:.1} dBm", report.rsrp_avg);
        }
        _ => warn!("No RSRP readings in {}", file.display()),
    }
    if let (Some(min), Some(max)) = (report.mcs_min, report.mcs_max) {
        info!("gNB MCS min/max = {min}/{max}");
    }
    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    // .env first so RUST_LOG and device settings can live there
    let dotenv = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    if let Ok(path) = dotenv {
        info!("Loaded environment from {}", path.display());
    }

    let args = CliArgs::parse();

    let config = MonitorConfig::from_env().context("Invalid monitor configuration")?;
    for warning in config.validate()? {
        warn!("Config: {}", warning);
    }
    let present: Vec<String> = std::env::vars().map(|(key, _)| key).collect();
    for warning in validation::validate_unknown_keys(present.iter().map(String::as_str)) {
        warn!("Config: {}", warning);
    }

    // Subcommand dispatch
    if let Some(SubCommand::GnbReport { file }) = &args.command {
        return run_gnb_report(file, &config);
    }

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, initiating shutdown...");
        shutdown_token.cancel();
    });

    let http_addr = args.http.or_else(|| config.http_addr.clone());

    if args.simulate {
        info!("Input: simulated link (no device)");
        let mut source = SimulatedSource::new();
        if let Some(reads) = args.sim_expire_every {
            source = source.expiring_every(reads);
        }
        let credentials = config.credentials.clone().unwrap_or_default();
        run_monitor(source, credentials, &config, http_addr, cancel_token).await?;
    } else {
        info!("Input: device dashboard at {}", config.device_base_url);
        let credentials = config.require_credentials()?.clone();
        let source = WebUiSource::new(&config.device_base_url)
            .context("Failed to build dashboard client")?;
        run_monitor(source, credentials, &config, http_addr, cancel_token).await?;
    }

    info!("linkscope shutdown complete");
    Ok(())
}
