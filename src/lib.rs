//! linkscope: live 5G radio-link quality monitor
//!
//! Samples RSRP / RSRQ / SINR from a CPE web dashboard, keeps a sliding time
//! window of readings, and renders it continuously.
//!
//! ## Architecture
//!
//! - **Acquisition**: `SampleSource` adapters (web dashboard, simulator)
//! - **Pipeline**: acquisition loop (producer), window buffer, render loop (consumer)
//! - **API**: optional read-only chart feed over HTTP
//! - **gNB**: offline analysis of srsRAN gNB console logs

pub mod acquisition;
pub mod api;
pub mod config;
pub mod gnb;
pub mod pipeline;
pub mod types;

// Re-export configuration
pub use config::{ConfigError, Credentials, MonitorConfig};

// Re-export commonly used types
pub use types::{DeviceInfo, MetricValue, Sample};

// Re-export acquisition components
pub use acquisition::{
    AcquisitionError, MetricSpec, ParseError, SampleSource, SimulatedSource, SourceError,
    WebUiSource, RADIO_METRICS,
};

// Re-export pipeline components
pub use pipeline::{
    AcquisitionLoop, ChartFrame, ChartSink, LogSink, LoopReport, LoopSettings, LoopState,
    RenderLoop, SharedFrame, WindowBuffer,
};
