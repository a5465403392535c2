//! Shared data structures for the link-quality acquisition pipeline
//!
//! - `Sample`: one timestamped set of radio metrics (RSRP, RSRQ, SINR)
//! - `MetricValue`: a reading in its declared numeric domain
//! - `DeviceInfo`: identifying metadata read once per session

mod device;
mod sample;

pub use device::*;
pub use sample::*;
