//! Monitor Configuration Module
//!
//! All tunables are sourced from the process environment (a `.env` file in
//! the working directory is loaded first when present).
//!
//! ## Usage
//!
//! ```ignore
//! let config = MonitorConfig::from_env()?;
//! config.validate()?;
//! ```
//!
//! Tests build configs through [`MonitorConfig::from_lookup`] so they never
//! touch the real environment.

mod monitor_config;
pub mod defaults;
pub mod validation;

pub use monitor_config::*;
