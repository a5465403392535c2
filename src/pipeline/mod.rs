//! Acquisition and Rendering Pipeline
//!
//! ```text
//! SampleSource ──► AcquisitionLoop ──push──► WindowBuffer ◄──snapshot── RenderLoop ──► ChartSink
//!                      (producer)            (Arc, mutex)               (consumer)
//! ```
//!
//! The two loops run as independent tasks and share only the window. Both
//! stop on the same cancellation token.

pub mod acquisition_loop;
pub mod render_loop;
pub mod window;

pub use acquisition_loop::{AcquisitionLoop, LoopReport, LoopSettings, LoopState};
pub use render_loop::{ChartFrame, ChartSink, LogSink, RenderLoop, Series, SeriesStats, SharedFrame};
pub use window::WindowBuffer;
