//! Sample acquisition module
//!
//! Abstracts the device dashboard behind [`SampleSource`]: connect (and
//! re-connect), move between views, read one named field as text, and set
//! remote options. Everything above this seam is device-agnostic.

pub mod error;
pub mod fields;
pub mod simulated;
pub mod webui;

use std::time::Duration;

use async_trait::async_trait;

use crate::config::Credentials;

pub use error::{AcquisitionError, NumericDomain, ParseError, SourceError};
pub use fields::{MetricSpec, RADIO_METRICS};
pub use simulated::SimulatedSource;
pub use webui::WebUiSource;

/// Trait abstracting where link-quality readings come from.
///
/// Every call touches a live remote resource whose session can silently
/// expire; none of them is safe to retry blindly without re-navigating.
/// The acquisition loop owns the source and the handle exclusively.
#[async_trait]
pub trait SampleSource: Send + 'static {
    /// Live session state returned by [`connect`](SampleSource::connect).
    type Handle: Send;

    /// Establish a session.
    ///
    /// Resolves a "multiple active sessions" prompt with a short bounded
    /// probe; absence of the prompt is success. Fails with
    /// [`SourceError::ConnectOrAuth`] if the device is unreachable within
    /// `timeout`.
    async fn connect(
        &mut self,
        credentials: &Credentials,
        timeout: Duration,
    ) -> Result<Self::Handle, SourceError>;

    /// Move the session to a named view. Fails with
    /// [`SourceError::ConnectOrAuth`] on timeout.
    async fn navigate(
        &mut self,
        handle: &mut Self::Handle,
        target: &str,
        timeout: Duration,
    ) -> Result<(), SourceError>;

    /// Current text of a named field on the current view. Fails with
    /// [`SourceError::FieldTimeout`] if it does not materialise in time.
    async fn read_field(
        &mut self,
        handle: &mut Self::Handle,
        field: &str,
        timeout: Duration,
    ) -> Result<String, SourceError>;

    /// Set a remote-side option. Best effort.
    async fn configure(
        &mut self,
        handle: &mut Self::Handle,
        option: &str,
        value: &str,
        timeout: Duration,
    ) -> Result<(), SourceError>;

    /// Release the session. Consumes the handle, so each session is closed
    /// at most once.
    async fn close(&mut self, handle: Self::Handle);

    /// Human-readable name for logging (e.g. "WebUI", "simulated").
    fn source_name(&self) -> &str;
}
