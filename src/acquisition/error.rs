//! Acquisition error taxonomy

use std::fmt;

use thiserror::Error;

/// Failures reported by a [`SampleSource`](super::SampleSource).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    /// Session establishment or navigation did not complete within the base timeout.
    #[error("connect/auth failed: {0}")]
    ConnectOrAuth(String),

    /// A field did not materialise within the per-field timeout.
    #[error("field '{field}' did not appear within {timeout_ms}ms")]
    FieldTimeout { field: String, timeout_ms: u64 },

    /// The current view does not exist on the device, so the field cannot either.
    #[error("field '{field}' not found on view '{view}'")]
    FieldNotFound { field: String, view: String },

    /// The device rejected the session (logged out elsewhere, expired cookie).
    #[error("session rejected by device: {0}")]
    SessionExpired(String),

    /// Setting a remote option failed.
    #[error("configure {option}={value} failed: {message}")]
    Configure {
        option: String,
        value: String,
        message: String,
    },

    /// Any other I/O failure talking to the device.
    #[error("transport error: {0}")]
    Transport(String),
}

impl SourceError {
    /// A field that simply did not show up in time, as opposed to the device
    /// actively rejecting the request.
    pub const fn is_field_timeout(&self) -> bool {
        matches!(self, Self::FieldTimeout { .. })
    }
}

/// Numeric domain a field's text is converted into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericDomain {
    Integer,
    Float,
}

impl fmt::Display for NumericDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer => write!(f, "integer"),
            Self::Float => write!(f, "number"),
        }
    }
}

/// Field text that could not be converted to a metric value.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("field '{field}' is empty")]
    Empty { field: String },

    #[error("field '{field}' = {text:?} is not a valid {expected}")]
    NotNumeric {
        field: String,
        text: String,
        expected: NumericDomain,
    },
}

/// Terminal outcomes of the acquisition loop.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    /// Initial connect or reauthentication failed. Fatal.
    #[error("connect/auth failed during {phase}: {source}")]
    ConnectOrAuth {
        phase: &'static str,
        #[source]
        source: SourceError,
    },
}
