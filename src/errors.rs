// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the capture pipeline
//!
//! Most of these never reach the caller of
//! [`RecordingSession`](crate::recording::RecordingSession): construction and
//! encoder failures are absorbed by the fallback controller and turned into a
//! tier escalation or a callback. Only misuse of the public API surfaces as
//! [`CaptureError`].

use thiserror::Error;

/// Result type alias using CaptureError
pub type CaptureResult<T> = Result<T, CaptureError>;

/// Crate-level error type
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Session already started")]
    AlreadyStarted,

    #[error("Session not started")]
    NotStarted,

    #[error("Source has no live video: {0}")]
    SourceNotLive(String),

    #[error("Invalid capture options: {0}")]
    InvalidOptions(String),

    #[error("Filter error: {0}")]
    Filter(#[from] FilterError),

    #[error("Compositor error: {0}")]
    Compositor(#[from] CompositorError),

    #[error("Encoder error: {0}")]
    Encoder(#[from] EncoderError),
}

/// Filter expression errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    #[error("Unsupported filter function '{0}'")]
    UnsupportedFunction(String),

    #[error("Malformed filter expression at '{0}'")]
    Malformed(String),

    #[error("Invalid argument '{arg}' for {function}")]
    InvalidArgument { function: String, arg: String },

    #[error("Filter probe produced an invalid pixel")]
    ProbeFailed,
}

/// Frame compositor construction errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompositorError {
    #[error("Invalid surface size {width}x{height}")]
    InvalidSize { width: u32, height: u32 },

    #[error("Surface {width}x{height} exceeds limit of {limit} pixels")]
    SurfaceTooLarge { width: u32, height: u32, limit: u64 },
}

/// Platform encoder errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EncoderError {
    #[error("No supported encoding format")]
    NoSupportedFormat,

    #[error("Encoder not available: {0}")]
    NotAvailable(String),

    #[error("Failed to start encoder: {0}")]
    StartFailed(String),

    #[error("Encoder pipeline error: {0}")]
    Pipeline(String),

    #[error("Encoder is not encoding")]
    NotEncoding,

    #[error("Encoder input closed")]
    InputClosed,
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl From<gstreamer::glib::BoolError> for EncoderError {
    fn from(err: gstreamer::glib::BoolError) -> Self {
        EncoderError::Pipeline(err.to_string())
    }
}
