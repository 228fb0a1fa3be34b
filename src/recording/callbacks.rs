// SPDX-License-Identifier: GPL-3.0-only

//! Caller-supplied notifications
//!
//! All three callbacks are optional and must not block: they are invoked
//! from the tasks driving the capture.

use std::sync::Arc;
use tracing::{debug, warn};

type ProgressFn = Arc<dyn Fn(f32) + Send + Sync>;
type MessageFn = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Clone, Default)]
pub struct CaptureCallbacks {
    on_progress: Option<ProgressFn>,
    on_error: Option<MessageFn>,
    on_filter_error: Option<MessageFn>,
}

impl CaptureCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recording progress in percent, 0 to 100, never decreasing
    pub fn on_progress(mut self, f: impl Fn(f32) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Arc::new(f));
        self
    }

    /// Capture failed and a placeholder will be delivered
    pub fn on_error(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// The requested filter could not be applied
    pub fn on_filter_error(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_filter_error = Some(Arc::new(f));
        self
    }

    pub(crate) fn progress(&self, percent: f32) {
        if let Some(f) = &self.on_progress {
            f(percent);
        }
    }

    pub(crate) fn error(&self, message: &str) {
        warn!(%message, "Capture error");
        if let Some(f) = &self.on_error {
            f(message);
        }
    }

    pub(crate) fn filter_error(&self, message: &str) {
        debug!(%message, "Filter error");
        if let Some(f) = &self.on_filter_error {
            f(message);
        }
    }
}

impl std::fmt::Debug for CaptureCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureCallbacks")
            .field("on_progress", &self.on_progress.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_filter_error", &self.on_filter_error.is_some())
            .finish()
    }
}
