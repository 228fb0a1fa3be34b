// SPDX-License-Identifier: GPL-3.0-only

//! Per-capture parameters supplied by the booth configuration

use crate::errors::CaptureError;
use crate::filters::{FilterProgram, FilterRegistry, IDENTITY_ID};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Highest frame rate accepted for a capture
const MAX_FRAME_RATE: u32 = 120;

/// Id given to an expression override that names no filter
const CUSTOM_FILTER_ID: &str = "custom";

/// Immutable once a session has started
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CaptureOptions {
    /// Registry id of the filter to apply
    pub filter_id: String,
    /// Raw pixel expression overriding the registry entry
    pub filter_expression: Option<String>,
    pub max_duration_seconds: f64,
    pub target_width: u32,
    pub target_height: u32,
    pub target_frame_rate: u32,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            filter_id: IDENTITY_ID.to_string(),
            filter_expression: None,
            max_duration_seconds: 10.0,
            target_width: 1280,
            target_height: 720,
            target_frame_rate: 30,
        }
    }
}

impl CaptureOptions {
    pub fn validate(&self) -> Result<(), CaptureError> {
        if !self.max_duration_seconds.is_finite() || self.max_duration_seconds <= 0.0 {
            return Err(CaptureError::InvalidOptions(format!(
                "maxDurationSeconds must be positive, got {}",
                self.max_duration_seconds
            )));
        }
        if Duration::try_from_secs_f64(self.max_duration_seconds).is_err() {
            return Err(CaptureError::InvalidOptions(format!(
                "maxDurationSeconds {} is out of range",
                self.max_duration_seconds
            )));
        }
        if self.target_width == 0 || self.target_height == 0 {
            return Err(CaptureError::InvalidOptions(format!(
                "target size {}x{} is empty",
                self.target_width, self.target_height
            )));
        }
        if self.target_frame_rate == 0 || self.target_frame_rate > MAX_FRAME_RATE {
            return Err(CaptureError::InvalidOptions(format!(
                "targetFrameRate must be within 1..={}, got {}",
                MAX_FRAME_RATE, self.target_frame_rate
            )));
        }
        Ok(())
    }

    /// Zero for options that fail [`validate`](Self::validate)
    pub fn max_duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.max_duration_seconds).unwrap_or_default()
    }

    /// The filter program this capture asks for
    ///
    /// An explicit expression wins over the registry; unknown ids resolve to
    /// the identity program.
    pub fn resolve_filter(&self, registry: &FilterRegistry) -> FilterProgram {
        match &self.filter_expression {
            Some(expression) => {
                let id = if self.filter_id == IDENTITY_ID {
                    CUSTOM_FILTER_ID
                } else {
                    self.filter_id.as_str()
                };
                FilterProgram::new(id, id, expression)
            }
            None => registry.lookup(&self.filter_id).clone(),
        }
    }
}
