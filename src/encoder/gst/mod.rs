// SPDX-License-Identifier: GPL-3.0-only

//! GStreamer-backed platform encoder

pub mod chain;
pub mod pipeline;

pub use chain::VideoCodec;
pub use pipeline::GstEncoder;

use super::backend::{EncoderBackend, EncoderSettings, PlatformEncoder};
use crate::errors::EncoderError;
use gstreamer as gst;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Default)]
pub struct GstEncoderBackend;

impl GstEncoderBackend {
    pub fn new() -> Self {
        Self
    }

    /// Codecs whose full element chain is installed
    pub fn available_codecs(&self) -> Vec<VideoCodec> {
        VideoCodec::DEFAULT_ORDER
            .into_iter()
            .filter(|codec| chain::is_available(*codec))
            .collect()
    }
}

impl EncoderBackend for GstEncoderBackend {
    fn name(&self) -> &str {
        "gstreamer"
    }

    fn is_format_supported(&self, format: &str) -> bool {
        chain::resolve(format).is_some_and(chain::is_available)
    }

    fn create(
        &self,
        format: Option<&str>,
        settings: &EncoderSettings,
    ) -> Result<Box<dyn PlatformEncoder>, EncoderError> {
        let codec = match format {
            Some(format) => chain::resolve(format)
                .ok_or_else(|| EncoderError::NotAvailable(format!("unknown format {}", format)))?,
            None => {
                let codec = chain::host_default().ok_or(EncoderError::NoSupportedFormat)?;
                info!(?codec, "Using host default encoder chain");
                codec
            }
        };

        if !chain::is_available(codec) {
            return Err(EncoderError::NotAvailable(format!(
                "{:?} element chain is not installed",
                codec
            )));
        }

        debug!(?codec, ?format, "Creating GStreamer encoder");
        let encoder = GstEncoder::build(codec, settings)?;
        Ok(Box::new(encoder))
    }
}

/// Build an element by factory name
pub(crate) fn make(factory: &str) -> Result<gst::Element, EncoderError> {
    gst::ElementFactory::make(factory)
        .build()
        .map_err(|e| EncoderError::NotAvailable(format!("Failed to create {}: {}", factory, e)))
}
