// SPDX-License-Identifier: GPL-3.0-only

//! Encoding format negotiation

use super::backend::EncoderBackend;
use tracing::{debug, info};

/// Pick the first candidate the backend supports
///
/// `None` is not a failure: it means the host picks its default format.
pub fn negotiate_format(candidates: &[String], backend: &dyn EncoderBackend) -> Option<String> {
    for candidate in candidates {
        if backend.is_format_supported(candidate) {
            info!(format = %candidate, backend = backend.name(), "Negotiated encoding format");
            return Some(candidate.clone());
        }
        debug!(format = %candidate, "Encoding format not supported");
    }

    info!(backend = backend.name(), "No candidate format supported, using host default");
    None
}

/// Container file extension for a MIME type
pub fn extension_for_mime(mime: &str) -> &'static str {
    let base = mime.split(';').next().unwrap_or("").trim();
    match base {
        "video/webm" | "audio/webm" => "webm",
        "video/mp4" | "audio/mp4" => "mp4",
        "image/png" => "png",
        _ => "bin",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::backend::{EncoderSettings, PlatformEncoder};
    use crate::errors::EncoderError;

    struct Supports(&'static [&'static str]);

    impl EncoderBackend for Supports {
        fn name(&self) -> &str {
            "supports"
        }

        fn is_format_supported(&self, format: &str) -> bool {
            self.0.contains(&format)
        }

        fn create(
            &self,
            _format: Option<&str>,
            _settings: &EncoderSettings,
        ) -> Result<Box<dyn PlatformEncoder>, EncoderError> {
            Err(EncoderError::NotAvailable("test".into()))
        }
    }

    fn candidates() -> Vec<String> {
        crate::constants::FORMAT_CANDIDATES
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn test_first_supported_wins() {
        let backend = Supports(&["video/mp4", "video/webm"]);
        assert_eq!(
            negotiate_format(&candidates(), &backend).as_deref(),
            Some("video/webm")
        );
    }

    #[test]
    fn test_nothing_supported_means_host_default() {
        assert_eq!(negotiate_format(&candidates(), &Supports(&[])), None);
    }

    #[test]
    fn test_extension_for_mime() {
        assert_eq!(extension_for_mime("video/webm;codecs=vp9"), "webm");
        assert_eq!(extension_for_mime("video/mp4"), "mp4");
        assert_eq!(extension_for_mime("image/png"), "png");
        assert_eq!(extension_for_mime("application/octet-stream"), "bin");
    }
}
