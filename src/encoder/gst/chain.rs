// SPDX-License-Identifier: GPL-3.0-only

//! Mapping from encoding format strings to GStreamer element chains

use gstreamer as gst;
use tracing::debug;

/// Video codecs the booth can record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    Vp9,
    Vp8,
    H264,
}

impl VideoCodec {
    /// Host default preference when no candidate format is supported
    pub const DEFAULT_ORDER: [VideoCodec; 3] = [VideoCodec::Vp9, VideoCodec::Vp8, VideoCodec::H264];

    /// Encoder elements, first available wins
    pub fn encoder_names(&self) -> &'static [&'static str] {
        match self {
            VideoCodec::Vp9 => &["vp9enc"],
            VideoCodec::Vp8 => &["vp8enc"],
            VideoCodec::H264 => &["x264enc", "openh264enc"],
        }
    }

    pub fn parser_name(&self) -> Option<&'static str> {
        match self {
            VideoCodec::H264 => Some("h264parse"),
            VideoCodec::Vp9 | VideoCodec::Vp8 => None,
        }
    }

    pub fn container(&self) -> Container {
        match self {
            VideoCodec::Vp9 | VideoCodec::Vp8 => Container::WebM,
            VideoCodec::H264 => Container::Mp4,
        }
    }

    /// MIME type of the produced stream
    pub fn mime_type(&self) -> &'static str {
        match self {
            VideoCodec::Vp9 => "video/webm;codecs=vp9",
            VideoCodec::Vp8 => "video/webm;codecs=vp8",
            VideoCodec::H264 => "video/mp4;codecs=avc1",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    WebM,
    Mp4,
}

impl Container {
    pub fn muxer_name(&self) -> &'static str {
        match self {
            Container::WebM => "webmmux",
            Container::Mp4 => "mp4mux",
        }
    }

    /// Audio encoders compatible with the container, in preference order
    pub fn audio_encoder_names(&self) -> &'static [&'static str] {
        match self {
            Container::WebM => &["opusenc", "vorbisenc"],
            Container::Mp4 => &["avenc_aac", "fdkaacenc", "voaacenc"],
        }
    }
}

/// Parse a MIME format such as `video/webm;codecs=vp9`
pub fn resolve(format: &str) -> Option<VideoCodec> {
    let normalized: String = format
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase();

    let mut parts = normalized.split(';');
    let base = parts.next().unwrap_or("");
    let codecs = parts
        .find_map(|p| p.strip_prefix("codecs="))
        .map(|c| c.trim_matches('"'));
    let first_codec = codecs.and_then(|c| c.split(',').next());

    match (base, first_codec) {
        ("video/webm", Some(c)) if c.starts_with("vp9") || c.starts_with("vp09") => Some(VideoCodec::Vp9),
        ("video/webm", Some(c)) if c.starts_with("vp8") => Some(VideoCodec::Vp8),
        ("video/webm", None) => Some(VideoCodec::Vp8),
        ("video/mp4", Some(c)) if c.starts_with("avc1") || c == "h264" => Some(VideoCodec::H264),
        ("video/mp4", None) => Some(VideoCodec::H264),
        _ => None,
    }
}

pub fn element_exists(name: &str) -> bool {
    gst::ElementFactory::find(name).is_some()
}

/// First installed encoder element for `codec`
pub fn available_encoder(codec: VideoCodec) -> Option<&'static str> {
    codec.encoder_names().iter().copied().find(|name| element_exists(name))
}

/// Whether every element of the chain for `codec` is installed
pub fn is_available(codec: VideoCodec) -> bool {
    if gst::init().is_err() {
        return false;
    }

    let available = available_encoder(codec).is_some()
        && element_exists(codec.container().muxer_name())
        && codec.parser_name().is_none_or(element_exists)
        && element_exists("appsrc")
        && element_exists("appsink");

    debug!(?codec, available, "Checked encoder chain");
    available
}

/// The host default chain
pub fn host_default() -> Option<VideoCodec> {
    VideoCodec::DEFAULT_ORDER
        .into_iter()
        .find(|codec| is_available(*codec))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_candidates() {
        assert_eq!(resolve("video/webm;codecs=vp9"), Some(VideoCodec::Vp9));
        assert_eq!(resolve("video/webm; codecs=\"vp8,opus\""), Some(VideoCodec::Vp8));
        assert_eq!(resolve("video/webm"), Some(VideoCodec::Vp8));
        assert_eq!(resolve("video/mp4;codecs=avc1.42E01E"), Some(VideoCodec::H264));
        assert_eq!(resolve("VIDEO/MP4"), Some(VideoCodec::H264));
    }

    #[test]
    fn test_resolve_rejects_unknown() {
        assert_eq!(resolve("video/webm;codecs=av1"), None);
        assert_eq!(resolve("video/quicktime"), None);
        assert_eq!(resolve(""), None);
    }

    #[test]
    fn test_codec_chains() {
        assert_eq!(VideoCodec::Vp9.container().muxer_name(), "webmmux");
        assert_eq!(VideoCodec::H264.parser_name(), Some("h264parse"));
        assert!(VideoCodec::H264.mime_type().starts_with("video/mp4"));
    }
}
