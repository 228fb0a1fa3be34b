// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Video encoder bitrate presets
///
/// Booth clips are short and uploaded right after capture, so the presets
/// lean towards small files rather than archival quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BitratePreset {
    /// Low bitrate - smallest uploads
    Low,
    /// Medium bitrate - balanced quality and file size (default)
    #[default]
    Medium,
    /// High bitrate - larger files, better quality
    High,
}

impl BitratePreset {
    /// All preset variants, lowest first
    pub const ALL: [BitratePreset; 3] = [
        BitratePreset::Low,
        BitratePreset::Medium,
        BitratePreset::High,
    ];

    /// Get display name for the preset
    pub fn display_name(&self) -> &'static str {
        match self {
            BitratePreset::Low => "Low",
            BitratePreset::Medium => "Medium",
            BitratePreset::High => "High",
        }
    }

    /// Get bitrate in kbps for a given resolution
    ///
    /// - SD (640x480): Low=0.8, Medium=1.5, High=3 Mbps
    /// - HD (1280x720): Low=1.5, Medium=3, High=6 Mbps
    /// - Full HD (1920x1080): Low=3, Medium=6, High=12 Mbps
    /// - 4K (3840x2160): Low=10, Medium=20, High=40 Mbps
    pub fn bitrate_kbps(&self, width: u32, _height: u32) -> u32 {
        match (get_resolution_tier(width), self) {
            (ResolutionTier::SD, BitratePreset::Low) => 800,
            (ResolutionTier::SD, BitratePreset::Medium) => 1_500,
            (ResolutionTier::SD, BitratePreset::High) => 3_000,
            (ResolutionTier::HD, BitratePreset::Low) => 1_500,
            (ResolutionTier::HD, BitratePreset::Medium) => 3_000,
            (ResolutionTier::HD, BitratePreset::High) => 6_000,
            (ResolutionTier::FullHD, BitratePreset::Low) => 3_000,
            (ResolutionTier::FullHD, BitratePreset::Medium) => 6_000,
            (ResolutionTier::FullHD, BitratePreset::High) => 12_000,
            (ResolutionTier::FourK, BitratePreset::Low) => 10_000,
            (ResolutionTier::FourK, BitratePreset::Medium) => 20_000,
            (ResolutionTier::FourK, BitratePreset::High) => 40_000,
        }
    }
}

/// Resolution tiers for bitrate calculation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionTier {
    /// SD: below 1280 wide
    SD,
    /// HD: 1280x720
    HD,
    /// Full HD: 1920x1080 up to 4K
    FullHD,
    /// 4K: 3840x2160 and above
    FourK,
}

/// Get the resolution tier for a given width
pub fn get_resolution_tier(width: u32) -> ResolutionTier {
    match width {
        w if w >= 3840 => ResolutionTier::FourK,
        w if w >= 1920 => ResolutionTier::FullHD,
        w if w >= 1280 => ResolutionTier::HD,
        _ => ResolutionTier::SD,
    }
}

/// Encoder session timing
pub mod timing {
    use super::Duration;

    /// Delay before the first data request after the encoder starts
    pub const INITIAL_FLUSH_DELAY: Duration = Duration::from_millis(500);

    /// Period of the automatic flush requests while recording
    pub const FLUSH_INTERVAL: Duration = Duration::from_millis(1000);

    /// Upper bound on waiting for the encoder's stopped notification
    pub const STOP_TIMEOUT: Duration = Duration::from_millis(3000);

    /// Host refresh rate the compositor loop is synchronized to
    pub const DISPLAY_REFRESH_HZ: u32 = 60;

    /// GStreamer state change timeout on start
    pub const START_TIMEOUT_SECS: u64 = 5;
}

/// Artifact sufficiency thresholds
pub mod artifact {
    /// Artifacts below this size are treated as silent encoder failures
    pub const MIN_ARTIFACT_BYTES: usize = 1024;

    /// Marker returned when not even the placeholder clip could be produced
    pub const FAILURE_MARKER: &[u8] = b"BOOTH-CAPTURE-FAILED\n";

    /// Mime type of the failure marker
    pub const FAILURE_MARKER_MIME: &str = "application/octet-stream";
}

/// Encoding format candidates, most widely supported codec first, then the
/// generic containers. An empty negotiation result means host default.
pub const FORMAT_CANDIDATES: &[&str] = &[
    "video/webm;codecs=vp9",
    "video/webm;codecs=vp8",
    "video/webm",
    "video/mp4;codecs=avc1",
    "video/mp4",
];

/// Surface size limit (4K); larger surfaces are refused by the compositor
pub const MAX_SURFACE_PIXELS: u64 = 3840 * 2160;

/// Placeholder clip defaults
pub mod placeholder {
    /// Placeholder surface width
    pub const WIDTH: u32 = 640;

    /// Placeholder surface height
    pub const HEIGHT: u32 = 360;

    /// Number of frames encoded for the placeholder clip
    pub const FRAMES: u32 = 2;

    /// Frame rate of the placeholder clip
    pub const FRAME_RATE: u32 = 2;

    /// Message rendered onto the placeholder surface
    pub const MESSAGE: &str = "CAPTURE FAILED";
}

/// Application information utilities
pub mod app_info {
    /// Get the application version from build-time environment
    pub fn version() -> &'static str {
        env!("GIT_VERSION")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_tiers() {
        assert_eq!(get_resolution_tier(3840), ResolutionTier::FourK);
        assert_eq!(get_resolution_tier(1920), ResolutionTier::FullHD);
        assert_eq!(get_resolution_tier(1280), ResolutionTier::HD);
        assert_eq!(get_resolution_tier(640), ResolutionTier::SD);
    }

    #[test]
    fn test_format_candidates_prefer_codec_then_container() {
        assert!(FORMAT_CANDIDATES[0].contains("codecs="));
        assert!(FORMAT_CANDIDATES.contains(&"video/webm"));
        assert!(FORMAT_CANDIDATES.iter().all(|f| f.starts_with("video/")));
    }
}
