// SPDX-License-Identifier: GPL-3.0-only

//! "Capture failed" clip synthesis
//!
//! Tried in order until one yields bytes: a short clip encoded through the
//! same backend, a PNG still of the message, and finally a fixed marker.
//! The last step cannot fail, so a placeholder always exists.

use crate::config::{CaptureConfig, PlaceholderConfig};
use crate::constants::{artifact, placeholder as defaults};
use crate::encoder::{EncoderBackend, EncoderSession, EncoderSettings, SessionTiming};
use crate::errors::EncoderError;
use crate::media::VideoFrame;
use image::{Rgba, RgbaImage};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const BACKGROUND: Rgba<u8> = Rgba([32, 32, 32, 255]);
const BANNER: Rgba<u8> = Rgba([200, 40, 40, 255]);
const TEXT: Rgba<u8> = Rgba([255, 255, 255, 255]);

const GLYPH_WIDTH: u32 = 5;
const GLYPH_HEIGHT: u32 = 7;
/// Horizontal advance per character, in font pixels
const GLYPH_ADVANCE: u32 = GLYPH_WIDTH + 1;

/// How the placeholder bytes were produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderKind {
    Encoded,
    Still,
    Marker,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderClip {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub kind: PlaceholderKind,
}

impl PlaceholderClip {
    /// Minimal non-empty marker
    pub fn marker() -> Self {
        Self {
            bytes: artifact::FAILURE_MARKER.to_vec(),
            mime_type: artifact::FAILURE_MARKER_MIME.to_string(),
            kind: PlaceholderKind::Marker,
        }
    }
}

/// Produce the placeholder, never failing
pub async fn synthesize(
    backend: &dyn EncoderBackend,
    format: Option<&str>,
    config: &CaptureConfig,
) -> PlaceholderClip {
    let image = render(&config.placeholder);

    match encode_clip(backend, format, config, &image).await {
        Ok((bytes, mime_type)) if !bytes.is_empty() => {
            info!(bytes = bytes.len(), mime = %mime_type, "Encoded placeholder clip");
            return PlaceholderClip {
                bytes,
                mime_type,
                kind: PlaceholderKind::Encoded,
            };
        }
        Ok(_) => warn!("Placeholder encoder produced no data"),
        Err(e) => warn!(error = %e, "Failed to encode placeholder clip"),
    }

    match encode_png(&image) {
        Ok(bytes) if !bytes.is_empty() => {
            info!(bytes = bytes.len(), "Using placeholder still image");
            return PlaceholderClip {
                bytes,
                mime_type: "image/png".to_string(),
                kind: PlaceholderKind::Still,
            };
        }
        Ok(_) => warn!("Placeholder PNG is empty"),
        Err(e) => warn!(error = %e, "Failed to encode placeholder PNG"),
    }

    warn!("Falling back to failure marker");
    PlaceholderClip::marker()
}

/// Draw the message centered on a dark surface with banners top and bottom
pub fn render(config: &PlaceholderConfig) -> RgbaImage {
    let (width, height) = (config.width.max(1), config.height.max(1));
    let mut image = RgbaImage::from_pixel(width, height, BACKGROUND);

    let banner = (height / 12).max(1);
    for y in (0..banner).chain(height.saturating_sub(banner)..height) {
        for x in 0..width {
            image.put_pixel(x, y, BANNER);
        }
    }

    let text: Vec<char> = config.message.to_uppercase().chars().collect();
    if text.is_empty() {
        return image;
    }

    let columns = text.len() as u32 * GLYPH_ADVANCE;
    let scale = ((width * 4 / 5) / columns)
        .min((height * 3 / 10) / GLYPH_HEIGHT)
        .max(1);
    let text_width = columns * scale - scale;
    let origin_x = width.saturating_sub(text_width) / 2;
    let origin_y = height.saturating_sub(GLYPH_HEIGHT * scale) / 2;

    for (i, c) in text.iter().enumerate() {
        let glyph_x = origin_x + i as u32 * GLYPH_ADVANCE * scale;
        for (row, bits) in glyph(*c).iter().enumerate() {
            for col in 0..GLYPH_WIDTH {
                if bits & (1 << (GLYPH_WIDTH - 1 - col)) == 0 {
                    continue;
                }
                fill_block(
                    &mut image,
                    glyph_x + col * scale,
                    origin_y + row as u32 * scale,
                    scale,
                );
            }
        }
    }

    image
}

fn fill_block(image: &mut RgbaImage, x0: u32, y0: u32, size: u32) {
    for y in y0..(y0 + size).min(image.height()) {
        for x in x0..(x0 + size).min(image.width()) {
            image.put_pixel(x, y, TEXT);
        }
    }
}

async fn encode_clip(
    backend: &dyn EncoderBackend,
    format: Option<&str>,
    config: &CaptureConfig,
    image: &RgbaImage,
) -> Result<(Vec<u8>, String), EncoderError> {
    let frames = config.placeholder.frames.max(1);
    let settings = EncoderSettings {
        width: image.width(),
        height: image.height(),
        frame_rate: defaults::FRAME_RATE,
        video_bitrate_kbps: config
            .bitrate_preset
            .bitrate_kbps(image.width(), image.height()),
        audio_tracks: Vec::new(),
    };

    let encoder = backend.create(format, &settings)?;
    let (tx, rx) = mpsc::channel(frames as usize);
    let timing = SessionTiming::from_config(config);
    let session = EncoderSession::start(encoder, rx, &[], None, timing).await?;

    let frame = VideoFrame::from_rgba(image.width(), image.height(), image.as_raw().clone());
    let pace = Duration::from_secs_f64(1.0 / defaults::FRAME_RATE as f64);
    for index in 0..frames {
        if index > 0 {
            tokio::time::sleep(pace).await;
        }
        tx.send(frame.clone())
            .await
            .map_err(|_| EncoderError::InputClosed)?;
    }
    drop(tx);

    let mime_type = session.mime_type().to_string();
    let chunks = session.stop().await;
    debug!(frames, chunks = chunks.len(), "Placeholder clip encoded");
    Ok((chunks.concat(), mime_type))
}

fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buffer = Vec::new();
    image.write_to(&mut std::io::Cursor::new(&mut buffer), image::ImageFormat::Png)?;
    Ok(buffer)
}

/// 5x7 bitmap glyph, one byte per row, bit 4 is the leftmost column
fn glyph(c: char) -> [u8; 7] {
    match c {
        'A' => [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'B' => [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
        'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'D' => [0x1E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1E],
        'E' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
        'F' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10],
        'G' => [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F],
        'H' => [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'J' => [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C],
        'K' => [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11],
        'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F],
        'M' => [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11],
        'N' => [0x11, 0x11, 0x19, 0x15, 0x13, 0x11, 0x11],
        'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'P' => [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
        'Q' => [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D],
        'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
        'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
        'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'V' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04],
        'W' => [0x11, 0x11, 0x11, 0x15, 0x15, 0x15, 0x0A],
        'X' => [0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11],
        'Y' => [0x11, 0x11, 0x0A, 0x04, 0x04, 0x04, 0x04],
        'Z' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F],
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        '!' => [0x04, 0x04, 0x04, 0x04, 0x04, 0x00, 0x04],
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        _ => [0x00; 7],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::{EncoderEvent, PlatformEncoder};
    use crate::media::AudioBuffer;
    use async_trait::async_trait;

    struct Unavailable;

    impl EncoderBackend for Unavailable {
        fn name(&self) -> &str {
            "unavailable"
        }

        fn is_format_supported(&self, _format: &str) -> bool {
            false
        }

        fn create(
            &self,
            _format: Option<&str>,
            _settings: &EncoderSettings,
        ) -> Result<Box<dyn PlatformEncoder>, EncoderError> {
            Err(EncoderError::NotAvailable("no encoder".into()))
        }
    }

    /// Emits one byte per pushed frame on every data request
    #[derive(Default)]
    struct FrameCounter {
        events: Option<mpsc::UnboundedSender<EncoderEvent>>,
        frames: usize,
    }

    #[async_trait]
    impl PlatformEncoder for FrameCounter {
        fn mime_type(&self) -> String {
            "video/webm;codecs=vp8".into()
        }

        async fn start(
            &mut self,
            events: mpsc::UnboundedSender<EncoderEvent>,
        ) -> Result<(), EncoderError> {
            self.events = Some(events);
            Ok(())
        }

        fn push_video(&mut self, _frame: &VideoFrame) -> Result<(), EncoderError> {
            self.frames += 1;
            Ok(())
        }

        fn push_audio(&mut self, _track: usize, _buffer: &AudioBuffer) -> Result<(), EncoderError> {
            Ok(())
        }

        fn request_data(&mut self) -> Result<(), EncoderError> {
            if let Some(events) = &self.events {
                let _ = events.send(EncoderEvent::Data(vec![0xAB; std::mem::take(&mut self.frames)]));
            }
            Ok(())
        }

        fn stop(&mut self) -> Result<(), EncoderError> {
            if let Some(events) = &self.events {
                let _ = events.send(EncoderEvent::Stopped);
            }
            Ok(())
        }
    }

    struct Counting;

    impl EncoderBackend for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        fn is_format_supported(&self, _format: &str) -> bool {
            true
        }

        fn create(
            &self,
            _format: Option<&str>,
            _settings: &EncoderSettings,
        ) -> Result<Box<dyn PlatformEncoder>, EncoderError> {
            Ok(Box::new(FrameCounter::default()))
        }
    }

    #[test]
    fn test_render_is_deterministic() {
        let config = PlaceholderConfig::default();
        let a = render(&config);
        let b = render(&config);
        assert_eq!(a, b);
        assert_eq!(a.dimensions(), (config.width, config.height));
        assert!(a.pixels().any(|p| *p == TEXT));
        assert_eq!(*a.get_pixel(0, 0), BANNER);
    }

    #[test]
    fn test_render_tiny_surface() {
        let config = PlaceholderConfig {
            width: 8,
            height: 4,
            ..Default::default()
        };
        let image = render(&config);
        assert_eq!(image.dimensions(), (8, 4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_encoded_clip_preferred() {
        let config = CaptureConfig::default();
        let clip = synthesize(&Counting, None, &config).await;
        assert_eq!(clip.kind, PlaceholderKind::Encoded);
        assert_eq!(clip.bytes.len(), config.placeholder.frames as usize);
        assert!(clip.mime_type.starts_with("video/webm"));
    }

    #[tokio::test]
    async fn test_still_when_encoder_unavailable() {
        let config = CaptureConfig::default();
        let clip = synthesize(&Unavailable, None, &config).await;
        assert_eq!(clip.kind, PlaceholderKind::Still);
        assert_eq!(clip.mime_type, "image/png");

        let decoded = image::load_from_memory(&clip.bytes).unwrap();
        assert_eq!(decoded.width(), config.placeholder.width);
    }

    #[test]
    fn test_marker_is_non_empty() {
        let marker = PlaceholderClip::marker();
        assert!(!marker.bytes.is_empty());
        assert_eq!(marker.kind, PlaceholderKind::Marker);
    }
}
