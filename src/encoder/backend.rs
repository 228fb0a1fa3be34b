// SPDX-License-Identifier: GPL-3.0-only

//! Platform encoder seam
//!
//! [`EncoderBackend`] answers capability questions and builds encoders;
//! [`PlatformEncoder`] is one running stream-to-chunks encoder. The GStreamer
//! implementation lives in [`super::gst`]; tests substitute a scripted one.

use crate::errors::EncoderError;
use crate::media::{AudioBuffer, VideoFrame};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Notifications from a running encoder
#[derive(Debug, Clone, PartialEq)]
pub enum EncoderEvent {
    /// A chunk of encoded output
    Data(Vec<u8>),
    /// The encoder finished after `stop()`; no more data follows
    Stopped,
    /// Non-fatal runtime error
    Error(EncoderError),
}

/// Format of one audio track attached to the output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioTrackSettings {
    pub sample_rate: u32,
    pub channels: u16,
}

/// Parameters fixed at encoder construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderSettings {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    pub video_bitrate_kbps: u32,
    /// One entry per attached audio track, in track order
    pub audio_tracks: Vec<AudioTrackSettings>,
}

pub trait EncoderBackend: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Whether `format` (a MIME type with optional codecs) can be produced
    fn is_format_supported(&self, format: &str) -> bool;

    /// Build an encoder for `format`, or for the host default when `None`
    fn create(
        &self,
        format: Option<&str>,
        settings: &EncoderSettings,
    ) -> Result<Box<dyn PlatformEncoder>, EncoderError>;
}

#[async_trait]
pub trait PlatformEncoder: Send {
    /// MIME type of the produced stream
    fn mime_type(&self) -> String;

    /// Begin encoding; all output is delivered through `events`
    ///
    /// Resolves once the platform acknowledged the start.
    async fn start(&mut self, events: mpsc::UnboundedSender<EncoderEvent>)
    -> Result<(), EncoderError>;

    fn push_video(&mut self, frame: &VideoFrame) -> Result<(), EncoderError>;

    fn push_audio(&mut self, track: usize, buffer: &AudioBuffer) -> Result<(), EncoderError>;

    /// Emit whatever has been encoded so far as a `Data` event
    fn request_data(&mut self) -> Result<(), EncoderError>;

    /// Finish the stream; the encoder answers with remaining data and `Stopped`
    fn stop(&mut self) -> Result<(), EncoderError>;
}
