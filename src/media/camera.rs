// SPDX-License-Identifier: GPL-3.0-only

//! GStreamer camera + microphone source
//!
//! Video: `autovideosrc → videoconvert → videoscale → RGBA appsink`, keeping only
//! the latest frame. Audio (optional): `autoaudiosrc → audioconvert →
//! audioresample → S16LE appsink`, published to one [`AudioTrack`].

use super::frame::{AudioBuffer, VideoFrame};
use super::source::{AudioTrack, MediaSource};
use crate::encoder::gst::make;
use crate::errors::EncoderError;
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, error, info, warn};

const MIC_SAMPLE_RATE: i32 = 48_000;
const MIC_CHANNELS: i32 = 2;

pub struct CameraSource {
    id: String,
    pipeline: gst::Pipeline,
    latest: Arc<Mutex<Option<VideoFrame>>>,
    frames_seen: Arc<AtomicU64>,
    tracks: Vec<AudioTrack>,
}

impl CameraSource {
    /// Open the default camera (and microphone if `with_audio`)
    pub fn open(width: u32, height: u32, framerate: u32, with_audio: bool) -> Result<Self, EncoderError> {
        gst::init().map_err(|e| EncoderError::NotAvailable(format!("GStreamer init failed: {}", e)))?;

        info!(width, height, framerate, audio = with_audio, "Opening camera source");

        let pipeline = gst::Pipeline::new();

        let source = make("autovideosrc")?;
        let convert = make("videoconvert")?;
        let scale = make("videoscale")?;
        let rate = make("videorate")?;
        let caps = gst::Caps::builder("video/x-raw")
            .field("format", "RGBA")
            .field("width", width as i32)
            .field("height", height as i32)
            .field("framerate", gst::Fraction::new(framerate as i32, 1))
            .build();
        let appsink = gst_app::AppSink::builder()
            .caps(&caps)
            .max_buffers(1)
            .drop(true)
            .sync(false)
            .build();

        pipeline.add_many([&source, &convert, &scale, &rate, appsink.upcast_ref()])?;
        gst::Element::link_many([&source, &convert, &scale, &rate, appsink.upcast_ref()])?;

        let latest = Arc::new(Mutex::new(None));
        let frames_seen = Arc::new(AtomicU64::new(0));
        Self::install_video_callback(&appsink, Arc::clone(&latest), Arc::clone(&frames_seen));

        let mut tracks = Vec::new();
        if with_audio {
            match Self::add_audio_branch(&pipeline) {
                Ok(track) => tracks.push(track),
                Err(e) => warn!(error = %e, "Microphone unavailable, camera source is video-only"),
            }
        }

        pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| EncoderError::StartFailed(format!("Failed to start camera: {}", e)))?;

        Ok(Self {
            id: "camera".to_string(),
            pipeline,
            latest,
            frames_seen,
            tracks,
        })
    }

    fn install_video_callback(
        appsink: &gst_app::AppSink,
        latest: Arc<Mutex<Option<VideoFrame>>>,
        frames_seen: Arc<AtomicU64>,
    ) {
        appsink.set_callbacks(
            gst_app::AppSinkCallbacks::builder()
                .new_sample(move |sink| {
                    let sample = sink.pull_sample().map_err(|_| gst::FlowError::Eos)?;
                    let buffer = sample.buffer().ok_or(gst::FlowError::Error)?;
                    let caps = sample.caps().ok_or(gst::FlowError::Error)?;
                    let info =
                        gst_video::VideoInfo::from_caps(caps).map_err(|_| gst::FlowError::Error)?;
                    let map = buffer.map_readable().map_err(|_| gst::FlowError::Error)?;

                    let frame = VideoFrame {
                        width: info.width(),
                        height: info.height(),
                        stride: info.stride()[0] as u32,
                        data: Arc::from(map.as_slice()),
                        captured_at: Instant::now(),
                    };
                    *latest.lock() = Some(frame);

                    let count = frames_seen.fetch_add(1, Ordering::Relaxed);
                    if count == 0 {
                        debug!("First camera frame received");
                    }
                    Ok(gst::FlowSuccess::Ok)
                })
                .build(),
        );
    }

    fn add_audio_branch(pipeline: &gst::Pipeline) -> Result<AudioTrack, EncoderError> {
        let source = make("autoaudiosrc")?;
        let queue = make("queue")?;
        let convert = make("audioconvert")?;
        let resample = make("audioresample")?;
        let caps = gst::Caps::builder("audio/x-raw")
            .field("format", "S16LE")
            .field("layout", "interleaved")
            .field("rate", MIC_SAMPLE_RATE)
            .field("channels", MIC_CHANNELS)
            .build();
        let appsink = gst_app::AppSink::builder().caps(&caps).sync(false).build();

        pipeline.add_many([&source, &queue, &convert, &resample, appsink.upcast_ref()])?;
        gst::Element::link_many([&source, &queue, &convert, &resample, appsink.upcast_ref()])?;

        let track = AudioTrack::new("microphone", MIC_SAMPLE_RATE as u32, MIC_CHANNELS as u16);
        let publisher = track.clone();
        appsink.set_callbacks(
            gst_app::AppSinkCallbacks::builder()
                .new_sample(move |sink| {
                    let sample = sink.pull_sample().map_err(|_| gst::FlowError::Eos)?;
                    let buffer = sample.buffer().ok_or(gst::FlowError::Error)?;
                    let map = buffer.map_readable().map_err(|_| gst::FlowError::Error)?;
                    let samples: Vec<i16> = map
                        .as_slice()
                        .chunks_exact(2)
                        .map(|b| i16::from_le_bytes([b[0], b[1]]))
                        .collect();
                    publisher.publish(AudioBuffer::new(
                        samples,
                        MIC_SAMPLE_RATE as u32,
                        MIC_CHANNELS as u16,
                    ));
                    Ok(gst::FlowSuccess::Ok)
                })
                .build(),
        );

        Ok(track)
    }

    /// Frames received since the source was opened
    pub fn frames_seen(&self) -> u64 {
        self.frames_seen.load(Ordering::Relaxed)
    }
}

impl MediaSource for CameraSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_live(&self) -> bool {
        let (_, state, _) = self.pipeline.state(gst::ClockTime::ZERO);
        state == gst::State::Playing || self.latest.lock().is_some()
    }

    fn current_frame(&self) -> Option<VideoFrame> {
        self.latest.lock().clone()
    }

    fn audio_tracks(&self) -> Vec<AudioTrack> {
        self.tracks.clone()
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        if let Err(e) = self.pipeline.set_state(gst::State::Null) {
            error!(?e, "Failed to set camera pipeline to Null on drop");
        }
    }
}
