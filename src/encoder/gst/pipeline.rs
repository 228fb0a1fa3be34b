// SPDX-License-Identifier: GPL-3.0-only

//! GStreamer pipeline turning pushed frames into muxed chunks
//!
//! ```text
//! appsrc (RGBA) -> videoconvert -> videoscale -> capsfilter -> queue -> encoder [-> parser] -> muxer -> appsink
//! appsrc (S16LE) -> audioconvert -> audioresample -> queue -> audio encoder -----------------^
//! ```
//!
//! Muxed output collects in a pending buffer on the streaming thread and is
//! handed out as one chunk per data request. EOS on the sink flushes the rest
//! and reports `Stopped`.

use super::chain::{VideoCodec, element_exists};
use super::make;
use crate::encoder::backend::{AudioTrackSettings, EncoderEvent, EncoderSettings, PlatformEncoder};
use crate::errors::EncoderError;
use crate::media::{AudioBuffer, VideoFrame};
use async_trait::async_trait;
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// State shared with the appsink streaming thread
#[derive(Default)]
struct SinkShared {
    pending: Mutex<Vec<u8>>,
    events: Mutex<Option<mpsc::UnboundedSender<EncoderEvent>>>,
}

impl SinkShared {
    fn emit(&self, event: EncoderEvent) {
        if let Some(events) = self.events.lock().as_ref() {
            let _ = events.send(event);
        }
    }

    fn flush_pending(&self) {
        let data = std::mem::take(&mut *self.pending.lock());
        if !data.is_empty() {
            self.emit(EncoderEvent::Data(data));
        }
    }
}

pub struct GstEncoder {
    pipeline: gst::Pipeline,
    video_src: gst_app::AppSrc,
    audio_srcs: Vec<gst_app::AppSrc>,
    shared: Arc<SinkShared>,
    mime_type: String,
    frame_rate: u32,
    frame_size: Option<(u32, u32)>,
}

impl GstEncoder {
    /// Build (but do not start) the pipeline for `codec`
    pub fn build(codec: VideoCodec, settings: &EncoderSettings) -> Result<Self, EncoderError> {
        gst::init().map_err(|e| EncoderError::NotAvailable(format!("GStreamer init failed: {}", e)))?;

        let encoder_name = codec
            .encoder_names()
            .iter()
            .copied()
            .find(|name| element_exists(name))
            .ok_or_else(|| EncoderError::NotAvailable(format!("no encoder for {:?}", codec)))?;

        info!(
            ?codec,
            encoder = encoder_name,
            width = settings.width,
            height = settings.height,
            fps = settings.frame_rate,
            bitrate_kbps = settings.video_bitrate_kbps,
            "Building encoder pipeline"
        );

        let pipeline = gst::Pipeline::new();

        let video_src = make("appsrc")?
            .dynamic_cast::<gst_app::AppSrc>()
            .map_err(|_| EncoderError::Pipeline("Failed to downcast to AppSrc".into()))?;
        video_src.set_caps(Some(&video_caps(
            settings.width,
            settings.height,
            settings.frame_rate,
        )));
        video_src.set_format(gst::Format::Time);
        video_src.set_is_live(true);
        video_src.set_do_timestamp(true);

        let videoconvert = make("videoconvert")?;
        let videoscale = make("videoscale")?;
        let capsfilter = gst::ElementFactory::make("capsfilter")
            .property(
                "caps",
                gst::Caps::builder("video/x-raw")
                    .field("width", settings.width as i32)
                    .field("height", settings.height as i32)
                    .build(),
            )
            .build()
            .map_err(|e| EncoderError::NotAvailable(format!("Failed to create capsfilter: {}", e)))?;
        let video_queue = make("queue")?;
        let encoder = make(encoder_name)?;
        configure_video_encoder(&encoder, encoder_name, settings.video_bitrate_kbps);
        let parser = codec.parser_name().map(make).transpose()?;

        let container = codec.container();
        let muxer = make(container.muxer_name())?;
        configure_muxer(&muxer);

        let appsink = make("appsink")?
            .dynamic_cast::<gst_app::AppSink>()
            .map_err(|_| EncoderError::Pipeline("Failed to downcast to AppSink".into()))?;
        appsink.set_property("sync", false);

        let mut video_chain: Vec<&gst::Element> = vec![
            video_src.upcast_ref(),
            &videoconvert,
            &videoscale,
            &capsfilter,
            &video_queue,
            &encoder,
        ];
        if let Some(parser) = parser.as_ref() {
            video_chain.push(parser);
        }

        pipeline.add_many(video_chain.iter().copied())?;
        pipeline.add_many([&muxer, appsink.upcast_ref()])?;
        gst::Element::link_many(video_chain.iter().copied())
            .map_err(|e| EncoderError::Pipeline(format!("Failed to link video chain: {}", e)))?;
        let video_tail = video_chain.last().copied().unwrap_or(&encoder);
        video_tail
            .link(&muxer)
            .map_err(|_| EncoderError::Pipeline("Failed to link video encoder to muxer".into()))?;
        muxer
            .link(&appsink)
            .map_err(|_| EncoderError::Pipeline("Failed to link muxer to appsink".into()))?;

        let mut audio_srcs = Vec::with_capacity(settings.audio_tracks.len());
        if !settings.audio_tracks.is_empty() {
            match container
                .audio_encoder_names()
                .iter()
                .copied()
                .find(|name| element_exists(name))
            {
                Some(audio_encoder) => {
                    for (index, track) in settings.audio_tracks.iter().enumerate() {
                        let src = add_audio_branch(&pipeline, &muxer, audio_encoder, index, track)?;
                        audio_srcs.push(src);
                    }
                }
                None => warn!(
                    container = container.muxer_name(),
                    "No audio encoder available, recording video only"
                ),
            }
        }

        let shared = Arc::new(SinkShared::default());
        install_sink_callbacks(&appsink, Arc::clone(&shared));

        debug!(audio_branches = audio_srcs.len(), "Encoder pipeline built");

        Ok(Self {
            pipeline,
            video_src,
            audio_srcs,
            shared,
            mime_type: codec.mime_type().to_string(),
            frame_rate: settings.frame_rate.max(1),
            frame_size: None,
        })
    }
}

#[async_trait]
impl PlatformEncoder for GstEncoder {
    fn mime_type(&self) -> String {
        self.mime_type.clone()
    }

    async fn start(
        &mut self,
        events: mpsc::UnboundedSender<EncoderEvent>,
    ) -> Result<(), EncoderError> {
        *self.shared.events.lock() = Some(events);

        let pipeline = self.pipeline.clone();
        tokio::task::spawn_blocking(move || start_pipeline(&pipeline))
            .await
            .map_err(|e| EncoderError::StartFailed(e.to_string()))??;

        if let Some(bus) = self.pipeline.bus() {
            let shared = Arc::clone(&self.shared);
            bus.set_sync_handler(move |_bus, msg| {
                if let gst::MessageView::Error(err) = msg.view() {
                    error!(
                        error = %err.error(),
                        source = ?err.src().map(|s| s.name()),
                        "Encoder pipeline error"
                    );
                    shared.emit(EncoderEvent::Error(EncoderError::Pipeline(
                        err.error().to_string(),
                    )));
                }
                gst::BusSyncReply::Drop
            });
        }

        info!(mime = %self.mime_type, "Encoder pipeline playing");
        Ok(())
    }

    fn push_video(&mut self, frame: &VideoFrame) -> Result<(), EncoderError> {
        if !frame.is_complete() {
            return Err(EncoderError::Pipeline("incomplete video frame".into()));
        }

        let size = (frame.width, frame.height);
        if self.frame_size != Some(size) {
            debug!(width = size.0, height = size.1, "Encoder input size changed");
            self.video_src
                .set_caps(Some(&video_caps(size.0, size.1, self.frame_rate)));
            self.frame_size = Some(size);
        }

        let buffer = gst::Buffer::from_mut_slice(frame.packed_rgba());
        self.video_src
            .push_buffer(buffer)
            .map(|_| ())
            .map_err(|e| EncoderError::Pipeline(format!("Failed to push frame: {:?}", e)))
    }

    fn push_audio(&mut self, track: usize, buffer: &AudioBuffer) -> Result<(), EncoderError> {
        // Tracks without a branch were dropped at build time (no audio encoder)
        let Some(src) = self.audio_srcs.get(track) else {
            return Ok(());
        };
        let data = gst::Buffer::from_mut_slice(buffer.as_bytes().to_vec());
        src.push_buffer(data)
            .map(|_| ())
            .map_err(|e| EncoderError::Pipeline(format!("Failed to push audio: {:?}", e)))
    }

    fn request_data(&mut self) -> Result<(), EncoderError> {
        self.shared.flush_pending();
        Ok(())
    }

    fn stop(&mut self) -> Result<(), EncoderError> {
        debug!("Sending EOS to encoder inputs");
        for src in std::iter::once(&self.video_src).chain(self.audio_srcs.iter()) {
            src.end_of_stream()
                .map_err(|e| EncoderError::Pipeline(format!("Failed to send EOS: {:?}", e)))?;
        }
        Ok(())
    }
}

impl Drop for GstEncoder {
    fn drop(&mut self) {
        self.shared.events.lock().take();
        if let Err(e) = self.pipeline.set_state(gst::State::Null) {
            error!(?e, "Failed to set encoder pipeline to Null on drop");
        }
    }
}

fn start_pipeline(pipeline: &gst::Pipeline) -> Result<(), EncoderError> {
    pipeline
        .set_state(gst::State::Playing)
        .map_err(|e| EncoderError::StartFailed(format!("Failed to start pipeline: {}", e)))?;

    let bus = pipeline
        .bus()
        .ok_or_else(|| EncoderError::StartFailed("pipeline has no bus".into()))?;
    if let Some(msg) = bus.timed_pop_filtered(
        gst::ClockTime::from_mseconds(200),
        &[gst::MessageType::Error],
    ) && let gst::MessageView::Error(err) = msg.view()
    {
        let _ = pipeline.set_state(gst::State::Null);
        return Err(EncoderError::StartFailed(err.error().to_string()));
    }
    Ok(())
}

fn install_sink_callbacks(appsink: &gst_app::AppSink, shared: Arc<SinkShared>) {
    let on_eos = Arc::clone(&shared);
    appsink.set_callbacks(
        gst_app::AppSinkCallbacks::builder()
            .new_sample(move |sink| {
                let sample = sink.pull_sample().map_err(|_| gst::FlowError::Eos)?;
                let buffer = sample.buffer().ok_or(gst::FlowError::Error)?;
                let map = buffer.map_readable().map_err(|_| gst::FlowError::Error)?;
                shared.pending.lock().extend_from_slice(map.as_slice());
                Ok(gst::FlowSuccess::Ok)
            })
            .eos(move |_sink| {
                debug!("Encoder output reached EOS");
                on_eos.flush_pending();
                on_eos.emit(EncoderEvent::Stopped);
            })
            .build(),
    );
}

fn add_audio_branch(
    pipeline: &gst::Pipeline,
    muxer: &gst::Element,
    encoder_name: &str,
    index: usize,
    track: &AudioTrackSettings,
) -> Result<gst_app::AppSrc, EncoderError> {
    let src = make("appsrc")?
        .dynamic_cast::<gst_app::AppSrc>()
        .map_err(|_| EncoderError::Pipeline("Failed to downcast to AppSrc".into()))?;
    src.set_caps(Some(
        &gst::Caps::builder("audio/x-raw")
            .field("format", "S16LE")
            .field("layout", "interleaved")
            .field("rate", track.sample_rate as i32)
            .field("channels", track.channels as i32)
            .build(),
    ));
    src.set_format(gst::Format::Time);
    src.set_is_live(true);
    src.set_do_timestamp(true);

    let convert = make("audioconvert")?;
    let resample = make("audioresample")?;
    let queue = make("queue")?;
    let encoder = make(encoder_name)?;

    let chain = [src.upcast_ref(), &convert, &resample, &queue, &encoder];
    pipeline.add_many(chain)?;
    gst::Element::link_many(chain)
        .map_err(|e| EncoderError::Pipeline(format!("Failed to link audio chain: {}", e)))?;
    encoder
        .link(muxer)
        .map_err(|_| EncoderError::Pipeline("Failed to link audio encoder to muxer".into()))?;

    debug!(track = index, encoder = encoder_name, "Audio branch added");
    Ok(src)
}

fn configure_video_encoder(encoder: &gst::Element, name: &str, bitrate_kbps: u32) {
    match name {
        "vp8enc" | "vp9enc" => {
            // libvpx takes bits per second; deadline 1 = realtime
            set_if_present(encoder, "target-bitrate", &(bitrate_kbps * 1000).to_string());
            set_if_present(encoder, "deadline", "1");
            set_if_present(encoder, "cpu-used", "8");
        }
        "x264enc" => {
            set_if_present(encoder, "bitrate", &bitrate_kbps.to_string());
            set_if_present(encoder, "tune", "zerolatency");
            set_if_present(encoder, "speed-preset", "ultrafast");
        }
        "openh264enc" => {
            set_if_present(encoder, "bitrate", &(bitrate_kbps * 1000).to_string());
        }
        _ => {}
    }
    debug!(encoder = name, bitrate_kbps, "Configured video encoder");
}

/// Output goes to an appsink, which cannot seek back to rewrite headers
fn configure_muxer(muxer: &gst::Element) {
    set_if_present(muxer, "streamable", "true");
    set_if_present(muxer, "fragment-duration", "1000");
}

fn set_if_present(element: &gst::Element, property: &str, value: &str) {
    if element.has_property(property) {
        element.set_property_from_str(property, value);
    }
}

fn video_caps(width: u32, height: u32, frame_rate: u32) -> gst::Caps {
    gst::Caps::builder("video/x-raw")
        .field("format", "RGBA")
        .field("width", width as i32)
        .field("height", height as i32)
        .field("framerate", gst::Fraction::new(frame_rate as i32, 1))
        .build()
}
