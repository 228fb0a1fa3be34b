// SPDX-License-Identifier: GPL-3.0-only

//! Capture strategies, one per tier
//!
//! Every tier follows the same contract: `construct` builds the pipeline
//! pieces without starting anything, `run` starts the encoder and the frame
//! feed, and `is_sufficient` judges the finished output. The controller only
//! talks to this trait, so adding a tier does not touch the driver loop.

use super::tier::Tier;
use crate::compositor::{FrameCompositor, IsActive, LoopStats, frame_interval, run_direct_feed};
use crate::config::CaptureConfig;
use crate::encoder::{
    AudioTrackSettings, ChunkArena, ChunkCallback, EncoderBackend, EncoderSession,
    EncoderSettings, FlushHandle, PlatformEncoder, SessionTiming,
};
use crate::errors::{CaptureError, FilterError};
use crate::filters::FilterProgram;
use crate::media::{MediaSource, VideoFrame};
use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Frames buffered between the feed loop and the encoder
const FRAME_QUEUE_DEPTH: usize = 4;

/// Everything a tier needs to build its pipeline
#[derive(Clone)]
pub struct CaptureContext {
    pub source: Arc<dyn MediaSource>,
    pub program: FilterProgram,
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    pub config: Arc<CaptureConfig>,
    pub backend: Arc<dyn EncoderBackend>,
    /// Negotiated format, `None` for the host default
    pub format: Option<String>,
    /// Session-level liveness; feeds stop drawing once it turns false
    pub is_active: IsActive,
    pub on_chunk: Option<ChunkCallback>,
}

impl CaptureContext {
    pub fn encoder_settings(&self) -> EncoderSettings {
        EncoderSettings {
            width: self.width,
            height: self.height,
            frame_rate: self.frame_rate,
            video_bitrate_kbps: self.config.bitrate_preset.bitrate_kbps(self.width, self.height),
            audio_tracks: self
                .source
                .audio_tracks()
                .iter()
                .map(|track| AudioTrackSettings {
                    sample_rate: track.sample_rate(),
                    channels: track.channels(),
                })
                .collect(),
        }
    }

    pub fn frame_interval(&self) -> Duration {
        frame_interval(self.frame_rate)
    }
}

/// Starts a frame feed once the encoder is running
pub type FeedLauncher =
    Box<dyn FnOnce(IsActive, mpsc::Sender<VideoFrame>) -> BoxFuture<'static, LoopStats> + Send>;

/// A constructed but not yet running tier
pub struct Prepared {
    pub encoder: Box<dyn PlatformEncoder>,
    pub feed: FeedLauncher,
    pub filter_applied: bool,
}

/// Result of a finished run
#[derive(Debug)]
pub struct CaptureOutput {
    pub tier: Tier,
    pub filter_applied: bool,
    pub mime_type: String,
    pub chunks: ChunkArena,
    pub stats: LoopStats,
    pub elapsed: Duration,
}

/// A tier that is encoding
pub struct RunningCapture {
    tier: Tier,
    filter_applied: bool,
    session: EncoderSession,
    feed: JoinHandle<LoopStats>,
    halted: Arc<AtomicBool>,
    started_at: Instant,
}

impl RunningCapture {
    pub fn tier(&self) -> Tier {
        self.tier
    }

    pub fn filter_applied(&self) -> bool {
        self.filter_applied
    }

    pub fn flush_handle(&self) -> FlushHandle {
        self.session.flush_handle()
    }

    /// Halt the feed, then drain and stop the encoder
    pub async fn finish(self) -> CaptureOutput {
        self.halted.store(true, Ordering::SeqCst);
        let stats = match self.feed.await {
            Ok(stats) => stats,
            Err(e) => {
                warn!(error = %e, "Frame feed task failed");
                LoopStats::default()
            }
        };

        let mime_type = self.session.mime_type().to_string();
        let chunks = self.session.stop().await;
        let elapsed = self.started_at.elapsed();
        debug!(tier = %self.tier, ?stats, ?elapsed, "Capture run finished");

        CaptureOutput {
            tier: self.tier,
            filter_applied: self.filter_applied,
            mime_type,
            chunks,
            stats,
            elapsed,
        }
    }
}

#[async_trait]
pub trait CaptureStrategy: Send + Sync {
    fn tier(&self) -> Tier;

    /// Build compositor/encoder objects for this tier
    fn construct(&self, ctx: &CaptureContext) -> Result<Prepared, CaptureError>;

    /// Start encoding and the frame feed
    async fn run(&self, prepared: Prepared, ctx: &CaptureContext) -> Result<RunningCapture, CaptureError> {
        let (frames_tx, frames_rx) = mpsc::channel(FRAME_QUEUE_DEPTH);
        let session = EncoderSession::start(
            prepared.encoder,
            frames_rx,
            &ctx.source.audio_tracks(),
            ctx.on_chunk.clone(),
            SessionTiming::from_config(&ctx.config),
        )
        .await?;

        let halted = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&halted);
        let outer = Arc::clone(&ctx.is_active);
        let is_active: IsActive = Arc::new(move || !flag.load(Ordering::SeqCst) && outer());
        let feed = tokio::spawn((prepared.feed)(is_active, frames_tx));

        info!(tier = %self.tier(), filter_applied = prepared.filter_applied, "Capture tier running");

        Ok(RunningCapture {
            tier: self.tier(),
            filter_applied: prepared.filter_applied,
            session,
            feed,
            halted,
            started_at: Instant::now(),
        })
    }

    /// Whether the output is a usable artifact
    ///
    /// Tiny outputs are evidence of a silent encoder failure and count as
    /// insufficient, the same as no output at all.
    fn is_sufficient(&self, output: &CaptureOutput, min_artifact_bytes: usize) -> bool {
        !output.chunks.is_empty() && output.chunks.total_bytes() >= min_artifact_bytes
    }
}

/// Tier 1: filtered frames through the compositor
pub struct CompositedStrategy;

#[async_trait]
impl CaptureStrategy for CompositedStrategy {
    fn tier(&self) -> Tier {
        Tier::Composited
    }

    fn construct(&self, ctx: &CaptureContext) -> Result<Prepared, CaptureError> {
        let (compositor, probe_ok) = FrameCompositor::create(
            ctx.width,
            ctx.height,
            &ctx.program,
            ctx.config.max_surface_pixels,
        )?;

        // A filter that cannot be proven to work is not worth a composited run
        if !probe_ok && !ctx.program.is_identity() {
            return Err(FilterError::ProbeFailed.into());
        }

        let encoder = ctx
            .backend
            .create(ctx.format.as_deref(), &ctx.encoder_settings())?;

        let source = Arc::clone(&ctx.source);
        let interval = ctx.frame_interval();
        let display_tick = ctx.config.display_tick();
        let filter_applied = compositor.filter_applied();
        let feed: FeedLauncher = Box::new(move |is_active, output| {
            compositor
                .run_loop(source, interval, display_tick, is_active, output)
                .boxed()
        });

        Ok(Prepared {
            encoder,
            feed,
            filter_applied,
        })
    }
}

/// Tier 2: the unmodified source, never filtered
pub struct DirectStrategy;

#[async_trait]
impl CaptureStrategy for DirectStrategy {
    fn tier(&self) -> Tier {
        Tier::Direct
    }

    fn construct(&self, ctx: &CaptureContext) -> Result<Prepared, CaptureError> {
        let encoder = ctx
            .backend
            .create(ctx.format.as_deref(), &ctx.encoder_settings())?;

        let source = Arc::clone(&ctx.source);
        let interval = ctx.frame_interval();
        let feed: FeedLauncher = Box::new(move |is_active, output| {
            run_direct_feed(source, interval, is_active, output).boxed()
        });

        Ok(Prepared {
            encoder,
            feed,
            filter_applied: false,
        })
    }
}
