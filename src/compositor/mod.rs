// SPDX-License-Identifier: GPL-3.0-only

//! Frame compositor
//!
//! Re-draws the live source onto an owned, fixed-size [`Surface`] with the
//! active filter applied, and forwards each drawn surface to the encoder.
//!
//! The draw loop ticks at the display refresh rate but only draws when at
//! least one target frame interval has passed since the previous draw. This
//! keeps the output frame rate stable regardless of the host refresh rate.

pub mod direct;
pub mod surface;

pub use direct::run_direct_feed;
pub use surface::Surface;

use crate::errors::CompositorError;
use crate::filters::{FilterChain, FilterProgram};
use crate::media::{MediaSource, VideoFrame};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Liveness check consulted before every draw and every re-schedule
pub type IsActive = Arc<dyn Fn() -> bool + Send + Sync>;

/// Counters reported when a draw loop exits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    /// Display ticks observed
    pub ticks: u64,
    /// Frames drawn and handed to the encoder
    pub frames_drawn: u64,
    /// Frames dropped because the encoder input was full
    pub frames_dropped: u64,
}

pub struct FrameCompositor {
    surface: Surface,
    chain: FilterChain,
    filter_applied: bool,
    filter_id: String,
}

impl FrameCompositor {
    /// Allocate the surface and probe the filter
    ///
    /// The second value is the capability probe result. A failed probe is not
    /// an error: the compositor still draws, unfiltered, and reports
    /// `filter_applied() == false`.
    pub fn create(
        width: u32,
        height: u32,
        program: &FilterProgram,
        max_surface_pixels: u64,
    ) -> Result<(Self, bool), CompositorError> {
        let surface = Surface::new(width, height, max_surface_pixels)?;

        let (chain, probe_ok) = match probe_filter(&program.pixel_expression) {
            Ok(chain) => (chain, true),
            Err(reason) => {
                warn!(
                    filter = %program.id,
                    expression = %program.pixel_expression,
                    %reason,
                    "Filter capability probe failed, drawing unfiltered"
                );
                (FilterChain::default(), false)
            }
        };

        info!(width, height, filter = %program.id, probe_ok, "Frame compositor created");

        Ok((
            Self {
                surface,
                chain,
                filter_applied: probe_ok,
                filter_id: program.id.clone(),
            },
            probe_ok,
        ))
    }

    pub fn filter_applied(&self) -> bool {
        self.filter_applied
    }

    /// Clear the surface and draw the source's current frame
    ///
    /// Returns `None` if the source has no frame yet.
    pub fn draw(&mut self, source: &dyn MediaSource) -> Option<VideoFrame> {
        let frame = source.current_frame()?;
        self.surface.clear();
        let filter = self.filter_applied.then_some(&self.chain);
        self.surface.draw_frame(&frame, filter);
        Some(self.surface.snapshot())
    }

    /// Display-synchronized draw loop
    ///
    /// Runs until `is_active()` turns false or the encoder input closes.
    /// `is_active` is checked on every tick before drawing, so no frame is
    /// drawn once the session has left the recording state.
    pub async fn run_loop(
        mut self,
        source: Arc<dyn MediaSource>,
        target_interval: Duration,
        display_tick: Duration,
        is_active: IsActive,
        output: mpsc::Sender<VideoFrame>,
    ) -> LoopStats {
        let mut stats = LoopStats::default();
        let mut ticker = tokio::time::interval(display_tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_draw: Option<Instant> = None;

        debug!(filter = %self.filter_id, ?target_interval, ?display_tick, "Compositor loop started");

        loop {
            ticker.tick().await;
            if !is_active() {
                break;
            }
            stats.ticks += 1;

            let now = Instant::now();
            let due = last_draw.is_none_or(|t| now.duration_since(t) >= target_interval);
            if !due {
                continue;
            }

            let Some(frame) = self.draw(source.as_ref()) else {
                continue;
            };
            last_draw = Some(now);

            match output.try_send(frame) {
                Ok(()) => stats.frames_drawn += 1,
                Err(mpsc::error::TrySendError::Full(_)) => stats.frames_dropped += 1,
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!("Encoder input closed, stopping compositor loop");
                    break;
                }
            }
        }

        info!(
            ticks = stats.ticks,
            drawn = stats.frames_drawn,
            dropped = stats.frames_dropped,
            "Compositor loop stopped"
        );
        stats
    }
}

/// Parse the expression and run it on a 1x1 test region, catching panics
fn probe_filter(expression: &str) -> Result<FilterChain, String> {
    let chain = FilterChain::parse(expression).map_err(|e| e.to_string())?;
    match catch_unwind(AssertUnwindSafe(|| chain.probe())) {
        Ok(Ok(())) => Ok(chain),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err("filter panicked on test region".to_string()),
    }
}

/// Frame interval for a target frame rate
pub fn frame_interval(fps: u32) -> Duration {
    Duration::from_secs_f64(1.0 / fps.max(1) as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::TestPatternSource;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_probe_failure_is_not_an_error() {
        let program = FilterProgram::new("soft", "Soft", "blur(3px)");
        let (compositor, probe_ok) = FrameCompositor::create(16, 16, &program, 1_000).unwrap();
        assert!(!probe_ok);
        assert!(!compositor.filter_applied());
    }

    #[test]
    fn test_oversized_surface_fails_construction() {
        let program = FilterProgram::identity();
        assert!(FrameCompositor::create(100, 100, &program, 1_000).is_err());
    }

    #[test]
    fn test_draw_applies_filter() {
        let source = TestPatternSource::new(14, 2, 30);
        let program = FilterProgram::new("grayscale", "Gray", "grayscale(1)");
        let (mut compositor, probe_ok) = FrameCompositor::create(7, 1, &program, 1_000).unwrap();
        assert!(probe_ok);

        let frame = compositor.draw(&source).unwrap();
        for x in 0..7 {
            let [r, g, b, _] = frame.pixel(x, 0);
            assert_eq!(r, g);
            assert_eq!(g, b);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_honors_target_interval() {
        let source: Arc<dyn MediaSource> = Arc::new(TestPatternSource::new(8, 8, 30));
        let (compositor, _) = FrameCompositor::create(4, 4, &FilterProgram::identity(), 100).unwrap();
        let (tx, mut rx) = mpsc::channel(1024);

        let active = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&active);
        let is_active: IsActive = Arc::new(move || flag.load(Ordering::SeqCst));

        let handle = tokio::spawn(compositor.run_loop(
            source,
            Duration::from_millis(100),
            Duration::from_millis(10),
            is_active,
            tx,
        ));

        tokio::time::sleep(Duration::from_millis(1005)).await;
        active.store(false, Ordering::SeqCst);
        let stats = handle.await.unwrap();

        // ~100 display ticks but only one draw per 100 ms
        assert!(stats.ticks >= 90);
        assert!((10..=11).contains(&stats.frames_drawn), "{:?}", stats);

        let mut received = 0;
        while rx.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received as u64, stats.frames_drawn);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_never_draws_when_inactive() {
        let source: Arc<dyn MediaSource> = Arc::new(TestPatternSource::new(8, 8, 30));
        let (compositor, _) = FrameCompositor::create(4, 4, &FilterProgram::identity(), 100).unwrap();
        let (tx, mut rx) = mpsc::channel(8);
        let is_active: IsActive = Arc::new(|| false);

        let stats = compositor
            .run_loop(source, Duration::from_millis(10), Duration::from_millis(10), is_active, tx)
            .await;
        assert_eq!(stats.frames_drawn, 0);
        assert!(rx.try_recv().is_err());
    }
}
