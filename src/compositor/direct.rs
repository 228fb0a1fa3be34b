// SPDX-License-Identifier: GPL-3.0-only

//! Unfiltered source forwarding for the direct capture tier
//!
//! Bypasses the compositor entirely: frames go to the encoder exactly as the
//! source produced them, at the target frame rate.

use super::{IsActive, LoopStats};
use crate::media::{MediaSource, VideoFrame};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

pub async fn run_direct_feed(
    source: Arc<dyn MediaSource>,
    frame_interval: Duration,
    is_active: IsActive,
    output: mpsc::Sender<VideoFrame>,
) -> LoopStats {
    let mut stats = LoopStats::default();
    let mut ticker = tokio::time::interval(frame_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    debug!(source = %source.id(), ?frame_interval, "Direct feed started");

    loop {
        ticker.tick().await;
        if !is_active() {
            break;
        }
        stats.ticks += 1;

        let Some(frame) = source.current_frame() else {
            continue;
        };

        match output.try_send(frame) {
            Ok(()) => stats.frames_drawn += 1,
            Err(mpsc::error::TrySendError::Full(_)) => stats.frames_dropped += 1,
            Err(mpsc::error::TrySendError::Closed(_)) => break,
        }
    }

    info!(forwarded = stats.frames_drawn, dropped = stats.frames_dropped, "Direct feed stopped");
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::TestPatternSource;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_forwards_unmodified_frames() {
        let pattern = Arc::new(TestPatternSource::new(7, 1, 30));
        let expected = pattern.render(0).pixel(3, 0);
        let source: Arc<dyn MediaSource> = pattern;

        let active = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&active);
        let (tx, mut rx) = mpsc::channel(16);
        let handle = tokio::spawn(run_direct_feed(
            source,
            Duration::from_millis(50),
            Arc::new(move || flag.load(Ordering::SeqCst)),
            tx,
        ));

        let first = rx.recv().await.unwrap();
        assert_eq!((first.width, first.height), (7, 1));
        assert_eq!(first.pixel(3, 0), expected);

        active.store(false, Ordering::SeqCst);
        let stats = handle.await.unwrap();
        assert!(stats.frames_drawn >= 1);
    }
}
