// SPDX-License-Identifier: GPL-3.0-only

//! Synthetic source: moving color bars and an optional sine tone
//!
//! Used by `booth-capture record --source test` and by the tests. Frames are
//! rendered on demand from the time since creation, so the source needs no
//! background task for video. Time is read from the tokio clock so paused-time
//! tests see a deterministic pattern.

use super::frame::{AudioBuffer, VideoFrame};
use super::source::{AudioTrack, MediaSource};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

/// SMPTE-style bar colors
const BARS: [[u8; 4]; 7] = [
    [192, 192, 192, 255],
    [192, 192, 0, 255],
    [0, 192, 192, 255],
    [0, 192, 0, 255],
    [192, 0, 192, 255],
    [192, 0, 0, 255],
    [0, 0, 192, 255],
];

const TONE_SAMPLE_RATE: u32 = 48_000;
const TONE_CHUNK: Duration = Duration::from_millis(20);

pub struct TestPatternSource {
    id: String,
    width: u32,
    height: u32,
    fps: u32,
    started: Instant,
    live: AtomicBool,
    tracks: Vec<AudioTrack>,
    tone_task: Mutex<Option<JoinHandle<()>>>,
    cache: Mutex<Option<(u64, VideoFrame)>>,
}

impl TestPatternSource {
    /// Video-only test source
    pub fn new(width: u32, height: u32, fps: u32) -> Self {
        Self {
            id: format!("test-pattern-{}x{}", width, height),
            width,
            height,
            fps: fps.max(1),
            started: Instant::now(),
            live: AtomicBool::new(true),
            tracks: Vec::new(),
            tone_task: Mutex::new(None),
            cache: Mutex::new(None),
        }
    }

    /// Add a mono sine tone track
    ///
    /// Must be called from within a tokio runtime; the tone is published
    /// every 20 ms until the source is dropped.
    pub fn with_tone(mut self, frequency_hz: f32) -> Self {
        let track = AudioTrack::new("test-tone", TONE_SAMPLE_RATE, 1);
        let publisher = track.clone();
        let task = tokio::spawn(async move {
            let samples_per_chunk =
                (TONE_SAMPLE_RATE as u128 * TONE_CHUNK.as_millis() / 1000) as usize;
            let mut phase = 0.0f32;
            let step = 2.0 * std::f32::consts::PI * frequency_hz / TONE_SAMPLE_RATE as f32;
            let mut ticker = tokio::time::interval(TONE_CHUNK);
            loop {
                ticker.tick().await;
                let samples: Vec<i16> = (0..samples_per_chunk)
                    .map(|_| {
                        let s = (phase.sin() * i16::MAX as f32 * 0.25) as i16;
                        phase = (phase + step) % (2.0 * std::f32::consts::PI);
                        s
                    })
                    .collect();
                publisher.publish(AudioBuffer::new(samples, TONE_SAMPLE_RATE, 1));
            }
        });
        self.tracks.push(track);
        *self.tone_task.lock() = Some(task);
        self
    }

    /// Simulate the camera going away
    pub fn set_live(&self, live: bool) {
        self.live.store(live, Ordering::SeqCst);
    }

    /// Render frame number `index`
    pub fn render(&self, index: u64) -> VideoFrame {
        let (w, h) = (self.width as usize, self.height as usize);
        let mut data = vec![0u8; w * h * 4];
        let bar_width = (w / BARS.len()).max(1);
        let offset = (index as usize * 4) % w.max(1);

        for y in 0..h {
            for x in 0..w {
                let bar = ((x + offset) / bar_width) % BARS.len();
                let idx = (y * w + x) * 4;
                data[idx..idx + 4].copy_from_slice(&BARS[bar]);
            }
        }

        VideoFrame::from_rgba(self.width, self.height, data)
    }
}

impl MediaSource for TestPatternSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst) && self.width > 0 && self.height > 0
    }

    fn current_frame(&self) -> Option<VideoFrame> {
        if !self.is_live() {
            return None;
        }

        let index = (self.started.elapsed().as_secs_f64() * self.fps as f64) as u64;
        let mut cache = self.cache.lock();
        if let Some((cached_index, frame)) = cache.as_ref()
            && *cached_index == index
        {
            return Some(frame.clone());
        }

        let frame = self.render(index);
        *cache = Some((index, frame.clone()));
        Some(frame)
    }

    fn audio_tracks(&self) -> Vec<AudioTrack> {
        self.tracks.clone()
    }
}

impl Drop for TestPatternSource {
    fn drop(&mut self) {
        if let Some(task) = self.tone_task.lock().take() {
            debug!(source = %self.id, "Stopping test tone");
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_dimensions() {
        let source = TestPatternSource::new(70, 10, 30);
        let frame = source.render(0);
        assert_eq!(frame.width, 70);
        assert!(frame.is_complete());
        assert_eq!(frame.pixel(0, 0), BARS[0]);
        assert_eq!(frame.pixel(69, 9), BARS[6]);
    }

    #[test]
    fn test_pattern_moves() {
        let source = TestPatternSource::new(70, 2, 30);
        assert_ne!(source.render(0).pixel(8, 0), source.render(1).pixel(8, 0));
    }

    #[test]
    fn test_not_live_has_no_frames() {
        let source = TestPatternSource::new(8, 8, 30);
        assert!(source.current_frame().is_some());
        source.set_live(false);
        assert!(!source.is_live());
        assert!(source.current_frame().is_none());
        assert!(source.audio_tracks().is_empty());
    }

    #[tokio::test]
    async fn test_tone_track_publishes() {
        let source = TestPatternSource::new(8, 8, 30).with_tone(440.0);
        let tracks = source.audio_tracks();
        assert_eq!(tracks.len(), 1);
        let mut rx = tracks[0].subscribe();
        let buf = rx.recv().await.unwrap();
        assert_eq!(buf.samples.len(), 960);
        assert_eq!(buf.channels, 1);
    }
}
