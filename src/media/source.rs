// SPDX-License-Identifier: GPL-3.0-only

//! Live source abstraction
//!
//! The capture pipeline only ever reads from a source. Video is sampled via
//! [`MediaSource::current_frame`]; audio tracks are broadcast channels, so
//! the encoder can subscribe to a track while a live preview keeps using it.

use super::frame::{AudioBuffer, VideoFrame};
use tokio::sync::broadcast;

/// Buffered audio chunks per subscriber before the oldest are dropped
const AUDIO_CHANNEL_CAPACITY: usize = 64;

/// A live audio/video source (camera + microphone, test pattern, ...)
pub trait MediaSource: Send + Sync {
    /// Identifier used in logs
    fn id(&self) -> &str;

    /// Whether the source currently delivers a live stream
    fn is_live(&self) -> bool;

    /// The most recent video frame, if one has arrived
    fn current_frame(&self) -> Option<VideoFrame>;

    /// Zero or more audio tracks
    fn audio_tracks(&self) -> Vec<AudioTrack>;
}

/// Handle to one audio track of a source
///
/// Cloning the handle yields another reader of the same track; neither clone
/// nor subscriber can stop or alter the track for other consumers.
#[derive(Debug, Clone)]
pub struct AudioTrack {
    id: String,
    sample_rate: u32,
    channels: u16,
    sender: broadcast::Sender<AudioBuffer>,
}

impl AudioTrack {
    pub fn new(id: &str, sample_rate: u32, channels: u16) -> Self {
        let (sender, _) = broadcast::channel(AUDIO_CHANNEL_CAPACITY);
        Self {
            id: id.to_string(),
            sample_rate,
            channels,
            sender,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Start receiving buffers published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<AudioBuffer> {
        self.sender.subscribe()
    }

    /// Publish a buffer to all subscribers; returns how many received it
    pub fn publish(&self, buffer: AudioBuffer) -> usize {
        self.sender.send(buffer).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_track_clones_share_the_stream() {
        let track = AudioTrack::new("mic", 48_000, 2);
        let copy = track.clone();
        let mut a = track.subscribe();
        let mut b = copy.subscribe();

        assert_eq!(track.publish(AudioBuffer::new(vec![1, 2], 48_000, 2)), 2);
        assert_eq!(a.recv().await.unwrap().samples.len(), 2);
        assert_eq!(b.recv().await.unwrap().samples.len(), 2);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let track = AudioTrack::new("mic", 48_000, 1);
        assert_eq!(track.publish(AudioBuffer::new(vec![0], 48_000, 1)), 0);
    }
}
