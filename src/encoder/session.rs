// SPDX-License-Identifier: GPL-3.0-only

//! Encoder session: one platform encoder driven by a single pump task
//!
//! The pump task exclusively owns the [`PlatformEncoder`]. Video frames,
//! audio buffers and flush/stop commands reach it over channels, so calls
//! into the encoder are never concurrent. Encoder output flows back through
//! [`EncoderEvent`]s into an append-only [`ChunkArena`].

use super::backend::{EncoderEvent, PlatformEncoder};
use super::chunk::ChunkArena;
use crate::config::CaptureConfig;
use crate::constants::timing::START_TIMEOUT_SECS;
use crate::errors::EncoderError;
use crate::media::{AudioBuffer, AudioTrack, VideoFrame};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Called for every stored chunk with its sequence number and size
pub type ChunkCallback = Arc<dyn Fn(u64, usize) + Send + Sync>;

/// Bounded waits used by the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTiming {
    pub initial_flush_delay: Duration,
    pub stop_timeout: Duration,
    pub start_timeout: Duration,
}

impl SessionTiming {
    pub fn from_config(config: &CaptureConfig) -> Self {
        Self {
            initial_flush_delay: config.initial_flush_delay(),
            stop_timeout: config.stop_timeout(),
            start_timeout: Duration::from_secs(START_TIMEOUT_SECS),
        }
    }
}

enum Command {
    Flush,
    Stop,
}

/// Cloneable handle for requesting data from a running session
#[derive(Clone)]
pub struct FlushHandle {
    commands: mpsc::UnboundedSender<Command>,
    encoding: Arc<AtomicBool>,
    pending: Arc<AtomicBool>,
}

impl FlushHandle {
    /// Ask the encoder to emit what it has so far
    ///
    /// Requests coalesce: while one is queued, further calls are no-ops.
    /// Fails with [`EncoderError::NotEncoding`] once the session is stopping.
    pub fn request_flush(&self) -> Result<(), EncoderError> {
        if !self.encoding.load(Ordering::SeqCst) {
            return Err(EncoderError::NotEncoding);
        }
        if self.pending.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.commands
            .send(Command::Flush)
            .map_err(|_| EncoderError::InputClosed)
    }
}

pub struct EncoderSession {
    mime_type: String,
    flush: FlushHandle,
    arena: Arc<Mutex<ChunkArena>>,
    stopped: watch::Receiver<bool>,
    pump: JoinHandle<Box<dyn PlatformEncoder>>,
    collector: JoinHandle<()>,
    forwarders: Vec<JoinHandle<()>>,
    initial_flush: JoinHandle<()>,
    stop_timeout: Duration,
}

impl EncoderSession {
    /// Start `encoder` and begin pumping `frames` and every track in `audio_tracks`
    ///
    /// Audio tracks are subscribed to, never modified. An initial flush is
    /// requested after `timing.initial_flush_delay` so that even very short
    /// recordings produce a chunk.
    pub async fn start(
        mut encoder: Box<dyn PlatformEncoder>,
        frames: mpsc::Receiver<VideoFrame>,
        audio_tracks: &[AudioTrack],
        on_chunk: Option<ChunkCallback>,
        timing: SessionTiming,
    ) -> Result<Self, EncoderError> {
        let mime_type = encoder.mime_type();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        match tokio::time::timeout(timing.start_timeout, encoder.start(event_tx)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(EncoderError::StartFailed(format!(
                    "no start acknowledgement within {:?}",
                    timing.start_timeout
                )));
            }
        }

        let arena = Arc::new(Mutex::new(ChunkArena::new()));
        let (stopped_tx, stopped_rx) = watch::channel(false);
        let collector = tokio::spawn(collect_events(
            event_rx,
            Arc::clone(&arena),
            on_chunk,
            stopped_tx,
        ));

        let (audio_tx, audio_rx) = mpsc::unbounded_channel();
        let forwarders = audio_tracks
            .iter()
            .enumerate()
            .map(|(index, track)| spawn_audio_forwarder(index, track, audio_tx.clone()))
            .collect();
        drop(audio_tx);

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let flush = FlushHandle {
            commands: command_tx,
            encoding: Arc::new(AtomicBool::new(true)),
            pending: Arc::new(AtomicBool::new(false)),
        };

        // The pump holds no sender, so dropping every handle closes its commands
        let pump = tokio::spawn(pump(
            encoder,
            frames,
            audio_rx,
            command_rx,
            Arc::clone(&flush.encoding),
            Arc::clone(&flush.pending),
        ));

        let initial = flush.clone();
        let delay = timing.initial_flush_delay;
        let initial_flush = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if initial.request_flush().is_ok() {
                debug!(?delay, "Initial flush requested");
            }
        });

        info!(mime = %mime_type, audio_tracks = audio_tracks.len(), "Encoder session started");

        Ok(Self {
            mime_type,
            flush,
            arena,
            stopped: stopped_rx,
            pump,
            collector,
            forwarders,
            initial_flush,
            stop_timeout: timing.stop_timeout,
        })
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn flush_handle(&self) -> FlushHandle {
        self.flush.clone()
    }

    /// Chunks stored so far
    pub fn chunk_count(&self) -> usize {
        self.arena.lock().len()
    }

    /// Final flush, stop, and bounded wait for the stopped notification
    ///
    /// Never hangs: after the stop timeout the chunks accumulated so far are
    /// returned as they are. The platform encoder is released before return.
    pub async fn stop(mut self) -> ChunkArena {
        self.initial_flush.abort();
        self.flush.encoding.store(false, Ordering::SeqCst);
        let _ = self.flush.commands.send(Command::Stop);

        let confirmed = matches!(
            tokio::time::timeout(self.stop_timeout, self.stopped.wait_for(|stopped| *stopped))
                .await,
            Ok(Ok(_))
        );
        if confirmed {
            debug!("Encoder confirmed stop");
        } else {
            warn!(
                timeout = ?self.stop_timeout,
                "Encoder did not confirm stop, keeping accumulated chunks"
            );
        }

        for forwarder in &self.forwarders {
            forwarder.abort();
        }

        match tokio::time::timeout(self.stop_timeout, &mut self.pump).await {
            Ok(Ok(encoder)) => drop(encoder),
            Ok(Err(e)) => warn!(error = %e, "Encoder pump task failed"),
            Err(_) => {
                warn!("Encoder pump did not exit, aborting");
                self.pump.abort();
            }
        }
        self.collector.abort();

        let arena = std::mem::take(&mut *self.arena.lock());
        info!(
            chunks = arena.len(),
            bytes = arena.total_bytes(),
            confirmed,
            "Encoder session stopped"
        );
        arena
    }
}

impl Drop for EncoderSession {
    fn drop(&mut self) {
        // No-ops after `stop`; otherwise releases the encoder without a final flush
        self.initial_flush.abort();
        for forwarder in &self.forwarders {
            forwarder.abort();
        }
        self.pump.abort();
        self.collector.abort();
    }
}

async fn collect_events(
    mut events: mpsc::UnboundedReceiver<EncoderEvent>,
    arena: Arc<Mutex<ChunkArena>>,
    on_chunk: Option<ChunkCallback>,
    stopped: watch::Sender<bool>,
) {
    while let Some(event) = events.recv().await {
        match event {
            EncoderEvent::Data(bytes) => {
                let stored = arena.lock().push(bytes).map(|c| (c.seq, c.data.len()));
                if let (Some((seq, len)), Some(callback)) = (stored, on_chunk.as_ref()) {
                    callback(seq, len);
                }
            }
            EncoderEvent::Stopped => break,
            EncoderEvent::Error(e) => warn!(error = %e, "Encoder reported an error"),
        }
    }
    let _ = stopped.send(true);
}

fn spawn_audio_forwarder(
    index: usize,
    track: &AudioTrack,
    output: mpsc::UnboundedSender<(usize, AudioBuffer)>,
) -> JoinHandle<()> {
    let mut input = track.subscribe();
    let track_id = track.id().to_string();
    tokio::spawn(async move {
        loop {
            match input.recv().await {
                Ok(buffer) => {
                    if output.send((index, buffer)).is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(track = %track_id, skipped, "Audio forwarder lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

async fn pump(
    mut encoder: Box<dyn PlatformEncoder>,
    mut frames: mpsc::Receiver<VideoFrame>,
    mut audio: mpsc::UnboundedReceiver<(usize, AudioBuffer)>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    encoding: Arc<AtomicBool>,
    pending: Arc<AtomicBool>,
) -> Box<dyn PlatformEncoder> {
    let mut video_errors = 0u64;
    let mut audio_errors = 0u64;

    loop {
        tokio::select! {
            biased;

            command = commands.recv() => match command {
                Some(Command::Flush) => {
                    pending.store(false, Ordering::SeqCst);
                    if let Err(e) = encoder.request_data() {
                        debug!(error = %e, "Flush request failed");
                    }
                }
                Some(Command::Stop) | None => break,
            },

            Some(frame) = frames.recv() => {
                if let Err(e) = encoder.push_video(&frame) {
                    video_errors += 1;
                    if video_errors == 1 {
                        warn!(error = %e, "Failed to push video frame");
                    }
                }
            }

            Some((track, buffer)) = audio.recv() => {
                if let Err(e) = encoder.push_audio(track, &buffer) {
                    audio_errors += 1;
                    if audio_errors == 1 {
                        warn!(track, error = %e, "Failed to push audio buffer");
                    }
                }
            }
        }
    }

    encoding.store(false, Ordering::SeqCst);

    // Input queued before the stop request still belongs to the recording
    while let Ok(frame) = frames.try_recv() {
        if encoder.push_video(&frame).is_err() {
            video_errors += 1;
        }
    }
    while let Ok((track, buffer)) = audio.try_recv() {
        if encoder.push_audio(track, &buffer).is_err() {
            audio_errors += 1;
        }
    }

    if let Err(e) = encoder.request_data() {
        debug!(error = %e, "Final flush failed");
    }
    if let Err(e) = encoder.stop() {
        warn!(error = %e, "Encoder stop failed");
    }
    if video_errors > 0 || audio_errors > 0 {
        warn!(video_errors, audio_errors, "Encoder rejected some input");
    }
    encoder
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    /// Emits one numbered chunk per data request
    struct Counting {
        events: Option<mpsc::UnboundedSender<EncoderEvent>>,
        requests: usize,
        confirm_stop: bool,
        audio_pushed: Arc<AtomicUsize>,
        released: Arc<AtomicBool>,
    }

    impl Drop for Counting {
        fn drop(&mut self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    impl Counting {
        fn new(confirm_stop: bool) -> (Box<dyn PlatformEncoder>, Arc<AtomicUsize>) {
            let (encoder, audio_pushed, _) = Self::tracked(confirm_stop);
            (encoder, audio_pushed)
        }

        fn tracked(confirm_stop: bool) -> (Box<dyn PlatformEncoder>, Arc<AtomicUsize>, Arc<AtomicBool>) {
            let audio_pushed = Arc::new(AtomicUsize::new(0));
            let released = Arc::new(AtomicBool::new(false));
            let encoder: Box<dyn PlatformEncoder> = Box::new(Self {
                events: None,
                requests: 0,
                confirm_stop,
                audio_pushed: Arc::clone(&audio_pushed),
                released: Arc::clone(&released),
            });
            (encoder, audio_pushed, released)
        }

        fn emit(&self, event: EncoderEvent) {
            if let Some(events) = &self.events {
                let _ = events.send(event);
            }
        }
    }

    #[async_trait]
    impl PlatformEncoder for Counting {
        fn mime_type(&self) -> String {
            "video/test".to_string()
        }

        async fn start(
            &mut self,
            events: mpsc::UnboundedSender<EncoderEvent>,
        ) -> Result<(), EncoderError> {
            self.events = Some(events);
            Ok(())
        }

        fn push_video(&mut self, _frame: &VideoFrame) -> Result<(), EncoderError> {
            Ok(())
        }

        fn push_audio(&mut self, _track: usize, _buffer: &AudioBuffer) -> Result<(), EncoderError> {
            self.audio_pushed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn request_data(&mut self) -> Result<(), EncoderError> {
            self.emit(EncoderEvent::Data(vec![self.requests as u8; 8]));
            self.requests += 1;
            Ok(())
        }

        fn stop(&mut self) -> Result<(), EncoderError> {
            if self.confirm_stop {
                self.emit(EncoderEvent::Stopped);
            }
            Ok(())
        }
    }

    fn timing() -> SessionTiming {
        SessionTiming {
            initial_flush_delay: Duration::from_millis(500),
            stop_timeout: Duration::from_secs(3),
            start_timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_flush_produces_a_chunk() {
        let (encoder, _) = Counting::new(true);
        let (_tx, rx) = mpsc::channel(4);
        let session = EncoderSession::start(encoder, rx, &[], None, timing())
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(session.chunk_count(), 1);

        let arena = session.stop().await;
        let seqs: Vec<u64> = arena.iter().map(|c| c.seq).collect();
        assert_eq!(seqs, vec![0, 1]);
        assert_eq!(arena.concat(), [vec![0u8; 8], vec![1u8; 8]].concat());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_bounded_without_confirmation() {
        let (encoder, _) = Counting::new(false);
        let (_tx, rx) = mpsc::channel(4);
        let session = EncoderSession::start(encoder, rx, &[], None, timing())
            .await
            .unwrap();

        let begun = tokio::time::Instant::now();
        let arena = session.stop().await;
        let waited = begun.elapsed();

        assert!(waited >= Duration::from_secs(3));
        assert!(waited < Duration::from_secs(4));
        // The final flush still arrived
        assert_eq!(arena.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_rejected_after_stop() {
        let (encoder, _) = Counting::new(true);
        let (_tx, rx) = mpsc::channel(4);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let on_chunk: ChunkCallback = Arc::new(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let session = EncoderSession::start(encoder, rx, &[], Some(on_chunk), timing())
            .await
            .unwrap();
        let handle = session.flush_handle();
        assert!(handle.request_flush().is_ok());
        // Coalesced with the pending request
        assert!(handle.request_flush().is_ok());

        let arena = session.stop().await;
        assert_eq!(handle.request_flush(), Err(EncoderError::NotEncoding));
        assert_eq!(calls.load(Ordering::SeqCst), arena.len());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_releases_encoder() {
        let (encoder, _, released) = Counting::tracked(true);
        let (_tx, rx) = mpsc::channel(4);
        let session = EncoderSession::start(encoder, rx, &[], None, timing())
            .await
            .unwrap();

        session.stop().await;
        assert!(released.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_session_releases_encoder() {
        let (encoder, _, released) = Counting::tracked(true);
        let track = AudioTrack::new("mic", 48_000, 1);
        let (_tx, rx) = mpsc::channel(4);
        let session = EncoderSession::start(encoder, rx, &[track.clone()], None, timing())
            .await
            .unwrap();
        // A handle outliving the session must not keep the encoder alive
        let handle = session.flush_handle();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!released.load(Ordering::SeqCst));

        drop(session);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(released.load(Ordering::SeqCst));
        // Forwarders unsubscribed
        assert_eq!(track.publish(AudioBuffer::new(vec![0], 48_000, 1)), 0);
        drop(handle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_audio_tracks_are_forwarded() {
        let (encoder, audio_pushed) = Counting::new(true);
        let track = AudioTrack::new("mic", 48_000, 1);
        let (_tx, rx) = mpsc::channel(4);
        let session = EncoderSession::start(encoder, rx, &[track.clone()], None, timing())
            .await
            .unwrap();

        track.publish(AudioBuffer::new(vec![0; 480], 48_000, 1));
        track.publish(AudioBuffer::new(vec![0; 480], 48_000, 1));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(audio_pushed.load(Ordering::SeqCst), 2);

        session.stop().await;
        // The track stays usable for other consumers
        let mut other = track.subscribe();
        track.publish(AudioBuffer::new(vec![1], 48_000, 1));
        assert_eq!(other.recv().await.unwrap().samples.len(), 1);
    }
}
