// SPDX-License-Identifier: GPL-3.0-only

//! Scripted in-memory encoder backend shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use booth_capture::encoder::{EncoderBackend, EncoderEvent, EncoderSettings, PlatformEncoder};
use booth_capture::errors::EncoderError;
use booth_capture::media::{AudioBuffer, VideoFrame};
use booth_capture::{CaptureCallbacks, CaptureConfig, FilterRegistry, RecordingSession};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

/// Counters observed across every encoder the backend created
#[derive(Default)]
pub struct Probe {
    pub created: AtomicUsize,
    pub released: AtomicUsize,
    pub frames: AtomicUsize,
    pub audio_buffers: AtomicUsize,
    pub flushes: AtomicUsize,
    pub audio_tracks: AtomicUsize,
}

impl Probe {
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn frames(&self) -> usize {
        self.frames.load(Ordering::SeqCst)
    }

    pub fn audio_buffers(&self) -> usize {
        self.audio_buffers.load(Ordering::SeqCst)
    }

    pub fn flushes(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }
}

pub struct ScriptedBackend {
    /// Creations that fail before encoders are handed out; `usize::MAX` never succeeds
    pub failures: Mutex<usize>,
    /// Bytes emitted per flush request
    pub chunk_size: usize,
    /// Whether `stop` sends the stopped notification
    pub confirm_stop: bool,
    /// How long each encoder takes to acknowledge start
    pub start_delay: Duration,
    pub probe: Arc<Probe>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            failures: Mutex::new(0),
            chunk_size: 4096,
            confirm_stop: true,
            start_delay: Duration::ZERO,
            probe: Arc::new(Probe::default()),
        }
    }

    pub fn failing(mut self, failures: usize) -> Self {
        self.failures = Mutex::new(failures);
        self
    }

    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn silent_stop(mut self) -> Self {
        self.confirm_stop = false;
        self
    }

    pub fn start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = delay;
        self
    }
}

impl EncoderBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn is_format_supported(&self, format: &str) -> bool {
        format.starts_with("video/webm")
    }

    fn create(
        &self,
        format: Option<&str>,
        settings: &EncoderSettings,
    ) -> Result<Box<dyn PlatformEncoder>, EncoderError> {
        {
            let mut failures = self.failures.lock();
            if *failures == usize::MAX {
                return Err(EncoderError::NotAvailable("scripted failure".into()));
            }
            if *failures > 0 {
                *failures -= 1;
                return Err(EncoderError::NotAvailable("scripted failure".into()));
            }
        }

        self.probe.created.fetch_add(1, Ordering::SeqCst);
        self.probe
            .audio_tracks
            .store(settings.audio_tracks.len(), Ordering::SeqCst);

        Ok(Box::new(ScriptedEncoder {
            mime_type: format.unwrap_or("video/webm").to_string(),
            events: None,
            chunk_size: self.chunk_size,
            confirm_stop: self.confirm_stop,
            start_delay: self.start_delay,
            next_fill: 0,
            probe: Arc::clone(&self.probe),
        }))
    }
}

/// Emits one chunk per flush, each filled with its sequence number
struct ScriptedEncoder {
    mime_type: String,
    events: Option<mpsc::UnboundedSender<EncoderEvent>>,
    chunk_size: usize,
    confirm_stop: bool,
    start_delay: Duration,
    next_fill: u8,
    probe: Arc<Probe>,
}

impl Drop for ScriptedEncoder {
    fn drop(&mut self) {
        self.probe.released.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl PlatformEncoder for ScriptedEncoder {
    fn mime_type(&self) -> String {
        self.mime_type.clone()
    }

    async fn start(&mut self, events: mpsc::UnboundedSender<EncoderEvent>) -> Result<(), EncoderError> {
        if !self.start_delay.is_zero() {
            tokio::time::sleep(self.start_delay).await;
        }
        self.events = Some(events);
        Ok(())
    }

    fn push_video(&mut self, _frame: &VideoFrame) -> Result<(), EncoderError> {
        self.probe.frames.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn push_audio(&mut self, _track: usize, _buffer: &AudioBuffer) -> Result<(), EncoderError> {
        self.probe.audio_buffers.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn request_data(&mut self) -> Result<(), EncoderError> {
        self.probe.flushes.fetch_add(1, Ordering::SeqCst);
        if let Some(events) = &self.events {
            let _ = events.send(EncoderEvent::Data(vec![self.next_fill; self.chunk_size]));
            self.next_fill = self.next_fill.wrapping_add(1);
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), EncoderError> {
        if self.confirm_stop
            && let Some(events) = &self.events
        {
            let _ = events.send(EncoderEvent::Stopped);
        }
        Ok(())
    }
}

/// Messages delivered to each callback
#[derive(Default)]
pub struct Recorded {
    pub progress: Mutex<Vec<f32>>,
    pub errors: Mutex<Vec<String>>,
    pub filter_errors: Mutex<Vec<String>>,
}

pub fn recording_callbacks() -> (CaptureCallbacks, Arc<Recorded>) {
    let recorded = Arc::new(Recorded::default());
    let (p, e, f) = (
        Arc::clone(&recorded),
        Arc::clone(&recorded),
        Arc::clone(&recorded),
    );
    let callbacks = CaptureCallbacks::new()
        .on_progress(move |percent| p.progress.lock().push(percent))
        .on_error(move |message| e.errors.lock().push(message.to_string()))
        .on_filter_error(move |message| f.filter_errors.lock().push(message.to_string()));
    (callbacks, recorded)
}

/// Session over `backend` with recording callbacks installed
pub fn session(
    backend: ScriptedBackend,
    config: CaptureConfig,
) -> (RecordingSession, Arc<Probe>, Arc<Recorded>) {
    let probe = Arc::clone(&backend.probe);
    let (callbacks, recorded) = recording_callbacks();
    let session = RecordingSession::new(Arc::new(backend), config, FilterRegistry::builtin())
        .with_callbacks(callbacks);
    (session, probe, recorded)
}
