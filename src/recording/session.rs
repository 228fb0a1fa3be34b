// SPDX-License-Identifier: GPL-3.0-only

//! Public recording state machine
//!
//! `Idle → Recording → Stopping → Finished`, or `Failed` when teardown itself
//! dies. Teardown runs exactly once in its own task; every `stop()` call and
//! the max-duration timer share its result.

use super::artifact::CaptureArtifact;
use super::callbacks::CaptureCallbacks;
use super::options::CaptureOptions;
use super::state::{RecorderSession, RecorderState};
use crate::compositor::IsActive;
use crate::config::CaptureConfig;
use crate::constants::artifact;
use crate::encoder::{ChunkCallback, EncoderBackend, FlushHandle, negotiate_format};
use crate::errors::{CaptureError, CaptureResult};
use crate::fallback::{CaptureContext, FallbackController, Tier};
use crate::filters::FilterRegistry;
use crate::media::MediaSource;
use chrono::Utc;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

type StopFuture = Shared<BoxFuture<'static, Arc<CaptureArtifact>>>;

/// Resources owned between `start` and teardown
struct ActiveRun {
    controller: FallbackController,
    timers: Vec<JoinHandle<()>>,
    filter_id: String,
}

struct Inner {
    record: Arc<Mutex<RecorderSession>>,
    callbacks: CaptureCallbacks,
    run: Mutex<Option<ActiveRun>>,
    stop: Mutex<Option<StopFuture>>,
}

pub struct RecordingSession {
    backend: Arc<dyn EncoderBackend>,
    config: Arc<CaptureConfig>,
    registry: FilterRegistry,
    inner: Arc<Inner>,
}

impl RecordingSession {
    pub fn new(
        backend: Arc<dyn EncoderBackend>,
        config: CaptureConfig,
        registry: FilterRegistry,
    ) -> Self {
        Self {
            backend,
            config: Arc::new(config),
            registry,
            inner: Arc::new(Inner {
                record: Arc::new(Mutex::new(RecorderSession::default())),
                callbacks: CaptureCallbacks::default(),
                run: Mutex::new(None),
                stop: Mutex::new(None),
            }),
        }
    }

    /// Replace the callbacks; only effective before `start`
    pub fn with_callbacks(mut self, callbacks: CaptureCallbacks) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.callbacks = callbacks;
        }
        self
    }

    /// Begin recording `source`
    ///
    /// Fails only on misuse: a session that already started, invalid
    /// options, or a source without live video. Every pipeline failure is
    /// absorbed into the returned tier.
    pub async fn start(
        &mut self,
        source: Arc<dyn MediaSource>,
        options: CaptureOptions,
    ) -> CaptureResult<Tier> {
        if self.state() != RecorderState::Idle {
            return Err(CaptureError::AlreadyStarted);
        }
        options.validate()?;
        if !source.is_live() {
            return Err(CaptureError::SourceNotLive(source.id().to_string()));
        }

        let program = options.resolve_filter(&self.registry);
        let format = negotiate_format(&self.config.format_candidates, self.backend.as_ref());
        let max_duration = options.max_duration();

        {
            let mut record = self.inner.record.lock();
            record.transition(RecorderState::Recording);
            record.started_at = Some(Instant::now());
        }
        let mut guard = StartGuard {
            record: Arc::clone(&self.inner.record),
            armed: true,
        };
        info!(
            session = %self.session_id(),
            source = %source.id(),
            filter = %program.id,
            ?max_duration,
            "Recording started"
        );

        let record = Arc::clone(&self.inner.record);
        let is_active: IsActive =
            Arc::new(move || record.lock().state == RecorderState::Recording);

        let ctx = CaptureContext {
            source,
            program,
            width: options.target_width,
            height: options.target_height,
            frame_rate: options.target_frame_rate,
            config: Arc::clone(&self.config),
            backend: Arc::clone(&self.backend),
            format,
            is_active,
            on_chunk: Some(progress_reporter(
                Arc::clone(&self.inner.record),
                self.inner.callbacks.clone(),
                max_duration,
            )),
        };

        let mut controller = FallbackController::new(ctx, self.inner.callbacks.clone());
        let tier = controller.start().await;
        {
            let mut record = self.inner.record.lock();
            record.escalate(tier);
            record.filter_applied = controller.filter_applied();
        }

        let mut timers = vec![spawn_duration_timer(Arc::downgrade(&self.inner), max_duration)];
        if let Some(flush) = controller.flush_handle() {
            timers.push(spawn_flush_timer(flush, self.config.flush_interval()));
        }

        *self.inner.run.lock() = Some(ActiveRun {
            controller,
            timers,
            filter_id: options.filter_id,
        });
        guard.armed = false;

        Ok(tier)
    }

    /// Stop recording and return the artifact
    ///
    /// Idempotent: every call after the first, including one made by the
    /// max-duration timer, resolves to the same artifact.
    pub async fn stop(&self) -> CaptureResult<Arc<CaptureArtifact>> {
        match begin_stop(&self.inner) {
            Some(teardown) => Ok(teardown.await),
            None => Err(CaptureError::NotStarted),
        }
    }

    pub fn state(&self) -> RecorderState {
        self.inner.record.lock().state
    }

    pub fn tier(&self) -> Tier {
        self.inner.record.lock().tier
    }

    pub fn filter_applied(&self) -> bool {
        self.inner.record.lock().filter_applied
    }

    pub fn progress(&self) -> f32 {
        self.inner.record.lock().progress
    }

    pub fn session_id(&self) -> Uuid {
        self.inner.record.lock().id
    }

    /// Copy of the session record
    pub fn snapshot(&self) -> RecorderSession {
        self.inner.record.lock().clone()
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        // Dropped while recording: halt the feeds and timers without an artifact
        let run = self.inner.run.lock().take();
        if let Some(run) = run {
            self.inner.record.lock().transition(RecorderState::Stopping);
            for timer in run.timers {
                timer.abort();
            }
            warn!("Recording session dropped without stop");
        }
    }
}

/// Returns the record to `Idle` when a `start` future is dropped mid-flight
struct StartGuard {
    record: Arc<Mutex<RecorderSession>>,
    armed: bool,
}

impl Drop for StartGuard {
    fn drop(&mut self) {
        if self.armed {
            warn!("Recording start abandoned, session reset to idle");
            self.record.lock().reset();
        }
    }
}

/// Start teardown on first call, hand out the shared result afterwards
///
/// `None` if the session never started.
fn begin_stop(inner: &Arc<Inner>) -> Option<StopFuture> {
    let mut stop = inner.stop.lock();
    if let Some(teardown) = stop.as_ref() {
        return Some(teardown.clone());
    }

    if !inner.record.lock().transition(RecorderState::Stopping) {
        return None;
    }
    let run = inner.run.lock().take()?;

    let handle = tokio::spawn(teardown(Arc::clone(inner), run));
    let record = Arc::clone(&inner.record);
    let callbacks = inner.callbacks.clone();
    let shared = async move {
        match handle.await {
            Ok(artifact) => artifact,
            Err(e) => {
                error!(error = %e, "Recording teardown failed");
                callbacks.error("Capture failed during teardown");
                Arc::new(failure_artifact(&record))
            }
        }
    }
    .boxed()
    .shared();

    *stop = Some(shared.clone());
    Some(shared)
}

async fn teardown(inner: Arc<Inner>, run: ActiveRun) -> Arc<CaptureArtifact> {
    // Flush timer goes first so no flush request races the final stop
    for timer in &run.timers {
        timer.abort();
    }
    debug!("Timers cancelled, finishing capture");

    let outcome = run.controller.finish().await;

    let mut record = inner.record.lock();
    record.escalate(outcome.tier);
    record.filter_applied = outcome.filter_applied;
    let duration_ms = record
        .started_at
        .map(|t| t.elapsed().as_millis() as u64)
        .unwrap_or_default();

    let artifact = CaptureArtifact {
        bytes: outcome.bytes,
        mime_type: outcome.mime_type,
        tier: record.tier,
        filter_applied: outcome.filter_applied,
        session_id: record.id,
        created_at: Utc::now(),
        duration_ms,
        chunk_count: outcome.chunk_count,
        filter_id: run.filter_id,
    };
    record.transition(RecorderState::Finished);

    info!(
        session = %record.id,
        tier = %artifact.tier,
        bytes = artifact.len(),
        mime = %artifact.mime_type,
        filter_applied = artifact.filter_applied,
        duration_ms,
        "Recording finished"
    );
    Arc::new(artifact)
}

/// Marker artifact for a teardown that never produced an outcome
fn failure_artifact(record: &Mutex<RecorderSession>) -> CaptureArtifact {
    let mut record = record.lock();
    record.escalate(Tier::Placeholder);
    record.filter_applied = false;
    record.transition(RecorderState::Failed);

    CaptureArtifact {
        bytes: artifact::FAILURE_MARKER.to_vec(),
        mime_type: artifact::FAILURE_MARKER_MIME.to_string(),
        tier: Tier::Placeholder,
        filter_applied: false,
        session_id: record.id,
        created_at: Utc::now(),
        duration_ms: record
            .started_at
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or_default(),
        chunk_count: 0,
        filter_id: String::new(),
    }
}

/// Chunk callback updating the record and reporting progress
fn progress_reporter(
    record: Arc<Mutex<RecorderSession>>,
    callbacks: CaptureCallbacks,
    max_duration: Duration,
) -> ChunkCallback {
    Arc::new(move |seq: u64, bytes: usize| {
        let report = {
            let mut record = record.lock();
            let elapsed = record.started_at.map(|t| t.elapsed()).unwrap_or_default();
            let percent = (elapsed.as_secs_f64() / max_duration.as_secs_f64() * 100.0) as f32;
            let percent = record.record_chunk(bytes, percent);
            // Chunks from the final flush still count, but progress is only
            // reported while recording
            (record.state == RecorderState::Recording).then_some(percent)
        };
        debug!(seq, bytes, "Chunk received");
        if let Some(percent) = report {
            callbacks.progress(percent);
        }
    })
}

fn spawn_duration_timer(inner: Weak<Inner>, max_duration: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(max_duration).await;
        if let Some(inner) = inner.upgrade() {
            info!(?max_duration, "Maximum duration reached, stopping");
            begin_stop(&inner);
        }
    })
}

fn spawn_flush_timer(flush: FlushHandle, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if let Err(e) = flush.request_flush() {
                debug!(error = %e, "Periodic flush stopped");
                break;
            }
        }
    })
}
