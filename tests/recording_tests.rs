// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the recording session state machine

mod common;

use booth_capture::{
    CaptureConfig, CaptureError, CaptureOptions, MediaSource, RecorderState, TestPatternSource,
    Tier,
};
use common::{ScriptedBackend, session};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

fn options(filter: &str, seconds: f64) -> CaptureOptions {
    CaptureOptions {
        filter_id: filter.to_string(),
        max_duration_seconds: seconds,
        target_width: 64,
        target_height: 48,
        target_frame_rate: 10,
        ..Default::default()
    }
}

fn source() -> Arc<dyn MediaSource> {
    Arc::new(TestPatternSource::new(64, 48, 10))
}

#[tokio::test(start_paused = true)]
async fn test_max_duration_stops_automatically() {
    let config = CaptureConfig::default();
    let budget = config.stop_timeout();
    let (mut session, _probe, _recorded) = session(ScriptedBackend::new(), config);

    session.start(source(), options("grayscale", 2.0)).await.unwrap();
    assert_eq!(session.state(), RecorderState::Recording);

    tokio::time::sleep(Duration::from_secs(2) + budget).await;
    assert_eq!(session.state(), RecorderState::Finished);

    let artifact = session.stop().await.unwrap();
    assert_eq!(artifact.tier, Tier::Composited);
    assert!(artifact.filter_applied);
    assert!(artifact.len() > 1024);
    assert_eq!(artifact.filter_id, "grayscale");
}

#[tokio::test(start_paused = true)]
async fn test_stop_is_idempotent() {
    let (mut session, _probe, _recorded) = session(ScriptedBackend::new(), CaptureConfig::default());
    session.start(source(), options("sepia", 10.0)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1500)).await;

    let (first, second) = tokio::join!(session.stop(), session.stop());
    let (first, second) = (first.unwrap(), second.unwrap());
    assert!(Arc::ptr_eq(&first, &second));

    let third = session.stop().await.unwrap();
    assert!(Arc::ptr_eq(&first, &third));
    assert_eq!(session.state(), RecorderState::Finished);
}

#[tokio::test(start_paused = true)]
async fn test_stop_immediately_after_start() {
    let (mut session, _probe, recorded) = session(ScriptedBackend::new(), CaptureConfig::default());
    session.start(source(), options("normal", 10.0)).await.unwrap();

    let artifact = session.stop().await.unwrap();
    assert!(!artifact.is_empty());
    assert_eq!(artifact.tier, Tier::Composited);
    assert!(recorded.errors.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_stop_resolves_without_encoder_confirmation() {
    let config = CaptureConfig::default();
    let budget = config.stop_timeout();
    let (mut session, _probe, _recorded) = session(ScriptedBackend::new().silent_stop(), config);
    session.start(source(), options("normal", 10.0)).await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    let begin = Instant::now();
    let artifact = session.stop().await.unwrap();
    let elapsed = begin.elapsed();

    assert!(elapsed >= budget);
    assert!(elapsed < budget * 2 + Duration::from_secs(1));
    assert!(!artifact.is_empty());
    assert_eq!(session.state(), RecorderState::Finished);
}

#[tokio::test(start_paused = true)]
async fn test_video_only_source() {
    let (mut session, probe, recorded) = session(ScriptedBackend::new(), CaptureConfig::default());
    session.start(source(), options("vivid", 10.0)).await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    let artifact = session.stop().await.unwrap();
    assert_eq!(artifact.tier, Tier::Composited);
    assert!(probe.frames() > 0);
    assert_eq!(probe.audio_tracks.load(std::sync::atomic::Ordering::SeqCst), 0);
    assert_eq!(probe.audio_buffers(), 0);
    assert!(recorded.errors.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_audio_track_is_attached() {
    let (mut session, probe, _recorded) = session(ScriptedBackend::new(), CaptureConfig::default());
    let source: Arc<dyn MediaSource> = Arc::new(TestPatternSource::new(64, 48, 10).with_tone(440.0));
    session.start(Arc::clone(&source), options("normal", 10.0)).await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    session.stop().await.unwrap();
    assert_eq!(probe.audio_tracks.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert!(probe.audio_buffers() > 0);
    // The source keeps its track for other consumers
    assert_eq!(source.audio_tracks().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_forced_compositor_failure_falls_back_to_direct() {
    let config = CaptureConfig {
        max_surface_pixels: 16,
        ..Default::default()
    };
    let (mut session, _probe, recorded) = session(ScriptedBackend::new(), config);

    let tier = session.start(source(), options("sepia", 10.0)).await.unwrap();
    assert_eq!(tier, Tier::Direct);
    assert!(!session.filter_applied());
    tokio::time::sleep(Duration::from_secs(1)).await;

    let artifact = session.stop().await.unwrap();
    assert_eq!(artifact.tier, Tier::Direct);
    assert!(!artifact.filter_applied);
    assert_eq!(recorded.filter_errors.lock().len(), 1);
    assert!(recorded.errors.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_failed_filter_probe_is_not_composited() {
    let (mut session, _probe, recorded) = session(ScriptedBackend::new(), CaptureConfig::default());
    let options = CaptureOptions {
        filter_expression: Some("blur(4px)".to_string()),
        ..options("normal", 10.0)
    };

    session.start(source(), options).await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    let artifact = session.stop().await.unwrap();
    assert_ne!(artifact.tier, Tier::Composited);
    assert!(!artifact.filter_applied);
    assert!(!recorded.filter_errors.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_unavailable_filter_reported_when_nothing_encodes() {
    let (mut session, _probe, recorded) =
        session(ScriptedBackend::new().failing(usize::MAX), CaptureConfig::default());
    let options = CaptureOptions {
        filter_expression: Some("blur(4px)".to_string()),
        ..options("normal", 10.0)
    };

    let tier = session.start(source(), options).await.unwrap();
    assert_eq!(tier, Tier::Placeholder);

    let artifact = session.stop().await.unwrap();
    assert_eq!(artifact.tier, Tier::Placeholder);
    assert!(!artifact.filter_applied);
    assert_eq!(recorded.filter_errors.lock().len(), 1);
    assert_eq!(recorded.errors.lock().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_both_encoders_failing_yields_placeholder() {
    let (mut session, _probe, recorded) =
        session(ScriptedBackend::new().failing(2), CaptureConfig::default());

    let tier = session.start(source(), options("sepia", 10.0)).await.unwrap();
    assert_eq!(tier, Tier::Placeholder);

    let artifact = session.stop().await.unwrap();
    assert_eq!(artifact.tier, Tier::Placeholder);
    assert!(!artifact.is_empty());
    assert!(!artifact.filter_applied);
    assert_eq!(recorded.errors.lock().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_placeholder_still_when_nothing_encodes() {
    let (mut session, _probe, recorded) =
        session(ScriptedBackend::new().failing(usize::MAX), CaptureConfig::default());
    session.start(source(), options("normal", 10.0)).await.unwrap();

    let artifact = session.stop().await.unwrap();
    assert_eq!(artifact.tier, Tier::Placeholder);
    assert_eq!(artifact.mime_type, "image/png");
    assert_eq!(artifact.file_extension(), "png");
    assert_eq!(&artifact.bytes[..4], &[0x89, b'P', b'N', b'G']);
    assert!(!recorded.errors.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_tiny_output_counts_as_failure() {
    let (mut session, _probe, recorded) =
        session(ScriptedBackend::new().chunk_size(8), CaptureConfig::default());
    let tier = session.start(source(), options("normal", 10.0)).await.unwrap();
    assert_eq!(tier, Tier::Composited);
    tokio::time::sleep(Duration::from_secs(2)).await;

    let artifact = session.stop().await.unwrap();
    assert_eq!(artifact.tier, Tier::Placeholder);
    assert!(!artifact.is_empty());
    assert_eq!(recorded.errors.lock().len(), 1);
    assert_eq!(session.tier(), Tier::Placeholder);
}

#[tokio::test(start_paused = true)]
async fn test_chunks_concatenate_in_arrival_order() {
    let chunk_size = 4096;
    let (mut session, _probe, _recorded) = session(
        ScriptedBackend::new().chunk_size(chunk_size),
        CaptureConfig::default(),
    );
    session.start(source(), options("noir", 10.0)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(3500)).await;

    let artifact = session.stop().await.unwrap();
    assert_eq!(artifact.len() % chunk_size, 0);
    let fills: Vec<u8> = artifact.bytes.chunks_exact(chunk_size).map(|c| c[0]).collect();
    assert_eq!(fills.len(), artifact.chunk_count);
    assert!(fills.len() >= 3);
    assert!(fills.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test(start_paused = true)]
async fn test_progress_is_monotonic() {
    let (mut session, _probe, recorded) = session(ScriptedBackend::new(), CaptureConfig::default());
    session.start(source(), options("warm", 4.0)).await.unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;
    session.stop().await.unwrap();

    let progress = recorded.progress.lock().clone();
    assert!(!progress.is_empty());
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));
    assert!(progress.iter().all(|p| (0.0..=100.0).contains(p)));
    assert!(session.progress() <= 100.0);
}

#[tokio::test(start_paused = true)]
async fn test_progress_reported_for_every_chunk() {
    let (mut session, _probe, recorded) = session(ScriptedBackend::new(), CaptureConfig::default());
    session.start(source(), options("warm", 10.0)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(2500)).await;

    let chunks = session.snapshot().chunk_count as usize;
    assert!(chunks >= 2);
    assert_eq!(recorded.progress.lock().len(), chunks);
    session.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_dropping_session_releases_encoder() {
    let (mut session, probe, _recorded) = session(ScriptedBackend::new(), CaptureConfig::default());
    session.start(source(), options("sepia", 10.0)).await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(probe.created(), 1);
    assert_eq!(probe.released(), 0);

    drop(session);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(probe.released(), 1);

    let frames = probe.frames();
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(probe.frames(), frames);
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_start_returns_to_idle() {
    let backend = ScriptedBackend::new().start_delay(Duration::from_secs(1));
    let (mut session, probe, _recorded) = session(backend, CaptureConfig::default());

    let abandoned = tokio::time::timeout(
        Duration::from_millis(100),
        session.start(source(), options("normal", 5.0)),
    )
    .await;
    assert!(abandoned.is_err());
    assert_eq!(session.state(), RecorderState::Idle);
    assert_eq!(probe.released(), probe.created());
    assert!(matches!(session.stop().await, Err(CaptureError::NotStarted)));

    let tier = session.start(source(), options("normal", 5.0)).await.unwrap();
    assert_eq!(tier, Tier::Composited);
    session.stop().await.unwrap();
    assert_eq!(session.state(), RecorderState::Finished);
}

#[tokio::test(start_paused = true)]
async fn test_no_timer_fires_after_finish() {
    let (mut session, probe, recorded) = session(ScriptedBackend::new(), CaptureConfig::default());
    session.start(source(), options("fade", 3.0)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1500)).await;
    session.stop().await.unwrap();

    let flushes = probe.flushes();
    let frames = probe.frames();
    let progress = recorded.progress.lock().len();
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(probe.flushes(), flushes);
    assert_eq!(probe.frames(), frames);
    assert_eq!(recorded.progress.lock().len(), progress);
    assert_eq!(session.state(), RecorderState::Finished);
}

#[tokio::test(start_paused = true)]
async fn test_misuse_is_reported() {
    let (mut session, _probe, _recorded) = session(ScriptedBackend::new(), CaptureConfig::default());
    assert!(matches!(session.stop().await, Err(CaptureError::NotStarted)));

    let offline = Arc::new(TestPatternSource::new(64, 48, 10));
    offline.set_live(false);
    assert!(matches!(
        session.start(offline, options("normal", 5.0)).await,
        Err(CaptureError::SourceNotLive(_))
    ));
    assert!(matches!(
        session.start(source(), options("normal", -1.0)).await,
        Err(CaptureError::InvalidOptions(_))
    ));
    assert!(matches!(
        session.start(source(), options("normal", 1e20)).await,
        Err(CaptureError::InvalidOptions(_))
    ));
    assert_eq!(session.state(), RecorderState::Idle);

    session.start(source(), options("normal", 5.0)).await.unwrap();
    assert!(matches!(
        session.start(source(), options("normal", 5.0)).await,
        Err(CaptureError::AlreadyStarted)
    ));
    session.stop().await.unwrap();
    assert!(matches!(
        session.start(source(), options("normal", 5.0)).await,
        Err(CaptureError::AlreadyStarted)
    ));
}
