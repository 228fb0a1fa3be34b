// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands
//!
//! This module provides command-line functionality for:
//! - Listing filter programs
//! - Inspecting encoder format support
//! - Recording a clip through the full capture pipeline

use crate::SourceKind;
use booth_capture::encoder::{EncoderBackend, negotiate_format};
use booth_capture::filters::FilterChain;
use booth_capture::{
    CameraSource, CaptureCallbacks, CaptureConfig, CaptureOptions, FilterRegistry,
    GstEncoderBackend, MediaSource, RecorderState, RecordingSession, TestPatternSource,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Default folder name for saving clips
const DEFAULT_SAVE_FOLDER: &str = "Booth";

/// Frequency of the test source's tone
const TEST_TONE_HZ: f32 = 440.0;

pub struct RecordArgs {
    pub filter: String,
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub source: SourceKind,
    pub audio: bool,
    pub output: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

/// List all filter programs with their probe result
pub fn list_filters() -> Result<(), Box<dyn std::error::Error>> {
    let registry = FilterRegistry::builtin();

    println!("Available filters:");
    println!();
    for program in registry.all() {
        let status = match FilterChain::parse(&program.pixel_expression).and_then(|c| c.probe()) {
            Ok(()) => "ok".to_string(),
            Err(e) => format!("unavailable ({})", e),
        };
        println!("  {:<10} {:<14} {}", program.id, program.display_name, status);
        println!("             {}", program.pixel_expression);
    }

    Ok(())
}

/// Show per-candidate format support and the negotiated result
pub fn list_formats(config: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config.as_deref())?;
    let backend = GstEncoderBackend::new();

    println!("Encoder backend: {}", backend.name());
    println!();
    for candidate in &config.format_candidates {
        let supported = if backend.is_format_supported(candidate) {
            "yes"
        } else {
            "no"
        };
        println!("  {:<26} {}", candidate, supported);
    }
    println!();

    match negotiate_format(&config.format_candidates, &backend) {
        Some(format) => println!("Negotiated: {}", format),
        None => println!("Negotiated: host default"),
    }
    let codecs = backend.available_codecs();
    if codecs.is_empty() {
        println!("No encoder chains installed; captures will deliver the placeholder still.");
    } else {
        println!("Installed chains: {:?}", codecs);
    }

    Ok(())
}

/// Record a clip and write it to disk
pub fn record(args: RecordArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(args.config.as_deref())?;
    let registry = FilterRegistry::builtin();
    if !registry.contains(&args.filter) {
        println!("Unknown filter '{}', recording without a filter", args.filter);
    }

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let source: Arc<dyn MediaSource> = match args.source {
            SourceKind::Test => {
                let pattern = TestPatternSource::new(args.width, args.height, args.fps);
                if args.audio {
                    Arc::new(pattern.with_tone(TEST_TONE_HZ))
                } else {
                    Arc::new(pattern)
                }
            }
            SourceKind::Camera => {
                let camera = CameraSource::open(args.width, args.height, args.fps, args.audio)?;
                wait_for_first_frame(&camera).await;
                Arc::new(camera)
            }
        };
        println!("Using source: {}", source.id());

        let callbacks = CaptureCallbacks::new()
            .on_progress(|percent| {
                print!("\rRecording: {:5.1}%", percent);
                let _ = std::io::Write::flush(&mut std::io::stdout());
            })
            .on_error(|message| eprintln!("\nCapture error: {}", message))
            .on_filter_error(|message| eprintln!("\nFilter: {}", message));

        let mut session = RecordingSession::new(Arc::new(GstEncoderBackend::new()), config, registry)
            .with_callbacks(callbacks);

        let options = CaptureOptions {
            filter_id: args.filter.clone(),
            max_duration_seconds: args.duration,
            target_width: args.width,
            target_height: args.height,
            target_frame_rate: args.fps,
            ..Default::default()
        };

        println!();
        println!("Recording... (press Ctrl+C to stop early)");
        let tier = session.start(source, options).await?;
        println!("Capture tier: {}", tier);

        // Set up Ctrl+C handler
        let stop_flag = Arc::new(AtomicBool::new(false));
        let stop_flag_clone = stop_flag.clone();
        ctrlc::set_handler(move || {
            stop_flag_clone.store(true, Ordering::SeqCst);
        })?;

        // Wait for the max-duration timer or Ctrl+C
        while session.state() == RecorderState::Recording {
            if stop_flag.load(Ordering::SeqCst) {
                println!();
                println!("Stopping early...");
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        println!();

        let artifact = session.stop().await?;

        let output_path = resolve_output_path(args.output, &artifact.file_name());
        if let Some(parent) = output_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&output_path, &artifact.bytes)?;

        println!("Clip saved: {}", output_path.display());
        println!("  Tier:           {}", artifact.tier);
        println!("  Format:         {}", artifact.mime_type);
        println!("  Size:           {} bytes in {} chunks", artifact.len(), artifact.chunk_count);
        println!("  Duration:       {:.1}s", artifact.duration_ms as f64 / 1000.0);
        println!(
            "  Filter applied: {}",
            if artifact.filter_applied { "yes" } else { "no" }
        );

        Ok::<_, Box<dyn std::error::Error>>(())
    })
}

fn load_config(path: Option<&Path>) -> Result<CaptureConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(CaptureConfig::load(path)?),
        None => Ok(CaptureConfig::load_or_default()),
    }
}

/// Give the camera a moment to deliver its first frame
async fn wait_for_first_frame(camera: &CameraSource) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while camera.current_frame().is_none() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

/// Use the requested path, or the default folder with a timestamped name
///
/// A directory keeps the generated file name.
fn resolve_output_path(output: Option<PathBuf>, file_name: &str) -> PathBuf {
    match output {
        Some(path) if path.is_dir() => path.join(file_name),
        Some(path) => path,
        None => get_default_video_dir().join(file_name),
    }
}

/// Get default video directory
fn get_default_video_dir() -> PathBuf {
    dirs::video_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join(DEFAULT_SAVE_FOLDER)
}
