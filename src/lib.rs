// SPDX-License-Identifier: GPL-3.0-only

//! Booth Capture - in-booth media capture pipeline
//!
//! Records a live camera/microphone stream, composites the selected visual
//! filter onto every frame, encodes the result into a deliverable clip, and
//! degrades through fallback tiers when a stage is unsupported or fails.
//!
//! # Architecture
//!
//! - [`filters`]: Filter programs, the injected registry, and the pixel expression evaluator
//! - [`media`]: Live sources and frame types
//! - [`compositor`]: Fixed-size surface redraw loop with the filter applied
//! - [`encoder`]: Format negotiation, encoder sessions, and the GStreamer backend
//! - [`fallback`]: Capture tiers and the controller that walks them
//! - [`recording`]: The public [`RecordingSession`] state machine
//! - [`config`]: Pipeline tunables
//!
//! # Example
//!
//! ```no_run
//! use booth_capture::{
//!     CaptureConfig, CaptureOptions, FilterRegistry, GstEncoderBackend, RecordingSession,
//!     TestPatternSource,
//! };
//! use std::sync::Arc;
//!
//! # async fn run() -> booth_capture::CaptureResult<()> {
//! let mut session = RecordingSession::new(
//!     Arc::new(GstEncoderBackend::new()),
//!     CaptureConfig::load_or_default(),
//!     FilterRegistry::builtin(),
//! );
//! let source = Arc::new(TestPatternSource::new(1280, 720, 30));
//! let options = CaptureOptions {
//!     filter_id: "sepia".into(),
//!     ..Default::default()
//! };
//! session.start(source, options).await?;
//! let artifact = session.stop().await?;
//! println!("{} bytes, tier {}", artifact.len(), artifact.tier);
//! # Ok(())
//! # }
//! ```

pub mod compositor;
pub mod config;
pub mod constants;
pub mod encoder;
pub mod errors;
pub mod fallback;
pub mod filters;
pub mod media;
pub mod recording;

// Re-export commonly used types
pub use config::CaptureConfig;
pub use constants::BitratePreset;
pub use encoder::{EncoderBackend, GstEncoderBackend};
pub use errors::{CaptureError, CaptureResult};
pub use fallback::Tier;
pub use filters::{FilterProgram, FilterRegistry};
pub use media::{CameraSource, MediaSource, TestPatternSource};
pub use recording::{
    CaptureArtifact, CaptureCallbacks, CaptureOptions, RecorderState, RecordingSession,
};
