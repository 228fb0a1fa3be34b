// SPDX-License-Identifier: GPL-3.0-only

//! Recording sessions as seen by the booth
//!
//! [`RecordingSession`] is the only entry point callers drive. Everything
//! below it reports through [`CaptureCallbacks`] rather than errors.

pub mod artifact;
pub mod callbacks;
pub mod options;
pub mod session;
pub mod state;

pub use artifact::CaptureArtifact;
pub use callbacks::CaptureCallbacks;
pub use options::CaptureOptions;
pub use session::RecordingSession;
pub use state::{RecorderSession, RecorderState};
