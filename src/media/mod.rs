// SPDX-License-Identifier: GPL-3.0-only

//! Live media sources and the frame types flowing through the pipeline

pub mod camera;
pub mod frame;
pub mod source;
pub mod test_pattern;

pub use camera::CameraSource;
pub use frame::{AudioBuffer, VideoFrame};
pub use source::{AudioTrack, MediaSource};
pub use test_pattern::TestPatternSource;
