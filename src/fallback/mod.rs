// SPDX-License-Identifier: GPL-3.0-only

//! Tiered degradation
//!
//! A capture first tries the compositor with the requested filter, then the
//! unmodified source, and finally settles for a synthesized placeholder clip.
//! The tier only ever moves forward within one capture.

pub mod controller;
pub mod placeholder;
pub mod strategy;
pub mod tier;

pub use controller::{CaptureOutcome, FallbackController};
pub use placeholder::{PlaceholderClip, PlaceholderKind};
pub use strategy::{
    CaptureContext, CaptureOutput, CaptureStrategy, CompositedStrategy, DirectStrategy,
    FeedLauncher, Prepared, RunningCapture,
};
pub use tier::Tier;
