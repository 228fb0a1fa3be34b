// SPDX-License-Identifier: GPL-3.0-only

//! Visual filter programs
//!
//! - [`FilterProgram`]: id, display name and pixel expression of one effect
//! - [`FilterRegistry`]: ordered table of programs, injected into the pipeline
//! - [`FilterChain`]: compiled pixel expression applied per frame

pub mod expression;
pub mod program;

pub use expression::FilterChain;
pub use program::{FilterProgram, FilterRegistry, IDENTITY_ID};
