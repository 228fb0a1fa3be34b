// SPDX-License-Identifier: GPL-3.0-only

//! Encoding of the captured stream into ordered chunks

pub mod backend;
pub mod chunk;
pub mod format;
pub mod gst;
pub mod session;

pub use backend::{AudioTrackSettings, EncoderBackend, EncoderEvent, EncoderSettings, PlatformEncoder};
pub use chunk::{ChunkArena, EncodedChunk};
pub use format::{extension_for_mime, negotiate_format};
pub use gst::GstEncoderBackend;
pub use session::{ChunkCallback, EncoderSession, FlushHandle, SessionTiming};
