// SPDX-License-Identifier: GPL-3.0-only

//! Frame and audio buffer types shared by sources, compositor and encoder

use std::sync::Arc;
use std::time::Instant;

/// A packed RGBA video frame
///
/// Pixel data is reference counted so a frame can be handed to the encoder
/// and kept as "latest frame" by a source without copying.
#[derive(Clone)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    /// Bytes per row (>= width * 4)
    pub stride: u32,
    pub data: Arc<[u8]>,
    pub captured_at: Instant,
}

impl VideoFrame {
    /// Frame from tightly packed RGBA bytes
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            stride: width * 4,
            data: Arc::from(data.into_boxed_slice()),
            captured_at: Instant::now(),
        }
    }

    /// RGBA value at (x, y)
    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let idx = (y as usize) * (self.stride as usize) + (x as usize) * 4;
        match self.data.get(idx..idx + 4) {
            Some(px) => [px[0], px[1], px[2], px[3]],
            None => [0, 0, 0, 0],
        }
    }

    /// Whether the buffer holds at least `height` rows of `stride` bytes
    pub fn is_complete(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.stride >= self.width * 4
            && self.data.len() >= (self.stride as usize) * (self.height as usize)
    }

    /// Tightly packed copy of the pixel rows, dropping any stride padding
    pub fn packed_rgba(&self) -> Vec<u8> {
        let row = (self.width * 4) as usize;
        if self.stride as usize == row {
            return self.data[..row * self.height as usize].to_vec();
        }
        let mut out = Vec::with_capacity(row * self.height as usize);
        for y in 0..self.height as usize {
            let start = y * self.stride as usize;
            out.extend_from_slice(&self.data[start..start + row]);
        }
        out
    }
}

impl std::fmt::Debug for VideoFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Interleaved signed 16-bit audio samples
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    pub samples: Arc<[i16]>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioBuffer {
    pub fn new(samples: Vec<i16>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples: Arc::from(samples.into_boxed_slice()),
            sample_rate,
            channels,
        }
    }

    /// Samples as little-endian bytes (S16LE on little-endian hosts)
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.samples)
    }
}
