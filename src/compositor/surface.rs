// SPDX-License-Identifier: GPL-3.0-only

//! Owned RGBA pixel surface the compositor draws into

use crate::errors::CompositorError;
use crate::filters::FilterChain;
use crate::media::VideoFrame;
use image::{Rgba, RgbaImage};

const CLEAR_COLOR: Rgba<u8> = Rgba([0, 0, 0, 255]);

#[derive(Debug, Clone)]
pub struct Surface {
    pixels: RgbaImage,
}

impl Surface {
    /// Allocate a surface, refusing empty or oversized dimensions
    pub fn new(width: u32, height: u32, max_pixels: u64) -> Result<Self, CompositorError> {
        if width == 0 || height == 0 {
            return Err(CompositorError::InvalidSize { width, height });
        }
        if width as u64 * height as u64 > max_pixels {
            return Err(CompositorError::SurfaceTooLarge {
                width,
                height,
                limit: max_pixels,
            });
        }
        Ok(Self {
            pixels: RgbaImage::from_pixel(width, height, CLEAR_COLOR),
        })
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn clear(&mut self) {
        for px in self.pixels.pixels_mut() {
            *px = CLEAR_COLOR;
        }
    }

    /// Draw `frame` scaled to cover the surface (center crop, nearest
    /// neighbor), then run `filter` over the result
    pub fn draw_frame(&mut self, frame: &VideoFrame, filter: Option<&FilterChain>) {
        if !frame.is_complete() {
            return;
        }

        let (dw, dh) = (self.width() as f64, self.height() as f64);
        let (sw, sh) = (frame.width as f64, frame.height as f64);
        let scale = (dw / sw).max(dh / sh);
        let off_x = (sw * scale - dw) / 2.0;
        let off_y = (sh * scale - dh) / 2.0;

        for (x, y, px) in self.pixels.enumerate_pixels_mut() {
            let sx = (((x as f64 + 0.5 + off_x) / scale) as u32).min(frame.width - 1);
            let sy = (((y as f64 + 0.5 + off_y) / scale) as u32).min(frame.height - 1);
            *px = Rgba(frame.pixel(sx, sy));
        }

        if let Some(chain) = filter {
            chain.apply_rgba(&mut self.pixels);
        }
    }

    /// Copy of the current surface contents as a frame
    pub fn snapshot(&self) -> VideoFrame {
        VideoFrame::from_rgba(self.width(), self.height(), self.pixels.as_raw().clone())
    }

    pub fn image(&self) -> &RgbaImage {
        &self.pixels
    }
}
