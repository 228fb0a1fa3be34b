// SPDX-License-Identifier: GPL-3.0-only

//! Filter expression parsing and per-pixel evaluation
//!
//! Expressions are sequences of CSS filter functions applied left to right.
//! Only functions that map one pixel to one pixel are supported; functions
//! that need neighborhood sampling (`blur`, `drop-shadow`) are rejected at
//! parse time so the compositor's capability probe can report them.

use crate::errors::FilterError;

/// Luminance weights used by the CSS filter matrices (BT.709)
const LUMA_R: f32 = 0.2126;
const LUMA_G: f32 = 0.7152;
const LUMA_B: f32 = 0.0722;

type ColorMatrix = [[f32; 3]; 3];

/// One step of a compiled filter
#[derive(Debug, Clone, PartialEq)]
enum FilterOp {
    /// 3x3 RGB matrix (grayscale, sepia, saturate, hue-rotate)
    Matrix(ColorMatrix),
    /// `c + amount * (1 - 2c)`
    Invert(f32),
    /// `c * amount`
    Brightness(f32),
    /// `(c - 0.5) * amount + 0.5`
    Contrast(f32),
    /// `alpha * amount`
    Opacity(f32),
}

/// A parsed filter expression ready to run on RGBA pixels
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FilterChain {
    ops: Vec<FilterOp>,
}

impl FilterChain {
    /// Parse a CSS-style filter expression
    ///
    /// `""` and `"none"` parse to the identity chain.
    pub fn parse(expression: &str) -> Result<Self, FilterError> {
        let trimmed = expression.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
            return Ok(Self::default());
        }

        let mut ops = Vec::new();
        let mut rest = trimmed;

        while !rest.is_empty() {
            let open = rest
                .find('(')
                .ok_or_else(|| FilterError::Malformed(rest.to_string()))?;
            let close = rest[open..]
                .find(')')
                .map(|i| open + i)
                .ok_or_else(|| FilterError::Malformed(rest.to_string()))?;

            let name = rest[..open].trim().to_ascii_lowercase();
            let arg = rest[open + 1..close].trim();
            if name.is_empty() || name.contains(char::is_whitespace) {
                return Err(FilterError::Malformed(rest.to_string()));
            }

            ops.push(parse_function(&name, arg)?);
            rest = rest[close + 1..].trim_start();
        }

        Ok(Self { ops })
    }

    /// Whether the chain leaves pixels unchanged
    pub fn is_identity(&self) -> bool {
        self.ops.is_empty()
    }

    /// Apply the chain to a single pixel
    #[inline]
    pub fn apply_pixel(&self, px: [u8; 4]) -> [u8; 4] {
        if self.ops.is_empty() {
            return px;
        }

        let mut r = px[0] as f32 / 255.0;
        let mut g = px[1] as f32 / 255.0;
        let mut b = px[2] as f32 / 255.0;
        let mut a = px[3] as f32 / 255.0;

        for op in &self.ops {
            match op {
                FilterOp::Matrix(m) => {
                    let (r0, g0, b0) = (r, g, b);
                    r = m[0][0] * r0 + m[0][1] * g0 + m[0][2] * b0;
                    g = m[1][0] * r0 + m[1][1] * g0 + m[1][2] * b0;
                    b = m[2][0] * r0 + m[2][1] * g0 + m[2][2] * b0;
                }
                FilterOp::Invert(amount) => {
                    r += amount * (1.0 - 2.0 * r);
                    g += amount * (1.0 - 2.0 * g);
                    b += amount * (1.0 - 2.0 * b);
                }
                FilterOp::Brightness(amount) => {
                    r *= amount;
                    g *= amount;
                    b *= amount;
                }
                FilterOp::Contrast(amount) => {
                    r = (r - 0.5) * amount + 0.5;
                    g = (g - 0.5) * amount + 0.5;
                    b = (b - 0.5) * amount + 0.5;
                }
                FilterOp::Opacity(amount) => {
                    a *= amount;
                }
            }

            // Each filter function's output is clamped before the next
            r = r.clamp(0.0, 1.0);
            g = g.clamp(0.0, 1.0);
            b = b.clamp(0.0, 1.0);
        }

        [to_byte(r), to_byte(g), to_byte(b), to_byte(a)]
    }

    /// Apply the chain in place to a packed RGBA buffer
    pub fn apply_rgba(&self, data: &mut [u8]) {
        if self.ops.is_empty() {
            return;
        }
        for px in data.chunks_exact_mut(4) {
            let out = self.apply_pixel([px[0], px[1], px[2], px[3]]);
            px.copy_from_slice(&out);
        }
    }

    /// Check that the chain produces a valid pixel on a 1x1 test region
    pub fn probe(&self) -> Result<(), FilterError> {
        if !self.ops.iter().all(op_is_finite) {
            return Err(FilterError::ProbeFailed);
        }
        let mut region = [200u8, 120, 40, 255];
        self.apply_rgba(&mut region);
        Ok(())
    }
}

#[inline]
fn to_byte(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn op_is_finite(op: &FilterOp) -> bool {
    match op {
        FilterOp::Matrix(m) => m.iter().flatten().all(|v| v.is_finite()),
        FilterOp::Invert(a) | FilterOp::Brightness(a) | FilterOp::Contrast(a) | FilterOp::Opacity(a) => {
            a.is_finite()
        }
    }
}

fn parse_function(name: &str, arg: &str) -> Result<FilterOp, FilterError> {
    let invalid = || FilterError::InvalidArgument {
        function: name.to_string(),
        arg: arg.to_string(),
    };

    match name {
        "hue-rotate" => {
            let degrees = if arg.is_empty() {
                0.0
            } else {
                parse_angle(arg).ok_or_else(invalid)?
            };
            Ok(FilterOp::Matrix(hue_rotate_matrix(degrees)))
        }
        "grayscale" | "sepia" | "saturate" | "invert" | "brightness" | "contrast" | "opacity" => {
            let amount = if arg.is_empty() {
                1.0
            } else {
                parse_amount(arg).ok_or_else(invalid)?
            };
            if amount < 0.0 {
                return Err(invalid());
            }
            Ok(match name {
                "grayscale" => FilterOp::Matrix(grayscale_matrix(amount.min(1.0))),
                "sepia" => FilterOp::Matrix(sepia_matrix(amount.min(1.0))),
                "saturate" => FilterOp::Matrix(saturate_matrix(amount)),
                "invert" => FilterOp::Invert(amount.min(1.0)),
                "brightness" => FilterOp::Brightness(amount),
                "contrast" => FilterOp::Contrast(amount),
                _ => FilterOp::Opacity(amount.min(1.0)),
            })
        }
        other => Err(FilterError::UnsupportedFunction(other.to_string())),
    }
}

/// `"50%"` -> 0.5, `"1.2"` -> 1.2
fn parse_amount(arg: &str) -> Option<f32> {
    let value = match arg.strip_suffix('%') {
        Some(pct) => pct.trim().parse::<f32>().ok()? / 100.0,
        None => arg.parse::<f32>().ok()?,
    };
    value.is_finite().then_some(value)
}

/// Angle in degrees from `deg`, `grad`, `rad` or `turn` units
fn parse_angle(arg: &str) -> Option<f32> {
    let (number, scale) = if let Some(v) = arg.strip_suffix("deg") {
        (v, 1.0)
    } else if let Some(v) = arg.strip_suffix("grad") {
        (v, 0.9)
    } else if let Some(v) = arg.strip_suffix("rad") {
        (v, 180.0 / std::f32::consts::PI)
    } else if let Some(v) = arg.strip_suffix("turn") {
        (v, 360.0)
    } else if arg == "0" {
        (arg, 0.0)
    } else {
        return None;
    };
    let value = number.trim().parse::<f32>().ok()? * scale;
    value.is_finite().then_some(value)
}

fn grayscale_matrix(amount: f32) -> ColorMatrix {
    let s = 1.0 - amount;
    [
        [LUMA_R + 0.7874 * s, LUMA_G - LUMA_G * s, LUMA_B - LUMA_B * s],
        [LUMA_R - LUMA_R * s, LUMA_G + 0.2848 * s, LUMA_B - LUMA_B * s],
        [LUMA_R - LUMA_R * s, LUMA_G - LUMA_G * s, LUMA_B + 0.9278 * s],
    ]
}

fn sepia_matrix(amount: f32) -> ColorMatrix {
    let s = 1.0 - amount;
    [
        [0.393 + 0.607 * s, 0.769 - 0.769 * s, 0.189 - 0.189 * s],
        [0.349 - 0.349 * s, 0.686 + 0.314 * s, 0.168 - 0.168 * s],
        [0.272 - 0.272 * s, 0.534 - 0.534 * s, 0.131 + 0.869 * s],
    ]
}

fn saturate_matrix(s: f32) -> ColorMatrix {
    [
        [0.213 + 0.787 * s, 0.715 - 0.715 * s, 0.072 - 0.072 * s],
        [0.213 - 0.213 * s, 0.715 + 0.285 * s, 0.072 - 0.072 * s],
        [0.213 - 0.213 * s, 0.715 - 0.715 * s, 0.072 + 0.928 * s],
    ]
}

fn hue_rotate_matrix(degrees: f32) -> ColorMatrix {
    let (sin, cos) = degrees.to_radians().sin_cos();
    [
        [
            0.213 + cos * 0.787 - sin * 0.213,
            0.715 - cos * 0.715 - sin * 0.715,
            0.072 - cos * 0.072 + sin * 0.928,
        ],
        [
            0.213 - cos * 0.213 + sin * 0.143,
            0.715 + cos * 0.285 + sin * 0.140,
            0.072 - cos * 0.072 - sin * 0.283,
        ],
        [
            0.213 - cos * 0.213 - sin * 0.787,
            0.715 - cos * 0.715 + sin * 0.715,
            0.072 + cos * 0.928 + sin * 0.072,
        ],
    ]
}
