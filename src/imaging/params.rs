//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how* to do it. They are the
//! interface between the [`engine`](crate::engine) (which decides which
//! artifacts to create) and the [`backend`](super::backend) (which does the
//! pixel work). Keeping them plain data lets tests swap in a recording mock
//! backend without touching engine logic.
//!
//! ## Types
//!
//! - [`Quality`]: Lossy encoding quality (1–100, default 75). Clamped on construction.
//! - [`Sharpening`]: Unsharp-mask parameters applied to thumbnails.
//! - [`NormalizeParams`]: Source buffer and quality for the auto-orient + re-encode step.
//! - [`ResizeParams`]: Exact output size and target format for one variant.
//!   Applied to already decoded pixels.
//! - [`ThumbnailParams`]: Square crop size, format and optional sharpening.

use super::format::ImageKind;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(75)
    }
}

/// Sharpening parameters for unsharp mask.
///
/// - `sigma`: Standard deviation of the Gaussian blur (higher = more sharpening)
/// - `threshold`: Minimum brightness difference to sharpen (0 = sharpen all pixels)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sharpening {
    pub sigma: f32,
    pub threshold: i32,
}

impl Sharpening {
    /// Light sharpening suitable for thumbnails.
    pub fn light() -> Self {
        Self {
            sigma: 0.5,
            threshold: 0,
        }
    }
}

/// Parameters for the normalize step: auto-orient, drop metadata, encode JPEG.
#[derive(Debug, Clone, Copy)]
pub struct NormalizeParams<'a> {
    pub source: &'a [u8],
    pub quality: Quality,
}

/// Parameters for an exact resize followed by a re-encode.
///
/// The pixels come from [`ImageBackend::decode`](super::ImageBackend::decode),
/// so one decode serves every variant.
#[derive(Debug, Clone, Copy)]
pub struct ResizeParams {
    pub width: u32,
    pub height: u32,
    pub format: ImageKind,
    pub quality: Quality,
}

/// Parameters for a thumbnail operation (fill + centre crop).
#[derive(Debug, Clone, Copy)]
pub struct ThumbnailParams {
    /// Edge length of the square crop.
    pub size: u32,
    pub format: ImageKind,
    pub quality: Quality,
    pub sharpening: Option<Sharpening>,
}
