//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the operations the variant engine needs:
//! identify, read_metadata, normalize, decode, resize and thumbnail. All of
//! them work in memory; staging to disk or object storage is the caller's job.
//!
//! `decode` runs once per derivation. Its [`ImageBackend::Decoded`] value is
//! shared by reference across the parallel resize and thumbnail calls.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), built on the `image`
//! crate and statically linked into the binary.

use super::format::ImageKind;
use super::params::{NormalizeParams, ResizeParams, ThumbnailParams};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to decode source: {0}")]
    Decode(String),
    #[error("no {0} encoder available")]
    UnsupportedOutput(ImageKind),
    #[error("{format} encode failed: {message}")]
    Encode { format: ImageKind, message: String },
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

impl BackendError {
    /// True when the failure happened while producing the output container
    /// rather than while reading or resampling pixels.
    pub fn is_encode_failure(&self) -> bool {
        matches!(
            self,
            BackendError::UnsupportedOutput(_) | BackendError::Encode { .. }
        )
    }
}

/// Width and height in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl std::fmt::Display for Dimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}Wx{}H", self.width, self.height)
    }
}

/// An encoded image plus the pixel size it was encoded at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    pub bytes: Vec<u8>,
    pub dimensions: Dimensions,
}

/// Embedded metadata that normalization removes, reported by `inspect`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageMetadata {
    /// EXIF orientation tag value (1–8) when one is present.
    pub orientation: Option<u8>,
    /// Size of the raw EXIF block, if any.
    pub exif_bytes: Option<usize>,
    /// Size of the embedded ICC colour profile, if any.
    pub icc_bytes: Option<usize>,
}

/// Trait for image processing backends.
///
/// Implementations must be `Sync`: the engine derives variants in parallel
/// on the rayon pool, sharing one backend reference.
pub trait ImageBackend: Sync {
    /// Decoded, upright pixels of the normalized original.
    type Decoded: Sync;

    /// Whether buffers of this kind can be decoded at all.
    fn can_decode(&self, kind: ImageKind) -> bool;

    /// Intrinsic size as stored in the file, before any orientation fix-up.
    fn identify(&self, source: &[u8]) -> Result<Dimensions, BackendError>;

    /// Read embedded EXIF/ICC metadata.
    fn read_metadata(&self, source: &[u8]) -> Result<ImageMetadata, BackendError>;

    /// Auto-orient, strip metadata and re-encode as JPEG.
    fn normalize(&self, params: &NormalizeParams) -> Result<Encoded, BackendError>;

    /// Decode a buffer once for the resize and thumbnail calls that follow.
    fn decode(&self, source: &[u8]) -> Result<Self::Decoded, BackendError>;

    /// Resize to exactly the requested size and encode in the requested format.
    fn resize(
        &self,
        source: &Self::Decoded,
        params: &ResizeParams,
    ) -> Result<Encoded, BackendError>;

    /// Fill a square, centre-crop, optionally sharpen, and encode.
    fn thumbnail(
        &self,
        source: &Self::Decoded,
        params: &ThumbnailParams,
    ) -> Result<Encoded, BackendError>;
}
