//! Image processing: pure Rust, built on the `image` crate.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Sniff format** | magic-byte table in [`format`] |
//! | **Identify** | `ImageDecoder::dimensions` |
//! | **Normalize** | auto-orient + JPEG re-encode |
//! | **Resize → any output** | Lanczos3 + per-format encoder |
//! | **Thumbnail** | `resize_to_fill` + `unsharpen` |
//!
//! The module is split into:
//! - **Format**: [`ImageKind`] enumeration and [`SourceImage`] sniffing
//! - **Calculations**: Pure functions for dimension math ([`fit`])
//! - **Parameters**: Data structures describing image operations
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]

pub mod backend;
mod calculations;
pub mod format;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, Dimensions, Encoded, ImageBackend, ImageMetadata};
pub use calculations::{align_to_orientation, fit};
pub use format::{ImageKind, SourceError, SourceImage, UnknownFormat};
pub use params::{NormalizeParams, Quality, ResizeParams, Sharpening, ThumbnailParams};
pub use rust_backend::RustBackend;
