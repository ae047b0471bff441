//! Image format enumeration and content sniffing.
//!
//! Formats are detected from magic bytes, never from file names or object
//! keys: an upload called `photo.jpg` that is really a text file must be
//! rejected before any decoding starts.
//!
//! | Kind | Signature |
//! |---|---|
//! | JPEG | `FF D8 FF` |
//! | PNG | `89 'PNG' 0D 0A 1A 0A` |
//! | GIF | `GIF87a` / `GIF89a` |
//! | WEBP | `RIFF....WEBP` |
//! | TIFF | `II*\0` / `MM\0*` |
//! | PDF | `%PDF` |
//! | SVG | `<svg` or an XML prolog followed by `<svg` |
//! | HEIF / AVIF | ISO-BMFF `ftyp` box, brand decides |
//! | MAGICK | BMP (`BM`) and Photoshop (`8BPS`) files |

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Every format the pipeline knows by name.
///
/// Only a subset can actually be decoded or encoded by a given
/// [`ImageBackend`](super::ImageBackend).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ImageKind {
    Jpeg,
    Png,
    Webp,
    Tiff,
    Gif,
    Pdf,
    Svg,
    Magick,
    Heif,
    Avif,
    Unknown,
}

impl ImageKind {
    /// Extension used when naming artifacts of this kind.
    pub fn extension(self) -> &'static str {
        match self {
            ImageKind::Jpeg => "jpeg",
            ImageKind::Png => "png",
            ImageKind::Webp => "webp",
            ImageKind::Tiff => "tiff",
            ImageKind::Gif => "gif",
            ImageKind::Pdf => "pdf",
            ImageKind::Svg => "svg",
            ImageKind::Magick => "magick",
            ImageKind::Heif => "heif",
            ImageKind::Avif => "avif",
            ImageKind::Unknown => "unknown",
        }
    }

    /// Sniff the format from the leading bytes of a buffer.
    pub fn detect(bytes: &[u8]) -> Self {
        if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            ImageKind::Jpeg
        } else if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
            ImageKind::Png
        } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
            ImageKind::Gif
        } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
            ImageKind::Webp
        } else if bytes.starts_with(b"II*\0") || bytes.starts_with(b"MM\0*") {
            ImageKind::Tiff
        } else if bytes.starts_with(b"%PDF") {
            ImageKind::Pdf
        } else if let Some(kind) = detect_iso_bmff(bytes) {
            kind
        } else if is_bitmap(bytes) || bytes.starts_with(b"8BPS") {
            ImageKind::Magick
        } else if looks_like_svg(bytes) {
            ImageKind::Svg
        } else {
            ImageKind::Unknown
        }
    }
}

impl fmt::Display for ImageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown image type: {0}")]
pub struct UnknownFormat(pub String);

impl FromStr for ImageKind {
    type Err = UnknownFormat;

    /// Parse a format token as written in configuration (`"jpg"`, `"WebP"`, ...).
    fn from_str(token: &str) -> Result<Self, Self::Err> {
        match token.trim().to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(ImageKind::Jpeg),
            "png" => Ok(ImageKind::Png),
            "webp" => Ok(ImageKind::Webp),
            "tiff" | "tif" => Ok(ImageKind::Tiff),
            "gif" => Ok(ImageKind::Gif),
            "pdf" => Ok(ImageKind::Pdf),
            "svg" => Ok(ImageKind::Svg),
            "magick" => Ok(ImageKind::Magick),
            "heif" => Ok(ImageKind::Heif),
            "avif" => Ok(ImageKind::Avif),
            _ => Err(UnknownFormat(token.trim().to_string())),
        }
    }
}

fn detect_iso_bmff(bytes: &[u8]) -> Option<ImageKind> {
    if bytes.len() < 12 || &bytes[4..8] != b"ftyp" {
        return None;
    }
    match &bytes[8..12] {
        b"avif" | b"avis" => Some(ImageKind::Avif),
        b"heic" | b"heix" | b"hevc" | b"hevx" | b"heim" | b"heis" | b"mif1" | b"msf1" => {
            Some(ImageKind::Heif)
        }
        _ => None,
    }
}

/// BMP: `BM`, then a file size, then four reserved bytes that are always zero.
fn is_bitmap(bytes: &[u8]) -> bool {
    bytes.len() >= 14 && bytes.starts_with(b"BM") && bytes[6..10] == [0, 0, 0, 0]
}

fn looks_like_svg(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(1024)];
    let Ok(text) = std::str::from_utf8(head) else {
        return false;
    };
    let text = text.trim_start_matches('\u{feff}').trim_start();
    text.starts_with("<svg") || (text.starts_with("<?xml") && text.contains("<svg"))
}

/// Why a source buffer cannot be processed at all.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("source object is empty")]
    Empty,
    #[error("invalid image type: content does not match any known image format")]
    UnknownFormat,
    #[error("unsupported image type: {0} cannot be decoded")]
    Unsupported(ImageKind),
}

/// Raw source bytes plus the format sniffed from them.
#[derive(Debug, Clone)]
pub struct SourceImage {
    bytes: Vec<u8>,
    kind: ImageKind,
}

impl SourceImage {
    /// Take ownership of downloaded bytes and sniff their format.
    ///
    /// Empty buffers and unrecognised content are rejected here; whether a
    /// recognised kind can be decoded is up to the backend.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, SourceError> {
        if bytes.is_empty() {
            return Err(SourceError::Empty);
        }
        match ImageKind::detect(&bytes) {
            ImageKind::Unknown => Err(SourceError::UnknownFormat),
            kind => Ok(Self { bytes, kind }),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn kind(&self) -> ImageKind {
        self.kind
    }
}
