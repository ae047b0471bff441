//! Pure Rust image processing backend built on the `image` crate.
//!
//! Everything is statically linked into the binary.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, TIFF, WebP, GIF) | `image::ImageReader` with format sniffing |
//! | Auto-orient | `ImageDecoder::orientation` + `DynamicImage::apply_orientation` |
//! | Resize | `DynamicImage::resize_exact` with `Lanczos3` filter |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` (quality from config) |
//! | Encode → AVIF | `image::codecs::avif::AvifEncoder` (rav1e, speed 6) |
//! | Encode → PNG, TIFF, WebP (lossless), GIF | `DynamicImage::write_to` |
//! | Thumbnail crop | `DynamicImage::resize_to_fill` |
//! | Sharpening | `image::imageops::unsharpen` |
//!
//! Variants and the thumbnail start from one [`DynamicImage`] decoded from
//! the normalized original, shared read-only across the rayon workers.
//!
//! Metadata stripping falls out of re-encoding: none of the encoders above
//! are handed the source's EXIF or ICC blocks, so nothing is carried over.

use super::backend::{BackendError, Dimensions, Encoded, ImageBackend, ImageMetadata};
use super::format::ImageKind;
use super::params::{NormalizeParams, ResizeParams, ThumbnailParams};
use image::codecs::avif::AvifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder, ImageFormat, ImageReader};
use std::io::Cursor;

/// Kinds this backend can decode, paired with the `image` format that reads them.
const DECODABLE: &[(ImageKind, ImageFormat)] = &[
    (ImageKind::Jpeg, ImageFormat::Jpeg),
    (ImageKind::Png, ImageFormat::Png),
    (ImageKind::Webp, ImageFormat::WebP),
    (ImageKind::Tiff, ImageFormat::Tiff),
    (ImageKind::Gif, ImageFormat::Gif),
];

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn open_decoder(source: &[u8]) -> Result<impl ImageDecoder + '_, BackendError> {
    ImageReader::new(Cursor::new(source))
        .with_guessed_format()?
        .into_decoder()
        .map_err(|e| BackendError::Decode(e.to_string()))
}

/// Decode a buffer and apply its EXIF orientation, if it has one.
fn load_oriented(source: &[u8]) -> Result<DynamicImage, BackendError> {
    let mut decoder = open_decoder(source)?;
    let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
    let mut img =
        DynamicImage::from_decoder(decoder).map_err(|e| BackendError::Decode(e.to_string()))?;
    img.apply_orientation(orientation);
    Ok(img)
}

/// Drop to 8 bits per channel, keeping alpha only when the source has it.
fn to_8bit(img: &DynamicImage) -> DynamicImage {
    if img.color().has_alpha() {
        DynamicImage::ImageRgba8(img.to_rgba8())
    } else {
        DynamicImage::ImageRgb8(img.to_rgb8())
    }
}

/// Encode an image into `format`, entirely in memory.
fn encode(img: &DynamicImage, format: ImageKind, quality: u32) -> Result<Vec<u8>, BackendError> {
    let mut out = Cursor::new(Vec::new());
    let quality = quality.clamp(1, 100) as u8;
    let result = match format {
        ImageKind::Jpeg => {
            // JPEG has no alpha channel
            let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
            rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut out, quality))
        }
        ImageKind::Avif => {
            to_8bit(img).write_with_encoder(AvifEncoder::new_with_speed_quality(&mut out, 6, quality))
        }
        ImageKind::Png => to_8bit(img).write_to(&mut out, ImageFormat::Png),
        ImageKind::Tiff => to_8bit(img).write_to(&mut out, ImageFormat::Tiff),
        ImageKind::Webp => to_8bit(img).write_to(&mut out, ImageFormat::WebP),
        ImageKind::Gif => DynamicImage::ImageRgba8(img.to_rgba8()).write_to(&mut out, ImageFormat::Gif),
        other => return Err(BackendError::UnsupportedOutput(other)),
    };
    result.map_err(|e| BackendError::Encode {
        format,
        message: e.to_string(),
    })?;
    Ok(out.into_inner())
}

fn encoded(img: &DynamicImage, format: ImageKind, quality: u32) -> Result<Encoded, BackendError> {
    Ok(Encoded {
        bytes: encode(img, format, quality)?,
        dimensions: Dimensions::new(img.width(), img.height()),
    })
}

impl ImageBackend for RustBackend {
    type Decoded = DynamicImage;

    fn can_decode(&self, kind: ImageKind) -> bool {
        DECODABLE
            .iter()
            .any(|(k, fmt)| *k == kind && fmt.reading_enabled())
    }

    fn identify(&self, source: &[u8]) -> Result<Dimensions, BackendError> {
        let (width, height) = open_decoder(source)?.dimensions();
        Ok(Dimensions { width, height })
    }

    fn read_metadata(&self, source: &[u8]) -> Result<ImageMetadata, BackendError> {
        let mut decoder = open_decoder(source)?;
        let exif = decoder.exif_metadata().ok().flatten();
        let icc = decoder.icc_profile().ok().flatten();
        let orientation = exif
            .as_deref()
            .and_then(Orientation::from_exif_chunk)
            .map(Orientation::to_exif);
        Ok(ImageMetadata {
            orientation,
            exif_bytes: exif.map(|e| e.len()),
            icc_bytes: icc.map(|i| i.len()),
        })
    }

    fn normalize(&self, params: &NormalizeParams) -> Result<Encoded, BackendError> {
        let img = load_oriented(params.source)?;
        encoded(&img, ImageKind::Jpeg, params.quality.value())
    }

    fn decode(&self, source: &[u8]) -> Result<DynamicImage, BackendError> {
        load_oriented(source)
    }

    fn resize(
        &self,
        source: &DynamicImage,
        params: &ResizeParams,
    ) -> Result<Encoded, BackendError> {
        if params.width == 0 || params.height == 0 {
            return Err(BackendError::ProcessingFailed(format!(
                "cannot resize to {}x{}",
                params.width, params.height
            )));
        }
        let resized = source.resize_exact(params.width, params.height, FilterType::Lanczos3);
        encoded(&resized, params.format, params.quality.value())
    }

    fn thumbnail(
        &self,
        source: &DynamicImage,
        params: &ThumbnailParams,
    ) -> Result<Encoded, BackendError> {
        if params.size == 0 {
            return Err(BackendError::ProcessingFailed(
                "thumbnail size must be positive".into(),
            ));
        }
        // Fill-resize then center-crop to an exact square
        let filled = source.resize_to_fill(params.size, params.size, FilterType::Lanczos3);

        let final_img = if let Some(sharpening) = params.sharpening {
            DynamicImage::from(image::imageops::unsharpen(
                &filled,
                sharpening.sigma,
                sharpening.threshold,
            ))
        } else {
            filled
        };

        encoded(&final_img, params.format, params.quality.value())
    }
}
