//! Image variant engine.
//!
//! Turns one source image into the full artifact set for an upload:
//!
//! ```text
//! orig.jpeg                  # auto-oriented, metadata stripped, re-encoded
//! <label>.<ext>              # one per box × format, fitted into the box
//! thumbnail.jpeg             # square centre crop, lightly sharpened
//! ```
//!
//! ## Failure policy
//!
//! | Step | On failure |
//! |---|---|
//! | Decodability check | [`DeriveError::Source`], nothing produced |
//! | Normalize / measure / decode | [`DeriveError::Processing`], nothing produced |
//! | One variant | [`VariantError`] collected, other variants kept |
//! | Thumbnail | [`ThumbnailError`] collected as a warning |
//!
//! A derivation with variant failures is *partial*: the surviving artifacts
//! are still returned and the caller decides how to report it.
//!
//! ## Parallel Processing
//!
//! The normalized original is decoded once; variants are then derived from
//! those shared pixels in parallel on the global
//! [rayon](https://docs.rs/rayon) pool. The engine never writes anywhere;
//! uploading or staging artifacts is the pipeline's job.

use crate::config::DeriveConfig;
use crate::imaging::{
    BackendError, Dimensions, ImageBackend, ImageKind, NormalizeParams, Quality, ResizeParams,
    Sharpening, SourceError, SourceImage, ThumbnailParams, align_to_orientation, fit,
};
use crate::plan::{ORIGINAL_STEM, THUMBNAIL_STEM, VariantPlan, VariantSpec};
use rayon::prelude::*;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Per-invocation settings that are not part of the plan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineSettings {
    pub thumb_size: u32,
    pub quality: Quality,
}

impl EngineSettings {
    pub fn from_config(config: &DeriveConfig) -> Self {
        Self {
            thumb_size: config.variants.thumb_size,
            quality: config.quality(),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&DeriveConfig::default())
    }
}

/// What an artifact is, for reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Original,
    Variant,
    Thumbnail,
}

/// One output file, held in memory until the pipeline stores it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedArtifact {
    /// Relative file name, e.g. `992.webp`.
    pub name: String,
    pub bytes: Vec<u8>,
    pub dimensions: Dimensions,
    pub format: ImageKind,
    pub kind: ArtifactKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStage {
    Normalize,
    Measure,
    Decode,
}

impl fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessingStage::Normalize => f.write_str("normalize"),
            ProcessingStage::Measure => f.write_str("measure"),
            ProcessingStage::Decode => f.write_str("decode"),
        }
    }
}

/// Step of a single variant that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VariantStep {
    Fit,
    Resize,
    Encode,
}

impl fmt::Display for VariantStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariantStep::Fit => f.write_str("fit"),
            VariantStep::Resize => f.write_str("resize"),
            VariantStep::Encode => f.write_str("encode"),
        }
    }
}

/// Terminal failures: no artifact is produced.
#[derive(Error, Debug)]
pub enum DeriveError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("{stage} failed: {source}")]
    Processing {
        stage: ProcessingStage,
        #[source]
        source: BackendError,
    },
}

#[derive(Error, Debug)]
#[error("variant {label}.{format} ({target}) failed during {step}: {source}")]
pub struct VariantError {
    pub label: String,
    pub format: ImageKind,
    pub target: Dimensions,
    pub step: VariantStep,
    #[source]
    pub source: BackendError,
}

#[derive(Error, Debug)]
#[error("thumbnail failed: {0}")]
pub struct ThumbnailError(#[source] pub BackendError);

/// Everything one source produced.
#[derive(Debug)]
pub struct Derivation {
    /// `orig.jpeg` first, then variants in plan order, then the thumbnail.
    pub artifacts: Vec<DerivedArtifact>,
    /// Measured size of the normalized original.
    pub source_dimensions: Dimensions,
    pub failures: Vec<VariantError>,
    pub warnings: Vec<ThumbnailError>,
}

impl Derivation {
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn artifact(&self, name: &str) -> Option<&DerivedArtifact> {
        self.artifacts.iter().find(|a| a.name == name)
    }
}

/// Derive every artifact for `source`.
pub fn derive_variants(
    backend: &impl ImageBackend,
    source: &SourceImage,
    plan: &VariantPlan,
    settings: &EngineSettings,
) -> Result<Derivation, DeriveError> {
    if !backend.can_decode(source.kind()) {
        return Err(SourceError::Unsupported(source.kind()).into());
    }
    tracing::info!(
        kind = %source.kind(),
        bytes = source.bytes().len(),
        variants = plan.len(),
        "deriving variants"
    );

    let normalized = backend
        .normalize(&NormalizeParams {
            source: source.bytes(),
            quality: settings.quality,
        })
        .map_err(|source| DeriveError::Processing {
            stage: ProcessingStage::Normalize,
            source,
        })?;

    let measured = backend
        .identify(source.bytes())
        .map_err(|source| DeriveError::Processing {
            stage: ProcessingStage::Measure,
            source,
        })?;
    if measured.is_empty() {
        return Err(DeriveError::Processing {
            stage: ProcessingStage::Measure,
            source: BackendError::ProcessingFailed(format!("source measures {measured}")),
        });
    }
    let source_dimensions = align_to_orientation(measured, normalized.dimensions);
    tracing::debug!(%measured, oriented = %source_dimensions, "measured original");

    let original = DerivedArtifact {
        name: format!("{ORIGINAL_STEM}.{}", ImageKind::Jpeg.extension()),
        bytes: normalized.bytes,
        dimensions: normalized.dimensions,
        format: ImageKind::Jpeg,
        kind: ArtifactKind::Original,
    };

    let pixels = backend
        .decode(&original.bytes)
        .map_err(|source| DeriveError::Processing {
            stage: ProcessingStage::Decode,
            source,
        })?;

    let results: Vec<Result<DerivedArtifact, VariantError>> = plan
        .specs()
        .par_iter()
        .map(|spec| derive_one(backend, &pixels, source_dimensions, spec, settings))
        .collect();

    let mut artifacts = vec![original];
    let mut failures = Vec::new();
    for result in results {
        match result {
            Ok(artifact) => artifacts.push(artifact),
            Err(e) => {
                tracing::warn!(error = %e, "variant failed");
                failures.push(e);
            }
        }
    }

    let mut warnings = Vec::new();
    match derive_thumbnail(backend, &pixels, settings) {
        Ok(thumbnail) => artifacts.push(thumbnail),
        Err(e) => {
            tracing::warn!(error = %e, "continuing without thumbnail");
            warnings.push(e);
        }
    }

    tracing::info!(
        artifacts = artifacts.len(),
        failed = failures.len(),
        "derivation finished"
    );
    Ok(Derivation {
        artifacts,
        source_dimensions,
        failures,
        warnings,
    })
}

fn derive_one<B: ImageBackend>(
    backend: &B,
    pixels: &B::Decoded,
    source: Dimensions,
    spec: &VariantSpec,
    settings: &EngineSettings,
) -> Result<DerivedArtifact, VariantError> {
    let target = fit(source, spec.bounds);
    let fail = |step: VariantStep, err: BackendError| VariantError {
        label: spec.label.clone(),
        format: spec.format,
        target,
        step,
        source: err,
    };

    // Extreme aspect ratios can truncate one edge to nothing
    if target.is_empty() {
        return Err(fail(
            VariantStep::Fit,
            BackendError::ProcessingFailed(format!("{source} fits {} as {target}", spec.bounds)),
        ));
    }

    let params = ResizeParams {
        width: target.width,
        height: target.height,
        format: spec.format,
        quality: settings.quality,
    };
    let encoded = backend
        .resize(pixels, &params)
        .map_err(|err| {
            let step = if err.is_encode_failure() {
                VariantStep::Encode
            } else {
                VariantStep::Resize
            };
            fail(step, err)
        })?;

    tracing::debug!(name = %spec.file_name(), dimensions = %encoded.dimensions, "variant done");
    Ok(DerivedArtifact {
        name: spec.file_name(),
        bytes: encoded.bytes,
        dimensions: encoded.dimensions,
        format: spec.format,
        kind: ArtifactKind::Variant,
    })
}

fn derive_thumbnail<B: ImageBackend>(
    backend: &B,
    pixels: &B::Decoded,
    settings: &EngineSettings,
) -> Result<DerivedArtifact, ThumbnailError> {
    let params = ThumbnailParams {
        size: settings.thumb_size,
        format: ImageKind::Jpeg,
        quality: settings.quality,
        sharpening: Some(Sharpening::light()),
    };
    let encoded = backend
        .thumbnail(pixels, &params)
        .map_err(ThumbnailError)?;
    Ok(DerivedArtifact {
        name: format!("{THUMBNAIL_STEM}.{}", ImageKind::Jpeg.extension()),
        bytes: encoded.bytes,
        dimensions: encoded.dimensions,
        format: ImageKind::Jpeg,
        kind: ArtifactKind::Thumbnail,
    })
}
