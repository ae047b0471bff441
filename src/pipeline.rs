//! Pipeline drivers: connect events, storage and the variant engine.
//!
//! ## Derivation
//!
//! ```text
//! uploads/media/images/tags/bread/orig.jpg          (event record)
//!   └── fetch → sniff → derive_variants
//!         └── put static/media/images/tags/bread/orig.jpeg
//!             put static/media/images/tags/bread/1200.jpeg
//!             ...
//!             put static/media/images/tags/bread/thumbnail.jpeg
//! ```
//!
//! ## Deletion
//!
//! Deleting `uploads/media/images/tags/bread/orig.jpg` lists
//! `static/media/images/tags/bread/` (bounded by `max_keys`) and deletes the
//! listed keys, or only `<folder>/<single_key>` when single-key mode is on.
//!
//! Every driver returns a serialisable report; nothing here prints.

use crate::config::{ConfigError, DeriveConfig};
use crate::engine::{
    ArtifactKind, DeriveError, Derivation, EngineSettings, ProcessingStage, VariantStep,
    derive_variants,
};
use crate::event::{EventError, StorageEvent, destination_folder};
use crate::imaging::{
    BackendError, Dimensions, ImageBackend, ImageKind, ImageMetadata, SourceImage,
};
use crate::plan::VariantPlan;
use crate::storage::{ObjectStore, StorageError};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Event(#[from] EventError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Derive(#[from] DeriveError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "lowercase")]
pub enum Status {
    Success,
    Partial(String),
    Error(String),
}

impl Status {
    pub fn is_success(&self) -> bool {
        matches!(self, Status::Success)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Success => f.write_str("Success"),
            Status::Partial(reason) => write!(f, "Partial: {reason}"),
            Status::Error(reason) => write!(f, "Error: {reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactRecord {
    pub name: String,
    pub kind: ArtifactKind,
    pub format: String,
    pub dimensions: Dimensions,
    pub bytes: usize,
    pub sha256: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureRecord {
    pub label: String,
    pub format: String,
    pub target: Dimensions,
    pub step: VariantStep,
    pub message: String,
}

/// What one derivation produced and where it went.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvocationReport {
    pub source: String,
    pub destination: String,
    pub source_dimensions: Dimensions,
    pub artifacts: Vec<ArtifactRecord>,
    pub failures: Vec<FailureRecord>,
    pub warnings: Vec<String>,
    pub status: Status,
}

impl InvocationReport {
    pub fn from_derivation(
        source: impl Into<String>,
        destination: impl Into<String>,
        derivation: &Derivation,
    ) -> Self {
        let artifacts = derivation
            .artifacts
            .iter()
            .map(|a| ArtifactRecord {
                name: a.name.clone(),
                kind: a.kind,
                format: a.format.to_string(),
                dimensions: a.dimensions,
                bytes: a.bytes.len(),
                sha256: sha256_hex(&a.bytes),
            })
            .collect();
        let failures: Vec<FailureRecord> = derivation
            .failures
            .iter()
            .map(|f| FailureRecord {
                label: f.label.clone(),
                format: f.format.to_string(),
                target: f.target,
                step: f.step,
                message: f.source.to_string(),
            })
            .collect();

        let status = if failures.is_empty() {
            Status::Success
        } else {
            let names: Vec<String> = failures
                .iter()
                .map(|f| format!("{}.{} ({})", f.label, f.format, f.step))
                .collect();
            Status::Partial(format!(
                "{} variant(s) failed: {}",
                failures.len(),
                names.join(", ")
            ))
        };

        Self {
            source: source.into(),
            destination: destination.into(),
            source_dimensions: derivation.source_dimensions,
            artifacts,
            failures,
            warnings: derivation.warnings.iter().map(|w| w.to_string()).collect(),
            status,
        }
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Keys removed from one destination folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub bucket: String,
    pub prefix: String,
    pub deleted: Vec<String>,
}

// =============================================================================
// Derivation pipeline
// =============================================================================

/// Derive one stored object into `dest_bucket/<folder>/`.
pub fn derive_object(
    store: &impl ObjectStore,
    backend: &impl ImageBackend,
    plan: &VariantPlan,
    settings: &EngineSettings,
    source_bucket: &str,
    key: &str,
    dest_bucket: &str,
) -> Result<InvocationReport, PipelineError> {
    let folder = destination_folder(key)?;
    tracing::info!(bucket = source_bucket, key, folder, "processing upload");

    let bytes = store.fetch(source_bucket, key)?;
    let source = SourceImage::from_bytes(bytes).map_err(DeriveError::from)?;
    let derivation = derive_variants(backend, &source, plan, settings)?;

    for artifact in &derivation.artifacts {
        let object_key = format!("{folder}/{}", artifact.name);
        store.put(dest_bucket, &object_key, &artifact.bytes)?;
        tracing::info!(bucket = dest_bucket, key = %object_key, "uploaded");
    }

    Ok(InvocationReport::from_derivation(
        format!("{source_bucket}/{key}"),
        format!("{dest_bucket}/{folder}"),
        &derivation,
    ))
}

/// Handle an upload notification: derive every record, in order.
///
/// The first failing record aborts the invocation.
pub fn handle_upload(
    store: &impl ObjectStore,
    backend: &impl ImageBackend,
    config: &DeriveConfig,
    event: &StorageEvent,
) -> Result<Vec<InvocationReport>, PipelineError> {
    let dest_bucket = config.destination_bucket()?;
    let plan = config.plan()?;
    let settings = EngineSettings::from_config(config);

    event
        .records
        .iter()
        .map(|record| {
            derive_object(
                store,
                backend,
                &plan,
                &settings,
                record.bucket(),
                record.key(),
                dest_bucket,
            )
        })
        .collect()
}

/// Derive a local file into a local directory.
pub fn derive_local(
    backend: &impl ImageBackend,
    config: &DeriveConfig,
    input: &Path,
    output: &Path,
) -> Result<InvocationReport, PipelineError> {
    let plan = config.plan()?;
    let settings = EngineSettings::from_config(config);

    let source = SourceImage::from_bytes(fs::read(input)?).map_err(DeriveError::from)?;
    let derivation = derive_variants(backend, &source, &plan, &settings)?;

    fs::create_dir_all(output)?;
    for artifact in &derivation.artifacts {
        fs::write(output.join(&artifact.name), &artifact.bytes)?;
    }
    tracing::info!(output = %output.display(), files = derivation.artifacts.len(), "wrote artifacts");

    Ok(InvocationReport::from_derivation(
        input.display().to_string(),
        output.display().to_string(),
        &derivation,
    ))
}

// =============================================================================
// Deletion pipeline
// =============================================================================

/// Remove derived objects below `folder` in `bucket`.
///
/// With `single_key`, only `<folder>/<single_key>` is deleted, and only when
/// it exists, so the report never lists an object that was not there.
/// Otherwise up to
/// `max_keys` keys under `<folder>/` are listed and deleted; the trailing `/`
/// keeps sibling folders sharing a name prefix out of the listing.
pub fn delete_derived(
    store: &impl ObjectStore,
    bucket: &str,
    folder: &str,
    single_key: Option<&str>,
    max_keys: usize,
) -> Result<CleanupReport, PipelineError> {
    let folder = folder.trim_end_matches('/');
    if folder.is_empty() {
        return Err(EventError::NoFolder(folder.to_string()).into());
    }
    let prefix = format!("{folder}/");

    let keys = match single_key {
        Some(name) => {
            let key = format!("{prefix}{name}");
            store
                .list(bucket, &key, None)?
                .into_iter()
                .filter(|listed| *listed == key)
                .collect()
        }
        None => store.list(bucket, &prefix, Some(max_keys))?,
    };

    if keys.is_empty() {
        tracing::info!(bucket, prefix = %prefix, "nothing to delete");
    } else {
        for key in &keys {
            tracing::debug!(bucket, key = %key, "deleting");
        }
        store.delete(bucket, &keys)?;
        tracing::info!(bucket, prefix = %prefix, deleted = keys.len(), "deleted derived objects");
    }

    Ok(CleanupReport {
        bucket: bucket.to_string(),
        prefix,
        deleted: keys,
    })
}

/// Handle a deletion notification: clean up the folder of every record.
pub fn handle_delete(
    store: &impl ObjectStore,
    config: &DeriveConfig,
    event: &StorageEvent,
) -> Result<Vec<CleanupReport>, PipelineError> {
    let dest_bucket = config.destination_bucket()?;

    event
        .records
        .iter()
        .map(|record| {
            let folder = destination_folder(record.key())?;
            tracing::info!(bucket = record.bucket(), key = record.key(), "source deleted");
            delete_derived(
                store,
                dest_bucket,
                folder,
                config.cleanup.single_key.as_deref(),
                config.storage.max_keys,
            )
        })
        .collect()
}

// =============================================================================
// Inspection
// =============================================================================

/// What `inspect` reports about a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inspection {
    pub kind: ImageKind,
    pub bytes: usize,
    /// `None` when the backend cannot decode this kind.
    pub dimensions: Option<Dimensions>,
    pub metadata: ImageMetadata,
}

pub fn inspect(backend: &impl ImageBackend, bytes: &[u8]) -> Result<Inspection, PipelineError> {
    let kind = ImageKind::detect(bytes);
    if !backend.can_decode(kind) {
        return Ok(Inspection {
            kind,
            bytes: bytes.len(),
            dimensions: None,
            metadata: ImageMetadata::default(),
        });
    }

    let processing = |source: BackendError| DeriveError::Processing {
        stage: ProcessingStage::Measure,
        source,
    };
    let dimensions = backend.identify(bytes).map_err(processing)?;
    let metadata = backend.read_metadata(bytes).map_err(processing)?;
    Ok(Inspection {
        kind,
        bytes: bytes.len(),
        dimensions: Some(dimensions),
        metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::RustBackend;
    use crate::imaging::SourceError;
    use crate::imaging::rust_backend::tests::synthetic_jpeg;
    use crate::storage::MemoryObjectStore;
    use tempfile::TempDir;

    const KEY: &str = "media/images/tags/bread/orig.jpg";

    fn config(dimensions: &str, formats: &str) -> DeriveConfig {
        let mut config = DeriveConfig::default();
        config.variants.dimensions = Some(dimensions.to_string());
        config.variants.formats = Some(formats.to_string());
        config.variants.thumb_size = 32;
        config.storage.destination_bucket = "static".to_string();
        config
    }

    fn seeded_store(bytes: &[u8]) -> MemoryObjectStore {
        let store = MemoryObjectStore::new();
        store.put("uploads", KEY, bytes).unwrap();
        store
    }

    fn dest_keys(store: &MemoryObjectStore) -> Vec<String> {
        store
            .keys()
            .into_iter()
            .filter(|(bucket, _)| bucket == "static")
            .map(|(_, key)| key)
            .collect()
    }

    #[test]
    fn upload_writes_artifacts_below_source_folder() {
        let store = seeded_store(&synthetic_jpeg(200, 150));
        let reports = handle_upload(
            &store,
            &RustBackend::new(),
            &config("a:64,48;b:32,24", "jpeg,png"),
            &StorageEvent::single("uploads", KEY),
        )
        .unwrap();

        assert_eq!(reports.len(), 1);
        let report = &reports[0];
        assert_eq!(report.status, Status::Success);
        assert_eq!(report.destination, "static/media/images/tags/bread");
        assert_eq!(report.source_dimensions, Dimensions::new(200, 150));
        assert_eq!(report.artifacts.len(), 6);

        assert_eq!(
            dest_keys(&store),
            vec![
                "media/images/tags/bread/a.jpeg",
                "media/images/tags/bread/a.png",
                "media/images/tags/bread/b.jpeg",
                "media/images/tags/bread/b.png",
                "media/images/tags/bread/orig.jpeg",
                "media/images/tags/bread/thumbnail.jpeg",
            ]
        );

        let stored = store
            .fetch("static", "media/images/tags/bread/orig.jpeg")
            .unwrap();
        let orig = report.artifacts.iter().find(|a| a.name == "orig.jpeg").unwrap();
        assert_eq!(orig.sha256, sha256_hex(&stored));
        assert_eq!(orig.bytes, stored.len());
    }

    #[test]
    fn upload_requires_destination_bucket() {
        let store = seeded_store(&synthetic_jpeg(20, 20));
        let mut config = config("a:10,10", "jpeg");
        config.storage.destination_bucket.clear();

        let err = handle_upload(
            &store,
            &RustBackend::new(),
            &config,
            &StorageEvent::single("uploads", KEY),
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn text_source_uploads_nothing() {
        let store = seeded_store(b"just some notes, not a picture");
        let err = handle_upload(
            &store,
            &RustBackend::new(),
            &config("a:10,10", "jpeg"),
            &StorageEvent::single("uploads", KEY),
        )
        .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Derive(DeriveError::Source(SourceError::UnknownFormat))
        ));
        assert!(dest_keys(&store).is_empty());
    }

    #[test]
    fn missing_source_is_a_storage_error() {
        let store = MemoryObjectStore::new();
        let err = handle_upload(
            &store,
            &RustBackend::new(),
            &config("a:10,10", "jpeg"),
            &StorageEvent::single("uploads", KEY),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Storage(StorageError::NotFound { .. })
        ));
    }

    #[test]
    fn key_without_folder_is_rejected() {
        let store = MemoryObjectStore::new();
        store.put("uploads", "orig.jpg", &synthetic_jpeg(20, 20)).unwrap();
        let err = handle_upload(
            &store,
            &RustBackend::new(),
            &config("a:10,10", "jpeg"),
            &StorageEvent::single("uploads", "orig.jpg"),
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::Event(EventError::NoFolder(_))));
    }

    #[test]
    fn failing_format_still_uploads_the_rest() {
        let store = seeded_store(&synthetic_jpeg(200, 150));
        let reports = handle_upload(
            &store,
            &RustBackend::new(),
            &config("a:64,48", "jpeg,pdf"),
            &StorageEvent::single("uploads", KEY),
        )
        .unwrap();

        let report = &reports[0];
        assert!(matches!(report.status, Status::Partial(ref reason) if reason.contains("a.pdf")));
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].step, VariantStep::Encode);
        assert_eq!(
            dest_keys(&store),
            vec![
                "media/images/tags/bread/a.jpeg",
                "media/images/tags/bread/orig.jpeg",
                "media/images/tags/bread/thumbnail.jpeg",
            ]
        );
    }

    #[test]
    fn delete_removes_only_the_matching_folder() {
        let store = MemoryObjectStore::new();
        for key in [
            "tags/bread/orig.jpeg",
            "tags/bread/1200.webp",
            "tags/bread-rolls/orig.jpeg",
        ] {
            store.put("static", key, b"x").unwrap();
        }
        let reports = handle_delete(
            &store,
            &config("a:10,10", "jpeg"),
            &StorageEvent::single("uploads", "tags/bread/orig.jpg"),
        )
        .unwrap();

        assert_eq!(reports[0].prefix, "tags/bread/");
        assert_eq!(reports[0].deleted.len(), 2);
        assert_eq!(dest_keys(&store), vec!["tags/bread-rolls/orig.jpeg"]);
    }

    #[test]
    fn single_key_mode_deletes_one_object() {
        let store = MemoryObjectStore::new();
        store.put("static", "tags/bread/orig.jpeg", b"x").unwrap();
        store.put("static", "tags/bread/1200.webp", b"x").unwrap();
        let mut config = config("a:10,10", "jpeg");
        config.cleanup.single_key = Some("orig.jpeg".to_string());

        handle_delete(
            &store,
            &config,
            &StorageEvent::single("uploads", "tags/bread/orig.jpg"),
        )
        .unwrap();
        assert_eq!(dest_keys(&store), vec!["tags/bread/1200.webp"]);
    }

    #[test]
    fn single_key_mode_reports_only_existing_objects() {
        let store = MemoryObjectStore::new();
        store.put("static", "tags/bread/1200.webp", b"x").unwrap();
        store.put("static", "tags/bread/orig.jpeg.bak", b"x").unwrap();

        let report =
            delete_derived(&store, "static", "tags/bread", Some("orig.jpeg"), 10).unwrap();
        assert!(report.deleted.is_empty());
        assert_eq!(store.len(), 2);

        store.put("static", "tags/bread/orig.jpeg", b"x").unwrap();
        let report =
            delete_derived(&store, "static", "tags/bread", Some("orig.jpeg"), 10).unwrap();
        assert_eq!(report.deleted, vec!["tags/bread/orig.jpeg"]);
        assert_eq!(
            dest_keys(&store),
            vec!["tags/bread/1200.webp", "tags/bread/orig.jpeg.bak"]
        );
    }

    #[test]
    fn cleanup_honours_max_keys() {
        let store = MemoryObjectStore::new();
        for i in 0..5 {
            store.put("static", &format!("tags/bread/{i}.jpeg"), b"x").unwrap();
        }
        let report = delete_derived(&store, "static", "tags/bread/", None, 3).unwrap();
        assert_eq!(report.deleted.len(), 3);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn empty_folder_deletes_nothing() {
        let store = MemoryObjectStore::new();
        let report = delete_derived(&store, "static", "tags/none", None, 10).unwrap();
        assert!(report.deleted.is_empty());
        assert!(delete_derived(&store, "static", "/", None, 10).is_err());
    }

    #[test]
    fn derive_local_writes_files() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("photo.jpg");
        fs::write(&input, synthetic_jpeg(120, 80)).unwrap();
        let output = tmp.path().join("out");

        let report =
            derive_local(&RustBackend::new(), &config("s:60,60", "jpeg"), &input, &output).unwrap();

        assert!(report.status.is_success());
        for name in ["orig.jpeg", "s.jpeg", "thumbnail.jpeg"] {
            assert!(output.join(name).is_file(), "{name} missing");
        }
        let small = report.artifacts.iter().find(|a| a.name == "s.jpeg").unwrap();
        assert_eq!(small.dimensions, Dimensions::new(60, 40));
    }

    #[test]
    fn report_serialises_status() {
        let json = serde_json::to_value(Status::Partial("1 variant(s) failed".into())).unwrap();
        assert_eq!(json["state"], "partial");
        assert_eq!(json["reason"], "1 variant(s) failed");
        assert_eq!(Status::Success.to_string(), "Success");
        assert_eq!(Status::Error("boom".into()).to_string(), "Error: boom");
    }

    #[test]
    fn inspect_reports_kind_and_size() {
        let backend = RustBackend::new();
        let info = inspect(&backend, &synthetic_jpeg(30, 20)).unwrap();
        assert_eq!(info.kind, ImageKind::Jpeg);
        assert_eq!(info.dimensions, Some(Dimensions::new(30, 20)));

        let pdf = inspect(&backend, b"%PDF-1.4").unwrap();
        assert_eq!(pdf.kind, ImageKind::Pdf);
        assert_eq!(pdf.dimensions, None);
    }
}
