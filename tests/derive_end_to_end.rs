//! End-to-end runs of both pipelines against real encoders and the
//! filesystem store.

use image::{ImageEncoder, RgbImage};
use photo_derive::config::DeriveConfig;
use photo_derive::engine::DeriveError;
use photo_derive::event::StorageEvent;
use photo_derive::imaging::{Dimensions, RustBackend, SourceError};
use photo_derive::pipeline::{self, PipelineError, Status};
use photo_derive::plan::VariantPlan;
use photo_derive::storage::{FsObjectStore, ObjectStore};
use std::collections::HashSet;
use tempfile::TempDir;

fn gradient_jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });
    let mut out = Vec::new();
    image::codecs::jpeg::JpegEncoder::new(&mut out)
        .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
        .unwrap();
    out
}

fn decoded_size(bytes: &[u8]) -> Dimensions {
    let img = image::load_from_memory(bytes).unwrap();
    Dimensions::new(img.width(), img.height())
}

fn config_with_destination() -> DeriveConfig {
    let mut config = DeriveConfig::default();
    config.storage.destination_bucket = "static".to_string();
    config
}

#[test]
fn default_plan_on_large_landscape() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("photo.jpg");
    std::fs::write(&input, gradient_jpeg(4000, 3000)).unwrap();
    let out = tmp.path().join("out");

    let report =
        pipeline::derive_local(&RustBackend::new(), &DeriveConfig::default(), &input, &out)
            .unwrap();

    assert_eq!(report.status, Status::Success);
    assert_eq!(report.artifacts.len(), 14);
    let names: HashSet<&str> = report.artifacts.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names.len(), 14);

    let orig = std::fs::read(out.join("orig.jpeg")).unwrap();
    assert_eq!(decoded_size(&orig), Dimensions::new(4000, 3000));

    let thumb = std::fs::read(out.join("thumbnail.jpeg")).unwrap();
    assert_eq!(decoded_size(&thumb), Dimensions::new(128, 128));

    for spec in VariantPlan::defaults().specs() {
        let bytes = std::fs::read(out.join(spec.file_name())).unwrap();
        let size = decoded_size(&bytes);
        assert!(
            size.width <= spec.bounds.width && size.height <= spec.bounds.height,
            "{} is {size}, box {}",
            spec.file_name(),
            spec.bounds
        );
    }
    assert_eq!(
        decoded_size(&std::fs::read(out.join("1200.jpeg")).unwrap()),
        Dimensions::new(1090, 817)
    );
}

#[test]
fn rerunning_is_deterministic() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("photo.jpg");
    std::fs::write(&input, gradient_jpeg(800, 600)).unwrap();
    let backend = RustBackend::new();
    let config = DeriveConfig::default();

    let first = pipeline::derive_local(&backend, &config, &input, &tmp.path().join("a")).unwrap();
    let second = pipeline::derive_local(&backend, &config, &input, &tmp.path().join("b")).unwrap();

    assert_eq!(
        std::fs::read(tmp.path().join("a/orig.jpeg")).unwrap(),
        std::fs::read(tmp.path().join("b/orig.jpeg")).unwrap()
    );
    let shape = |report: &pipeline::InvocationReport| {
        report
            .artifacts
            .iter()
            .map(|a| (a.name.clone(), a.format.clone(), a.dimensions))
            .collect::<Vec<_>>()
    };
    assert_eq!(shape(&first), shape(&second));
}

#[test]
fn text_file_produces_nothing() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("notes.jpg");
    std::fs::write(&input, "shopping list: flour, yeast, salt").unwrap();
    let out = tmp.path().join("out");

    let err = pipeline::derive_local(&RustBackend::new(), &DeriveConfig::default(), &input, &out)
        .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Derive(DeriveError::Source(SourceError::UnknownFormat))
    ));
    assert!(!out.exists());
}

#[test]
fn upload_then_delete_through_the_filesystem_store() {
    let tmp = TempDir::new().unwrap();
    let store = FsObjectStore::new(tmp.path());
    let mut config = config_with_destination();
    config.variants.dimensions = Some("small:200,150".to_string());

    let key = "media/images/tags/bread/orig.jpg";
    store.put("uploads", key, &gradient_jpeg(640, 480)).unwrap();
    store
        .put("static", "media/images/tags/bread-rolls/orig.jpeg", b"sibling")
        .unwrap();

    let event = StorageEvent::from_json(&format!(
        r#"{{"Records":[{{"s3":{{"bucket":{{"name":"uploads"}},"object":{{"key":"{key}"}}}}}}]}}"#
    ))
    .unwrap();

    let reports =
        pipeline::handle_upload(&store, &RustBackend::new(), &config, &event).unwrap();
    assert_eq!(reports[0].status, Status::Success);
    assert_eq!(
        store
            .list("static", "media/images/tags/bread/", None)
            .unwrap(),
        vec![
            "media/images/tags/bread/orig.jpeg",
            "media/images/tags/bread/small.jpeg",
            "media/images/tags/bread/small.webp",
            "media/images/tags/bread/thumbnail.jpeg",
        ]
    );
    assert!(tmp.path().join("static/media/images/tags/bread/small.webp").is_file());

    let cleanups = pipeline::handle_delete(&store, &config, &event).unwrap();
    assert_eq!(cleanups[0].deleted.len(), 4);
    assert!(
        store
            .list("static", "media/images/tags/bread/", None)
            .unwrap()
            .is_empty()
    );
    assert_eq!(
        store.list("static", "media/images/", None).unwrap(),
        vec!["media/images/tags/bread-rolls/orig.jpeg"]
    );
}
