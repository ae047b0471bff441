//! # Photo Derive
//!
//! Derives a fixed set of web-ready image variants from every uploaded photo
//! and removes them again when the upload is deleted.
//!
//! # Architecture: Two Pipelines
//!
//! ```text
//! Derivation   event/CLI → fetch source → variant engine → put artifacts
//! Deletion     event/CLI → key-to-folder → list folder → delete listed keys
//! ```
//!
//! An upload at `<source bucket>/<folder>/<file>` produces, in
//! `<destination bucket>/<folder>/`:
//!
//! ```text
//! orig.jpeg            # auto-oriented, metadata stripped
//! 1200.jpeg 1200.webp  # one per box × format, fitted, never upscaled
//! ...
//! 320.jpeg  320.webp
//! thumbnail.jpeg       # square centre crop
//! ```
//!
//! Deleting the source removes that folder again.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`imaging`] | Format sniffing, the fit calculation, the [`imaging::ImageBackend`] trait and its `image`-crate implementation |
//! | [`plan`] | Box list and format list parsing into a [`plan::VariantPlan`] |
//! | [`engine`] | Normalize, measure, derive variants in parallel, thumbnail |
//! | [`storage`] | [`storage::ObjectStore`] trait with filesystem and in-memory stores |
//! | [`event`] | Storage notification parsing and source-key to folder mapping |
//! | [`pipeline`] | Upload and delete handlers, local derive, reports |
//! | [`config`] | Layered configuration: defaults, TOML file, environment |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Fail-Soft Variants
//!
//! A source that cannot be decoded, normalized or measured produces nothing.
//! Once the original is normalized, each variant stands alone: a failing
//! format is reported and the others are still stored. The invocation is then
//! *partial* rather than failed.
//!
//! ## Pure-Rust Imaging
//!
//! Decoding, resampling and encoding use the `image` crate (Lanczos3
//! resampling, `rav1e` for AVIF), so the binary has no system dependencies.
//!
//! ## One Config Struct
//!
//! Configuration is resolved once at the process boundary into a
//! [`config::DeriveConfig`] and passed down by reference. Library code never
//! reads environment variables.

pub mod config;
pub mod engine;
pub mod event;
pub mod imaging;
pub mod output;
pub mod pipeline;
pub mod plan;
pub mod storage;
