//! Pipeline configuration.
//!
//! One [`DeriveConfig`] is built at the process boundary and passed down by
//! reference; nothing below `main` reads the environment.
//!
//! ## Layers
//!
//! Later layers override earlier ones key by key:
//!
//! ```text
//! 1. stock defaults            (DeriveConfig::default)
//! 2. config file               (--config photo-derive.toml, optional)
//! 3. environment variables     (DIMENSIONS, FORMATS, THUMB_SIZE, ...)
//! 4. command-line flags        (--dims, --formats, --thumb-size, ...)
//! ```
//!
//! Every layer is a TOML table. They are merged with [`merge_toml`], then
//! deserialized and validated once, so a flag can replace a malformed
//! environment value before anything checks it.
//!
//! ## Configuration Options
//!
//! ```toml
//! [variants]
//! dimensions = "1200:1090,818;992:910,683"  # absent = built-in boxes
//! formats = "jpeg,webp"                     # absent = jpeg,webp
//! thumb_size = 128
//! quality = 75
//!
//! [storage]
//! root = "buckets"
//! destination_bucket = ""
//! max_keys = 1000
//!
//! [cleanup]
//! single_key = "orig.jpeg"                  # absent = delete the whole folder
//!
//! [processing]
//! max_processes = 4                         # absent = CPU cores
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::imaging::{Quality, UnknownFormat};
use crate::plan::{VariantPlan, build_plan};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid dimensions format {entry:?}: {reason}")]
    InvalidBox { entry: String, reason: String },
    #[error(transparent)]
    Format(#[from] UnknownFormat),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Complete configuration for both pipelines.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeriveConfig {
    /// Which variants to produce and how to encode them.
    pub variants: VariantsConfig,
    /// Where buckets live and where derived objects go.
    pub storage: StorageConfig,
    /// Deletion pipeline behaviour.
    pub cleanup: CleanupConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

/// Variant derivation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VariantsConfig {
    /// Box list, `label:width,height;...`. `None` uses the built-in boxes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<String>,
    /// Format list, `jpeg,webp,...`. `None` uses JPEG + WebP.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formats: Option<String>,
    /// Edge of the square thumbnail in pixels.
    pub thumb_size: u32,
    /// Lossy encoding quality (1–100).
    pub quality: u32,
}

impl Default for VariantsConfig {
    fn default() -> Self {
        Self {
            dimensions: None,
            formats: None,
            thumb_size: 128,
            quality: Quality::default().value(),
        }
    }
}

/// Object storage settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// Directory holding one sub-directory per bucket.
    pub root: PathBuf,
    /// Bucket receiving derived objects (and cleaned up on delete).
    pub destination_bucket: String,
    /// Upper bound on keys listed per cleanup.
    pub max_keys: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("buckets"),
            destination_bucket: String::new(),
            max_keys: 1000,
        }
    }
}

/// Deletion pipeline settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CleanupConfig {
    /// Delete only `<folder>/<single_key>` instead of the whole folder.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub single_key: Option<String>,
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel variant workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

impl DeriveConfig {
    /// Validate ranges and make sure the variant plan parses.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.variants.thumb_size == 0 {
            return Err(ConfigError::Validation(
                "variants.thumb_size must be positive".into(),
            ));
        }
        if !(1..=100).contains(&self.variants.quality) {
            return Err(ConfigError::Validation(
                "variants.quality must be 1-100".into(),
            ));
        }
        if self.storage.max_keys == 0 {
            return Err(ConfigError::Validation(
                "storage.max_keys must be positive".into(),
            ));
        }
        let bad_single_key = self
            .cleanup
            .single_key
            .as_deref()
            .is_some_and(|key| key.is_empty() || key.contains('/'));
        if bad_single_key {
            return Err(ConfigError::Validation(
                "cleanup.single_key must be a bare file name".into(),
            ));
        }
        self.plan()?;
        Ok(())
    }

    /// Build the variant plan described by `[variants]`.
    pub fn plan(&self) -> Result<VariantPlan, ConfigError> {
        build_plan(
            self.variants.dimensions.as_deref(),
            self.variants.formats.as_deref(),
        )
    }

    pub fn quality(&self) -> Quality {
        Quality::new(self.variants.quality)
    }

    /// The destination bucket, required by the event handlers.
    pub fn destination_bucket(&self) -> Result<&str, ConfigError> {
        match self.storage.destination_bucket.as_str() {
            "" => Err(ConfigError::Validation(
                "environment variable DESTINATION_BUCKET not set".into(),
            )),
            bucket => Ok(bucket),
        }
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    toml::Value::try_from(DeriveConfig::default())
        .map_err(|e| ConfigError::Validation(format!("default config must serialize: {e}")))
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Read a config file as a raw TOML value.
pub fn load_raw_config(path: &Path) -> Result<toml::Value, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Environment variables understood by the handlers, with the key they set.
const ENV_KEYS: &[(&str, &str, &str)] = &[
    ("DIMENSIONS", "variants", "dimensions"),
    ("FORMATS", "variants", "formats"),
    ("THUMB_SIZE", "variants", "thumb_size"),
    ("QUALITY", "variants", "quality"),
    ("DESTINATION_BUCKET", "storage", "destination_bucket"),
    ("MAX_KEYS", "storage", "max_keys"),
    ("STORAGE_ROOT", "storage", "root"),
];

const INTEGER_KEYS: &[&str] = &["thumb_size", "quality", "max_keys"];

/// Set `[section] key = value` in an overlay table.
fn set_key(
    root: &mut toml::map::Map<String, toml::Value>,
    section: &str,
    key: &str,
    value: toml::Value,
) {
    let table = root
        .entry(section.to_string())
        .or_insert(toml::Value::Table(toml::map::Map::new()));
    if let toml::Value::Table(table) = table {
        table.insert(key.to_string(), value);
    }
}

/// Build a TOML overlay from environment variables.
///
/// `lookup` is `std::env::var` in production and a map in tests. Empty values
/// are treated as unset. Integer settings that are not non-negative numbers
/// are skipped with a warning so the lower layer's value stays in effect.
pub fn env_overlay(lookup: impl Fn(&str) -> Option<String>) -> toml::Value {
    let mut root = toml::map::Map::new();

    for &(var, section, key) in ENV_KEYS {
        let Some(raw) = lookup(var).filter(|v| !v.is_empty()) else {
            continue;
        };
        let value = if INTEGER_KEYS.contains(&key) {
            // u32 covers every integer setting and rejects negatives
            match raw.trim().parse::<u32>() {
                Ok(n) => toml::Value::Integer(i64::from(n)),
                Err(_) => {
                    tracing::warn!(var, value = %raw, "ignoring invalid integer setting");
                    continue;
                }
            }
        } else {
            toml::Value::String(raw)
        };
        set_key(&mut root, section, key, value);
    }

    toml::Value::Table(root)
}

/// Settings given on the command line, the last layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlagOverrides {
    pub dimensions: Option<String>,
    pub formats: Option<String>,
    pub thumb_size: Option<u32>,
    pub storage_root: Option<PathBuf>,
}

impl FlagOverrides {
    /// The flags that were given, as a TOML overlay.
    pub fn overlay(&self) -> toml::Value {
        let mut root = toml::map::Map::new();
        if let Some(dims) = &self.dimensions {
            set_key(&mut root, "variants", "dimensions", toml::Value::String(dims.clone()));
        }
        if let Some(formats) = &self.formats {
            set_key(&mut root, "variants", "formats", toml::Value::String(formats.clone()));
        }
        if let Some(size) = self.thumb_size {
            set_key(&mut root, "variants", "thumb_size", toml::Value::Integer(i64::from(size)));
        }
        if let Some(path) = &self.storage_root {
            let root_dir = toml::Value::String(path.to_string_lossy().into_owned());
            set_key(&mut root, "storage", "root", root_dir);
        }
        toml::Value::Table(root)
    }
}

/// Merge the layers, deserialize and validate.
pub fn resolve_config(layers: Vec<toml::Value>) -> Result<DeriveConfig, ConfigError> {
    let merged = layers
        .into_iter()
        .fold(stock_defaults_value()?, merge_toml);
    let config: DeriveConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load configuration from an optional file, the process environment and
/// command-line flags.
pub fn load_config(
    file: Option<&Path>,
    flags: &FlagOverrides,
) -> Result<DeriveConfig, ConfigError> {
    let mut layers = Vec::new();
    if let Some(path) = file {
        layers.push(load_raw_config(path)?);
    }
    layers.push(env_overlay(|var| std::env::var(var).ok()));
    layers.push(flags.overlay());
    resolve_config(layers)
}

/// Returns a fully-commented stock config file with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# photo-derive configuration
# ==========================
# All settings are optional. Values shown below are the defaults.
# Environment variables override this file; command-line flags override both.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Variants
# ---------------------------------------------------------------------------
[variants]
# Named boxes as label:width,height separated by ';'   (env: DIMENSIONS)
# Each derived image fits inside its box, keeping its aspect ratio, and is
# never upscaled. The labels "orig" and "thumbnail" are reserved.
# dimensions = "1200:1090,818;992:910,683;768:670,503;576:515,386;408:400,300;320:310,225"

# Output formats, comma separated                      (env: FORMATS)
# Known: jpeg, png, webp, tiff, gif, avif (pdf, svg, magick, heif are
# recognised but have no encoder and fail per variant).
# formats = "jpeg,webp"

# Edge of the square thumbnail in pixels               (env: THUMB_SIZE)
thumb_size = 128

# Lossy encoding quality, 1-100                        (env: QUALITY)
quality = 75

# ---------------------------------------------------------------------------
# Storage
# ---------------------------------------------------------------------------
[storage]
# Directory holding one sub-directory per bucket       (env: STORAGE_ROOT)
root = "buckets"

# Bucket receiving derived objects                     (env: DESTINATION_BUCKET)
destination_bucket = ""

# Maximum keys listed per cleanup                      (env: MAX_KEYS)
max_keys = 1000

# ---------------------------------------------------------------------------
# Cleanup
# ---------------------------------------------------------------------------
[cleanup]
# Delete only this file in the folder instead of the whole folder.
# single_key = "orig.jpeg"

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel variant workers.
# Omit to auto-detect (= number of CPU cores).
# max_processes = 4
"##
}
