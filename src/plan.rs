//! Variant plan: which boxes and formats to derive for every upload.
//!
//! A plan is the cross product of named boxes and output formats. Each pair is
//! one [`VariantSpec`] and becomes exactly one artifact named
//! `<box-label>.<format-extension>`.
//!
//! ## Textual configuration
//!
//! ```text
//! boxes:   1200:1090,818;992:910,683      (label:width,height separated by ';')
//! formats: jpeg,webp                      (comma separated, case-insensitive)
//! ```
//!
//! Empty or absent strings select the built-in defaults:
//!
//! | Label | Box |
//! |---|---|
//! | 1200 | 1090×818 |
//! | 992 | 910×683 |
//! | 768 | 670×503 |
//! | 576 | 515×386 |
//! | 408 | 400×300 |
//! | 320 | 310×225 |
//!
//! in JPEG and WebP, giving 12 variants.

use crate::config::ConfigError;
use crate::imaging::{Dimensions, ImageKind};
use std::collections::{BTreeMap, BTreeSet};

/// Built-in breakpoint boxes, `(label, width, height)`.
pub const DEFAULT_BOXES: &[(&str, u32, u32)] = &[
    ("1200", 1090, 818),
    ("992", 910, 683),
    ("768", 670, 503),
    ("576", 515, 386),
    ("408", 400, 300),
    ("320", 310, 225),
];

pub const DEFAULT_FORMATS: &[ImageKind] = &[ImageKind::Jpeg, ImageKind::Webp];

/// File stems the engine uses for its own artifacts.
pub const ORIGINAL_STEM: &str = "orig";
pub const THUMBNAIL_STEM: &str = "thumbnail";

/// One box × format pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct VariantSpec {
    pub label: String,
    pub format: ImageKind,
    pub bounds: Dimensions,
}

impl VariantSpec {
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.label, self.format.extension())
    }
}

/// Validated boxes and formats.
///
/// Labels are map keys and formats a set, so a plan cannot describe two
/// artifacts with the same file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantPlan {
    boxes: BTreeMap<String, Dimensions>,
    formats: BTreeSet<ImageKind>,
}

impl VariantPlan {
    /// Build a plan from already-parsed parts, enforcing the label rules.
    pub fn new(
        boxes: BTreeMap<String, Dimensions>,
        formats: BTreeSet<ImageKind>,
    ) -> Result<Self, ConfigError> {
        if boxes.is_empty() {
            return Err(ConfigError::Validation("no dimensions configured".into()));
        }
        if formats.is_empty() {
            return Err(ConfigError::Validation("no output formats configured".into()));
        }
        if formats.contains(&ImageKind::Unknown) {
            return Err(ConfigError::Validation(
                "unknown is not an output format".into(),
            ));
        }
        for (label, bounds) in &boxes {
            check_label(label).map_err(|reason| ConfigError::InvalidBox {
                entry: label.clone(),
                reason,
            })?;
            if bounds.is_empty() {
                return Err(ConfigError::InvalidBox {
                    entry: label.clone(),
                    reason: "width and height must be positive".into(),
                });
            }
        }
        Ok(Self { boxes, formats })
    }

    pub fn defaults() -> Self {
        Self {
            boxes: default_boxes(),
            formats: DEFAULT_FORMATS.iter().copied().collect(),
        }
    }

    /// Every box × format pair.
    pub fn specs(&self) -> Vec<VariantSpec> {
        self.boxes
            .iter()
            .flat_map(|(label, bounds)| {
                self.formats.iter().map(move |&format| VariantSpec {
                    label: label.clone(),
                    format,
                    bounds: *bounds,
                })
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.boxes.len() * self.formats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for VariantPlan {
    fn default() -> Self {
        Self::defaults()
    }
}

pub fn default_boxes() -> BTreeMap<String, Dimensions> {
    DEFAULT_BOXES
        .iter()
        .map(|&(label, w, h)| (label.to_string(), Dimensions::new(w, h)))
        .collect()
}

fn check_label(label: &str) -> Result<(), String> {
    if label.is_empty() {
        Err("label must not be empty".into())
    } else if label.contains('/') || label.contains('\\') {
        Err("label must not contain path separators".into())
    } else if label == ORIGINAL_STEM || label == THUMBNAIL_STEM {
        Err(format!("label {label:?} is reserved"))
    } else {
        Ok(())
    }
}

/// Parse `label:width,height;label:width,height...`.
///
/// Blank entries (e.g. from a trailing `;`) are skipped. A label may appear
/// only once.
pub fn parse_boxes(spec: &str) -> Result<BTreeMap<String, Dimensions>, ConfigError> {
    let mut boxes = BTreeMap::new();

    for entry in spec.split(';').map(str::trim).filter(|e| !e.is_empty()) {
        let invalid = |reason: &str| ConfigError::InvalidBox {
            entry: entry.to_string(),
            reason: reason.to_string(),
        };

        let parts: Vec<&str> = entry.split(':').collect();
        let [label, size] = parts.as_slice() else {
            return Err(invalid("expected label:width,height"));
        };
        let size: Vec<&str> = size.split(',').collect();
        let [width, height] = size.as_slice() else {
            return Err(invalid("expected label:width,height"));
        };
        let width = parse_edge(width).ok_or_else(|| invalid("invalid width value"))?;
        let height = parse_edge(height).ok_or_else(|| invalid("invalid height value"))?;

        let label = label.trim();
        check_label(label).map_err(|reason| invalid(&reason))?;
        if boxes
            .insert(label.to_string(), Dimensions::new(width, height))
            .is_some()
        {
            return Err(invalid("duplicate label"));
        }
    }

    if boxes.is_empty() {
        return Err(ConfigError::Validation(
            "dimensions string contains no entries".into(),
        ));
    }
    Ok(boxes)
}

fn parse_edge(value: &str) -> Option<u32> {
    value.trim().parse::<u32>().ok().filter(|&v| v > 0)
}

/// Parse a comma separated list of format tokens.
pub fn parse_formats(spec: &str) -> Result<BTreeSet<ImageKind>, ConfigError> {
    let mut formats = BTreeSet::new();
    for token in spec.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        formats.insert(token.parse::<ImageKind>()?);
    }
    if formats.is_empty() {
        return Err(ConfigError::Validation(
            "formats string contains no entries".into(),
        ));
    }
    Ok(formats)
}

/// Build a plan from optional textual configuration.
///
/// `None` or an empty string selects the defaults for that half of the plan.
pub fn build_plan(boxes: Option<&str>, formats: Option<&str>) -> Result<VariantPlan, ConfigError> {
    let boxes = match boxes.map(str::trim) {
        Some(spec) if !spec.is_empty() => parse_boxes(spec)?,
        _ => default_boxes(),
    };
    let formats = match formats.map(str::trim) {
        Some(spec) if !spec.is_empty() => parse_formats(spec)?,
        _ => DEFAULT_FORMATS.iter().copied().collect(),
    };
    VariantPlan::new(boxes, formats)
}
