//! CLI output formatting for both pipelines.
//!
//! # Output Format
//!
//! ## Derive
//!
//! ```text
//! uploads/media/images/tags/bread/orig.jpg (4000Wx3000H)
//!     Destination: static/media/images/tags/bread
//!     001 orig.jpeg       4000Wx3000H  812345 bytes
//!     002 1200.jpeg       1090Wx817H   145210 bytes
//!     ...
//!     Failed: 1200.pdf at 1090Wx817H during encode: no pdf encoder available
//!     Warning: thumbnail failed: ...
//! Partial: 1 variant(s) failed: 1200.pdf (encode)
//! ```
//!
//! ## Cleanup
//!
//! ```text
//! static/media/images/tags/bread/
//!     DELETING: media/images/tags/bread/orig.jpeg
//!     DELETING: media/images/tags/bread/1200.webp
//! Deleted 2 objects
//! ```
//!
//! # Architecture
//!
//! Each report has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format functions
//! are pure: no I/O, no side effects.

use crate::pipeline::{CleanupReport, InvocationReport, Inspection};

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

// ============================================================================
// Derivation
// ============================================================================

/// Format one derivation report, artifacts in production order.
pub fn format_derivation(report: &InvocationReport) -> Vec<String> {
    let mut lines = vec![format!("{} ({})", report.source, report.source_dimensions)];
    lines.push(format!("{}Destination: {}", indent(1), report.destination));

    let name_width = report
        .artifacts
        .iter()
        .map(|a| a.name.len())
        .max()
        .unwrap_or(0);
    for (i, artifact) in report.artifacts.iter().enumerate() {
        lines.push(format!(
            "{}{} {:<name_width$}  {:<12} {} bytes",
            indent(1),
            format_index(i + 1),
            artifact.name,
            artifact.dimensions.to_string(),
            artifact.bytes,
        ));
    }
    for failure in &report.failures {
        lines.push(format!(
            "{}Failed: {}.{} at {} during {}: {}",
            indent(1),
            failure.label,
            failure.format,
            failure.target,
            failure.step,
            failure.message
        ));
    }
    for warning in &report.warnings {
        lines.push(format!("{}Warning: {}", indent(1), warning));
    }
    lines.push(report.status.to_string());
    lines
}

pub fn print_derivation(report: &InvocationReport) {
    for line in format_derivation(report) {
        println!("{}", line);
    }
}

// ============================================================================
// Cleanup
// ============================================================================

pub fn format_cleanup(report: &CleanupReport) -> Vec<String> {
    let mut lines = vec![format!("{}/{}", report.bucket, report.prefix)];
    if report.deleted.is_empty() {
        lines.push(format!("{}nothing to delete", indent(1)));
    }
    for key in &report.deleted {
        lines.push(format!("{}DELETING: {}", indent(1), key));
    }
    lines.push(format!("Deleted {} objects", report.deleted.len()));
    lines
}

pub fn print_cleanup(report: &CleanupReport) {
    for line in format_cleanup(report) {
        println!("{}", line);
    }
}

// ============================================================================
// Inspect
// ============================================================================

pub fn format_inspection(path: &str, info: &Inspection) -> Vec<String> {
    let mut lines = vec![path.to_string()];
    lines.push(format!("{}Type: {}", indent(1), info.kind));
    lines.push(format!("{}Size: {} bytes", indent(1), info.bytes));
    match info.dimensions {
        Some(dims) => lines.push(format!("{}Dimensions: {}", indent(1), dims)),
        None => lines.push(format!("{}Dimensions: (cannot decode {})", indent(1), info.kind)),
    }
    if let Some(orientation) = info.metadata.orientation {
        lines.push(format!("{}Orientation: {}", indent(1), orientation));
    }
    if let Some(len) = info.metadata.exif_bytes {
        lines.push(format!("{}EXIF: {} bytes", indent(1), len));
    }
    if let Some(len) = info.metadata.icc_bytes {
        lines.push(format!("{}ICC profile: {} bytes", indent(1), len));
    }
    lines
}

pub fn print_inspection(path: &str, info: &Inspection) {
    for line in format_inspection(path, info) {
        println!("{}", line);
    }
}
