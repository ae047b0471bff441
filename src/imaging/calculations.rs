//! Pure calculation functions for image dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

use super::backend::Dimensions;

/// Largest size that fits inside `bounds` while keeping the aspect ratio of
/// `source`. Never upscales.
///
/// Landscape (and square) sources are scaled to the box width first, portrait
/// sources to the box height; if the first pass still overflows the other
/// axis, the already-scaled size is scaled again to that axis. Every division
/// truncates toward zero, so a result can come out one pixel short of the
/// mathematically exact value.
///
/// # Examples
/// ```
/// # use photo_derive::imaging::{Dimensions, fit};
/// let fitted = fit(Dimensions::new(4000, 3000), Dimensions::new(1090, 818));
/// assert_eq!(fitted, Dimensions::new(1090, 817));
/// ```
pub fn fit(source: Dimensions, bounds: Dimensions) -> Dimensions {
    if source.width <= bounds.width && source.height <= bounds.height {
        return source;
    }

    if source.width >= source.height {
        let resized = scale_to_width(source, bounds.width);
        if resized.height > bounds.height {
            // Width is right but still too tall
            scale_to_height(resized, bounds.height)
        } else {
            resized
        }
    } else {
        let resized = scale_to_height(source, bounds.height);
        if resized.width > bounds.width {
            // Height is right but still too wide
            scale_to_width(resized, bounds.width)
        } else {
            resized
        }
    }
}

fn scale_to_width(dims: Dimensions, width: u32) -> Dimensions {
    let height = u64::from(dims.height) * u64::from(width) / u64::from(dims.width);
    Dimensions {
        width,
        height: height as u32,
    }
}

fn scale_to_height(dims: Dimensions, height: u32) -> Dimensions {
    let width = u64::from(dims.width) * u64::from(height) / u64::from(dims.height);
    Dimensions {
        width: width as u32,
        height,
    }
}

/// Reconcile a header measurement with the size of the auto-oriented pixels.
///
/// Orientation tags 5–8 rotate by a quarter turn, so the stored width and
/// height describe the sensor layout, not what the viewer sees. When the
/// oriented image is exactly the transpose of the measurement, the transpose
/// is what later fitting must use.
pub fn align_to_orientation(measured: Dimensions, oriented: Dimensions) -> Dimensions {
    if measured != oriented
        && measured.width == oriented.height
        && measured.height == oriented.width
    {
        oriented
    } else {
        measured
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(width: u32, height: u32) -> Dimensions {
        Dimensions::new(width, height)
    }

    // =========================================================================
    // fit: fixed cases
    // =========================================================================

    #[test]
    fn small_source_is_returned_unchanged() {
        assert_eq!(fit(d(300, 200), d(1090, 818)), d(300, 200));
        assert_eq!(fit(d(1090, 818), d(1090, 818)), d(1090, 818));
    }

    #[test]
    fn landscape_limited_by_width() {
        // 2000x1000 → width 1090, height 545 fits under 818
        assert_eq!(fit(d(2000, 1000), d(1090, 818)), d(1090, 545));
    }

    #[test]
    fn landscape_rescaled_when_still_too_tall() {
        // 4000x3000 → 1090x817 after the width pass (3000*1090/4000 = 817.5)
        assert_eq!(fit(d(4000, 3000), d(1090, 818)), d(1090, 817));
        // 1200x1100 → 1090x999 → too tall → 1090*818/999 = 892 (truncated)
        assert_eq!(fit(d(1200, 1100), d(1090, 818)), d(892, 818));
    }

    #[test]
    fn portrait_limited_by_height() {
        // 3000x4000 → height 818, width 3000*818/4000 = 613
        assert_eq!(fit(d(3000, 4000), d(1090, 818)), d(613, 818));
    }

    #[test]
    fn portrait_rescaled_when_still_too_wide() {
        // 900x1000 into 400x900 → 810x900 → too wide → 400x(900*400/810 = 444)
        assert_eq!(fit(d(900, 1000), d(400, 900)), d(400, 444));
    }

    #[test]
    fn square_source_takes_the_shorter_box_edge() {
        assert_eq!(fit(d(1000, 1000), d(1090, 818)), d(818, 818));
        assert_eq!(fit(d(1000, 1000), d(310, 225)), d(225, 225));
        assert_eq!(fit(d(1000, 1000), d(225, 310)), d(225, 225));
    }

    #[test]
    fn only_one_axis_too_large() {
        // Wide panorama, height already small
        assert_eq!(fit(d(5000, 200), d(1090, 818)), d(1090, 43));
        // Tall strip, width already small
        assert_eq!(fit(d(100, 2000), d(1090, 818)), d(40, 818));
    }

    #[test]
    fn large_values_do_not_overflow() {
        let fitted = fit(d(u32::MAX, u32::MAX / 2), d(1000, 1000));
        assert_eq!(fitted.width, 1000);
        assert!(fitted.height <= 1000);
    }

    // =========================================================================
    // fit: properties over a grid of sources and boxes
    // =========================================================================

    fn sample_sizes() -> Vec<Dimensions> {
        let edges = [1, 7, 120, 225, 310, 640, 818, 1090, 1999, 3000, 4000, 6001];
        edges
            .iter()
            .flat_map(|&w| edges.iter().map(move |&h| d(w, h)))
            .collect()
    }

    fn default_boxes() -> Vec<Dimensions> {
        vec![
            d(1090, 818),
            d(910, 683),
            d(670, 503),
            d(515, 386),
            d(400, 300),
            d(310, 225),
            d(225, 310),
        ]
    }

    #[test]
    fn never_exceeds_the_box_and_never_upscales() {
        for source in sample_sizes() {
            for bounds in default_boxes() {
                let fitted = fit(source, bounds);
                assert!(
                    fitted.width <= bounds.width && fitted.height <= bounds.height,
                    "{source:?} in {bounds:?} gave {fitted:?}"
                );
                assert!(
                    fitted.width <= source.width && fitted.height <= source.height,
                    "{source:?} in {bounds:?} upscaled to {fitted:?}"
                );
            }
        }
    }

    #[test]
    fn preserves_aspect_ratio_within_truncation() {
        for source in sample_sizes() {
            for bounds in default_boxes() {
                let fitted = fit(source, bounds);
                if fitted.width == 0 || fitted.height == 0 {
                    continue;
                }
                // Expected height for the fitted width, in exact arithmetic
                let exact_h = fitted.width as f64 * source.height as f64 / source.width as f64;
                let exact_w = fitted.height as f64 * source.width as f64 / source.height as f64;
                let off_h = (exact_h - fitted.height as f64).abs();
                let off_w = (exact_w - fitted.width as f64).abs();
                // Two truncating passes can each lose up to one pixel
                // on the free axis, scaled by the aspect ratio.
                let ratio = (source.width as f64 / source.height as f64)
                    .max(source.height as f64 / source.width as f64);
                assert!(
                    off_h.min(off_w) <= 2.0 * ratio.max(1.0),
                    "{source:?} in {bounds:?} gave {fitted:?}"
                );
            }
        }
    }

    #[test]
    fn is_idempotent() {
        for source in sample_sizes() {
            for bounds in default_boxes() {
                let once = fit(source, bounds);
                assert_eq!(fit(once, bounds), once, "{source:?} in {bounds:?}");
            }
        }
    }

    // =========================================================================
    // align_to_orientation
    // =========================================================================

    #[test]
    fn align_keeps_matching_measurement() {
        assert_eq!(align_to_orientation(d(400, 300), d(400, 300)), d(400, 300));
    }

    #[test]
    fn align_transposes_quarter_turn() {
        assert_eq!(align_to_orientation(d(400, 300), d(300, 400)), d(300, 400));
    }

    #[test]
    fn align_ignores_unrelated_sizes() {
        assert_eq!(align_to_orientation(d(400, 300), d(200, 100)), d(400, 300));
    }
}
