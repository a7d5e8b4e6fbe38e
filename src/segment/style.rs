//! Handwritten vs. printed classification from edge energy.
//!
//! Soft, irregular pen strokes produce a weak Laplacian response; crisp
//! printed glyphs produce a strong one. The variance of the response over
//! the whole sheet is compared against a fixed threshold.

use image::GrayImage;

pub const DEFAULT_VARIANCE_THRESHOLD: f64 = 100.0;

/// Writing style of the sheet, steering binarization parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TextStyle {
    Handwritten,
    Printed,
}

/// Classify from a precomputed Laplacian variance.
pub fn classify(variance: f64, threshold: f64) -> TextStyle {
    if variance < threshold {
        TextStyle::Handwritten
    } else {
        TextStyle::Printed
    }
}

/// Population variance of the 4-neighbour Laplacian over every pixel.
///
/// Borders are reflected without repeating the edge pixel (`gfedcb|abcdefgh|gfedcba`).
pub fn laplacian_variance(image: &GrayImage) -> f64 {
    let (width, height) = image.dimensions();
    let count = width as u64 * height as u64;
    if count == 0 {
        return 0.0;
    }

    let at = |x: i64, y: i64| -> f64 {
        let x = reflect101(x, width as i64);
        let y = reflect101(y, height as i64);
        image.get_pixel(x as u32, y as u32).0[0] as f64
    };

    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    for y in 0..height as i64 {
        for x in 0..width as i64 {
            let response =
                at(x - 1, y) + at(x + 1, y) + at(x, y - 1) + at(x, y + 1) - 4.0 * at(x, y);
            sum += response;
            sum_sq += response * response;
        }
    }

    let mean = sum / count as f64;
    (sum_sq / count as f64 - mean * mean).max(0.0)
}

fn reflect101(i: i64, len: i64) -> i64 {
    if len == 1 {
        return 0;
    }
    let mut i = i;
    while i < 0 || i >= len {
        if i < 0 {
            i = -i;
        } else {
            i = 2 * (len - 1) - i;
        }
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn flat_image_has_zero_variance() {
        let img = GrayImage::from_pixel(32, 32, Luma([200]));
        assert_eq!(laplacian_variance(&img), 0.0);
    }

    #[test]
    fn checkerboard_has_high_variance() {
        let img = GrayImage::from_fn(32, 32, |x, y| {
            if (x + y) % 2 == 0 {
                Luma([0])
            } else {
                Luma([255])
            }
        });
        assert!(laplacian_variance(&img) > 100.0);
    }

    #[test]
    fn threshold_splits_styles() {
        assert_eq!(classify(40.0, 100.0), TextStyle::Handwritten);
        assert_eq!(classify(100.0, 100.0), TextStyle::Printed);
        assert_eq!(classify(2500.0, 100.0), TextStyle::Printed);
    }

    #[test]
    fn single_pixel_image_does_not_panic() {
        let img = GrayImage::from_pixel(1, 1, Luma([17]));
        assert_eq!(laplacian_variance(&img), 0.0);
    }

    #[test]
    fn reflection_skips_edge_pixel() {
        assert_eq!(reflect101(-1, 5), 1);
        assert_eq!(reflect101(5, 5), 3);
        assert_eq!(reflect101(2, 5), 2);
    }
}
