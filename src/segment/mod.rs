//! Row segmentation domain — public API.
//!
//! Turns a scanned attendance sheet into an ordered list of row crops:
//! blur → classify style → binarize → ink profile → bands → crops.
//! External code should only use the items exported here.

mod binarize;
mod rows;
mod style;

pub use binarize::{binarize, binarize_otsu, BinaryMask};
pub use rows::{DetectionAttempt, RowDetector};
pub use style::{classify, laplacian_variance, TextStyle, DEFAULT_VARIANCE_THRESHOLD};

use image::{DynamicImage, GrayImage};
use std::path::{Path, PathBuf};

/// Sigma OpenCV derives for a 5×5 Gaussian kernel with sigma = 0.
const PRE_BLUR_SIGMA: f32 = 1.1;

/// Errors raised by the segmentation stage.
#[derive(Debug, thiserror::Error)]
pub enum SegmentError {
    #[error("invalid image: {width}x{height} has a zero dimension")]
    InvalidImage { width: u32, height: u32 },
    #[error("failed to decode image {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to encode row image: {0}")]
    Encode(#[from] image::ImageError),
    #[error("failed to write row images: {0}")]
    Io(#[from] std::io::Error),
}

/// Tunables for one segmentation run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentConfig {
    /// Laplacian variance below this means handwriting.
    pub laplacian_variance_threshold: f64,
    /// Peak rows further apart than this start a new band.
    pub row_gap_px: u32,
    /// Expanded bands this tall or shorter are dropped as noise.
    pub min_band_height_px: u32,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            laplacian_variance_threshold: style::DEFAULT_VARIANCE_THRESHOLD,
            row_gap_px: 10,
            min_band_height_px: 15,
        }
    }
}

/// A pixel-row range `[start_row, end_row)` judged to hold one text line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowBand {
    pub start_row: u32,
    pub end_row: u32,
}

impl RowBand {
    pub fn height(&self) -> u32 {
        self.end_row - self.start_row
    }
}

/// One full-width crop of the source sheet.
#[derive(Debug, Clone)]
pub struct RowImage {
    /// 1-based position in reading order.
    pub index: usize,
    pub band: RowBand,
    pub image: DynamicImage,
}

/// Everything the segmentation stage decided for one sheet.
#[derive(Debug, Clone)]
pub struct Segmentation {
    pub style: TextStyle,
    pub variance: f64,
    pub attempt: DetectionAttempt,
    /// True when no band survived and the whole sheet is the only row.
    pub full_image_fallback: bool,
    pub rows: Vec<RowImage>,
}

/// Reject degenerate images before any profiling happens.
pub(crate) fn ensure_dimensions(width: u32, height: u32) -> Result<(), SegmentError> {
    if width == 0 || height == 0 {
        return Err(SegmentError::InvalidImage { width, height });
    }
    Ok(())
}

/// Grayscale + 5×5 Gaussian blur, the input every later stage works on.
pub fn blurred_grayscale(image: &DynamicImage) -> GrayImage {
    imageproc::filter::gaussian_blur_f32(&image.to_luma8(), PRE_BLUR_SIGMA)
}

/// Decode an image file from disk.
pub fn load_image(path: &Path) -> Result<DynamicImage, SegmentError> {
    image::open(path).map_err(|source| SegmentError::Decode {
        path: path.to_path_buf(),
        source,
    })
}

/// Segment a sheet into row crops, top to bottom.
///
/// Always yields at least one row for a non-degenerate image: when no band
/// survives detection, the whole sheet comes back as row 1.
pub fn segment_sheet(
    image: &DynamicImage,
    config: &SegmentConfig,
) -> Result<Segmentation, SegmentError> {
    ensure_dimensions(image.width(), image.height())?;
    let start = std::time::Instant::now();

    let blurred = blurred_grayscale(image);
    let variance = laplacian_variance(&blurred);
    let style = classify(variance, config.laplacian_variance_threshold);
    log::info!(
        "[STYLE] Laplacian variance {:.1} (threshold {}) → {:?}",
        variance,
        config.laplacian_variance_threshold,
        style
    );

    let mask = binarize(&blurred, style);
    let detector = RowDetector::new(config.row_gap_px, config.min_band_height_px);
    let detection = detector.detect_bands(&mask, || binarize_otsu(&blurred, style));
    let full_image_fallback = detection.bands.is_empty();
    let rows = detector.slice_rows(&detection.bands, image)?;

    log::info!(
        "[SEGMENT] {}x{} sheet → {} rows via {:?} in {}ms",
        image.width(),
        image.height(),
        rows.len(),
        detection.attempt,
        start.elapsed().as_millis()
    );

    Ok(Segmentation {
        style,
        variance,
        attempt: detection.attempt,
        full_image_fallback,
        rows,
    })
}

/// File name a row crop is stored under; doubles as its source identifier.
pub fn row_file_name(sheet_id: &str, index: usize) -> String {
    format!("{}_row_{}.png", sheet_id, index)
}

/// Write every row crop as PNG into `dir`, returning the written paths.
pub fn write_row_images(
    rows: &[RowImage],
    dir: &Path,
    sheet_id: &str,
) -> Result<Vec<PathBuf>, SegmentError> {
    std::fs::create_dir_all(dir)?;
    let mut written = Vec::with_capacity(rows.len());
    for row in rows {
        let path = dir.join(row_file_name(sheet_id, row.index));
        row.image.save_with_format(&path, image::ImageFormat::Png)?;
        log::debug!("[SEGMENT] Wrote {}", path.display());
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn band(start_row: u32, end_row: u32) -> RowBand {
        RowBand { start_row, end_row }
    }

    fn sheet_with_lines(width: u32, height: u32, lines: &[(u32, u32)]) -> DynamicImage {
        let mut img = GrayImage::from_pixel(width, height, Luma([255]));
        for &(top, bottom) in lines {
            for y in top..bottom {
                // Character-sized strokes with gaps, like a written line.
                for x in (40..width - 40).filter(|x| x % 12 < 3) {
                    img.put_pixel(x, y, Luma([0]));
                }
            }
        }
        DynamicImage::ImageLuma8(img)
    }

    #[test]
    fn zero_height_is_invalid() {
        let img = DynamicImage::ImageLuma8(GrayImage::new(10, 0));
        let err = segment_sheet(&img, &SegmentConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            SegmentError::InvalidImage {
                width: 10,
                height: 0,
            }
        ));
    }

    #[test]
    fn zero_width_is_invalid() {
        let img = DynamicImage::ImageLuma8(GrayImage::new(0, 10));
        assert!(segment_sheet(&img, &SegmentConfig::default()).is_err());
    }

    #[test]
    fn blank_sheet_falls_back_to_full_image() {
        let img = sheet_with_lines(200, 120, &[]);
        let seg = segment_sheet(&img, &SegmentConfig::default()).unwrap();
        assert!(seg.full_image_fallback);
        assert_eq!(seg.rows.len(), 1);
        assert_eq!(seg.rows[0].index, 1);
        assert_eq!(seg.rows[0].band, band(0, 120));
        assert_eq!(seg.rows[0].image.height(), 120);
    }

    #[test]
    fn separate_lines_become_separate_rows() {
        let img = sheet_with_lines(400, 500, &[(100, 120), (300, 320)]);
        let seg = segment_sheet(&img, &SegmentConfig::default()).unwrap();
        assert!(!seg.full_image_fallback);
        assert_eq!(seg.rows.len(), 2);
        assert!(seg.rows[0].band.start_row < seg.rows[1].band.start_row);
        assert!(seg.rows[0].band.start_row <= 100 && seg.rows[0].band.end_row >= 120);
        assert!(seg.rows[1].band.start_row <= 300 && seg.rows[1].band.end_row >= 320);
        for row in &seg.rows {
            assert_eq!(row.image.width(), 400);
            assert_eq!(row.image.height(), row.band.height());
        }
    }

    #[test]
    fn row_file_names_are_one_based() {
        assert_eq!(row_file_name("abc", 1), "abc_row_1.png");
    }

    #[test]
    fn write_row_images_creates_pngs() {
        let dir = tempfile::tempdir().unwrap();
        let img = sheet_with_lines(200, 120, &[]);
        let seg = segment_sheet(&img, &SegmentConfig::default()).unwrap();
        let paths = write_row_images(&seg.rows, dir.path(), "sheet").unwrap();
        assert_eq!(paths.len(), 1);
        assert!(paths[0].ends_with("sheet_row_1.png"));
        let reloaded = load_image(&paths[0]).unwrap();
        assert_eq!(reloaded.height(), 120);
    }
}
