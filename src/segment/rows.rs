//! Row detection from a horizontal ink-density profile.
//!
//! Peak rows (profile above 5% of the maximum) are grouped into bands,
//! each band is padded by a margin and clipped, and short bands are
//! dropped as noise. Detection runs at most twice: once on the adaptive
//! mask, and once more on an Otsu mask if the first attempt found no peaks.

use super::{ensure_dimensions, BinaryMask, RowBand, RowImage, SegmentError};
use image::DynamicImage;

/// Fraction of the profile maximum a row must exceed to count as a peak.
const PEAK_RATIO: f64 = 0.05;
/// Band padding as a fraction of the band's height.
const MARGIN_RATIO: f64 = 0.5;
/// Padding floor in pixels.
const MIN_MARGIN_PX: u32 = 10;

/// Which binarization produced the peaks that were used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionAttempt {
    Adaptive,
    Otsu,
}

/// Result of band detection before any slicing.
#[derive(Debug, Clone, PartialEq)]
pub struct BandDetection {
    pub attempt: DetectionAttempt,
    pub peaks: Vec<u32>,
    pub bands: Vec<RowBand>,
}

/// Finds text-line bands in a binary mask.
#[derive(Debug, Clone, Copy)]
pub struct RowDetector {
    row_gap_px: u32,
    min_band_height_px: u32,
}

impl RowDetector {
    pub fn new(row_gap_px: u32, min_band_height_px: u32) -> Self {
        Self {
            row_gap_px,
            min_band_height_px,
        }
    }

    /// Detect bands, falling back to `otsu` exactly once when the primary
    /// mask has no peaks. The fallback mask is only built if needed.
    pub fn detect_bands(
        &self,
        primary: &BinaryMask,
        otsu: impl FnOnce() -> BinaryMask,
    ) -> BandDetection {
        let height = primary.height();
        let mut attempt = DetectionAttempt::Adaptive;
        let mut peaks = find_peaks(&primary.row_profile());

        if peaks.is_empty() {
            log::warn!("[ROWS] No peaks in adaptive mask, retrying with Otsu");
            attempt = DetectionAttempt::Otsu;
            peaks = find_peaks(&otsu().row_profile());
        }

        let raw = group_peaks(&peaks, self.row_gap_px);
        let bands = self.expand_bands(&raw, height);
        log::info!(
            "[ROWS] {} peak rows → {} raw bands → {} kept ({:?})",
            peaks.len(),
            raw.len(),
            bands.len(),
            attempt
        );

        BandDetection {
            attempt,
            peaks,
            bands,
        }
    }

    /// Pad each `(first_peak, last_peak)` band, clip to the image, drop
    /// short ones, and order by start row.
    ///
    /// Bands that end up sharing a start row are merged so start rows stay
    /// strictly increasing.
    pub fn expand_bands(&self, raw: &[(u32, u32)], image_height: u32) -> Vec<RowBand> {
        let mut bands: Vec<RowBand> = raw
            .iter()
            .filter_map(|&(first, last)| {
                let margin = ((f64::from(last - first) * MARGIN_RATIO) as u32).max(MIN_MARGIN_PX);
                let start_row = first.saturating_sub(margin);
                let end_row = last.saturating_add(margin).min(image_height);
                (end_row > start_row && end_row - start_row > self.min_band_height_px)
                    .then_some(RowBand { start_row, end_row })
            })
            .collect();

        bands.sort_by_key(|b| (b.start_row, b.end_row));
        bands.dedup_by(|later, earlier| {
            if later.start_row == earlier.start_row {
                earlier.end_row = earlier.end_row.max(later.end_row);
                true
            } else {
                false
            }
        });
        bands
    }

    /// Slice the source sheet into full-width row crops.
    ///
    /// With no bands, the whole sheet becomes the single row.
    pub fn slice_rows(
        &self,
        bands: &[RowBand],
        source: &DynamicImage,
    ) -> Result<Vec<RowImage>, SegmentError> {
        let (width, height) = (source.width(), source.height());
        ensure_dimensions(width, height)?;

        if bands.is_empty() {
            log::warn!("[ROWS] No bands survived, using the full sheet as one row");
            return Ok(vec![RowImage {
                index: 1,
                band: RowBand {
                    start_row: 0,
                    end_row: height,
                },
                image: source.clone(),
            }]);
        }

        Ok(bands
            .iter()
            .enumerate()
            .map(|(i, band)| RowImage {
                index: i + 1,
                band: *band,
                image: source.crop_imm(0, band.start_row, width, band.height()),
            })
            .collect())
    }

    /// Full detection on a mask: bands, fallback, and slicing.
    pub fn detect_rows(
        &self,
        mask: &BinaryMask,
        otsu: impl FnOnce() -> BinaryMask,
        source: &DynamicImage,
    ) -> Result<Vec<RowImage>, SegmentError> {
        ensure_dimensions(source.width(), source.height())?;
        let detection = self.detect_bands(mask, otsu);
        self.slice_rows(&detection.bands, source)
    }
}

/// Rows whose ink sum exceeds `PEAK_RATIO` of the maximum.
pub(crate) fn find_peaks(profile: &[u64]) -> Vec<u32> {
    let max = profile.iter().copied().max().unwrap_or(0);
    let threshold = max as f64 * PEAK_RATIO;
    profile
        .iter()
        .enumerate()
        .filter(|(_, &v)| v as f64 > threshold)
        .map(|(y, _)| y as u32)
        .collect()
}

/// Group ascending peak rows; a gap wider than `gap` starts a new band.
pub(crate) fn group_peaks(peaks: &[u32], gap: u32) -> Vec<(u32, u32)> {
    let Some((&first, rest)) = peaks.split_first() else {
        return Vec::new();
    };

    let mut bands = Vec::new();
    let mut start = first;
    let mut prev = first;
    for &y in rest {
        if y - prev > gap {
            bands.push((start, prev));
            start = y;
        }
        prev = y;
    }
    bands.push((start, prev));
    bands
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn band(start_row: u32, end_row: u32) -> RowBand {
        RowBand { start_row, end_row }
    }

    fn mask_with_rows(width: u32, height: u32, rows: &[std::ops::Range<u32>]) -> BinaryMask {
        BinaryMask::from_fn(width, height, |_, y| rows.iter().any(|r| r.contains(&y)))
    }

    fn empty_mask(width: u32, height: u32) -> BinaryMask {
        BinaryMask::from_fn(width, height, |_, _| false)
    }

    fn gray_sheet(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_pixel(width, height, Luma([255])))
    }

    #[test]
    fn peaks_exceed_five_percent_of_max() {
        let profile = [0, 4, 5, 6, 100, 0];
        assert_eq!(find_peaks(&profile), vec![3, 4]);
    }

    #[test]
    fn empty_profile_has_no_peaks() {
        assert!(find_peaks(&[0, 0, 0]).is_empty());
        assert!(find_peaks(&[]).is_empty());
    }

    #[test]
    fn gap_of_exactly_threshold_stays_in_band() {
        assert_eq!(group_peaks(&[10, 20, 31, 32], 10), vec![(10, 20), (31, 32)]);
    }

    #[test]
    fn single_peak_is_one_band() {
        assert_eq!(group_peaks(&[7], 10), vec![(7, 7)]);
        assert!(group_peaks(&[], 10).is_empty());
    }

    #[test]
    fn margin_is_half_height_with_floor() {
        let detector = RowDetector::new(10, 15);
        // Height 60 → margin 30.
        assert_eq!(
            detector.expand_bands(&[(100, 160)], 800),
            vec![band(70, 190)]
        );
        // Height 4 → margin floor 10.
        assert_eq!(
            detector.expand_bands(&[(100, 104)], 800),
            vec![band(90, 114)]
        );
    }

    #[test]
    fn expansion_is_clipped_to_image() {
        let detector = RowDetector::new(10, 15);
        assert_eq!(detector.expand_bands(&[(2, 40)], 50), vec![band(0, 50)]);
    }

    #[test]
    fn short_bands_are_dropped() {
        let detector = RowDetector::new(10, 15);
        // Clipped to [0, 10): height 10 ≤ 15.
        assert!(detector.expand_bands(&[(0, 0)], 12).is_empty());
        // A lone peak row pads to exactly 20 rows.
        assert_eq!(RowDetector::new(10, 19).expand_bands(&[(50, 50)], 100).len(), 1);
        assert!(RowDetector::new(10, 20).expand_bands(&[(50, 50)], 100).is_empty());
    }

    #[test]
    fn bands_are_ordered_and_start_rows_strictly_increase() {
        let detector = RowDetector::new(10, 15);
        // A tall band's margin pushes its start above a short earlier band.
        let bands = detector.expand_bands(&[(100, 100), (120, 300), (0, 0)], 1000);
        let starts: Vec<u32> = bands.iter().map(|b| b.start_row).collect();
        assert!(starts.windows(2).all(|w| w[0] < w[1]), "{:?}", starts);
    }

    #[test]
    fn shared_start_rows_are_merged() {
        let detector = RowDetector::new(10, 15);
        let bands = detector.expand_bands(&[(2, 30), (5, 45)], 200);
        // Both clip to start 0.
        assert_eq!(bands, vec![band(0, 65)]);
    }

    #[test]
    fn single_band_scenario_spans_margin() {
        let detector = RowDetector::new(10, 15);
        let mask = mask_with_rows(600, 800, &[100..161]);
        let detection = detector.detect_bands(&mask, || panic!("fallback not needed"));
        assert_eq!(detection.attempt, DetectionAttempt::Adaptive);
        assert_eq!(detection.bands, vec![band(70, 190)]);
    }

    #[test]
    fn otsu_fallback_runs_once_when_primary_is_empty() {
        let detector = RowDetector::new(10, 15);
        let mut calls = 0;
        let detection = detector.detect_bands(&empty_mask(100, 200), || {
            calls += 1;
            mask_with_rows(100, 200, &[50..70])
        });
        assert_eq!(calls, 1);
        assert_eq!(detection.attempt, DetectionAttempt::Otsu);
        assert_eq!(detection.bands.len(), 1);
    }

    #[test]
    fn fallback_with_no_peaks_yields_no_bands() {
        let detector = RowDetector::new(10, 15);
        let detection = detector.detect_bands(&empty_mask(100, 200), || empty_mask(100, 200));
        assert_eq!(detection.attempt, DetectionAttempt::Otsu);
        assert!(detection.bands.is_empty());
    }

    #[test]
    fn no_bands_returns_full_sheet() {
        let detector = RowDetector::new(10, 15);
        let rows = detector
            .detect_rows(&empty_mask(80, 60), || empty_mask(80, 60), &gray_sheet(80, 60))
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].band, band(0, 60));
        assert_eq!((rows[0].image.width(), rows[0].image.height()), (80, 60));
    }

    #[test]
    fn rows_are_numbered_top_to_bottom() {
        let detector = RowDetector::new(10, 15);
        let mask = mask_with_rows(50, 400, &[50..60, 150..165, 300..310]);
        let rows = detector
            .detect_rows(&mask, || empty_mask(50, 400), &gray_sheet(50, 400))
            .unwrap();
        assert_eq!(rows.len(), 3);
        for (i, row) in rows.iter().enumerate() {
            assert_eq!(row.index, i + 1);
            assert_eq!(row.image.height(), row.band.height());
            assert_eq!(row.image.width(), 50);
        }
        assert!(rows.windows(2).all(|w| w[0].band.start_row < w[1].band.start_row));
    }

    #[test]
    fn partial_survivors_are_returned_as_is() {
        let detector = RowDetector::new(10, 15);
        // The second band is clipped at the bottom edge to 13 rows and dropped.
        let bands = detector.expand_bands(&[(40, 60), (197, 197)], 200);
        assert_eq!(bands, vec![band(30, 70)]);
    }

    #[test]
    fn degenerate_source_is_rejected() {
        let detector = RowDetector::new(10, 15);
        let source = DynamicImage::ImageLuma8(GrayImage::new(0, 0));
        let err = detector
            .detect_rows(&empty_mask(0, 0), || empty_mask(0, 0), &source)
            .unwrap_err();
        assert!(matches!(err, SegmentError::InvalidImage { .. }));
    }
}
