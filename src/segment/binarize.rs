//! Binarization: blurred grayscale → ink mask tuned to the writing style.
//!
//! Adaptive thresholding marks a pixel as ink when it is darker than its
//! local mean minus an offset. A wide horizontal dilation then bridges the
//! gaps between characters so each written line becomes one solid band.

use super::style::TextStyle;
use image::{GrayImage, Luma};

const INK: u8 = 255;

/// Threshold + dilation parameters for one writing style.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct BinarizeParams {
    /// Side of the square neighbourhood the local mean is taken over.
    pub block_size: u32,
    /// Subtracted from the local mean before comparing.
    pub offset: f32,
    /// Width of the 1-pixel-high rectangular dilation kernel.
    pub kernel_width: u32,
    /// Gaussian-weighted mean when true, flat box mean otherwise.
    pub gaussian: bool,
}

impl BinarizeParams {
    pub fn for_style(style: TextStyle) -> Self {
        match style {
            TextStyle::Handwritten => Self {
                block_size: 51,
                offset: 15.0,
                kernel_width: 50,
                gaussian: true,
            },
            TextStyle::Printed => Self {
                block_size: 15,
                offset: 7.0,
                kernel_width: 30,
                gaussian: false,
            },
        }
    }
}

/// Foreground/background mask with the same dimensions as its source.
///
/// Ink pixels hold 255, background 0. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryMask {
    pixels: GrayImage,
}

impl BinaryMask {
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn is_ink(&self, x: u32, y: u32) -> bool {
        self.pixels.get_pixel(x, y).0[0] > 0
    }

    /// Per-row sum of foreground pixel values.
    pub fn row_profile(&self) -> Vec<u64> {
        let width = self.pixels.width() as usize;
        if width == 0 {
            return vec![0; self.pixels.height() as usize];
        }
        self.pixels
            .as_raw()
            .chunks_exact(width)
            .map(|row| row.iter().map(|&p| p as u64).sum())
            .collect()
    }

    pub fn as_image(&self) -> &GrayImage {
        &self.pixels
    }

    /// Build a mask from a predicate; mostly useful for tests and tooling.
    pub fn from_fn(width: u32, height: u32, ink: impl Fn(u32, u32) -> bool) -> Self {
        Self {
            pixels: GrayImage::from_fn(width, height, |x, y| {
                Luma([if ink(x, y) { INK } else { 0 }])
            }),
        }
    }
}

/// Adaptive binarization + dilation for the given style.
pub fn binarize(blurred: &GrayImage, style: TextStyle) -> BinaryMask {
    let params = BinarizeParams::for_style(style);
    let local_mean = if params.gaussian {
        // Sigma OpenCV derives from the block size: 0.3 * ((k - 1) / 2 - 1) + 0.8.
        let sigma = 0.3 * ((params.block_size as f32 - 1.0) * 0.5 - 1.0) + 0.8;
        imageproc::filter::gaussian_blur_f32(blurred, sigma)
    } else {
        box_mean(blurred, params.block_size / 2)
    };

    let thresholded = GrayImage::from_fn(blurred.width(), blurred.height(), |x, y| {
        let value = blurred.get_pixel(x, y).0[0] as f32;
        let limit = local_mean.get_pixel(x, y).0[0] as f32 - params.offset;
        Luma([if value <= limit { INK } else { 0 }])
    });

    BinaryMask {
        pixels: dilate_horizontal(&thresholded, params.kernel_width),
    }
}

/// Global Otsu binarization (inverted) with the style's dilation kernel.
///
/// Used only when the adaptive mask yields no peaks. A flat image has no
/// meaningful split and produces an empty mask.
pub fn binarize_otsu(blurred: &GrayImage, style: TextStyle) -> BinaryMask {
    let params = BinarizeParams::for_style(style);
    let mut min = u8::MAX;
    let mut max = u8::MIN;
    for p in blurred.pixels() {
        min = min.min(p.0[0]);
        max = max.max(p.0[0]);
    }

    let thresholded = if blurred.is_empty() || min == max {
        GrayImage::new(blurred.width(), blurred.height())
    } else {
        let level = imageproc::contrast::otsu_level(blurred);
        log::debug!("[SEGMENT] Otsu level {}", level);
        GrayImage::from_fn(blurred.width(), blurred.height(), |x, y| {
            Luma([if blurred.get_pixel(x, y).0[0] <= level { INK } else { 0 }])
        })
    };

    BinaryMask {
        pixels: dilate_horizontal(&thresholded, params.kernel_width),
    }
}

/// Mean over a `(2r+1)²` window, edge pixels replicated past the border,
/// via a summed-area table over the padded image.
fn box_mean(gray: &GrayImage, radius: u32) -> GrayImage {
    let (w, h) = gray.dimensions();
    if w == 0 || h == 0 {
        return GrayImage::new(w, h);
    }
    let side = 2 * radius + 1;
    let (pw, ph) = (w + 2 * radius, h + 2 * radius);
    let stride = (pw + 1) as usize;
    let mut table = vec![0u64; stride * (ph + 1) as usize];
    for py in 0..ph {
        let sy = py.saturating_sub(radius).min(h - 1);
        let mut row_sum = 0u64;
        for px in 0..pw {
            let sx = px.saturating_sub(radius).min(w - 1);
            row_sum += gray.get_pixel(sx, sy).0[0] as u64;
            let idx = (py + 1) as usize * stride + (px + 1) as usize;
            table[idx] = row_sum + table[py as usize * stride + (px + 1) as usize];
        }
    }

    let area = (side as u64) * (side as u64);
    GrayImage::from_fn(w, h, |cx, cy| {
        let (x1, y1) = (cx as usize, cy as usize);
        let (x2, y2) = (x1 + side as usize, y1 + side as usize);
        let sum = table[y2 * stride + x2] + table[y1 * stride + x1]
            - table[y1 * stride + x2]
            - table[y2 * stride + x1];
        Luma([((sum + area / 2) / area) as u8])
    })
}

/// Binary dilation with a `kernel_width × 1` rectangle anchored at its centre.
///
/// Sliding-window count: a pixel is ink if any input pixel in
/// `[x - kernel_width / 2, x + (kernel_width - 1) / 2]` is ink.
fn dilate_horizontal(input: &GrayImage, kernel_width: u32) -> GrayImage {
    let (w, h) = input.dimensions();
    if kernel_width <= 1 || w == 0 {
        return input.clone();
    }
    let w = w as usize;
    let r_left = (kernel_width / 2) as usize;
    let r_right = (kernel_width as usize - 1) - r_left;
    let src = input.as_raw();
    let mut out = vec![0u8; src.len()];

    for y in 0..h as usize {
        let row = &src[y * w..(y + 1) * w];
        let dst = &mut out[y * w..(y + 1) * w];
        let mut count = row[..=r_right.min(w - 1)].iter().filter(|&&p| p > 0).count();

        for x in 0..w {
            if count > 0 {
                dst[x] = INK;
            }
            let enter = x + r_right + 1;
            if enter < w && row[enter] > 0 {
                count += 1;
            }
            if x >= r_left && row[x - r_left] > 0 {
                count -= 1;
            }
        }
    }

    GrayImage::from_raw(w as u32, h, out).unwrap_or_else(|| input.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn style_parameters_match_stroke_geometry() {
        let hw = BinarizeParams::for_style(TextStyle::Handwritten);
        assert_eq!((hw.block_size, hw.offset, hw.kernel_width), (51, 15.0, 50));
        assert!(hw.gaussian);
        let pr = BinarizeParams::for_style(TextStyle::Printed);
        assert_eq!((pr.block_size, pr.offset, pr.kernel_width), (15, 7.0, 30));
        assert!(!pr.gaussian);
    }

    #[test]
    fn dilation_spreads_single_pixel_across_kernel() {
        let mut img = GrayImage::new(100, 1);
        img.put_pixel(50, 0, Luma([255]));
        let out = dilate_horizontal(&img, 30);
        let inked: Vec<u32> = (0..100).filter(|&x| out.get_pixel(x, 0).0[0] > 0).collect();
        // Window for output x covers [x - 15, x + 14]; input 50 reaches x in [36, 65].
        assert_eq!(inked.first(), Some(&36));
        assert_eq!(inked.last(), Some(&65));
        assert_eq!(inked.len(), 30);
    }

    #[test]
    fn dilation_bridges_character_gaps() {
        let mut img = GrayImage::new(120, 3);
        for x in [20u32, 40, 60] {
            img.put_pixel(x, 1, Luma([255]));
        }
        let out = dilate_horizontal(&img, 30);
        assert!((20..=60).all(|x| out.get_pixel(x, 1).0[0] > 0));
        assert!((0..120).all(|x| out.get_pixel(x, 0).0[0] == 0));
    }

    #[test]
    fn box_mean_of_flat_image_is_flat() {
        let img = GrayImage::from_pixel(20, 20, Luma([90]));
        let mean = box_mean(&img, 7);
        assert!(mean.pixels().all(|p| p.0[0] == 90));
    }

    #[test]
    fn box_mean_replicates_edge_pixels() {
        let img = GrayImage::from_fn(20, 20, |x, _| Luma([if x == 0 { 0 } else { 200 }]));
        let mean = box_mean(&img, 7);
        // Columns -7..=0 all read the dark edge column: 7 of 15 columns are bright.
        assert_eq!(mean.get_pixel(0, 10).0[0], 93);
        assert_eq!(mean.get_pixel(19, 10).0[0], 200);
    }

    #[test]
    fn dark_strokes_on_white_become_ink() {
        let mut img = GrayImage::from_pixel(80, 40, Luma([250]));
        for y in 18..22 {
            for x in (10..70).filter(|x| x % 8 < 2) {
                img.put_pixel(x, y, Luma([10]));
            }
        }
        for style in [TextStyle::Handwritten, TextStyle::Printed] {
            let mask = binarize(&img, style);
            let profile = mask.row_profile();
            assert!(profile[20] > 0, "{:?} missed the stroke row", style);
            assert_eq!(profile[2], 0, "{:?} inked the margin", style);
        }
    }

    #[test]
    fn white_page_has_no_ink() {
        let img = GrayImage::from_pixel(50, 50, Luma([255]));
        assert!(binarize(&img, TextStyle::Printed).row_profile().iter().all(|&v| v == 0));
        assert!(binarize_otsu(&img, TextStyle::Printed).row_profile().iter().all(|&v| v == 0));
    }

    #[test]
    fn otsu_marks_dark_half() {
        let img = GrayImage::from_fn(40, 40, |_, y| if y < 10 { Luma([30]) } else { Luma([220]) });
        let mask = binarize_otsu(&img, TextStyle::Printed);
        assert!(mask.is_ink(5, 5));
        assert!(!mask.is_ink(5, 30));
    }
}
