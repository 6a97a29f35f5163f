// Otsu segmentation: grayscale page -> ink mask + statistics

use image::{GrayImage, Luma};
use imageproc::contrast::otsu_level;
use imageproc::distance_transform::Norm;
use imageproc::morphology::erode;

use super::MrcTuning;
use crate::error::CompressError;

pub const INK: u8 = 255;
pub const PAPER: u8 = 0;

/// Output of [`segment_text_mask`].
pub struct Segmentation {
    /// `INK` where a pixel belongs to the foreground, `PAPER` elsewhere.
    pub mask: GrayImage,
    /// Otsu level separating ink from paper.
    pub level: u8,
    /// Fraction of pixels classified as ink.
    pub coverage: f64,
    /// Mean paper luma minus mean ink luma.
    pub contrast: f64,
    /// Fraction of ink pixels that survive an erosion. Thin strokes (text,
    /// line art) erode away; photographic regions do not.
    pub solid_ratio: f64,
}

impl Segmentation {
    /// Whether the mask looks like text or line art worth a separate layer.
    pub fn is_text_like(&self, tuning: &MrcTuning) -> bool {
        self.coverage >= tuning.min_coverage
            && self.coverage <= tuning.max_coverage
            && self.contrast >= tuning.min_contrast
            && self.solid_ratio <= tuning.max_solid_ratio
    }
}

/// Segment a grayscale bitmap into an ink mask using a global Otsu level.
///
/// Dark pixels on lighter paper become ink. Works for tinted paper as long
/// as the ink is darker than the paper.
pub fn segment_text_mask(gray: &GrayImage) -> crate::error::Result<Segmentation> {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return Err(CompressError::segmentation("Cannot segment an empty bitmap"));
    }

    let level = otsu_level(gray);

    let mut mask = GrayImage::new(width, height);
    let mut ink_count: u64 = 0;
    let mut ink_sum: u64 = 0;
    let mut paper_sum: u64 = 0;

    for (x, y, pixel) in gray.enumerate_pixels() {
        let luma = pixel.0[0];
        if luma <= level {
            mask.put_pixel(x, y, Luma([INK]));
            ink_count += 1;
            ink_sum += luma as u64;
        } else {
            paper_sum += luma as u64;
        }
    }

    let total = width as u64 * height as u64;
    let paper_count = total - ink_count;
    let coverage = ink_count as f64 / total as f64;

    let contrast = if ink_count == 0 || paper_count == 0 {
        0.0
    } else {
        paper_sum as f64 / paper_count as f64 - ink_sum as f64 / ink_count as f64
    };

    let solid_ratio = if ink_count == 0 {
        0.0
    } else {
        let eroded = erode(&mask, Norm::LInf, 2);
        let surviving = eroded.pixels().filter(|p| p.0[0] == INK).count() as f64;
        surviving / ink_count as f64
    };

    Ok(Segmentation {
        mask,
        level,
        coverage,
        contrast,
        solid_ratio,
    })
}
