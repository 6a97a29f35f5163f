// Layer separation: page bitmap -> background layer + bitonal foreground mask

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, Rgb, RgbImage};
use imageproc::distance_transform::Norm;
use imageproc::morphology::dilate;
use tracing::{debug, warn};

use super::segmenter::{INK, segment_text_mask};
use super::{EncodedLayer, MrcLayerResult, MrcTuning, jpeg, mask};
use crate::config::profile::CompressionConfig;

/// Background cells used to estimate paper colour under the text.
const INPAINT_CELL: u32 = 16;

/// Splits rendered page bitmaps into MRC layers.
///
/// Holds only immutable settings; one engine per run.
pub struct MrcEngine {
    config: CompressionConfig,
    tuning: MrcTuning,
}

impl MrcEngine {
    pub fn new(config: CompressionConfig) -> Self {
        Self::with_tuning(config, MrcTuning::default())
    }

    pub fn with_tuning(config: CompressionConfig, tuning: MrcTuning) -> Self {
        Self { config, tuning }
    }

    /// Separate a page bitmap rendered at the profile's target resolution.
    ///
    /// Returns `None` when the layers cannot be computed; the caller then
    /// encodes the page as a single JPEG.
    pub fn process_page_with_layers(&self, image: &DynamicImage) -> Option<MrcLayerResult> {
        match self.compose(image) {
            Ok(result) => Some(result),
            Err(e) => {
                warn!(error = %e, "MRC layer separation failed");
                None
            }
        }
    }

    fn compose(&self, image: &DynamicImage) -> crate::error::Result<MrcLayerResult> {
        let rgb = image.to_rgb8();
        let gray = image.to_luma8();
        let segmentation = segment_text_mask(&gray)?;
        let has_significant_text = segmentation.is_text_like(&self.tuning);

        debug!(
            coverage = segmentation.coverage,
            contrast = segmentation.contrast,
            solid_ratio = segmentation.solid_ratio,
            has_significant_text,
            "Page segmented"
        );

        let foreground_mask = EncodedLayer {
            data: mask::encode_stencil_mask(&segmentation.mask)?,
            width: rgb.width(),
            height: rgb.height(),
            filter: "FlateDecode",
            color_space: None,
            bits_per_component: 1,
        };

        if !has_significant_text {
            // Photo-only scan: the background is the whole picture.
            let (data, color_space) =
                jpeg::encode_page_jpeg(&DynamicImage::ImageRgb8(rgb.clone()), self.config.jpeg_quality())?;
            return Ok(MrcLayerResult {
                background: EncodedLayer {
                    data,
                    width: rgb.width(),
                    height: rgb.height(),
                    filter: "DCTDecode",
                    color_space: Some(color_space),
                    bits_per_component: 8,
                },
                foreground_mask,
                ink_color: [0, 0, 0],
                has_significant_text,
            });
        }

        let ink_color = mean_color(&rgb, &segmentation.mask);
        let grown = dilate(&segmentation.mask, Norm::LInf, self.tuning.dilate_radius);
        let background = inpaint(&rgb, &grown);
        let background = self.scale_background(background);

        let (data, color_space) = jpeg::encode_page_jpeg(
            &DynamicImage::ImageRgb8(background.clone()),
            self.config.background_jpeg_quality(),
        )?;

        Ok(MrcLayerResult {
            background: EncodedLayer {
                data,
                width: background.width(),
                height: background.height(),
                filter: "DCTDecode",
                color_space: Some(color_space),
                bits_per_component: 8,
            },
            foreground_mask,
            ink_color,
            has_significant_text,
        })
    }

    /// Downsample the inpainted background to the background resolution.
    fn scale_background(&self, background: RgbImage) -> RgbImage {
        let ratio = self.config.background_dpi() as f64 / self.config.target_resolution_dpi as f64;
        if ratio >= 1.0 {
            return background;
        }
        let w = ((background.width() as f64 * ratio).round() as u32).max(1);
        let h = ((background.height() as f64 * ratio).round() as u32).max(1);
        image::imageops::resize(&background, w, h, FilterType::Triangle)
    }
}

/// Average colour of the pixels under the ink mask.
fn mean_color(rgb: &RgbImage, ink_mask: &GrayImage) -> [u8; 3] {
    let mut sum = [0u64; 3];
    let mut count = 0u64;
    for (pixel, m) in rgb.pixels().zip(ink_mask.pixels()) {
        if m.0[0] == INK {
            for c in 0..3 {
                sum[c] += pixel.0[c] as u64;
            }
            count += 1;
        }
    }
    if count == 0 {
        return [0, 0, 0];
    }
    [
        (sum[0] / count) as u8,
        (sum[1] / count) as u8,
        (sum[2] / count) as u8,
    ]
}

/// Replace masked pixels with the paper colour of their cell.
///
/// Each cell's colour is the mean of its unmasked pixels; cells that are
/// fully masked fall back to the page-wide paper colour.
fn inpaint(rgb: &RgbImage, ink_mask: &GrayImage) -> RgbImage {
    let (width, height) = rgb.dimensions();
    let cols = width.div_ceil(INPAINT_CELL) as usize;
    let rows = height.div_ceil(INPAINT_CELL) as usize;

    let mut sums = vec![[0u64; 4]; cols * rows];
    let mut global = [0u64; 4];
    for (x, y, pixel) in rgb.enumerate_pixels() {
        if ink_mask.get_pixel(x, y).0[0] == INK {
            continue;
        }
        let cell = (y / INPAINT_CELL) as usize * cols + (x / INPAINT_CELL) as usize;
        for c in 0..3 {
            sums[cell][c] += pixel.0[c] as u64;
            global[c] += pixel.0[c] as u64;
        }
        sums[cell][3] += 1;
        global[3] += 1;
    }

    let average = |s: &[u64; 4]| -> Option<Rgb<u8>> {
        (s[3] > 0).then(|| {
            Rgb([
                (s[0] / s[3]) as u8,
                (s[1] / s[3]) as u8,
                (s[2] / s[3]) as u8,
            ])
        })
    };
    let paper = average(&global).unwrap_or(Rgb([255, 255, 255]));
    let cell_colors: Vec<Rgb<u8>> = sums.iter().map(|s| average(s).unwrap_or(paper)).collect();

    let mut out = rgb.clone();
    for (x, y, pixel) in out.enumerate_pixels_mut() {
        if ink_mask.get_pixel(x, y).0[0] == INK {
            let cell = (y / INPAINT_CELL) as usize * cols + (x / INPAINT_CELL) as usize;
            *pixel = cell_colors[cell];
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::profile::Profile;
    use image::Luma;

    fn scan_with_text(paper: [u8; 3], ink: [u8; 3]) -> DynamicImage {
        let mut img = RgbImage::from_pixel(300, 300, Rgb(paper));
        for y in (20..280).step_by(14) {
            for x in 20..280 {
                if (x / 4) % 3 != 0 {
                    img.put_pixel(x, y, Rgb(ink));
                    img.put_pixel(x, y + 1, Rgb(ink));
                }
            }
        }
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn test_text_scan_produces_two_layers() {
        let engine = MrcEngine::new(Profile::High.config());
        let result = engine
            .process_page_with_layers(&scan_with_text([250, 250, 250], [10, 10, 10]))
            .expect("layers");
        assert!(result.has_significant_text);
        assert_eq!(result.foreground_mask.width, 300);
        assert_eq!(result.foreground_mask.bits_per_component, 1);
        // Background is stored at half the text resolution.
        assert_eq!(result.background.width, 150);
        assert!(result.ink_color.iter().all(|&c| c < 60));
    }

    #[test]
    fn test_background_has_text_removed() {
        let mut img = RgbImage::from_pixel(64, 64, Rgb([240, 230, 200]));
        for x in 8..56 {
            img.put_pixel(x, 30, Rgb([0, 0, 0]));
        }
        let mut ink = GrayImage::new(64, 64);
        for x in 8..56 {
            ink.put_pixel(x, 30, Luma([INK]));
        }
        let cleaned = inpaint(&img, &ink);
        for x in 8..56 {
            assert_eq!(cleaned.get_pixel(x, 30).0, [240, 230, 200]);
        }
    }

    #[test]
    fn test_colored_paper_keeps_paper_tint_and_ink_color() {
        // Dark blue ink on yellow paper: the background keeps the tint and
        // the foreground is painted in the ink colour, not black.
        let engine = MrcEngine::new(Profile::High.config());
        let result = engine
            .process_page_with_layers(&scan_with_text([245, 225, 120], [20, 30, 120]))
            .expect("layers");
        assert!(result.has_significant_text);
        assert_eq!(result.background.color_space, Some("DeviceRGB"));
        let [r, g, b] = result.ink_color;
        assert!(b > r && b > g, "ink colour should stay blue, got {:?}", result.ink_color);
    }

    #[test]
    fn test_photo_only_scan_skips_mask() {
        let mut img = RgbImage::new(120, 120);
        for (x, y, p) in img.enumerate_pixels_mut() {
            *p = Rgb([(x * 2) as u8, (y * 2) as u8, 128]);
        }
        let engine = MrcEngine::new(Profile::Balanced.config());
        let result = engine
            .process_page_with_layers(&DynamicImage::ImageRgb8(img))
            .expect("layers");
        assert!(!result.has_significant_text);
        assert_eq!(result.background.width, 120);
    }

    #[test]
    fn test_empty_bitmap_yields_none() {
        let engine = MrcEngine::new(Profile::Balanced.config());
        let empty = DynamicImage::ImageRgb8(RgbImage::new(0, 0));
        assert!(engine.process_page_with_layers(&empty).is_none());
    }
}
