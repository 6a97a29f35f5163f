// Pure-Rust renderer for image-only pages: image XObjects -> white canvas

use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgb, RgbImage};

use super::PageRenderer;
use crate::error::CompressError;
use crate::pdf::content_stream::analyze_content;
use crate::pdf::image_xobject::{check_recompressible, decode_image_stream};
use crate::pdf::reader::SourceDocument;

/// Composites a page's image XObjects at their placements, over the
/// page's visible area and without its `/Rotate`.
///
/// Text, vector painting and form XObjects cannot be drawn, so such pages
/// are refused rather than rendered incompletely.
#[derive(Debug, Clone)]
pub struct RasterLayerRenderer {
    max_pixels: u64,
}

impl Default for RasterLayerRenderer {
    fn default() -> Self {
        Self {
            max_pixels: 60_000_000,
        }
    }
}

impl PageRenderer for RasterLayerRenderer {
    fn render(
        &self,
        doc: &SourceDocument,
        page_index: u32,
        dpi: u32,
    ) -> crate::error::Result<DynamicImage> {
        if dpi == 0 {
            return Err(CompressError::render("DPI must be positive"));
        }
        let area = doc.visible_box(page_index)?;
        let content = doc.page_content(page_index)?;
        let stats = analyze_content(&content)?;

        if stats.has_text() {
            return Err(CompressError::render(format!(
                "page {page_index} has text; raster layer renderer cannot draw it"
            )));
        }
        if stats.path_paint_ops > 0 {
            return Err(CompressError::render(format!(
                "page {page_index} has vector painting; raster layer renderer cannot draw it"
            )));
        }

        let images = doc.page_image_xobjects(page_index)?;
        let scale = dpi as f64 / 72.0;
        let width = ((area.width() * scale).round() as u32).max(1);
        let height = ((area.height() * scale).round() as u32).max(1);
        if width as u64 * height as u64 > self.max_pixels {
            return Err(CompressError::render(format!(
                "canvas {width}x{height} exceeds the pixel limit"
            )));
        }

        let mut canvas = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));
        for placement in &stats.placements {
            let Some((_, stream)) = images.get(&placement.name) else {
                return Err(CompressError::render(format!(
                    "XObject /{} is not a drawable image",
                    placement.name
                )));
            };
            if !placement.ctm.is_axis_aligned() {
                return Err(CompressError::render(format!(
                    "image /{} is rotated or skewed",
                    placement.name
                )));
            }
            if placement.bbox.intersect(&area).is_none() {
                continue;
            }

            let meta = check_recompressible(stream)?;
            let decoded = decode_image_stream(stream, &meta)?;

            let target_w = ((placement.bbox.width() * scale).round() as u32).max(1);
            let target_h = ((placement.bbox.height() * scale).round() as u32).max(1);
            let mut tile = decoded
                .resize_exact(target_w, target_h, FilterType::Triangle)
                .to_rgb8();
            // Image row 0 is the top edge unless the placement flips it.
            if placement.ctm.a < 0.0 {
                tile = imageops::flip_horizontal(&tile);
            }
            if placement.ctm.d < 0.0 {
                tile = imageops::flip_vertical(&tile);
            }

            let x = ((placement.bbox.x_min - area.x_min) * scale).round() as i64;
            let y = ((area.y_max - placement.bbox.y_max) * scale).round() as i64;
            imageops::overlay(&mut canvas, &tile, x, y);
        }

        Ok(DynamicImage::ImageRgb8(canvas))
    }

    fn name(&self) -> &'static str {
        "raster-layer"
    }
}
