// ページ単位のアセット抽出: 画像XObjectの再圧縮、ページ全体のラスタライズ(MRC / 単一JPEG)

use image::DynamicImage;
use lopdf::ObjectId;
use tracing::{debug, warn};

use crate::analysis::PageClassification;
use crate::config::profile::CompressionConfig;
use crate::mrc::compositor::MrcEngine;
use crate::mrc::{EncodedLayer, MrcLayerResult, jpeg};
use crate::pdf::content_stream::{BBox, ImagePlacement, extract_xobject_placements};
use crate::pdf::image_xobject::{
    ImageMeta, OptimizedImage, check_recompressible, decode_image_stream, downsample_to,
    optimize_image_encoding,
};
use crate::pdf::reader::SourceDocument;
use crate::render::PageRenderer;

/// 描画解像度の下限。
const MIN_RENDER_DPI: u32 = 36;

/// Where an extracted asset goes in the output document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetTarget {
    /// Replaces one image XObject stream, keeping the page content.
    XObject(ObjectId),
    /// Replaces the whole page, drawn over its visible area.
    Page,
}

#[derive(Debug, Clone)]
pub enum AssetPayload {
    Image(EncodedLayer),
    Layers(MrcLayerResult),
}

/// Recompressed bytes for part or all of one page. Lives until reassembly.
#[derive(Debug, Clone)]
pub struct ExtractedAsset {
    pub source_page_index: u32,
    /// Bytes of the content this asset replaces.
    pub original_byte_size: usize,
    pub payload: AssetPayload,
    pub bounding_box: BBox,
    pub target: AssetTarget,
}

impl ExtractedAsset {
    pub fn compressed_size(&self) -> usize {
        match &self.payload {
            AssetPayload::Image(layer) => layer.data.len(),
            AssetPayload::Layers(layers) => layers.encoded_size(),
        }
    }

    /// Whether this asset makes the output smaller than the original.
    pub fn saves_bytes(&self) -> bool {
        self.compressed_size() < self.original_byte_size
    }
}

/// How a page's assets are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionMode {
    /// Recompress embedded images in place.
    Images,
    /// Render the page and split it into MRC layers.
    Layers,
    /// Render the page into one JPEG.
    FullPage,
}

/// Produces in-memory assets for a page. Never writes to disk.
pub struct AssetExtractor<'a> {
    config: CompressionConfig,
    renderer: &'a dyn PageRenderer,
    mrc: MrcEngine,
}

impl<'a> AssetExtractor<'a> {
    pub fn new(config: CompressionConfig, renderer: &'a dyn PageRenderer) -> Self {
        Self {
            config,
            renderer,
            mrc: MrcEngine::new(config),
        }
    }

    /// Extract assets for one page.
    ///
    /// Returns an empty list when anything fails or nothing gets smaller;
    /// the caller then keeps the original page. Page-level modes fall back
    /// to image recompression when the page cannot be rendered.
    pub fn extract_assets(
        &self,
        doc: &SourceDocument,
        classification: &PageClassification,
        mode: ExtractionMode,
    ) -> Vec<ExtractedAsset> {
        let page_index = classification.page_index;

        if mode != ExtractionMode::Images {
            match self.extract_page_asset(doc, page_index, mode) {
                Ok(Some(asset)) => return vec![asset],
                Ok(None) => {
                    debug!(page_index, "Rendered page is not smaller, trying embedded images");
                }
                Err(e) => {
                    debug!(page_index, error = %e, "Page render unavailable, trying embedded images");
                }
            }
        }

        match self.extract_image_assets(doc, page_index) {
            Ok(assets) => assets,
            Err(e) => {
                warn!(page_index, error = %e, "Image extraction failed, keeping original page");
                Vec::new()
            }
        }
    }

    /// Render the whole page and encode it as layers or a single JPEG.
    fn extract_page_asset(
        &self,
        doc: &SourceDocument,
        page_index: u32,
        mode: ExtractionMode,
    ) -> crate::error::Result<Option<ExtractedAsset>> {
        let area = doc.visible_box(page_index)?;
        let original_byte_size = doc.page_payload_size(page_index)?;
        let dpi = self.render_dpi(doc, page_index)?;
        let bitmap = self.renderer.render(doc, page_index, dpi)?;

        let payload = match mode {
            ExtractionMode::Layers => match self.mrc.process_page_with_layers(&bitmap) {
                Some(layers) => AssetPayload::Layers(layers),
                None => AssetPayload::Image(self.encode_single_layer(&bitmap)?),
            },
            _ => AssetPayload::Image(self.encode_single_layer(&bitmap)?),
        };

        let asset = ExtractedAsset {
            source_page_index: page_index,
            original_byte_size,
            payload,
            bounding_box: area,
            target: AssetTarget::Page,
        };
        debug!(
            page_index,
            dpi,
            renderer = self.renderer.name(),
            original = asset.original_byte_size,
            compressed = asset.compressed_size(),
            "Page rendered"
        );
        Ok(asset.saves_bytes().then_some(asset))
    }

    fn encode_single_layer(&self, bitmap: &DynamicImage) -> crate::error::Result<EncodedLayer> {
        let (data, color_space) = jpeg::encode_page_jpeg(bitmap, self.config.jpeg_quality())?;
        Ok(EncodedLayer {
            data,
            width: bitmap.width(),
            height: bitmap.height(),
            filter: "DCTDecode",
            color_space: Some(color_space),
            bits_per_component: 8,
        })
    }

    /// Target DPI, lowered to the native resolution of the page's largest
    /// image so that rendering never upsamples a scan.
    fn render_dpi(&self, doc: &SourceDocument, page_index: u32) -> crate::error::Result<u32> {
        let target = self.config.target_resolution_dpi;
        let content = doc.page_content(page_index)?;
        let placements = extract_xobject_placements(&content)?;
        let images = doc.page_image_xobjects(page_index)?;

        let native = placements
            .iter()
            .filter_map(|p| {
                let (_, stream) = images.get(&p.name)?;
                let meta = crate::pdf::image_xobject::read_image_meta(stream).ok()?;
                Some((p.bbox.area(), effective_dpi(&meta, &p.bbox)?))
            })
            .max_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, dpi)| dpi);

        let dpi = match native {
            Some(native) => (native.ceil() as u32).min(target),
            None => target,
        };
        Ok(dpi.max(MIN_RENDER_DPI))
    }

    /// Recompress each embedded image that can be re-encoded safely.
    ///
    /// Images that cannot be recompressed without changing their meaning
    /// (masks, exotic colour spaces) are left alone; a decode or encode
    /// failure discards the whole page's assets.
    fn extract_image_assets(
        &self,
        doc: &SourceDocument,
        page_index: u32,
    ) -> crate::error::Result<Vec<ExtractedAsset>> {
        let content = doc.page_content(page_index)?;
        let placements = extract_xobject_placements(&content)?;
        let images = doc.page_image_xobjects(page_index)?;

        let mut assets = Vec::new();
        for (name, (object_id, stream)) in &images {
            let meta = match check_recompressible(stream) {
                Ok(meta) => meta,
                Err(e) => {
                    debug!(page_index, image = %name, reason = %e, "Image kept as-is");
                    continue;
                }
            };
            let bbox = largest_placement(&placements, name);
            let decoded = decode_image_stream(stream, &meta)?;
            let target = bbox.and_then(|b| self.target_pixels(&meta, &b));
            let resized = downsample_to(decoded, target);

            let Some(optimized) =
                optimize_image_encoding(&resized, stream.content.len(), self.config.jpeg_quality())?
            else {
                continue;
            };

            assets.push(ExtractedAsset {
                source_page_index: page_index,
                original_byte_size: stream.content.len(),
                payload: AssetPayload::Image(into_layer(optimized)),
                bounding_box: bbox.unwrap_or(BBox {
                    x_min: 0.0,
                    y_min: 0.0,
                    x_max: 0.0,
                    y_max: 0.0,
                }),
                target: AssetTarget::XObject(*object_id),
            });
        }
        Ok(assets)
    }

    /// Pixel size at which an image placed in `bbox` reaches the target DPI,
    /// or `None` when it is already at or below it.
    fn target_pixels(&self, meta: &ImageMeta, bbox: &BBox) -> Option<(u32, u32)> {
        let effective = effective_dpi(meta, bbox)?;
        let target = self.config.target_resolution_dpi as f64;
        if effective <= target {
            return None;
        }
        let scale = target / effective;
        let w = ((meta.width as f64 * scale).round() as u32).max(1);
        let h = ((meta.height as f64 * scale).round() as u32).max(1);
        Some((w, h))
    }
}

/// Horizontal and vertical pixel density of an image at its placement; the
/// larger of the two.
fn effective_dpi(meta: &ImageMeta, bbox: &BBox) -> Option<f64> {
    if bbox.width() <= 0.0 || bbox.height() <= 0.0 {
        return None;
    }
    let x_dpi = meta.width as f64 / (bbox.width() / 72.0);
    let y_dpi = meta.height as f64 / (bbox.height() / 72.0);
    Some(x_dpi.max(y_dpi))
}

/// The biggest on-page box where `name` is drawn.
fn largest_placement(placements: &[ImagePlacement], name: &str) -> Option<BBox> {
    placements
        .iter()
        .filter(|p| p.name == name)
        .map(|p| p.bbox)
        .max_by(|a, b| a.area().total_cmp(&b.area()))
}

fn into_layer(image: OptimizedImage) -> EncodedLayer {
    EncodedLayer {
        data: image.data,
        width: image.width,
        height: image.height,
        filter: image.filter,
        color_space: Some(image.color_space),
        bits_per_component: image.bits_per_component,
    }
}
