pub mod compositor;
pub mod jpeg;
pub mod mask;
pub mod segmenter;

/// Thresholds deciding whether a scanned page has text worth its own layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MrcTuning {
    /// Minimum fraction of ink pixels.
    pub min_coverage: f64,
    /// Maximum fraction of ink pixels; above this the page is mostly dark.
    pub max_coverage: f64,
    /// Minimum luma difference between paper and ink.
    pub min_contrast: f64,
    /// Maximum share of ink that survives erosion.
    pub max_solid_ratio: f64,
    /// Mask growth before inpainting, in pixels.
    pub dilate_radius: u8,
}

impl Default for MrcTuning {
    fn default() -> Self {
        Self {
            min_coverage: 0.001,
            max_coverage: 0.35,
            min_contrast: 80.0,
            max_solid_ratio: 0.5,
            dilate_radius: 1,
        }
    }
}

/// One encoded image layer, ready to become an image XObject.
#[derive(Debug, Clone)]
pub struct EncodedLayer {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub filter: &'static str,
    /// `None` for stencil masks.
    pub color_space: Option<&'static str>,
    pub bits_per_component: u8,
}

/// Layers of one scanned page.
#[derive(Debug, Clone)]
pub struct MrcLayerResult {
    pub background: EncodedLayer,
    /// 1-bit stencil, full resolution. Only painted when
    /// `has_significant_text` is set.
    pub foreground_mask: EncodedLayer,
    pub ink_color: [u8; 3],
    pub has_significant_text: bool,
}

impl MrcLayerResult {
    /// Bytes this page costs once written.
    pub fn encoded_size(&self) -> usize {
        if self.has_significant_text {
            self.background.data.len() + self.foreground_mask.data.len()
        } else {
            self.background.data.len()
        }
    }
}
