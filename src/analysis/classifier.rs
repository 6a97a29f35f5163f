// ページ分類: コンテンツストリーム統計 + ページ構造 -> PageClassification

use tracing::{debug, instrument, warn};

use crate::analysis::{DocumentAnalysis, PageCategory, PageClassification};
use crate::pdf::content_stream::BBox;
use crate::pdf::reader::{PageFacts, SourceDocument};

/// Heuristic weights for the structural vector signal.
///
/// The signal is a score in 0..=1 built from proxies for CAD and vector
/// drawings. None of these values are derived; they are starting points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassifierTuning {
    /// Score per annotation.
    pub annotation_weight: f64,
    /// Annotations counted at most this many times.
    pub annotation_cap: usize,
    /// Score for a TrimBox that differs from the MediaBox.
    pub trim_box_weight: f64,
    /// Score for a page with non-zero /Rotate.
    pub rotation_weight: f64,
    /// Score reached when the page has `path_ops_saturation` painting ops.
    pub path_weight: f64,
    pub path_ops_saturation: usize,
    /// Pages scoring at least this much count as vector-heavy.
    pub vector_signal_threshold: f64,
    /// Image coverage above which a textless page counts as a scan.
    pub scan_raster_ratio: f64,
}

impl Default for ClassifierTuning {
    fn default() -> Self {
        Self {
            annotation_weight: 0.1,
            annotation_cap: 5,
            trim_box_weight: 0.3,
            rotation_weight: 0.2,
            path_weight: 0.6,
            path_ops_saturation: 40,
            vector_signal_threshold: 0.5,
            scan_raster_ratio: 0.85,
        }
    }
}

/// Stateless page classifier. Constructed per run.
pub struct Classifier {
    text_threshold: usize,
    tuning: ClassifierTuning,
}

impl Classifier {
    pub fn new(text_threshold: usize) -> Self {
        Self::with_tuning(text_threshold, ClassifierTuning::default())
    }

    pub fn with_tuning(text_threshold: usize, tuning: ClassifierTuning) -> Self {
        Self {
            text_threshold,
            tuning,
        }
    }

    pub fn tuning(&self) -> &ClassifierTuning {
        &self.tuning
    }

    /// Classify up to `sample_cap` evenly spaced pages.
    ///
    /// Pages that fail to load are logged and left out of the result.
    #[instrument(skip_all, fields(pages = doc.page_count(), sample_cap = sample_cap))]
    pub fn classify(&self, doc: &SourceDocument, sample_cap: usize) -> DocumentAnalysis {
        let page_count = doc.page_count();
        let sampled = sample_indices(page_count, sample_cap);

        let mut classifications = Vec::with_capacity(sampled.len());
        let mut failed_pages = Vec::new();
        for page_index in sampled {
            match self.classify_page(doc, page_index) {
                Ok(c) => classifications.push(c),
                Err(e) => {
                    warn!(page_index, error = %e, "Page excluded from classification");
                    failed_pages.push(page_index);
                }
            }
        }

        let analysis =
            DocumentAnalysis::new(page_count, classifications, failed_pages, &self.tuning);
        debug!(
            classified = analysis.classifications().len(),
            vector_ratio = analysis.vector_ratio(),
            is_digital = analysis.is_digital(),
            "Document classified"
        );
        analysis
    }

    /// Classify one page (0-indexed).
    pub fn classify_page(
        &self,
        doc: &SourceDocument,
        page_index: u32,
    ) -> crate::error::Result<PageClassification> {
        let facts = doc.page_facts(page_index)?;
        let stats = doc.page_content_stats(page_index)?;
        let images = doc.page_image_xobjects(page_index)?;

        let image_boxes: Vec<BBox> = stats
            .placements
            .iter()
            .filter(|p| images.contains_key(&p.name))
            .map(|p| p.bbox)
            .collect();
        let raster_ratio = raster_ratio(&facts.media_box, &image_boxes);
        let vector_signal = self.vector_signal(&facts, stats.path_paint_ops);

        let text_length = stats.visible_chars;
        let category = if text_length >= self.text_threshold {
            PageCategory::MainlyText
        } else if vector_signal < self.tuning.vector_signal_threshold {
            if raster_ratio >= self.tuning.scan_raster_ratio && !stats.has_text() {
                PageCategory::Scanned
            } else {
                PageCategory::MainlyImage
            }
        } else {
            PageCategory::Mixed
        };

        Ok(PageClassification {
            page_index,
            category,
            has_vector_text_layer: stats.has_visible_text(),
            has_any_text: stats.has_text(),
            has_vector_forms: stats.has_vector_forms(),
            estimated_raster_ratio: raster_ratio,
            vector_signal,
            text_length,
            is_blank: stats.operator_count == 0 && facts.annotation_count == 0,
        })
    }

    fn vector_signal(&self, facts: &PageFacts, path_paint_ops: usize) -> f64 {
        let t = &self.tuning;
        let mut score = facts.annotation_count.min(t.annotation_cap) as f64 * t.annotation_weight;
        if facts.has_distinct_trim_box() {
            score += t.trim_box_weight;
        }
        if facts.rotation != 0 {
            score += t.rotation_weight;
        }
        if t.path_ops_saturation > 0 {
            let saturation = (path_paint_ops as f64 / t.path_ops_saturation as f64).min(1.0);
            score += saturation * t.path_weight;
        }
        score.min(1.0)
    }
}

/// Evenly spaced page indices, at most `cap` of them, in ascending order.
pub fn sample_indices(page_count: u32, cap: usize) -> Vec<u32> {
    let n = page_count as usize;
    if cap == 0 || n <= cap {
        return (0..page_count).collect();
    }
    (0..cap).map(|i| (i * n / cap) as u32).collect()
}

/// Share of the page covered by images, clipped to the page and to 1.0.
fn raster_ratio(media_box: &BBox, image_boxes: &[BBox]) -> f64 {
    let page_area = media_box.area();
    if page_area <= 0.0 {
        return 0.0;
    }
    let covered: f64 = image_boxes
        .iter()
        .filter_map(|b| b.intersect(media_box))
        .map(|b| b.area())
        .sum();
    (covered / page_area).clamp(0.0, 1.0)
}
