pub mod classifier;

use serde::Serialize;

use classifier::ClassifierTuning;

/// What dominates a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PageCategory {
    MainlyText,
    MainlyImage,
    Mixed,
    /// A full-page image with no text at all.
    Scanned,
}

/// Classification of one page. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageClassification {
    pub page_index: u32,
    pub category: PageCategory,
    /// The page shows real (visible) text.
    pub has_vector_text_layer: bool,
    /// Any text at all, including invisible OCR layers.
    pub has_any_text: bool,
    /// A drawn form XObject paints text or paths.
    pub has_vector_forms: bool,
    /// Share of the page area covered by images, 0..=1.
    pub estimated_raster_ratio: f64,
    /// Structural vector-drawing score, 0..=1.
    pub vector_signal: f64,
    /// Visible characters shown on the page.
    pub text_length: usize,
    /// No content operators and no annotations.
    pub is_blank: bool,
}

impl PageClassification {
    /// Text pages with a real text layer are copied unmodified.
    pub fn keeps_vector_content(&self) -> bool {
        self.category == PageCategory::MainlyText && self.has_vector_text_layer
    }
}

/// Classifier output for one document.
#[derive(Debug, Clone)]
pub struct DocumentAnalysis {
    page_count: u32,
    classifications: Vec<PageClassification>,
    failed_pages: Vec<u32>,
    vector_ratio: f64,
}

impl DocumentAnalysis {
    pub(crate) fn new(
        page_count: u32,
        mut classifications: Vec<PageClassification>,
        failed_pages: Vec<u32>,
        tuning: &ClassifierTuning,
    ) -> Self {
        classifications.sort_by_key(|c| c.page_index);
        let vector_heavy = classifications
            .iter()
            .filter(|c| {
                c.category == PageCategory::MainlyText
                    || c.vector_signal >= tuning.vector_signal_threshold
            })
            .count();
        let vector_ratio = if classifications.is_empty() {
            0.0
        } else {
            vector_heavy as f64 / classifications.len() as f64
        };
        Self {
            page_count,
            classifications,
            failed_pages,
            vector_ratio,
        }
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    /// Sampled classifications in page order.
    pub fn classifications(&self) -> &[PageClassification] {
        &self.classifications
    }

    /// Sampled pages that could not be classified.
    pub fn failed_pages(&self) -> &[u32] {
        &self.failed_pages
    }

    pub fn get(&self, page_index: u32) -> Option<&PageClassification> {
        self.classifications
            .binary_search_by_key(&page_index, |c| c.page_index)
            .ok()
            .map(|i| &self.classifications[i])
    }

    /// Share of classified pages that are vector-heavy.
    pub fn vector_ratio(&self) -> f64 {
        self.vector_ratio
    }

    /// More than half of the classified pages are vector-heavy.
    pub fn is_digital(&self) -> bool {
        self.vector_ratio > 0.5
    }

    pub fn count(&self, category: PageCategory) -> usize {
        self.classifications
            .iter()
            .filter(|c| c.category == category)
            .count()
    }
}
