// 文書単位の戦略選択と、失敗時に試す戦略の順序

use serde::Serialize;
use tracing::debug;

use crate::analysis::{DocumentAnalysis, PageCategory, PageClassification};
use crate::config::EngineOptions;
use crate::config::profile::CompressionConfig;
use crate::pipeline::extractor::ExtractionMode;

/// Profiles below this quality skip document classification.
const HYBRID_QUALITY_FLOOR: f32 = 0.5;

/// Whole-document compression approach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Keep vector text pages byte-for-byte; compress scans and images.
    Digital,
    /// Split every textless page into MRC layers.
    ScannedMrc,
    /// Rasterize every page that can be rendered.
    Aggressive,
    /// Cheap page-by-page pass without document classification.
    Hybrid,
}

/// What to do with one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagePlan {
    KeepOriginal,
    Extract(ExtractionMode),
}

impl StrategyKind {
    pub fn name(self) -> &'static str {
        match self {
            StrategyKind::Digital => "digital",
            StrategyKind::ScannedMrc => "scanned_mrc",
            StrategyKind::Aggressive => "aggressive",
            StrategyKind::Hybrid => "hybrid",
        }
    }

    /// Strategy tried next when this one fails to reassemble.
    pub fn fallback(self) -> Option<StrategyKind> {
        match self {
            StrategyKind::Aggressive => None,
            _ => Some(StrategyKind::Aggressive),
        }
    }

    /// This strategy followed by its fallbacks, in order.
    pub fn chain(self) -> Vec<StrategyKind> {
        std::iter::successors(Some(self), |s| s.fallback()).collect()
    }

    pub fn plan_for(self, page: &PageClassification, config: &CompressionConfig) -> PagePlan {
        match self {
            StrategyKind::Digital => {
                if page.keeps_vector_content() {
                    PagePlan::KeepOriginal
                } else if page.category == PageCategory::Scanned {
                    if config.use_mrc {
                        PagePlan::Extract(ExtractionMode::Layers)
                    } else {
                        PagePlan::Extract(ExtractionMode::FullPage)
                    }
                } else {
                    PagePlan::Extract(ExtractionMode::Images)
                }
            }
            StrategyKind::ScannedMrc => {
                if page.keeps_vector_content() {
                    PagePlan::KeepOriginal
                } else if !page.has_any_text && !page.has_vector_forms {
                    PagePlan::Extract(ExtractionMode::Layers)
                } else {
                    PagePlan::Extract(ExtractionMode::Images)
                }
            }
            StrategyKind::Aggressive => PagePlan::Extract(ExtractionMode::FullPage),
            StrategyKind::Hybrid => {
                if page.has_any_text || page.has_vector_forms {
                    PagePlan::Extract(ExtractionMode::Images)
                } else {
                    PagePlan::Extract(ExtractionMode::FullPage)
                }
            }
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Picks one strategy per document.
#[derive(Debug, Clone)]
pub struct StrategySelector {
    small_document_pages: usize,
}

impl StrategySelector {
    pub fn new(options: &EngineOptions) -> Self {
        Self {
            small_document_pages: options.small_document_pages,
        }
    }

    /// Small documents and low-quality profiles use the hybrid pass.
    fn bypasses_classification(&self, config: &CompressionConfig, page_count: u32) -> bool {
        page_count as usize <= self.small_document_pages || config.quality < HYBRID_QUALITY_FLOOR
    }

    /// Whether [`select`](Self::select) needs a document analysis.
    pub fn needs_analysis(&self, config: &CompressionConfig, page_count: u32) -> bool {
        config.preserve_vectors && !self.bypasses_classification(config, page_count)
    }

    pub fn select(
        &self,
        config: &CompressionConfig,
        page_count: u32,
        analysis: Option<&DocumentAnalysis>,
    ) -> StrategyKind {
        let kind = if !config.preserve_vectors {
            StrategyKind::Aggressive
        } else if self.bypasses_classification(config, page_count) {
            StrategyKind::Hybrid
        } else if analysis.is_some_and(DocumentAnalysis::is_digital) || !config.use_mrc {
            StrategyKind::Digital
        } else {
            StrategyKind::ScannedMrc
        };
        debug!(
            strategy = %kind,
            profile = %config.profile,
            page_count,
            vector_ratio = analysis.map(DocumentAnalysis::vector_ratio),
            "Strategy selected"
        );
        kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::classifier::ClassifierTuning;
    use crate::config::profile::Profile;

    fn page(category: PageCategory, text: bool) -> PageClassification {
        PageClassification {
            page_index: 0,
            category,
            has_vector_text_layer: text,
            has_any_text: text,
            has_vector_forms: false,
            estimated_raster_ratio: 0.0,
            vector_signal: 0.0,
            text_length: if text { 500 } else { 0 },
            is_blank: false,
        }
    }

    fn analysis(text_pages: u32, scan_pages: u32) -> DocumentAnalysis {
        let pages = (0..text_pages + scan_pages)
            .map(|i| {
                let mut p = if i < text_pages {
                    page(PageCategory::MainlyText, true)
                } else {
                    page(PageCategory::Scanned, false)
                };
                p.page_index = i;
                p
            })
            .collect();
        DocumentAnalysis::new(text_pages + scan_pages, pages, vec![], &ClassifierTuning::default())
    }

    fn selector() -> StrategySelector {
        StrategySelector::new(&EngineOptions::default())
    }

    #[test]
    fn test_mostly_text_document_is_digital() {
        let a = analysis(15, 5);
        let kind = selector().select(&Profile::Balanced.config(), 20, Some(&a));
        assert_eq!(kind, StrategyKind::Digital);
    }

    #[test]
    fn test_mostly_scanned_document_uses_mrc() {
        let a = analysis(2, 18);
        let kind = selector().select(&Profile::High.config(), 20, Some(&a));
        assert_eq!(kind, StrategyKind::ScannedMrc);
    }

    #[test]
    fn test_small_document_uses_hybrid() {
        let s = selector();
        assert!(!s.needs_analysis(&Profile::High.config(), 1));
        assert_eq!(s.select(&Profile::High.config(), 1, None), StrategyKind::Hybrid);
    }

    #[test]
    fn test_low_quality_profile_uses_hybrid() {
        let s = selector();
        assert_eq!(s.select(&Profile::Compact.config(), 40, None), StrategyKind::Hybrid);
    }

    #[test]
    fn test_vectors_not_preserved_is_aggressive() {
        let s = selector();
        assert!(!s.needs_analysis(&Profile::Minimum.config(), 40));
        assert_eq!(s.select(&Profile::Minimum.config(), 40, None), StrategyKind::Aggressive);
    }

    #[test]
    fn test_chain_ends_in_aggressive() {
        assert_eq!(
            StrategyKind::Digital.chain(),
            vec![StrategyKind::Digital, StrategyKind::Aggressive]
        );
        assert_eq!(StrategyKind::Aggressive.chain(), vec![StrategyKind::Aggressive]);
    }

    #[test]
    fn test_digital_plan_keeps_text_and_layers_scans() {
        let cfg = Profile::Balanced.config();
        assert_eq!(
            StrategyKind::Digital.plan_for(&page(PageCategory::MainlyText, true), &cfg),
            PagePlan::KeepOriginal
        );
        assert_eq!(
            StrategyKind::Digital.plan_for(&page(PageCategory::Scanned, false), &cfg),
            PagePlan::Extract(ExtractionMode::Layers)
        );
        assert_eq!(
            StrategyKind::Digital.plan_for(&page(PageCategory::Mixed, true), &cfg),
            PagePlan::Extract(ExtractionMode::Images)
        );
    }

    #[test]
    fn test_hybrid_plan_never_rasterizes_text() {
        let cfg = Profile::Compact.config();
        assert_eq!(
            StrategyKind::Hybrid.plan_for(&page(PageCategory::MainlyText, true), &cfg),
            PagePlan::Extract(ExtractionMode::Images)
        );
        assert_eq!(
            StrategyKind::Hybrid.plan_for(&page(PageCategory::Scanned, false), &cfg),
            PagePlan::Extract(ExtractionMode::FullPage)
        );
    }

    #[test]
    fn test_pages_with_vector_forms_are_not_rasterized_whole() {
        let cfg = Profile::Compact.config();
        let mut stamped = page(PageCategory::MainlyImage, false);
        stamped.has_vector_forms = true;
        assert_eq!(
            StrategyKind::Hybrid.plan_for(&stamped, &cfg),
            PagePlan::Extract(ExtractionMode::Images)
        );
        assert_eq!(
            StrategyKind::ScannedMrc.plan_for(&stamped, &cfg),
            PagePlan::Extract(ExtractionMode::Images)
        );
    }
}
