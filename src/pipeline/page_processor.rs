// ページ単位処理: 分類 -> 戦略ごとの処理方針 -> アセット抽出

use tracing::{debug, warn};

use crate::analysis::PageClassification;
use crate::config::profile::CompressionConfig;
use crate::pdf::reader::SourceDocument;
use crate::pipeline::extractor::{AssetExtractor, ExtractedAsset};
use crate::pipeline::strategy::{PagePlan, StrategyKind};

/// What the reassembler does with one page.
#[derive(Debug)]
pub enum PageDecision {
    /// Copy the page unmodified.
    Original,
    /// Substitute the compressed assets.
    Replace(Vec<ExtractedAsset>),
    /// Drop the page. Only for pages with no content at all.
    Drop,
}

/// Single page processing result.
#[derive(Debug)]
pub struct ProcessedPage {
    pub page_index: u32,
    pub decision: PageDecision,
}

impl ProcessedPage {
    pub fn original(page_index: u32) -> Self {
        Self {
            page_index,
            decision: PageDecision::Original,
        }
    }
}

/// Decide and extract one page.
///
/// A page without a classification (it failed to load) is kept as-is, as
/// is any page whose extraction produced nothing.
pub fn process_page(
    doc: &SourceDocument,
    page_index: u32,
    classification: Option<&PageClassification>,
    strategy: StrategyKind,
    config: &CompressionConfig,
    extractor: &AssetExtractor<'_>,
) -> ProcessedPage {
    let Some(classification) = classification else {
        warn!(page_index, "Page has no classification, keeping original");
        return ProcessedPage::original(page_index);
    };

    if classification.is_blank {
        debug!(page_index, "Page is empty");
        return ProcessedPage {
            page_index,
            decision: PageDecision::Drop,
        };
    }

    match strategy.plan_for(classification, config) {
        PagePlan::KeepOriginal => ProcessedPage::original(page_index),
        PagePlan::Extract(mode) => {
            let assets = extractor.extract_assets(doc, classification, mode);
            if assets.is_empty() {
                debug!(page_index, ?mode, "Nothing to gain, keeping original");
                ProcessedPage::original(page_index)
            } else {
                ProcessedPage {
                    page_index,
                    decision: PageDecision::Replace(assets),
                }
            }
        }
    }
}
