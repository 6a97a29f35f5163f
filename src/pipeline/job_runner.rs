// ジョブ単位: 入力判定 -> (PDF) 分類 -> 戦略チェーン -> ページ処理 -> 組立、を圧縮保証の下で実行

use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};

use crate::analysis::DocumentAnalysis;
use crate::analysis::classifier::Classifier;
use crate::config::EngineOptions;
use crate::config::profile::CompressionConfig;
use crate::error::CompressError;
use crate::media::MediaKind;
use crate::media::video::FfmpegTranscoder;
use crate::pdf::reader::SourceDocument;
use crate::pipeline::cancel::CancellationToken;
use crate::pipeline::extractor::AssetExtractor;
use crate::pipeline::page_processor::process_page;
use crate::pipeline::progress::{ProgressReporter, Stage};
use crate::pipeline::reassembler::Reassembler;
use crate::pipeline::strategy::{StrategyKind, StrategySelector};
use crate::pipeline::supervisor::{AttemptResult, CompressionOutcome, GuaranteeSupervisor};
use crate::render::{PageRenderer, default_renderer};

/// Configuration for a single job.
#[derive(Debug, Clone)]
pub struct JobConfig {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub compression: CompressionConfig,
    pub engine: EngineOptions,
}

/// Result of processing a single job.
#[derive(Debug, Clone)]
pub struct JobResult {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub outcome: CompressionOutcome,
}

/// Run one job with a fresh cancellation token, logging progress at debug
/// level.
pub fn run_job(job: &JobConfig) -> crate::error::Result<JobResult> {
    let mut sink = |stage: Stage, fraction: f64| {
        debug!(input = %job.input_path.display(), ?stage, fraction, "Progress");
    };
    let mut progress = ProgressReporter::new(&mut sink, job.engine.progress_interval);
    let outcome = compress(
        &job.input_path,
        &job.output_path,
        job.compression,
        &job.engine,
        &CancellationToken::new(),
        &mut progress,
    )?;
    Ok(JobResult {
        input_path: job.input_path.clone(),
        output_path: job.output_path.clone(),
        outcome,
    })
}

/// Compress `source` into `output`.
///
/// The source is only read. `output` is written only on `Success`, and
/// only with a file strictly smaller than the source. PDF pages are drawn
/// by the best renderer available for this build.
pub fn compress(
    source: &Path,
    output: &Path,
    config: CompressionConfig,
    options: &EngineOptions,
    cancel: &CancellationToken,
    progress: &mut ProgressReporter<'_>,
) -> crate::error::Result<CompressionOutcome> {
    let renderer = default_renderer(source);
    compress_with_renderer(source, output, config, options, renderer.as_ref(), cancel, progress)
}

/// [`compress`] with an explicit page renderer.
#[instrument(skip_all, fields(source = %source.display(), profile = %config.profile))]
pub fn compress_with_renderer(
    source: &Path,
    output: &Path,
    config: CompressionConfig,
    options: &EngineOptions,
    renderer: &dyn PageRenderer,
    cancel: &CancellationToken,
    progress: &mut ProgressReporter<'_>,
) -> crate::error::Result<CompressionOutcome> {
    progress.report(Stage::Preparing, 0.0);
    cancel.check()?;
    reject_same_path(source, output)?;

    let bytes = std::fs::read(source)?;
    if bytes.is_empty() {
        return Err(CompressError::EmptyInput);
    }
    let kind = MediaKind::detect(&bytes, source)?;
    let original_size = bytes.len() as u64;
    info!(?kind, original_size, "Compressing");

    let supervisor = GuaranteeSupervisor::new(options.max_escalations);
    let outcome = match kind {
        MediaKind::Pdf => {
            let doc = SourceDocument::from_bytes(&bytes)?;
            drop(bytes);
            progress.report(Stage::Preparing, 1.0);
            let mut job = PdfJob {
                doc: &doc,
                options,
                renderer,
                cancel,
                classifier: Classifier::new(config.text_threshold),
                selector: StrategySelector::new(options),
                analysis: None,
            };
            let attempts = supervisor.attempt_count(config);
            supervisor.run(original_size, config, output, |cfg, candidate, attempt| {
                let range = attempt_range(attempt, attempts);
                job.attempt(cfg, candidate, range, progress)
            })?
        }
        MediaKind::Image => {
            progress.report(Stage::Preparing, 1.0);
            let attempts = supervisor.attempt_count(config);
            supervisor.run(original_size, config, output, |cfg, candidate, attempt| {
                cancel.check()?;
                let (start, end) = attempt_range(attempt, attempts);
                progress.report(Stage::Optimizing, start);
                let result = crate::media::image::compress_image(&bytes, cfg, candidate)?;
                progress.report(Stage::Optimizing, end);
                Ok(result)
            })?
        }
        MediaKind::Video => {
            drop(bytes);
            progress.report(Stage::Preparing, 1.0);
            let transcoder = FfmpegTranscoder::default();
            let attempts = supervisor.attempt_count(config);
            supervisor.run(original_size, config, output, |cfg, candidate, attempt| {
                cancel.check()?;
                let (start, end) = attempt_range(attempt, attempts);
                progress.report(Stage::Optimizing, start);
                transcoder.transcode(source, candidate, cfg)?;
                progress.report(Stage::Optimizing, end);
                Ok(AttemptResult::Written {
                    strategy: "video_transcode".to_string(),
                })
            })?
        }
    };

    progress.finish();
    Ok(outcome)
}

/// Share of the Optimizing stage given to attempt `attempt` of `attempts`.
fn attempt_range(attempt: usize, attempts: usize) -> (f64, f64) {
    let n = attempts.max(1) as f64;
    (attempt as f64 / n, (attempt + 1) as f64 / n)
}

/// The output must never replace the source.
fn reject_same_path(source: &Path, output: &Path) -> crate::error::Result<()> {
    let same = match (std::fs::canonicalize(source), std::fs::canonicalize(output)) {
        (Ok(a), Ok(b)) => a == b,
        _ => source == output,
    };
    if same {
        return Err(CompressError::invalid_input(format!(
            "output must differ from input: {}",
            source.display()
        )));
    }
    Ok(())
}

/// State shared by every attempt on one PDF.
struct PdfJob<'a> {
    doc: &'a SourceDocument,
    options: &'a EngineOptions,
    renderer: &'a dyn PageRenderer,
    cancel: &'a CancellationToken,
    classifier: Classifier,
    selector: StrategySelector,
    /// Computed on first use; escalation keeps the text threshold, so one
    /// analysis serves every attempt.
    analysis: Option<DocumentAnalysis>,
}

impl PdfJob<'_> {
    fn attempt(
        &mut self,
        config: &CompressionConfig,
        candidate: &Path,
        range: (f64, f64),
        progress: &mut ProgressReporter<'_>,
    ) -> crate::error::Result<AttemptResult> {
        self.cancel.check()?;
        let page_count = self.doc.page_count();

        if self.selector.needs_analysis(config, page_count) && self.analysis.is_none() {
            progress.report(Stage::Analyzing, 0.0);
            let analysis = self.classifier.classify(self.doc, self.options.sample_pages);
            if analysis.classifications().is_empty() {
                return Err(CompressError::invalid_input("no page could be read"));
            }
            self.analysis = Some(analysis);
            progress.report(Stage::Analyzing, 1.0);
        }
        let analysis = if self.selector.needs_analysis(config, page_count) {
            self.analysis.as_ref()
        } else {
            None
        };

        let strategy = self.selector.select(config, page_count, analysis);
        let mut last_error = None;
        for kind in strategy.chain() {
            match self.run_strategy(kind, config, analysis, candidate, range, progress) {
                Ok(result) => return Ok(result),
                Err(e) if e.is_reassembly() => {
                    warn!(strategy = %kind, error = %e, "Strategy failed to reassemble, falling back");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_error.unwrap_or_else(|| CompressError::unknown("empty strategy chain")))
    }

    /// One pass over every page with `kind`, writing `candidate`.
    fn run_strategy(
        &self,
        kind: StrategyKind,
        config: &CompressionConfig,
        analysis: Option<&DocumentAnalysis>,
        candidate: &Path,
        (start, end): (f64, f64),
        progress: &mut ProgressReporter<'_>,
    ) -> crate::error::Result<AttemptResult> {
        let doc = self.doc;
        let page_count = doc.page_count();
        let extractor = AssetExtractor::new(*config, self.renderer);
        let mut reassembler = Reassembler::new(doc);
        let batch_size = self.options.effective_batch_size(page_count as usize);
        debug!(strategy = %kind, batch_size, renderer = self.renderer.name(), "Running strategy");

        let pages: Vec<u32> = (0..page_count).collect();
        let mut unreadable = 0usize;
        let mut done = 0usize;
        for batch in pages.chunks(batch_size) {
            for &page_index in batch {
                self.cancel.check()?;

                let lazily_classified;
                let classification = match analysis.and_then(|a| a.get(page_index)) {
                    Some(c) => Some(c),
                    None if analysis.is_some_and(|a| a.failed_pages().contains(&page_index)) => None,
                    None => {
                        lazily_classified = match self.classifier.classify_page(doc, page_index) {
                            Ok(c) => Some(c),
                            Err(e) => {
                                warn!(page_index, error = %e, "Page could not be read");
                                None
                            }
                        };
                        lazily_classified.as_ref()
                    }
                };
                if classification.is_none() {
                    unreadable += 1;
                }

                let page = process_page(doc, page_index, classification, kind, config, &extractor);
                reassembler.apply(page)?;

                done += 1;
                let fraction = done as f64 / (page_count as f64 + 1.0);
                progress.report(Stage::Optimizing, start + (end - start) * fraction);
            }
            let released = reassembler.checkpoint();
            debug!(pages_done = done, released, "Batch applied");
        }

        if unreadable == page_count as usize {
            return Err(CompressError::invalid_input("no page could be read"));
        }
        if !reassembler.has_changes() {
            progress.report(Stage::Optimizing, end);
            return Ok(AttemptResult::Unchanged);
        }

        let report = reassembler.finish(candidate)?;
        progress.report(Stage::Optimizing, end);
        debug!(
            strategy = %kind,
            bytes = report.bytes_written,
            pages_rebuilt = report.pages_rebuilt,
            images_replaced = report.images_replaced,
            "Candidate written"
        );
        Ok(AttemptResult::Written {
            strategy: kind.name().to_string(),
        })
    }
}
