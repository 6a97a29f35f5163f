use std::time::Duration;

use super::EngineOptions;
use super::job::Job;
use super::profile::CompressionConfig;
use super::settings::Settings;

#[derive(Debug, Clone)]
pub struct MergedConfig {
    pub compression: CompressionConfig,
    pub engine: EngineOptions,
    pub parallel_workers: usize,
}

impl MergedConfig {
    /// JobのOption値がSomeならJobの値を、NoneならSettingsの値を使用する。
    pub fn new(settings: &Settings, job: &Job) -> Self {
        let profile = job.profile.unwrap_or(settings.profile);
        let mut compression = profile.config();
        if let Some(threshold) = job.text_threshold.or(settings.text_threshold) {
            compression = compression.with_text_threshold(threshold);
        }

        MergedConfig {
            compression,
            engine: EngineOptions {
                sample_pages: settings.sample_pages.max(1),
                batch_size: settings.batch_size.max(1),
                streaming_threshold: settings.streaming_threshold,
                small_document_pages: settings.small_document_pages,
                max_escalations: settings.max_escalations,
                progress_interval: Duration::from_millis(settings.progress_interval_ms),
            },
            parallel_workers: settings.parallel_workers,
        }
    }
}
