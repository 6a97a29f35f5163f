pub mod job;
pub mod merged;
pub mod profile;
pub mod settings;

use settings::Settings;
use std::path::Path;
use std::time::Duration;

/// Engine knobs that are not part of a compression profile.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineOptions {
    pub sample_pages: usize,
    pub batch_size: usize,
    pub streaming_threshold: usize,
    pub small_document_pages: usize,
    pub max_escalations: usize,
    pub progress_interval: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        let settings = Settings::default();
        EngineOptions {
            sample_pages: settings.sample_pages,
            batch_size: settings.batch_size,
            streaming_threshold: settings.streaming_threshold,
            small_document_pages: settings.small_document_pages,
            max_escalations: settings.max_escalations,
            progress_interval: Duration::from_millis(settings.progress_interval_ms),
        }
    }
}

impl EngineOptions {
    /// Pages per batch for a document of `page_count` pages. Very large
    /// documents stream one page at a time.
    pub fn effective_batch_size(&self, page_count: usize) -> usize {
        if page_count > self.streaming_threshold {
            1
        } else {
            self.batch_size.max(1)
        }
    }
}

/// ジョブファイルのパスからsettings.yamlを自動検出して読み込む。
///
/// ジョブファイルと同じディレクトリに `settings.yaml` が存在すれば読み込み、
/// 存在しなければデフォルト設定を返す。
pub fn load_settings_for_job(job_file_path: &Path) -> crate::error::Result<Settings> {
    let dir = job_file_path.parent().ok_or_else(|| {
        crate::error::CompressError::config("Cannot determine job file directory")
    })?;

    let settings_path = dir.join("settings.yaml");

    if settings_path.exists() {
        Settings::from_file(&settings_path)
    } else {
        Ok(Settings::default())
    }
}
