use std::path::Path;

use serde::Deserialize;

use super::profile::Profile;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub profile: Profile,
    /// Pages inspected by the classifier on large documents.
    pub sample_pages: usize,
    /// Pages processed between memory checkpoints.
    pub batch_size: usize,
    /// Page count above which pages are processed one at a time.
    pub streaming_threshold: usize,
    /// Documents with at most this many pages skip full classification.
    pub small_document_pages: usize,
    pub parallel_workers: usize,
    /// Retries the guarantee supervisor may spend after the first attempt.
    pub max_escalations: usize,
    pub progress_interval_ms: u64,
    pub text_threshold: Option<usize>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            profile: Profile::Balanced,
            sample_pages: 50,
            batch_size: 10,
            streaming_threshold: 200,
            small_document_pages: 2,
            parallel_workers: 0,
            max_escalations: 3,
            progress_interval_ms: 100,
            text_threshold: None,
        }
    }
}

impl Settings {
    pub fn from_yaml(yaml: &str) -> crate::error::Result<Self> {
        serde_yml::from_str(yaml).map_err(|e| {
            crate::error::CompressError::config(format!("Failed to parse settings YAML: {e}"))
        })
    }

    pub fn from_file(path: &Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }
}
