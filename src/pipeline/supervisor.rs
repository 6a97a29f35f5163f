// 圧縮保証: 出力が入力より厳密に小さい場合だけ成功とし、それ以外はプロファイルを上げて再試行する

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::config::profile::{CompressionConfig, Profile};
use crate::error::CompressError;

/// Reason given when no attempt produced a smaller file.
pub const ALREADY_OPTIMIZED: &str = "already optimized";

/// Final result of one compression call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CompressionOutcome {
    /// `compressed_size < original_size` always holds.
    Success {
        output: PathBuf,
        original_size: u64,
        compressed_size: u64,
        profile: Profile,
        strategy: String,
    },
    /// Nothing was written to the output path.
    Skipped { reason: String, input_size: u64 },
}

impl CompressionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CompressionOutcome::Success { .. })
    }
}

/// What one attempt left at its candidate path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptResult {
    /// A candidate file was written by `strategy`.
    Written { strategy: String },
    /// Nothing in the source could be made smaller; no file was written.
    Unchanged,
}

/// Runs attempts with increasingly aggressive configurations until one
/// produces a strictly smaller file.
#[derive(Debug, Clone)]
pub struct GuaranteeSupervisor {
    max_escalations: usize,
}

impl GuaranteeSupervisor {
    pub fn new(max_escalations: usize) -> Self {
        Self { max_escalations }
    }

    /// `initial` followed by each more aggressive profile, at most
    /// `max_escalations` of them. The caller's text threshold is kept.
    pub fn ladder(&self, initial: CompressionConfig) -> Vec<CompressionConfig> {
        let mut ladder = vec![initial];
        let mut profile = initial.profile;
        while ladder.len() <= self.max_escalations {
            let Some(next) = profile.escalate() else {
                break;
            };
            profile = next;
            ladder.push(next.config().with_text_threshold(initial.text_threshold));
        }
        ladder
    }

    /// Run `attempt` for each rung of the ladder.
    ///
    /// Each attempt writes to its own candidate path in a staging directory
    /// next to `output`. The first candidate strictly smaller than
    /// `original_size` is renamed onto `output`; the rest are discarded with
    /// the staging directory. Errors from `attempt` end the run.
    #[instrument(skip_all, fields(output = %output.display(), original_size = original_size))]
    pub fn run<F>(
        &self,
        original_size: u64,
        initial: CompressionConfig,
        output: &Path,
        mut attempt: F,
    ) -> crate::error::Result<CompressionOutcome>
    where
        F: FnMut(&CompressionConfig, &Path, usize) -> crate::error::Result<AttemptResult>,
    {
        let ladder = self.ladder(initial);
        let staging = staging_dir(output)?;
        let extension = output
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("tmp");

        for (index, config) in ladder.iter().enumerate() {
            let candidate = staging.path().join(format!("attempt-{index}.{extension}"));
            let strategy = match attempt(config, &candidate, index)? {
                AttemptResult::Written { strategy } => strategy,
                AttemptResult::Unchanged => {
                    debug!(profile = %config.profile, "Attempt changed nothing");
                    continue;
                }
            };

            let compressed_size = std::fs::metadata(&candidate)?.len();
            if compressed_size >= original_size {
                debug!(
                    profile = %config.profile,
                    %strategy,
                    compressed_size,
                    "Attempt did not shrink the input"
                );
                continue;
            }

            std::fs::rename(&candidate, output).map_err(|e| {
                CompressError::save(format!("moving result to {}: {}", output.display(), e))
            })?;
            info!(
                profile = %config.profile,
                %strategy,
                original_size,
                compressed_size,
                attempts = index + 1,
                "Compressed"
            );
            return Ok(CompressionOutcome::Success {
                output: output.to_path_buf(),
                original_size,
                compressed_size,
                profile: config.profile,
                strategy,
            });
        }

        info!(attempts = ladder.len(), "No attempt shrank the input");
        Ok(CompressionOutcome::Skipped {
            reason: ALREADY_OPTIMIZED.to_string(),
            input_size: original_size,
        })
    }

    /// Number of attempts `run` makes at most for `initial`.
    pub fn attempt_count(&self, initial: CompressionConfig) -> usize {
        self.ladder(initial).len()
    }
}

/// Staging directory beside `output`, so the final rename stays on one
/// filesystem.
fn staging_dir(output: &Path) -> crate::error::Result<tempfile::TempDir> {
    let parent = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    tempfile::Builder::new()
        .prefix(".pdf_shrink")
        .tempdir_in(parent)
        .map_err(|e| CompressError::save(format!("cannot stage in {}: {}", parent.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path, len: usize) {
        std::fs::write(path, vec![b'x'; len]).expect("write candidate");
    }

    #[test]
    fn test_ladder_escalates_strictly() {
        let supervisor = GuaranteeSupervisor::new(3);
        let initial = Profile::High.config().with_text_threshold(42);
        let ladder = supervisor.ladder(initial);

        assert_eq!(ladder.len(), 4);
        for pair in ladder.windows(2) {
            assert!(pair[1].is_more_aggressive_than(&pair[0]));
        }
        assert!(ladder.iter().all(|c| c.text_threshold == 42));
    }

    #[test]
    fn test_ladder_is_bounded() {
        assert_eq!(GuaranteeSupervisor::new(1).ladder(Profile::High.config()).len(), 2);
        assert_eq!(GuaranteeSupervisor::new(3).ladder(Profile::Minimum.config()).len(), 1);
    }

    #[test]
    fn test_first_smaller_candidate_wins() {
        let dir = tempfile::tempdir().expect("tempdir");
        let output = dir.path().join("out.pdf");
        let supervisor = GuaranteeSupervisor::new(3);

        let mut seen = Vec::new();
        let outcome = supervisor
            .run(100, Profile::High.config(), &output, |config, candidate, _| {
                seen.push(config.profile);
                // High is too big, Balanced shrinks.
                let len = if config.profile == Profile::High { 120 } else { 60 };
                write(candidate, len);
                Ok(AttemptResult::Written {
                    strategy: "digital".to_string(),
                })
            })
            .expect("run");

        assert_eq!(seen, vec![Profile::High, Profile::Balanced]);
        match outcome {
            CompressionOutcome::Success {
                compressed_size,
                profile,
                ..
            } => {
                assert_eq!(compressed_size, 60);
                assert_eq!(profile, Profile::Balanced);
            }
            other => panic!("expected success, got {other:?}"),
        }
        assert_eq!(std::fs::metadata(&output).expect("output").len(), 60);
    }

    #[test]
    fn test_equal_size_is_skipped_and_output_untouched() {
        let dir = tempfile::tempdir().expect("tempdir");
        let output = dir.path().join("out.pdf");
        let supervisor = GuaranteeSupervisor::new(3);

        let mut calls = 0;
        let outcome = supervisor
            .run(100, Profile::High.config(), &output, |_, candidate, _| {
                calls += 1;
                write(candidate, 100);
                Ok(AttemptResult::Written {
                    strategy: "hybrid".to_string(),
                })
            })
            .expect("run");

        assert_eq!(calls, 4);
        assert_eq!(
            outcome,
            CompressionOutcome::Skipped {
                reason: ALREADY_OPTIMIZED.to_string(),
                input_size: 100,
            }
        );
        assert!(!output.exists());
        // staging directory is gone
        let leftovers: Vec<_> = std::fs::read_dir(dir.path()).expect("read_dir").collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_unchanged_attempts_are_skipped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let output = dir.path().join("out.pdf");
        let outcome = GuaranteeSupervisor::new(2)
            .run(100, Profile::Balanced.config(), &output, |_, _, _| {
                Ok(AttemptResult::Unchanged)
            })
            .expect("run");
        assert!(!outcome.is_success());
    }

    #[test]
    fn test_attempt_error_propagates() {
        let dir = tempfile::tempdir().expect("tempdir");
        let output = dir.path().join("out.pdf");
        let err = GuaranteeSupervisor::new(2)
            .run(100, Profile::Balanced.config(), &output, |_, _, _| {
                Err(CompressError::Cancelled)
            })
            .expect_err("cancelled");
        assert!(matches!(err, CompressError::Cancelled));
        assert!(!output.exists());
    }
}
