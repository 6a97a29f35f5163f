// 動画: ffmpeg CLIラッパー（CRFとフレーム高さの上限をプロファイルから決める）

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use crate::config::profile::CompressionConfig;
use crate::error::CompressError;

/// Re-encodes video files with the `ffmpeg` binary.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    binary: PathBuf,
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("ffmpeg"),
        }
    }
}

impl FfmpegTranscoder {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Whether the binary can be executed at all.
    pub fn is_available(&self) -> bool {
        Command::new(&self.binary)
            .arg("-version")
            .output()
            .is_ok_and(|o| o.status.success())
    }

    /// Arguments for one transcode. The container follows `output`'s
    /// extension.
    pub fn args(&self, input: &Path, output: &Path, config: &CompressionConfig) -> Vec<String> {
        vec![
            "-y".into(),
            "-v".into(),
            "error".into(),
            "-i".into(),
            input.display().to_string(),
            "-c:v".into(),
            "libx264".into(),
            "-crf".into(),
            config.video_crf().to_string(),
            "-preset".into(),
            "medium".into(),
            // never upscale; keep width even for yuv420p
            "-vf".into(),
            format!("scale=-2:'min(ih,{})'", config.video_max_height()),
            "-c:a".into(),
            "aac".into(),
            "-b:a".into(),
            "128k".into(),
            "-movflags".into(),
            "+faststart".into(),
            output.display().to_string(),
        ]
    }

    /// Transcode `input` into `output`.
    pub fn transcode(
        &self,
        input: &Path,
        output: &Path,
        config: &CompressionConfig,
    ) -> crate::error::Result<()> {
        let args = self.args(input, output, config);
        debug!(binary = %self.binary.display(), ?args, "Running ffmpeg");

        match Command::new(&self.binary).args(&args).output() {
            Ok(result) if result.status.success() => Ok(()),
            Ok(result) => {
                let stderr = String::from_utf8_lossy(&result.stderr);
                Err(CompressError::transcode(format!(
                    "ffmpeg failed (exit code {}): {}",
                    result
                        .status
                        .code()
                        .map_or_else(|| "unknown".to_string(), |c| c.to_string()),
                    stderr.trim()
                )))
            }
            Err(e) => Err(CompressError::transcode(format!(
                "failed to execute {}: {e}",
                self.binary.display()
            ))),
        }
    }
}
