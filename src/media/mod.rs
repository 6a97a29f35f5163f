// 入力ファイルの種類判定（PDF / 静止画 / 動画）

pub mod image;
pub mod video;

use std::path::Path;

use serde::Serialize;

use crate::error::CompressError;

/// Video container extensions handed to ffmpeg.
const VIDEO_EXTENSIONS: [&str; 8] = ["mp4", "mov", "m4v", "mkv", "webm", "avi", "3gp", "wmv"];

/// How a source file is compressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Pdf,
    Image,
    Video,
}

impl MediaKind {
    /// Detect the kind from the leading bytes, falling back to the
    /// extension for video containers.
    pub fn detect(bytes: &[u8], path: &Path) -> crate::error::Result<Self> {
        // PDF readers accept junk before the header within the first 1 KiB
        let head = &bytes[..bytes.len().min(1024)];
        if head.windows(5).any(|w| w == b"%PDF-") {
            return Ok(MediaKind::Pdf);
        }
        if ::image::guess_format(bytes).is_ok() {
            return Ok(MediaKind::Image);
        }

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match extension {
            Some(ext) if VIDEO_EXTENSIONS.contains(&ext.as_str()) => Ok(MediaKind::Video),
            _ => Err(CompressError::invalid_input(format!(
                "unsupported file type: {}",
                path.display()
            ))),
        }
    }
}
