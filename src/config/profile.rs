// Named compression profiles and the single profile -> parameter lookup table.

use serde::{Deserialize, Serialize};

/// Named configuration profiles, ordered from gentlest to most aggressive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    High,
    Balanced,
    Compact,
    Minimum,
}

/// Parameters for one compression run. Immutable once built.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompressionConfig {
    pub profile: Profile,
    /// Encoder quality in 0..=1.
    pub quality: f32,
    pub target_resolution_dpi: u32,
    pub use_mrc: bool,
    pub preserve_vectors: bool,
    /// Minimum number of shown characters for a page to count as text.
    pub text_threshold: usize,
}

pub const DEFAULT_TEXT_THRESHOLD: usize = 100;

/// Each row is strictly lower in quality and resolution than the row above.
const PROFILE_TABLE: [CompressionConfig; 4] = [
    CompressionConfig {
        profile: Profile::High,
        quality: 0.80,
        target_resolution_dpi: 200,
        use_mrc: true,
        preserve_vectors: true,
        text_threshold: DEFAULT_TEXT_THRESHOLD,
    },
    CompressionConfig {
        profile: Profile::Balanced,
        quality: 0.65,
        target_resolution_dpi: 150,
        use_mrc: true,
        preserve_vectors: true,
        text_threshold: DEFAULT_TEXT_THRESHOLD,
    },
    CompressionConfig {
        profile: Profile::Compact,
        quality: 0.45,
        target_resolution_dpi: 110,
        use_mrc: true,
        preserve_vectors: true,
        text_threshold: DEFAULT_TEXT_THRESHOLD,
    },
    CompressionConfig {
        profile: Profile::Minimum,
        quality: 0.30,
        target_resolution_dpi: 72,
        use_mrc: false,
        preserve_vectors: false,
        text_threshold: DEFAULT_TEXT_THRESHOLD,
    },
];

impl Profile {
    pub const ALL: [Profile; 4] = [
        Profile::High,
        Profile::Balanced,
        Profile::Compact,
        Profile::Minimum,
    ];

    fn index(self) -> usize {
        match self {
            Profile::High => 0,
            Profile::Balanced => 1,
            Profile::Compact => 2,
            Profile::Minimum => 3,
        }
    }

    /// Look up the parameters for this profile.
    pub fn config(self) -> CompressionConfig {
        PROFILE_TABLE[self.index()]
    }

    /// The next more aggressive profile, or `None` at the end of the table.
    pub fn escalate(self) -> Option<Profile> {
        Profile::ALL.get(self.index() + 1).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            Profile::High => "high",
            Profile::Balanced => "balanced",
            Profile::Compact => "compact",
            Profile::Minimum => "minimum",
        }
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl CompressionConfig {
    /// Replace the text threshold, keeping everything else.
    pub fn with_text_threshold(mut self, text_threshold: usize) -> Self {
        self.text_threshold = text_threshold;
        self
    }

    /// JPEG quality on the encoder's 1-100 scale.
    pub fn jpeg_quality(&self) -> u8 {
        (self.quality.clamp(0.0, 1.0) * 100.0).round().clamp(1.0, 100.0) as u8
    }

    /// Resolution for the MRC background layer.
    pub fn background_dpi(&self) -> u32 {
        (self.target_resolution_dpi / 2).max(50)
    }

    /// JPEG quality for the MRC background layer. Paper texture tolerates
    /// far heavier quantisation than text.
    pub fn background_jpeg_quality(&self) -> u8 {
        (self.jpeg_quality() / 2).max(10)
    }

    /// Long-edge pixel budget for still images.
    pub fn image_long_edge(&self) -> u32 {
        self.target_resolution_dpi * 12
    }

    /// Constant rate factor for video re-encoding (lower is better quality).
    pub fn video_crf(&self) -> u8 {
        (18.0 + (1.0 - self.quality.clamp(0.0, 1.0)) * 20.0).round() as u8
    }

    /// Maximum output frame height for video re-encoding.
    pub fn video_max_height(&self) -> u32 {
        match self.profile {
            Profile::High => 1080,
            Profile::Balanced => 720,
            Profile::Compact => 540,
            Profile::Minimum => 360,
        }
    }

    /// True when `self` has strictly lower quality and resolution than `other`.
    pub fn is_more_aggressive_than(&self, other: &CompressionConfig) -> bool {
        self.quality < other.quality && self.target_resolution_dpi < other.target_resolution_dpi
    }
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Profile::Balanced.config()
    }
}
