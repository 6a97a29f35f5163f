pub mod analysis;
pub mod config;
pub mod error;
pub mod media;
pub mod mrc;
pub mod pdf;
pub mod pipeline;
pub mod render;

pub use config::profile::{CompressionConfig, Profile};
pub use error::{CompressError, Result};
pub use pipeline::job_runner::{compress, compress_with_renderer};
pub use pipeline::supervisor::CompressionOutcome;
