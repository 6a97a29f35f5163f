use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompressError {
    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Input is empty (no pages or zero duration)")]
    EmptyInput,

    #[error("Document is encrypted and needs a password")]
    Encrypted,

    #[error("Could not create processing context: {0}")]
    ContextCreationFailed(String),

    #[error("Page {page_index} could not be processed: {reason}")]
    PageProcessingFailed { page_index: u32, reason: String },

    #[error("Save failed: {0}")]
    SaveFailed(String),

    #[error("Compression cancelled")]
    Cancelled,

    #[error("Compression timed out")]
    Timeout,

    #[error("Unknown error: {0}")]
    Unknown(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Content stream error: {0}")]
    ContentStreamError(String),

    #[error("Render error: {0}")]
    RenderError(String),

    #[error("Segmentation error: {0}")]
    SegmentationError(String),

    #[error("Encode error: {0}")]
    EncodeError(String),

    #[error("Image XObject error: {0}")]
    ImageXObjectError(String),

    #[error("Reassembly error: {0}")]
    ReassemblyError(String),

    #[error("Transcode error: {0}")]
    TranscodeError(String),

    #[error("IO error: {0}")]
    IoError(std::io::Error),
}

/// Generates factory methods for [`CompressError`] variants that wrap a `String`.
macro_rules! error_constructors {
    ($(
        $(#[doc = $doc:expr])*
        $method:ident => $variant:ident
    ),* $(,)?) => {
        impl CompressError {
            $(
                $(#[doc = $doc])*
                pub fn $method(msg: impl Into<String>) -> Self {
                    Self::$variant(msg.into())
                }
            )*
        }
    };
}

error_constructors! {
    /// Create an access-denied error.
    access_denied => AccessDenied,
    /// Create an invalid-input error.
    invalid_input => InvalidInput,
    /// Create a context-creation error.
    context => ContextCreationFailed,
    /// Create a save error.
    save => SaveFailed,
    /// Create an unknown error.
    unknown => Unknown,
    /// Create a configuration error.
    config => ConfigError,
    /// Create a content stream error.
    content_stream => ContentStreamError,
    /// Create a render error.
    render => RenderError,
    /// Create a segmentation error.
    segmentation => SegmentationError,
    /// Create an encode error.
    encode => EncodeError,
    /// Create an image XObject error.
    image_xobject => ImageXObjectError,
    /// Create a reassembly error.
    reassembly => ReassemblyError,
    /// Create a transcode error.
    transcode => TranscodeError,
}

impl CompressError {
    /// Create a page processing error for a 0-based page index.
    pub fn page(page_index: u32, reason: impl Into<String>) -> Self {
        Self::PageProcessingFailed {
            page_index,
            reason: reason.into(),
        }
    }

    /// Errors that only affect one page and are recovered by keeping the
    /// original page content.
    pub fn is_recoverable_page_error(&self) -> bool {
        matches!(
            self,
            Self::PageProcessingFailed { .. }
                | Self::RenderError(_)
                | Self::SegmentationError(_)
                | Self::EncodeError(_)
                | Self::ImageXObjectError(_)
                | Self::ContentStreamError(_)
        )
    }

    /// Errors raised while assembling the output document. The strategy
    /// selector answers these with the next strategy in its chain.
    pub fn is_reassembly(&self) -> bool {
        matches!(self, Self::ReassemblyError(_))
    }
}

impl From<std::io::Error> for CompressError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::PermissionDenied => Self::AccessDenied(e.to_string()),
            std::io::ErrorKind::NotFound => Self::InvalidInput(e.to_string()),
            _ => Self::IoError(e),
        }
    }
}

impl From<lopdf::Error> for CompressError {
    fn from(e: lopdf::Error) -> Self {
        Self::InvalidInput(e.to_string())
    }
}

impl From<serde_yml::Error> for CompressError {
    fn from(e: serde_yml::Error) -> Self {
        Self::ConfigError(e.to_string())
    }
}

#[cfg(feature = "pdfium")]
impl From<pdfium_render::prelude::PdfiumError> for CompressError {
    fn from(e: pdfium_render::prelude::PdfiumError) -> Self {
        Self::RenderError(e.to_string())
    }
}

impl From<image::ImageError> for CompressError {
    fn from(e: image::ImageError) -> Self {
        Self::EncodeError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CompressError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_denied_maps_to_access_denied() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        assert!(matches!(
            CompressError::from(io),
            CompressError::AccessDenied(_)
        ));
    }

    #[test]
    fn test_missing_file_is_invalid_input() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        assert!(matches!(
            CompressError::from(io),
            CompressError::InvalidInput(_)
        ));
    }

    #[test]
    fn test_other_io_errors_stay_io() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short read");
        assert!(matches!(CompressError::from(io), CompressError::IoError(_)));
    }

    #[test]
    fn test_error_classes() {
        assert!(CompressError::render("x").is_recoverable_page_error());
        assert!(CompressError::page(3, "x").is_recoverable_page_error());
        assert!(!CompressError::Encrypted.is_recoverable_page_error());
        assert!(!CompressError::Cancelled.is_recoverable_page_error());
        assert!(CompressError::reassembly("x").is_reassembly());
        assert!(!CompressError::save("x").is_reassembly());
    }

    #[test]
    fn test_page_error_message_names_page() {
        let e = CompressError::page(4, "decode failed");
        assert_eq!(e.to_string(), "Page 4 could not be processed: decode failed");
    }
}
