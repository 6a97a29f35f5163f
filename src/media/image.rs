// 静止画: EXIFの向きを適用し、長辺をプロファイルの上限まで縮小して出力拡張子の形式で再エンコード

use std::io::Cursor;
use std::path::Path;

use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::imageops::FilterType as ResizeFilter;
use image::metadata::Orientation;
use image::{DynamicImage, GenericImageView, ImageDecoder, ImageFormat, ImageReader};
use tracing::debug;

use crate::config::profile::CompressionConfig;
use crate::error::CompressError;
use crate::mrc::jpeg;
use crate::pipeline::supervisor::AttemptResult;

/// Container written for a still image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputEncoding {
    Jpeg,
    Png,
    /// Another format `image` can write, re-encoded with its defaults.
    Other(ImageFormat),
}

impl OutputEncoding {
    /// The output extension decides. Without a recognised one the source
    /// container is kept, and an unknown source becomes JPEG unless it is
    /// transparent.
    fn choose(candidate: &Path, source: Option<ImageFormat>, transparent: bool) -> Self {
        let by_extension = ImageFormat::from_path(candidate).ok();
        match by_extension.or(source) {
            Some(ImageFormat::Jpeg) => OutputEncoding::Jpeg,
            Some(ImageFormat::Png) => OutputEncoding::Png,
            Some(format) if by_extension.is_some() && format.can_write() => {
                OutputEncoding::Other(format)
            }
            _ if transparent => OutputEncoding::Png,
            _ => OutputEncoding::Jpeg,
        }
    }

    fn strategy(self) -> String {
        match self {
            OutputEncoding::Jpeg => "image_jpeg".to_string(),
            OutputEncoding::Png => "image_png".to_string(),
            OutputEncoding::Other(format) => {
                let ext = format.extensions_str().first().copied().unwrap_or("other");
                format!("image_{ext}")
            }
        }
    }
}

/// Re-encode a still image into `candidate`, in the format its extension names.
pub fn compress_image(
    bytes: &[u8],
    config: &CompressionConfig,
    candidate: &Path,
) -> crate::error::Result<AttemptResult> {
    let (img, source_format) = decode_upright(bytes)?;
    if img.width() == 0 || img.height() == 0 {
        return Err(CompressError::EmptyInput);
    }

    let img = fit_long_edge(img, config.image_long_edge());
    let encoding = OutputEncoding::choose(candidate, source_format, has_transparency(&img));
    let data = match encoding {
        OutputEncoding::Jpeg => jpeg::encode_page_jpeg(&img, config.jpeg_quality())?.0,
        OutputEncoding::Png => encode_png(&img)?,
        OutputEncoding::Other(format) => encode_with(&img, format)?,
    };
    let strategy = encoding.strategy();
    debug!(
        width = img.width(),
        height = img.height(),
        bytes = data.len(),
        %strategy,
        "Image re-encoded"
    );

    std::fs::write(candidate, &data)?;
    Ok(AttemptResult::Written { strategy })
}

/// Decode with the EXIF orientation applied, so the pixels stand upright
/// once the metadata is gone.
fn decode_upright(bytes: &[u8]) -> crate::error::Result<(DynamicImage, Option<ImageFormat>)> {
    let reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
    let format = reader.format();
    let mut decoder = reader
        .into_decoder()
        .map_err(|e| CompressError::invalid_input(format!("cannot decode image: {e}")))?;
    let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
    let mut img = DynamicImage::from_decoder(decoder)
        .map_err(|e| CompressError::invalid_input(format!("cannot decode image: {e}")))?;
    img.apply_orientation(orientation);
    Ok((img, format))
}

/// Downscale so the longer side is at most `long_edge`. Never upscales.
pub fn fit_long_edge(img: DynamicImage, long_edge: u32) -> DynamicImage {
    let (w, h) = img.dimensions();
    if w.max(h) <= long_edge {
        return img;
    }
    img.resize(long_edge, long_edge, ResizeFilter::Lanczos3)
}

/// Whether any pixel is not fully opaque.
fn has_transparency(img: &DynamicImage) -> bool {
    if !img.color().has_alpha() {
        return false;
    }
    img.to_rgba8().pixels().any(|p| p.0[3] < 255)
}

fn encode_png(img: &DynamicImage) -> crate::error::Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    let encoder = PngEncoder::new_with_quality(&mut buf, CompressionType::Best, FilterType::Adaptive);
    img.to_rgba8().write_with_encoder(encoder)?;
    Ok(buf.into_inner())
}

fn encode_with(img: &DynamicImage, format: ImageFormat) -> crate::error::Result<Vec<u8>> {
    let img = if img.color().has_alpha() {
        DynamicImage::ImageRgba8(img.to_rgba8())
    } else {
        DynamicImage::ImageRgb8(img.to_rgb8())
    };
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, format)
        .map_err(|e| CompressError::encode(format!("cannot write {format:?}: {e}")))?;
    Ok(buf.into_inner())
}
