// image crate: layers -> JPEG bytes

use crate::error::CompressError;
use image::{DynamicImage, GrayImage, RgbImage, RgbaImage};
use std::io::Cursor;

/// Encode raw RGBA pixel data to JPEG bytes.
///
/// Converts RGBA to RGB (dropping the alpha channel) and compresses with
/// the specified quality (1-100).
///
/// # Arguments
/// * `rgba_data` - Raw RGBA pixel data (4 bytes per pixel)
/// * `width`     - Image width in pixels
/// * `height`    - Image height in pixels
/// * `quality`   - JPEG quality (1 = worst, 100 = best)
pub fn encode_rgba_to_jpeg(
    rgba_data: &[u8],
    width: u32,
    height: u32,
    quality: u8,
) -> crate::error::Result<Vec<u8>> {
    check_quality(quality)?;

    let expected_len = (width as usize)
        .checked_mul(height as usize)
        .and_then(|wh| wh.checked_mul(4))
        .ok_or_else(|| {
            CompressError::encode(format!(
                "Overflow computing buffer size for {}x{} RGBA image",
                width, height
            ))
        })?;

    if rgba_data.len() != expected_len {
        return Err(CompressError::encode(format!(
            "RGBA data size mismatch: expected {} bytes, got {}",
            expected_len,
            rgba_data.len()
        )));
    }

    let img = RgbaImage::from_raw(width, height, rgba_data.to_vec())
        .ok_or_else(|| CompressError::encode("Failed to create image from RGBA data"))?;

    let rgb = DynamicImage::ImageRgba8(img).to_rgb8();
    encode_rgb_to_jpeg(&rgb, quality)
}

/// Encode an RGB image to JPEG bytes.
pub(crate) fn encode_rgb_to_jpeg(rgb: &RgbImage, quality: u8) -> crate::error::Result<Vec<u8>> {
    check_quality(quality)?;
    let mut buf = Cursor::new(Vec::new());
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, quality);
    rgb.write_with_encoder(encoder)?;

    Ok(buf.into_inner())
}

/// Encode a single-channel image to JPEG bytes.
pub(crate) fn encode_gray_to_jpeg(gray: &GrayImage, quality: u8) -> crate::error::Result<Vec<u8>> {
    check_quality(quality)?;
    let mut buf = Cursor::new(Vec::new());
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, quality);
    gray.write_with_encoder(encoder)?;

    Ok(buf.into_inner())
}

/// Encode any image as JPEG, choosing gray or RGB by content.
///
/// Returns the bytes together with the PDF color space name.
pub fn encode_page_jpeg(
    img: &DynamicImage,
    quality: u8,
) -> crate::error::Result<(Vec<u8>, &'static str)> {
    if crate::pdf::image_xobject::is_effectively_gray(img) {
        Ok((encode_gray_to_jpeg(&img.to_luma8(), quality)?, "DeviceGray"))
    } else {
        Ok((encode_rgb_to_jpeg(&img.to_rgb8(), quality)?, "DeviceRGB"))
    }
}

fn check_quality(quality: u8) -> crate::error::Result<()> {
    if !(1..=100).contains(&quality) {
        return Err(CompressError::encode(format!(
            "JPEG quality must be 1-100, got {}",
            quality
        )));
    }
    Ok(())
}
