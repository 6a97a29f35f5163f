// 1-bit stencil mask: ink mask -> packed rows -> FlateDecode bytes
//
// PDF image masks paint where the sample is 0, so ink pixels are packed as 0
// and paper as 1. Rows are padded to a whole byte.

use image::GrayImage;

use super::segmenter::INK;
use crate::pdf::image_xobject::flate_encode;

/// Pack an ink mask into 1-bit rows (0 = ink, 1 = paper), MSB first.
pub fn pack_stencil_rows(mask: &GrayImage) -> Vec<u8> {
    let (width, height) = mask.dimensions();
    let row_bytes = (width as usize).div_ceil(8);
    let mut packed = vec![0xFFu8; row_bytes * height as usize];

    for (x, y, pixel) in mask.enumerate_pixels() {
        if pixel.0[0] == INK {
            let idx = y as usize * row_bytes + (x as usize / 8);
            packed[idx] &= !(0x80 >> (x % 8));
        }
    }
    packed
}

/// Pack and Flate-compress an ink mask for use as an `/ImageMask` stream.
pub fn encode_stencil_mask(mask: &GrayImage) -> crate::error::Result<Vec<u8>> {
    flate_encode(&pack_stencil_rows(mask))
}
