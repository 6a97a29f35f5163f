// 画像XObjectのデコード/再エンコード、最小サイズ候補の選択

use crate::error::CompressError;
use crate::mrc::jpeg;
use flate2::read::ZlibDecoder;
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, RgbImage};
use lopdf::Object;
use std::io::Read;

/// 画像XObjectのメタデータ
#[derive(Debug, Clone)]
pub struct ImageMeta {
    pub width: u32,
    pub height: u32,
    pub bits_per_component: u8,
    pub color_space: String,
    pub filter: Option<String>,
}

/// 最適圧縮済み画像データ
#[derive(Debug, Clone)]
pub struct OptimizedImage {
    pub data: Vec<u8>,
    pub filter: &'static str,
    pub color_space: &'static str,
    pub bits_per_component: u8,
    pub width: u32,
    pub height: u32,
}

/// 画像XObjectのストリームから画像メタデータを読み取る。
pub fn read_image_meta(stream: &lopdf::Stream) -> crate::error::Result<ImageMeta> {
    let dict = &stream.dict;

    let width = dict_get_u32(dict, b"Width")?;
    let height = dict_get_u32(dict, b"Height")?;
    // BitsPerComponent: missing keyの場合のみデフォルト8、型エラーは伝播
    let bits_per_component = match dict.get(b"BitsPerComponent") {
        Ok(_) => dict_get_u32(dict, b"BitsPerComponent")? as u8,
        Err(_) => 8,
    };

    let color_space = match dict.get(b"ColorSpace") {
        Ok(Object::Name(name)) => String::from_utf8_lossy(name).to_string(),
        Ok(Object::Array(arr)) => match arr.first() {
            Some(Object::Name(name)) => String::from_utf8_lossy(name).to_string(),
            _ => "Unknown".to_string(),
        },
        Ok(_) => "Unknown".to_string(),
        Err(_) => "DeviceRGB".to_string(),
    };

    let filter = match dict.get(b"Filter") {
        Ok(Object::Name(name)) => Some(String::from_utf8_lossy(name).to_string()),
        Ok(Object::Array(arr)) => {
            if arr.len() > 1 {
                return Err(CompressError::image_xobject("Filter chains are not supported"));
            }
            arr.first().and_then(|obj| {
                if let Object::Name(name) = obj {
                    Some(String::from_utf8_lossy(name).to_string())
                } else {
                    None
                }
            })
        }
        _ => None,
    };

    Ok(ImageMeta {
        width,
        height,
        bits_per_component,
        color_space,
        filter,
    })
}

/// 辞書からu32値を取得するヘルパー（負の値はエラー）
fn dict_get_u32(dict: &lopdf::Dictionary, key: &[u8]) -> crate::error::Result<u32> {
    match dict.get(key) {
        Ok(Object::Integer(i)) => {
            let val = *i;
            if val < 0 || val > u32::MAX as i64 {
                Err(CompressError::image_xobject(format!(
                    "Value out of u32 range for {:?}: {}",
                    String::from_utf8_lossy(key),
                    val
                )))
            } else {
                Ok(val as u32)
            }
        }
        Ok(Object::Real(f)) => {
            let val = *f;
            if val < 0.0 || val > u32::MAX as f32 {
                Err(CompressError::image_xobject(format!(
                    "Value out of u32 range for {:?}: {}",
                    String::from_utf8_lossy(key),
                    val
                )))
            } else {
                Ok(val as u32)
            }
        }
        Ok(other) => Err(CompressError::image_xobject(format!(
            "Expected integer for {:?}, got {:?}",
            String::from_utf8_lossy(key),
            other
        ))),
        Err(_) => Err(CompressError::image_xobject(format!(
            "Missing required key: {:?}",
            String::from_utf8_lossy(key),
        ))),
    }
}

/// 再圧縮しても見た目が変わらない画像かどうかを判定する。
///
/// 透過マスク・ステンシル・Decode配列・予測子付きFlateなど、
/// 単純なピクセル置換で意味が変わるものは対象外とする。
pub fn check_recompressible(stream: &lopdf::Stream) -> crate::error::Result<ImageMeta> {
    let dict = &stream.dict;
    for key in [b"SMask".as_slice(), b"Mask", b"Decode", b"SMaskInData"] {
        if dict.has(key) {
            return Err(CompressError::image_xobject(format!(
                "Image with /{} is kept as-is",
                String::from_utf8_lossy(key)
            )));
        }
    }
    if matches!(dict.get(b"ImageMask"), Ok(Object::Boolean(true))) {
        return Err(CompressError::image_xobject("Stencil masks are kept as-is"));
    }
    if let Ok(parms) = dict.get(b"DecodeParms")
        && let Ok(parms) = parms.as_dict()
        && parms.get(b"Predictor").and_then(Object::as_i64).unwrap_or(1) > 1
    {
        return Err(CompressError::image_xobject("Predictor-encoded images are kept as-is"));
    }

    let meta = read_image_meta(stream)?;
    if meta.width == 0 || meta.height == 0 {
        return Err(CompressError::image_xobject("Image has zero size"));
    }

    let supported = match meta.filter.as_deref() {
        Some("DCTDecode") => matches!(
            meta.color_space.as_str(),
            "DeviceRGB" | "DeviceGray" | "ICCBased"
        ),
        Some("FlateDecode") | None => {
            meta.bits_per_component == 8
                && matches!(meta.color_space.as_str(), "DeviceRGB" | "DeviceGray")
        }
        Some(_) => false,
    };
    if !supported {
        return Err(CompressError::image_xobject(format!(
            "Unsupported image encoding: {:?} / {} / {} bpc",
            meta.filter, meta.color_space, meta.bits_per_component
        )));
    }
    Ok(meta)
}

/// 画像XObjectのストリームデータをデコードしてDynamicImageに変換する。
///
/// 対応フィルタ:
/// - DCTDecode (JPEG)
/// - FlateDecode (raw pixels + zlib)
/// - 非圧縮 (raw pixels)
pub fn decode_image_stream(
    stream: &lopdf::Stream,
    meta: &ImageMeta,
) -> crate::error::Result<DynamicImage> {
    let raw = &stream.content;

    match meta.filter.as_deref() {
        Some("DCTDecode") => decode_jpeg(raw),
        Some("FlateDecode") => decode_flate(raw, meta),
        None => decode_raw(raw, meta),
        Some(other) => Err(CompressError::image_xobject(format!(
            "Unsupported image filter: {}",
            other
        ))),
    }
}

/// JPEGデータをデコード
fn decode_jpeg(data: &[u8]) -> crate::error::Result<DynamicImage> {
    let reader = image::ImageReader::new(std::io::Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| CompressError::image_xobject(format!("JPEG decode error: {}", e)))?;
    reader
        .decode()
        .map_err(|e| CompressError::image_xobject(format!("JPEG decode error: {}", e)))
}

/// FlateDecode (zlib) で圧縮されたraw pixelデータをデコード
fn decode_flate(data: &[u8], meta: &ImageMeta) -> crate::error::Result<DynamicImage> {
    let mut decoder = ZlibDecoder::new(data);
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| CompressError::image_xobject(format!("FlateDecode error: {}", e)))?;
    decode_raw(&decompressed, meta)
}

/// Raw pixelデータからDynamicImageを構築
fn decode_raw(data: &[u8], meta: &ImageMeta) -> crate::error::Result<DynamicImage> {
    let w = meta.width;
    let h = meta.height;

    match (meta.color_space.as_str(), meta.bits_per_component) {
        ("DeviceRGB", 8) => {
            let expected = (w as usize) * (h as usize) * 3;
            if data.len() < expected {
                return Err(CompressError::image_xobject(format!(
                    "RGB data too short: expected {}, got {}",
                    expected,
                    data.len()
                )));
            }
            let img = RgbImage::from_raw(w, h, data[..expected].to_vec()).ok_or_else(|| {
                CompressError::image_xobject("Failed to create RGB image from raw data")
            })?;
            Ok(DynamicImage::ImageRgb8(img))
        }
        ("DeviceGray", 8) => {
            let expected = (w as usize) * (h as usize);
            if data.len() < expected {
                return Err(CompressError::image_xobject(format!(
                    "Gray data too short: expected {}, got {}",
                    expected,
                    data.len()
                )));
            }
            let img = GrayImage::from_raw(w, h, data[..expected].to_vec()).ok_or_else(|| {
                CompressError::image_xobject("Failed to create Gray image from raw data")
            })?;
            Ok(DynamicImage::ImageLuma8(img))
        }
        (cs, bpc) => Err(CompressError::image_xobject(format!(
            "Unsupported color space / BPC combination: {} / {}",
            cs, bpc
        ))),
    }
}

/// zlibで圧縮
pub(crate) fn flate_encode(data: &[u8]) -> crate::error::Result<Vec<u8>> {
    use flate2::Compression;
    use flate2::write::ZlibEncoder;
    use std::io::Write;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    encoder
        .write_all(data)
        .map_err(|e| CompressError::encode(format!("Flate encode error: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| CompressError::encode(format!("Flate encode error: {}", e)))
}

/// RGB画像の全ピクセルがほぼ無彩色かどうか（スキャンした白黒原稿のRGB保存を検出する）。
pub fn is_effectively_gray(img: &DynamicImage) -> bool {
    if !img.color().has_color() {
        return true;
    }
    let rgb = img.to_rgb8();
    // 大きな画像は間引いて判定する
    let step = ((rgb.width() as usize * rgb.height() as usize) / 250_000).max(1);
    rgb.pixels().step_by(step).all(|p| {
        let [r, g, b] = p.0;
        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        max - min <= 12
    })
}

/// 画像を目標ピクセル数まで縮小する。目標より小さい画像はそのまま返す。
pub fn downsample_to(img: DynamicImage, target: Option<(u32, u32)>) -> DynamicImage {
    match target {
        Some((tw, th)) if tw > 0 && th > 0 => {
            // 10%未満の縮小は画質を落とすだけで効果が薄い
            if (img.width() as f64) > tw as f64 * 1.1 && (img.height() as f64) > th as f64 * 1.1 {
                img.resize_exact(tw, th, FilterType::Lanczos3)
            } else {
                img
            }
        }
        _ => img,
    }
}

/// 画像XObjectを複数形式でエンコードし、最小サイズの結果を返す。
///
/// # Arguments
/// * `decoded` - デコード済み画像
/// * `original_size` - 元のストリームサイズ（比較用）
/// * `quality` - JPEG品質 (1-100)
///
/// # Returns
/// * `None` - 元のサイズより厳密に小さくならない
/// * `Some(OptimizedImage)` - 最適圧縮済みデータ
pub fn optimize_image_encoding(
    decoded: &DynamicImage,
    original_size: usize,
    quality: u8,
) -> crate::error::Result<Option<OptimizedImage>> {
    if !(1..=100).contains(&quality) {
        return Err(CompressError::image_xobject(format!(
            "JPEG quality must be 1-100, got {}",
            quality
        )));
    }

    let mut candidates: Vec<OptimizedImage> = Vec::new();
    let (width, height) = (decoded.width(), decoded.height());

    // 候補A: グレースケールJPEG（無彩色の画像のみ。カラー画像のグレー化は見た目が変わる）
    if is_effectively_gray(decoded) {
        let gray = decoded.to_luma8();
        if let Ok(gray_jpeg) = jpeg::encode_gray_to_jpeg(&gray, quality) {
            candidates.push(OptimizedImage {
                data: gray_jpeg,
                filter: "DCTDecode",
                color_space: "DeviceGray",
                bits_per_component: 8,
                width,
                height,
            });
        }
    } else {
        // 候補B: RGB JPEG
        let rgb = decoded.to_rgb8();
        if let Ok(rgb_jpeg) = jpeg::encode_rgb_to_jpeg(&rgb, quality) {
            candidates.push(OptimizedImage {
                data: rgb_jpeg,
                filter: "DCTDecode",
                color_space: "DeviceRGB",
                bits_per_component: 8,
                width,
                height,
            });
        }
    }

    // 最小サイズの候補を選択（元のサイズ未満のもの）
    candidates.sort_by_key(|c| c.data.len());

    Ok(candidates.into_iter().find(|c| c.data.len() < original_size))
}
