// 出力ページの組立: 画像XObjectの置換、ページ全体の再構築（単一画像 / MRCレイヤー）

use lopdf::{Dictionary, Document, Object, ObjectId, Stream, dictionary};

use crate::error::CompressError;
use crate::mrc::{EncodedLayer, MrcLayerResult};
use crate::pdf::content_stream::BBox;

/// 画像XObjectの辞書のうち、エンコードに依存するため置き換えるキー。
const ENCODING_KEYS: &[&[u8]] = &[
    b"Filter",
    b"DecodeParms",
    b"ColorSpace",
    b"BitsPerComponent",
    b"Width",
    b"Height",
    b"Length",
];

/// EncodedLayerから画像XObjectの辞書を作る。
fn image_dict(layer: &EncodedLayer) -> Dictionary {
    let mut dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => layer.width as i64,
        "Height" => layer.height as i64,
        "BitsPerComponent" => layer.bits_per_component as i64,
        "Filter" => layer.filter,
    };
    match layer.color_space {
        Some(cs) => dict.set("ColorSpace", Object::Name(cs.as_bytes().to_vec())),
        // カラースペースなし = ステンシルマスク（サンプル0の位置を塗る）
        None => dict.set("ImageMask", true),
    }
    dict
}

/// 既存の画像XObjectを、同じObjectIdのまま再エンコード済みデータで置き換える。
///
/// エンコード以外のキー（Interpolate, Intent, Metadata など）は保持する。
pub fn replace_image_xobject(
    doc: &mut Document,
    object_id: ObjectId,
    layer: &EncodedLayer,
) -> crate::error::Result<()> {
    let original = doc
        .get_object(object_id)
        .and_then(Object::as_stream)
        .map_err(|e| CompressError::reassembly(format!("image {:?}: {}", object_id, e)))?;

    let mut dict = image_dict(layer);
    for (key, value) in original.dict.iter() {
        if !ENCODING_KEYS.contains(&key.as_slice()) && !dict.has(key) {
            dict.set(key.clone(), value.clone());
        }
    }

    let mut stream = Stream::new(dict, layer.data.clone());
    // 画像データは既に圧縮済み
    stream.allows_compression = false;
    doc.objects.insert(object_id, Object::Stream(stream));
    Ok(())
}

/// 画像XObjectを新規オブジェクトとして追加する。
pub fn add_image_xobject(doc: &mut Document, layer: &EncodedLayer) -> ObjectId {
    let mut stream = Stream::new(image_dict(layer), layer.data.clone());
    stream.allows_compression = false;
    doc.add_object(Object::Stream(stream))
}

/// 数値をPDFのコンテンツストリーム用に整形する（末尾の0を削る）。
fn fmt_num(v: f64) -> String {
    let s = format!("{:.4}", v);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" { "0".to_string() } else { s.to_string() }
}

/// 画像を `area` いっぱいに描画する `cm` 行列。
fn placement_matrix(area: &BBox) -> String {
    format!(
        "{} 0 0 {} {} {} cm",
        fmt_num(area.width()),
        fmt_num(area.height()),
        fmt_num(area.x_min),
        fmt_num(area.y_min)
    )
}

/// 単一画像ページのコンテンツストリーム:
/// `q W 0 0 H X Y cm /Page Do Q`
pub fn build_image_page_content(name: &str, area: &BBox) -> Vec<u8> {
    format!("q {} /{} Do Q", placement_matrix(area), name).into_bytes()
}

/// MRCページのコンテンツストリーム。
///
/// 背景を描画した後、前景マスクをインク色で塗る:
/// `q W 0 0 H X Y cm /Bg Do Q q r g b rg W 0 0 H X Y cm /Fg Do Q`
pub fn build_layered_page_content(
    bg_name: &str,
    fg_name: Option<&str>,
    ink_color: [u8; 3],
    area: &BBox,
) -> Vec<u8> {
    let matrix = placement_matrix(area);
    let mut content = format!("q {} /{} Do Q", matrix, bg_name);
    if let Some(fg) = fg_name {
        let [r, g, b] = ink_color.map(|c| fmt_num(c as f64 / 255.0));
        content.push_str(&format!(" q {r} {g} {b} rg {matrix} /{fg} Do Q"));
    }
    content.into_bytes()
}

/// ページのContentsとResourcesを差し替える。MediaBoxは表示領域そのものになり、CropBoxは除く。
/// /Rotate は残す（画像は回転前の向きで描かれている）。
///
/// 戻り値は新しく作ったコンテンツストリームのObjectId（後で圧縮する対象）。
fn rebuild_page(
    doc: &mut Document,
    page_id: ObjectId,
    area: &BBox,
    xobjects: Dictionary,
    content: Vec<u8>,
) -> crate::error::Result<ObjectId> {
    let content_id = doc.add_object(Object::Stream(Stream::new(dictionary! {}, content)));
    let resources = dictionary! { "XObject" => Object::Dictionary(xobjects) };

    let page = doc
        .get_dictionary_mut(page_id)
        .map_err(|e| CompressError::reassembly(format!("page {:?}: {}", page_id, e)))?;
    page.set("Contents", Object::Reference(content_id));
    page.set("Resources", Object::Dictionary(resources));
    page.set(
        "MediaBox",
        vec![
            Object::Real(area.x_min as f32),
            Object::Real(area.y_min as f32),
            Object::Real(area.x_max as f32),
            Object::Real(area.y_max as f32),
        ],
    );
    page.remove(b"CropBox");
    // 透明グループは元のコンテンツに属する
    page.remove(b"Group");
    Ok(content_id)
}

/// ページ全体を1枚の画像で置き換える。
pub fn write_image_page(
    doc: &mut Document,
    page_id: ObjectId,
    area: &BBox,
    image: &EncodedLayer,
) -> crate::error::Result<ObjectId> {
    let image_id = add_image_xobject(doc, image);
    let mut xobjects = Dictionary::new();
    xobjects.set("Page", Object::Reference(image_id));
    let content = build_image_page_content("Page", area);
    rebuild_page(doc, page_id, area, xobjects, content)
}

/// ページ全体をMRCレイヤー（背景JPEG + 前景ステンシルマスク）で置き換える。
///
/// `has_significant_text` が偽なら背景だけを描画し、マスクは書き出さない。
pub fn write_layered_page(
    doc: &mut Document,
    page_id: ObjectId,
    area: &BBox,
    layers: &MrcLayerResult,
) -> crate::error::Result<ObjectId> {
    let bg_id = add_image_xobject(doc, &layers.background);
    let mut xobjects = Dictionary::new();
    xobjects.set("Bg", Object::Reference(bg_id));

    let fg_name = if layers.has_significant_text {
        let fg_id = add_image_xobject(doc, &layers.foreground_mask);
        xobjects.set("Fg", Object::Reference(fg_id));
        Some("Fg")
    } else {
        None
    };

    let content = build_layered_page_content("Bg", fg_name, layers.ink_color, area);
    rebuild_page(doc, page_id, area, xobjects, content)
}
