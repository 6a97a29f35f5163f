use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use lopdf::{Dictionary, Document, Object, ObjectId};
use tracing::{debug, instrument};

use crate::error::CompressError;
use crate::pdf::content_stream::{BBox, ContentStats, analyze_content};

/// 読み取り専用の入力PDF。
///
/// 一度ロードしたら変更しない。複数のページ処理から同時に参照してよい。
#[derive(Debug)]
pub struct SourceDocument {
    doc: Document,
    page_ids: Vec<ObjectId>,
    byte_size: u64,
}

/// ページ構造から読み取れる情報。
#[derive(Debug, Clone)]
pub struct PageFacts {
    pub page_index: u32,
    pub media_box: BBox,
    pub trim_box: Option<BBox>,
    pub rotation: i64,
    pub annotation_count: usize,
}

impl PageFacts {
    /// TrimBoxがMediaBoxと異なるかどうか（図面PDFによく見られる）。
    pub fn has_distinct_trim_box(&self) -> bool {
        match &self.trim_box {
            Some(trim) => {
                let m = &self.media_box;
                (trim.x_min - m.x_min).abs() > 0.5
                    || (trim.y_min - m.y_min).abs() > 0.5
                    || (trim.x_max - m.x_max).abs() > 0.5
                    || (trim.y_max - m.y_max).abs() > 0.5
            }
            None => false,
        }
    }
}

/// PDFの最大ページ寸法（14,400 pt ≈ 200 in）。
const PDF_MAX_DIMENSION_PT: f64 = 14_400.0;

/// Form XObjectの入れ子をたどる深さの上限。
const MAX_FORM_DEPTH: usize = 12;

impl SourceDocument {
    /// PDFファイルを開く。
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> crate::error::Result<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        Self::from_bytes(&bytes)
    }

    /// メモリ上のPDFバイト列からロードする。
    ///
    /// 暗号化されたPDFは、ページを分類する前に `Encrypted` で拒否する。
    pub fn from_bytes(bytes: &[u8]) -> crate::error::Result<Self> {
        if bytes.is_empty() {
            return Err(CompressError::EmptyInput);
        }

        let doc = match Document::load_mem(bytes) {
            Ok(doc) => doc,
            Err(e) => {
                if contains_encrypt_marker(bytes) {
                    return Err(CompressError::Encrypted);
                }
                return Err(CompressError::invalid_input(e.to_string()));
            }
        };

        if doc.trailer.has(b"Encrypt") {
            return Err(CompressError::Encrypted);
        }

        let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();
        if page_ids.is_empty() {
            return Err(CompressError::EmptyInput);
        }

        debug!(pages = page_ids.len(), bytes = bytes.len(), "PDF loaded");

        Ok(Self {
            doc,
            page_ids,
            byte_size: bytes.len() as u64,
        })
    }

    /// 内部のlopdf Documentへの参照を返す。
    pub fn document(&self) -> &Document {
        &self.doc
    }

    /// ページ数を返す。
    pub fn page_count(&self) -> u32 {
        self.page_ids.len() as u32
    }

    /// 入力ファイルのバイト数。
    pub fn byte_size(&self) -> u64 {
        self.byte_size
    }

    /// ページ番号(0-indexed)からObjectIdを取得する。
    pub fn page_id(&self, page_index: u32) -> crate::error::Result<ObjectId> {
        self.page_ids
            .get(page_index as usize)
            .copied()
            .ok_or_else(|| CompressError::page(page_index, "page not found"))
    }

    /// 全ページのObjectIdをページ順に返す。
    pub fn page_ids(&self) -> &[ObjectId] {
        &self.page_ids
    }

    fn page_dict(&self, page_index: u32) -> crate::error::Result<&Dictionary> {
        let id = self.page_id(page_index)?;
        self.doc
            .get_dictionary(id)
            .map_err(|e| CompressError::page(page_index, e.to_string()))
    }

    /// ページ辞書からキーを取得する（Parent経由の継承も考慮）。
    fn inherited<'a>(&'a self, dict: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
        let mut current = dict;
        // ページツリーの深さには上限を設ける（循環参照対策）
        for _ in 0..32 {
            if let Ok(obj) = current.get(key) {
                return Some(self.resolve(obj));
            }
            match current.get(b"Parent") {
                Ok(Object::Reference(parent_id)) => match self.doc.get_dictionary(*parent_id) {
                    Ok(parent) => current = parent,
                    Err(_) => return None,
                },
                _ => return None,
            }
        }
        None
    }

    fn resolve<'a>(&'a self, obj: &'a Object) -> &'a Object {
        match obj {
            Object::Reference(id) => self.doc.get_object(*id).unwrap_or(obj),
            other => other,
        }
    }

    /// 指定ページ(0-indexed)のMediaBox。
    pub fn media_box(&self, page_index: u32) -> crate::error::Result<BBox> {
        let dict = self.page_dict(page_index)?;
        let obj = self
            .inherited(dict, b"MediaBox")
            .ok_or_else(|| CompressError::page(page_index, "MediaBox not found"))?;
        let bbox = rect_from_object(obj)
            .ok_or_else(|| CompressError::page(page_index, "Invalid MediaBox"))?;

        if bbox.width() <= 0.0 || bbox.height() <= 0.0 {
            return Err(CompressError::page(
                page_index,
                "Invalid MediaBox: non-positive page dimensions",
            ));
        }
        if bbox.width() > PDF_MAX_DIMENSION_PT || bbox.height() > PDF_MAX_DIMENSION_PT {
            return Err(CompressError::page(
                page_index,
                "Invalid MediaBox: page dimensions exceed PDF limits",
            ));
        }
        Ok(bbox)
    }

    /// 表示される領域。CropBoxがあればMediaBoxとの共通部分、なければMediaBox。
    pub fn visible_box(&self, page_index: u32) -> crate::error::Result<BBox> {
        let media_box = self.media_box(page_index)?;
        let dict = self.page_dict(page_index)?;
        let crop = self
            .inherited(dict, b"CropBox")
            .and_then(rect_from_object)
            .and_then(|crop| crop.intersect(&media_box));
        Ok(crop.unwrap_or(media_box))
    }

    /// 分類器が使うページ構造情報を返す。
    pub fn page_facts(&self, page_index: u32) -> crate::error::Result<PageFacts> {
        let media_box = self.media_box(page_index)?;
        let dict = self.page_dict(page_index)?;

        let trim_box = dict
            .get(b"TrimBox")
            .ok()
            .map(|o| self.resolve(o))
            .and_then(rect_from_object);
        let rotation = self
            .inherited(dict, b"Rotate")
            .and_then(|o| o.as_i64().ok())
            .unwrap_or(0)
            .rem_euclid(360);
        let annotation_count = dict
            .get(b"Annots")
            .ok()
            .map(|o| self.resolve(o))
            .and_then(|o| o.as_array().ok())
            .map_or(0, Vec::len);

        Ok(PageFacts {
            page_index,
            media_box,
            trim_box,
            rotation,
            annotation_count,
        })
    }

    /// 指定ページ(0-indexed)のコンテンツストリームをバイト列として返す。
    /// 複数のContentストリームがある場合は結合して返す。
    pub fn page_content(&self, page_index: u32) -> crate::error::Result<Vec<u8>> {
        let page_id = self.page_id(page_index)?;
        let dict = self.page_dict(page_index)?;
        if !dict.has(b"Contents") {
            return Ok(Vec::new());
        }
        self.doc
            .get_page_content(page_id)
            .map_err(|e| CompressError::page(page_index, e.to_string()))
    }

    /// ページのリソース辞書（継承分を含む）。
    fn page_resource_dicts(&self, page_index: u32) -> crate::error::Result<Vec<&Dictionary>> {
        let page_id = self.page_id(page_index)?;
        let (resource_dict, resource_ids) = self
            .doc
            .get_page_resources(page_id)
            .map_err(|e| CompressError::page(page_index, e.to_string()))?;
        Ok(resource_dict
            .into_iter()
            .chain(
                resource_ids
                    .iter()
                    .filter_map(|id| self.doc.get_dictionary(*id).ok()),
            )
            .collect())
    }

    /// 指定ページの画像XObjectを名前→(ObjectId, Stream)のマップで返す。
    ///
    /// インラインで埋め込まれた（参照でない）画像は置き換え先がないため含めない。
    pub fn page_image_xobjects(
        &self,
        page_index: u32,
    ) -> crate::error::Result<BTreeMap<String, (ObjectId, &lopdf::Stream)>> {
        let mut images = BTreeMap::new();
        for dict in self.page_resource_dicts(page_index)? {
            self.collect_xobjects(dict, b"Image", &mut images);
        }
        Ok(images)
    }

    /// 指定ページのリソースにあるForm XObject。
    pub fn page_form_xobjects(
        &self,
        page_index: u32,
    ) -> crate::error::Result<BTreeMap<String, (ObjectId, &lopdf::Stream)>> {
        let mut forms = BTreeMap::new();
        for dict in self.page_resource_dicts(page_index)? {
            self.collect_xobjects(dict, b"Form", &mut forms);
        }
        Ok(forms)
    }

    /// リソース辞書のXObjectエントリから指定Subtypeのストリームを収集する。
    fn collect_xobjects<'a>(
        &'a self,
        resources: &'a Dictionary,
        subtype: &[u8],
        found: &mut BTreeMap<String, (ObjectId, &'a lopdf::Stream)>,
    ) {
        let xobjects = match resources.get(b"XObject").map(|o| self.resolve(o)) {
            Ok(Object::Dictionary(d)) => d,
            _ => return,
        };

        for (name_bytes, value) in xobjects.iter() {
            let Object::Reference(id) = value else {
                continue;
            };
            let Ok(stream) = self.doc.get_object(*id).and_then(Object::as_stream) else {
                continue;
            };
            if stream.dict.get(b"Subtype").and_then(Object::as_name).ok() == Some(subtype) {
                let name = String::from_utf8_lossy(name_bytes).into_owned();
                found.entry(name).or_insert((*id, stream));
            }
        }
    }

    /// Form XObject自身のリソース。持たない場合は呼び出し元のリソースを使う（旧仕様の継承）。
    fn form_resources<'a>(
        &'a self,
        form: &'a lopdf::Stream,
        inherited: &[&'a Dictionary],
    ) -> Vec<&'a Dictionary> {
        match form.dict.get(b"Resources").map(|o| self.resolve(o)) {
            Ok(Object::Dictionary(d)) => vec![d],
            _ => inherited.to_vec(),
        }
    }

    /// ページから到達できる画像XObject。Form XObjectの中から参照されるものも含む。
    pub fn page_reachable_images(
        &self,
        page_index: u32,
    ) -> crate::error::Result<BTreeSet<ObjectId>> {
        let resources = self.page_resource_dicts(page_index)?;
        let mut images = BTreeSet::new();
        let mut visited_forms = BTreeSet::new();
        self.collect_reachable_images(&resources, &mut images, &mut visited_forms);
        Ok(images)
    }

    fn collect_reachable_images(
        &self,
        resources: &[&Dictionary],
        images: &mut BTreeSet<ObjectId>,
        visited_forms: &mut BTreeSet<ObjectId>,
    ) {
        for dict in resources {
            let mut found = BTreeMap::new();
            self.collect_xobjects(dict, b"Image", &mut found);
            images.extend(found.values().map(|(id, _)| *id));

            let mut forms = BTreeMap::new();
            self.collect_xobjects(dict, b"Form", &mut forms);
            for (form_id, form) in forms.into_values() {
                // 循環参照と共有フォームは一度だけ辿る
                if visited_forms.insert(form_id) {
                    let inner = self.form_resources(form, &[*dict]);
                    self.collect_reachable_images(&inner, images, visited_forms);
                }
            }
        }
    }

    /// ページのコンテンツ統計。描画されるForm XObjectの中身も再帰的に集計する。
    pub fn page_content_stats(&self, page_index: u32) -> crate::error::Result<ContentStats> {
        let content = self.page_content(page_index)?;
        let mut stats = analyze_content(&content)
            .map_err(|e| CompressError::page(page_index, e.to_string()))?;
        let forms = self.page_form_xobjects(page_index)?;
        if forms.is_empty() {
            return Ok(stats);
        }

        let resources = self.page_resource_dicts(page_index)?;
        let names: Vec<String> = stats.placements.iter().map(|p| p.name.clone()).collect();
        let mut stack = Vec::new();
        self.absorb_forms(&mut stats, &names, &forms, &resources, &mut stack)
            .map_err(|e| CompressError::page(page_index, e.to_string()))?;
        Ok(stats)
    }

    /// `names` のうちForm XObjectであるものの中身を `stats` に取り込む。
    /// `stack` は現在たどっているフォームの列（循環検出用）。
    fn absorb_forms(
        &self,
        stats: &mut ContentStats,
        names: &[String],
        forms: &BTreeMap<String, (ObjectId, &lopdf::Stream)>,
        resources: &[&Dictionary],
        stack: &mut Vec<ObjectId>,
    ) -> crate::error::Result<()> {
        for name in names {
            let Some(&(form_id, form)) = forms.get(name) else {
                continue;
            };
            if stack.contains(&form_id) || stack.len() >= MAX_FORM_DEPTH {
                continue;
            }

            let content = form
                .decompressed_content()
                .unwrap_or_else(|_| form.content.clone());
            let inner = analyze_content(&content)?;
            stats.absorb_form(&inner);

            let inner_resources = self.form_resources(form, resources);
            let mut inner_forms = BTreeMap::new();
            for dict in &inner_resources {
                self.collect_xobjects(dict, b"Form", &mut inner_forms);
            }
            if inner_forms.is_empty() {
                continue;
            }
            let inner_names: Vec<String> = inner.placements.iter().map(|p| p.name.clone()).collect();
            stack.push(form_id);
            let result =
                self.absorb_forms(stats, &inner_names, &inner_forms, &inner_resources, stack);
            stack.pop();
            result?;
        }
        Ok(())
    }

    /// ページのコンテンツ＋画像ストリームの合計バイト数（ページ全体を置き換える際の比較基準）。
    pub fn page_payload_size(&self, page_index: u32) -> crate::error::Result<usize> {
        let page_id = self.page_id(page_index)?;
        let content_size: usize = self
            .doc
            .get_page_contents(page_id)
            .iter()
            .filter_map(|id| self.doc.get_object(*id).ok())
            .filter_map(|o| o.as_stream().ok())
            .map(|s| s.content.len())
            .sum();
        let image_size: usize = self
            .page_image_xobjects(page_index)?
            .values()
            .map(|(_, s)| s.content.len())
            .sum();
        Ok(content_size + image_size)
    }
}

/// 暗号化辞書の痕跡（trailerの /Encrypt）がバイト列に含まれるかどうか。
fn contains_encrypt_marker(bytes: &[u8]) -> bool {
    bytes.windows(8).any(|w| w == b"/Encrypt")
}

/// [x0 y0 x1 y1] 配列をBBoxに変換する（整数・実数の混在を許容）。
pub(crate) fn rect_from_object(obj: &Object) -> Option<BBox> {
    let arr = obj.as_array().ok()?;
    if arr.len() < 4 {
        return None;
    }
    let v: Vec<f64> = arr
        .iter()
        .take(4)
        .map(|o| match o {
            Object::Integer(i) => Some(*i as f64),
            Object::Real(f) => Some(*f as f64),
            _ => None,
        })
        .collect::<Option<Vec<_>>>()?;
    Some(BBox {
        x_min: v[0].min(v[2]),
        y_min: v[1].min(v[3]),
        x_max: v[0].max(v[2]),
        y_max: v[1].max(v[3]),
    })
}
