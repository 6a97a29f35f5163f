// 出力前の最適化: 新規ストリームのFlateDecode圧縮、孤立オブジェクト除去、元ページの検証

use std::collections::BTreeMap;
use std::io::Write;

use flate2::Compression;
use flate2::write::ZlibEncoder;
use lopdf::{Document, Object, ObjectId};
use sha2::{Digest, Sha256};

use crate::error::CompressError;

/// 指定したストリームのうち未圧縮のものにFlateDecode圧縮を適用する。
///
/// 元の文書から引き継いだストリームには触れない（元ページのバイト列を保つ）。
/// 既にフィルターが設定されているストリームはスキップする（二重圧縮防止）。
pub fn compress_streams(doc: &mut Document, stream_ids: &[ObjectId]) {
    for id in stream_ids {
        let Some(Object::Stream(stream)) = doc.objects.get_mut(id) else {
            continue;
        };
        if stream.dict.get(b"Filter").is_ok() {
            continue;
        }

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
        if encoder.write_all(&stream.content).is_err() {
            continue;
        }
        let Ok(compressed) = encoder.finish() else {
            continue;
        };
        // 小さな出力で圧縮が逆効果になる場合はそのまま
        if compressed.len() < stream.content.len() {
            stream.dict.set("Filter", "FlateDecode");
            stream.set_content(compressed);
        }
    }
}

/// 孤立オブジェクト（どこからも参照されていないオブジェクト）を除去する。
pub fn delete_unused_objects(doc: &mut Document) -> usize {
    doc.prune_objects().len()
}

/// ページのコンテンツストリーム（エンコード済みの生バイト列）のSHA-256。
pub fn page_content_digest(doc: &Document, page_id: ObjectId) -> crate::error::Result<String> {
    let mut hasher = Sha256::new();
    for content_id in doc.get_page_contents(page_id) {
        let stream = doc
            .get_object(content_id)
            .and_then(Object::as_stream)
            .map_err(|e| {
                CompressError::reassembly(format!("content {:?} of page {:?}: {}", content_id, page_id, e))
            })?;
        hasher.update(&stream.content);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// 元のまま残すページのダイジェストを計算する。
pub fn page_digests(
    doc: &Document,
    page_ids: &[ObjectId],
) -> crate::error::Result<BTreeMap<ObjectId, String>> {
    page_ids
        .iter()
        .map(|&id| Ok((id, page_content_digest(doc, id)?)))
        .collect()
}

/// 元のまま残したページのコンテンツが出力側でも同一であることを確認する。
pub fn verify_page_digests(
    doc: &Document,
    expected: &BTreeMap<ObjectId, String>,
) -> crate::error::Result<()> {
    for (&page_id, digest) in expected {
        let actual = page_content_digest(doc, page_id)?;
        if &actual != digest {
            return Err(CompressError::reassembly(format!(
                "page {:?} was meant to be copied unmodified but its content changed",
                page_id
            )));
        }
    }
    Ok(())
}

/// 最適化の全パスを順序通りに実行する。
///
/// 1. 今回作成したストリームを圧縮
/// 2. 孤立オブジェクトを除去
pub fn optimize(doc: &mut Document, new_stream_ids: &[ObjectId]) -> usize {
    compress_streams(doc, new_stream_ids);
    delete_unused_objects(doc)
}
