// PDF読み込みテスト: ロード・MediaBox・画像XObject・入力エラー

mod common;

use common::{TestPage, build_encrypted_pdf, build_pdf, document_with_pages};
use lopdf::{Document, Object, dictionary};
use pdf_shrink::error::CompressError;
use pdf_shrink::pdf::reader::SourceDocument;

fn load(mut doc: Document) -> SourceDocument {
    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("save");
    SourceDocument::from_bytes(&bytes).expect("load")
}

/// 1ページ目の辞書を書き換えたドキュメント。
fn with_first_page(pages: &[TestPage], edit: impl FnOnce(&mut lopdf::Dictionary)) -> Document {
    let mut doc = document_with_pages(pages);
    let page_id = doc.page_iter().next().expect("page");
    let dict = doc
        .get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .expect("page dict");
    edit(dict);
    doc
}

// ============================================================
// 1. ロード
// ============================================================

#[test]
fn test_open_reads_page_count_and_size() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("doc.pdf");
    let bytes = build_pdf(&[TestPage::Text(200), TestPage::Scan, TestPage::Empty]);
    std::fs::write(&path, &bytes).expect("write");

    let doc = SourceDocument::open(&path).expect("open");
    assert_eq!(doc.page_count(), 3);
    assert_eq!(doc.byte_size(), bytes.len() as u64);
    assert_eq!(doc.page_ids().len(), 3);
}

#[test]
fn test_open_nonexistent_file_is_invalid_input() {
    let err = SourceDocument::open("/nonexistent/doc.pdf").expect_err("missing");
    assert!(matches!(err, CompressError::InvalidInput(_)));
}

#[test]
fn test_empty_bytes_are_empty_input() {
    let err = SourceDocument::from_bytes(b"").expect_err("empty");
    assert!(matches!(err, CompressError::EmptyInput));
}

#[test]
fn test_encrypted_document_is_rejected() {
    let err = SourceDocument::from_bytes(&build_encrypted_pdf()).expect_err("encrypted");
    assert!(matches!(err, CompressError::Encrypted));
}

#[test]
fn test_out_of_range_page_is_error() {
    let doc = SourceDocument::from_bytes(&build_pdf(&[TestPage::Empty])).expect("load");
    assert!(doc.page_id(1).is_err());
    assert!(doc.media_box(5).is_err());
}

// ============================================================
// 2. MediaBox
// ============================================================

#[test]
fn test_media_box_basic() {
    let doc = SourceDocument::from_bytes(&build_pdf(&[TestPage::Empty])).expect("load");
    let bbox = doc.media_box(0).expect("media box");
    assert_eq!(bbox.width(), 612.0);
    assert_eq!(bbox.height(), 792.0);
}

#[test]
fn test_media_box_with_offset_origin_and_reals() {
    let doc = load(with_first_page(&[TestPage::Empty], |d| {
        d.set(
            "MediaBox",
            vec![
                Object::Real(10.0),
                Object::Real(20.0),
                Object::Real(305.5),
                Object::Real(440.0),
            ],
        );
    }));
    let bbox = doc.media_box(0).expect("media box");
    assert_eq!(bbox.x_min, 10.0);
    assert_eq!(bbox.width(), 295.5);
    assert_eq!(bbox.height(), 420.0);
}

#[test]
fn test_media_box_inherited_from_page_tree() {
    let mut doc = with_first_page(&[TestPage::Empty], |d| {
        d.remove(b"MediaBox");
    });
    let pages_id = doc
        .catalog()
        .and_then(|c| c.get(b"Pages"))
        .and_then(Object::as_reference)
        .expect("pages ref");
    doc.get_object_mut(pages_id)
        .and_then(Object::as_dict_mut)
        .expect("pages dict")
        .set("MediaBox", vec![0.into(), 0.into(), 420.into(), 595.into()]);

    let bbox = load(doc).media_box(0).expect("inherited");
    assert_eq!(bbox.width(), 420.0);
    assert_eq!(bbox.height(), 595.0);
}

#[test]
fn test_media_box_rejects_degenerate_and_oversized_pages() {
    let flat = load(with_first_page(&[TestPage::Empty], |d| {
        d.set("MediaBox", vec![0.into(), 0.into(), 612.into(), 0.into()]);
    }));
    assert!(flat.media_box(0).is_err());

    let huge = load(with_first_page(&[TestPage::Empty], |d| {
        d.set("MediaBox", vec![0.into(), 0.into(), 20_000.into(), 792.into()]);
    }));
    assert!(huge.media_box(0).is_err());

    let malformed = load(with_first_page(&[TestPage::Empty], |d| {
        d.set("MediaBox", vec![0.into(), 0.into()]);
    }));
    assert!(malformed.media_box(0).is_err());
}

// ============================================================
// 3. ページ内容とリソース
// ============================================================

#[test]
fn test_page_content_and_images() {
    let doc = SourceDocument::from_bytes(&build_pdf(&[TestPage::Text(30), TestPage::Scan]))
        .expect("load");

    let text = String::from_utf8(doc.page_content(0).expect("content")).expect("utf8");
    assert!(text.contains("Tj"));
    assert!(doc.page_image_xobjects(0).expect("images").is_empty());

    let images = doc.page_image_xobjects(1).expect("images");
    assert_eq!(images.keys().collect::<Vec<_>>(), vec!["Im0"]);
    assert!(doc.page_form_xobjects(1).expect("forms").is_empty());
    // 非圧縮のグレースケール画像がほぼ全量を占める
    assert!(doc.page_payload_size(1).expect("size") >= 612 * 792);
}

#[test]
fn test_page_without_contents_is_empty() {
    let doc = load(with_first_page(&[TestPage::Empty], |d| {
        d.remove(b"Contents");
    }));
    assert!(doc.page_content(0).expect("content").is_empty());
}

#[test]
fn test_form_xobject_is_detected() {
    let mut doc = document_with_pages(&[TestPage::Empty]);
    let form_id = doc.add_object(lopdf::Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Form",
            "BBox" => vec![0.into(), 0.into(), 10.into(), 10.into()],
        },
        b"0 0 10 10 re f".to_vec(),
    ));
    let page_id = doc.page_iter().next().expect("page");
    doc.get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .expect("page dict")
        .set(
            "Resources",
            dictionary! { "XObject" => dictionary! { "Fm0" => form_id } },
        );

    let doc = load(doc);
    assert_eq!(
        doc.page_form_xobjects(0).expect("forms").keys().collect::<Vec<_>>(),
        vec!["Fm0"]
    );
    assert!(doc.page_image_xobjects(0).expect("images").is_empty());
}

#[test]
fn test_text_drawn_inside_form_counts_as_page_text() {
    let doc = SourceDocument::from_bytes(&build_pdf(&[TestPage::FormText(250)])).expect("load");

    let stats = doc.page_content_stats(0).expect("stats");
    assert_eq!(stats.visible_chars, 250);
    assert_eq!(stats.forms_drawn, 1);
    assert!(stats.has_vector_forms());
    // the page's own stream only places the form
    assert_eq!(stats.placements.len(), 1);
}

#[test]
fn test_self_referencing_form_terminates() {
    let mut doc = document_with_pages(&[TestPage::Empty]);
    let form_id = doc.new_object_id();
    doc.objects.insert(
        form_id,
        Object::Stream(common::form_xobject(
            b"0 0 10 10 re f /Fm0 Do".to_vec(),
            dictionary! { "XObject" => dictionary! { "Fm0" => form_id } },
        )),
    );
    let page_id = doc.page_iter().next().expect("page");
    let page = doc
        .get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .expect("page dict");
    page.set(
        "Resources",
        dictionary! { "XObject" => dictionary! { "Fm0" => form_id } },
    );
    let content_id = page
        .get(b"Contents")
        .and_then(Object::as_reference)
        .expect("contents");
    doc.get_object_mut(content_id)
        .and_then(Object::as_stream_mut)
        .expect("content")
        .set_content(b"/Fm0 Do".to_vec());

    let doc = load(doc);
    let stats = doc.page_content_stats(0).expect("stats");
    assert_eq!(stats.forms_drawn, 1);
    assert_eq!(stats.path_paint_ops, 1);
    assert!(doc.page_reachable_images(0).expect("images").is_empty());
}

#[test]
fn test_images_reachable_through_forms() {
    let (doc, image_id) = common::document_sharing_image_through_form();
    let doc = load(doc);

    // not a direct resource of the text page, but drawn through its form
    assert!(doc.page_image_xobjects(0).expect("images").is_empty());
    assert!(doc.page_reachable_images(0).expect("images").contains(&image_id));
    assert!(doc.page_reachable_images(1).expect("images").contains(&image_id));
}

#[test]
fn test_visible_box_is_crop_box_within_media_box() {
    let plain = load(with_first_page(&[TestPage::Empty], |_| {}));
    assert_eq!(plain.visible_box(0).expect("box"), plain.media_box(0).expect("box"));

    let cropped = load(with_first_page(&[TestPage::Empty], |d| {
        d.set("CropBox", vec![(-20).into(), 100.into(), 300.into(), 900.into()]);
    }));
    let visible = cropped.visible_box(0).expect("box");
    assert_eq!(
        (visible.x_min, visible.y_min, visible.x_max, visible.y_max),
        (0.0, 100.0, 300.0, 792.0)
    );
}

#[test]
fn test_page_facts_report_rotation_and_trim_box() {
    let doc = load(with_first_page(&[TestPage::Empty], |d| {
        d.set("Rotate", -90);
        d.set("TrimBox", vec![10.into(), 10.into(), 602.into(), 782.into()]);
    }));
    let facts = doc.page_facts(0).expect("facts");
    assert_eq!(facts.rotation, 270);
    assert!(facts.has_distinct_trim_box());
    assert_eq!(facts.annotation_count, 0);
}
