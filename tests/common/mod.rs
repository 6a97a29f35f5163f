// Test PDF builders. All fixtures are generated with lopdf; nothing is committed.
#![allow(dead_code)]

use std::path::Path;

use lopdf::{Dictionary, Document, Object, Stream, dictionary};

/// One page of a generated test document.
pub enum TestPage {
    /// Helvetica text line(s) with `chars` visible characters.
    Text(usize),
    /// A full-page, uncompressed grayscale scan with thin text-like strokes.
    Scan,
    /// A full-page DCT image that is already as small as it gets.
    TinyJpeg,
    /// Text with `chars` characters, painted only from inside a form XObject.
    FormText(usize),
    /// No content at all.
    Empty,
}

pub const PAGE_W: i64 = 612;
pub const PAGE_H: i64 = 792;

/// Build a PDF in memory.
pub fn build_pdf(pages: &[TestPage]) -> Vec<u8> {
    let mut doc = document_with_pages(pages);
    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("save test PDF");
    bytes
}

/// Build a PDF and write it to `path`.
pub fn write_pdf(path: &Path, pages: &[TestPage]) {
    std::fs::write(path, build_pdf(pages)).expect("write test PDF");
}

pub fn document_with_pages(pages: &[TestPage]) -> Document {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    let mut kids = Vec::new();
    for page in pages {
        let (content, resources) = match page {
            TestPage::Text(chars) => (
                text_content(*chars),
                dictionary! { "Font" => dictionary! { "F1" => font_id } },
            ),
            TestPage::Scan => {
                let image_id = doc.add_object(scan_image(PAGE_W as u32, PAGE_H as u32));
                (
                    full_page_image_content("Im0"),
                    dictionary! { "XObject" => dictionary! { "Im0" => image_id } },
                )
            }
            TestPage::TinyJpeg => {
                let image_id = doc.add_object(tiny_jpeg_image());
                (
                    full_page_image_content("Im0"),
                    dictionary! { "XObject" => dictionary! { "Im0" => image_id } },
                )
            }
            TestPage::FormText(chars) => {
                let form_id = doc.add_object(form_xobject(
                    text_content(*chars),
                    dictionary! { "Font" => dictionary! { "F1" => font_id } },
                ));
                (
                    b"q 1 0 0 1 0 0 cm /Fm0 Do Q".to_vec(),
                    dictionary! { "XObject" => dictionary! { "Fm0" => form_id } },
                )
            }
            TestPage::Empty => (Vec::new(), Dictionary::new()),
        };

        let content_id = doc.add_object(Stream::new(dictionary! {}, content));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), PAGE_W.into(), PAGE_H.into()],
            "Contents" => content_id,
            "Resources" => resources,
        });
        kids.push(Object::Reference(page_id));
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages.len() as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc
}

/// `chars` characters of text, 60 per line.
pub fn text_content(chars: usize) -> Vec<u8> {
    let mut content = String::from("BT /F1 10 Tf 72 720 Td 12 TL\n");
    let mut remaining = chars;
    let mut line = 0;
    while remaining > 0 {
        let n = remaining.min(60);
        let text: String = (0..n)
            .map(|i| (b'a' + ((i + line) % 26) as u8) as char)
            .collect();
        content.push_str(&format!("({text}) Tj T*\n"));
        remaining -= n;
        line += 1;
    }
    content.push_str("ET");
    content.into_bytes()
}

/// A page-sized form XObject with the given content and resources.
pub fn form_xobject(content: Vec<u8>, resources: Dictionary) -> Stream {
    Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Form",
            "BBox" => vec![0.into(), 0.into(), PAGE_W.into(), PAGE_H.into()],
            "Resources" => resources,
        },
        content,
    )
}

/// Two pages sharing one scan image: page 0 shows text and draws the image
/// through a form XObject, page 1 draws it directly as a full-page scan.
pub fn document_sharing_image_through_form() -> (Document, lopdf::ObjectId) {
    let mut doc = document_with_pages(&[TestPage::Text(400), TestPage::Empty]);
    let image_id = doc.add_object(scan_image(PAGE_W as u32, PAGE_H as u32));
    let form_id = doc.add_object(form_xobject(
        full_page_image_content("Im0"),
        dictionary! { "XObject" => dictionary! { "Im0" => image_id } },
    ));
    let page_ids: Vec<_> = doc.page_iter().collect();

    let text_page = doc
        .get_object_mut(page_ids[0])
        .and_then(Object::as_dict_mut)
        .expect("page dict");
    let mut content = b"q 0.2 0 0 0.2 400 20 cm /Fm0 Do Q\n".to_vec();
    content.extend(text_content(400));
    let content_id_0 = text_page
        .get(b"Contents")
        .and_then(Object::as_reference)
        .expect("contents");
    text_page
        .get_mut(b"Resources")
        .and_then(Object::as_dict_mut)
        .expect("resources")
        .set("XObject", dictionary! { "Fm0" => form_id });
    doc.get_object_mut(content_id_0)
        .and_then(Object::as_stream_mut)
        .expect("content stream")
        .set_content(content);

    let scan_page = doc
        .get_object_mut(page_ids[1])
        .and_then(Object::as_dict_mut)
        .expect("page dict");
    scan_page.set(
        "Resources",
        dictionary! { "XObject" => dictionary! { "Im0" => image_id } },
    );
    let content_id_1 = scan_page
        .get(b"Contents")
        .and_then(Object::as_reference)
        .expect("contents");
    doc.get_object_mut(content_id_1)
        .and_then(Object::as_stream_mut)
        .expect("content stream")
        .set_content(full_page_image_content("Im0"));

    (doc, image_id)
}

pub fn full_page_image_content(name: &str) -> Vec<u8> {
    format!("q {PAGE_W} 0 0 {PAGE_H} 0 0 cm /{name} Do Q").into_bytes()
}

/// Light paper with rows of thin dark dashes, like lines of text, stored
/// without a filter.
pub fn scan_pixels(width: u32, height: u32) -> Vec<u8> {
    let mut pixels = Vec::with_capacity((width * height) as usize);
    for y in 0..height {
        for x in 0..width {
            let in_line = y >= 60 && y < height - 60 && (y % 12) < 2;
            let in_word = x >= 60 && x < width - 60 && (x % 40) < 30;
            pixels.push(if in_line && in_word { 25 } else { 238 });
        }
    }
    pixels
}

pub fn scan_image(width: u32, height: u32) -> Stream {
    Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => "DeviceGray",
            "BitsPerComponent" => 8,
        },
        scan_pixels(width, height),
    )
}

/// An 8x8 gray JPEG at low quality.
pub fn tiny_jpeg_image() -> Stream {
    let img = image::GrayImage::from_pixel(8, 8, image::Luma([200]));
    let mut buf = std::io::Cursor::new(Vec::new());
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, 30);
    img.write_with_encoder(encoder).expect("encode tiny jpeg");
    let mut stream = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => 8,
            "Height" => 8,
            "ColorSpace" => "DeviceGray",
            "BitsPerComponent" => 8,
            "Filter" => "DCTDecode",
        },
        buf.into_inner(),
    );
    stream.allows_compression = false;
    stream
}

/// A one-page document whose trailer carries a Standard security handler
/// that the empty password cannot open.
pub fn build_encrypted_pdf() -> Vec<u8> {
    let mut doc = document_with_pages(&[TestPage::Text(200)]);
    let encrypt_id = doc.add_object(dictionary! {
        "Filter" => "Standard",
        "V" => 1,
        "R" => 2,
        "O" => Object::string_literal(vec![0x5Au8; 32]),
        "U" => Object::string_literal(vec![0xA5u8; 32]),
        "P" => -44,
    });
    doc.trailer.set("Encrypt", Object::Reference(encrypt_id));
    doc.trailer.set(
        "ID",
        vec![
            Object::string_literal(vec![1u8; 16]),
            Object::string_literal(vec![1u8; 16]),
        ],
    );
    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("save encrypted PDF");
    bytes
}
