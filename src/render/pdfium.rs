// pdfium-render wrapper: page -> DynamicImage (in-memory only)

use std::path::{Path, PathBuf};

use image::DynamicImage;
use pdfium_render::prelude::*;

use super::{PageRenderer, undo_page_rotation};
use crate::error::CompressError;
use crate::pdf::reader::SourceDocument;

/// Resolves the path to the pdfium shared library.
///
/// Search order:
/// 1. `PDFIUM_DYNAMIC_LIB_PATH` environment variable
/// 2. `vendor/pdfium/lib/` relative to the project root (for development)
fn resolve_pdfium_lib_path() -> crate::error::Result<PathBuf> {
    if let Ok(path) = std::env::var("PDFIUM_DYNAMIC_LIB_PATH") {
        let p = PathBuf::from(&path);
        if p.exists() {
            return Ok(p);
        }
        return Err(CompressError::render(format!(
            "PDFIUM_DYNAMIC_LIB_PATH is set to '{}' but the path does not exist",
            path
        )));
    }

    if let Ok(manifest_dir) = std::env::var("CARGO_MANIFEST_DIR") {
        let vendor_path = PathBuf::from(&manifest_dir).join("vendor/pdfium/lib");
        if vendor_path.exists() {
            return Ok(vendor_path);
        }
    }

    Err(CompressError::render(
        "pdfium library not found: set PDFIUM_DYNAMIC_LIB_PATH or place libpdfium in vendor/pdfium/lib/",
    ))
}

fn bind(lib_path: &Path) -> crate::error::Result<Pdfium> {
    let lib_path_str = lib_path
        .to_str()
        .ok_or_else(|| CompressError::render("pdfium library path contains non-UTF-8 characters"))?;
    let bindings =
        Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(lib_path_str))?;
    Ok(Pdfium::new(bindings))
}

/// Renders any page through pdfium, reading the source file from disk.
///
/// pdfium handles are not kept between calls; each render binds the library
/// and opens the document again.
pub struct PdfiumRenderer {
    lib_path: PathBuf,
    pdf_path: PathBuf,
}

impl PdfiumRenderer {
    /// Fails when the pdfium library cannot be found or loaded.
    pub fn new(pdf_path: &Path) -> crate::error::Result<Self> {
        let lib_path = resolve_pdfium_lib_path()?;
        bind(&lib_path)?;
        Ok(Self {
            lib_path,
            pdf_path: pdf_path.to_path_buf(),
        })
    }
}

impl PageRenderer for PdfiumRenderer {
    fn render(
        &self,
        doc: &SourceDocument,
        page_index: u32,
        dpi: u32,
    ) -> crate::error::Result<DynamicImage> {
        // pdfium draws the CropBox as displayed, with /Rotate applied
        let area = doc.visible_box(page_index)?;
        let rotation = doc.page_facts(page_index)?.rotation;
        let (shown_w, shown_h) = if rotation % 180 == 0 {
            (area.width(), area.height())
        } else {
            (area.height(), area.width())
        };

        let pdfium = bind(&self.lib_path)?;
        let document = pdfium.load_pdf_from_file(&self.pdf_path, None)?;

        let page_index_u16 = u16::try_from(page_index)
            .map_err(|_| CompressError::render("page index exceeds u16 range"))?;
        let page = document.pages().get(page_index_u16)?;

        // 1 pt = 1/72 inch
        let width_px = ((shown_w * dpi as f64 / 72.0).round() as i32).max(1);
        let height_px = ((shown_h * dpi as f64 / 72.0).round() as i32).max(1);

        let config = PdfRenderConfig::new()
            .set_target_width(width_px)
            .set_target_height(height_px);

        let bitmap = page.render_with_config(&config)?;
        Ok(undo_page_rotation(bitmap.as_image(), rotation))
    }

    fn name(&self) -> &'static str {
        "pdfium"
    }
}
