#[cfg(feature = "pdfium")]
pub mod pdfium;
pub mod raster;

use std::path::Path;

use image::DynamicImage;

use crate::pdf::reader::SourceDocument;

pub use raster::RasterLayerRenderer;

/// Turns one page into a bitmap.
pub trait PageRenderer {
    /// Render page `page_index` (0-indexed) at `dpi`.
    ///
    /// The bitmap covers [`SourceDocument::visible_box`] in unrotated page
    /// space: row 0 is the top edge before `/Rotate` is applied.
    ///
    /// Returns `RenderError` when the page cannot be drawn faithfully; the
    /// caller keeps the original page in that case.
    fn render(
        &self,
        doc: &SourceDocument,
        page_index: u32,
        dpi: u32,
    ) -> crate::error::Result<DynamicImage>;

    fn name(&self) -> &'static str;
}

/// Pick the best renderer available for `source`.
///
/// With the `pdfium` feature and a loadable library, pages are rendered by
/// pdfium; otherwise only image-only pages can be rendered.
pub fn default_renderer(source: &Path) -> Box<dyn PageRenderer> {
    #[cfg(feature = "pdfium")]
    match pdfium::PdfiumRenderer::new(source) {
        Ok(renderer) => return Box::new(renderer),
        Err(e) => tracing::debug!(error = %e, "pdfium unavailable, using raster layer renderer"),
    }
    #[cfg(not(feature = "pdfium"))]
    let _ = source;

    Box::new(RasterLayerRenderer::default())
}

/// Turn a bitmap drawn as the viewer shows the page back into unrotated
/// page space. `rotation` is the page's clockwise `/Rotate`.
pub fn undo_page_rotation(img: DynamicImage, rotation: i64) -> DynamicImage {
    match rotation.rem_euclid(360) {
        90 => img.rotate270(),
        180 => img.rotate180(),
        270 => img.rotate90(),
        _ => img,
    }
}
