// 出力文書の組立: ページごとの決定を元文書のコピーに適用し、原子的に書き出す

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::{BufWriter, Write};
use std::path::Path;

use lopdf::{Document, ObjectId};
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument, warn};

use crate::error::CompressError;
use crate::mrc::EncodedLayer;
use crate::pdf::reader::SourceDocument;
use crate::pdf::{optimizer, writer};
use crate::pipeline::extractor::{AssetPayload, AssetTarget, ExtractedAsset};
use crate::pipeline::page_processor::{PageDecision, ProcessedPage};

/// Summary of a written document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReassemblyReport {
    pub pages_in: u32,
    pub pages_out: u32,
    pub pages_rebuilt: usize,
    pub images_replaced: usize,
    pub pages_dropped: usize,
    pub bytes_written: u64,
}

/// Applies page decisions to a copy of the source document.
///
/// Decisions are applied as they arrive, so extracted assets are released
/// page by page. Page order is the source order regardless of the order in
/// which decisions arrive.
pub struct Reassembler<'a> {
    source: &'a SourceDocument,
    doc: Document,
    /// Image XObject -> pages that can draw it, directly or through forms.
    image_users: HashMap<ObjectId, BTreeSet<u32>>,
    seen: BTreeSet<u32>,
    kept_pages: BTreeSet<u32>,
    dropped_pages: BTreeSet<u32>,
    replaced_images: BTreeSet<ObjectId>,
    /// Replacements for images shared by several pages, applied at the end
    /// only if none of those pages is kept unmodified.
    shared_images: BTreeMap<ObjectId, EncodedLayer>,
    new_streams: Vec<ObjectId>,
    pages_rebuilt: usize,
}

impl<'a> Reassembler<'a> {
    pub fn new(source: &'a SourceDocument) -> Self {
        let mut image_users: HashMap<ObjectId, BTreeSet<u32>> = HashMap::new();
        for page_index in 0..source.page_count() {
            if let Ok(images) = source.page_reachable_images(page_index) {
                for object_id in images {
                    image_users.entry(object_id).or_default().insert(page_index);
                }
            }
        }

        Self {
            source,
            doc: source.document().clone(),
            image_users,
            seen: BTreeSet::new(),
            kept_pages: BTreeSet::new(),
            dropped_pages: BTreeSet::new(),
            replaced_images: BTreeSet::new(),
            shared_images: BTreeMap::new(),
            new_streams: Vec::new(),
            pages_rebuilt: 0,
        }
    }

    /// Whether any applied decision changes the document.
    pub fn has_changes(&self) -> bool {
        self.pages_rebuilt > 0
            || !self.replaced_images.is_empty()
            || !self.shared_images.is_empty()
            || !self.dropped_pages.is_empty()
    }

    pub fn apply(&mut self, page: ProcessedPage) -> crate::error::Result<()> {
        let page_index = page.page_index;
        if page_index >= self.source.page_count() {
            return Err(CompressError::reassembly(format!(
                "page {page_index} is out of range"
            )));
        }
        if !self.seen.insert(page_index) {
            return Err(CompressError::reassembly(format!(
                "page {page_index} was decided twice"
            )));
        }

        match page.decision {
            PageDecision::Original => {
                self.kept_pages.insert(page_index);
            }
            PageDecision::Drop => {
                self.dropped_pages.insert(page_index);
            }
            PageDecision::Replace(assets) => {
                for asset in assets {
                    self.apply_asset(page_index, asset)?;
                }
            }
        }
        Ok(())
    }

    fn apply_asset(&mut self, page_index: u32, asset: ExtractedAsset) -> crate::error::Result<()> {
        match (asset.target, asset.payload) {
            (AssetTarget::Page, payload) => {
                let page_id = self.source.page_id(page_index)?;
                let content_id = match &payload {
                    AssetPayload::Image(image) => {
                        writer::write_image_page(&mut self.doc, page_id, &asset.bounding_box, image)?
                    }
                    AssetPayload::Layers(layers) => writer::write_layered_page(
                        &mut self.doc,
                        page_id,
                        &asset.bounding_box,
                        layers,
                    )?,
                };
                self.new_streams.push(content_id);
                self.pages_rebuilt += 1;
            }
            (AssetTarget::XObject(object_id), AssetPayload::Image(image)) => {
                if self.replaced_images.contains(&object_id) {
                    return Ok(());
                }
                let shared = self
                    .image_users
                    .get(&object_id)
                    .is_some_and(|users| users.len() > 1);
                if shared {
                    self.shared_images.entry(object_id).or_insert(image);
                } else {
                    writer::replace_image_xobject(&mut self.doc, object_id, &image)?;
                    self.replaced_images.insert(object_id);
                }
            }
            (AssetTarget::XObject(object_id), AssetPayload::Layers(_)) => {
                return Err(CompressError::reassembly(format!(
                    "layered payload cannot replace image {:?}",
                    object_id
                )));
            }
        }
        Ok(())
    }

    /// Release what earlier decisions superseded: content and images of
    /// rebuilt pages are pruned and new streams compressed. Called between
    /// batches; returns the number of objects released.
    pub fn checkpoint(&mut self) -> usize {
        if self.pages_rebuilt == 0 && self.replaced_images.is_empty() {
            return 0;
        }
        optimizer::optimize(&mut self.doc, &self.new_streams)
    }

    /// Finish the document and write it to `output` atomically.
    ///
    /// The file at `output` is either the complete new document or
    /// untouched; a failure never leaves a partial file there.
    #[instrument(skip_all, fields(output = %output.display()))]
    pub fn finish(mut self, output: &Path) -> crate::error::Result<ReassemblyReport> {
        let pages_in = self.source.page_count();
        // Pages never decided (e.g. skipped by an error upstream) stay as-is.
        for page_index in 0..pages_in {
            if !self.seen.contains(&page_index) {
                self.kept_pages.insert(page_index);
            }
        }

        self.apply_shared_images()?;
        let pages_dropped = self.drop_empty_pages()?;

        let kept_ids: Vec<ObjectId> = self
            .kept_pages
            .iter()
            .map(|&i| self.source.page_id(i))
            .collect::<crate::error::Result<_>>()?;
        let expected = optimizer::page_digests(self.source.document(), &kept_ids)?;

        let pruned = optimizer::optimize(&mut self.doc, &self.new_streams);
        optimizer::verify_page_digests(&self.doc, &expected)?;

        let pages_out = self.doc.get_pages().len() as u32;
        if pages_out as usize + pages_dropped != pages_in as usize {
            return Err(CompressError::reassembly(format!(
                "page count mismatch: {pages_in} in, {pages_out} out, {pages_dropped} dropped"
            )));
        }

        let bytes_written = write_atomically(&mut self.doc, output)?;
        let report = ReassemblyReport {
            pages_in,
            pages_out,
            pages_rebuilt: self.pages_rebuilt,
            images_replaced: self.replaced_images.len(),
            pages_dropped,
            bytes_written,
        };
        info!(
            pages_out,
            pages_rebuilt = report.pages_rebuilt,
            images_replaced = report.images_replaced,
            pruned,
            bytes = bytes_written,
            "Document written"
        );
        Ok(report)
    }

    fn apply_shared_images(&mut self) -> crate::error::Result<()> {
        let shared = std::mem::take(&mut self.shared_images);
        for (object_id, image) in shared {
            let users = self.image_users.get(&object_id);
            let used_by_kept_page =
                users.is_some_and(|u| u.iter().any(|p| self.kept_pages.contains(p)));
            if used_by_kept_page {
                debug!(?object_id, "Shared image is used by an unmodified page, not replaced");
                continue;
            }
            // every user was rebuilt and a checkpoint already released it
            if !self.doc.objects.contains_key(&object_id) {
                continue;
            }
            writer::replace_image_xobject(&mut self.doc, object_id, &image)?;
            self.replaced_images.insert(object_id);
        }
        Ok(())
    }

    /// Remove empty pages, unless that would remove every page.
    fn drop_empty_pages(&mut self) -> crate::error::Result<usize> {
        if self.dropped_pages.is_empty() {
            return Ok(0);
        }
        if self.dropped_pages.len() as u32 == self.source.page_count() {
            warn!("Every page is empty, keeping them all");
            let all = std::mem::take(&mut self.dropped_pages);
            self.kept_pages.extend(all);
            return Ok(0);
        }
        // delete_pages takes 1-based page numbers
        let numbers: Vec<u32> = self.dropped_pages.iter().map(|i| i + 1).collect();
        self.doc.delete_pages(&numbers);
        Ok(numbers.len())
    }
}

/// Serialize `doc` next to `output` and rename it into place.
fn write_atomically(doc: &mut Document, output: &Path) -> crate::error::Result<u64> {
    let parent = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(parent)
        .map_err(|e| CompressError::save(format!("cannot stage {}: {}", output.display(), e)))?;

    {
        let mut out = BufWriter::new(tmp.as_file_mut());
        doc.save_to(&mut out)
            .map_err(|e| CompressError::reassembly(format!("serializing document: {e}")))?;
        out.flush()
            .map_err(|e| CompressError::save(format!("writing {}: {}", output.display(), e)))?;
    }
    tmp.as_file()
        .sync_all()
        .map_err(|e| CompressError::save(format!("syncing {}: {}", output.display(), e)))?;

    let file = tmp
        .persist(output)
        .map_err(|e| CompressError::save(format!("renaming into {}: {}", output.display(), e)))?;
    let bytes = file.metadata()?.len();
    Ok(bytes)
}
