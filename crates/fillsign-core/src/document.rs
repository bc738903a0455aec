//! Source PDF access: page count and page boxes

use crate::error::FillSignError;
use crate::geometry::PageSize;
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::sync::Arc;

/// Inheritance chains deeper than this are treated as malformed
const MAX_PARENT_DEPTH: usize = 32;

/// Page boundaries in default user space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaBox {
    pub llx: f64,
    pub lly: f64,
    pub urx: f64,
    pub ury: f64,
}

impl MediaBox {
    pub fn width(&self) -> f64 {
        (self.urx - self.llx).abs()
    }

    pub fn height(&self) -> f64 {
        (self.ury - self.lly).abs()
    }

    pub fn size(&self) -> PageSize {
        PageSize {
            width: self.width(),
            height: self.height(),
        }
    }

    /// Lower-left corner; page-local coordinates are offset by this on export
    pub fn origin(&self) -> (f64, f64) {
        (self.llx.min(self.urx), self.lly.min(self.ury))
    }

    fn letter() -> Self {
        Self {
            llx: 0.0,
            lly: 0.0,
            urx: 612.0,
            ury: 792.0,
        }
    }
}

/// A loaded source PDF. The original bytes are kept for rasterization and
/// for returning untouched when there is nothing to composite.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    bytes: Arc<[u8]>,
    document: Document,
    pages: Vec<ObjectId>,
}

impl SourceDocument {
    pub fn load(bytes: impl Into<Vec<u8>>) -> Result<Self, FillSignError> {
        let bytes: Arc<[u8]> = Arc::from(bytes.into());
        let document = Document::load_mem(&bytes).map_err(|e| FillSignError::SourceLoad(e.to_string()))?;
        let pages: Vec<ObjectId> = document.get_pages().into_values().collect();
        if pages.is_empty() {
            return Err(FillSignError::SourceLoad("Document has no pages".into()));
        }
        tracing::debug!(pages = pages.len(), bytes = bytes.len(), "Loaded source document");
        Ok(Self {
            bytes,
            document,
            pages,
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    pub fn page_id(&self, index: u32) -> Result<ObjectId, FillSignError> {
        self.pages
            .get(index as usize)
            .copied()
            .ok_or(FillSignError::PageOutOfRange {
                index,
                count: self.page_count(),
            })
    }

    /// MediaBox of a page, inherited through `/Parent` when the page has none.
    /// Pages without any MediaBox are treated as US Letter.
    pub fn media_box(&self, index: u32) -> Result<MediaBox, FillSignError> {
        let page_id = self.page_id(index)?;
        Ok(inherited(&self.document, page_id, b"MediaBox")
            .and_then(|obj| parse_box(&self.document, obj))
            .unwrap_or_else(MediaBox::letter))
    }

    pub fn page_size(&self, index: u32) -> Result<PageSize, FillSignError> {
        self.media_box(index).map(|b| b.size())
    }

    /// `/Rotate` in degrees, normalized to 0, 90, 180 or 270
    pub fn rotation(&self, index: u32) -> Result<i64, FillSignError> {
        let page_id = self.page_id(index)?;
        let rotate = inherited(&self.document, page_id, b"Rotate")
            .and_then(|obj| resolve(&self.document, obj).as_i64().ok())
            .unwrap_or(0);
        Ok(rotate.rem_euclid(360))
    }
}

/// Look up an inheritable page attribute, walking up the page tree.
fn inherited<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut current = Some(page_id);
    for _ in 0..MAX_PARENT_DEPTH {
        let dict: &Dictionary = doc.get_object(current?).and_then(|o| o.as_dict()).ok()?;
        if let Ok(value) = dict.get(key) {
            return Some(value);
        }
        current = dict.get(b"Parent").and_then(|p| p.as_reference()).ok();
    }
    None
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        other => other,
    }
}

fn parse_box(doc: &Document, obj: &Object) -> Option<MediaBox> {
    let array = resolve(doc, obj).as_array().ok()?;
    if array.len() != 4 {
        return None;
    }
    let n = |i: usize| obj_to_f64(resolve(doc, &array[i]));
    let media_box = MediaBox {
        llx: n(0)?,
        lly: n(1)?,
        urx: n(2)?,
        ury: n(3)?,
    };
    (media_box.width() > 0.0 && media_box.height() > 0.0).then_some(media_box)
}

fn obj_to_f64(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(f) => Some(f64::from(*f)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::create_test_pdf;
    use lopdf::dictionary;

    #[test]
    fn test_load_reports_pages() {
        let source = SourceDocument::load(create_test_pdf(3)).unwrap();
        assert_eq!(source.page_count(), 3);
        assert_eq!(source.page_size(2).unwrap(), PageSize::letter());
        assert_eq!(source.rotation(0).unwrap(), 0);
    }

    #[test]
    fn test_garbage_is_source_load_error() {
        let err = SourceDocument::load(b"hello".to_vec()).unwrap_err();
        assert!(matches!(err, FillSignError::SourceLoad(_)));
    }

    #[test]
    fn test_out_of_range_page() {
        let source = SourceDocument::load(create_test_pdf(1)).unwrap();
        let err = source.page_size(1).unwrap_err();
        assert!(matches!(err, FillSignError::PageOutOfRange { index: 1, count: 1 }));
    }

    #[test]
    fn test_media_box_inherited_from_parent() {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page_id)],
                "Count" => 1,
                "MediaBox" => vec![10.into(), 20.into(), 605.into(), 862.into()],
                "Rotate" => -90,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();

        let source = SourceDocument::load(bytes).unwrap();
        let media_box = source.media_box(0).unwrap();
        assert_eq!(media_box.size(), PageSize { width: 595.0, height: 842.0 });
        assert_eq!(media_box.origin(), (10.0, 20.0));
        assert_eq!(source.rotation(0).unwrap(), 270);
    }
}
