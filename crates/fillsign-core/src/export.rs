//! Bake annotations into page content
//!
//! Each page with annotations gets its original content wrapped in `q`/`Q`
//! followed by a new content stream that draws stamps (image XObjects) and
//! then text. The result is ordinary page content, not PDF annotations, so
//! it prints and flattens like the rest of the page.

use crate::annotation::{Annotation, AnnotationKind, StampAnnotation, TextAnnotation};
use crate::document::SourceDocument;
use crate::error::FillSignError;
use crate::fonts::{add_helvetica, embed_unicode_font, PdfFont};
use crate::geometry::PdfPoint;
use crate::image::{embed_image, DecodedImage};
use crate::metrics::{FontData, FontMetricsSnapshot};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::Write as _;
use tracing::instrument;

/// Inputs to a single export
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// CSS pixels per PDF point at the time the annotations were edited
    pub pixels_per_point: f64,
    pub metrics: FontMetricsSnapshot,
    /// Face to draw all text with. Helvetica when unset.
    pub text_font: Option<FontData>,
    /// Face for text the primary font cannot show
    pub unicode_font: Option<FontData>,
    /// Multiplier on the vertical baseline correction
    pub baseline_correction_scale: f64,
}

impl ExportOptions {
    pub fn new(pixels_per_point: f64, metrics: FontMetricsSnapshot) -> Self {
        Self {
            pixels_per_point,
            metrics,
            text_font: None,
            unicode_font: None,
            baseline_correction_scale: 1.0,
        }
    }
}

/// Horizontal shift from the control's corner to the first glyph, in points
pub fn structural_offset_pt(metrics: &FontMetricsSnapshot, pixels_per_point: f64) -> f64 {
    metrics.structural.left / pixels_per_point
}

/// Vertical distance from the anchor to the first baseline, in points,
/// before the correction scale is applied.
///
/// The control's top chrome plus the half-leading above the glyph box plus
/// the ascent, all measured at the on-screen font size.
pub fn baseline_correction_pt(size_pt: f64, metrics: &FontMetricsSnapshot, pixels_per_point: f64) -> f64 {
    let font_px = size_pt * pixels_per_point;
    let ascent = metrics.ascent_ratio * font_px;
    let descent = metrics.descent_ratio * font_px;
    let line = metrics.line_height_ratio * font_px;
    let baseline_within = (line - (ascent + descent)) / 2.0 + ascent;
    (metrics.structural.top + baseline_within) / pixels_per_point
}

/// Where the first baseline of a text annotation is drawn
pub fn text_origin(position: PdfPoint, size_pt: f64, options: &ExportOptions) -> PdfPoint {
    let ppp = options.pixels_per_point;
    position.offset(
        structural_offset_pt(&options.metrics, ppp),
        options.baseline_correction_scale * baseline_correction_pt(size_pt, &options.metrics, ppp),
    )
}

fn text_lines(text: &str) -> Vec<&str> {
    text.split('\n').map(|l| l.strip_suffix('\r').unwrap_or(l)).collect()
}

/// Format a number for a content stream: fixed precision, no trailing zeros
fn num(v: f64) -> String {
    let s = format!("{:.4}", v);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" {
        "0".to_string()
    } else {
        s.to_string()
    }
}

/// Load `bytes` and export. Load failures are reported as export failures.
pub fn export_bytes(bytes: &[u8], annotations: &[Annotation], options: &ExportOptions) -> Result<Vec<u8>, FillSignError> {
    let source = SourceDocument::load(bytes.to_vec()).map_err(FillSignError::export)?;
    export_document(&source, annotations, options)
}

/// Composite `annotations` into a copy of `source` and serialize it.
///
/// Annotations on pages the document does not have are skipped. With
/// nothing to draw the source bytes are returned unchanged. Any failure
/// aborts the whole export.
#[instrument(skip_all, fields(annotations = annotations.len(), ppp = options.pixels_per_point))]
pub fn export_document(
    source: &SourceDocument,
    annotations: &[Annotation],
    options: &ExportOptions,
) -> Result<Vec<u8>, FillSignError> {
    composite(source, annotations, options).map_err(FillSignError::export)
}

fn composite(source: &SourceDocument, annotations: &[Annotation], options: &ExportOptions) -> Result<Vec<u8>, FillSignError> {
    if !(options.pixels_per_point.is_finite() && options.pixels_per_point > 0.0) {
        return Err(FillSignError::NotLaidOut);
    }

    let page_count = source.page_count();
    let mut by_page: BTreeMap<u32, Vec<&Annotation>> = BTreeMap::new();
    let mut dropped = 0usize;
    for annotation in annotations {
        if annotation.page_index >= page_count {
            tracing::debug!(
                id = %annotation.id,
                page = annotation.page_index,
                page_count,
                "Dropping annotation on missing page"
            );
            dropped += 1;
            continue;
        }
        annotation.validate()?;
        by_page.entry(annotation.page_index).or_default().push(annotation);
    }

    if by_page.is_empty() {
        return Ok(source.bytes().to_vec());
    }

    let mut doc = source.document().clone();
    let mut fonts = FontResolver::new(options, annotations_text(&by_page));
    let mut images: HashMap<&[u8], (ObjectId, f64)> = HashMap::new();
    let (mut stamps, mut texts) = (0usize, 0usize);

    for (&page_index, page_annotations) in &by_page {
        let page_id = source.page_id(page_index)?;
        let (origin_x, origin_y) = source.media_box(page_index)?.origin();
        let mut names = ResourceNames::new(&doc, page_id);
        let mut content = String::new();
        let mut xobjects: Vec<(String, ObjectId)> = Vec::new();
        let mut page_fonts: Vec<(String, ObjectId)> = Vec::new();

        for annotation in page_annotations {
            let AnnotationKind::Stamp(stamp) = &annotation.kind else {
                continue;
            };
            let (image_id, aspect) = match images.get(stamp.image.as_bytes()) {
                Some(entry) => *entry,
                None => {
                    let decoded = DecodedImage::decode_png(stamp.image.as_bytes())?;
                    let entry = (embed_image(&mut doc, &decoded)?, decoded.aspect_ratio());
                    images.insert(stamp.image.as_bytes(), entry);
                    entry
                }
            };
            let name = match xobjects.iter().find(|(_, id)| *id == image_id) {
                Some((name, _)) => name.clone(),
                None => {
                    let name = names.next_xobject();
                    xobjects.push((name.clone(), image_id));
                    name
                }
            };
            let position = annotation.position.offset(origin_x, origin_y);
            write_stamp(&mut content, &name, position, stamp, aspect);
            stamps += 1;
        }

        for annotation in page_annotations {
            let AnnotationKind::Text(text) = &annotation.kind else {
                continue;
            };
            if text.text.trim().is_empty() {
                continue;
            }
            let font = fonts.font_for(&mut doc, &text.text)?;
            let name = match page_fonts.iter().find(|(_, id)| *id == font.id) {
                Some((name, _)) => name.clone(),
                None => {
                    let name = names.next_font();
                    page_fonts.push((name.clone(), font.id));
                    name
                }
            };
            let origin = text_origin(annotation.position, text.size_pt, options).offset(origin_x, origin_y);
            write_text(&mut content, &name, &font, origin, text, options.metrics.line_height_ratio)?;
            texts += 1;
        }

        if content.is_empty() {
            continue;
        }
        register_resources(&mut doc, page_id, &page_fonts, &xobjects)?;
        wrap_page_content(&mut doc, page_id, content.into_bytes())?;
    }

    let mut output = Vec::new();
    doc.save_to(&mut output)
        .map_err(|e| FillSignError::Write(e.to_string()))?;

    tracing::info!(
        pages = by_page.len(),
        stamps,
        texts,
        dropped,
        bytes = output.len(),
        "Exported document"
    );
    Ok(output)
}

fn annotations_text<'a>(by_page: &BTreeMap<u32, Vec<&'a Annotation>>) -> Vec<&'a str> {
    by_page
        .values()
        .flatten()
        .filter_map(|a| match &a.kind {
            AnnotationKind::Text(t) => Some(t.text.as_str()),
            AnnotationKind::Stamp(_) => None,
        })
        .collect()
}

fn write_stamp(content: &mut String, name: &str, position: PdfPoint, stamp: &StampAnnotation, aspect: f64) {
    let width = stamp.width_pt;
    let height = width * aspect;
    let _ = writeln!(
        content,
        "q {} 0 0 {} {} {} cm /{} Do Q",
        num(width),
        num(height),
        num(position.x),
        num(position.y),
        name
    );
}

fn write_text(
    content: &mut String,
    name: &str,
    font: &PdfFont,
    origin: PdfPoint,
    text: &TextAnnotation,
    line_height_ratio: f64,
) -> Result<(), FillSignError> {
    let advance = text.size_pt * line_height_ratio;
    let _ = writeln!(
        content,
        "BT /{} {} Tf {} {} {} rg",
        name,
        num(text.size_pt),
        num(f64::from(text.color.r)),
        num(f64::from(text.color.g)),
        num(f64::from(text.color.b))
    );
    for (i, line) in text_lines(&text.text).into_iter().enumerate() {
        if line.is_empty() {
            continue;
        }
        let shown = font.show_string(line).ok_or_else(|| {
            FillSignError::FontUnavailable(format!("{} cannot show {:?}", font.base_font, line))
        })?;
        let y = origin.y - i as f64 * advance;
        let _ = writeln!(content, "1 0 0 1 {} {} Tm {} Tj", num(origin.x), num(y), shown);
    }
    content.push_str("ET\n");
    Ok(())
}

/// Picks and lazily embeds fonts for the text of one export
struct FontResolver<'a> {
    options: &'a ExportOptions,
    all_text: Vec<&'a str>,
    primary: Option<PdfFont>,
    fallback: Option<PdfFont>,
}

impl<'a> FontResolver<'a> {
    fn new(options: &'a ExportOptions, all_text: Vec<&'a str>) -> Self {
        Self {
            options,
            all_text,
            primary: None,
            fallback: None,
        }
    }

    fn used_chars(&self) -> BTreeSet<char> {
        self.all_text
            .iter()
            .flat_map(|t| t.chars())
            .filter(|c| !c.is_control())
            .collect()
    }

    fn primary(&mut self, doc: &mut Document) -> Result<&PdfFont, FillSignError> {
        if self.primary.is_none() {
            let options = self.options;
            let font = match &options.text_font {
                Some(face) => {
                    let chars = self.used_chars();
                    embed_unicode_font(doc, face, &chars)?
                }
                None => add_helvetica(doc),
            };
            self.primary = Some(font);
        }
        self.primary
            .as_ref()
            .ok_or_else(|| FillSignError::FontUnavailable("Primary font".into()))
    }

    fn fallback(&mut self, doc: &mut Document) -> Result<&PdfFont, FillSignError> {
        if self.fallback.is_none() {
            let options = self.options;
            let face = options.unicode_font.as_ref().ok_or_else(|| {
                FillSignError::FontUnavailable("Text is not WinAnsi-encodable and no Unicode font is configured".into())
            })?;
            let chars = self.used_chars();
            self.fallback = Some(embed_unicode_font(doc, face, &chars)?);
        }
        self.fallback
            .as_ref()
            .ok_or_else(|| FillSignError::FontUnavailable("Unicode font".into()))
    }

    /// The primary font if it can show every line of `text`, else the fallback
    fn font_for(&mut self, doc: &mut Document, text: &str) -> Result<PdfFont, FillSignError> {
        let lines = text_lines(text);
        let primary = self.primary(doc)?;
        if lines.iter().all(|l| primary.show_string(l).is_some()) {
            return Ok(primary.clone());
        }
        Ok(self.fallback(doc)?.clone())
    }
}

/// Resource names unused by the page, so our entries never shadow its own
struct ResourceNames {
    taken: BTreeSet<Vec<u8>>,
    next: usize,
}

impl ResourceNames {
    fn new(doc: &Document, page_id: ObjectId) -> Self {
        let mut taken = BTreeSet::new();
        if let Some(resources) = inherited_resources(doc, page_id) {
            for key in [b"Font".as_slice(), b"XObject".as_slice()] {
                if let Some(dict) = resources.get(key).ok().and_then(|o| resolve_dict(doc, o)) {
                    taken.extend(dict.iter().map(|(k, _)| k.clone()));
                }
            }
        }
        Self { taken, next: 1 }
    }

    fn fresh(&mut self, prefix: &str) -> String {
        loop {
            let candidate = format!("{}{}", prefix, self.next);
            self.next += 1;
            if self.taken.insert(candidate.clone().into_bytes()) {
                return candidate;
            }
        }
    }

    fn next_font(&mut self) -> String {
        self.fresh("FSF")
    }

    fn next_xobject(&mut self) -> String {
        self.fresh("FSIm")
    }
}

fn resolve_dict<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Dictionary> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok()?.as_dict().ok(),
        Object::Dictionary(dict) => Some(dict),
        _ => None,
    }
}

/// The page's `/Resources`, inherited from an ancestor when absent
fn inherited_resources(doc: &Document, page_id: ObjectId) -> Option<&Dictionary> {
    let mut current = Some(page_id);
    for _ in 0..32 {
        let dict = doc.get_object(current?).ok()?.as_dict().ok()?;
        if let Ok(resources) = dict.get(b"Resources") {
            return resolve_dict(doc, resources);
        }
        current = dict.get(b"Parent").and_then(|p| p.as_reference()).ok();
    }
    None
}

/// Give the page its own direct `/Resources` with our fonts and images added.
///
/// Shared or inherited resource dictionaries are copied rather than
/// modified so other pages are unaffected.
fn register_resources(
    doc: &mut Document,
    page_id: ObjectId,
    fonts: &[(String, ObjectId)],
    xobjects: &[(String, ObjectId)],
) -> Result<(), FillSignError> {
    let mut resources = inherited_resources(doc, page_id).cloned().unwrap_or_default();

    for (key, entries) in [("Font", fonts), ("XObject", xobjects)] {
        if entries.is_empty() {
            continue;
        }
        let mut sub = resources
            .get(key.as_bytes())
            .ok()
            .and_then(|o| resolve_dict(doc, o))
            .cloned()
            .unwrap_or_default();
        for (name, id) in entries {
            sub.set(name.as_bytes().to_vec(), Object::Reference(*id));
        }
        resources.set(key, Object::Dictionary(sub));
    }

    page_dict_mut(doc, page_id)?.set("Resources", Object::Dictionary(resources));
    Ok(())
}

fn page_dict_mut(doc: &mut Document, page_id: ObjectId) -> Result<&mut Dictionary, FillSignError> {
    doc.get_object_mut(page_id)
        .and_then(|o| o.as_dict_mut())
        .map_err(|e| FillSignError::SourceLoad(format!("Page {:?} is not a dictionary: {}", page_id, e)))
}

/// Existing content stream references of a page, in order
fn content_refs(doc: &Document, page_id: ObjectId) -> Vec<Object> {
    let Ok(page) = doc.get_object(page_id).and_then(|o| o.as_dict()) else {
        return Vec::new();
    };
    match page.get(b"Contents") {
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Array(items)) => items.clone(),
            _ => vec![Object::Reference(*id)],
        },
        Ok(Object::Array(items)) => items.clone(),
        _ => Vec::new(),
    }
}

/// `[q-stream, original..., Q + overlay]`
fn wrap_page_content(doc: &mut Document, page_id: ObjectId, overlay: Vec<u8>) -> Result<(), FillSignError> {
    let original = content_refs(doc, page_id);
    let mut contents = Vec::with_capacity(original.len() + 2);

    let tail = if original.is_empty() {
        overlay
    } else {
        let open_id = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
        contents.push(Object::Reference(open_id));
        contents.extend(original);
        // Leading newline keeps `Q` apart from the source's last operator.
        let mut tail = b"\nQ\n".to_vec();
        tail.extend(overlay);
        tail
    };
    let tail_id = doc.add_object(Stream::new(Dictionary::new(), tail));
    contents.push(Object::Reference(tail_id));

    page_dict_mut(doc, page_id)?.set("Contents", Object::Array(contents));
    Ok(())
}
