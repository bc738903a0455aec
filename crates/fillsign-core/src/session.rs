//! Editing session for one source document
//!
//! Owns everything that lives as long as the document is open: the
//! annotation store, drag state, signature capture, metrics probe, tool and
//! zoom. Opening a different document means building a new session, so
//! annotations never leak across documents.

use crate::annotation::{Annotation, AnnotationId, AnnotationKind, AnnotationPatch, Rgb, SizeLimits};
use crate::config::{FillSignConfig, LoadedFonts};
use crate::document::SourceDocument;
use crate::drag::{DragController, DragSession, HitRegion, PointerCapture, PointerId};
use crate::error::FillSignError;
use crate::export::{export_document, ExportOptions};
use crate::geometry::{to_css_point, to_pdf_point, CssPoint, FitLayout, GeometryContext, PageSize, Zoom, ZoomRange};
use crate::metrics::FontMetricsProbe;
use crate::signature::{SignatureCapture, SignaturePad, TypedSignatureStyle};
use crate::store::AnnotationStore;
use serde::{Deserialize, Serialize};

/// What a click on empty page space does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    Select,
    #[default]
    Text,
    Stamp,
}

/// Annotations plus the scale they were edited at; the CLI's input format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditorSnapshot {
    pub pixels_per_point: f64,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

/// An annotation on the current page with its on-screen placement
#[derive(Debug, Clone, PartialEq)]
pub struct VisibleAnnotation<'a> {
    pub annotation: &'a Annotation,
    pub css: CssPoint,
    /// Stamp width in CSS pixels; `None` for text
    pub css_width: Option<f64>,
    pub active: bool,
}

#[derive(Debug)]
pub struct EditorSession {
    source: SourceDocument,
    store: AnnotationStore,
    drag: DragController,
    signature: SignatureCapture,
    pad: SignaturePad,
    metrics: FontMetricsProbe,
    fonts: LoadedFonts,
    tool: Tool,
    zoom: Zoom,
    zoom_range: ZoomRange,
    page_index: u32,
    viewport: Option<(f64, f64)>,
    layout: Option<FitLayout>,
    text_size_pt: f64,
    text_color: Rgb,
    text_limits: SizeLimits,
    stamp_width_pt: f64,
    stamp_limits: SizeLimits,
    typed_style: TypedSignatureStyle,
    baseline_correction_scale: f64,
}

impl EditorSession {
    /// Start a session, loading any fonts the configuration names.
    pub fn new(source: SourceDocument, config: &FillSignConfig) -> Result<Self, FillSignError> {
        let fonts = config.fonts.load(None)?;
        Ok(Self::with_fonts(source, config, fonts))
    }

    pub fn with_fonts(source: SourceDocument, config: &FillSignConfig, fonts: LoadedFonts) -> Self {
        let mut metrics = FontMetricsProbe::new(config.chrome, fonts.text.clone());
        metrics.on_mount();
        let editor = &config.editor;

        Self {
            source,
            store: AnnotationStore::new(),
            drag: DragController::new(),
            signature: SignatureCapture::new(),
            pad: SignaturePad::new(
                config.signature.pad_width,
                config.signature.pad_height,
                config.signature.stroke_width,
                editor.default_text_color,
            ),
            metrics,
            fonts,
            tool: editor.initial_tool,
            zoom: editor.zoom.clamp(Zoom::fit()),
            zoom_range: editor.zoom,
            page_index: 0,
            viewport: None,
            layout: None,
            text_size_pt: editor.text_size_pt.clamp(editor.default_text_size_pt),
            text_color: editor.default_text_color,
            text_limits: editor.text_size_pt,
            stamp_width_pt: editor.stamp_width_pt.clamp(editor.default_stamp_width_pt),
            stamp_limits: editor.stamp_width_pt,
            typed_style: config.signature.typed,
            baseline_correction_scale: config.export.baseline_correction_scale,
        }
    }

    pub fn source(&self) -> &SourceDocument {
        &self.source
    }

    pub fn store(&self) -> &AnnotationStore {
        &self.store
    }

    pub fn metrics(&self) -> &FontMetricsProbe {
        &self.metrics
    }

    /// For forwarding control mount / style / font-load events
    pub fn metrics_mut(&mut self) -> &mut FontMetricsProbe {
        &mut self.metrics
    }

    // ---- page & layout ----

    pub fn page_count(&self) -> u32 {
        self.source.page_count()
    }

    pub fn page_index(&self) -> u32 {
        self.page_index
    }

    pub fn page_size(&self) -> Result<PageSize, FillSignError> {
        self.source.page_size(self.page_index)
    }

    /// Show page `index`, clamped into the document
    pub fn select_page(&mut self, index: u32) -> Result<u32, FillSignError> {
        let clamped = index.min(self.page_count().saturating_sub(1));
        if clamped != self.page_index {
            self.page_index = clamped;
            self.store.set_active(None);
        }
        self.relayout()?;
        Ok(clamped)
    }

    /// Record the wrapper width and device pixel ratio and recompute layout
    pub fn set_layout(&mut self, wrapper_width_css: f64, device_pixel_ratio: f64) -> Result<&FitLayout, FillSignError> {
        self.viewport = Some((wrapper_width_css, device_pixel_ratio));
        self.relayout()?;
        self.layout.as_ref().ok_or(FillSignError::NotLaidOut)
    }

    fn relayout(&mut self) -> Result<(), FillSignError> {
        if let Some((wrapper, dpr)) = self.viewport {
            self.layout = Some(FitLayout::compute(self.page_size()?, wrapper, self.zoom, dpr));
        }
        Ok(())
    }

    pub fn layout(&self) -> Option<&FitLayout> {
        self.layout.as_ref()
    }

    /// Mapping for the current page, or `None` before the first layout
    pub fn geometry(&self) -> Option<GeometryContext> {
        let page = self.page_size().ok()?;
        self.layout.as_ref()?.geometry(page)
    }

    pub fn zoom(&self) -> Zoom {
        self.zoom
    }

    pub fn zoom_in(&mut self) -> Result<Zoom, FillSignError> {
        self.set_zoom(self.zoom_range.zoom_in(self.zoom))
    }

    pub fn zoom_out(&mut self) -> Result<Zoom, FillSignError> {
        self.set_zoom(self.zoom_range.zoom_out(self.zoom))
    }

    pub fn zoom_fit(&mut self) -> Result<Zoom, FillSignError> {
        self.set_zoom(Zoom::fit())
    }

    fn set_zoom(&mut self, zoom: Zoom) -> Result<Zoom, FillSignError> {
        self.zoom = self.zoom_range.clamp(zoom);
        self.relayout()?;
        Ok(self.zoom)
    }

    // ---- tools & placement ----

    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn set_tool(&mut self, tool: Tool) {
        self.tool = tool;
    }

    pub fn set_text_defaults(&mut self, size_pt: f64, color: Rgb) {
        self.text_size_pt = self.text_limits.clamp(size_pt);
        self.text_color = color;
        self.pad.set_color(color);
    }

    pub fn set_stamp_width(&mut self, width_pt: f64) {
        self.stamp_width_pt = self.stamp_limits.clamp(width_pt);
    }

    /// Click on empty page space.
    ///
    /// Places a text or stamp annotation depending on the tool, selects it
    /// and switches to the select tool. Returns the new id, or `None` when
    /// nothing was placed.
    pub fn click(&mut self, css: CssPoint) -> Option<AnnotationId> {
        let ctx = self.geometry()?;
        let position = to_pdf_point(css, &ctx);
        let id = AnnotationId::generate();

        let annotation = match self.tool {
            Tool::Select => return None,
            Tool::Text => Annotation::text(
                id.clone(),
                self.page_index,
                position,
                "Text",
                self.text_size_pt,
                self.text_color,
            )
            .resized(self.text_size_pt, &self.text_limits),
            Tool::Stamp => {
                let image = self.signature.payload()?.clone();
                Annotation::stamp(id.clone(), self.page_index, position, image, self.stamp_width_pt)
                    .resized(self.stamp_width_pt, &self.stamp_limits)
            }
        };

        if !self.store.add(annotation) {
            return None;
        }
        self.store.set_active(Some(&id));
        self.tool = Tool::Select;
        Some(id)
    }

    pub fn set_active(&mut self, id: Option<&AnnotationId>) -> bool {
        self.store.set_active(id)
    }

    /// Edit an annotation; sizes are clamped to the editor limits first.
    pub fn update_annotation(&mut self, id: &AnnotationId, patch: AnnotationPatch) -> bool {
        let patch = AnnotationPatch {
            size_pt: patch.size_pt.map(|v| self.text_limits.clamp(v)),
            width_pt: patch.width_pt.map(|v| self.stamp_limits.clamp(v)),
            ..patch
        };
        self.store.update(id, &patch)
    }

    pub fn remove_active(&mut self) -> bool {
        match self.store.active_id().cloned() {
            Some(id) => self.store.remove(&id),
            None => false,
        }
    }

    pub fn clear_annotations(&mut self) {
        self.store.clear();
    }

    /// Annotations on the current page with their CSS placement.
    /// Empty before the first layout.
    pub fn visible_annotations(&self) -> Vec<VisibleAnnotation<'_>> {
        let Some(ctx) = self.geometry() else {
            return Vec::new();
        };
        let active = self.store.active_id();
        self.store
            .list_for_page(self.page_index)
            .into_iter()
            .map(|annotation| VisibleAnnotation {
                annotation,
                css: to_css_point(annotation.position, &ctx),
                css_width: match &annotation.kind {
                    AnnotationKind::Stamp(stamp) => Some(stamp.width_pt * ctx.pixels_per_point()),
                    AnnotationKind::Text(_) => None,
                },
                active: active == Some(&annotation.id),
            })
            .collect()
    }

    // ---- dragging ----

    /// Pointer pressed on an annotation. Text can only be dragged by its
    /// handle, and only with the select tool.
    pub fn pointer_down(
        &mut self,
        id: &AnnotationId,
        region: HitRegion,
        css: CssPoint,
        pointer_id: PointerId,
        capture: &mut impl PointerCapture,
    ) -> bool {
        if region == HitRegion::TextHandle && self.tool != Tool::Select {
            return false;
        }
        self.drag.pointer_down(&mut self.store, id, region, css, pointer_id, capture)
    }

    pub fn pointer_move(&mut self, css: CssPoint) -> bool {
        match self.geometry() {
            Some(ctx) => self.drag.pointer_move(&mut self.store, css, &ctx),
            None => false,
        }
    }

    pub fn pointer_up(&mut self, capture: &mut impl PointerCapture) -> Option<DragSession> {
        self.drag.pointer_up(capture)
    }

    pub fn pointer_cancel(&mut self, capture: &mut impl PointerCapture) -> Option<DragSession> {
        self.drag.pointer_cancel(capture)
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_dragging()
    }

    // ---- signature ----

    pub fn signature(&self) -> &SignatureCapture {
        &self.signature
    }

    pub fn pad(&self) -> &SignaturePad {
        &self.pad
    }

    pub fn pad_mut(&mut self) -> &mut SignaturePad {
        &mut self.pad
    }

    /// Use the pad drawing as the signature. Returns `false` for an empty pad.
    pub fn save_pad(&mut self) -> Result<bool, FillSignError> {
        self.signature.save_pad(&self.pad)
    }

    pub fn clear_signature(&mut self) {
        self.signature.clear(&mut self.pad);
    }

    pub fn upload_signature(&mut self, png: Vec<u8>) -> Result<(), FillSignError> {
        self.signature.upload(png)
    }

    pub fn typed_style(&self) -> &TypedSignatureStyle {
        &self.typed_style
    }

    pub fn set_typed_style(&mut self, style: TypedSignatureStyle) {
        self.typed_style = style.clamped();
    }

    /// Render typed text as the signature and arm the stamp tool.
    /// Blank text changes nothing and returns `false`.
    pub fn generate_typed_signature(&mut self, text: &str) -> Result<bool, FillSignError> {
        if crate::signature::typed_lines(text).is_none() {
            return Ok(false);
        }
        let font = self
            .fonts
            .signature
            .as_ref()
            .ok_or_else(|| FillSignError::FontUnavailable("No signature font configured".into()))?;
        let created = self.signature.generate_typed(text, &self.typed_style, font)?;
        if created {
            self.tool = Tool::Stamp;
        }
        Ok(created)
    }

    // ---- export ----

    pub fn export_options(&self) -> Result<ExportOptions, FillSignError> {
        let ctx = self.geometry().ok_or(FillSignError::NotLaidOut)?;
        let mut options = ExportOptions::new(ctx.pixels_per_point(), self.metrics.snapshot());
        options.text_font = self.fonts.text.clone();
        options.unicode_font = self.fonts.unicode.clone();
        options.baseline_correction_scale = self.baseline_correction_scale;
        Ok(options)
    }

    pub fn snapshot(&self) -> Result<EditorSnapshot, FillSignError> {
        let ctx = self.geometry().ok_or(FillSignError::NotLaidOut)?;
        Ok(EditorSnapshot {
            pixels_per_point: ctx.pixels_per_point(),
            annotations: self.store.annotations().to_vec(),
        })
    }

    /// Bake every annotation into a copy of the source document
    pub fn export(&self) -> Result<Vec<u8>, FillSignError> {
        let options = self.export_options()?;
        export_document(&self.source, self.store.annotations(), &options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drag::NoCapture;
    use crate::geometry::PdfPoint;
    use crate::test_support::{create_test_pdf, solid_png};
    use pretty_assertions::assert_eq;

    fn session(pages: u32) -> EditorSession {
        let source = SourceDocument::load(create_test_pdf(pages)).unwrap();
        EditorSession::new(source, &FillSignConfig::default()).unwrap()
    }

    fn laid_out(pages: u32) -> EditorSession {
        let mut s = session(pages);
        s.set_layout(612.0, 1.0).unwrap();
        s
    }

    #[test]
    fn test_click_before_layout_places_nothing() {
        let mut s = session(1);
        assert!(s.click(CssPoint::new(10.0, 10.0)).is_none());
        assert!(s.store().is_empty());
        assert!(matches!(s.export(), Err(FillSignError::NotLaidOut)));
    }

    #[test]
    fn test_text_click_places_and_switches_tool() {
        let mut s = laid_out(1);
        assert_eq!(s.tool(), Tool::Text);
        let id = s.click(CssPoint::new(100.0, 92.0)).unwrap();

        let a = s.store().get(&id).unwrap();
        assert_eq!(a.position, PdfPoint::new(100.0, 700.0));
        match &a.kind {
            AnnotationKind::Text(t) => {
                assert_eq!(t.text, "Text");
                assert_eq!(t.size_pt, 14.0);
                assert_eq!(t.color.to_hex(), "#1111FF");
            }
            other => panic!("Expected text, got {:?}", other),
        }
        assert_eq!(s.store().active_id(), Some(&id));
        assert_eq!(s.tool(), Tool::Select);
        assert!(s.click(CssPoint::new(5.0, 5.0)).is_none());
    }

    #[test]
    fn test_click_keeps_configured_size_above_default_limit() {
        let mut config = FillSignConfig::default();
        config.editor.text_size_pt = SizeLimits { min: 8.0, max: 96.0 };
        config.editor.default_text_size_pt = 72.0;
        let source = SourceDocument::load(create_test_pdf(1)).unwrap();
        let mut s = EditorSession::new(source, &config).unwrap();
        s.set_layout(612.0, 1.0).unwrap();

        let id = s.click(CssPoint::new(100.0, 92.0)).unwrap();
        match &s.store().get(&id).unwrap().kind {
            AnnotationKind::Text(t) => assert_eq!(t.size_pt, 72.0),
            other => panic!("Expected text, got {:?}", other),
        }
    }

    #[test]
    fn test_stamp_needs_payload() {
        let mut s = laid_out(1);
        s.set_tool(Tool::Stamp);
        assert!(s.click(CssPoint::new(50.0, 50.0)).is_none());
        assert_eq!(s.tool(), Tool::Stamp);

        s.upload_signature(solid_png(20, 10, [0, 0, 0, 255])).unwrap();
        let id = s.click(CssPoint::new(50.0, 742.0)).unwrap();
        let a = s.store().get(&id).unwrap();
        assert!(a.is_stamp());
        assert_eq!(a.position, PdfPoint::new(50.0, 50.0));
        assert_eq!(s.tool(), Tool::Select);
    }

    #[test]
    fn test_select_page_clamps_and_clears_selection() {
        let mut s = laid_out(3);
        s.click(CssPoint::new(1.0, 1.0)).unwrap();
        assert_eq!(s.select_page(10).unwrap(), 2);
        assert_eq!(s.page_index(), 2);
        assert!(s.store().active_id().is_none());
        assert!(s.visible_annotations().is_empty());
        s.select_page(0).unwrap();
        assert_eq!(s.visible_annotations().len(), 1);
    }

    #[test]
    fn test_zoom_rescales_visible_positions() {
        let mut s = laid_out(1);
        let id = s.click(CssPoint::new(100.0, 100.0)).unwrap();
        s.zoom_in().unwrap();
        s.zoom_in().unwrap();
        assert_eq!(s.zoom().value(), 1.2);

        let visible = s.visible_annotations();
        let v = visible.iter().find(|v| v.annotation.id == id).unwrap();
        assert!((v.css.x - 120.0).abs() < 1e-9);
        assert!((v.css.y - 120.0).abs() < 1e-9);
        assert!(v.active);
        assert_eq!(s.layout().unwrap().zoom.value(), 1.2);

        s.zoom_fit().unwrap();
        assert_eq!(s.zoom().value(), 1.0);
    }

    #[test]
    fn test_text_handle_drag_requires_select_tool() {
        let mut s = laid_out(1);
        let id = s.click(CssPoint::new(100.0, 100.0)).unwrap();
        s.set_tool(Tool::Text);
        assert!(!s.pointer_down(&id, HitRegion::TextHandle, CssPoint::new(100.0, 100.0), 1, &mut NoCapture));

        s.set_tool(Tool::Select);
        assert!(s.pointer_down(&id, HitRegion::TextHandle, CssPoint::new(100.0, 100.0), 1, &mut NoCapture));
        assert!(s.pointer_move(CssPoint::new(110.0, 90.0)));
        s.pointer_up(&mut NoCapture);

        let a = s.store().get(&id).unwrap();
        assert_eq!(a.position, PdfPoint::new(110.0, 702.0));
    }

    #[test]
    fn test_remove_and_clear() {
        let mut s = laid_out(1);
        let a = s.click(CssPoint::new(1.0, 1.0)).unwrap();
        s.set_tool(Tool::Text);
        let b = s.click(CssPoint::new(2.0, 2.0)).unwrap();

        assert!(s.remove_active());
        assert!(!s.store().contains(&b));
        assert!(s.store().contains(&a));
        assert!(!s.remove_active());

        s.clear_annotations();
        assert!(s.store().is_empty());
    }

    #[test]
    fn test_update_clamps_sizes() {
        let mut s = laid_out(1);
        let id = s.click(CssPoint::new(1.0, 1.0)).unwrap();
        s.update_annotation(
            &id,
            AnnotationPatch {
                size_pt: Some(400.0),
                ..AnnotationPatch::default()
            },
        );
        match &s.store().get(&id).unwrap().kind {
            AnnotationKind::Text(t) => assert_eq!(t.size_pt, 48.0),
            other => panic!("Expected text, got {:?}", other),
        }
    }

    #[test]
    fn test_blank_typed_signature_is_ignored() {
        let mut s = laid_out(1);
        s.set_tool(Tool::Select);
        assert!(!s.generate_typed_signature("   ").unwrap());
        assert_eq!(s.tool(), Tool::Select);
        assert!(!s.signature().has_payload());
    }

    #[test]
    fn test_typed_signature_without_font() {
        let mut s = laid_out(1);
        let err = s.generate_typed_signature("Jane").unwrap_err();
        assert!(matches!(err, FillSignError::FontUnavailable(_)));
    }

    #[test]
    fn test_export_uses_current_ppp() {
        let mut s = laid_out(1);
        s.set_layout(1224.0, 2.0).unwrap();
        let options = s.export_options().unwrap();
        assert_eq!(options.pixels_per_point, 2.0);
        assert_eq!(options.baseline_correction_scale, 1.0);

        s.click(CssPoint::new(10.0, 10.0)).unwrap();
        let out = s.export().unwrap();
        assert!(out.starts_with(b"%PDF-"));
    }

    #[test]
    fn test_snapshot_round_trips_through_json() {
        let mut s = laid_out(1);
        s.upload_signature(solid_png(2, 2, [0, 0, 0, 255])).unwrap();
        s.click(CssPoint::new(10.0, 10.0)).unwrap();
        s.set_tool(Tool::Stamp);
        s.click(CssPoint::new(20.0, 20.0)).unwrap();

        let snapshot = s.snapshot().unwrap();
        let json = serde_json::to_string(&snapshot).unwrap();
        let back: EditorSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
        assert_eq!(back.annotations.len(), 2);
    }
}
