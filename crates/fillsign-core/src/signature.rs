//! Signature capture: freehand pad, uploaded image, typed text
//!
//! Every path ends in the same place, a PNG [`ImagePayload`] held by
//! [`SignatureCapture`] and placed on pages as stamps.

use crate::annotation::{ImagePayload, Rgb};
use crate::error::FillSignError;
use crate::image::{png_dimensions, DecodedImage};
use crate::metrics::FontData;
use serde::{Deserialize, Serialize};
use tiny_skia::{FillRule, LineCap, LineJoin, Paint, Path, PathBuilder, Pixmap, Stroke, Transform};
use ttf_parser::{GlyphId, OutlineBuilder};

pub const DEFAULT_PAD_WIDTH: u32 = 290;
pub const DEFAULT_PAD_HEIGHT: u32 = 140;
pub const DEFAULT_STROKE_WIDTH: f32 = 2.0;

/// Freehand drawing surface. Coordinates are pad pixels, top-left origin.
#[derive(Debug, Clone)]
pub struct SignaturePad {
    width: u32,
    height: u32,
    stroke_width: f32,
    color: Rgb,
    strokes: Vec<Vec<(f32, f32)>>,
    drawing: bool,
}

impl Default for SignaturePad {
    fn default() -> Self {
        Self::new(DEFAULT_PAD_WIDTH, DEFAULT_PAD_HEIGHT, DEFAULT_STROKE_WIDTH, Rgb::BLACK)
    }
}

impl SignaturePad {
    pub fn new(width: u32, height: u32, stroke_width: f32, color: Rgb) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            stroke_width,
            color,
            strokes: Vec::new(),
            drawing: false,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Color for strokes drawn from now on
    pub fn set_color(&mut self, color: Rgb) {
        self.color = color;
    }

    pub fn begin_stroke(&mut self, x: f32, y: f32) {
        self.strokes.push(vec![(x, y)]);
        self.drawing = true;
    }

    /// Extend the current stroke; ignored when no stroke is in progress.
    pub fn extend_stroke(&mut self, x: f32, y: f32) {
        if !self.drawing {
            return;
        }
        if let Some(stroke) = self.strokes.last_mut() {
            stroke.push((x, y));
        }
    }

    pub fn end_stroke(&mut self) {
        self.drawing = false;
    }

    pub fn clear(&mut self) {
        self.strokes.clear();
        self.drawing = false;
    }

    pub fn is_empty(&self) -> bool {
        self.strokes.is_empty()
    }

    pub fn strokes(&self) -> &[Vec<(f32, f32)>] {
        &self.strokes
    }

    /// Rasterize the strokes to a transparent PNG, or `None` if nothing was drawn.
    pub fn save(&self) -> Result<Option<ImagePayload>, FillSignError> {
        if self.is_empty() {
            return Ok(None);
        }
        let mut pixmap = new_pixmap(self.width, self.height)?;
        let paint = solid_paint(self.color);
        let stroke = Stroke {
            width: self.stroke_width,
            line_cap: LineCap::Round,
            line_join: LineJoin::Round,
            ..Stroke::default()
        };

        for points in &self.strokes {
            match points.as_slice() {
                [] => {}
                [(x, y)] => {
                    // A tap with no movement still leaves a round dot
                    if let Some(dot) = PathBuilder::from_circle(*x, *y, self.stroke_width / 2.0) {
                        pixmap.fill_path(&dot, &paint, FillRule::Winding, Transform::identity(), None);
                    }
                }
                [(x0, y0), rest @ ..] => {
                    let mut pb = PathBuilder::new();
                    pb.move_to(*x0, *y0);
                    for (x, y) in rest {
                        pb.line_to(*x, *y);
                    }
                    if let Some(path) = pb.finish() {
                        pixmap.stroke_path(&path, &paint, &stroke, Transform::identity(), None);
                    }
                }
            }
        }

        encode(&pixmap).map(Some)
    }
}

/// Accept uploaded PNG bytes as a signature after checking they decode.
pub fn validate_upload(bytes: Vec<u8>) -> Result<ImagePayload, FillSignError> {
    DecodedImage::decode_png(&bytes)?;
    Ok(ImagePayload::from_png_bytes(bytes))
}

/// Appearance of a typed signature
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TypedSignatureStyle {
    pub size_px: f64,
    /// Shear angle in degrees; 0 draws upright glyphs
    pub slant_deg: f64,
    pub color: Rgb,
    pub padding_px: f64,
}

impl Default for TypedSignatureStyle {
    fn default() -> Self {
        Self {
            size_px: 72.0,
            slant_deg: 0.0,
            color: Rgb::new(0x11 as f32 / 255.0, 0x11 as f32 / 255.0, 1.0),
            padding_px: 12.0,
        }
    }
}

impl TypedSignatureStyle {
    pub const MIN_SIZE_PX: f64 = 24.0;
    pub const MAX_SIZE_PX: f64 = 200.0;
    pub const MAX_SLANT_DEG: f64 = 25.0;

    /// The style with size and slant pulled into the editor's ranges
    pub fn clamped(self) -> Self {
        let size_px = if self.size_px.is_finite() {
            self.size_px.clamp(Self::MIN_SIZE_PX, Self::MAX_SIZE_PX)
        } else {
            Self::default().size_px
        };
        let slant_deg = if self.slant_deg.is_finite() {
            self.slant_deg.clamp(-Self::MAX_SLANT_DEG, Self::MAX_SLANT_DEG)
        } else {
            0.0
        };
        Self {
            size_px,
            slant_deg,
            ..self
        }
    }

    pub fn line_height_px(&self) -> f64 {
        (self.size_px * 1.2).round()
    }

    pub fn shear(&self) -> f64 {
        self.slant_deg.to_radians().tan()
    }
}

/// Ink extents of one line of typed text, in pixels relative to its origin
#[derive(Debug, Clone, PartialEq)]
struct LineMetrics {
    glyphs: Vec<(GlyphId, f64)>,
    ink_left: f64,
    ink_right: f64,
    ascent: f64,
    descent: f64,
}

impl LineMetrics {
    fn measure(face: &ttf_parser::Face<'_>, text: &str, scale: f64) -> Self {
        let mut glyphs = Vec::new();
        let mut pen = 0.0;
        let mut ink: Option<(f64, f64, f64, f64)> = None;

        for ch in text.chars() {
            let gid = face.glyph_index(ch).unwrap_or(GlyphId(0));
            if let Some(bbox) = face.glyph_bounding_box(gid) {
                let left = pen + f64::from(bbox.x_min) * scale;
                let right = pen + f64::from(bbox.x_max) * scale;
                let top = f64::from(bbox.y_max) * scale;
                let bottom = -f64::from(bbox.y_min) * scale;
                ink = Some(match ink {
                    None => (left, right, top, bottom),
                    Some((l, r, t, b)) => (l.min(left), r.max(right), t.max(top), b.max(bottom)),
                });
            }
            glyphs.push((gid, pen));
            pen += f64::from(face.glyph_hor_advance(gid).unwrap_or(0)) * scale;
        }

        let (ink_left, ink_right, ascent, descent) = ink.unwrap_or((0.0, pen, 0.0, 0.0));
        Self {
            glyphs,
            ink_left,
            ink_right,
            ascent: ascent.max(0.0),
            descent: descent.max(0.0),
        }
    }

    fn width(&self) -> f64 {
        self.ink_right - self.ink_left
    }
}

/// Glyph outlines into a tiny-skia path, scaled, flipped to y-down and
/// sheared horizontally in proportion to the distance below the baseline.
struct GlyphPathBuilder {
    builder: PathBuilder,
    origin_x: f32,
    baseline: f32,
    scale: f32,
    shear: f32,
}

impl GlyphPathBuilder {
    fn new(origin_x: f32, baseline: f32, scale: f32, shear: f32) -> Self {
        Self {
            builder: PathBuilder::new(),
            origin_x,
            baseline,
            scale,
            shear,
        }
    }

    fn map(&self, x: f32, y: f32) -> (f32, f32) {
        let up = y * self.scale;
        (self.origin_x + x * self.scale - self.shear * up, self.baseline - up)
    }

    fn finish(self) -> Option<Path> {
        self.builder.finish()
    }
}

impl OutlineBuilder for GlyphPathBuilder {
    fn move_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.map(x, y);
        self.builder.move_to(x, y);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.map(x, y);
        self.builder.line_to(x, y);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        let (x1, y1) = self.map(x1, y1);
        let (x, y) = self.map(x, y);
        self.builder.quad_to(x1, y1, x, y);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        let (x1, y1) = self.map(x1, y1);
        let (x2, y2) = self.map(x2, y2);
        let (x, y) = self.map(x, y);
        self.builder.cubic_to(x1, y1, x2, y2, x, y);
    }

    fn close(&mut self) {
        self.builder.close();
    }
}

/// Split typed input into lines, or `None` when there is nothing to draw.
pub fn typed_lines(text: &str) -> Option<Vec<&str>> {
    let raw = text.trim();
    if raw.is_empty() {
        return None;
    }
    Some(raw.split('\n').map(|line| line.strip_suffix('\r').unwrap_or(line)).collect())
}

/// Render typed text as a transparent PNG.
///
/// Blank input yields `Ok(None)` before the font is touched.
pub fn render_typed_signature(
    text: &str,
    style: &TypedSignatureStyle,
    font: &FontData,
) -> Result<Option<ImagePayload>, FillSignError> {
    let Some(lines) = typed_lines(text) else {
        return Ok(None);
    };
    let style = style.clamped();
    let face = font.face()?;
    let scale = style.size_px / f64::from(face.units_per_em());

    let metrics: Vec<LineMetrics> = lines
        .iter()
        .map(|line| LineMetrics::measure(&face, line, scale))
        .collect();

    let max_w = metrics.iter().map(|m| m.width().ceil()).fold(0.0, f64::max);
    let max_asc = metrics.iter().map(|m| m.ascent.ceil()).fold(0.0, f64::max);
    let max_desc = metrics.iter().map(|m| m.descent.ceil()).fold(0.0, f64::max);
    let pad = style.padding_px.max(0.0);
    let line_height = style.line_height_px();

    // Horizontal shift at the top of the tallest glyph and at the deepest descender
    let shear = style.shear();
    let shift_top = -shear * max_asc;
    let shift_bottom = shear * max_desc;
    let min_shift = shift_top.min(shift_bottom).min(0.0);
    let max_shift = shift_top.max(shift_bottom).max(0.0);
    let shear_extra = (max_shift - min_shift).ceil();

    let width = (max_w + 2.0 * pad + shear_extra).max(1.0);
    let height = (2.0 * pad + max_asc + max_desc + (metrics.len() as f64 - 1.0) * line_height).max(1.0);

    let mut pixmap = new_pixmap(width as u32, height as u32)?;
    let paint = solid_paint(style.color);

    for (i, line) in metrics.iter().enumerate() {
        let baseline = pad + max_asc + i as f64 * line_height;
        let line_origin = pad - min_shift - line.ink_left;
        for (gid, pen) in &line.glyphs {
            let mut builder = GlyphPathBuilder::new(
                (line_origin + pen) as f32,
                baseline as f32,
                scale as f32,
                shear as f32,
            );
            if face.outline_glyph(*gid, &mut builder).is_none() {
                continue;
            }
            if let Some(path) = builder.finish() {
                pixmap.fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);
            }
        }
    }

    tracing::debug!(lines = metrics.len(), width, height, "Rendered typed signature");
    encode(&pixmap).map(Some)
}

/// Where a payload is drawn inside the pad preview
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviewRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Contain-fit an image into a box, centered, preserving aspect ratio.
pub fn contain_fit(image_w: u32, image_h: u32, box_w: u32, box_h: u32) -> Option<PreviewRect> {
    if image_w == 0 || image_h == 0 || box_w == 0 || box_h == 0 {
        return None;
    }
    let scale = (f64::from(box_w) / f64::from(image_w)).min(f64::from(box_h) / f64::from(image_h));
    let width = ((f64::from(image_w) * scale).floor() as u32).max(1);
    let height = ((f64::from(image_h) * scale).floor() as u32).max(1);
    Some(PreviewRect {
        x: box_w.saturating_sub(width) / 2,
        y: box_h.saturating_sub(height) / 2,
        width,
        height,
    })
}

/// The signature currently available for stamping
#[derive(Debug, Clone, Default)]
pub struct SignatureCapture {
    payload: Option<ImagePayload>,
}

impl SignatureCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn payload(&self) -> Option<&ImagePayload> {
        self.payload.as_ref()
    }

    pub fn has_payload(&self) -> bool {
        self.payload.is_some()
    }

    /// Take the pad drawing. An empty pad leaves the current payload alone.
    pub fn save_pad(&mut self, pad: &SignaturePad) -> Result<bool, FillSignError> {
        match pad.save()? {
            Some(payload) => {
                self.payload = Some(payload);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn upload(&mut self, bytes: Vec<u8>) -> Result<(), FillSignError> {
        self.payload = Some(validate_upload(bytes)?);
        Ok(())
    }

    /// Generate from typed text. Blank text leaves the current payload alone.
    pub fn generate_typed(
        &mut self,
        text: &str,
        style: &TypedSignatureStyle,
        font: &FontData,
    ) -> Result<bool, FillSignError> {
        match render_typed_signature(text, style, font)? {
            Some(payload) => {
                self.payload = Some(payload);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Drop the payload and wipe the pad
    pub fn clear(&mut self, pad: &mut SignaturePad) {
        pad.clear();
        self.payload = None;
    }

    /// Preview rectangle of the current payload inside a pad-sized box
    pub fn preview_rect(&self, pad: &SignaturePad) -> Result<Option<PreviewRect>, FillSignError> {
        let Some(payload) = &self.payload else {
            return Ok(None);
        };
        let (w, h) = png_dimensions(payload.as_bytes())?;
        Ok(contain_fit(w, h, pad.width(), pad.height()))
    }
}

fn new_pixmap(width: u32, height: u32) -> Result<Pixmap, FillSignError> {
    Pixmap::new(width, height).ok_or_else(|| FillSignError::Raster(format!("Invalid canvas size {}x{}", width, height)))
}

fn solid_paint(color: Rgb) -> Paint<'static> {
    let [r, g, b, a] = color.to_rgba8();
    let mut paint = Paint::default();
    paint.set_color_rgba8(r, g, b, a);
    paint.anti_alias = true;
    paint
}

fn encode(pixmap: &Pixmap) -> Result<ImagePayload, FillSignError> {
    pixmap
        .encode_png()
        .map(ImagePayload::from_png_bytes)
        .map_err(|e| FillSignError::Raster(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{solid_png, system_font};
    use pretty_assertions::assert_eq;

    fn decoded(payload: &ImagePayload) -> DecodedImage {
        DecodedImage::decode_png(payload.as_bytes()).unwrap()
    }

    #[test]
    fn test_empty_pad_saves_nothing() {
        assert!(SignaturePad::default().save().unwrap().is_none());
    }

    #[test]
    fn test_pad_strokes_produce_ink() {
        let mut pad = SignaturePad::default();
        pad.begin_stroke(10.0, 10.0);
        pad.extend_stroke(100.0, 60.0);
        pad.extend_stroke(200.0, 20.0);
        pad.end_stroke();

        let img = decoded(&pad.save().unwrap().unwrap());
        assert_eq!((img.width, img.height), (290, 140));
        let alpha = img.alpha.expect("strokes on a transparent pad");
        assert!(alpha.iter().any(|&a| a > 0));
        assert!(alpha.iter().any(|&a| a == 0));
    }

    #[test]
    fn test_moves_without_stroke_are_ignored() {
        let mut pad = SignaturePad::default();
        pad.extend_stroke(5.0, 5.0);
        assert!(pad.is_empty());

        pad.begin_stroke(1.0, 1.0);
        pad.end_stroke();
        pad.extend_stroke(9.0, 9.0);
        assert_eq!(pad.strokes(), &[vec![(1.0, 1.0)]]);
    }

    #[test]
    fn test_single_tap_draws_a_dot() {
        let mut pad = SignaturePad::new(20, 20, 4.0, Rgb::BLACK);
        pad.begin_stroke(10.0, 10.0);
        pad.end_stroke();
        let img = decoded(&pad.save().unwrap().unwrap());
        let alpha = img.alpha.unwrap();
        assert!(alpha[10 * 20 + 10] > 0);
    }

    #[test]
    fn test_clear_wipes_pad_and_payload() {
        let mut pad = SignaturePad::default();
        let mut capture = SignatureCapture::new();
        pad.begin_stroke(1.0, 1.0);
        pad.extend_stroke(50.0, 50.0);
        assert!(capture.save_pad(&pad).unwrap());
        capture.clear(&mut pad);
        assert!(pad.is_empty());
        assert!(!capture.has_payload());
    }

    #[test]
    fn test_upload_validates_png() {
        let mut capture = SignatureCapture::new();
        assert!(matches!(
            capture.upload(b"GIF89a".to_vec()),
            Err(FillSignError::ImageDecode(_))
        ));
        assert!(!capture.has_payload());

        capture.upload(solid_png(10, 5, [0, 0, 0, 255])).unwrap();
        assert!(capture.has_payload());
    }

    #[test]
    fn test_typed_lines() {
        assert_eq!(typed_lines("  \n\t "), None);
        assert_eq!(typed_lines(" Jane\r\nDoe "), Some(vec!["Jane", "Doe"]));
        assert_eq!(typed_lines("a\n\nb"), Some(vec!["a", "", "b"]));
    }

    #[test]
    fn test_blank_typed_keeps_existing_payload() {
        let mut capture = SignatureCapture::new();
        capture.upload(solid_png(10, 5, [0, 0, 0, 255])).unwrap();
        let before = capture.payload().cloned();

        let Some(font) = system_font() else {
            // Blank text must short-circuit before touching the font
            assert!(typed_lines("   ").is_none());
            return;
        };
        let changed = capture
            .generate_typed("   \n  ", &TypedSignatureStyle::default(), &font)
            .unwrap();
        assert!(!changed);
        assert_eq!(capture.payload().cloned(), before);
    }

    #[test]
    fn test_typed_canvas_size() {
        let Some(font) = system_font() else {
            return;
        };
        let style = TypedSignatureStyle {
            size_px: 40.0,
            ..TypedSignatureStyle::default()
        };
        let one = decoded(&render_typed_signature("Jane", &style, &font).unwrap().unwrap());
        let two = decoded(&render_typed_signature("Jane\nJane", &style, &font).unwrap().unwrap());

        assert_eq!(one.width, two.width);
        assert_eq!(two.height - one.height, style.line_height_px() as u32);
        assert!(one.width > 24);
        assert!(one.alpha.unwrap().iter().any(|&a| a > 0));
    }

    #[test]
    fn test_slant_widens_canvas() {
        let Some(font) = system_font() else {
            return;
        };
        let upright = TypedSignatureStyle::default();
        let slanted = TypedSignatureStyle {
            slant_deg: 20.0,
            ..upright
        };
        let a = decoded(&render_typed_signature("Hg", &upright, &font).unwrap().unwrap());
        let b = decoded(&render_typed_signature("Hg", &slanted, &font).unwrap().unwrap());
        assert!(b.width > a.width);
        assert_eq!(a.height, b.height);
    }

    #[test]
    fn test_style_clamps() {
        let style = TypedSignatureStyle {
            size_px: 500.0,
            slant_deg: -80.0,
            ..TypedSignatureStyle::default()
        }
        .clamped();
        assert_eq!(style.size_px, 200.0);
        assert_eq!(style.slant_deg, -25.0);
        assert_eq!(TypedSignatureStyle::default().line_height_px(), 86.0);
    }

    #[test]
    fn test_contain_fit() {
        assert_eq!(
            contain_fit(580, 140, 290, 140),
            Some(PreviewRect {
                x: 0,
                y: 35,
                width: 290,
                height: 70
            })
        );
        assert_eq!(
            contain_fit(100, 200, 290, 140),
            Some(PreviewRect {
                x: 110,
                y: 0,
                width: 70,
                height: 140
            })
        );
        assert_eq!(contain_fit(0, 10, 290, 140), None);
    }

    #[test]
    fn test_preview_rect_of_payload() {
        let pad = SignaturePad::default();
        let mut capture = SignatureCapture::new();
        assert_eq!(capture.preview_rect(&pad).unwrap(), None);
        capture.upload(solid_png(29, 14, [0, 0, 0, 255])).unwrap();
        assert_eq!(
            capture.preview_rect(&pad).unwrap(),
            Some(PreviewRect {
                x: 0,
                y: 0,
                width: 290,
                height: 140
            })
        );
    }
}
