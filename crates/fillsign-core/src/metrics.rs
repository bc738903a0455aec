//! Font metrics and structural offsets of the editable text control
//!
//! The editor draws text inside a padded, bordered control. What the user
//! sees as "where the text is" is therefore offset from the annotation
//! anchor by the chrome around the glyphs and by the ascent / leading of the
//! font. This module measures those quantities so export can undo them.

use crate::error::FillSignError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// String measured to find the ascent (cap `M`) and descent (tail of `g`).
pub const PROBE_TEXT: &str = "Mg";
/// Reference size the probe string is measured at.
pub const PROBE_SIZE: f64 = 100.0;
/// CSS `line-height: normal` approximation.
pub const NORMAL_LINE_HEIGHT: f64 = 1.2;

/// Ascent / descent used when a face has no outlines for the probe string.
const FALLBACK_ASCENT: f64 = 0.8;
const FALLBACK_DESCENT: f64 = 0.2;

/// Helvetica `M` top and `g` bottom from the standard AFM, per 1000 units.
const HELVETICA_ASCENT: f64 = 0.718;
const HELVETICA_DESCENT: f64 = 0.220;

/// Left / top padding and border widths of one box, in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BoxEdges {
    pub padding_left: f64,
    pub padding_top: f64,
    pub border_left: f64,
    pub border_top: f64,
}

impl BoxEdges {
    pub fn left(&self) -> f64 {
        self.padding_left + self.border_left
    }

    pub fn top(&self) -> f64 {
        self.padding_top + self.border_top
    }
}

/// The nested boxes between an annotation's anchor and its first glyph:
/// the draggable wrapper and the text control inside it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorChrome {
    pub wrapper: BoxEdges,
    pub control: BoxEdges,
}

impl Default for EditorChrome {
    fn default() -> Self {
        Self {
            wrapper: BoxEdges {
                padding_left: 4.0,
                padding_top: 2.0,
                border_left: 1.0,
                border_top: 1.0,
            },
            control: BoxEdges {
                padding_left: 6.0,
                padding_top: 4.0,
                border_left: 1.0,
                border_top: 1.0,
            },
        }
    }
}

impl EditorChrome {
    pub fn structural_offset(&self) -> StructuralOffset {
        StructuralOffset {
            left: self.wrapper.left() + self.control.left(),
            top: self.wrapper.top() + self.control.top(),
        }
    }
}

/// Distance from the control's outer corner to its content box, CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StructuralOffset {
    pub left: f64,
    pub top: f64,
}

impl Default for StructuralOffset {
    fn default() -> Self {
        Self {
            left: 12.0,
            top: 8.0,
        }
    }
}

/// Resolved CSS `line-height` of the text control
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineHeight {
    #[default]
    Normal,
    Px(f64),
    Multiple(f64),
}

impl LineHeight {
    pub fn resolve_px(self, font_size_px: f64) -> f64 {
        match self {
            LineHeight::Normal => font_size_px * NORMAL_LINE_HEIGHT,
            LineHeight::Px(px) => px,
            LineHeight::Multiple(m) => font_size_px * m,
        }
    }

    /// Line height as a multiple of the font size
    pub fn ratio(self, font_size_px: f64) -> f64 {
        if font_size_px > 0.0 {
            self.resolve_px(font_size_px) / font_size_px
        } else {
            NORMAL_LINE_HEIGHT
        }
    }
}

/// Computed style of the text control that metrics depend on
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorStyle {
    pub font_size_px: f64,
    pub line_height: LineHeight,
    pub chrome: EditorChrome,
}

impl Default for EditorStyle {
    fn default() -> Self {
        Self {
            font_size_px: 14.0,
            line_height: LineHeight::Normal,
            chrome: EditorChrome::default(),
        }
    }
}

/// A parsed-on-demand TrueType / OpenType font file
#[derive(Clone)]
pub struct FontData {
    bytes: Arc<Vec<u8>>,
    face_index: u32,
}

impl FontData {
    /// Wrap font bytes, failing if they do not parse as a face.
    pub fn from_bytes(bytes: Vec<u8>, face_index: u32) -> Result<Self, FillSignError> {
        ttf_parser::Face::parse(&bytes, face_index).map_err(|e| FillSignError::FontParse(e.to_string()))?;
        Ok(Self {
            bytes: Arc::new(bytes),
            face_index,
        })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, FillSignError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .map_err(|e| FillSignError::FontUnavailable(format!("{}: {}", path.display(), e)))?;
        Self::from_bytes(bytes, 0)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn face_index(&self) -> u32 {
        self.face_index
    }

    pub fn face(&self) -> Result<ttf_parser::Face<'_>, FillSignError> {
        ttf_parser::Face::parse(&self.bytes, self.face_index).map_err(|e| FillSignError::FontParse(e.to_string()))
    }

    /// PostScript name for embedding, or a sanitized fallback
    pub fn postscript_name(&self) -> String {
        let name = self.face().ok().and_then(|face| {
            face.names()
                .into_iter()
                .find(|n| n.name_id == ttf_parser::name_id::POST_SCRIPT_NAME && n.is_unicode())
                .and_then(|n| n.to_string())
        });
        name.map(|n| n.chars().filter(|c| c.is_ascii_alphanumeric() || *c == '-').collect())
            .filter(|n: &String| !n.is_empty())
            .unwrap_or_else(|| "EmbeddedFont".to_string())
    }
}

impl std::fmt::Debug for FontData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontData")
            .field("bytes", &self.bytes.len())
            .field("face_index", &self.face_index)
            .finish()
    }
}

/// Everything export needs to undo the control's visual offset
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FontMetricsSnapshot {
    pub ascent_ratio: f64,
    pub descent_ratio: f64,
    pub line_height_ratio: f64,
    pub structural: StructuralOffset,
}

impl Default for FontMetricsSnapshot {
    fn default() -> Self {
        Self {
            ascent_ratio: FALLBACK_ASCENT,
            descent_ratio: FALLBACK_DESCENT,
            line_height_ratio: NORMAL_LINE_HEIGHT,
            structural: StructuralOffset::default(),
        }
    }
}

/// Ascent and descent of the probe string as fractions of the font size.
///
/// With no face, Helvetica's values are used since that is what export
/// draws with by default.
pub fn measure_font_ratios(font: Option<&FontData>) -> (f64, f64) {
    let Some(font) = font else {
        return (HELVETICA_ASCENT, HELVETICA_DESCENT);
    };
    let Ok(face) = font.face() else {
        return (FALLBACK_ASCENT, FALLBACK_DESCENT);
    };
    let scale = PROBE_SIZE / f64::from(face.units_per_em());

    let mut ascent: Option<f64> = None;
    let mut descent: Option<f64> = None;
    for ch in PROBE_TEXT.chars() {
        let Some(bbox) = face.glyph_index(ch).and_then(|gid| face.glyph_bounding_box(gid)) else {
            continue;
        };
        let top = f64::from(bbox.y_max) * scale;
        let bottom = -f64::from(bbox.y_min) * scale;
        ascent = Some(ascent.map_or(top, |a| a.max(top)));
        descent = Some(descent.map_or(bottom, |d| d.max(bottom)));
    }

    match (ascent, descent) {
        (Some(a), Some(d)) if a > 0.0 => (a / PROBE_SIZE, d.max(0.0) / PROBE_SIZE),
        _ => (FALLBACK_ASCENT, FALLBACK_DESCENT),
    }
}

pub fn measure(style: &EditorStyle, font: Option<&FontData>) -> FontMetricsSnapshot {
    let (ascent_ratio, descent_ratio) = measure_font_ratios(font);
    FontMetricsSnapshot {
        ascent_ratio,
        descent_ratio,
        line_height_ratio: style.line_height.ratio(style.font_size_px),
        structural: style.chrome.structural_offset(),
    }
}

/// Holds the latest metrics and re-measures when the control changes
#[derive(Debug)]
pub struct FontMetricsProbe {
    style: EditorStyle,
    font: Option<FontData>,
    snapshot: FontMetricsSnapshot,
    measured_style: Option<EditorStyle>,
    generation: u64,
}

impl FontMetricsProbe {
    pub fn new(style: EditorStyle, font: Option<FontData>) -> Self {
        Self {
            style,
            font,
            snapshot: FontMetricsSnapshot::default(),
            measured_style: None,
            generation: 0,
        }
    }

    pub fn on_mount(&mut self) -> FontMetricsSnapshot {
        self.remeasure()
    }

    pub fn on_style_changed(&mut self, style: EditorStyle) -> FontMetricsSnapshot {
        self.style = style;
        self.remeasure()
    }

    pub fn on_font_loaded(&mut self, font: FontData) -> FontMetricsSnapshot {
        self.font = Some(font);
        self.remeasure()
    }

    /// Record a new style without measuring yet
    pub fn set_style(&mut self, style: EditorStyle) {
        self.style = style;
    }

    pub fn is_stale(&self) -> bool {
        self.measured_style.as_ref() != Some(&self.style)
    }

    pub fn snapshot(&self) -> FontMetricsSnapshot {
        self.snapshot
    }

    pub fn style(&self) -> &EditorStyle {
        &self.style
    }

    pub fn font(&self) -> Option<&FontData> {
        self.font.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn remeasure(&mut self) -> FontMetricsSnapshot {
        self.snapshot = measure(&self.style, self.font.as_ref());
        self.measured_style = Some(self.style);
        self.generation += 1;
        tracing::debug!(
            generation = self.generation,
            ascent = self.snapshot.ascent_ratio,
            descent = self.snapshot.descent_ratio,
            line_height = self.snapshot.line_height_ratio,
            "Measured text control metrics"
        );
        self.snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::system_font;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_before_measurement() {
        let probe = FontMetricsProbe::new(EditorStyle::default(), None);
        let snap = probe.snapshot();
        assert_eq!(snap.ascent_ratio, 0.8);
        assert_eq!(snap.descent_ratio, 0.2);
        assert_eq!(snap.line_height_ratio, 1.2);
        assert_eq!(snap.structural, StructuralOffset { left: 12.0, top: 8.0 });
        assert!(probe.is_stale());
    }

    #[test]
    fn test_default_chrome_sums_to_default_offset() {
        assert_eq!(EditorChrome::default().structural_offset(), StructuralOffset::default());
    }

    #[test]
    fn test_structural_offset_sums_both_boxes() {
        let chrome = EditorChrome {
            wrapper: BoxEdges {
                padding_left: 3.0,
                padding_top: 5.0,
                border_left: 2.0,
                border_top: 0.0,
            },
            control: BoxEdges {
                padding_left: 1.0,
                padding_top: 1.0,
                border_left: 1.0,
                border_top: 1.0,
            },
        };
        assert_eq!(chrome.structural_offset(), StructuralOffset { left: 7.0, top: 7.0 });
    }

    #[test]
    fn test_line_height_resolution() {
        assert!((LineHeight::Normal.resolve_px(20.0) - 24.0).abs() < 1e-12);
        assert_eq!(LineHeight::Px(18.0).ratio(12.0), 1.5);
        assert_eq!(LineHeight::Multiple(1.4).ratio(10.0), 1.4);
        assert_eq!(LineHeight::Px(18.0).ratio(0.0), NORMAL_LINE_HEIGHT);
    }

    #[test]
    fn test_no_font_uses_helvetica_ratios() {
        assert_eq!(measure_font_ratios(None), (0.718, 0.220));
    }

    #[test]
    fn test_hooks_bump_generation() {
        let mut probe = FontMetricsProbe::new(EditorStyle::default(), None);
        probe.on_mount();
        assert_eq!(probe.generation(), 1);
        assert!(!probe.is_stale());

        let style = EditorStyle {
            line_height: LineHeight::Px(28.0),
            ..EditorStyle::default()
        };
        probe.set_style(style);
        assert!(probe.is_stale());
        let snap = probe.on_style_changed(style);
        assert_eq!(probe.generation(), 2);
        assert_eq!(snap.line_height_ratio, 2.0);
        assert!(!probe.is_stale());
    }

    #[test]
    fn test_invalid_font_bytes_rejected() {
        let err = FontData::from_bytes(vec![0u8; 16], 0).unwrap_err();
        assert!(matches!(err, FillSignError::FontParse(_)));
    }

    #[test]
    fn test_missing_font_file() {
        let err = FontData::from_file("/definitely/not/here.ttf").unwrap_err();
        assert!(matches!(err, FillSignError::FontUnavailable(_)));
    }

    #[test]
    fn test_real_font_ratios_are_plausible() {
        let Some(font) = system_font() else {
            return;
        };
        let (asc, desc) = measure_font_ratios(Some(&font));
        assert!(asc > 0.5 && asc < 1.0, "ascent {}", asc);
        assert!(desc > 0.05 && desc < 0.5, "descent {}", desc);

        let mut probe = FontMetricsProbe::new(EditorStyle::default(), None);
        let snap = probe.on_font_loaded(font);
        assert_eq!(snap.ascent_ratio, asc);
        assert!(!probe.font().unwrap().postscript_name().is_empty());
    }
}
