//! Annotation records placed on PDF pages
//!
//! An annotation is either freeform text or an image stamp (typically a
//! signature). Both share an identifier, an owning page and an anchor point
//! in PDF point space.

use crate::error::FillSignError;
use crate::geometry::PdfPoint;
use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Opaque annotation identifier, unique within a store
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnnotationId(String);

impl AnnotationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh random identifier
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AnnotationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// RGB color with channels in `0.0..=1.0`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb {
        r: 0.0,
        g: 0.0,
        b: 0.0,
    };

    pub fn new(r: f32, g: f32, b: f32) -> Self {
        Self {
            r: r.clamp(0.0, 1.0),
            g: g.clamp(0.0, 1.0),
            b: b.clamp(0.0, 1.0),
        }
    }

    pub fn to_rgba8(self) -> [u8; 4] {
        [
            (self.r * 255.0).round() as u8,
            (self.g * 255.0).round() as u8,
            (self.b * 255.0).round() as u8,
            255,
        ]
    }

    pub fn to_hex(self) -> String {
        let [r, g, b, _] = self.to_rgba8();
        format!("#{:02X}{:02X}{:02X}", r, g, b)
    }
}

impl Default for Rgb {
    fn default() -> Self {
        Self::BLACK
    }
}

/// Parses `#RRGGBB`, `RRGGBB` and the `#RGB` shorthand.
impl FromStr for Rgb {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.trim().trim_start_matches('#');
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(format!("Invalid color: {}", s));
        }
        let expanded: String = match hex.len() {
            3 => hex.chars().flat_map(|c| [c, c]).collect(),
            6 => hex.to_string(),
            _ => return Err(format!("Invalid color: {}", s)),
        };
        let channel = |i: usize| {
            u8::from_str_radix(&expanded[i..i + 2], 16)
                .map(|v| v as f32 / 255.0)
                .map_err(|_| format!("Invalid color: {}", s))
        };
        Ok(Rgb::new(channel(0)?, channel(2)?, channel(4)?))
    }
}

impl Serialize for Rgb {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Rgb {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

const PNG_DATA_URL_PREFIX: &str = "data:image/png;base64,";

/// Encoded PNG bytes of a stamp image.
///
/// Cheap to clone; the bytes are shared between the signature capture and
/// every stamp placed from it.
#[derive(Clone, PartialEq, Eq)]
pub struct ImagePayload(Arc<[u8]>);

impl ImagePayload {
    pub fn from_png_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(Arc::from(bytes.into()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_data_url(&self) -> String {
        format!(
            "{}{}",
            PNG_DATA_URL_PREFIX,
            base64::engine::general_purpose::STANDARD.encode(&self.0)
        )
    }

    pub fn from_data_url(url: &str) -> Result<Self, FillSignError> {
        let encoded = url
            .strip_prefix(PNG_DATA_URL_PREFIX)
            .ok_or_else(|| FillSignError::ImageDecode("Expected a PNG data URL".into()))?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| FillSignError::ImageDecode(e.to_string()))?;
        Ok(Self::from_png_bytes(bytes))
    }
}

impl fmt::Debug for ImagePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ImagePayload({} bytes)", self.0.len())
    }
}

impl Serialize for ImagePayload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_data_url())
    }
}

impl<'de> Deserialize<'de> for ImagePayload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_data_url(&s).map_err(serde::de::Error::custom)
    }
}

/// Freeform text. The anchor's y is the baseline of the first line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextAnnotation {
    pub text: String,
    pub size_pt: f64,
    pub color: Rgb,
}

/// Image stamp. The anchor is the bottom-left corner of the image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StampAnnotation {
    pub image: ImagePayload,
    pub width_pt: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AnnotationKind {
    Text(TextAnnotation),
    Stamp(StampAnnotation),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: AnnotationId,
    pub page_index: u32,
    pub position: PdfPoint,
    #[serde(flatten)]
    pub kind: AnnotationKind,
}

impl Annotation {
    /// Text annotation; `size_pt` is clamped to [`SizeLimits::TEXT_PT`].
    pub fn text(
        id: AnnotationId,
        page_index: u32,
        position: PdfPoint,
        text: impl Into<String>,
        size_pt: f64,
        color: Rgb,
    ) -> Self {
        Self {
            id,
            page_index,
            position,
            kind: AnnotationKind::Text(TextAnnotation {
                text: text.into(),
                size_pt: SizeLimits::TEXT_PT.clamp(size_pt),
                color,
            }),
        }
    }

    /// Image stamp; `width_pt` is clamped to [`SizeLimits::STAMP_WIDTH_PT`].
    pub fn stamp(id: AnnotationId, page_index: u32, position: PdfPoint, image: ImagePayload, width_pt: f64) -> Self {
        Self {
            id,
            page_index,
            position,
            kind: AnnotationKind::Stamp(StampAnnotation {
                image,
                width_pt: SizeLimits::STAMP_WIDTH_PT.clamp(width_pt),
            }),
        }
    }

    /// Replace the text size or stamp width, clamped to `limits` instead of the defaults.
    pub fn resized(mut self, value: f64, limits: &SizeLimits) -> Self {
        let value = limits.clamp(value);
        match &mut self.kind {
            AnnotationKind::Text(text) => text.size_pt = value,
            AnnotationKind::Stamp(stamp) => stamp.width_pt = value,
        }
        self
    }

    /// Reject geometry that cannot be written to a content stream.
    ///
    /// Records deserialized from JSON never pass through the constructors,
    /// so this is checked again before anything is drawn.
    pub fn validate(&self) -> Result<(), FillSignError> {
        let invalid = |what: &str| Err(FillSignError::InvalidAnnotation(format!("{}: {}", self.id, what)));
        if !(self.position.x.is_finite() && self.position.y.is_finite()) {
            return invalid("position is not finite");
        }
        match &self.kind {
            AnnotationKind::Text(text) => {
                if !is_positive(text.size_pt) {
                    return invalid("text size must be positive");
                }
                let Rgb { r, g, b } = text.color;
                if ![r, g, b].iter().all(|c| c.is_finite()) {
                    return invalid("color is not finite");
                }
            }
            AnnotationKind::Stamp(stamp) => {
                if !is_positive(stamp.width_pt) {
                    return invalid("stamp width must be positive");
                }
            }
        }
        Ok(())
    }

    pub fn is_text(&self) -> bool {
        matches!(self.kind, AnnotationKind::Text(_))
    }

    pub fn is_stamp(&self) -> bool {
        matches!(self.kind, AnnotationKind::Stamp(_))
    }

    /// Merge the provided fields of `patch` into this annotation.
    ///
    /// Fields that do not apply to this kind are ignored, as are sizes that
    /// are not strictly positive and finite.
    pub fn apply(&mut self, patch: &AnnotationPatch) {
        if let Some(position) = patch.position {
            if position.x.is_finite() && position.y.is_finite() {
                self.position = position;
            }
        }
        match &mut self.kind {
            AnnotationKind::Text(text) => {
                if let Some(value) = &patch.text {
                    text.text.clone_from(value);
                }
                if let Some(size) = patch.size_pt.filter(|v| is_positive(*v)) {
                    text.size_pt = size;
                }
                if let Some(color) = patch.color {
                    text.color = color;
                }
            }
            AnnotationKind::Stamp(stamp) => {
                if let Some(width) = patch.width_pt.filter(|v| is_positive(*v)) {
                    stamp.width_pt = width;
                }
                if let Some(image) = &patch.image {
                    stamp.image = image.clone();
                }
            }
        }
    }
}

fn is_positive(v: f64) -> bool {
    v.is_finite() && v > 0.0
}

/// Partial update for an annotation; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotationPatch {
    pub position: Option<PdfPoint>,
    pub text: Option<String>,
    pub size_pt: Option<f64>,
    pub color: Option<Rgb>,
    pub width_pt: Option<f64>,
    pub image: Option<ImagePayload>,
}

impl AnnotationPatch {
    pub fn position(position: PdfPoint) -> Self {
        Self {
            position: Some(position),
            ..Self::default()
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }
}

/// Inclusive bounds the editor clamps user input into before it reaches the store
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SizeLimits {
    pub min: f64,
    pub max: f64,
}

impl SizeLimits {
    pub const TEXT_PT: SizeLimits = SizeLimits { min: 8.0, max: 48.0 };
    pub const STAMP_WIDTH_PT: SizeLimits = SizeLimits {
        min: 60.0,
        max: 600.0,
    };

    pub fn clamp(&self, value: f64) -> f64 {
        if value.is_finite() {
            value.clamp(self.min, self.max)
        } else {
            self.min
        }
    }
}
