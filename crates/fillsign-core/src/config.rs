//! Configuration loaded from TOML
//!
//! Every section and field has a default, so an empty file (or no file at
//! all) yields the stock editor.

use crate::annotation::{Rgb, SizeLimits};
use crate::error::FillSignError;
use crate::geometry::ZoomRange;
use crate::metrics::{EditorStyle, FontData};
use crate::session::Tool;
use crate::signature::{TypedSignatureStyle, DEFAULT_PAD_HEIGHT, DEFAULT_PAD_WIDTH, DEFAULT_STROKE_WIDTH};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FillSignConfig {
    pub editor: EditorConfig,
    /// Box model and font sizing of the text control
    pub chrome: EditorStyle,
    pub fonts: FontsConfig,
    pub signature: SignatureConfig,
    pub export: ExportConfig,
}

impl FillSignConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_str(&content).with_context(|| format!("Invalid config file: {}", path.display()))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(s).context("Failed to parse TOML configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), FillSignError> {
        let limits_ok = |l: &SizeLimits| l.min.is_finite() && l.max.is_finite() && 0.0 < l.min && l.min <= l.max;

        if !self.editor.zoom.is_valid() {
            return Err(FillSignError::Config(format!(
                "editor.zoom must lie within [0.5, 3.0] with a positive step, got {:?}",
                self.editor.zoom
            )));
        }
        if !limits_ok(&self.editor.text_size_pt) {
            return Err(FillSignError::Config("editor.text_size_pt: need 0 < min <= max".into()));
        }
        if !limits_ok(&self.editor.stamp_width_pt) {
            return Err(FillSignError::Config("editor.stamp_width_pt: need 0 < min <= max".into()));
        }
        if !(self.chrome.font_size_px.is_finite() && self.chrome.font_size_px > 0.0) {
            return Err(FillSignError::Config("chrome.font_size_px must be positive".into()));
        }
        if self.signature.pad_width == 0 || self.signature.pad_height == 0 {
            return Err(FillSignError::Config("signature pad must have a non-zero size".into()));
        }
        if !(self.signature.stroke_width.is_finite() && self.signature.stroke_width > 0.0) {
            return Err(FillSignError::Config("signature.stroke_width must be positive".into()));
        }
        if !self.export.baseline_correction_scale.is_finite() {
            return Err(FillSignError::Config("export.baseline_correction_scale must be finite".into()));
        }
        Ok(())
    }
}

/// Placement defaults and input limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    pub initial_tool: Tool,
    pub zoom: ZoomRange,
    pub default_text_size_pt: f64,
    pub default_text_color: Rgb,
    pub text_size_pt: SizeLimits,
    pub default_stamp_width_pt: f64,
    pub stamp_width_pt: SizeLimits,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            initial_tool: Tool::Text,
            zoom: ZoomRange::default(),
            default_text_size_pt: 14.0,
            default_text_color: Rgb::new(0x11 as f32 / 255.0, 0x11 as f32 / 255.0, 1.0),
            text_size_pt: SizeLimits::TEXT_PT,
            default_stamp_width_pt: 180.0,
            stamp_width_pt: SizeLimits::STAMP_WIDTH_PT,
        }
    }
}

/// Optional font files. Unset entries fall back to built-in behaviour.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FontsConfig {
    /// Face of the text control; measured for metrics and embedded on export
    pub text: Option<PathBuf>,
    /// Export fallback for text outside WinAnsiEncoding
    pub unicode: Option<PathBuf>,
    /// Face for typed signatures; defaults to `text`
    pub signature: Option<PathBuf>,
}

/// Fonts after loading from disk
#[derive(Debug, Clone, Default)]
pub struct LoadedFonts {
    pub text: Option<FontData>,
    pub unicode: Option<FontData>,
    pub signature: Option<FontData>,
}

impl FontsConfig {
    /// Read and parse every configured font file.
    ///
    /// Relative paths are resolved against `base_dir` when given.
    pub fn load(&self, base_dir: Option<&Path>) -> Result<LoadedFonts, FillSignError> {
        let load = |path: &Option<PathBuf>| -> Result<Option<FontData>, FillSignError> {
            path.as_ref()
                .map(|p| match base_dir {
                    Some(dir) if p.is_relative() => FontData::from_file(dir.join(p)),
                    _ => FontData::from_file(p),
                })
                .transpose()
        };
        let text = load(&self.text)?;
        let unicode = load(&self.unicode)?;
        let signature = match load(&self.signature)? {
            Some(font) => Some(font),
            None => text.clone(),
        };
        Ok(LoadedFonts {
            text,
            unicode,
            signature,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignatureConfig {
    pub pad_width: u32,
    pub pad_height: u32,
    pub stroke_width: f32,
    pub typed: TypedSignatureStyle,
}

impl Default for SignatureConfig {
    fn default() -> Self {
        Self {
            pad_width: DEFAULT_PAD_WIDTH,
            pad_height: DEFAULT_PAD_HEIGHT,
            stroke_width: DEFAULT_STROKE_WIDTH,
            typed: TypedSignatureStyle::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Multiplier on the vertical baseline correction applied to text
    pub baseline_correction_scale: f64,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            baseline_correction_scale: 1.0,
        }
    }
}
