//! Fill & Sign command line
//!
//! Inspects documents, bakes annotation snapshots into PDFs and renders
//! signatures to PNG. Logs go to stderr so stdout stays machine-readable.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use fillsign_core::config::LoadedFonts;
use fillsign_core::metrics::measure;
use fillsign_core::signature::render_typed_signature;
use fillsign_core::{
    export_document, EditorSnapshot, ExportOptions, FillSignConfig, FontData, Rgb, SignaturePad, SourceDocument,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "fillsign")]
#[command(version, about = "Fill in and sign PDF documents")]
struct Args {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print page count and page sizes as JSON
    Info {
        input: PathBuf,
    },
    /// Bake an annotation snapshot into a copy of a PDF
    Export {
        input: PathBuf,
        /// JSON file with `pixels_per_point` and `annotations`
        #[arg(short, long)]
        annotations: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Render typed text as a transparent signature PNG
    TypedSignature {
        text: String,
        #[arg(short, long)]
        output: PathBuf,
        /// Font file; overrides `fonts.signature` from the config
        #[arg(long)]
        font: Option<PathBuf>,
        #[arg(long)]
        size: Option<f64>,
        #[arg(long)]
        slant: Option<f64>,
        /// Hex colour such as `#1111FF`
        #[arg(long)]
        color: Option<Rgb>,
    },
    /// Rasterize pad strokes (JSON array of `[x, y]` point lists) to PNG
    DrawSignature {
        strokes: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
}

#[derive(Debug, Serialize, PartialEq)]
struct PageInfo {
    index: u32,
    width: f64,
    height: f64,
    rotation: i64,
}

#[derive(Debug, Serialize, PartialEq)]
struct DocumentInfo {
    page_count: u32,
    pages: Vec<PageInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(transparent)]
struct Strokes(Vec<Vec<[f32; 2]>>);

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let (config, base_dir) = load_config(args.config.as_deref())?;

    match args.command {
        Command::Info { input } => {
            let info = document_info(&fs::read(&input).with_context(|| format!("Failed to read {}", input.display()))?)?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        Command::Export {
            input,
            annotations,
            output,
        } => {
            let fonts = config.fonts.load(base_dir.as_deref())?;
            let source = fs::read(&input).with_context(|| format!("Failed to read {}", input.display()))?;
            let snapshot = fs::read_to_string(&annotations)
                .with_context(|| format!("Failed to read {}", annotations.display()))?;
            let snapshot: EditorSnapshot = serde_json::from_str(&snapshot)
                .with_context(|| format!("Invalid annotation snapshot: {}", annotations.display()))?;

            let bytes = export_snapshot(source, &snapshot, &config, fonts)?;
            write_output(&output, &bytes)?;
        }
        Command::TypedSignature {
            text,
            output,
            font,
            size,
            slant,
            color,
        } => {
            let font = match font {
                Some(path) => FontData::from_file(path)?,
                None => config
                    .fonts
                    .load(base_dir.as_deref())?
                    .signature
                    .context("No signature font: pass --font or set fonts.signature")?,
            };
            let mut style = config.signature.typed;
            style.size_px = size.unwrap_or(style.size_px);
            style.slant_deg = slant.unwrap_or(style.slant_deg);
            style.color = color.unwrap_or(style.color);

            let Some(payload) = render_typed_signature(&text, &style.clamped(), &font)? else {
                bail!("Signature text is blank");
            };
            write_output(&output, payload.as_bytes())?;
        }
        Command::DrawSignature { strokes, output } => {
            let json = fs::read_to_string(&strokes).with_context(|| format!("Failed to read {}", strokes.display()))?;
            let strokes: Strokes = serde_json::from_str(&json).context("Invalid stroke list")?;
            let png = draw_signature(&strokes, &config)?;
            write_output(&output, &png)?;
        }
    }

    Ok(())
}

/// Load the config file, returning the directory relative font paths resolve against
fn load_config(path: Option<&Path>) -> anyhow::Result<(FillSignConfig, Option<PathBuf>)> {
    match path {
        Some(path) => {
            let config = FillSignConfig::from_file(path)?;
            let base = path.parent().map(Path::to_path_buf);
            tracing::debug!(path = %path.display(), "Loaded configuration");
            Ok((config, base))
        }
        None => Ok((FillSignConfig::default(), None)),
    }
}

fn document_info(bytes: &[u8]) -> anyhow::Result<DocumentInfo> {
    let source = SourceDocument::load(bytes.to_vec())?;
    let pages = (0..source.page_count())
        .map(|index| {
            let size = source.page_size(index)?;
            Ok(PageInfo {
                index,
                width: size.width,
                height: size.height,
                rotation: source.rotation(index)?,
            })
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(DocumentInfo {
        page_count: source.page_count(),
        pages,
    })
}

fn export_snapshot(
    source: Vec<u8>,
    snapshot: &EditorSnapshot,
    config: &FillSignConfig,
    fonts: LoadedFonts,
) -> anyhow::Result<Vec<u8>> {
    let source = SourceDocument::load(source).context("Failed to open source document")?;
    let mut options = ExportOptions::new(snapshot.pixels_per_point, measure(&config.chrome, fonts.text.as_ref()));
    options.text_font = fonts.text;
    options.unicode_font = fonts.unicode;
    options.baseline_correction_scale = config.export.baseline_correction_scale;

    let bytes = export_document(&source, &snapshot.annotations, &options)?;
    tracing::info!(
        annotations = snapshot.annotations.len(),
        bytes = bytes.len(),
        "Export complete"
    );
    Ok(bytes)
}

fn draw_signature(strokes: &Strokes, config: &FillSignConfig) -> anyhow::Result<Vec<u8>> {
    let mut pad = SignaturePad::new(
        config.signature.pad_width,
        config.signature.pad_height,
        config.signature.stroke_width,
        config.editor.default_text_color,
    );
    for stroke in &strokes.0 {
        let Some((&[x, y], rest)) = stroke.split_first() else {
            continue;
        };
        pad.begin_stroke(x, y);
        for &[x, y] in rest {
            pad.extend_stroke(x, y);
        }
        pad.end_stroke();
    }
    match pad.save()? {
        Some(payload) => Ok(payload.as_bytes().to_vec()),
        None => bail!("No strokes to draw"),
    }
}

fn write_output(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    fs::write(path, bytes).with_context(|| format!("Failed to write {}", path.display()))?;
    tracing::info!(path = %path.display(), bytes = bytes.len(), "Wrote output");
    Ok(())
}
