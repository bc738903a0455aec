//! PDF Fill & Sign
//!
//! Place text and signature stamps on the pages of an existing PDF and bake
//! them into the page content on export.
//!
//! - `geometry`: CSS pixel / PDF point mapping and fit-to-width layout
//! - `store` / `drag` / `session`: annotation editing state
//! - `signature`: drawn, uploaded and typed signatures as PNG payloads
//! - `metrics`: font measurements that keep exported text on the on-screen baseline
//! - `export`: compositing into a copy of the source document with lopdf

pub mod annotation;
pub mod config;
pub mod document;
pub mod drag;
pub mod error;
pub mod export;
pub mod fonts;
pub mod geometry;
pub mod image;
pub mod metrics;
pub mod render;
pub mod session;
pub mod signature;
pub mod store;

#[cfg(test)]
mod test_support;

pub use annotation::{Annotation, AnnotationId, AnnotationKind, AnnotationPatch, ImagePayload, Rgb, SizeLimits};
pub use config::FillSignConfig;
pub use document::{MediaBox, SourceDocument};
pub use drag::{DragController, HitRegion, NoCapture, PointerCapture};
pub use error::FillSignError;
pub use export::{export_bytes, export_document, ExportOptions};
pub use geometry::{to_css_point, to_pdf_point, CssPoint, FitLayout, GeometryContext, PageSize, PdfPoint, Zoom};
pub use metrics::{FontData, FontMetricsProbe, FontMetricsSnapshot};
pub use render::{CancellationToken, PageRenderer, Rasterizer};
pub use session::{EditorSession, EditorSnapshot, Tool};
pub use signature::{SignatureCapture, SignaturePad, TypedSignatureStyle};
pub use store::AnnotationStore;

/// Parse PDF bytes and return page count
pub fn get_page_count(bytes: &[u8]) -> Result<u32, FillSignError> {
    Ok(SourceDocument::load(bytes.to_vec())?.page_count())
}
