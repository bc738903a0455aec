//! Error type shared by loading, editing, rendering and export

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FillSignError {
    #[error("Failed to load PDF: {0}")]
    SourceLoad(String),

    #[error("Page {index} is out of range (document has {count} pages)")]
    PageOutOfRange { index: u32, count: u32 },

    #[error("Failed to decode image: {0}")]
    ImageDecode(String),

    /// A render was superseded by a newer one. Never shown to the user.
    #[error("Render cancelled")]
    RenderCancelled,

    #[error("Failed to write PDF: {0}")]
    Write(String),

    #[error("Export failed: {0}")]
    Export(#[source] Box<FillSignError>),

    #[error("No font available: {0}")]
    FontUnavailable(String),

    #[error("Failed to parse font: {0}")]
    FontParse(String),

    #[error("Rasterization failed: {0}")]
    Raster(String),

    #[error("Invalid annotation {0}")]
    InvalidAnnotation(String),

    #[error("Editor has not been laid out yet")]
    NotLaidOut,

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl FillSignError {
    /// Wrap a failure raised while compositing.
    ///
    /// Errors that are already `Export` are returned as-is so the chain
    /// never nests twice.
    pub fn export(inner: FillSignError) -> Self {
        match inner {
            FillSignError::Export(_) => inner,
            other => FillSignError::Export(Box::new(other)),
        }
    }

    /// The innermost error kind, looking through `Export` wrappers.
    pub fn root_cause(&self) -> &FillSignError {
        match self {
            FillSignError::Export(inner) => inner.root_cause(),
            other => other,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.root_cause(), FillSignError::RenderCancelled)
    }
}
