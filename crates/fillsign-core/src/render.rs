//! Page render scheduling
//!
//! Rasterization itself is an external collaborator behind [`Rasterizer`].
//! This module decides what to render (fit-to-width layout at the current
//! zoom and device pixel ratio) and makes sure that when renders overlap
//! only the most recent request's frame is ever delivered.

use crate::error::FillSignError;
use crate::geometry::{FitLayout, PageSize, Zoom};
use std::cell::{Cell, RefCell};
use std::future::Future;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tracing::instrument;

/// Cooperative cancellation flag shared with a running rasterization.
///
/// Cloning shares the flag; cancelling any clone cancels them all.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// What the rasterizer is asked to draw
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderRequest {
    pub page_index: u32,
    pub page: PageSize,
    /// Device pixels per PDF point
    pub scale: f64,
    /// Target bitmap size in device pixels
    pub width: u32,
    pub height: u32,
}

/// Premultiplied-or-not is the rasterizer's business; the scheduler only
/// passes the pixels through.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedBitmap {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

/// Turns one page of a PDF into pixels.
///
/// Implementations should stop early and return
/// [`FillSignError::RenderCancelled`] once `cancel` is set, but the
/// scheduler does not rely on it.
pub trait Rasterizer {
    fn render(
        &self,
        source: &[u8],
        request: RenderRequest,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<RenderedBitmap, FillSignError>>;
}

/// A delivered frame and the layout it was rendered for
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedFrame {
    pub bitmap: RenderedBitmap,
    pub layout: FitLayout,
    pub paint_token: u64,
}

/// Schedules renders so stale frames are never painted.
///
/// Lives on a single thread; state is in `Cell`/`RefCell` so overlapping
/// renders can be driven through `&self`.
pub struct PageRenderer<R> {
    rasterizer: R,
    paint_token: Cell<u64>,
    in_flight: RefCell<Option<CancellationToken>>,
}

impl<R: Rasterizer> PageRenderer<R> {
    pub fn new(rasterizer: R) -> Self {
        Self {
            rasterizer,
            paint_token: Cell::new(0),
            in_flight: RefCell::new(None),
        }
    }

    pub fn rasterizer(&self) -> &R {
        &self.rasterizer
    }

    /// Token of the most recent request
    pub fn current_token(&self) -> u64 {
        self.paint_token.get()
    }

    /// Cancel whatever is running. Its result will be discarded.
    pub fn invalidate(&self) {
        self.paint_token.set(self.paint_token.get() + 1);
        if let Some(token) = self.in_flight.borrow_mut().take() {
            token.cancel();
        }
    }

    /// Render `page_index` fitted to `wrapper_width_css`.
    ///
    /// Returns `Ok(None)` when a newer request superseded this one or the
    /// rasterizer reported cancellation.
    #[instrument(skip(self, source, page), fields(token))]
    pub async fn render(
        &self,
        source: &[u8],
        page_index: u32,
        page: PageSize,
        wrapper_width_css: f64,
        zoom: Zoom,
        device_pixel_ratio: f64,
    ) -> Result<Option<RenderedFrame>, FillSignError> {
        self.invalidate();
        let token = self.paint_token.get();
        tracing::Span::current().record("token", token);

        let cancel = CancellationToken::new();
        *self.in_flight.borrow_mut() = Some(cancel.clone());

        let layout = FitLayout::compute(page, wrapper_width_css, zoom, device_pixel_ratio);
        let request = RenderRequest {
            page_index,
            page,
            scale: layout.render_scale,
            width: layout.bitmap_width,
            height: layout.bitmap_height,
        };

        let result = self.rasterizer.render(source, request, cancel).await;

        if self.paint_token.get() != token {
            tracing::debug!(token, latest = self.paint_token.get(), "Discarding superseded render");
            return Ok(None);
        }
        self.in_flight.borrow_mut().take();

        match result {
            Ok(bitmap) => Ok(Some(RenderedFrame {
                bitmap,
                layout,
                paint_token: token,
            })),
            Err(e) if e.is_cancelled() => {
                tracing::debug!(token, "Render cancelled");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}
