//! Coordinate transformation between editor and PDF coordinate systems
//!
//! The editor works in CSS pixels with a top-left origin and y growing
//! downward. PDF pages use points (1/72 inch) with a bottom-left origin and
//! y growing upward. Both conversions depend on a single ratio, the number
//! of CSS pixels per PDF point, derived from the fit-to-width layout and the
//! user zoom.

use serde::{Deserialize, Serialize};

/// Narrowest wrapper the page is ever fitted into, in CSS pixels.
pub const MIN_WRAPPER_WIDTH_CSS: f64 = 320.0;

/// A position in editor space (CSS pixels, top-left origin).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CssPoint {
    pub x: f64,
    pub y: f64,
}

impl CssPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A position on a PDF page (points, bottom-left origin).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PdfPoint {
    pub x: f64,
    pub y: f64,
}

impl PdfPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: f64, dy: f64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

/// Intrinsic page size in points
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSize {
    pub width: f64,
    pub height: f64,
}

impl PageSize {
    pub fn letter() -> Self {
        Self {
            width: 612.0,
            height: 792.0,
        }
    }
}

impl Default for PageSize {
    fn default() -> Self {
        Self::letter()
    }
}

/// User zoom multiplier, always within `[MIN, MAX]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Zoom(f64);

impl Zoom {
    pub const MIN: f64 = 0.5;
    pub const MAX: f64 = 3.0;
    pub const STEP: f64 = 0.1;

    pub fn new(value: f64) -> Self {
        Self(Self::clamp(value))
    }

    pub fn fit() -> Self {
        Self(1.0)
    }

    pub fn value(self) -> f64 {
        self.0
    }

    pub fn zoom_in(self) -> Self {
        Self::new(round_2(self.0 + Self::STEP))
    }

    pub fn zoom_out(self) -> Self {
        Self::new(round_2(self.0 - Self::STEP))
    }

    /// Zoom as a whole percentage, for display
    pub fn percent(self) -> u32 {
        (self.0 * 100.0).round() as u32
    }

    fn clamp(value: f64) -> f64 {
        if value.is_finite() {
            value.clamp(Self::MIN, Self::MAX)
        } else {
            1.0
        }
    }
}

impl Default for Zoom {
    fn default() -> Self {
        Self::fit()
    }
}

fn round_2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Zoom bounds and step used by the editor's zoom buttons.
/// Always a sub-range of `[Zoom::MIN, Zoom::MAX]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoomRange {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl Default for ZoomRange {
    fn default() -> Self {
        Self {
            min: Zoom::MIN,
            max: Zoom::MAX,
            step: Zoom::STEP,
        }
    }
}

impl ZoomRange {
    pub fn clamp(&self, zoom: Zoom) -> Zoom {
        Zoom::new(zoom.value().clamp(self.min, self.max))
    }

    pub fn zoom_in(&self, zoom: Zoom) -> Zoom {
        self.clamp(Zoom::new(round_2(zoom.value() + self.step)))
    }

    pub fn zoom_out(&self, zoom: Zoom) -> Zoom {
        self.clamp(Zoom::new(round_2(zoom.value() - self.step)))
    }

    pub fn is_valid(&self) -> bool {
        self.min.is_finite()
            && self.max.is_finite()
            && self.step.is_finite()
            && Zoom::MIN <= self.min
            && self.min <= self.max
            && self.max <= Zoom::MAX
            && self.step > 0.0
    }
}

/// Everything needed to map between CSS pixels and PDF points for one page.
///
/// Rebuilt from the current layout whenever zoom, page or container size
/// changes; never patched in place.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometryContext {
    pub page: PageSize,
    /// Fit-to-width page width in CSS pixels, before zoom
    pub base_width_css: f64,
    pub zoom: Zoom,
    pub device_pixel_ratio: f64,
}

impl GeometryContext {
    /// Build a context, or `None` while there is no usable layout yet
    /// (zero base width or a degenerate page).
    pub fn new(page: PageSize, base_width_css: f64, zoom: Zoom, device_pixel_ratio: f64) -> Option<Self> {
        let ctx = Self {
            page,
            base_width_css,
            zoom,
            device_pixel_ratio: device_pixel_ratio.max(1.0),
        };
        (ctx.pixels_per_point() > 0.0 && ctx.pixels_per_point().is_finite()).then_some(ctx)
    }

    /// CSS pixels per PDF point
    pub fn pixels_per_point(&self) -> f64 {
        (self.base_width_css / self.page.width) * self.zoom.value()
    }
}

/// Convert an editor position to a PDF position.
///
/// Assumes `ctx.pixels_per_point() > 0`.
pub fn to_pdf_point(css: CssPoint, ctx: &GeometryContext) -> PdfPoint {
    let ppp = ctx.pixels_per_point();
    PdfPoint {
        x: css.x / ppp,
        y: ctx.page.height - css.y / ppp,
    }
}

/// Convert a PDF position to an editor position. Exact inverse of [`to_pdf_point`].
pub fn to_css_point(pt: PdfPoint, ctx: &GeometryContext) -> CssPoint {
    let ppp = ctx.pixels_per_point();
    CssPoint {
        x: pt.x * ppp,
        y: (ctx.page.height - pt.y) * ppp,
    }
}

/// Convert a CSS pixel displacement to a point displacement (y flipped).
pub fn css_delta_to_pdf(dx: f64, dy: f64, ctx: &GeometryContext) -> (f64, f64) {
    let ppp = ctx.pixels_per_point();
    (dx / ppp, -dy / ppp)
}

/// Fit-to-width layout of one page inside the editor wrapper
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitLayout {
    /// Scale that makes the page fill the wrapper width
    pub fit_width_scale: f64,
    /// Page size at fit scale (rounded CSS pixels)
    pub base_css_width: f64,
    pub base_css_height: f64,
    /// Scale handed to the rasterizer (fit × zoom × dpr)
    pub render_scale: f64,
    /// Backing bitmap size in device pixels
    pub bitmap_width: u32,
    pub bitmap_height: u32,
    /// Displayed size of the bitmap in CSS pixels
    pub display_css_width: f64,
    pub display_css_height: f64,
    pub zoom: Zoom,
    pub device_pixel_ratio: f64,
}

impl FitLayout {
    pub fn compute(page: PageSize, wrapper_width_css: f64, zoom: Zoom, device_pixel_ratio: f64) -> Self {
        let wrapper = wrapper_width_css.max(MIN_WRAPPER_WIDTH_CSS);
        let dpr = if device_pixel_ratio.is_finite() {
            device_pixel_ratio.max(1.0)
        } else {
            1.0
        };

        let fit_width_scale = wrapper / page.width;
        let render_scale = fit_width_scale * zoom.value() * dpr;

        let bitmap_width = (page.width * render_scale).ceil();
        let bitmap_height = (page.height * render_scale).ceil();

        Self {
            fit_width_scale,
            base_css_width: (page.width * fit_width_scale).round(),
            base_css_height: (page.height * fit_width_scale).round(),
            render_scale,
            bitmap_width: bitmap_width as u32,
            bitmap_height: bitmap_height as u32,
            display_css_width: (bitmap_width / dpr).round(),
            display_css_height: (bitmap_height / dpr).round(),
            zoom,
            device_pixel_ratio: dpr,
        }
    }

    pub fn geometry(&self, page: PageSize) -> Option<GeometryContext> {
        GeometryContext::new(page, self.base_css_width, self.zoom, self.device_pixel_ratio)
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn dimension() -> impl Strategy<Value = f64> {
        1.0f64..2000.0
    }

    fn ctx_strategy() -> impl Strategy<Value = GeometryContext> {
        (dimension(), dimension(), 320.0f64..4000.0, 0.5f64..=3.0, 1.0f64..4.0).prop_map(
            |(w, h, base, zoom, dpr)| {
                GeometryContext::new(PageSize { width: w, height: h }, base, Zoom::new(zoom), dpr)
                    .unwrap()
            },
        )
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-6 * a.abs().max(b.abs()).max(1.0)
    }

    proptest! {
        /// Property: PDF->CSS->PDF returns the original point
        #[test]
        fn roundtrip_pdf_to_css_to_pdf(
            ctx in ctx_strategy(),
            x_pct in 0.0f64..=1.0,
            y_pct in 0.0f64..=1.0,
        ) {
            let pt = PdfPoint::new(x_pct * ctx.page.width, y_pct * ctx.page.height);
            let back = to_pdf_point(to_css_point(pt, &ctx), &ctx);
            prop_assert!(close(back.x, pt.x), "x: {} -> {}", pt.x, back.x);
            prop_assert!(close(back.y, pt.y), "y: {} -> {}", pt.y, back.y);
        }

        /// Property: CSS->PDF->CSS returns the original point
        #[test]
        fn roundtrip_css_to_pdf_to_css(
            ctx in ctx_strategy(),
            x in 0.0f64..4000.0,
            y in 0.0f64..4000.0,
        ) {
            let css = CssPoint::new(x, y);
            let back = to_css_point(to_pdf_point(css, &ctx), &ctx);
            prop_assert!(close(back.x, css.x), "x: {} -> {}", css.x, back.x);
            prop_assert!(close(back.y, css.y), "y: {} -> {}", css.y, back.y);
        }

        /// Property: moving down in the editor moves down on the page
        #[test]
        fn y_axis_movement_direction(ctx in ctx_strategy(), y in 0.0f64..1000.0, dy in 1.0f64..100.0) {
            let a = to_pdf_point(CssPoint::new(0.0, y), &ctx);
            let b = to_pdf_point(CssPoint::new(0.0, y + dy), &ctx);
            prop_assert!(b.y < a.y);
        }

        /// Property: the bitmap always covers the page at render scale
        #[test]
        fn fit_layout_bitmap_covers_page(
            w in dimension(),
            h in dimension(),
            wrapper in 0.0f64..3000.0,
            zoom in 0.5f64..=3.0,
            dpr in 1.0f64..4.0,
        ) {
            let page = PageSize { width: w, height: h };
            let layout = FitLayout::compute(page, wrapper, Zoom::new(zoom), dpr);
            prop_assert!(layout.bitmap_width as f64 >= w * layout.render_scale);
            prop_assert!(layout.bitmap_height as f64 >= h * layout.render_scale);
        }
    }
}
