//! Pointer-drag repositioning of annotations
//!
//! One drag session at a time. Pointer positions arrive in CSS pixels
//! relative to the page overlay; the annotation moves in point space by the
//! pointer delta divided by the current pixels-per-point ratio, with the
//! vertical component negated.

use crate::annotation::{AnnotationId, AnnotationPatch};
use crate::geometry::{css_delta_to_pdf, CssPoint, GeometryContext, PdfPoint};
use crate::store::AnnotationStore;

pub type PointerId = i32;

/// Where on an annotation the pointer went down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitRegion {
    /// Anywhere on a stamp image
    Stamp,
    /// Border / handle area around a text control
    TextHandle,
    /// Inside the editable text itself; reserved for selection and typing
    TextControl,
}

impl HitRegion {
    pub fn is_drag_eligible(self) -> bool {
        !matches!(self, HitRegion::TextControl)
    }
}

/// Host hook for pointer capture while a drag is in progress
pub trait PointerCapture {
    fn capture(&mut self, pointer_id: PointerId);
    fn release(&mut self, pointer_id: PointerId);
}

/// Capture sink for hosts that have no capture concept
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCapture;

impl PointerCapture for NoCapture {
    fn capture(&mut self, _pointer_id: PointerId) {}
    fn release(&mut self, _pointer_id: PointerId) {}
}

#[derive(Debug, Clone, PartialEq)]
pub struct DragSession {
    pub id: AnnotationId,
    pub pointer_id: PointerId,
    pub start_css: CssPoint,
    pub start_pt: PdfPoint,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum DragState {
    #[default]
    Idle,
    Dragging(DragSession),
}

#[derive(Debug, Default)]
pub struct DragController {
    state: DragState,
}

impl DragController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &DragState {
        &self.state
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, DragState::Dragging(_))
    }

    /// Start dragging `id`. Selects the annotation and captures the pointer.
    ///
    /// Returns `false` without side effects when a drag is already running,
    /// the region is not drag-eligible, or the annotation does not exist.
    pub fn pointer_down(
        &mut self,
        store: &mut AnnotationStore,
        id: &AnnotationId,
        region: HitRegion,
        pointer: CssPoint,
        pointer_id: PointerId,
        capture: &mut impl PointerCapture,
    ) -> bool {
        if self.is_dragging() || !region.is_drag_eligible() {
            return false;
        }
        let Some(annotation) = store.get(id) else {
            return false;
        };
        let start_pt = annotation.position;

        store.set_active(Some(id));
        capture.capture(pointer_id);
        self.state = DragState::Dragging(DragSession {
            id: id.clone(),
            pointer_id,
            start_css: pointer,
            start_pt,
        });
        true
    }

    /// Move the dragged annotation to follow the pointer.
    ///
    /// The new position is always computed from the drag start, never
    /// accumulated, so rounding error does not build up over a long drag.
    pub fn pointer_move(&mut self, store: &mut AnnotationStore, pointer: CssPoint, ctx: &GeometryContext) -> bool {
        let DragState::Dragging(session) = &self.state else {
            return false;
        };
        let (dx, dy) = css_delta_to_pdf(
            pointer.x - session.start_css.x,
            pointer.y - session.start_css.y,
            ctx,
        );
        let position = session.start_pt.offset(dx, dy);
        store.update(&session.id, &AnnotationPatch::position(position))
    }

    /// End the drag. Always releases capture and returns to idle, even if
    /// the annotation disappeared mid-drag.
    pub fn pointer_up(&mut self, capture: &mut impl PointerCapture) -> Option<DragSession> {
        match std::mem::take(&mut self.state) {
            DragState::Dragging(session) => {
                capture.release(session.pointer_id);
                Some(session)
            }
            DragState::Idle => None,
        }
    }

    pub fn pointer_cancel(&mut self, capture: &mut impl PointerCapture) -> Option<DragSession> {
        self.pointer_up(capture)
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::annotation::{Annotation, Rgb};
    use crate::geometry::{PageSize, Zoom};
    use proptest::prelude::*;

    proptest! {
        /// Property: a drag by (dx, dy) moves the anchor by (dx/ppp, -dy/ppp) at any zoom
        #[test]
        fn drag_delta_matches_pixels_per_point(
            zoom in 0.5f64..=3.0,
            base in 320.0f64..3000.0,
            start_x in 0.0f64..600.0,
            start_y in 0.0f64..800.0,
            dx in -500.0f64..500.0,
            dy in -500.0f64..500.0,
        ) {
            let ctx = GeometryContext::new(PageSize::letter(), base, Zoom::new(zoom), 1.0).unwrap();
            let ppp = ctx.pixels_per_point();
            let id = AnnotationId::new("a");
            let start = PdfPoint::new(start_x, start_y);
            let mut store = AnnotationStore::new();
            store.add(Annotation::text(id.clone(), 0, start, "x", 12.0, Rgb::BLACK));

            let mut drag = DragController::new();
            let origin = CssPoint::new(200.0, 200.0);
            drag.pointer_down(&mut store, &id, HitRegion::TextHandle, origin, 1, &mut NoCapture);
            drag.pointer_move(&mut store, CssPoint::new(origin.x + dx, origin.y + dy), &ctx);

            let end = store.get(&id).unwrap().position;
            let tol = 1e-9 * (1.0 + start_x.abs() + start_y.abs() + dx.abs() + dy.abs());
            prop_assert!((end.x - (start.x + dx / ppp)).abs() <= tol);
            prop_assert!((end.y - (start.y - dy / ppp)).abs() <= tol);
        }
    }
}
