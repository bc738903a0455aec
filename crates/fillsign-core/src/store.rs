//! Annotation store for a single editing session
//!
//! Keeps annotations in insertion order, keyed by identifier, together with
//! the currently active (selected) annotation. Every operation is total:
//! unknown identifiers are a no-op reported through the return value.

use crate::annotation::{Annotation, AnnotationId, AnnotationPatch};
use std::collections::HashSet;

#[derive(Debug, Clone, Default)]
pub struct AnnotationStore {
    annotations: Vec<Annotation>,
    active: Option<AnnotationId>,
    /// Every id ever added, so removed ids are never handed out again
    issued: HashSet<AnnotationId>,
}

impl AnnotationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an annotation. Returns `false` (and stores nothing) when the
    /// id has already been used in this store or the geometry is invalid.
    pub fn add(&mut self, annotation: Annotation) -> bool {
        if let Err(err) = annotation.validate() {
            tracing::debug!(error = %err, "Ignoring annotation");
            return false;
        }
        if !self.issued.insert(annotation.id.clone()) {
            tracing::debug!(id = %annotation.id, "Ignoring annotation with reused id");
            return false;
        }
        self.annotations.push(annotation);
        true
    }

    pub fn update(&mut self, id: &AnnotationId, patch: &AnnotationPatch) -> bool {
        match self.annotations.iter_mut().find(|a| &a.id == id) {
            Some(annotation) => {
                annotation.apply(patch);
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: &AnnotationId) -> bool {
        let Some(pos) = self.annotations.iter().position(|a| &a.id == id) else {
            return false;
        };
        self.annotations.remove(pos);
        if self.active.as_ref() == Some(id) {
            self.active = None;
        }
        true
    }

    /// Remove every annotation and the selection. Ids stay retired.
    pub fn clear(&mut self) {
        self.annotations.clear();
        self.active = None;
    }

    /// Select an annotation, or clear the selection with `None`.
    /// Selecting an unknown id leaves the selection unchanged.
    pub fn set_active(&mut self, id: Option<&AnnotationId>) -> bool {
        match id {
            None => {
                self.active = None;
                true
            }
            Some(id) if self.contains(id) => {
                self.active = Some(id.clone());
                true
            }
            Some(_) => false,
        }
    }

    pub fn active(&self) -> Option<&Annotation> {
        self.active.as_ref().and_then(|id| self.get(id))
    }

    pub fn active_id(&self) -> Option<&AnnotationId> {
        self.active.as_ref()
    }

    pub fn get(&self, id: &AnnotationId) -> Option<&Annotation> {
        self.annotations.iter().find(|a| &a.id == id)
    }

    pub fn contains(&self, id: &AnnotationId) -> bool {
        self.get(id).is_some()
    }

    pub fn list_for_page(&self, page_index: u32) -> Vec<&Annotation> {
        self.annotations
            .iter()
            .filter(|a| a.page_index == page_index)
            .collect()
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn iter(&self) -> impl Iterator<Item = &Annotation> {
        self.annotations.iter()
    }

    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }
}
