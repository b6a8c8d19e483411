//! crates/page_lens_core/src/annotations.rs
//!
//! The annotation store: an ordered, document-scoped collection of spatial status
//! markers with eager write-through persistence.

use crate::domain::{Annotation, AnnotationStatus, Selection, StatusFilter};
use crate::ports::KeyValueStore;
use crate::schema::{annotations_key, decode_annotations, encode_annotations};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Change notifications emitted by an [`AnnotationStore`].
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationEvent {
    Created(Annotation),
    Updated(Annotation),
    Deleted { id: Uuid, page_number: u32 },
}

/// Receives annotation changes, e.g. to refresh a sidebar owned by another component.
pub trait AnnotationObserver: Send + Sync {
    fn on_annotation_event(&self, document_id: Uuid, event: &AnnotationEvent);
}

pub struct AnnotationStore {
    document_id: Uuid,
    key: String,
    store: Arc<dyn KeyValueStore>,
    observer: Option<Arc<dyn AnnotationObserver>>,
    annotations: Vec<Annotation>,
}

impl AnnotationStore {
    /// Loads the document's persisted annotations.
    ///
    /// Unreadable blobs and records without a `rect` are dropped with a warning; the
    /// store then starts from whatever could be recovered.
    pub async fn restore(
        document_id: Uuid,
        store: Arc<dyn KeyValueStore>,
        observer: Option<Arc<dyn AnnotationObserver>>,
    ) -> Self {
        let key = annotations_key(document_id);
        let annotations = match store.get(&key).await {
            Ok(Some(blob)) => decode_annotations(&blob).unwrap_or_else(|e| {
                warn!("Ignoring unreadable annotations for {}: {}", document_id, e);
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("Failed to read annotations for {}: {}", document_id, e);
                Vec::new()
            }
        };
        info!(
            "Restored {} annotation(s) for document {}",
            annotations.len(),
            document_id
        );

        Self {
            document_id,
            key,
            store,
            observer,
            annotations,
        }
    }

    pub fn document_id(&self) -> Uuid {
        self.document_id
    }

    /// Turns a spatial selection into an annotation.
    ///
    /// Selections without a `rect` (text captures) cannot be anchored and are ignored.
    pub async fn create(
        &mut self,
        selection: &Selection,
        status: AnnotationStatus,
        note: Option<String>,
    ) -> Option<Annotation> {
        let Some(rect) = selection.rect else {
            debug!("Ignoring annotation request for a selection without a rect");
            return None;
        };

        let annotation = Annotation {
            id: Uuid::new_v4(),
            page_number: selection.page_number,
            rect,
            status,
            note: note.filter(|n| !n.trim().is_empty()),
            source_text: selection.text.clone(),
            created_at: Utc::now(),
            capture_scale: selection.capture_scale,
        };
        self.annotations.push(annotation.clone());
        self.persist().await;
        self.emit(AnnotationEvent::Created(annotation.clone()));
        Some(annotation)
    }

    /// Annotations on `page_number` passing `filter`, oldest first.
    pub fn list(&self, page_number: u32, filter: StatusFilter) -> Vec<&Annotation> {
        self.annotations
            .iter()
            .filter(|a| a.page_number == page_number && filter.matches(a.status))
            .collect()
    }

    pub fn get(&self, id: Uuid) -> Option<&Annotation> {
        self.annotations.iter().find(|a| a.id == id)
    }

    pub fn all(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    /// Per-status counts for one page, for filter chips.
    pub fn counts(&self, page_number: u32) -> HashMap<AnnotationStatus, usize> {
        let mut counts = HashMap::new();
        for annotation in self.annotations.iter().filter(|a| a.page_number == page_number) {
            *counts.entry(annotation.status).or_insert(0) += 1;
        }
        counts
    }

    /// Removes an annotation. Returns whether anything was removed; absent ids are a no-op.
    pub async fn delete(&mut self, id: Uuid) -> bool {
        let Some(position) = self.annotations.iter().position(|a| a.id == id) else {
            return false;
        };
        let removed = self.annotations.remove(position);
        self.persist().await;
        self.emit(AnnotationEvent::Deleted {
            id,
            page_number: removed.page_number,
        });
        true
    }

    pub async fn set_status(&mut self, id: Uuid, status: AnnotationStatus) -> Option<Annotation> {
        self.update(id, |a| a.status = status).await
    }

    pub async fn set_note(&mut self, id: Uuid, note: Option<String>) -> Option<Annotation> {
        let note = note.filter(|n| !n.trim().is_empty());
        self.update(id, move |a| a.note = note).await
    }

    async fn update(&mut self, id: Uuid, change: impl FnOnce(&mut Annotation)) -> Option<Annotation> {
        let annotation = self.annotations.iter_mut().find(|a| a.id == id)?;
        change(annotation);
        let updated = annotation.clone();
        self.persist().await;
        self.emit(AnnotationEvent::Updated(updated.clone()));
        Some(updated)
    }

    /// Rewrites the whole collection. Failures leave the in-memory state authoritative.
    async fn persist(&self) {
        let blob = match encode_annotations(&self.annotations) {
            Ok(blob) => blob,
            Err(e) => {
                warn!("Failed to encode annotations for {}: {}", self.document_id, e);
                return;
            }
        };
        if let Err(e) = self.store.set(&self.key, &blob).await {
            warn!(
                "Failed to persist annotations for {}; keeping them in memory: {}",
                self.document_id, e
            );
        }
    }

    fn emit(&self, event: AnnotationEvent) {
        if let Some(observer) = &self.observer {
            observer.on_annotation_event(self.document_id, &event);
        }
    }
}
