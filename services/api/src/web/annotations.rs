//! services/api/src/web/annotations.rs
//!
//! Axum handlers for a document's annotations. Each document's `AnnotationStore`
//! is restored lazily by `AppState` and shared by every request touching it.

use crate::web::{rest::port_error, state::AppState};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, Utc};
use page_lens_core::domain::{
    Annotation, AnnotationStatus, Rect, Selection, SelectionKind, StatusFilter,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

/// A rectangle in page-container pixels.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, Copy, PartialEq)]
pub struct RectBody {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl From<Rect> for RectBody {
    fn from(rect: Rect) -> Self {
        Self {
            x: rect.x,
            y: rect.y,
            width: rect.width,
            height: rect.height,
        }
    }
}

impl From<RectBody> for Rect {
    fn from(body: RectBody) -> Self {
        Rect::new(body.x, body.y, body.width, body.height)
    }
}

#[derive(Serialize, ToSchema, Debug)]
pub struct AnnotationResponse {
    pub id: Uuid,
    pub page_number: u32,
    /// As captured, at `capture_scale`.
    pub rect: RectBody,
    /// `rect` rescaled to the zoom given in the request, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub render_rect: Option<RectBody>,
    #[schema(value_type = String, example = "pending")]
    pub status: AnnotationStatus,
    pub note: Option<String>,
    pub source_text: String,
    pub created_at: DateTime<Utc>,
    pub capture_scale: f64,
}

impl AnnotationResponse {
    fn new(annotation: &Annotation, scale: Option<f64>) -> Self {
        Self {
            id: annotation.id,
            page_number: annotation.page_number,
            rect: annotation.rect.into(),
            render_rect: scale.map(|s| annotation.render_rect(s).into()),
            status: annotation.status,
            note: annotation.note.clone(),
            source_text: annotation.source_text.clone(),
            created_at: annotation.created_at,
            capture_scale: annotation.capture_scale,
        }
    }
}

#[derive(Serialize, ToSchema, Debug)]
pub struct AnnotationListResponse {
    pub annotations: Vec<AnnotationResponse>,
    /// Number of annotations on the page per status, ignoring the status filter.
    #[schema(value_type = Object)]
    pub counts: HashMap<AnnotationStatus, usize>,
}

#[derive(Deserialize, IntoParams, Debug)]
#[into_params(parameter_in = Query)]
pub struct ListAnnotationsQuery {
    /// One-based page number.
    pub page: u32,
    /// Only return annotations with this status.
    #[param(value_type = Option<String>)]
    pub status: Option<AnnotationStatus>,
    /// Current zoom; when present each annotation carries a `render_rect`.
    pub scale: Option<f64>,
}

/// The payload for anchoring a new annotation to a captured region.
#[derive(Deserialize, ToSchema, Debug)]
pub struct CreateAnnotationRequest {
    pub page_number: u32,
    pub rect: RectBody,
    /// Zoom the page was rendered at when the region was captured.
    #[serde(default = "default_scale")]
    pub capture_scale: f64,
    #[schema(value_type = String, example = "pending")]
    pub status: AnnotationStatus,
    pub note: Option<String>,
    #[serde(default)]
    pub source_text: Option<String>,
}

fn default_scale() -> f64 {
    1.0
}

/// Status and note are the only mutable fields of an annotation.
#[derive(Deserialize, ToSchema, Debug)]
pub struct UpdateAnnotationRequest {
    #[schema(value_type = Option<String>)]
    pub status: Option<AnnotationStatus>,
    /// A blank note removes the existing one.
    pub note: Option<String>,
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// List a page's annotations, oldest first.
#[utoipa::path(
    get,
    path = "/documents/{id}/annotations",
    params(("id" = Uuid, Path, description = "The document ID."), ListAnnotationsQuery),
    responses(
        (status = 200, description = "The page's annotations", body = AnnotationListResponse),
        (status = 404, description = "No such document")
    )
)]
pub async fn list_annotations_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<ListAnnotationsQuery>,
) -> Result<Json<AnnotationListResponse>, (StatusCode, String)> {
    ensure_document(&app_state, id).await?;
    let store = app_state.annotation_store(id).await;
    let store = store.lock().await;

    let annotations = store
        .list(query.page, StatusFilter::from(query.status))
        .into_iter()
        .map(|a| AnnotationResponse::new(a, query.scale))
        .collect();
    Ok(Json(AnnotationListResponse {
        annotations,
        counts: store.counts(query.page),
    }))
}

/// Anchor a new annotation to a page region.
#[utoipa::path(
    post,
    path = "/documents/{id}/annotations",
    params(("id" = Uuid, Path, description = "The document ID.")),
    request_body = CreateAnnotationRequest,
    responses(
        (status = 201, description = "Annotation created", body = AnnotationResponse),
        (status = 400, description = "Unusable rectangle or scale"),
        (status = 404, description = "No such document")
    )
)]
pub async fn create_annotation_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CreateAnnotationRequest>,
) -> Result<(StatusCode, Json<AnnotationResponse>), (StatusCode, String)> {
    let rect = Rect::from(payload.rect);
    if !rect.is_finite() || rect.width <= 0.0 || rect.height <= 0.0 {
        return Err((
            StatusCode::BAD_REQUEST,
            "rect must have a positive, finite width and height".to_string(),
        ));
    }
    if !(payload.capture_scale.is_finite() && payload.capture_scale > 0.0) {
        return Err((
            StatusCode::BAD_REQUEST,
            "capture_scale must be a positive number".to_string(),
        ));
    }
    ensure_document(&app_state, id).await?;

    let selection = Selection {
        kind: SelectionKind::Region,
        text: payload
            .source_text
            .unwrap_or_else(|| format!("Region on page {}", payload.page_number)),
        page_number: payload.page_number,
        image_bytes: None,
        rect: Some(rect),
        capture_scale: payload.capture_scale,
    };

    let store = app_state.annotation_store(id).await;
    let annotation = store
        .lock()
        .await
        .create(&selection, payload.status, payload.note)
        .await
        .ok_or_else(|| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to create annotation".to_string(),
            )
        })?;
    Ok((
        StatusCode::CREATED,
        Json(AnnotationResponse::new(&annotation, None)),
    ))
}

/// Change an annotation's status or note.
#[utoipa::path(
    patch,
    path = "/documents/{id}/annotations/{annotation_id}",
    params(
        ("id" = Uuid, Path, description = "The document ID."),
        ("annotation_id" = Uuid, Path, description = "The annotation ID.")
    ),
    request_body = UpdateAnnotationRequest,
    responses(
        (status = 200, description = "Annotation updated", body = AnnotationResponse),
        (status = 404, description = "No such document or annotation")
    )
)]
pub async fn update_annotation_handler(
    State(app_state): State<Arc<AppState>>,
    Path((id, annotation_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<UpdateAnnotationRequest>,
) -> Result<Json<AnnotationResponse>, (StatusCode, String)> {
    ensure_document(&app_state, id).await?;
    let store = app_state.annotation_store(id).await;
    let mut store = store.lock().await;

    let mut updated = store.get(annotation_id).cloned();
    if updated.is_none() {
        return Err(annotation_not_found(annotation_id));
    }
    if let Some(status) = payload.status {
        updated = store.set_status(annotation_id, status).await;
    }
    if let Some(note) = payload.note {
        updated = store.set_note(annotation_id, Some(note)).await;
    }

    updated
        .map(|a| Json(AnnotationResponse::new(&a, None)))
        .ok_or_else(|| annotation_not_found(annotation_id))
}

/// Delete an annotation. Deleting one that is already gone also succeeds.
#[utoipa::path(
    delete,
    path = "/documents/{id}/annotations/{annotation_id}",
    params(
        ("id" = Uuid, Path, description = "The document ID."),
        ("annotation_id" = Uuid, Path, description = "The annotation ID.")
    ),
    responses(
        (status = 204, description = "Annotation deleted, or already absent"),
        (status = 404, description = "No such document")
    )
)]
pub async fn delete_annotation_handler(
    State(app_state): State<Arc<AppState>>,
    Path((id, annotation_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, (StatusCode, String)> {
    ensure_document(&app_state, id).await?;
    let store = app_state.annotation_store(id).await;
    if !store.lock().await.delete(annotation_id).await {
        debug!("Annotation {} on document {} was already gone", annotation_id, id);
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn ensure_document(app_state: &AppState, id: Uuid) -> Result<(), (StatusCode, String)> {
    app_state
        .registry
        .get_document(id)
        .await
        .map(|_| ())
        .map_err(|e| port_error("Fetching document", e))
}

fn annotation_not_found(annotation_id: Uuid) -> (StatusCode, String) {
    (
        StatusCode::NOT_FOUND,
        format!("Annotation {} not found", annotation_id),
    )
}
