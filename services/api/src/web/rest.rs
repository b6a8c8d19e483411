//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the document library endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::{annotations, selections, state::AppState};
use axum::{
    extract::{Multipart, Path, State},
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Json},
};
use chrono::{DateTime, Utc};
use page_lens_core::domain::{Document, DocumentStatus};
use page_lens_core::ports::PortError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        list_documents_handler,
        create_document_handler,
        get_document_handler,
        document_file_handler,
        delete_document_handler,
        update_document_status_handler,
        annotations::list_annotations_handler,
        annotations::create_annotation_handler,
        annotations::update_annotation_handler,
        annotations::delete_annotation_handler,
        selections::capture_region_handler,
        selections::capture_text_handler,
    ),
    components(
        schemas(
            DocumentResponse,
            UpdateStatusRequest,
            annotations::RectBody,
            annotations::AnnotationResponse,
            annotations::AnnotationListResponse,
            annotations::CreateAnnotationRequest,
            annotations::UpdateAnnotationRequest,
            selections::PointBody,
            selections::CaptureModeBody,
            selections::RegionCaptureRequest,
            selections::TextCaptureRequest,
            selections::SelectionBody,
            selections::CaptureResponse,
        )
    ),
    tags(
        (name = "Page Lens API", description = "Document library, annotations and selection capture for the page viewer.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

/// A document in the library.
#[derive(Serialize, ToSchema, Debug)]
pub struct DocumentResponse {
    pub id: Uuid,
    pub name: String,
    #[schema(value_type = String, example = "ongoing")]
    pub status: DocumentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Document> for DocumentResponse {
    fn from(document: Document) -> Self {
        Self {
            id: document.id,
            name: document.name,
            status: document.status,
            created_at: document.created_at,
            updated_at: document.updated_at,
        }
    }
}

/// The payload for changing a document's reading status.
#[derive(Deserialize, ToSchema, Debug)]
pub struct UpdateStatusRequest {
    /// One of `none`, `complete`, `incomplete`, `ongoing`.
    #[schema(value_type = String, example = "complete")]
    pub status: DocumentStatus,
}

/// Maps a port failure onto an HTTP error response.
pub(crate) fn port_error(context: &str, e: PortError) -> (StatusCode, String) {
    match e {
        PortError::NotFound(message) => (StatusCode::NOT_FOUND, message),
        other => {
            error!("{}: {:?}", context, other);
            (StatusCode::INTERNAL_SERVER_ERROR, format!("{} failed", context))
        }
    }
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// List every document in the library, most recently updated first.
#[utoipa::path(
    get,
    path = "/documents",
    responses(
        (status = 200, description = "The documents", body = [DocumentResponse]),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn list_documents_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<Vec<DocumentResponse>>, (StatusCode, String)> {
    let documents = app_state
        .registry
        .list_documents()
        .await
        .map_err(|e| port_error("Listing documents", e))?;
    Ok(Json(documents.into_iter().map(DocumentResponse::from).collect()))
}

/// Register a new document by uploading it.
///
/// Accepts a multipart/form-data request with a single file part.
#[utoipa::path(
    post,
    path = "/documents",
    request_body(content_type = "multipart/form-data", description = "The document to upload."),
    responses(
        (status = 201, description = "Document registered", body = DocumentResponse),
        (status = 400, description = "Bad request (e.g., missing file)"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn create_document_handler(
    State(app_state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<DocumentResponse>), (StatusCode, String)> {
    let field = multipart
        .next_field()
        .await
        .map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                format!("Failed to read multipart data: {}", e),
            )
        })?
        .ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                "Multipart form must include a file".to_string(),
            )
        })?;

    let name = field.file_name().unwrap_or("untitled.pdf").to_string();
    let data = field.bytes().await.map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            format!("Failed to read file bytes: {}", e),
        )
    })?;
    if data.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Uploaded file is empty".to_string()));
    }

    let document = app_state
        .registry
        .create_document(&name, &data)
        .await
        .map_err(|e| port_error("Registering document", e))?;
    Ok((StatusCode::CREATED, Json(document.into())))
}

/// Fetch a single document's metadata.
#[utoipa::path(
    get,
    path = "/documents/{id}",
    params(("id" = Uuid, Path, description = "The document ID.")),
    responses(
        (status = 200, description = "The document", body = DocumentResponse),
        (status = 404, description = "No such document")
    )
)]
pub async fn get_document_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DocumentResponse>, (StatusCode, String)> {
    let document = app_state
        .registry
        .get_document(id)
        .await
        .map_err(|e| port_error("Fetching document", e))?;
    Ok(Json(document.into()))
}

/// Download the raw bytes a document was uploaded with.
#[utoipa::path(
    get,
    path = "/documents/{id}/file",
    params(("id" = Uuid, Path, description = "The document ID.")),
    responses(
        (status = 200, description = "The uploaded file", body = Vec<u8>, content_type = "application/octet-stream"),
        (status = 404, description = "No such document")
    )
)]
pub async fn document_file_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let bytes = app_state
        .registry
        .document_bytes(id)
        .await
        .map_err(|e| port_error("Reading document file", e))?;
    Ok(([(CONTENT_TYPE, "application/octet-stream")], bytes))
}

/// Delete a document along with its annotations and chat history.
#[utoipa::path(
    delete,
    path = "/documents/{id}",
    params(("id" = Uuid, Path, description = "The document ID.")),
    responses(
        (status = 204, description = "Document deleted"),
        (status = 404, description = "No such document")
    )
)]
pub async fn delete_document_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    app_state
        .delete_document(id)
        .await
        .map_err(|e| port_error("Deleting document", e))?;
    Ok(StatusCode::NO_CONTENT)
}

/// Change a document's reading status.
#[utoipa::path(
    put,
    path = "/documents/{id}/status",
    params(("id" = Uuid, Path, description = "The document ID.")),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = DocumentResponse),
        (status = 404, description = "No such document")
    )
)]
pub async fn update_document_status_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<DocumentResponse>, (StatusCode, String)> {
    let document = app_state
        .registry
        .update_status(id, payload.status)
        .await
        .map_err(|e| port_error("Updating document status", e))?;
    Ok(Json(document.into()))
}
