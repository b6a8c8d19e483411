//! services/api/src/web/router.rs
//!
//! Assembles every HTTP and WebSocket route into one axum `Router`.

use crate::web::{
    annotations::{
        create_annotation_handler, delete_annotation_handler, list_annotations_handler,
        update_annotation_handler,
    },
    rest::{
        create_document_handler, delete_document_handler, document_file_handler,
        get_document_handler, list_documents_handler, update_document_status_handler,
    },
    selections::{capture_region_handler, capture_text_handler},
    state::AppState,
    ws_handler::chat_ws_handler,
};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, patch, post, put},
    Router,
};
use std::sync::Arc;

/// Uploads and page rasters can be large; everything else is small JSON.
const MAX_BODY_BYTES: usize = 50 * 1024 * 1024;

pub fn api_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/documents",
            get(list_documents_handler).post(create_document_handler),
        )
        .route(
            "/documents/{id}",
            get(get_document_handler).delete(delete_document_handler),
        )
        .route("/documents/{id}/file", get(document_file_handler))
        .route("/documents/{id}/status", put(update_document_status_handler))
        .route(
            "/documents/{id}/annotations",
            get(list_annotations_handler).post(create_annotation_handler),
        )
        .route(
            "/documents/{id}/annotations/{annotation_id}",
            patch(update_annotation_handler).delete(delete_annotation_handler),
        )
        .route("/documents/{id}/chat", get(chat_ws_handler))
        .route("/selections/region", post(capture_region_handler))
        .route("/selections/text", post(capture_text_handler))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(app_state)
}
