//! services/api/src/web/selections.rs
//!
//! Axum handlers that run the coordinate mapper and the classifier on behalf of the
//! viewer. A capture that produces no selection (a click, an unusable page surface,
//! blank text) is not an error; the response just carries `selection: null`.

use crate::web::{annotations::RectBody, protocol::decode_image};
use axum::{http::StatusCode, response::Json};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use page_lens_core::domain::{Selection, SelectionKind};
use page_lens_core::geometry::{
    capture_region, capture_text, CaptureMode, PageSurface, ViewportPoint,
};
use serde::{Deserialize, Serialize};
use tracing::debug;
use utoipa::ToSchema;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

/// A pointer position in page-container pixels.
#[derive(Deserialize, ToSchema, Debug, Clone, Copy)]
pub struct PointBody {
    pub x: f64,
    pub y: f64,
}

impl From<PointBody> for ViewportPoint {
    fn from(point: PointBody) -> Self {
        ViewportPoint::new(point.x, point.y)
    }
}

#[derive(Deserialize, ToSchema, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CaptureModeBody {
    /// Snip an image to attach to a prompt.
    Snip,
    /// Mark a region to annotate.
    Annotate,
}

impl From<CaptureModeBody> for CaptureMode {
    fn from(mode: CaptureModeBody) -> Self {
        match mode {
            CaptureModeBody::Snip => CaptureMode::Snip,
            CaptureModeBody::Annotate => CaptureMode::Annotate,
        }
    }
}

/// A drag over a rendered page.
#[derive(Deserialize, ToSchema, Debug)]
pub struct RegionCaptureRequest {
    /// The rendered page as base64 PNG (a `data:` URL is accepted too).
    pub page_image: String,
    /// Logical size of the page container the raster is displayed in.
    pub display_width: f64,
    pub display_height: f64,
    pub page_number: u32,
    /// Zoom the page was rendered at.
    #[serde(default = "default_scale")]
    pub scale: f64,
    pub start: PointBody,
    pub end: PointBody,
    pub mode: CaptureModeBody,
}

fn default_scale() -> f64 {
    1.0
}

#[derive(Deserialize, ToSchema, Debug)]
pub struct TextCaptureRequest {
    pub text: String,
    /// The page the text was selected on, when the viewer knows it.
    pub page_number: Option<u32>,
}

#[derive(Serialize, ToSchema, Debug)]
pub struct SelectionBody {
    #[schema(value_type = String, example = "equation")]
    pub kind: SelectionKind,
    pub text: String,
    pub page_number: u32,
    /// Base64 PNG of the captured pixels.
    pub image: Option<String>,
    pub rect: Option<RectBody>,
    pub capture_scale: f64,
}

impl From<Selection> for SelectionBody {
    fn from(selection: Selection) -> Self {
        Self {
            kind: selection.kind,
            text: selection.text,
            page_number: selection.page_number,
            image: selection.image_bytes.map(|bytes| STANDARD.encode(bytes)),
            rect: selection.rect.map(RectBody::from),
            capture_scale: selection.capture_scale,
        }
    }
}

#[derive(Serialize, ToSchema, Debug)]
pub struct CaptureResponse {
    pub selection: Option<SelectionBody>,
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Capture a dragged region of a rendered page.
#[utoipa::path(
    post,
    path = "/selections/region",
    request_body = RegionCaptureRequest,
    responses(
        (status = 200, description = "The selection, or null when the drag captured nothing", body = CaptureResponse),
        (status = 400, description = "The page image could not be decoded")
    )
)]
pub async fn capture_region_handler(
    Json(payload): Json<RegionCaptureRequest>,
) -> Result<Json<CaptureResponse>, (StatusCode, String)> {
    let png = decode_image(&payload.page_image).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            format!("page_image is not valid base64: {}", e),
        )
    })?;
    let pixels = image::load_from_memory(&png)
        .map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                format!("page_image is not a readable image: {}", e),
            )
        })?
        .to_rgba8();

    let surface = PageSurface::new(
        pixels,
        payload.display_width,
        payload.display_height,
        payload.page_number,
        payload.scale,
    );
    let selection = capture_region(
        &surface,
        payload.start.into(),
        payload.end.into(),
        payload.mode.into(),
    );
    if selection.is_none() {
        debug!("Region capture on page {} produced no selection", payload.page_number);
    }
    Ok(Json(CaptureResponse {
        selection: selection.map(SelectionBody::from),
    }))
}

/// Classify a text selection.
#[utoipa::path(
    post,
    path = "/selections/text",
    request_body = TextCaptureRequest,
    responses(
        (status = 200, description = "The selection, or null for blank text", body = CaptureResponse)
    )
)]
pub async fn capture_text_handler(Json(payload): Json<TextCaptureRequest>) -> Json<CaptureResponse> {
    Json(CaptureResponse {
        selection: capture_text(&payload.text, payload.page_number).map(SelectionBody::from),
    })
}
