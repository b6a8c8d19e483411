//! crates/page_lens_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! Persisted shapes live in `schema`; these structs carry no storage layout.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

//=========================================================================================
// Geometry
//=========================================================================================

/// An axis-aligned rectangle. Coordinates are in whatever pixel space the owner documents.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Returns the rectangle with every component multiplied by `ratio`.
    pub fn scaled(&self, ratio: f64) -> Self {
        Self {
            x: self.x * ratio,
            y: self.y * ratio,
            width: self.width * ratio,
            height: self.height * ratio,
        }
    }

    /// Same as [`Rect::scaled`] but with independent horizontal and vertical ratios.
    pub fn scaled_xy(&self, ratio_x: f64, ratio_y: f64) -> Self {
        Self {
            x: self.x * ratio_x,
            y: self.y * ratio_y,
            width: self.width * ratio_x,
            height: self.height * ratio_y,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.width.is_finite() && self.height.is_finite()
    }
}

//=========================================================================================
// Selection
//=========================================================================================

/// What a selection holds. `Text` and `Equation` come from the classifier;
/// `Image` and `Region` come from the capture method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionKind {
    Text,
    Equation,
    Image,
    Region,
}

/// Transient user-chosen content awaiting consumption by a chat turn or an annotation.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub kind: SelectionKind,
    pub text: String,
    pub page_number: u32,
    /// PNG-encoded sub-image, present for pixel captures.
    pub image_bytes: Option<Vec<u8>>,
    /// Page-container pixels at the zoom the capture was made with.
    pub rect: Option<Rect>,
    /// Zoom the page was rendered at when the selection was captured.
    pub capture_scale: f64,
}

impl Selection {
    pub fn is_spatial(&self) -> bool {
        self.rect.is_some()
    }
}

//=========================================================================================
// Annotations
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationStatus {
    Complete,
    Incomplete,
    Pending,
    Note,
}

impl AnnotationStatus {
    pub const ALL: [AnnotationStatus; 4] = [
        AnnotationStatus::Complete,
        AnnotationStatus::Incomplete,
        AnnotationStatus::Pending,
        AnnotationStatus::Note,
    ];
}

/// Status filter used when listing a page's annotations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    Only(AnnotationStatus),
}

impl StatusFilter {
    pub fn matches(&self, status: AnnotationStatus) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Only(wanted) => *wanted == status,
        }
    }
}

impl From<Option<AnnotationStatus>> for StatusFilter {
    fn from(status: Option<AnnotationStatus>) -> Self {
        status.map_or(StatusFilter::All, StatusFilter::Only)
    }
}

/// A persisted, spatially-anchored status marker tied to a page region.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub id: Uuid,
    pub page_number: u32,
    /// Page-container pixels at `capture_scale`. Never assume it matches the current zoom.
    pub rect: Rect,
    pub status: AnnotationStatus,
    pub note: Option<String>,
    pub source_text: String,
    pub created_at: DateTime<Utc>,
    pub capture_scale: f64,
}

impl Annotation {
    /// Re-derives the rectangle for a page currently rendered at `current_scale`.
    pub fn render_rect(&self, current_scale: f64) -> Rect {
        if self.capture_scale <= 0.0 {
            return self.rect.scaled(current_scale);
        }
        self.rect.scaled(current_scale / self.capture_scale)
    }
}

//=========================================================================================
// Chat
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// A single entry of a chat session's history.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    pub image_bytes: Option<Vec<u8>>,
    pub is_streaming: bool,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>, image_bytes: Option<Vec<u8>>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
            image_bytes,
            is_streaming: false,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            image_bytes: None,
            is_streaming: false,
        }
    }

    /// The empty assistant message that grows while a response streams in.
    pub fn placeholder() -> Self {
        Self {
            role: ChatRole::Assistant,
            content: String::new(),
            image_bytes: None,
            is_streaming: true,
        }
    }
}

/// Where the current (or last) turn of a chat session stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    #[default]
    Idle,
    AwaitingFirstToken,
    Streaming,
    Completed,
    Failed,
}

impl TurnState {
    pub fn is_in_flight(&self) -> bool {
        matches!(self, TurnState::AwaitingFirstToken | TurnState::Streaming)
    }
}

//=========================================================================================
// Documents
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    #[default]
    None,
    Complete,
    Incomplete,
    Ongoing,
}

/// A document registered with the library.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: Uuid,
    pub name: String,
    pub status: DocumentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
