pub mod annotations;
pub mod chat;
pub mod classify;
pub mod domain;
pub mod geometry;
pub mod ports;
pub mod schema;

pub use annotations::{AnnotationEvent, AnnotationObserver, AnnotationStore};
pub use chat::{ChatEvent, ChatObserver, ChatSession, ChatSessionOptions, TurnOutcome};
pub use classify::classify;
pub use domain::{
    Annotation, AnnotationStatus, ChatMessage, ChatRole, Document, DocumentStatus, Rect,
    Selection, SelectionKind, StatusFilter, TurnState,
};
pub use geometry::{capture_region, capture_text, CaptureMode, PageSurface, ViewportPoint};
pub use ports::{
    CompletionService, DocumentRegistry, KeyValueStore, PortError, PortResult, TokenStream,
};
