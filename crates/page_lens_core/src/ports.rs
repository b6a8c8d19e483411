//! crates/page_lens_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the completion endpoint, the storage medium and the registry.

use crate::domain::{ChatMessage, Document, DocumentStatus};
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use uuid::Uuid;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., filesystem, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Transport failure: {0}")]
    Transport(String),
    #[error("Could not decode response: {0}")]
    Decode(String),
    #[error("Storage failure: {0}")]
    Storage(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

/// Incremental text fragments of a streamed completion, in arrival order.
pub type TokenStream = Pin<Box<dyn Stream<Item = PortResult<String>> + Send>>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Starts a streamed completion for the given conversation.
    ///
    /// Failing to establish the stream is reported by the outer result; failures while
    /// reading it arrive as `Err` items.
    async fn stream_completion(&self, messages: &[ChatMessage]) -> PortResult<TokenStream>;
}

/// Key-scoped durable blobs. Each value is rewritten wholesale.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> PortResult<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> PortResult<()>;

    /// Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> PortResult<()>;
}

#[async_trait]
pub trait DocumentRegistry: Send + Sync {
    async fn list_documents(&self) -> PortResult<Vec<Document>>;

    async fn create_document(&self, name: &str, raw_bytes: &[u8]) -> PortResult<Document>;

    async fn get_document(&self, document_id: Uuid) -> PortResult<Document>;

    async fn document_bytes(&self, document_id: Uuid) -> PortResult<Vec<u8>>;

    async fn delete_document(&self, document_id: Uuid) -> PortResult<()>;

    async fn update_status(
        &self,
        document_id: Uuid,
        status: DocumentStatus,
    ) -> PortResult<Document>;
}
