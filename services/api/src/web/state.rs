//! services/api/src/web/state.rs
//!
//! Defines the application's shared state and the per-document annotation stores
//! and chat rooms it hands out to request handlers.

use crate::adapters::DocumentScopedStore;
use crate::config::Config;
use crate::web::chat_room::ChatRoom;
use crate::web::protocol::ServerMessage;
use page_lens_core::annotations::{AnnotationEvent, AnnotationObserver, AnnotationStore};
use page_lens_core::chat::ChatSessionOptions;
use page_lens_core::ports::{CompletionService, DocumentRegistry, KeyValueStore, PortResult};
use page_lens_core::schema::{annotations_key, chat_key};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};
use uuid::Uuid;

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<dyn DocumentRegistry>,
    pub store: Arc<dyn KeyValueStore>,
    pub completion: Arc<dyn CompletionService>,
    /// Per-document views of `store`; a deleted document's entry stays, retired.
    scopes: Mutex<HashMap<Uuid, Arc<DocumentScopedStore>>>,
    /// Annotation stores restored so far, one per document.
    annotations: Mutex<HashMap<Uuid, Arc<Mutex<AnnotationStore>>>>,
    /// Chat rooms with at least one socket attached.
    chats: Mutex<HashMap<Uuid, Arc<ChatRoom>>>,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        registry: Arc<dyn DocumentRegistry>,
        store: Arc<dyn KeyValueStore>,
        completion: Arc<dyn CompletionService>,
    ) -> Self {
        Self {
            config,
            registry,
            store,
            completion,
            scopes: Mutex::new(HashMap::new()),
            annotations: Mutex::new(HashMap::new()),
            chats: Mutex::new(HashMap::new()),
        }
    }

    async fn scope(&self, document_id: Uuid) -> Arc<DocumentScopedStore> {
        self.scopes
            .lock()
            .await
            .entry(document_id)
            .or_insert_with(|| Arc::new(DocumentScopedStore::new(document_id, self.store.clone())))
            .clone()
    }

    /// The store a document's annotations and chat history are written through.
    /// It stops accepting writes once the document is deleted.
    pub async fn document_store(&self, document_id: Uuid) -> Arc<dyn KeyValueStore> {
        self.scope(document_id).await
    }

    /// Returns the document's annotation store, restoring it from storage on first use.
    ///
    /// The caller is responsible for checking that the document exists.
    pub async fn annotation_store(&self, document_id: Uuid) -> Arc<Mutex<AnnotationStore>> {
        let mut stores = self.annotations.lock().await;
        if let Some(existing) = stores.get(&document_id) {
            return existing.clone();
        }
        let restored = AnnotationStore::restore(
            document_id,
            self.document_store(document_id).await,
            Some(Arc::new(AnnotationLog)),
        )
        .await;
        let restored = Arc::new(Mutex::new(restored));
        stores.insert(document_id, restored.clone());
        restored
    }

    pub fn chat_options(&self) -> ChatSessionOptions {
        ChatSessionOptions {
            history_window: self.config.history_window,
        }
    }

    /// Attaches a socket to the document's chat room, opening the room if needed.
    ///
    /// The caller is responsible for checking that the document exists, and must call
    /// [`AppState::leave_chat`] after dropping the returned receiver.
    pub async fn join_chat(
        &self,
        document_id: Uuid,
    ) -> (Arc<ChatRoom>, broadcast::Receiver<ServerMessage>) {
        let mut rooms = self.chats.lock().await;
        if let Some(room) = rooms.get(&document_id) {
            let listener = room.subscribe();
            info!(
                "Socket joined the chat for document {} ({} attached)",
                document_id,
                room.listeners()
            );
            return (room.clone(), listener);
        }
        let room = Arc::new(
            ChatRoom::open(
                document_id,
                self.completion.clone(),
                self.document_store(document_id).await,
                self.chat_options(),
            )
            .await,
        );
        let listener = room.subscribe();
        rooms.insert(document_id, room.clone());
        (room, listener)
    }

    /// Closes the room once its last socket has gone.
    pub async fn leave_chat(&self, room: &Arc<ChatRoom>) {
        let mut rooms = self.chats.lock().await;
        if room.listeners() > 0 {
            return;
        }
        let document_id = room.document_id();
        if rooms.get(&document_id).is_some_and(|open| Arc::ptr_eq(open, room)) {
            rooms.remove(&document_id);
        }
        room.close().await;
    }

    /// Deletes a document together with its annotation and chat blobs.
    ///
    /// Sessions still holding the document's store can no longer write to it, so the
    /// blobs stay erased.
    pub async fn delete_document(&self, document_id: Uuid) -> PortResult<()> {
        self.registry.delete_document(document_id).await?;
        self.scope(document_id).await.retire().await;
        self.annotations.lock().await.remove(&document_id);
        if let Some(room) = self.chats.lock().await.remove(&document_id) {
            room.close().await;
        }
        for key in [annotations_key(document_id), chat_key(document_id)] {
            if let Err(e) = self.store.remove(&key).await {
                warn!("Document {} deleted but '{}' could not be erased: {}", document_id, key, e);
            }
        }
        Ok(())
    }
}

//=========================================================================================
// Observers
//=========================================================================================

/// Writes every annotation change to the log.
struct AnnotationLog;

impl AnnotationObserver for AnnotationLog {
    fn on_annotation_event(&self, document_id: Uuid, event: &AnnotationEvent) {
        match event {
            AnnotationEvent::Created(a) => info!(
                "Annotation {} created on page {} of {} ({:?})",
                a.id, a.page_number, document_id, a.status
            ),
            AnnotationEvent::Updated(a) => info!(
                "Annotation {} on page {} of {} updated",
                a.id, a.page_number, document_id
            ),
            AnnotationEvent::Deleted { id, page_number } => info!(
                "Annotation {} removed from page {} of {}",
                id, page_number, document_id
            ),
        }
    }
}
