//! services/api/src/web/chat_room.rs
//!
//! One `ChatSession` per document, shared by every socket viewing that document.
//! Session events are fanned out over a broadcast channel, so all tabs see the same
//! history and only one reply streams at a time.

use crate::web::protocol::{ChatMessageFrame, ServerMessage};
use page_lens_core::chat::{ChatEvent, ChatObserver, ChatSession, ChatSessionOptions, TurnOutcome};
use page_lens_core::ports::{CompletionService, KeyValueStore};
use page_lens_core::schema::chat_key;
use std::sync::Arc;
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::info;
use uuid::Uuid;

/// Frames a slow socket may fall behind by before it starts losing deltas.
const FRAME_BUFFER: usize = 1024;

/// Publishes every chat event to the room's listeners.
pub struct FrameForwarder {
    frames: broadcast::Sender<ServerMessage>,
}

impl FrameForwarder {
    pub fn new(frames: broadcast::Sender<ServerMessage>) -> Self {
        Self { frames }
    }
}

impl ChatObserver for FrameForwarder {
    fn on_chat_event(&self, event: &ChatEvent) {
        // No listeners just means every socket has gone; the room is closed right after.
        let _ = self.frames.send(ServerMessage::from(event));
    }
}

pub struct ChatRoom {
    document_id: Uuid,
    session: Arc<ChatSession>,
    frames: broadcast::Sender<ServerMessage>,
    turn: Mutex<Option<JoinHandle<TurnOutcome>>>,
}

impl ChatRoom {
    /// Restores the document's chat history into a fresh room with no listeners.
    pub async fn open(
        document_id: Uuid,
        completion: Arc<dyn CompletionService>,
        store: Arc<dyn KeyValueStore>,
        options: ChatSessionOptions,
    ) -> Self {
        let (frames, _) = broadcast::channel(FRAME_BUFFER);
        let session = ChatSession::restore(
            chat_key(document_id),
            completion,
            store,
            Some(Arc::new(FrameForwarder::new(frames.clone()))),
            options,
        )
        .await;
        Self {
            document_id,
            session: Arc::new(session),
            frames,
            turn: Mutex::new(None),
        }
    }

    pub fn document_id(&self) -> Uuid {
        self.document_id
    }

    pub fn session(&self) -> &ChatSession {
        &self.session
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerMessage> {
        self.frames.subscribe()
    }

    pub fn listeners(&self) -> usize {
        self.frames.receiver_count()
    }

    /// The frame a newly joined socket starts from.
    pub async fn history(&self) -> ServerMessage {
        ServerMessage::History {
            messages: self
                .session
                .messages()
                .await
                .iter()
                .map(ChatMessageFrame::from)
                .collect(),
            state: self.session.turn_state().await,
        }
    }

    /// Starts streaming a reply unless one is already running. Returns whether it started.
    pub async fn start_turn(&self, prompt: String, image_bytes: Option<Vec<u8>>) -> bool {
        let mut turn = self.turn.lock().await;
        if turn.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return false;
        }
        let session = self.session.clone();
        let document_id = self.document_id;
        *turn = Some(tokio::spawn(async move {
            let outcome = session.send(&prompt, image_bytes).await;
            info!("Chat turn on document {} ended: {:?}", document_id, outcome);
            outcome
        }));
        true
    }

    /// Stops the reply being streamed, if any, then wipes the history.
    pub async fn clear(&self) {
        let mut turn = self.turn.lock().await;
        if let Some(handle) = turn.take() {
            handle.abort();
        }
        self.session.clear().await;
    }

    /// Stops the reply being streamed; called when the last listener leaves.
    pub async fn close(&self) {
        if let Some(handle) = self.turn.lock().await.take() {
            handle.abort();
        }
        info!("Chat room for document {} closed", self.document_id);
    }
}
