//! crates/page_lens_core/src/chat.rs
//!
//! The streaming chat session. Owns the ordered message history of one viewer,
//! issues one streamed completion per user turn and grows the assistant's reply
//! in place as fragments arrive.
//!
//! Per turn the session moves `Idle -> AwaitingFirstToken -> Streaming -> Completed`,
//! or to `Failed` on any transport or decode error. A failed turn keeps its error text
//! as the assistant's reply and the session stays usable.

use crate::domain::{ChatMessage, TurnState};
use crate::ports::{CompletionService, KeyValueStore, PortError};
use crate::schema::{decode_chat, encode_chat};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Number of committed messages sent as context with each new prompt.
pub const HISTORY_WINDOW: usize = 10;

/// Change notifications emitted by a [`ChatSession`], one per visible change.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// A user message and an empty streaming assistant message were appended.
    TurnStarted { user: ChatMessage },
    /// A fragment was appended to the streaming assistant message.
    Delta { text: String },
    Completed { content: String },
    Failed { error: String },
    Cleared,
}

pub trait ChatObserver: Send + Sync {
    fn on_chat_event(&self, event: &ChatEvent);
}

/// How a call to [`ChatSession::send`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed,
    Failed,
    /// The history was cleared while the response was streaming; the rest was dropped.
    Abandoned,
}

#[derive(Debug, Clone)]
pub struct ChatSessionOptions {
    pub history_window: usize,
}

impl Default for ChatSessionOptions {
    fn default() -> Self {
        Self {
            history_window: HISTORY_WINDOW,
        }
    }
}

struct SessionState {
    messages: Vec<ChatMessage>,
    turn: TurnState,
    /// Bumped by `clear`, so chunks of a turn started before it can be recognized.
    epoch: u64,
}

pub struct ChatSession {
    key: String,
    completion: Arc<dyn CompletionService>,
    store: Arc<dyn KeyValueStore>,
    observer: Option<Arc<dyn ChatObserver>>,
    options: ChatSessionOptions,
    state: Mutex<SessionState>,
}

impl ChatSession {
    /// Creates a session, restoring committed history stored under `key`.
    pub async fn restore(
        key: impl Into<String>,
        completion: Arc<dyn CompletionService>,
        store: Arc<dyn KeyValueStore>,
        observer: Option<Arc<dyn ChatObserver>>,
        options: ChatSessionOptions,
    ) -> Self {
        let key = key.into();
        let messages = match store.get(&key).await {
            Ok(Some(blob)) => decode_chat(&blob).unwrap_or_else(|e| {
                warn!("Ignoring unreadable chat history under '{}': {}", key, e);
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("Failed to read chat history under '{}': {}", key, e);
                Vec::new()
            }
        };
        info!("Restored {} chat message(s) under '{}'", messages.len(), key);

        Self {
            key,
            completion,
            store,
            observer,
            options,
            state: Mutex::new(SessionState {
                messages,
                turn: TurnState::Idle,
                epoch: 0,
            }),
        }
    }

    pub async fn messages(&self) -> Vec<ChatMessage> {
        self.state.lock().await.messages.clone()
    }

    pub async fn turn_state(&self) -> TurnState {
        self.state.lock().await.turn
    }

    pub async fn is_loading(&self) -> bool {
        self.turn_state().await.is_in_flight()
    }

    /// Sends a prompt and streams the reply into history.
    ///
    /// Callers must not overlap two `send`s on one session; both would grow the same
    /// trailing message.
    pub async fn send(&self, prompt: &str, image_bytes: Option<Vec<u8>>) -> TurnOutcome {
        let user = ChatMessage::user(prompt, image_bytes);

        let (request, epoch) = {
            let mut state = self.state.lock().await;
            let mut request = history_window(&state.messages, self.options.history_window);
            request.push(user.clone());
            state.messages.push(user.clone());
            state.messages.push(ChatMessage::placeholder());
            state.turn = TurnState::AwaitingFirstToken;
            (request, state.epoch)
        };
        info!(
            "Sending prompt with {} message(s) of context{}",
            request.len() - 1,
            if user.image_bytes.is_some() { " and an image" } else { "" }
        );
        self.emit(ChatEvent::TurnStarted { user });

        let mut stream = match self.completion.stream_completion(&request).await {
            Ok(stream) => stream,
            Err(e) => return self.fail(epoch, e).await,
        };

        while let Some(item) = stream.next().await {
            match item {
                Ok(fragment) => {
                    if !self.append_fragment(epoch, &fragment).await {
                        debug!("History was cleared mid-stream; dropping the rest of the reply");
                        return TurnOutcome::Abandoned;
                    }
                    self.emit(ChatEvent::Delta { text: fragment });
                }
                Err(e) => return self.fail(epoch, e).await,
            }
        }

        self.complete(epoch).await
    }

    /// Discards the in-memory history and its durable copy.
    ///
    /// An in-flight read is not cancelled, but nothing it delivers afterwards is kept.
    pub async fn clear(&self) {
        {
            // Held across the removal so a commit cannot land between the two.
            let mut state = self.state.lock().await;
            state.messages.clear();
            state.turn = TurnState::Idle;
            state.epoch += 1;
            if let Err(e) = self.store.remove(&self.key).await {
                warn!("Failed to erase chat history under '{}': {}", self.key, e);
            }
        }
        info!("Chat history under '{}' cleared", self.key);
        self.emit(ChatEvent::Cleared);
    }

    async fn append_fragment(&self, epoch: u64, fragment: &str) -> bool {
        let mut state = self.state.lock().await;
        if state.epoch != epoch {
            return false;
        }
        match state.messages.last_mut() {
            Some(last) if last.is_streaming => last.content.push_str(fragment),
            _ => return false,
        }
        state.turn = TurnState::Streaming;
        true
    }

    async fn complete(&self, epoch: u64) -> TurnOutcome {
        let content = match self.finish_turn(epoch, TurnState::Completed, None).await {
            Some(content) => content,
            None => return TurnOutcome::Abandoned,
        };
        info!("Response completed ({} chars)", content.len());
        self.emit(ChatEvent::Completed { content });
        TurnOutcome::Completed
    }

    async fn fail(&self, epoch: u64, error: PortError) -> TurnOutcome {
        let message = format!("Error: {}", error);
        warn!("Chat turn failed: {}", error);
        if self
            .finish_turn(epoch, TurnState::Failed, Some(message.clone()))
            .await
            .is_none()
        {
            return TurnOutcome::Abandoned;
        }
        self.emit(ChatEvent::Failed { error: message });
        TurnOutcome::Failed
    }

    /// Closes the streaming message and persists the committed history.
    ///
    /// The state lock is held until the write returns, so a concurrent `clear` either
    /// runs first and voids the turn, or runs after and erases what was written.
    /// Returns the final content, or `None` if the turn no longer belongs to this history.
    async fn finish_turn(
        &self,
        epoch: u64,
        turn: TurnState,
        replacement: Option<String>,
    ) -> Option<String> {
        let mut state = self.state.lock().await;
        if state.epoch != epoch {
            return None;
        }
        let last = state.messages.last_mut().filter(|m| m.is_streaming)?;
        if let Some(replacement) = replacement {
            last.content = replacement;
        }
        last.is_streaming = false;
        let content = last.content.clone();
        state.turn = turn;

        match encode_chat(&state.messages) {
            Ok(blob) => {
                if let Err(e) = self.store.set(&self.key, &blob).await {
                    warn!(
                        "Failed to persist chat history under '{}'; keeping it in memory: {}",
                        self.key, e
                    );
                }
            }
            Err(e) => warn!("Failed to encode chat history: {}", e),
        }
        Some(content)
    }

    fn emit(&self, event: ChatEvent) {
        if let Some(observer) = &self.observer {
            observer.on_chat_event(&event);
        }
    }
}

/// The most recent `window` committed messages, oldest first.
pub fn history_window(messages: &[ChatMessage], window: usize) -> Vec<ChatMessage> {
    let committed: Vec<&ChatMessage> = messages.iter().filter(|m| !m.is_streaming).collect();
    let skip = committed.len().saturating_sub(window);
    committed.into_iter().skip(skip).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_keeps_the_most_recent_committed_messages() {
        let mut messages: Vec<ChatMessage> = (0..14)
            .map(|i| ChatMessage::assistant(format!("m{}", i)))
            .collect();
        messages.push(ChatMessage::placeholder());

        let window = history_window(&messages, 10);
        assert_eq!(window.len(), 10);
        assert_eq!(window[0].content, "m4");
        assert_eq!(window[9].content, "m13");
        assert!(window.iter().all(|m| !m.is_streaming));
    }

    #[test]
    fn short_histories_are_sent_whole() {
        let messages = vec![ChatMessage::user("hi", None), ChatMessage::assistant("hello")];
        assert_eq!(history_window(&messages, 10), messages);
    }
}
