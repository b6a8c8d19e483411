//! In-memory fakes of the core ports, shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use futures::channel::mpsc::UnboundedReceiver;
use futures::stream;
use page_lens_core::annotations::{AnnotationEvent, AnnotationObserver};
use page_lens_core::chat::{ChatEvent, ChatObserver};
use page_lens_core::{
    ChatMessage, CompletionService, KeyValueStore, PortError, PortResult, TokenStream,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

//=========================================================================================
// Storage
//=========================================================================================

#[derive(Default)]
pub struct MemoryStore {
    blobs: Mutex<HashMap<String, String>>,
    fail_writes: AtomicBool,
    write_delay: Mutex<Option<Duration>>,
    writes_started: AtomicUsize,
}

impl MemoryStore {
    pub fn blob(&self, key: &str) -> Option<String> {
        self.blobs.lock().unwrap().get(key).cloned()
    }

    pub fn insert(&self, key: &str, value: &str) {
        self.blobs
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Makes every `set` sleep before it lands, like a slow disk.
    pub fn delay_writes(&self, delay: Duration) {
        *self.write_delay.lock().unwrap() = Some(delay);
    }

    /// How many `set` calls have begun, including ones still sleeping.
    pub fn writes_started(&self) -> usize {
        self.writes_started.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> PortResult<Option<String>> {
        Ok(self.blob(key))
    }

    async fn set(&self, key: &str, value: &str) -> PortResult<()> {
        self.writes_started.fetch_add(1, Ordering::SeqCst);
        let delay = *self.write_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(PortError::Storage("disk full".to_string()));
        }
        self.insert(key, value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> PortResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(PortError::Storage("read-only".to_string()));
        }
        self.blobs.lock().unwrap().remove(key);
        Ok(())
    }
}

//=========================================================================================
// Completion endpoint
//=========================================================================================

pub enum Script {
    /// Streams the fragments, then ends normally.
    Reply(Vec<String>),
    /// Streams the fragments, then fails mid-stream.
    BreakAfter(Vec<String>, String),
    /// Refuses the request outright.
    Refuse(String),
    /// Yields whatever the test pushes into the channel.
    Live(UnboundedReceiver<PortResult<String>>),
}

impl Script {
    pub fn reply(fragments: &[&str]) -> Self {
        Script::Reply(fragments.iter().map(|f| f.to_string()).collect())
    }
}

/// Plays back queued scripts and records every request it receives.
#[derive(Default)]
pub struct ScriptedCompletion {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedCompletion {
    pub fn push(&self, script: Script) {
        self.scripts.lock().unwrap().push_back(script);
    }

    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> Vec<ChatMessage> {
        self.requests().pop().unwrap_or_default()
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletion {
    async fn stream_completion(&self, messages: &[ChatMessage]) -> PortResult<TokenStream> {
        self.requests.lock().unwrap().push(messages.to_vec());
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Script::reply(&["ok"]));

        match script {
            Script::Reply(fragments) => Ok(Box::pin(stream::iter(
                fragments.into_iter().map(Ok).collect::<Vec<_>>(),
            ))),
            Script::BreakAfter(fragments, error) => {
                let mut items: Vec<PortResult<String>> = fragments.into_iter().map(Ok).collect();
                items.push(Err(PortError::Transport(error)));
                Ok(Box::pin(stream::iter(items)))
            }
            Script::Refuse(error) => Err(PortError::Transport(error)),
            Script::Live(receiver) => Ok(Box::pin(receiver)),
        }
    }
}

//=========================================================================================
// Observers
//=========================================================================================

#[derive(Default)]
pub struct Recorder {
    chat: Mutex<Vec<ChatEvent>>,
    annotations: Mutex<Vec<(Uuid, AnnotationEvent)>>,
}

impl Recorder {
    pub fn chat_events(&self) -> Vec<ChatEvent> {
        self.chat.lock().unwrap().clone()
    }

    pub fn annotation_events(&self) -> Vec<(Uuid, AnnotationEvent)> {
        self.annotations.lock().unwrap().clone()
    }
}

impl ChatObserver for Recorder {
    fn on_chat_event(&self, event: &ChatEvent) {
        self.chat.lock().unwrap().push(event.clone());
    }
}

impl AnnotationObserver for Recorder {
    fn on_annotation_event(&self, document_id: Uuid, event: &AnnotationEvent) {
        self.annotations
            .lock()
            .unwrap()
            .push((document_id, event.clone()));
    }
}
