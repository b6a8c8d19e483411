//! Integration tests for the streaming chat session.

mod support;

use page_lens_core::chat::{ChatEvent, ChatSession, ChatSessionOptions, TurnOutcome};
use page_lens_core::{ChatRole, TurnState};
use std::sync::Arc;
use std::time::Duration;
use support::{MemoryStore, Recorder, Script, ScriptedCompletion};

const KEY: &str = "chat:test-document";

struct Harness {
    completion: Arc<ScriptedCompletion>,
    store: Arc<MemoryStore>,
    recorder: Arc<Recorder>,
}

impl Harness {
    fn new() -> Self {
        Self {
            completion: Arc::new(ScriptedCompletion::default()),
            store: Arc::new(MemoryStore::default()),
            recorder: Arc::new(Recorder::default()),
        }
    }

    async fn session(&self) -> ChatSession {
        ChatSession::restore(
            KEY,
            self.completion.clone(),
            self.store.clone(),
            Some(self.recorder.clone()),
            ChatSessionOptions::default(),
        )
        .await
    }
}

#[tokio::test]
async fn fragments_grow_a_single_assistant_message() {
    let harness = Harness::new();
    harness.completion.push(Script::reply(&["Hel", "lo ", "world"]));
    let session = harness.session().await;

    let outcome = session.send("Say hello", None).await;

    assert_eq!(outcome, TurnOutcome::Completed);
    let messages = session.messages().await;
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, ChatRole::User);
    assert_eq!(messages[0].content, "Say hello");
    assert_eq!(messages[1].role, ChatRole::Assistant);
    assert_eq!(messages[1].content, "Hello world");
    assert!(!messages[1].is_streaming);
    assert_eq!(session.turn_state().await, TurnState::Completed);
    assert!(!session.is_loading().await);
}

#[tokio::test]
async fn observers_hear_every_fragment() {
    let harness = Harness::new();
    harness.completion.push(Script::reply(&["Hel", "lo ", "world"]));
    let session = harness.session().await;

    session.send("Say hello", None).await;

    let events = harness.recorder.chat_events();
    assert_eq!(events.len(), 5);
    assert!(matches!(&events[0], ChatEvent::TurnStarted { user } if user.content == "Say hello"));
    assert_eq!(events[1], ChatEvent::Delta { text: "Hel".to_string() });
    assert_eq!(events[2], ChatEvent::Delta { text: "lo ".to_string() });
    assert_eq!(events[3], ChatEvent::Delta { text: "world".to_string() });
    assert_eq!(
        events[4],
        ChatEvent::Completed {
            content: "Hello world".to_string()
        }
    );
}

#[tokio::test]
async fn only_the_last_ten_messages_are_sent_as_context() {
    let harness = Harness::new();
    let session = harness.session().await;
    for turn in 0..12 {
        harness.completion.push(Script::reply(&["answer ", turn.to_string().as_str()]));
        assert_eq!(
            session.send(&format!("question {}", turn), None).await,
            TurnOutcome::Completed
        );
    }

    session.send("question 12", None).await;

    let request = harness.completion.last_request();
    assert_eq!(request.len(), 11);
    // 24 committed messages; the window starts at the user message of turn 7.
    assert_eq!(request[0].content, "question 7");
    assert_eq!(request[9].content, "answer 11");
    assert_eq!(request[10].content, "question 12");
    assert!(request.iter().all(|m| !m.is_streaming));
}

#[tokio::test]
async fn images_travel_with_their_message_until_it_leaves_the_window() {
    let harness = Harness::new();
    let session = harness.session().await;

    session.send("what is this figure", Some(vec![0x89, b'P', b'N', b'G'])).await;
    assert!(harness.completion.last_request()[0].image_bytes.is_some());

    session.send("and the caption?", None).await;
    let second = harness.completion.last_request();
    assert_eq!(second.len(), 3);
    assert!(second[0].image_bytes.is_some());

    for turn in 0..5 {
        session.send(&format!("follow-up {}", turn), None).await;
    }
    let late = harness.completion.last_request();
    assert_eq!(late.len(), 11);
    assert!(late.iter().all(|m| m.image_bytes.is_none()));
}

#[tokio::test]
async fn completed_turns_survive_a_reload() {
    let harness = Harness::new();
    harness.completion.push(Script::reply(&["Paris"]));
    let session = harness.session().await;
    session
        .send("Capital of France?", Some(vec![1, 2, 3]))
        .await;
    let before = session.messages().await;
    drop(session);

    let reloaded = harness.session().await;
    assert_eq!(reloaded.messages().await, before);
    assert_eq!(reloaded.turn_state().await, TurnState::Idle);
}

#[tokio::test]
async fn clearing_wipes_memory_and_storage() {
    let harness = Harness::new();
    let session = harness.session().await;
    session.send("first", None).await;
    assert!(harness.store.blob(KEY).is_some());

    session.clear().await;

    assert!(session.messages().await.is_empty());
    assert!(harness.store.blob(KEY).is_none());
    assert_eq!(harness.recorder.chat_events().last(), Some(&ChatEvent::Cleared));

    let reloaded = harness.session().await;
    assert!(reloaded.messages().await.is_empty());
}

#[tokio::test]
async fn mid_stream_failure_becomes_the_reply_and_the_session_recovers() {
    let harness = Harness::new();
    harness.completion.push(Script::BreakAfter(
        vec!["Par".to_string()],
        "connection reset".to_string(),
    ));
    let session = harness.session().await;

    let outcome = session.send("Capital of France?", None).await;

    assert_eq!(outcome, TurnOutcome::Failed);
    assert_eq!(session.turn_state().await, TurnState::Failed);
    let messages = session.messages().await;
    let assistants: Vec<_> = messages
        .iter()
        .filter(|m| m.role == ChatRole::Assistant)
        .collect();
    assert_eq!(assistants.len(), 1);
    assert!(!assistants[0].is_streaming);
    assert!(assistants[0].content.starts_with("Error:"));
    assert!(assistants[0].content.contains("connection reset"));

    harness.completion.push(Script::reply(&["Paris"]));
    assert_eq!(session.send("Try again", None).await, TurnOutcome::Completed);
    let messages = session.messages().await;
    assert_eq!(messages.len(), 4);
    assert_eq!(messages[3].content, "Paris");
}

#[tokio::test]
async fn refused_requests_fail_the_turn() {
    let harness = Harness::new();
    harness
        .completion
        .push(Script::Refuse("endpoint returned 401".to_string()));
    let session = harness.session().await;

    assert_eq!(session.send("hello", None).await, TurnOutcome::Failed);

    let messages = session.messages().await;
    assert_eq!(messages.len(), 2);
    assert!(messages[1].content.contains("401"));
    assert!(matches!(
        harness.recorder.chat_events().last(),
        Some(ChatEvent::Failed { .. })
    ));
}

#[tokio::test]
async fn storage_failures_do_not_block_the_conversation() {
    let harness = Harness::new();
    harness.store.fail_writes(true);
    harness.completion.push(Script::reply(&["still here"]));
    let session = harness.session().await;

    assert_eq!(session.send("hello", None).await, TurnOutcome::Completed);
    assert_eq!(session.messages().await[1].content, "still here");
    assert!(harness.store.blob(KEY).is_none());

    session.clear().await;
    assert!(session.messages().await.is_empty());
}

#[tokio::test]
async fn fragments_arriving_after_a_clear_are_dropped() {
    let harness = Harness::new();
    let (sender, receiver) = futures::channel::mpsc::unbounded();
    harness.completion.push(Script::Live(receiver));
    let session = Arc::new(harness.session().await);

    let streaming = {
        let session = session.clone();
        tokio::spawn(async move { session.send("long question", None).await })
    };
    sender.unbounded_send(Ok("partial".to_string())).unwrap();
    while session.turn_state().await != TurnState::Streaming {
        tokio::task::yield_now().await;
    }

    session.clear().await;
    sender.unbounded_send(Ok(" late".to_string())).unwrap();
    drop(sender);

    assert_eq!(streaming.await.unwrap(), TurnOutcome::Abandoned);
    assert!(session.messages().await.is_empty());
    assert!(harness.store.blob(KEY).is_none());
}

#[tokio::test]
async fn a_clear_during_a_slow_commit_is_not_undone() {
    let harness = Harness::new();
    harness.store.delay_writes(Duration::from_millis(50));
    harness.completion.push(Script::reply(&["An ", "answer"]));
    let session = Arc::new(harness.session().await);

    let turn = {
        let session = session.clone();
        tokio::spawn(async move { session.send("question", None).await })
    };
    while harness.store.writes_started() == 0 {
        tokio::task::yield_now().await;
    }

    session.clear().await;
    assert_eq!(turn.await.unwrap(), TurnOutcome::Completed);

    assert!(harness.store.blob(KEY).is_none());
    let reloaded = harness.session().await;
    assert!(reloaded.messages().await.is_empty());
}

#[tokio::test]
async fn a_clear_right_after_completion_sticks() {
    let harness = Harness::new();
    harness.store.delay_writes(Duration::from_millis(50));
    harness.completion.push(Script::reply(&["done"]));
    let session = Arc::new(harness.session().await);

    let turn = {
        let session = session.clone();
        tokio::spawn(async move { session.send("question", None).await })
    };
    while session.turn_state().await != TurnState::Completed {
        tokio::task::yield_now().await;
    }
    session.clear().await;
    turn.await.unwrap();

    let reloaded = harness.session().await;
    assert!(reloaded.messages().await.is_empty());
}
