//! services/api/src/adapters/completion.rs
//!
//! This module contains the adapter for the remote completion endpoint.
//! It implements the `CompletionService` port from the `core` crate against any
//! OpenAI-compatible `chat/completions` endpoint that streams server-sent events.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use futures::{Stream, StreamExt};
use page_lens_core::domain::{ChatMessage, ChatRole};
use page_lens_core::ports::{CompletionService, PortError, PortResult, TokenStream};
use reqwest::header::ACCEPT;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const DONE_SENTINEL: &str = "[DONE]";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `CompletionService` over HTTP + server-sent events.
#[derive(Clone)]
pub struct OpenAiCompatibleCompletion {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    max_tokens: u32,
}

impl OpenAiCompatibleCompletion {
    /// Creates a new `OpenAiCompatibleCompletion`.
    pub fn new(
        client: Client,
        endpoint: String,
        model: String,
        api_key: Option<String>,
        max_tokens: u32,
    ) -> Self {
        Self {
            client,
            endpoint,
            model,
            api_key,
            max_tokens,
        }
    }
}

//=========================================================================================
// Wire Format
//=========================================================================================

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Serialize)]
pub struct WireMessage {
    role: ChatRole,
    content: WireContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum WireContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

/// Messages with an image become a text + inline image pair; the rest stay plain text.
pub fn encode_message(message: &ChatMessage) -> WireMessage {
    let content = match &message.image_bytes {
        Some(bytes) => WireContent::Parts(vec![
            ContentPart::Text {
                text: message.content.clone(),
            },
            ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: format!("data:image/png;base64,{}", STANDARD.encode(bytes)),
                },
            },
        ]),
        None => WireContent::Text(message.content.clone()),
    };
    WireMessage {
        role: message.role,
        content,
    }
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<StreamDelta>,
}

#[derive(Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

//=========================================================================================
// Server-Sent Events
//=========================================================================================

#[derive(Debug, PartialEq, Eq)]
pub enum SseEvent {
    Delta(String),
    Done,
}

/// Interprets one event payload. `None` means the event carries nothing usable and is skipped.
pub fn parse_event_data(data: &str) -> Option<SseEvent> {
    let trimmed = data.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed == DONE_SENTINEL {
        return Some(SseEvent::Done);
    }

    match serde_json::from_str::<StreamChunk>(trimmed) {
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta)
            .and_then(|delta| delta.content)
            .filter(|piece| !piece.is_empty())
            .map(SseEvent::Delta),
        Err(e) => {
            debug!("Skipping malformed stream event: {}", e);
            None
        }
    }
}

/// Splits a byte stream into event payloads.
///
/// Bytes are buffered until a full line is available, so multi-byte characters split
/// across network reads survive intact.
#[derive(Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data: Option<String>,
}

impl SseDecoder {
    /// Feeds raw bytes, returning the payloads of every event they complete.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if let Some(data) = self.data.take() {
                    events.push(data);
                }
                continue;
            }
            if let Some(rest) = line.strip_prefix("data:") {
                let fragment = rest.strip_prefix(' ').unwrap_or(rest);
                match &mut self.data {
                    Some(existing) => {
                        existing.push('\n');
                        existing.push_str(fragment);
                    }
                    None => self.data = Some(fragment.to_string()),
                }
            }
            // Comments (":") and other fields (event:, id:, retry:) carry no text.
        }
        events
    }

    /// Flushes an event left open when the connection closed without a trailing blank line.
    pub fn finish(&mut self) -> Option<String> {
        if !self.buffer.is_empty() {
            let mut rest = std::mem::take(&mut self.buffer);
            rest.push(b'\n');
            let mut events = self.feed(&rest);
            if let Some(event) = events.pop() {
                return Some(event);
            }
        }
        self.data.take()
    }
}

/// Turns a raw response body stream into text fragments.
///
/// Malformed events are skipped; a read error ends the stream with `PortError::Transport`.
pub fn sse_fragments<S, B, E>(body: S) -> impl Stream<Item = PortResult<String>> + Send
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: std::fmt::Display + Send,
{
    async_stream::try_stream! {
        let mut body = Box::pin(body);
        let mut decoder = SseDecoder::default();
        let mut finished = false;

        while !finished {
            let Some(chunk) = body.next().await else {
                break;
            };
            let chunk = chunk
                .map_err(|e| PortError::Transport(format!("stream read failed: {}", e)))?;
            for data in decoder.feed(chunk.as_ref()) {
                match parse_event_data(&data) {
                    Some(SseEvent::Delta(text)) => yield text,
                    Some(SseEvent::Done) => {
                        finished = true;
                        break;
                    }
                    None => {}
                }
            }
        }

        if !finished {
            if let Some(SseEvent::Delta(text)) = decoder.finish().as_deref().and_then(parse_event_data) {
                yield text;
            }
        }
    }
}

//=========================================================================================
// `CompletionService` Trait Implementation
//=========================================================================================

#[async_trait]
impl CompletionService for OpenAiCompatibleCompletion {
    /// Posts the conversation with `stream: true` and yields `choices[0].delta.content`s.
    async fn stream_completion(&self, messages: &[ChatMessage]) -> PortResult<TokenStream> {
        let body = CompletionRequest {
            model: &self.model,
            messages: messages.iter().map(encode_message).collect(),
            max_tokens: self.max_tokens,
            stream: true,
        };

        let mut request = self
            .client
            .post(&self.endpoint)
            .header(ACCEPT, "text/event-stream")
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PortError::Transport(format!("request failed: {}", e)))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PortError::Transport(format!(
                "completion endpoint returned {}: {}",
                status,
                body.trim()
            )));
        }
        info!(
            "Streaming completion from {} with {} message(s)",
            self.endpoint,
            messages.len()
        );

        Ok(Box::pin(sse_fragments(response.bytes_stream())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[test]
    fn plain_messages_are_strings() {
        let json = serde_json::to_value(encode_message(&ChatMessage::user("hi", None))).unwrap();
        assert_eq!(json, serde_json::json!({"role": "user", "content": "hi"}));
    }

    #[test]
    fn image_messages_are_two_part_blocks() {
        let message = ChatMessage::user("what is this", Some(vec![1, 2, 3]));
        let json = serde_json::to_value(encode_message(&message)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "role": "user",
                "content": [
                    {"type": "text", "text": "what is this"},
                    {"type": "image_url", "image_url": {"url": "data:image/png;base64,AQID"}}
                ]
            })
        );
    }

    #[test]
    fn parses_deltas_and_the_sentinel() {
        assert_eq!(
            parse_event_data(r#"{"choices":[{"delta":{"content":"hello"}}]}"#),
            Some(SseEvent::Delta("hello".to_string()))
        );
        assert_eq!(parse_event_data(" [DONE] "), Some(SseEvent::Done));
        assert_eq!(parse_event_data(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#), None);
        assert_eq!(parse_event_data(r#"{"choices":[]}"#), None);
        assert_eq!(parse_event_data("{not json"), None);
        assert_eq!(parse_event_data(""), None);
    }

    #[test]
    fn decoder_handles_split_lines_and_crlf() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.feed(b"data: {\"a\"").is_empty());
        assert!(decoder.feed(b":1}\r\n").is_empty());
        assert_eq!(decoder.feed(b"\r\n: keep-alive\n\ndata: [DONE]\n\n"), vec![
            "{\"a\":1}".to_string(),
            "[DONE]".to_string()
        ]);
    }

    #[test]
    fn decoder_keeps_multibyte_characters_split_across_reads() {
        let event = "data: {\"choices\":[{\"delta\":{\"content\":\"∫ dx\"}}]}\n\n".as_bytes();
        let split = event.iter().position(|b| *b == 0xE2).unwrap() + 1;
        let mut decoder = SseDecoder::default();
        assert!(decoder.feed(&event[..split]).is_empty());
        let events = decoder.feed(&event[split..]);
        assert_eq!(
            parse_event_data(&events[0]),
            Some(SseEvent::Delta("∫ dx".to_string()))
        );
    }

    #[test]
    fn decoder_flushes_an_unterminated_event() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.feed(b"data: tail").is_empty());
        assert_eq!(decoder.finish(), Some("tail".to_string()));
        assert_eq!(decoder.finish(), None);
    }

    fn delta(text: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({"choices": [{"delta": {"content": text}}]})
        )
    }

    #[tokio::test]
    async fn fragments_skip_malformed_events_and_stop_at_done() {
        let body = format!(
            "{}data: {{broken\n\n{}{}data: [DONE]\n\n{}",
            delta("Hel"),
            delta("lo "),
            delta("world"),
            delta("ignored")
        );
        let chunks: Vec<Result<Vec<u8>, std::io::Error>> = body
            .as_bytes()
            .chunks(7)
            .map(|c| Ok(c.to_vec()))
            .collect();

        let fragments: Vec<String> = sse_fragments(stream::iter(chunks))
            .map(|item| item.unwrap())
            .collect()
            .await;
        assert_eq!(fragments, vec!["Hel", "lo ", "world"]);
    }

    #[tokio::test]
    async fn read_errors_end_the_stream_as_transport_failures() {
        let chunks: Vec<Result<Vec<u8>, std::io::Error>> = vec![
            Ok(delta("partial").into_bytes()),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
        ];

        let items: Vec<PortResult<String>> = sse_fragments(stream::iter(chunks)).collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "partial");
        assert!(matches!(&items[1], Err(PortError::Transport(msg)) if msg.contains("reset")));
    }
}
