//! crates/page_lens_core/src/schema.rs
//!
//! Versioned, on-disk shapes for the two persisted collections: chat history and
//! annotations. Every blob is an envelope `{ "version": N, "records": [...] }`.
//!
//! Older blobs were bare JSON arrays (version 0) with camelCase fields and images
//! stored as data URLs; they are migrated on load. Records that cannot be read
//! (missing `rect`, unknown status, still streaming, ...) are rejected one by one
//! rather than failing the whole collection.

use crate::domain::{Annotation, AnnotationStatus, ChatMessage, ChatRole, Rect};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

pub const SCHEMA_VERSION: u32 = 1;

const DATA_URL_PREFIX: &str = "base64,";

/// Storage key of a document's annotation collection.
pub fn annotations_key(document_id: Uuid) -> String {
    format!("annotations:{}", document_id)
}

/// Storage key of a document's committed chat history.
pub fn chat_key(document_id: Uuid) -> String {
    format!("chat:{}", document_id)
}

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("blob is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported schema version {0}")]
    UnsupportedVersion(u32),
    #[error("blob is neither a versioned envelope nor a legacy array")]
    UnknownShape,
}

#[derive(Serialize)]
struct EnvelopeOut<'a, T> {
    version: u32,
    records: &'a [T],
}

#[derive(Deserialize)]
struct EnvelopeIn {
    version: u32,
    #[serde(default)]
    records: Vec<Value>,
}

//=========================================================================================
// Records
//=========================================================================================

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnnotationRecord {
    id: Uuid,
    page_number: u32,
    rect: Rect,
    status: AnnotationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    note: Option<String>,
    #[serde(default)]
    source_text: String,
    created_at: DateTime<Utc>,
    #[serde(default = "default_scale")]
    capture_scale: f64,
}

fn default_scale() -> f64 {
    1.0
}

impl AnnotationRecord {
    fn from_domain(annotation: &Annotation) -> Self {
        Self {
            id: annotation.id,
            page_number: annotation.page_number,
            rect: annotation.rect,
            status: annotation.status,
            note: annotation.note.clone(),
            source_text: annotation.source_text.clone(),
            created_at: annotation.created_at,
            capture_scale: annotation.capture_scale,
        }
    }

    fn to_domain(self) -> Annotation {
        Annotation {
            id: self.id,
            page_number: self.page_number,
            rect: self.rect,
            status: self.status,
            note: self.note,
            source_text: self.source_text,
            created_at: self.created_at,
            capture_scale: self.capture_scale,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatMessageRecord {
    role: ChatRole,
    content: String,
    /// Base64 PNG. Legacy blobs used `imageData` holding a data URL.
    #[serde(default, alias = "imageData", skip_serializing_if = "Option::is_none")]
    image: Option<String>,
    #[serde(default, skip_serializing)]
    is_streaming: bool,
}

impl ChatMessageRecord {
    fn from_domain(message: &ChatMessage) -> Self {
        Self {
            role: message.role,
            content: message.content.clone(),
            image: message.image_bytes.as_ref().map(|bytes| STANDARD.encode(bytes)),
            is_streaming: false,
        }
    }

    fn to_domain(self) -> Result<ChatMessage, String> {
        if self.is_streaming {
            return Err("message was still streaming when saved".to_string());
        }
        let image_bytes = match self.image {
            Some(encoded) => Some(decode_image(&encoded)?),
            None => None,
        };
        Ok(ChatMessage {
            role: self.role,
            content: self.content,
            image_bytes,
            is_streaming: false,
        })
    }
}

fn decode_image(encoded: &str) -> Result<Vec<u8>, String> {
    let payload = match encoded.find(DATA_URL_PREFIX) {
        Some(pos) if encoded.starts_with("data:") => &encoded[pos + DATA_URL_PREFIX.len()..],
        _ => encoded,
    };
    STANDARD
        .decode(payload)
        .map_err(|e| format!("image is not valid base64: {}", e))
}

//=========================================================================================
// Encoding / Decoding
//=========================================================================================

pub fn encode_annotations(annotations: &[Annotation]) -> Result<String, SchemaError> {
    let records: Vec<AnnotationRecord> =
        annotations.iter().map(AnnotationRecord::from_domain).collect();
    Ok(serde_json::to_string(&EnvelopeOut {
        version: SCHEMA_VERSION,
        records: &records,
    })?)
}

/// Decodes an annotation blob, dropping records that lack a `rect` or are otherwise unreadable.
pub fn decode_annotations(blob: &str) -> Result<Vec<Annotation>, SchemaError> {
    let records = decode_records::<AnnotationRecord>(blob, "annotation")?;
    Ok(records.into_iter().map(AnnotationRecord::to_domain).collect())
}

/// Encodes the committed part of a chat history. Streaming entries are never written.
pub fn encode_chat(messages: &[ChatMessage]) -> Result<String, SchemaError> {
    let records: Vec<ChatMessageRecord> = messages
        .iter()
        .filter(|m| !m.is_streaming)
        .map(ChatMessageRecord::from_domain)
        .collect();
    Ok(serde_json::to_string(&EnvelopeOut {
        version: SCHEMA_VERSION,
        records: &records,
    })?)
}

pub fn decode_chat(blob: &str) -> Result<Vec<ChatMessage>, SchemaError> {
    let records = decode_records::<ChatMessageRecord>(blob, "chat message")?;
    Ok(records
        .into_iter()
        .enumerate()
        .filter_map(|(index, record)| match record.to_domain() {
            Ok(message) => Some(message),
            Err(reason) => {
                warn!("Discarding persisted chat message #{}: {}", index, reason);
                None
            }
        })
        .collect())
}

fn decode_records<T: DeserializeOwned>(blob: &str, what: &str) -> Result<Vec<T>, SchemaError> {
    let raw: Value = serde_json::from_str(blob)?;
    let values = match raw {
        Value::Array(values) => values,
        Value::Object(_) => {
            let envelope: EnvelopeIn = serde_json::from_value(raw)?;
            if envelope.version > SCHEMA_VERSION {
                return Err(SchemaError::UnsupportedVersion(envelope.version));
            }
            envelope.records
        }
        _ => return Err(SchemaError::UnknownShape),
    };

    Ok(values
        .into_iter()
        .enumerate()
        .filter_map(|(index, value)| match serde_json::from_value::<T>(value) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Discarding persisted {} #{}: {}", what, index, e);
                None
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn annotation(page: u32) -> Annotation {
        Annotation {
            id: Uuid::new_v4(),
            page_number: page,
            rect: Rect::new(1.0, 2.0, 30.0, 40.0),
            status: AnnotationStatus::Pending,
            note: Some("check this".to_string()),
            source_text: "Region on page 1".to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            capture_scale: 1.25,
        }
    }

    #[test]
    fn annotations_survive_encoding() {
        let originals = vec![annotation(1), annotation(2)];
        let blob = encode_annotations(&originals).unwrap();
        assert!(blob.contains("\"version\":1"));
        assert_eq!(decode_annotations(&blob).unwrap(), originals);
    }

    #[test]
    fn legacy_array_without_rect_is_filtered() {
        let blob = r#"[
            {"id":"6f1c9a52-4ad4-4b8e-9a51-2d7a0a3e0c11","pageNumber":1,"status":"complete",
             "sourceText":"a","createdAt":"2024-01-01T00:00:00Z"},
            {"id":"0b6f2f35-3b64-4b59-8d5f-1e9b8b1c2d33","pageNumber":2,"status":"note",
             "rect":{"x":0,"y":0,"width":20,"height":20},"note":"hi",
             "sourceText":"b","createdAt":"2024-01-01T00:00:00Z"}
        ]"#;
        let decoded = decode_annotations(blob).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].page_number, 2);
        assert_eq!(decoded[0].capture_scale, 1.0);
        assert_eq!(decoded[0].note.as_deref(), Some("hi"));
    }

    #[test]
    fn newer_versions_are_refused() {
        let blob = r#"{"version":99,"records":[]}"#;
        assert!(matches!(
            decode_annotations(blob),
            Err(SchemaError::UnsupportedVersion(99))
        ));
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(decode_chat("not json").is_err());
        assert!(matches!(decode_chat("42"), Err(SchemaError::UnknownShape)));
    }

    #[test]
    fn chat_encoding_skips_streaming_entries_and_keeps_images() {
        let messages = vec![
            ChatMessage::user("look", Some(vec![1, 2, 3])),
            ChatMessage::assistant("done"),
            ChatMessage::placeholder(),
        ];
        let decoded = decode_chat(&encode_chat(&messages).unwrap()).unwrap();
        assert_eq!(decoded, messages[..2].to_vec());
    }

    #[test]
    fn legacy_chat_data_urls_are_migrated() {
        let blob = r#"[
            {"role":"user","content":"what is this","imageData":"data:image/png;base64,AQID"},
            {"role":"assistant","content":"half","isStreaming":true}
        ]"#;
        let decoded = decode_chat(blob).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].image_bytes, Some(vec![1, 2, 3]));
    }
}
