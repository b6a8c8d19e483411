//! services/api/src/adapters/registry.rs
//!
//! This module contains the document registry adapter, the concrete implementation
//! of the `DocumentRegistry` port. The index of documents is one JSON file; each
//! document's raw bytes live beside it in `files/<id>.bin`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use page_lens_core::domain::{Document, DocumentStatus};
use page_lens_core::ports::{DocumentRegistry, PortError, PortResult};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

const INDEX_FILE: &str = "documents.json";
const FILES_DIR: &str = "files";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A document registry backed by a JSON index file.
pub struct JsonFileRegistry {
    root: PathBuf,
    /// Serializes read-modify-write cycles on the index.
    index_lock: Mutex<()>,
}

impl JsonFileRegistry {
    /// Creates a new `JsonFileRegistry` rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            index_lock: Mutex::new(()),
        }
    }

    fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }

    fn file_path(&self, document_id: Uuid) -> PathBuf {
        self.root.join(FILES_DIR).join(format!("{}.bin", document_id))
    }

    async fn read_index(&self) -> PortResult<Vec<DocumentRecord>> {
        let path = self.index_path();
        match fs::read_to_string(&path).await {
            Ok(contents) => serde_json::from_str(&contents).map_err(|e| {
                PortError::Storage(format!("document index {} is corrupt: {}", path.display(), e))
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(io_error("read", &path, e)),
        }
    }

    async fn write_index(&self, records: &[DocumentRecord]) -> PortResult<()> {
        let path = self.index_path();
        let contents = serde_json::to_string_pretty(records)
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        let temp = path.with_extension("json.tmp");
        fs::write(&temp, contents)
            .await
            .map_err(|e| io_error("write", &temp, e))?;
        fs::rename(&temp, &path)
            .await
            .map_err(|e| io_error("replace", &path, e))
    }
}

fn io_error(action: &str, path: &Path, e: std::io::Error) -> PortError {
    PortError::Storage(format!("failed to {} {}: {}", action, path.display(), e))
}

fn not_found(document_id: Uuid) -> PortError {
    PortError::NotFound(format!("Document {} not found", document_id))
}

//=========================================================================================
// "Impure" Index Record Structs
//=========================================================================================

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocumentRecord {
    id: Uuid,
    name: String,
    #[serde(default)]
    status: DocumentStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl DocumentRecord {
    fn to_domain(&self) -> Document {
        Document {
            id: self.id,
            name: self.name.clone(),
            status: self.status,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

//=========================================================================================
// `DocumentRegistry` Trait Implementation
//=========================================================================================

#[async_trait]
impl DocumentRegistry for JsonFileRegistry {
    async fn list_documents(&self) -> PortResult<Vec<Document>> {
        let records = self.read_index().await?;
        let mut documents: Vec<Document> = records.iter().map(DocumentRecord::to_domain).collect();
        documents.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(documents)
    }

    async fn create_document(&self, name: &str, raw_bytes: &[u8]) -> PortResult<Document> {
        let _guard = self.index_lock.lock().await;
        let now = Utc::now();
        let record = DocumentRecord {
            id: Uuid::new_v4(),
            name: name.to_string(),
            status: DocumentStatus::None,
            created_at: now,
            updated_at: now,
        };

        let file = self.file_path(record.id);
        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error("create", parent, e))?;
        }
        fs::write(&file, raw_bytes)
            .await
            .map_err(|e| io_error("write", &file, e))?;

        let mut records = self.read_index().await?;
        records.push(record.clone());
        self.write_index(&records).await?;
        info!("Registered document '{}' as {}", name, record.id);
        Ok(record.to_domain())
    }

    async fn get_document(&self, document_id: Uuid) -> PortResult<Document> {
        self.read_index()
            .await?
            .iter()
            .find(|r| r.id == document_id)
            .map(DocumentRecord::to_domain)
            .ok_or_else(|| not_found(document_id))
    }

    async fn document_bytes(&self, document_id: Uuid) -> PortResult<Vec<u8>> {
        self.get_document(document_id).await?;
        let file = self.file_path(document_id);
        fs::read(&file).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => not_found(document_id),
            _ => io_error("read", &file, e),
        })
    }

    async fn delete_document(&self, document_id: Uuid) -> PortResult<()> {
        let _guard = self.index_lock.lock().await;
        let mut records = self.read_index().await?;
        let before = records.len();
        records.retain(|r| r.id != document_id);
        if records.len() == before {
            return Err(not_found(document_id));
        }
        self.write_index(&records).await?;

        let file = self.file_path(document_id);
        if let Err(e) = fs::remove_file(&file).await {
            if e.kind() != ErrorKind::NotFound {
                warn!("Document {} removed from index but its file remains: {}", document_id, e);
            }
        }
        info!("Deleted document {}", document_id);
        Ok(())
    }

    async fn update_status(
        &self,
        document_id: Uuid,
        status: DocumentStatus,
    ) -> PortResult<Document> {
        let _guard = self.index_lock.lock().await;
        let mut records = self.read_index().await?;
        let record = records
            .iter_mut()
            .find(|r| r.id == document_id)
            .ok_or_else(|| not_found(document_id))?;
        record.status = status;
        record.updated_at = Utc::now();
        let updated = record.to_domain();
        self.write_index(&records).await?;
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn documents_are_registered_listed_and_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let registry = JsonFileRegistry::new(dir.path());

        let first = registry.create_document("paper.pdf", b"%PDF-1.7").await.unwrap();
        let second = registry.create_document("notes.pdf", b"%PDF-1.4").await.unwrap();
        assert_eq!(first.status, DocumentStatus::None);
        assert_eq!(registry.list_documents().await.unwrap().len(), 2);
        assert_eq!(
            registry.document_bytes(first.id).await.unwrap(),
            b"%PDF-1.7".to_vec()
        );

        registry.delete_document(first.id).await.unwrap();
        let remaining = registry.list_documents().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, second.id);
        assert!(matches!(
            registry.get_document(first.id).await,
            Err(PortError::NotFound(_))
        ));
        assert!(matches!(
            registry.delete_document(first.id).await,
            Err(PortError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn status_updates_are_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let registry = JsonFileRegistry::new(dir.path());
        let document = registry.create_document("book.pdf", b"...").await.unwrap();

        let updated = registry
            .update_status(document.id, DocumentStatus::Ongoing)
            .await
            .unwrap();
        assert_eq!(updated.status, DocumentStatus::Ongoing);
        assert!(updated.updated_at >= document.updated_at);

        let reopened = JsonFileRegistry::new(dir.path());
        assert_eq!(
            reopened.get_document(document.id).await.unwrap().status,
            DocumentStatus::Ongoing
        );
    }
}
