//! services/api/src/adapters/document_scope.rs
//!
//! A `KeyValueStore` that forwards to another store for as long as its document
//! exists. Annotation stores and chat sessions write through one of these, so a
//! session still open when its document is deleted cannot bring the blobs back.

use async_trait::async_trait;
use page_lens_core::ports::{KeyValueStore, PortError, PortResult};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

pub struct DocumentScopedStore {
    document_id: Uuid,
    inner: Arc<dyn KeyValueStore>,
    /// Writes hold the read half for their whole duration; `retire` takes the write half.
    retired: RwLock<bool>,
}

impl DocumentScopedStore {
    pub fn new(document_id: Uuid, inner: Arc<dyn KeyValueStore>) -> Self {
        Self {
            document_id,
            inner,
            retired: RwLock::new(false),
        }
    }

    /// Refuses every later write. Returns once writes already under way have landed,
    /// so whatever the caller erases afterwards stays erased.
    pub async fn retire(&self) {
        *self.retired.write().await = true;
        info!("Storage for document {} retired", self.document_id);
    }

    pub async fn is_retired(&self) -> bool {
        *self.retired.read().await
    }
}

#[async_trait]
impl KeyValueStore for DocumentScopedStore {
    async fn get(&self, key: &str) -> PortResult<Option<String>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> PortResult<()> {
        let retired = self.retired.read().await;
        if *retired {
            debug!("Refusing to write '{}' for deleted document {}", key, self.document_id);
            return Err(PortError::NotFound(format!(
                "Document {} was deleted",
                self.document_id
            )));
        }
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> PortResult<()> {
        self.inner.remove(key).await
    }
}
