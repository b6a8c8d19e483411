//! services/api/src/adapters/file_store.rs
//!
//! A `KeyValueStore` that keeps every key in its own JSON file under one directory.
//! Writes go to a temporary sibling first and are renamed into place, so a crash
//! mid-write leaves the previous blob intact.

use async_trait::async_trait;
use page_lens_core::ports::{KeyValueStore, PortError, PortResult};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

#[derive(Clone, Debug)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a key onto a file name; anything outside `[A-Za-z0-9_-]` becomes `_`.
    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.root.join(format!("{}.json", name))
    }
}

fn storage_error(action: &str, path: &Path, e: std::io::Error) -> PortError {
    PortError::Storage(format!("failed to {} {}: {}", action, path.display(), e))
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> PortResult<Option<String>> {
        let path = self.path_for(key);
        match fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(storage_error("read", &path, e)),
        }
    }

    async fn set(&self, key: &str, value: &str) -> PortResult<()> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| storage_error("create", &self.root, e))?;

        let path = self.path_for(key);
        let temp = path.with_extension("json.tmp");
        fs::write(&temp, value)
            .await
            .map_err(|e| storage_error("write", &temp, e))?;
        fs::rename(&temp, &path)
            .await
            .map_err(|e| storage_error("replace", &path, e))?;
        debug!("Wrote {} bytes to {}", value.len(), path.display());
        Ok(())
    }

    async fn remove(&self, key: &str) -> PortResult<()> {
        let path = self.path_for(key);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(storage_error("remove", &path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn values_round_trip_and_are_replaced_wholesale() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("blobs"));

        assert_eq!(store.get("chat:abc").await.unwrap(), None);
        store.set("chat:abc", "[1,2,3]").await.unwrap();
        store.set("chat:abc", "[4]").await.unwrap();
        assert_eq!(store.get("chat:abc").await.unwrap().as_deref(), Some("[4]"));
    }

    #[tokio::test]
    async fn keys_do_not_escape_the_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        store.set("../outside", "x").await.unwrap();
        assert!(dir.path().join("___outside.json").exists());
    }

    #[tokio::test]
    async fn removing_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        store.set("annotations:1", "{}").await.unwrap();
        store.remove("annotations:1").await.unwrap();
        store.remove("annotations:1").await.unwrap();
        assert_eq!(store.get("annotations:1").await.unwrap(), None);
    }
}
