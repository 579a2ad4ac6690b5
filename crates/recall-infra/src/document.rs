//! JSON file document store.
//!
//! Each document lives in one pretty-printed JSON file. Saves write a sibling
//! temporary file and rename it over the target, so a crash mid-write leaves
//! the previous version intact.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;

use recall_core::storage::document::DocumentStore;
use recall_types::error::RepositoryError;

/// [`DocumentStore`] backed by a single JSON file.
pub struct JsonFileStore<T> {
    path: PathBuf,
    write_lock: Mutex<()>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonFileStore<T> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
            _marker: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl<T> DocumentStore<T> for JsonFileStore<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    async fn load(&self) -> Result<Option<T>, RepositoryError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(RepositoryError::Query(format!(
                    "Failed to read {}: {err}",
                    self.path.display()
                )));
            }
        };
        if content.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&content).map(Some).map_err(|e| {
            RepositoryError::Corrupt(format!("{}: {e}", self.path.display()))
        })
    }

    async fn save(&self, document: &T) -> Result<(), RepositoryError> {
        let json = serde_json::to_string_pretty(document)
            .map_err(|e| RepositoryError::Query(format!("Failed to serialize document: {e}")))?;

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                RepositoryError::Query(format!("Failed to create {}: {e}", parent.display()))
            })?;
        }
        let tmp = self.temp_path();
        tokio::fs::write(&tmp, json).await.map_err(|e| {
            RepositoryError::Query(format!("Failed to write {}: {e}", tmp.display()))
        })?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| {
            RepositoryError::Query(format!("Failed to replace {}: {e}", self.path.display()))
        })?;

        tracing::debug!(path = %self.path.display(), "document saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Doc {
        name: String,
        count: u32,
    }

    #[tokio::test]
    async fn test_missing_file_loads_none() {
        let tmp = TempDir::new().unwrap();
        let store: JsonFileStore<Doc> = JsonFileStore::new(tmp.path().join("doc.json"));
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let tmp = TempDir::new().unwrap();
        let store = JsonFileStore::new(tmp.path().join("nested").join("doc.json"));
        let doc = Doc {
            name: "graph".into(),
            count: 3,
        };
        store.save(&doc).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(doc));
        assert!(!store.temp_path().exists());
    }

    #[tokio::test]
    async fn test_save_overwrites_whole_document() {
        let tmp = TempDir::new().unwrap();
        let store = JsonFileStore::new(tmp.path().join("doc.json"));
        store
            .save(&Doc {
                name: "a very long first name".into(),
                count: 1,
            })
            .await
            .unwrap();
        store
            .save(&Doc {
                name: "b".into(),
                count: 2,
            })
            .await
            .unwrap();
        assert_eq!(store.load().await.unwrap().unwrap().name, "b");
    }

    #[tokio::test]
    async fn test_corrupt_file_is_reported() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("doc.json");
        tokio::fs::write(&path, "{ not json").await.unwrap();
        let store: JsonFileStore<Doc> = JsonFileStore::new(path);
        assert!(matches!(store.load().await, Err(RepositoryError::Corrupt(_))));
    }
}
