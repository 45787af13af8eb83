// Copyright 2026 Boundless Foundation, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! File-based key-value store.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{CacheError, KvStore};

#[derive(thiserror::Error, Debug)]
pub enum FileKvStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Stores each value as a JSON file named after its key. Keys containing `/` map to
/// subdirectories, which are created on demand.
#[derive(Clone, Debug)]
pub struct FileKvStore {
    base_path: PathBuf,
}

impl FileKvStore {
    pub fn new(path: &str) -> Self {
        Self { base_path: PathBuf::from(path) }
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.base_path.join(format!("{key}.json"))
    }

    /// Ensure the directory for a cache file exists.
    async fn ensure_dir(&self, path: &Path) -> Result<(), FileKvStoreError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl KvStore for FileKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let path = self.entry_path(key);
        match tokio::fs::read_to_string(&path).await {
            Ok(data) => Ok(Some(data)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(FileKvStoreError::from(err).into()),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let path = self.entry_path(key);
        self.ensure_dir(&path).await?;

        // Readers never observe a partially written file.
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, value).await.map_err(FileKvStoreError::from)?;
        tokio::fs::rename(&tmp, &path).await.map_err(FileKvStoreError::from)?;

        tracing::debug!("Wrote {} bytes to {}", value.len(), path.display());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        match tokio::fs::remove_file(self.entry_path(key)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(FileKvStoreError::from(err).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn set_get_remove() {
        let dir = tempdir().unwrap();
        let store = FileKvStore::new(dir.path().to_str().unwrap());

        assert_eq!(store.get("event-sync/v1/1/key").await.unwrap(), None);
        store.set("event-sync/v1/1/key", "{\"a\":1}").await.unwrap();
        assert_eq!(
            store.get("event-sync/v1/1/key").await.unwrap().as_deref(),
            Some("{\"a\":1}")
        );
        assert!(dir.path().join("event-sync/v1/1/key.json").exists());

        store.set("event-sync/v1/1/key", "{}").await.unwrap();
        assert_eq!(store.get("event-sync/v1/1/key").await.unwrap().as_deref(), Some("{}"));

        store.remove("event-sync/v1/1/key").await.unwrap();
        assert_eq!(store.get("event-sync/v1/1/key").await.unwrap(), None);
        // Removing a missing key is not an error.
        store.remove("event-sync/v1/1/key").await.unwrap();
    }
}
