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

//! Sqlite-backed key-value store.

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Row, SqlitePool,
};

use super::{CacheError, KvStore};

#[derive(thiserror::Error, Debug)]
pub enum SqliteKvStoreError {
    #[error("SQL error {0:?}")]
    SqlErr(#[from] sqlx::Error),
}

/// Stores entries in a single `kv_cache` table.
#[derive(Debug, Clone)]
pub struct SqliteKvStore {
    pool: SqlitePool,
}

impl SqliteKvStore {
    /// For a file use a `sqlite:file_path` URL; `sqlite::memory:` keeps the table in memory.
    pub async fn new(conn_str: &str) -> Result<Self, SqliteKvStoreError> {
        let opts = SqliteConnectOptions::from_str(conn_str)?.create_if_missing(true);

        // Every connection to an in-memory database sees its own empty database.
        let max_connections = if conn_str.contains(":memory:") { 1 } else { 4 };
        let pool =
            SqlitePoolOptions::new().max_connections(max_connections).connect_with(opts).await?;

        sqlx::query("CREATE TABLE IF NOT EXISTS kv_cache (key TEXT PRIMARY KEY, value TEXT NOT NULL)")
            .execute(&pool)
            .await?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl KvStore for SqliteKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let row = sqlx::query("SELECT value FROM kv_cache WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(SqliteKvStoreError::from)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let value: String = row.try_get("value").map_err(SqliteKvStoreError::from)?;
        Ok(Some(value))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        sqlx::query(
            "INSERT INTO kv_cache (key, value) VALUES ($1, $2)
         ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(SqliteKvStoreError::from)?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        sqlx::query("DELETE FROM kv_cache WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(SqliteKvStoreError::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn in_memory_roundtrip() {
        let store = SqliteKvStore::new("sqlite::memory:").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
        store.set("k", "v1").await.unwrap();
        store.set("k", "v2").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v2"));
        store.remove("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn survives_reopen() {
        let temp_file = NamedTempFile::new().unwrap();
        let db_url = format!("sqlite:{}", temp_file.path().display());

        let store = SqliteKvStore::new(&db_url).await.unwrap();
        store.set("event-sync/v1/1/key", "{}").await.unwrap();
        drop(store);

        let reopened = SqliteKvStore::new(&db_url).await.unwrap();
        assert_eq!(reopened.get("event-sync/v1/1/key").await.unwrap().as_deref(), Some("{}"));
    }
}
