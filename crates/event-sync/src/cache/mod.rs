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

//! Persisted event envelopes on top of a best-effort key-value store.

use std::sync::Arc;

use alloy::primitives::{Address, B256};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

use crate::record::{dedup_by_key, EventRecord};

mod file;
mod memory;
mod sqlite;

pub use file::{FileKvStore, FileKvStoreError};
pub use memory::MemoryKvStore;
pub use sqlite::{SqliteKvStore, SqliteKvStoreError};

/// Version of the persisted envelope layout. Envelopes written with another version are ignored.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    #[error("File cache error: {0}")]
    File(#[from] FileKvStoreError),

    #[error("Sqlite cache error: {0}")]
    Sqlite(#[from] SqliteKvStoreError),

    #[error("Invalid cache URI: {0}")]
    InvalidUri(String),

    #[error("Unsupported cache URI scheme: {0}")]
    UnsupportedScheme(String),
}

/// String key-value store backing the cache.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), CacheError>;

    async fn remove(&self, key: &str) -> Result<(), CacheError>;
}

/// Create a key-value store from a URI.
///
/// Supported URI schemes:
/// - `memory://` - Process-local map
/// - `file:///path/to/cache` - One JSON file per key
/// - `sqlite:path/to/cache.db` - Single table in a sqlite database
pub async fn kv_store_from_uri(uri: &str) -> Result<Arc<dyn KvStore>, CacheError> {
    let url = uri
        .parse::<url::Url>()
        .map_err(|e| CacheError::InvalidUri(format!("Failed to parse URI '{uri}': {e}")))?;

    match url.scheme() {
        "memory" => Ok(Arc::new(MemoryKvStore::default())),
        "file" => Ok(Arc::new(FileKvStore::new(url.path()))),
        "sqlite" => Ok(Arc::new(SqliteKvStore::new(uri).await?)),
        scheme => Err(CacheError::UnsupportedScheme(scheme.to_string())),
    }
}

/// Generate the cache key for one contract event stream.
pub fn generate_cache_key(chain_id: u64, contract: Address, event_signature: B256) -> String {
    let mut hasher = Sha256::new();
    hasher.update(SCHEMA_VERSION.to_be_bytes());
    hasher.update(contract.as_slice());
    hasher.update(event_signature.as_slice());
    let hash = hex::encode(hasher.finalize());

    format!("event-sync/v{SCHEMA_VERSION}/{chain_id}/{contract:#x}_{}", &hash[..16])
}

/// Identity an envelope must match to be usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheContext {
    pub chain_id: u64,
    pub contract: Address,
    pub deployment_block: u64,
}

/// Persisted snapshot of a synchronized event list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEnvelope {
    pub schema_version: u32,
    pub chain_id: u64,
    pub contract_address: Address,
    pub deployment_block: u64,
    /// Highest block fully scanned.
    pub watermark_block: u64,
    /// Highest block below which every record is terminal.
    pub resolved_through_block: u64,
    pub cached_at: DateTime<Utc>,
    /// Set once older events have been dropped to respect the item cap.
    #[serde(default)]
    pub truncated: bool,
    pub events: Vec<EventRecord>,
}

impl CacheEnvelope {
    pub fn new(
        context: &CacheContext,
        events: Vec<EventRecord>,
        watermark_block: u64,
        resolved_through_block: u64,
        truncated: bool,
    ) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            chain_id: context.chain_id,
            contract_address: context.contract,
            deployment_block: context.deployment_block,
            watermark_block,
            resolved_through_block,
            cached_at: Utc::now(),
            truncated,
            events,
        }
    }

    /// Checks the envelope identity against `context`, returning the reason for a mismatch.
    fn validate(&self, context: &CacheContext) -> Result<(), String> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(format!("schema version {} != {SCHEMA_VERSION}", self.schema_version));
        }
        if self.chain_id != context.chain_id {
            return Err(format!("chain id {} != {}", self.chain_id, context.chain_id));
        }
        if self.contract_address != context.contract {
            return Err(format!("contract {} != {}", self.contract_address, context.contract));
        }
        if self.deployment_block != context.deployment_block {
            return Err(format!(
                "deployment block {} != {}",
                self.deployment_block, context.deployment_block
            ));
        }
        if self.resolved_through_block > self.watermark_block {
            return Err(format!(
                "resolved-through block {} above watermark {}",
                self.resolved_through_block, self.watermark_block
            ));
        }
        Ok(())
    }
}

/// Keeps the `max_items` newest records of a newest-first list.
///
/// Returns the retained records and whether anything was dropped.
pub fn retain_newest(mut records: Vec<EventRecord>, max_items: usize) -> (Vec<EventRecord>, bool) {
    if records.len() <= max_items {
        return (records, false);
    }
    records.truncate(max_items);
    (records, true)
}

/// Reads and writes the envelope of one (chain, contract, event) stream.
///
/// Every failure is absorbed: a read that fails or does not validate behaves like an empty cache,
/// and a failed write only logs a warning.
#[derive(Clone)]
pub struct CacheStore {
    store: Arc<dyn KvStore>,
    key: String,
    context: CacheContext,
    max_items: usize,
}

impl CacheStore {
    pub fn new(
        store: Arc<dyn KvStore>,
        key: String,
        context: CacheContext,
        max_items: usize,
    ) -> Self {
        Self { store, key, context, max_items }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn context(&self) -> &CacheContext {
        &self.context
    }

    pub fn max_items(&self) -> usize {
        self.max_items
    }

    /// Returns the stored envelope if present and valid for the current context.
    pub async fn read(&self) -> Option<CacheEnvelope> {
        let raw = match self.store.get(&self.key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                tracing::debug!("No cached envelope under {}", self.key);
                return None;
            }
            Err(err) => {
                tracing::warn!("Failed to read cache {}: {err}", self.key);
                return None;
            }
        };

        let mut envelope: CacheEnvelope = match serde_json::from_str(&raw) {
            Ok(envelope) => envelope,
            Err(err) => {
                tracing::warn!("Discarding unparsable cache {}: {err}", self.key);
                return None;
            }
        };

        if let Err(reason) = envelope.validate(&self.context) {
            tracing::info!("Discarding cache {}: {reason}", self.key);
            return None;
        }

        let count = envelope.events.len();
        envelope.events = dedup_by_key(std::mem::take(&mut envelope.events));
        if envelope.events.len() != count {
            tracing::warn!(
                "Cache {} held {} duplicate records, keeping the latest of each",
                self.key,
                count - envelope.events.len()
            );
        }

        tracing::debug!(
            "Restored {} records from cache {} (watermark {}, resolved through {})",
            envelope.events.len(),
            self.key,
            envelope.watermark_block,
            envelope.resolved_through_block
        );
        Some(envelope)
    }

    /// Persists `envelope`, dropping the oldest records beyond the item cap.
    pub async fn write(&self, mut envelope: CacheEnvelope) {
        let (events, dropped) = retain_newest(std::mem::take(&mut envelope.events), self.max_items);
        envelope.events = events;
        envelope.truncated |= dropped;

        let data = match serde_json::to_string(&envelope) {
            Ok(data) => data,
            Err(err) => {
                tracing::warn!("Failed to serialize cache {}: {err}", self.key);
                return;
            }
        };
        match self.store.set(&self.key, &data).await {
            Ok(()) => tracing::debug!(
                "Cached {} records to {} (watermark {})",
                envelope.events.len(),
                self.key,
                envelope.watermark_block
            ),
            Err(err) => tracing::warn!("Failed to write cache {}: {err}", self.key),
        }
    }

    pub async fn clear(&self) {
        if let Err(err) = self.store.remove(&self.key).await {
            tracing::warn!("Failed to clear cache {}: {err}", self.key);
        }
    }
}
