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

//! Resumable synchronization of contract event logs with multicall hydration.
//!
//! A [SyncCoordinator] keeps the event list of one contract in sync: it restores a persisted
//! envelope, scans only the blocks it has not resolved yet, merges and deduplicates records by
//! primary key, and refreshes the live state of non-terminal records through batched
//! [multicall] reads.

pub mod cache;
pub mod config;
pub mod coordinator;
pub mod endpoint;
pub mod errors;
pub mod fetcher;
pub mod hydrator;
pub mod multicall;
pub mod profile;
pub mod profiles;
pub mod record;
pub mod scanner;
pub mod timestamps;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use cache::{kv_store_from_uri, CacheEnvelope, CacheStore, KvStore};
pub use config::SyncConfig;
pub use coordinator::{
    MergeSummary, PageSnapshot, RefreshOutcome, SyncCoordinator, SyncError, SyncEvent, SyncState,
    SyncStatus,
};
pub use endpoint::{AlloyEndpoint, ChainEndpoint, EndpointError};
pub use fetcher::{FetchError, RateLimitedFetcher, RetryPolicy};
pub use profile::EventProfile;
pub use record::{EventRecord, ScanWindow};
