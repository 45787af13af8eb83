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

//! Orchestrates cache restore, scanning, merging and hydration for one contract event stream.

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use alloy::primitives::Address;
use thiserror::Error;
use tokio::{
    sync::{broadcast, Mutex, RwLock},
    task::JoinHandle,
};

use crate::{
    cache::{generate_cache_key, retain_newest, CacheContext, CacheEnvelope, CacheStore, KvStore},
    config::SyncConfig,
    endpoint::ChainEndpoint,
    errors::{impl_coded_debug, CodedError},
    fetcher::{FetchError, RateLimitedFetcher},
    hydrator::{DetailHydrator, HydrationReport},
    multicall::MulticallAggregator,
    profile::EventProfile,
    record::{compute_resolved_through, merge_records, EventRecord, ScanWindow},
    scanner::{EventScanner, ScanError},
    timestamps::prefetch_timestamps,
};

const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Error)]
pub enum SyncError {
    #[error("{code} Scan failed: {0}", code = self.code())]
    ScanFailed(#[from] ScanError),

    #[error("{code} Failed to query chain id: {0}", code = self.code())]
    ChainId(FetchError),
}

impl_coded_debug!(SyncError);

impl CodedError for SyncError {
    fn code(&self) -> &str {
        match self {
            SyncError::ScanFailed(_) => "[ES-SYNC-301]",
            SyncError::ChainId(_) => "[ES-SYNC-302]",
        }
    }
}

/// Lifecycle of the synchronized list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Empty,
    Restoring,
    /// Cached records are exposed while newer blocks are fetched in the background.
    PartiallyLoaded,
    Scanning,
    Ready,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Status reported to the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    Loading,
    Ready,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    StateChanged(SyncState),
    Merged { added: Vec<String>, updated: usize, total: usize, watermark_block: u64 },
    Error(String),
}

/// Result of a completed sync pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub from_block: u64,
    pub to_block: u64,
    pub added: usize,
    pub updated: usize,
    pub total: usize,
    pub watermark_block: u64,
    pub resolved_through_block: u64,
    pub hydration: HydrationReport,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Completed(MergeSummary),
    /// Another pass was already in flight.
    Skipped,
}

/// What the presentation layer renders.
#[derive(Debug, Clone, PartialEq)]
pub struct PageSnapshot {
    /// Records on the displayed pages, newest first.
    pub records: Vec<EventRecord>,
    /// Records held back until the next [SyncCoordinator::load_more].
    pub pending: usize,
    pub status: SyncStatus,
    pub state: SyncState,
    pub watermark_block: u64,
    pub resolved_through_block: u64,
    pub truncated: bool,
    pub last_error: Option<String>,
}

struct ListState {
    sync_state: SyncState,
    status: SyncStatus,
    records: Vec<EventRecord>,
    visible: usize,
    watermark_block: u64,
    resolved_through_block: u64,
    truncated: bool,
    last_error: Option<String>,
    /// Bumped by a cache clear so an in-flight pass drops its results.
    epoch: u64,
}

impl ListState {
    fn new() -> Self {
        Self {
            sync_state: SyncState::Empty,
            status: SyncStatus::Loading,
            records: Vec::new(),
            visible: 0,
            watermark_block: 0,
            resolved_through_block: 0,
            truncated: false,
            last_error: None,
            epoch: 0,
        }
    }

    fn snapshot(&self) -> PageSnapshot {
        let visible = self.visible.min(self.records.len());
        PageSnapshot {
            records: self.records[..visible].to_vec(),
            pending: self.records.len() - visible,
            status: self.status,
            state: self.sync_state,
            watermark_block: self.watermark_block,
            resolved_through_block: self.resolved_through_block,
            truncated: self.truncated,
            last_error: self.last_error.clone(),
        }
    }
}

/// Single-flight guard. The flag is released when the guard is dropped.
struct InFlight(Arc<AtomicBool>);

impl InFlight {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag.clone()))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct Inner<E: ?Sized> {
    profile: Arc<dyn EventProfile>,
    fetcher: RateLimitedFetcher<E>,
    scanner: EventScanner<E>,
    hydrator: DetailHydrator<E>,
    cache: CacheStore,
    deployment_block: u64,
    reorg_buffer: u64,
    page_size: usize,
    timestamp_concurrency: usize,
    state: RwLock<ListState>,
    /// Serializes cache writes with cache clears. Storage I/O runs under this lock, never under
    /// `state`.
    persist: Mutex<()>,
    in_flight: Arc<AtomicBool>,
    events: broadcast::Sender<SyncEvent>,
    background: Mutex<Option<JoinHandle<()>>>,
}

/// Keeps the event list of one (chain, contract) pair in sync.
///
/// All clones share the same state. At most one sync pass runs at a time; triggers arriving while
/// one is in flight are dropped.
pub struct SyncCoordinator<E: ?Sized = dyn ChainEndpoint> {
    inner: Arc<Inner<E>>,
}

impl<E: ?Sized> Clone for SyncCoordinator<E> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<E> SyncCoordinator<E>
where
    E: ChainEndpoint + ?Sized + 'static,
{
    /// Builds a coordinator for `contract` on the chain behind `endpoint`.
    ///
    /// Queries the chain id and probes the multicall aggregator once up front.
    pub async fn connect(
        endpoint: Arc<E>,
        profile: Arc<dyn EventProfile>,
        contract: Address,
        deployment_block: u64,
        store: Arc<dyn KvStore>,
        config: &SyncConfig,
    ) -> Result<Self, SyncError> {
        let fetcher = RateLimitedFetcher::new(endpoint, config.retry_policy());
        let chain_id = fetcher.chain_id().await.map_err(SyncError::ChainId)?;

        let aggregator =
            MulticallAggregator::initialize(fetcher.clone(), chain_id, config.hydration.batch_size)
                .await;
        let context = CacheContext { chain_id, contract, deployment_block };
        let key = generate_cache_key(chain_id, contract, profile.event_signature());
        let cache = CacheStore::new(store, key, context, config.cache.max_items);

        tracing::info!(
            "Syncing {} events of {contract} on chain {chain_id} from block {deployment_block} (multicall {})",
            profile.name(),
            if aggregator.is_ready() { "enabled" } else { "unavailable" }
        );
        Ok(Self::from_parts(profile, fetcher, aggregator, cache, config))
    }

    /// Assembles a coordinator from already constructed components.
    pub fn from_parts(
        profile: Arc<dyn EventProfile>,
        fetcher: RateLimitedFetcher<E>,
        aggregator: MulticallAggregator<E>,
        cache: CacheStore,
        config: &SyncConfig,
    ) -> Self {
        let context = *cache.context();
        let scanner = EventScanner::new(
            fetcher.clone(),
            context.contract,
            config.scan.chunk_size,
            config.scan.chunk_pause(),
        );
        let hydrator = DetailHydrator::new(aggregator, context.contract);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            inner: Arc::new(Inner {
                profile,
                fetcher,
                scanner,
                hydrator,
                cache,
                deployment_block: context.deployment_block,
                reorg_buffer: config.scan.reorg_buffer,
                page_size: config.page.page_size.max(1),
                timestamp_concurrency: config.hydration.timestamp_concurrency,
                state: RwLock::new(ListState::new()),
                persist: Mutex::new(()),
                in_flight: Arc::new(AtomicBool::new(false)),
                events,
                background: Mutex::new(None),
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.events.subscribe()
    }

    pub async fn snapshot(&self) -> PageSnapshot {
        self.inner.state.read().await.snapshot()
    }

    /// True while a sync pass is running.
    pub fn is_syncing(&self) -> bool {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    /// First load of the list.
    ///
    /// A valid cached envelope is exposed immediately and a top-up from
    /// `max(resolved_through - reorg_buffer, deployment_block)` is spawned in the background.
    /// Without one, a full scan from the deployment block runs before returning. Once the list
    /// has been loaded this only returns the current snapshot.
    pub async fn request_page(&self) -> Result<PageSnapshot, SyncError> {
        if self.inner.state.read().await.sync_state != SyncState::Empty {
            return Ok(self.snapshot().await);
        }
        let Some(guard) = InFlight::acquire(&self.inner.in_flight) else {
            tracing::debug!("First load already in flight");
            return Ok(self.snapshot().await);
        };

        self.inner.set_state(SyncState::Restoring).await;
        match self.inner.cache.read().await {
            Some(envelope) => {
                let from_block = self.inner.resume_block(envelope.resolved_through_block);
                {
                    let mut state = self.inner.state.write().await;
                    state.visible = self.inner.page_size.min(envelope.events.len());
                    state.records = envelope.events;
                    state.watermark_block = envelope.watermark_block;
                    state.resolved_through_block = envelope.resolved_through_block;
                    state.truncated = envelope.truncated;
                    state.status = SyncStatus::Loading;
                }
                self.inner.set_state(SyncState::PartiallyLoaded).await;
                tracing::info!(
                    "Restored {} cached {} records, topping up from block {from_block}",
                    self.inner.state.read().await.records.len(),
                    self.inner.profile.name()
                );

                let inner = self.inner.clone();
                let handle = tokio::spawn(async move {
                    let _guard = guard;
                    inner.set_state(SyncState::Scanning).await;
                    if let Err(err) = inner.sync_pass(from_block, SyncState::PartiallyLoaded).await {
                        tracing::warn!("Background top-up failed: {err}");
                    }
                });
                *self.inner.background.lock().await = Some(handle);
                Ok(self.snapshot().await)
            }
            None => {
                self.inner.set_state(SyncState::Scanning).await;
                let res = self.inner.sync_pass(self.inner.deployment_block, SyncState::Empty).await;
                drop(guard);
                res?;
                Ok(self.snapshot().await)
            }
        }
    }

    /// Scans blocks added since the last pass and merges them in.
    ///
    /// Returns [RefreshOutcome::Skipped] without doing anything if a pass is already in flight.
    pub async fn request_refresh(&self) -> Result<RefreshOutcome, SyncError> {
        let Some(_guard) = InFlight::acquire(&self.inner.in_flight) else {
            tracing::debug!("Refresh requested while a pass is in flight, skipping");
            return Ok(RefreshOutcome::Skipped);
        };

        let (from_block, fallback) = {
            let state = self.inner.state.read().await;
            match state.sync_state {
                SyncState::Empty => (self.inner.deployment_block, SyncState::Empty),
                current => (self.inner.resume_block(state.resolved_through_block), current),
            }
        };
        self.inner.set_state(SyncState::Scanning).await;
        let summary = self.inner.sync_pass(from_block, fallback).await?;
        Ok(RefreshOutcome::Completed(summary))
    }

    /// Exposes the next page of already loaded records. Never triggers a scan.
    pub async fn load_more(&self) -> PageSnapshot {
        let mut state = self.inner.state.write().await;
        state.visible = (state.visible + self.inner.page_size).min(state.records.len());
        state.snapshot()
    }

    /// Removes the persisted envelope and resets the in-memory list.
    ///
    /// A pass still in flight completes but its results are discarded.
    pub async fn clear_cache(&self) {
        {
            let _persist = self.inner.persist.lock().await;
            {
                let mut state = self.inner.state.write().await;
                let epoch = state.epoch + 1;
                *state = ListState::new();
                state.epoch = epoch;
            }
            self.inner.cache.clear().await;
        }
        tracing::info!("Cleared {} cache {}", self.inner.profile.name(), self.inner.cache.key());
        self.inner.emit(SyncEvent::StateChanged(SyncState::Empty));
    }

    /// Waits for the background top-up spawned by the first load, if any.
    pub async fn wait_for_background(&self) {
        let handle = self.inner.background.lock().await.take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                tracing::error!("Background top-up task panicked: {err}");
            }
        }
    }
}

impl<E> Inner<E>
where
    E: ChainEndpoint + ?Sized + 'static,
{
    fn emit(&self, event: SyncEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    async fn set_state(&self, sync_state: SyncState) {
        self.state.write().await.sync_state = sync_state;
        tracing::debug!("{} sync state: {sync_state}", self.profile.name());
        self.emit(SyncEvent::StateChanged(sync_state));
    }

    fn resume_block(&self, resolved_through_block: u64) -> u64 {
        resolved_through_block.saturating_sub(self.reorg_buffer).max(self.deployment_block)
    }

    /// One scan, merge, hydrate and persist sequence. Callers hold the in-flight guard.
    ///
    /// On failure nothing is persisted, the watermark stays put and the list reverts to
    /// `fallback` with an error status.
    async fn sync_pass(
        &self,
        from_block: u64,
        fallback: SyncState,
    ) -> Result<MergeSummary, SyncError> {
        let epoch = {
            let mut state = self.state.write().await;
            state.status = SyncStatus::Loading;
            state.epoch
        };

        let output = match self.scanner.scan(ScanWindow::to_latest(from_block), &*self.profile).await
        {
            Ok(output) => output,
            Err(err) => {
                tracing::error!("{} scan from block {from_block} failed: {err}", self.profile.name());
                let current = {
                    let mut state = self.state.write().await;
                    let current = state.epoch == epoch;
                    if current {
                        state.status = SyncStatus::Error;
                        state.last_error = Some(err.to_string());
                        state.sync_state = fallback;
                    }
                    current
                };
                if current {
                    self.emit(SyncEvent::Error(err.to_string()));
                    self.emit(SyncEvent::StateChanged(fallback));
                }
                return Err(SyncError::ScanFailed(err));
            }
        };

        let (existing, prev_watermark, prev_resolved, prev_truncated) = {
            let state = self.state.read().await;
            (
                state.records.clone(),
                state.watermark_block,
                state.resolved_through_block,
                state.truncated,
            )
        };

        let mut incoming = output.records;
        self.hydrator.carry_over(&existing, &mut incoming, &*self.profile);
        let merged = merge_records(existing, incoming);
        let (mut records, dropped) = retain_newest(merged.records, self.cache.max_items());
        let truncated = prev_truncated || dropped;

        let hydration = self.hydrator.hydrate(&mut records, &*self.profile).await;
        prefetch_timestamps(&self.fetcher, &mut records, self.timestamp_concurrency).await;

        if output.to_block < prev_watermark {
            tracing::warn!(
                "Chain head {} is below the watermark {prev_watermark}, keeping the watermark",
                output.to_block
            );
        }
        let watermark_block = prev_watermark.max(output.to_block);

        // A truncated list no longer covers the blocks below its oldest record.
        let resolved_cap = match records.last() {
            Some(oldest) if truncated => {
                oldest.block_number.saturating_sub(1).min(watermark_block)
            }
            _ => watermark_block,
        };
        let resolved_through_block = compute_resolved_through(&records, resolved_cap, prev_resolved);

        let summary = MergeSummary {
            from_block,
            to_block: output.to_block,
            added: merged.added.len(),
            updated: merged.updated,
            total: records.len(),
            watermark_block,
            resolved_through_block,
            hydration,
        };

        {
            let _persist = self.persist.lock().await;
            {
                let mut state = self.state.write().await;
                if state.epoch != epoch {
                    tracing::info!("Cache was cleared during the pass, discarding its results");
                    return Ok(summary);
                }
                let first_page = self.page_size.min(records.len());
                state.visible = state.visible.max(first_page).min(records.len());
                state.records = records.clone();
                state.watermark_block = watermark_block;
                state.resolved_through_block = resolved_through_block;
                state.truncated = truncated;
                state.status = SyncStatus::Ready;
                state.last_error = None;
                state.sync_state = SyncState::Ready;
            }

            let envelope = CacheEnvelope::new(
                self.cache.context(),
                records,
                watermark_block,
                resolved_through_block,
                truncated,
            );
            self.cache.write(envelope).await;
        }

        tracing::info!(
            "Merged {} {} records from blocks {from_block}..={}: {} new, {} updated, watermark {watermark_block}, resolved through {resolved_through_block}",
            summary.total,
            self.profile.name(),
            summary.to_block,
            summary.added,
            summary.updated
        );
        self.emit(SyncEvent::Merged {
            added: merged.added,
            updated: summary.updated,
            total: summary.total,
            watermark_block,
        });
        self.emit(SyncEvent::StateChanged(SyncState::Ready));
        Ok(summary)
    }
}
