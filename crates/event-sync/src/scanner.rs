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

//! Chunked event log scanning.

use std::time::Duration;

use alloy::primitives::Address;
use thiserror::Error;

use crate::{
    endpoint::ChainEndpoint,
    errors::{impl_coded_debug, CodedError},
    fetcher::{FetchError, RateLimitedFetcher},
    profile::EventProfile,
    record::{chunk_range, dedup_by_key, BlockTarget, EventRecord, ScanWindow},
};

#[derive(Error)]
pub enum ScanError {
    #[error("{code} Failed to resolve chain head: {0}", code = self.code())]
    Head(FetchError),

    #[error("{code} Failed to fetch logs for blocks {from}..={to}: {source}", code = self.code())]
    Range { from: u64, to: u64, source: FetchError },
}

impl_coded_debug!(ScanError);

impl CodedError for ScanError {
    fn code(&self) -> &str {
        match self {
            ScanError::Head(_) => "[ES-SCAN-201]",
            ScanError::Range { .. } => "[ES-SCAN-202]",
        }
    }
}

/// Result of a scan, with the concrete upper bound the window resolved to.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanOutput {
    pub records: Vec<EventRecord>,
    pub to_block: u64,
}

/// Walks block windows in fixed-size chunks and decodes the matching logs.
pub struct EventScanner<E: ?Sized> {
    fetcher: RateLimitedFetcher<E>,
    contract: Address,
    chunk_size: u64,
    chunk_pause: Duration,
}

impl<E: ?Sized> Clone for EventScanner<E> {
    fn clone(&self) -> Self {
        Self {
            fetcher: self.fetcher.clone(),
            contract: self.contract,
            chunk_size: self.chunk_size,
            chunk_pause: self.chunk_pause,
        }
    }
}

impl<E> EventScanner<E>
where
    E: ChainEndpoint + ?Sized,
{
    pub fn new(
        fetcher: RateLimitedFetcher<E>,
        contract: Address,
        chunk_size: u64,
        chunk_pause: Duration,
    ) -> Self {
        Self { fetcher, contract, chunk_size: chunk_size.max(1), chunk_pause }
    }

    /// Scans `window` for the profile's event.
    ///
    /// Chunks are fetched sequentially with a pause in between. Logs that fail to decode are
    /// skipped. The output is deduplicated by primary key and sorted newest first.
    pub async fn scan(
        &self,
        window: ScanWindow,
        profile: &dyn EventProfile,
    ) -> Result<ScanOutput, ScanError> {
        let to_block = match window.to_block {
            BlockTarget::Number(number) => number,
            BlockTarget::Latest => self.fetcher.block_number().await.map_err(ScanError::Head)?,
        };

        let chunks = chunk_range(window.from_block, to_block, self.chunk_size);
        if chunks.is_empty() {
            tracing::debug!(
                "Empty {} scan window {}..={to_block}",
                profile.name(),
                window.from_block
            );
            return Ok(ScanOutput { records: Vec::new(), to_block });
        }

        let topic0 = profile.event_signature();
        let mut records = Vec::new();
        let mut skipped = 0usize;
        for (idx, (from, to)) in chunks.iter().copied().enumerate() {
            if idx > 0 && !self.chunk_pause.is_zero() {
                tokio::time::sleep(self.chunk_pause).await;
            }

            let logs = self
                .fetcher
                .fetch_range(self.contract, topic0, from, to)
                .await
                .map_err(|source| ScanError::Range { from, to, source })?;
            tracing::debug!(
                "Fetched {} {} logs in blocks {from}..={to}",
                logs.len(),
                profile.name()
            );

            for log in logs {
                match profile.record_from_log(&log) {
                    Ok(Some(record)) => records.push(record),
                    Ok(None) => {
                        skipped += 1;
                        tracing::debug!(
                            "Skipping pending log without position: {:?}",
                            log.transaction_hash
                        );
                    }
                    Err(err) => {
                        skipped += 1;
                        tracing::warn!(
                            "Skipping undecodable log in tx {:?}: {err}",
                            log.transaction_hash
                        );
                    }
                }
            }
        }

        let records = dedup_by_key(records);
        tracing::info!(
            "Scanned {} blocks {}..={to_block} in {} chunks: {} records, {skipped} skipped",
            profile.name(),
            window.from_block,
            chunks.len(),
            records.len()
        );
        Ok(ScanOutput { records, to_block })
    }
}
