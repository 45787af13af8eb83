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

//! Block timestamp prefetch for display.

use std::collections::{BTreeSet, HashMap};

use futures::{stream, StreamExt};

use crate::{endpoint::ChainEndpoint, fetcher::RateLimitedFetcher, record::EventRecord};

/// Fills in `timestamp` for every record that lacks one.
///
/// Each distinct block is looked up once, with at most `concurrency` lookups in flight. Failed
/// lookups leave the timestamp empty. Returns the number of blocks resolved.
pub async fn prefetch_timestamps<E>(
    fetcher: &RateLimitedFetcher<E>,
    records: &mut [EventRecord],
    concurrency: usize,
) -> usize
where
    E: ChainEndpoint + ?Sized,
{
    let blocks: BTreeSet<u64> =
        records.iter().filter(|r| r.timestamp.is_none()).map(|r| r.block_number).collect();
    if blocks.is_empty() {
        return 0;
    }

    let requested = blocks.len();
    let resolved: HashMap<u64, u64> = stream::iter(blocks)
        .map(|block| async move { (block, fetcher.block_timestamp(block).await) })
        .buffer_unordered(concurrency.max(1))
        .filter_map(|(block, res)| async move {
            match res {
                Ok(timestamp) => Some((block, timestamp)),
                Err(err) => {
                    tracing::debug!("Failed to fetch timestamp of block {block}: {err}");
                    None
                }
            }
        })
        .collect()
        .await;

    for record in records.iter_mut().filter(|r| r.timestamp.is_none()) {
        record.timestamp = resolved.get(&record.block_number).copied();
    }

    if resolved.len() < requested {
        tracing::warn!("Resolved timestamps for {} of {requested} blocks", resolved.len());
    }
    resolved.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        fetcher::RetryPolicy,
        record::Fields,
        test_utils::{MockEndpoint, GENESIS_TIMESTAMP},
    };
    use alloy::primitives::B256;
    use std::sync::Arc;

    fn record(key: &str, block: u64) -> EventRecord {
        EventRecord {
            primary_key: key.into(),
            block_number: block,
            tx_hash: B256::ZERO,
            log_index: 0,
            fields: Fields::new(),
            terminal: false,
            timestamp: None,
        }
    }

    #[tokio::test]
    async fn fetches_each_block_once() {
        let endpoint = Arc::new(MockEndpoint::new(1));
        endpoint.set_block_missing(30);
        let fetcher = RateLimitedFetcher::new(endpoint.clone(), RetryPolicy::no_delay(0));

        let mut known = record("known", 10);
        known.timestamp = Some(5);
        let mut records =
            vec![record("a", 20), record("b", 20), record("c", 30), record("d", 40), known];

        let resolved = prefetch_timestamps(&fetcher, &mut records, 2).await;
        assert_eq!(resolved, 2);
        assert_eq!(endpoint.timestamp_count(), 3);
        assert_eq!(records[0].timestamp, Some(GENESIS_TIMESTAMP + 20 * 12));
        assert_eq!(records[1].timestamp, records[0].timestamp);
        assert_eq!(records[2].timestamp, None);
        assert_eq!(records[3].timestamp, Some(GENESIS_TIMESTAMP + 40 * 12));
        assert_eq!(records[4].timestamp, Some(5));
    }
}
