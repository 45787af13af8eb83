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

//! Normalized event records and the merge rules that keep a record list deduplicated.

use std::collections::{BTreeMap, HashMap};

use alloy::primitives::B256;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Decoded event fields, plus any derived fields patched in by hydration.
pub type Fields = BTreeMap<String, Value>;

/// A decoded event, keyed by the logical entity it describes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Logical identifier of the entity (operation id, lock id, ...).
    pub primary_key: String,
    pub block_number: u64,
    pub tx_hash: B256,
    pub log_index: u64,
    pub fields: Fields,
    /// True once the entity can no longer change on-chain state.
    #[serde(default)]
    pub terminal: bool,
    /// Block timestamp, filled in by the timestamp prefetch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

impl EventRecord {
    /// Position of the originating log, used for newest-first ordering.
    pub fn position(&self) -> (u64, u64) {
        (self.block_number, self.log_index)
    }
}

/// Upper bound of a scan window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockTarget {
    Number(u64),
    Latest,
}

/// Inclusive block range to scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanWindow {
    pub from_block: u64,
    pub to_block: BlockTarget,
}

impl ScanWindow {
    pub fn new(from_block: u64, to_block: u64) -> Self {
        Self { from_block, to_block: BlockTarget::Number(to_block) }
    }

    pub fn to_latest(from_block: u64) -> Self {
        Self { from_block, to_block: BlockTarget::Latest }
    }
}

/// Splits the inclusive range `[from, to]` into consecutive sub-ranges of at most `chunk_size`
/// blocks. Returns nothing when `from > to`.
pub fn chunk_range(from: u64, to: u64, chunk_size: u64) -> Vec<(u64, u64)> {
    let chunk_size = chunk_size.max(1);
    let mut chunks = Vec::new();
    let mut current_from = from;
    while current_from <= to {
        let current_to = current_from.saturating_add(chunk_size - 1).min(to);
        chunks.push((current_from, current_to));
        if current_to == u64::MAX {
            break;
        }
        current_from = current_to + 1;
    }
    chunks
}

/// Sorts records newest first: block number descending, then log index descending. Ties (which
/// real logs never produce) fall back to the primary key so the order stays deterministic.
pub fn sort_newest_first(records: &mut [EventRecord]) {
    records.sort_by(|a, b| {
        b.position().cmp(&a.position()).then_with(|| a.primary_key.cmp(&b.primary_key))
    });
}

/// Collapses records sharing a primary key, keeping the one observed at the latest log position.
pub fn dedup_by_key(records: Vec<EventRecord>) -> Vec<EventRecord> {
    let mut by_key: HashMap<String, EventRecord> = HashMap::with_capacity(records.len());
    for record in records {
        match by_key.get(&record.primary_key) {
            Some(existing) if existing.position() > record.position() => {}
            _ => {
                by_key.insert(record.primary_key.clone(), record);
            }
        }
    }
    let mut out: Vec<EventRecord> = by_key.into_values().collect();
    sort_newest_first(&mut out);
    out
}

/// Outcome of merging freshly scanned records into an existing list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeOutcome {
    pub records: Vec<EventRecord>,
    /// Keys that were not present before the merge.
    pub added: Vec<String>,
    /// Number of existing keys replaced by a newer observation.
    pub updated: usize,
}

/// Merges `incoming` into `existing`. For keys present in both, the incoming record wins since it
/// reflects a later observation. The result is deduplicated and sorted newest first.
pub fn merge_records(existing: Vec<EventRecord>, incoming: Vec<EventRecord>) -> MergeOutcome {
    let mut by_key: HashMap<String, EventRecord> = HashMap::with_capacity(existing.len());
    for record in existing {
        if let Some(previous) = by_key.insert(record.primary_key.clone(), record) {
            tracing::warn!(
                "Duplicate primary key {} found in existing records, keeping the later copy",
                previous.primary_key
            );
        }
    }

    let mut added = Vec::new();
    let mut updated = 0;
    for record in incoming {
        let key = record.primary_key.clone();
        match by_key.insert(key.clone(), record) {
            Some(_) => updated += 1,
            None => added.push(key),
        }
    }

    let mut records: Vec<EventRecord> = by_key.into_values().collect();
    sort_newest_first(&mut records);

    MergeOutcome { records, added, updated }
}

/// Highest block `b <= watermark` such that every record at or below `b` is terminal.
///
/// Never returns less than `previous`; a lower candidate means the value does not advance.
pub fn compute_resolved_through(records: &[EventRecord], watermark: u64, previous: u64) -> u64 {
    let candidate = records
        .iter()
        .filter(|record| !record.terminal)
        .map(|record| record.block_number)
        .min()
        .map(|lowest_open| lowest_open.saturating_sub(1).min(watermark))
        .unwrap_or(watermark);
    candidate.max(previous)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn record(key: &str, block: u64, log_index: u64) -> EventRecord {
        EventRecord {
            primary_key: key.to_string(),
            block_number: block,
            tx_hash: B256::with_last_byte(block as u8),
            log_index,
            fields: Fields::new(),
            terminal: false,
            timestamp: None,
        }
    }

    #[test]
    fn chunk_range_splits_inclusive_ranges() {
        assert_eq!(chunk_range(1000, 1000 + 2 * 100 + 1, 100), vec![
            (1000, 1099),
            (1100, 1199),
            (1200, 1201)
        ]);
        assert_eq!(chunk_range(5, 5, 100), vec![(5, 5)]);
        assert!(chunk_range(6, 5, 100).is_empty());
    }

    #[test]
    fn newest_first_ordering() {
        let mut records = vec![record("a", 10, 1), record("b", 12, 0), record("c", 10, 3)];
        sort_newest_first(&mut records);
        let keys: Vec<_> = records.iter().map(|r| r.primary_key.as_str()).collect();
        assert_eq!(keys, vec!["b", "c", "a"]);
    }

    #[test]
    fn dedup_keeps_latest_observation() {
        let records = vec![record("a", 10, 0), record("a", 20, 0), record("b", 15, 0)];
        let deduped = dedup_by_key(records);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].primary_key, "a");
        assert_eq!(deduped[0].block_number, 20);
    }

    #[test]
    fn merge_reports_added_and_updated() {
        let existing = vec![record("a", 10, 0), record("b", 11, 0)];
        let mut newer_b = record("b", 11, 0);
        newer_b.fields.insert("state".into(), Value::from(2));
        let incoming = vec![newer_b.clone(), record("c", 12, 0)];

        let outcome = merge_records(existing, incoming);
        assert_eq!(outcome.added, vec!["c".to_string()]);
        assert_eq!(outcome.updated, 1);
        assert_eq!(outcome.records.len(), 3);
        assert_eq!(outcome.records[1], newer_b);
    }

    #[test]
    fn resolved_through_stops_below_open_record() {
        let mut done = record("done", 500, 0);
        done.terminal = true;
        let open = record("open", 600, 0);

        let resolved = compute_resolved_through(&[open, done], 1_000, 0);
        assert_eq!(resolved, 599);
    }

    #[test]
    fn resolved_through_reaches_watermark_when_all_terminal() {
        let mut a = record("a", 500, 0);
        a.terminal = true;
        assert_eq!(compute_resolved_through(&[a], 900, 100), 900);
        assert_eq!(compute_resolved_through(&[], 900, 100), 900);
    }

    #[test]
    fn resolved_through_never_decreases() {
        let open = record("open", 300, 0);
        assert_eq!(compute_resolved_through(&[open], 900, 450), 450);
    }

    fn arb_records() -> impl Strategy<Value = Vec<EventRecord>> {
        prop::collection::vec((0u8..12, 0u64..50, 0u64..4), 0..24).prop_map(|items| {
            items
                .into_iter()
                .map(|(key, block, log_index)| record(&format!("k{key}"), block, log_index))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn merge_has_unique_keys_and_newer_wins(old in arb_records(), new in arb_records()) {
            let new = dedup_by_key(new);
            let outcome = merge_records(dedup_by_key(old), new.clone());

            let mut keys: Vec<_> = outcome.records.iter().map(|r| r.primary_key.clone()).collect();
            let total = keys.len();
            keys.sort();
            keys.dedup();
            prop_assert_eq!(keys.len(), total);

            for incoming in &new {
                let merged = outcome
                    .records
                    .iter()
                    .find(|r| r.primary_key == incoming.primary_key)
                    .unwrap();
                prop_assert_eq!(merged, incoming);
            }

            for pair in outcome.records.windows(2) {
                prop_assert!(pair[0].position() >= pair[1].position());
            }
        }

        #[test]
        fn resolved_through_is_monotonic(
            records in arb_records(),
            watermark in 0u64..100,
            previous in 0u64..100,
        ) {
            let previous = previous.min(watermark);
            let resolved = compute_resolved_through(&records, watermark, previous);
            prop_assert!(resolved >= previous);
            prop_assert!(resolved <= watermark);
        }
    }
}
