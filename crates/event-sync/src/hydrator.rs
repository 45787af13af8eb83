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

//! Patches live on-chain state into event records.

use std::collections::HashMap;

use alloy::primitives::Address;

use crate::{
    endpoint::ChainEndpoint,
    multicall::{decode_results, MulticallAggregator},
    profile::EventProfile,
    record::EventRecord,
};

/// Counters for one hydration pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HydrationReport {
    /// Records that detail calls were issued for.
    pub records: usize,
    pub calls: usize,
    /// Calls whose result could not be applied. The affected field keeps its previous value.
    pub failed: usize,
}

pub struct DetailHydrator<E: ?Sized> {
    aggregator: MulticallAggregator<E>,
    contract: Address,
}

impl<E: ?Sized> Clone for DetailHydrator<E> {
    fn clone(&self) -> Self {
        Self { aggregator: self.aggregator.clone(), contract: self.contract }
    }
}

impl<E> DetailHydrator<E>
where
    E: ChainEndpoint + ?Sized,
{
    pub fn new(aggregator: MulticallAggregator<E>, contract: Address) -> Self {
        Self { aggregator, contract }
    }

    pub fn aggregator(&self) -> &MulticallAggregator<E> {
        &self.aggregator
    }

    /// Copies derived fields and timestamps from `previous` onto re-observed `incoming` records.
    ///
    /// A re-scanned log only carries its decoded fields. The values read by earlier detail calls
    /// stay in place until a new call replaces them, and `terminal` is evaluated against them.
    /// Returns the number of records that had a previous version.
    pub fn carry_over(
        &self,
        previous: &[EventRecord],
        incoming: &mut [EventRecord],
        profile: &dyn EventProfile,
    ) -> usize {
        let previous: HashMap<&str, &EventRecord> =
            previous.iter().map(|record| (record.primary_key.as_str(), record)).collect();

        let mut carried = 0;
        for record in incoming.iter_mut() {
            let Some(prev) = previous.get(record.primary_key.as_str()) else {
                continue;
            };
            for detail in profile.detail_calls(self.contract, prev) {
                let Some(field) = profile.field_for(detail.method) else {
                    continue;
                };
                if let Some(value) = prev.fields.get(field) {
                    record.fields.entry(field.to_string()).or_insert_with(|| value.clone());
                }
            }
            if record.timestamp.is_none() && record.block_number == prev.block_number {
                record.timestamp = prev.timestamp;
            }
            record.terminal = profile.is_terminal(record);
            carried += 1;
        }
        carried
    }

    /// Refreshes the derived fields of every non-terminal record and re-evaluates `terminal`.
    ///
    /// Terminal records are left untouched since their state can no longer change.
    pub async fn hydrate(
        &self,
        records: &mut [EventRecord],
        profile: &dyn EventProfile,
    ) -> HydrationReport {
        let mut plan = Vec::new();
        let mut calls = Vec::new();
        let mut hydrated = Vec::new();
        for (idx, record) in records.iter().enumerate().filter(|(_, r)| !r.terminal) {
            let details = profile.detail_calls(self.contract, record);
            if details.is_empty() {
                continue;
            }
            hydrated.push(idx);
            for detail in details {
                plan.push((idx, detail.method));
                calls.push(detail.call);
            }
        }

        let mut report =
            HydrationReport { records: hydrated.len(), calls: calls.len(), failed: 0 };
        if calls.is_empty() {
            return report;
        }

        let results = self.aggregator.execute(&calls).await;
        let methods: Vec<&str> = plan.iter().map(|(_, method)| *method).collect();
        let decoded = decode_results(profile, &methods, &results);

        for ((idx, method), value) in plan.into_iter().zip(decoded) {
            match (profile.field_for(method), value) {
                (Some(field), Some(value)) => {
                    records[idx].fields.insert(field.to_string(), value);
                }
                _ => report.failed += 1,
            }
        }

        for idx in hydrated {
            let terminal = profile.is_terminal(&records[idx]);
            records[idx].terminal = terminal;
        }

        if report.failed > 0 {
            tracing::warn!(
                "{} of {} {} detail calls failed",
                report.failed,
                report.calls,
                profile.name()
            );
        }
        tracing::debug!(
            "Hydrated {} {} records with {} calls",
            report.records,
            profile.name(),
            report.calls
        );
        report
    }
}
