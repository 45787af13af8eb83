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

//! Batching of independent read calls through the Multicall3 aggregator.
//!
//! Correctness never depends on the aggregator: when it is missing on the active chain, the
//! aggregated call fails, or it answers with the wrong number of results, the same calls are
//! issued individually and in parallel.

use alloy::{
    primitives::{address, Address, Bytes},
    sol,
    sol_types::SolCall,
};
use alloy_chains::NamedChain;
use futures::future::join_all;
use serde_json::Value;

use crate::{endpoint::ChainEndpoint, fetcher::RateLimitedFetcher, profile::ReturnDecoder};

sol! {
    interface IMulticall3 {
        struct Call3 {
            address target;
            bool allowFailure;
            bytes callData;
        }

        struct Call3Result {
            bool success;
            bytes returnData;
        }

        function aggregate3(Call3[] calldata calls) external payable returns (Call3Result[] memory returnData);
    }
}

/// Canonical Multicall3 deployment, shared by every chain it has been deployed to.
pub const MULTICALL3_ADDRESS: Address = address!("0xcA11bde05977b3631167028862bE2a173976CA11");

/// Lookup the aggregator address for a named chain.
pub const fn aggregator_for_chain(chain: NamedChain) -> Option<Address> {
    match chain {
        NamedChain::Mainnet
        | NamedChain::Sepolia
        | NamedChain::Holesky
        | NamedChain::Optimism
        | NamedChain::OptimismSepolia
        | NamedChain::Arbitrum
        | NamedChain::ArbitrumSepolia
        | NamedChain::Base
        | NamedChain::BaseSepolia
        | NamedChain::Polygon
        | NamedChain::BinanceSmartChain
        | NamedChain::Gnosis
        | NamedChain::Avalanche
        | NamedChain::Linea
        | NamedChain::Scroll => Some(MULTICALL3_ADDRESS),
        _ => None,
    }
}

/// Lookup the aggregator address by chain ID.
pub fn aggregator_for_chain_id(chain_id: u64) -> Option<Address> {
    let chain = NamedChain::try_from(chain_id).ok()?;
    aggregator_for_chain(chain)
}

/// A single read call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MulticallCall {
    pub target: Address,
    pub call_data: Bytes,
}

impl MulticallCall {
    pub fn new(target: Address, call: &impl SolCall) -> Self {
        Self { target, call_data: call.abi_encode().into() }
    }
}

/// Result of a single read call, positionally aligned with its [MulticallCall].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MulticallResult {
    pub success: bool,
    pub return_data: Bytes,
}

impl MulticallResult {
    pub fn failed() -> Self {
        Self { success: false, return_data: Bytes::new() }
    }
}

/// Aggregates read calls into Multicall3 `aggregate3` calls.
pub struct MulticallAggregator<E: ?Sized> {
    fetcher: RateLimitedFetcher<E>,
    address: Option<Address>,
    batch_size: usize,
}

impl<E> MulticallAggregator<E>
where
    E: ChainEndpoint + ?Sized,
{
    /// Resolves the aggregator for `chain_id` and checks that code is deployed there.
    ///
    /// The returned aggregator is not ready when the chain has no known deployment or the
    /// address holds no code; calls then always go through the individual fallback.
    pub async fn initialize(fetcher: RateLimitedFetcher<E>, chain_id: u64, batch_size: usize) -> Self {
        let address = match aggregator_for_chain_id(chain_id) {
            Some(address) => Self::verify_code(&fetcher, address).await,
            None => {
                tracing::info!("No multicall aggregator known for chain {chain_id}");
                None
            }
        };
        Self { fetcher, address, batch_size: batch_size.max(1) }
    }

    async fn verify_code(fetcher: &RateLimitedFetcher<E>, address: Address) -> Option<Address> {
        match fetcher.get_code(address).await {
            Ok(code) if !code.is_empty() => Some(address),
            Ok(_) => {
                tracing::info!("No code deployed at multicall aggregator {address}");
                None
            }
            Err(err) => {
                tracing::warn!("Failed to check multicall aggregator code at {address}: {err}");
                None
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        self.address.is_some()
    }

    /// Executes `calls` in one aggregated call.
    ///
    /// Returns `None` when the aggregator is unavailable or the aggregated call fails as a whole.
    /// With `require_success == false` individual calls may fail without failing the batch.
    pub async fn batch_call(
        &self,
        calls: &[MulticallCall],
        require_success: bool,
    ) -> Option<Vec<MulticallResult>> {
        let address = self.address?;
        if calls.is_empty() {
            return Some(Vec::new());
        }

        let request = IMulticall3::aggregate3Call {
            calls: calls
                .iter()
                .map(|call| IMulticall3::Call3 {
                    target: call.target,
                    allowFailure: !require_success,
                    callData: call.call_data.clone(),
                })
                .collect(),
        };

        let raw = match self.fetcher.call(address, request.abi_encode().into()).await {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!("Aggregated call of {} calls failed: {err}", calls.len());
                return None;
            }
        };

        match IMulticall3::aggregate3Call::abi_decode_returns(&raw) {
            Ok(results) => Some(
                results
                    .into_iter()
                    .map(|result| MulticallResult {
                        success: result.success,
                        return_data: result.returnData,
                    })
                    .collect(),
            ),
            Err(err) => {
                tracing::warn!("Failed to decode aggregated call response: {err}");
                None
            }
        }
    }

    /// Issues each call on its own, all in parallel. Failed calls yield [MulticallResult::failed].
    pub async fn call_individually(&self, calls: &[MulticallCall]) -> Vec<MulticallResult> {
        let futures = calls.iter().map(|call| async move {
            match self.fetcher.call(call.target, call.call_data.clone()).await {
                Ok(return_data) => MulticallResult { success: true, return_data },
                Err(err) => {
                    tracing::debug!("Individual call to {} failed: {err}", call.target);
                    MulticallResult::failed()
                }
            }
        });
        join_all(futures).await
    }

    /// Executes `calls` in aggregated batches of at most `batch_size`, falling back to individual
    /// calls for any batch the aggregator cannot serve. Always returns one result per call.
    pub async fn execute(&self, calls: &[MulticallCall]) -> Vec<MulticallResult> {
        let mut results = Vec::with_capacity(calls.len());
        for chunk in calls.chunks(self.batch_size) {
            let batch = match self.batch_call(chunk, false).await {
                Some(batch) if batch.len() == chunk.len() => batch,
                Some(batch) => {
                    tracing::warn!(
                        "Aggregator returned {} results for {} calls, falling back to individual calls",
                        batch.len(),
                        chunk.len()
                    );
                    self.call_individually(chunk).await
                }
                None => {
                    if self.is_ready() {
                        tracing::warn!(
                            "Falling back to {} individual calls after aggregator failure",
                            chunk.len()
                        );
                    }
                    self.call_individually(chunk).await
                }
            };
            results.extend(batch);
        }
        results
    }
}

impl<E: ?Sized> Clone for MulticallAggregator<E> {
    fn clone(&self) -> Self {
        Self { fetcher: self.fetcher.clone(), address: self.address, batch_size: self.batch_size }
    }
}

/// Decodes each result with `decoder`, keyed by the method name at the same position.
///
/// Failed calls, empty return data and undecodable data all map to `None`.
pub fn decode_results<D>(
    decoder: &D,
    methods: &[&str],
    results: &[MulticallResult],
) -> Vec<Option<Value>>
where
    D: ReturnDecoder + ?Sized,
{
    methods
        .iter()
        .zip(results.iter())
        .map(|(method, result)| {
            if !result.success || result.return_data.is_empty() {
                return None;
            }
            decoder.decode_return(method, &result.return_data)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        endpoint::EndpointError,
        fetcher::RetryPolicy,
        test_utils::{MockEndpoint, TestReturnDecoder},
    };
    use alloy::{primitives::U256, sol_types::SolValue};
    use std::sync::Arc;

    sol! {
        interface ICounter {
            function count(uint256 id) external view returns (uint256);
        }
    }

    const TARGET: Address = address!("0x00000000000000000000000000000000000000c0");

    fn setup(aggregator_fails: bool) -> (Arc<MockEndpoint>, Vec<MulticallCall>) {
        let endpoint = MockEndpoint::new(1);
        endpoint.deploy_multicall(MULTICALL3_ADDRESS);
        endpoint.set_aggregator_failure(aggregator_fails);
        let mut calls = Vec::new();
        for id in 0..5u64 {
            let call = ICounter::countCall { id: U256::from(id) };
            // Call 3 reverts.
            if id != 3 {
                endpoint.set_call_response(TARGET, &call, U256::from(id * 10).abi_encode());
            }
            calls.push(MulticallCall::new(TARGET, &call));
        }
        (Arc::new(endpoint), calls)
    }

    #[test]
    fn aggregator_table() {
        assert_eq!(aggregator_for_chain_id(1), Some(MULTICALL3_ADDRESS));
        assert_eq!(aggregator_for_chain_id(11155111), Some(MULTICALL3_ADDRESS));
        assert_eq!(aggregator_for_chain_id(31337), None);
    }

    #[tokio::test]
    async fn not_ready_without_code() {
        let endpoint = Arc::new(MockEndpoint::new(1));
        let fetcher = RateLimitedFetcher::new(endpoint, RetryPolicy::no_delay(0));
        let aggregator = MulticallAggregator::initialize(fetcher, 1, 10).await;
        assert!(!aggregator.is_ready());
        assert!(aggregator.batch_call(&[], false).await.is_none());
    }

    #[tokio::test]
    async fn code_check_retries_rate_limits() {
        let (endpoint, calls) = setup(false);
        endpoint.fail_next_get_code(2, || EndpointError::HttpStatus {
            status: 429,
            body: "Too Many Requests".into(),
        });
        let fetcher = RateLimitedFetcher::new(endpoint.clone(), RetryPolicy::no_delay(3));
        let aggregator = MulticallAggregator::initialize(fetcher, 1, 10).await;
        assert!(aggregator.is_ready());

        aggregator.batch_call(&calls, false).await.unwrap();
        assert_eq!(endpoint.call_count(), 1);
    }

    #[tokio::test]
    async fn not_ready_on_unknown_chain() {
        let endpoint = MockEndpoint::new(31337);
        endpoint.deploy_multicall(MULTICALL3_ADDRESS);
        let fetcher = RateLimitedFetcher::new(Arc::new(endpoint), RetryPolicy::no_delay(0));
        let aggregator = MulticallAggregator::initialize(fetcher, 31337, 10).await;
        assert!(!aggregator.is_ready());
    }

    #[tokio::test]
    async fn batch_call_reports_individual_failures() {
        let (endpoint, calls) = setup(false);
        let fetcher = RateLimitedFetcher::new(endpoint.clone(), RetryPolicy::no_delay(0));
        let aggregator = MulticallAggregator::initialize(fetcher, 1, 10).await;
        assert!(aggregator.is_ready());

        let results = aggregator.batch_call(&calls, false).await.unwrap();
        assert_eq!(results.len(), 5);
        assert!(results[0].success);
        assert!(!results[3].success);
        assert_eq!(endpoint.call_count(), 1);

        // With require_success the reverting call fails the whole batch.
        assert!(aggregator.batch_call(&calls, true).await.is_none());
    }

    #[tokio::test]
    async fn falls_back_to_individual_calls() {
        let (endpoint, calls) = setup(true);
        let fetcher = RateLimitedFetcher::new(endpoint.clone(), RetryPolicy::no_delay(0));
        let aggregator = MulticallAggregator::initialize(fetcher, 1, 10).await;
        assert!(aggregator.is_ready());

        let results = aggregator.execute(&calls).await;
        // One failed aggregated call, then five individual ones.
        assert_eq!(endpoint.call_count(), 6);
        assert_eq!(results.len(), 5);

        let methods = vec!["count"; 5];
        let decoded = decode_results(&TestReturnDecoder, &methods, &results);
        assert_eq!(decoded.len(), 5);
        assert_eq!(decoded[0], Some(Value::from("0")));
        assert_eq!(decoded[4], Some(Value::from("40")));
        assert_eq!(decoded[3], None);
    }

    #[tokio::test]
    async fn execute_chunks_batches() {
        let (endpoint, calls) = setup(false);
        let fetcher = RateLimitedFetcher::new(endpoint.clone(), RetryPolicy::no_delay(0));
        let aggregator = MulticallAggregator::initialize(fetcher, 1, 2).await;

        let results = aggregator.execute(&calls).await;
        assert_eq!(results.len(), 5);
        assert_eq!(endpoint.call_count(), 3);
        assert_eq!(
            results.iter().map(|r| r.success).collect::<Vec<_>>(),
            vec![true, true, true, false, true]
        );
    }

    #[test]
    fn empty_return_data_decodes_to_none() {
        let results = vec![
            MulticallResult { success: true, return_data: Bytes::new() },
            MulticallResult { success: true, return_data: Bytes::from(vec![1, 2, 3]) },
        ];
        let decoded = decode_results(&TestReturnDecoder, &["count", "count"], &results);
        assert_eq!(decoded, vec![None, None]);
    }
}
