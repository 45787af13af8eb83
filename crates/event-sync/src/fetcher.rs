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

//! Rate-limit aware access to the read endpoint.

use std::{future::Future, sync::Arc, time::Duration};

use alloy::{
    primitives::{Address, Bytes, B256},
    rpc::types::Log,
};
use rand::Rng;
use thiserror::Error;

use crate::{
    endpoint::{ChainEndpoint, EndpointError},
    errors::{impl_coded_debug, CodedError},
};

#[derive(Error)]
pub enum FetchError {
    #[error("{code} Still rate limited after {attempts} attempts: {source}", code = self.code())]
    RateLimited { attempts: u32, source: EndpointError },

    #[error("{code} Endpoint error: {0}", code = self.code())]
    Endpoint(EndpointError),
}

impl_coded_debug!(FetchError);

impl CodedError for FetchError {
    fn code(&self) -> &str {
        match self {
            FetchError::RateLimited { .. } => "[ES-FETCH-101]",
            FetchError::Endpoint(_) => "[ES-FETCH-102]",
        }
    }
}

/// Backoff policy for calls rejected by a throttling endpoint.
///
/// The delay before retry `n` (zero based) is `base_delay * 2^n` plus a random jitter drawn from
/// `[0, max_jitter]`. Errors that are not classified as rate limiting are never retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 4,
            base_delay: Duration::from_millis(500),
            max_jitter: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    /// Policy that retries immediately, used where waiting would only slow tests down.
    pub const fn no_delay(max_retries: u32) -> Self {
        Self { max_retries, base_delay: Duration::ZERO, max_jitter: Duration::ZERO }
    }

    /// Deterministic part of the delay before the given retry.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor)
    }

    /// Full delay before the given retry, jitter included.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let jitter_ms = self.max_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
        };
        self.backoff(attempt).saturating_add(jitter)
    }

    /// Runs `op`, retrying while it fails with a rate-limit error and retries remain.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, EndpointError>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_rate_limited() => {
                    if attempt >= self.max_retries {
                        tracing::warn!(
                            "{label}: giving up after {} rate limited attempts: {err}",
                            attempt + 1
                        );
                        return Err(FetchError::RateLimited { attempts: attempt + 1, source: err });
                    }
                    let delay = self.delay_for(attempt);
                    tracing::debug!(
                        "{label}: rate limited (retry {}/{}), waiting {delay:?}: {err}",
                        attempt + 1,
                        self.max_retries
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(FetchError::Endpoint(err)),
            }
        }
    }
}

/// Wraps a [ChainEndpoint] so every call shares one [RetryPolicy].
pub struct RateLimitedFetcher<E: ?Sized> {
    endpoint: Arc<E>,
    policy: RetryPolicy,
}

impl<E: ?Sized> Clone for RateLimitedFetcher<E> {
    fn clone(&self) -> Self {
        Self { endpoint: self.endpoint.clone(), policy: self.policy.clone() }
    }
}

impl<E> RateLimitedFetcher<E>
where
    E: ChainEndpoint + ?Sized,
{
    pub fn new(endpoint: Arc<E>, policy: RetryPolicy) -> Self {
        Self { endpoint, policy }
    }

    /// Fetch the logs of one inclusive block range.
    pub async fn fetch_range(
        &self,
        address: Address,
        topic0: B256,
        from: u64,
        to: u64,
    ) -> Result<Vec<Log>, FetchError> {
        let label = format!("get_logs[{from}..={to}]");
        self.policy.run(&label, || self.endpoint.get_logs(address, topic0, from, to)).await
    }

    pub async fn chain_id(&self) -> Result<u64, FetchError> {
        self.policy.run("chain_id", || self.endpoint.chain_id()).await
    }

    pub async fn block_number(&self) -> Result<u64, FetchError> {
        self.policy.run("block_number", || self.endpoint.block_number()).await
    }

    pub async fn call(&self, target: Address, data: Bytes) -> Result<Bytes, FetchError> {
        self.policy.run("eth_call", || self.endpoint.call(target, data.clone())).await
    }

    pub async fn get_code(&self, address: Address) -> Result<Bytes, FetchError> {
        self.policy.run("get_code", || self.endpoint.get_code(address)).await
    }

    pub async fn block_timestamp(&self, number: u64) -> Result<u64, FetchError> {
        self.policy.run("block_timestamp", || self.endpoint.block_timestamp(number)).await
    }
}
