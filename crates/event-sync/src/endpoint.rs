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

//! Read endpoint abstraction.
//!
//! The engine only needs a handful of read-only JSON-RPC methods. [ChainEndpoint] captures them
//! so the scan/hydration logic can run against any alloy [Provider] as well as the scripted
//! endpoint used in tests.

use alloy::{
    eips::BlockNumberOrTag,
    network::{Ethereum, TransactionBuilder},
    primitives::{Address, Bytes, B256},
    providers::Provider,
    rpc::types::{Filter, Log, TransactionRequest},
    transports::{RpcError, TransportErrorKind},
};
use async_trait::async_trait;
use thiserror::Error;

use crate::errors::{impl_coded_debug, CodedError};

/// JSON-RPC error codes used by common providers to signal throttling.
const RATE_LIMIT_RPC_CODES: &[i64] = &[429, -32005, -32029];

/// Lowercase message fragments that mark a throttling response.
const RATE_LIMIT_MARKERS: &[&str] = &[
    "rate limit",
    "rate-limit",
    "ratelimit",
    "too many requests",
    "429",
    "resource exhausted",
    "capacity",
    "throttl",
];

#[derive(Error)]
pub enum EndpointError {
    #[error("{code} RPC error {rpc_code}: {message}", code = self.code())]
    Rpc { rpc_code: i64, message: String },

    #[error("{code} HTTP status {status}: {body}", code = self.code())]
    HttpStatus { status: u16, body: String },

    #[error("{code} Transport error: {0}", code = self.code())]
    Transport(String),

    #[error("{code} Block {0} not found", code = self.code())]
    BlockNotFound(u64),
}

impl_coded_debug!(EndpointError);

impl CodedError for EndpointError {
    fn code(&self) -> &str {
        match self {
            EndpointError::Rpc { .. } => "[ES-RPC-001]",
            EndpointError::HttpStatus { .. } => "[ES-RPC-002]",
            EndpointError::Transport(_) => "[ES-RPC-003]",
            EndpointError::BlockNotFound(_) => "[ES-RPC-004]",
        }
    }
}

impl EndpointError {
    /// Returns true if the error looks like the endpoint throttling us rather than a real failure.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            EndpointError::Rpc { rpc_code, message } => {
                RATE_LIMIT_RPC_CODES.contains(rpc_code) || has_rate_limit_marker(message)
            }
            EndpointError::HttpStatus { status, body } => *status == 429 || has_rate_limit_marker(body),
            EndpointError::Transport(message) => has_rate_limit_marker(message),
            EndpointError::BlockNotFound(_) => false,
        }
    }
}

fn has_rate_limit_marker(message: &str) -> bool {
    let message = message.to_lowercase();
    RATE_LIMIT_MARKERS.iter().any(|marker| message.contains(marker))
}

impl From<RpcError<TransportErrorKind>> for EndpointError {
    fn from(err: RpcError<TransportErrorKind>) -> Self {
        match &err {
            RpcError::ErrorResp(payload) => {
                EndpointError::Rpc { rpc_code: payload.code, message: payload.message.to_string() }
            }
            RpcError::Transport(TransportErrorKind::HttpError(http)) => {
                EndpointError::HttpStatus { status: http.status, body: http.body.clone() }
            }
            _ => EndpointError::Transport(err.to_string()),
        }
    }
}

/// Read-only view of a chain used by the scanner, the aggregator and the hydrator.
#[async_trait]
pub trait ChainEndpoint: Send + Sync {
    /// Chain id of the connected network.
    async fn chain_id(&self) -> Result<u64, EndpointError>;

    /// Current chain head.
    async fn block_number(&self) -> Result<u64, EndpointError>;

    /// Logs emitted by `address` with `topic0` in the inclusive range `[from, to]`.
    async fn get_logs(
        &self,
        address: Address,
        topic0: B256,
        from: u64,
        to: u64,
    ) -> Result<Vec<Log>, EndpointError>;

    /// Timestamp of the given block.
    async fn block_timestamp(&self, number: u64) -> Result<u64, EndpointError>;

    /// Deployed code at `address`, empty if none.
    async fn get_code(&self, address: Address) -> Result<Bytes, EndpointError>;

    /// `eth_call` against the latest block.
    async fn call(&self, target: Address, data: Bytes) -> Result<Bytes, EndpointError>;
}

/// [ChainEndpoint] backed by an alloy provider.
#[derive(Clone, Debug)]
pub struct AlloyEndpoint<P> {
    provider: P,
}

impl<P> AlloyEndpoint<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<P> ChainEndpoint for AlloyEndpoint<P>
where
    P: Provider<Ethereum> + Send + Sync + 'static,
{
    async fn chain_id(&self) -> Result<u64, EndpointError> {
        Ok(self.provider.get_chain_id().await?)
    }

    async fn block_number(&self) -> Result<u64, EndpointError> {
        Ok(self.provider.get_block_number().await?)
    }

    async fn get_logs(
        &self,
        address: Address,
        topic0: B256,
        from: u64,
        to: u64,
    ) -> Result<Vec<Log>, EndpointError> {
        let filter =
            Filter::new().address(address).event_signature(topic0).from_block(from).to_block(to);
        Ok(self.provider.get_logs(&filter).await?)
    }

    async fn block_timestamp(&self, number: u64) -> Result<u64, EndpointError> {
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Number(number))
            .await?
            .ok_or(EndpointError::BlockNotFound(number))?;
        Ok(block.header.timestamp)
    }

    async fn get_code(&self, address: Address) -> Result<Bytes, EndpointError> {
        Ok(self.provider.get_code_at(address).await?)
    }

    async fn call(&self, target: Address, data: Bytes) -> Result<Bytes, EndpointError> {
        let tx = TransactionRequest::default().with_to(target).with_input(data);
        Ok(self.provider.call(tx).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_rate_limit_codes() {
        assert!(EndpointError::Rpc { rpc_code: -32005, message: "limit".into() }.is_rate_limited());
        assert!(EndpointError::Rpc { rpc_code: 429, message: String::new() }.is_rate_limited());
        assert!(EndpointError::HttpStatus { status: 429, body: String::new() }.is_rate_limited());
    }

    #[test]
    fn classifies_rate_limit_messages() {
        let err = EndpointError::Rpc {
            rpc_code: -32000,
            message: "Your app has exceeded its compute units per second capacity".into(),
        };
        assert!(err.is_rate_limited());
        assert!(EndpointError::Transport("Too Many Requests".into()).is_rate_limited());
        assert!(EndpointError::HttpStatus { status: 503, body: "request throttled".into() }
            .is_rate_limited());
    }

    #[test]
    fn other_errors_are_not_rate_limited() {
        assert!(!EndpointError::Rpc { rpc_code: 3, message: "execution reverted".into() }
            .is_rate_limited());
        assert!(!EndpointError::Transport("connection refused".into()).is_rate_limited());
        assert!(!EndpointError::BlockNotFound(7).is_rate_limited());
    }

    #[test]
    fn display_carries_code() {
        let err = EndpointError::BlockNotFound(7);
        assert_eq!(err.to_string(), "[ES-RPC-004] Block 7 not found");
        assert_eq!(format!("{err:?}"), err.to_string());
    }
}
