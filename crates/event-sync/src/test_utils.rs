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

//! Scriptable in-memory chain used by unit and integration tests.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};

use alloy::{
    primitives::{keccak256, Address, Bytes, LogData, B256, U256},
    rpc::types::Log,
    sol_types::{SolCall, SolEvent, SolValue},
};
use async_trait::async_trait;
use serde_json::Value;

use crate::{
    endpoint::{ChainEndpoint, EndpointError},
    multicall::IMulticall3,
    profile::ReturnDecoder,
};

/// Seconds since epoch of block zero on the mock chain. Blocks are 12 seconds apart.
pub const GENESIS_TIMESTAMP: u64 = 1_700_000_000;

/// Deterministic transaction hash for a log position.
pub fn tx_hash(block: u64, log_index: u64) -> B256 {
    keccak256([block.to_be_bytes(), log_index.to_be_bytes()].concat())
}

/// Builds a mined RPC log carrying `event`.
pub fn make_log<E: SolEvent>(address: Address, event: &E, block: u64, log_index: u64) -> Log {
    make_raw_log(address, event.encode_log_data(), block, log_index)
}

fn make_raw_log(address: Address, data: LogData, block: u64, log_index: u64) -> Log {
    Log {
        inner: alloy::primitives::Log { address, data },
        block_hash: Some(keccak256(block.to_be_bytes())),
        block_number: Some(block),
        block_timestamp: None,
        transaction_hash: Some(tx_hash(block, log_index)),
        transaction_index: Some(0),
        log_index: Some(log_index),
        removed: false,
    }
}

fn reverted() -> EndpointError {
    EndpointError::Rpc { rpc_code: 3, message: "execution reverted".into() }
}

#[derive(Default)]
struct MockState {
    head: u64,
    logs: Vec<Log>,
    code: HashMap<Address, Bytes>,
    responses: HashMap<(Address, Bytes), Bytes>,
    multicall: Option<Address>,
    aggregator_fails: bool,
    get_logs_failures: VecDeque<EndpointError>,
    get_code_failures: VecDeque<EndpointError>,
    missing_blocks: HashSet<u64>,
}

/// In-memory [ChainEndpoint].
///
/// Logs are filtered exactly as a node would (address, topic0 and inclusive range). Calls are
/// answered from a table keyed by target and calldata; calls with no entry revert. A Multicall3
/// deployment can be simulated, in which case `aggregate3` calls are dispatched to the same table.
#[derive(Default)]
pub struct MockEndpoint {
    chain_id: u64,
    state: Mutex<MockState>,
    get_logs_calls: AtomicUsize,
    calls: AtomicUsize,
    timestamp_calls: AtomicUsize,
}

impl MockEndpoint {
    pub fn new(chain_id: u64) -> Self {
        Self { chain_id, ..Default::default() }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub fn set_head(&self, head: u64) {
        self.state().head = head;
    }

    pub fn push_event<E: SolEvent>(&self, address: Address, event: &E, block: u64, log_index: u64) {
        self.push_log(make_log(address, event, block, log_index));
    }

    /// Pushes a log carrying only `topic0` and no data, which no profile can decode.
    pub fn push_raw_log(&self, address: Address, topic0: B256, block: u64, log_index: u64) {
        let data = LogData::new_unchecked(vec![topic0], Bytes::new());
        self.push_log(make_raw_log(address, data, block, log_index));
    }

    pub fn push_log(&self, log: Log) {
        self.state().logs.push(log);
    }

    pub fn deploy_multicall(&self, address: Address) {
        let mut state = self.state();
        state.code.insert(address, Bytes::from_static(&[0x60, 0x80]));
        state.multicall = Some(address);
    }

    /// Makes every `aggregate3` call revert.
    pub fn set_aggregator_failure(&self, fails: bool) {
        self.state().aggregator_fails = fails;
    }

    pub fn set_call_response<C: SolCall>(&self, target: Address, call: &C, response: Vec<u8>) {
        let key = (target, Bytes::from(call.abi_encode()));
        self.state().responses.insert(key, response.into());
    }

    pub fn remove_call_response<C: SolCall>(&self, target: Address, call: &C) {
        let key = (target, Bytes::from(call.abi_encode()));
        self.state().responses.remove(&key);
    }

    /// Queues `count` failures returned by the next `get_logs` calls.
    pub fn fail_next_get_logs(&self, count: usize, err: impl Fn() -> EndpointError) {
        let mut state = self.state();
        for _ in 0..count {
            state.get_logs_failures.push_back(err());
        }
    }

    /// Queues `count` failures returned by the next `get_code` calls.
    pub fn fail_next_get_code(&self, count: usize, err: impl Fn() -> EndpointError) {
        let mut state = self.state();
        for _ in 0..count {
            state.get_code_failures.push_back(err());
        }
    }

    pub fn set_block_missing(&self, block: u64) {
        self.state().missing_blocks.insert(block);
    }

    pub fn get_logs_count(&self) -> usize {
        self.get_logs_calls.load(Ordering::SeqCst)
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn timestamp_count(&self) -> usize {
        self.timestamp_calls.load(Ordering::SeqCst)
    }

    pub fn reset_counters(&self) {
        self.get_logs_calls.store(0, Ordering::SeqCst);
        self.calls.store(0, Ordering::SeqCst);
        self.timestamp_calls.store(0, Ordering::SeqCst);
    }

    fn aggregate(&self, state: &MockState, data: &[u8]) -> Result<Bytes, EndpointError> {
        if state.aggregator_fails {
            return Err(reverted());
        }
        let request = IMulticall3::aggregate3Call::abi_decode(data)
            .map_err(|err| EndpointError::Rpc { rpc_code: -32602, message: err.to_string() })?;

        let mut results = Vec::with_capacity(request.calls.len());
        for call in request.calls {
            match state.responses.get(&(call.target, call.callData.clone())) {
                Some(data) => {
                    results.push(IMulticall3::Call3Result { success: true, returnData: data.clone() })
                }
                None if call.allowFailure => results
                    .push(IMulticall3::Call3Result { success: false, returnData: Bytes::new() }),
                None => return Err(reverted()),
            }
        }
        Ok(IMulticall3::aggregate3Call::abi_encode_returns(&results).into())
    }
}

#[async_trait]
impl ChainEndpoint for MockEndpoint {
    async fn chain_id(&self) -> Result<u64, EndpointError> {
        Ok(self.chain_id)
    }

    async fn block_number(&self) -> Result<u64, EndpointError> {
        Ok(self.state().head)
    }

    async fn get_logs(
        &self,
        address: Address,
        topic0: B256,
        from: u64,
        to: u64,
    ) -> Result<Vec<Log>, EndpointError> {
        self.get_logs_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state();
        if let Some(err) = state.get_logs_failures.pop_front() {
            return Err(err);
        }
        Ok(state
            .logs
            .iter()
            .filter(|log| {
                let block = log.block_number.unwrap_or_default();
                log.inner.address == address
                    && log.inner.data.topics().first() == Some(&topic0)
                    && (from..=to).contains(&block)
            })
            .cloned()
            .collect())
    }

    async fn block_timestamp(&self, number: u64) -> Result<u64, EndpointError> {
        self.timestamp_calls.fetch_add(1, Ordering::SeqCst);
        if self.state().missing_blocks.contains(&number) {
            return Err(EndpointError::BlockNotFound(number));
        }
        Ok(GENESIS_TIMESTAMP + number * 12)
    }

    async fn get_code(&self, address: Address) -> Result<Bytes, EndpointError> {
        let mut state = self.state();
        if let Some(err) = state.get_code_failures.pop_front() {
            return Err(err);
        }
        Ok(state.code.get(&address).cloned().unwrap_or_default())
    }

    async fn call(&self, target: Address, data: Bytes) -> Result<Bytes, EndpointError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state();
        if state.multicall == Some(target) {
            return self.aggregate(&state, &data);
        }
        state.responses.get(&(target, data)).cloned().ok_or_else(reverted)
    }
}

/// Decodes `count` as a uint256 rendered as a decimal string.
pub struct TestReturnDecoder;

impl ReturnDecoder for TestReturnDecoder {
    fn decode_return(&self, method: &str, data: &[u8]) -> Option<Value> {
        match method {
            "count" => U256::abi_decode(data).ok().map(|value| Value::String(value.to_string())),
            _ => None,
        }
    }
}
