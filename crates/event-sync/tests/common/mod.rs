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

use std::sync::Arc;

use alloy::{
    primitives::{address, Address, U256},
    sol_types::SolValue,
};
use event_sync::{
    cache::{KvStore, MemoryKvStore},
    profiles::{locks::ITokenLocker, LocksProfile},
    test_utils::MockEndpoint,
    SyncConfig, SyncCoordinator,
};

pub const CONTRACT: Address = address!("0x0000000000000000000000000000000000005678");
pub const DEPLOYMENT_BLOCK: u64 = 100;

pub const CLOSED: u8 = 1;
pub const WITHDRAWN: u8 = 2;

pub fn test_config() -> SyncConfig {
    let mut config = SyncConfig::default();
    config.scan.chunk_size = 100;
    config.scan.chunk_pause_ms = 0;
    config.scan.reorg_buffer = 12;
    config.retry.base_delay_ms = 0;
    config.retry.max_jitter_ms = 0;
    config.page.page_size = 10;
    config
}

/// A chain with the lock contract and a multicall aggregator deployed.
pub fn chain(head: u64) -> Arc<MockEndpoint> {
    let endpoint = MockEndpoint::new(1);
    endpoint.set_head(head);
    endpoint.deploy_multicall(event_sync::multicall::MULTICALL3_ADDRESS);
    Arc::new(endpoint)
}

/// Emits a `LockClosed` event and sets the lock's live status.
pub fn close_lock(endpoint: &MockEndpoint, id: u64, block: u64, status: u8) {
    let event = ITokenLocker::LockClosed {
        lockId: U256::from(id),
        owner: Address::ZERO,
        token: Address::ZERO,
        amount: U256::from(id * 1_000),
        unlockTime: 0,
    };
    endpoint.push_event(CONTRACT, &event, block, 0);
    set_status(endpoint, id, status);
}

pub fn set_status(endpoint: &MockEndpoint, id: u64, status: u8) {
    endpoint.set_call_response(
        CONTRACT,
        &ITokenLocker::lockStatusCall { lockId: U256::from(id) },
        U256::from(status).abi_encode(),
    );
    let withdrawable = if status == WITHDRAWN { U256::ZERO } else { U256::from(id * 1_000) };
    endpoint.set_call_response(
        CONTRACT,
        &ITokenLocker::previewWithdrawableCall { lockId: U256::from(id) },
        withdrawable.abi_encode(),
    );
}

pub fn memory_store() -> Arc<dyn KvStore> {
    Arc::new(MemoryKvStore::default())
}

pub async fn coordinator(
    endpoint: Arc<MockEndpoint>,
    store: Arc<dyn KvStore>,
    config: &SyncConfig,
) -> SyncCoordinator<MockEndpoint> {
    SyncCoordinator::connect(
        endpoint,
        Arc::new(LocksProfile),
        CONTRACT,
        DEPLOYMENT_BLOCK,
        store,
        config,
    )
    .await
    .unwrap()
}
