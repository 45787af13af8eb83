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

//! Token locks that have been closed and may still hold a withdrawable balance.

use alloy::{
    primitives::{Address, B256, U256},
    rpc::types::Log,
    sol,
    sol_types::{SolCall, SolEvent},
};
use serde_json::Value;

use crate::{
    multicall::MulticallCall,
    profile::{
        address_value, field_u256, u256_value, DecodeError, DetailCall, EventProfile,
        ReturnDecoder,
    },
    record::{EventRecord, Fields},
};

sol! {
    interface ITokenLocker {
        event LockClosed(
            uint256 indexed lockId,
            address indexed owner,
            address token,
            uint256 amount,
            uint64 unlockTime
        );

        function lockStatus(uint256 lockId) external view returns (uint8);
        function previewWithdrawable(uint256 lockId) external view returns (uint256);
    }
}

pub const STATUS_FIELD: &str = "status";
pub const WITHDRAWABLE_FIELD: &str = "withdrawable";

const LOCK_STATUS: &str = "lockStatus";
const PREVIEW_WITHDRAWABLE: &str = "previewWithdrawable";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockStatus {
    Active,
    Closed,
    Withdrawn,
    Retracted,
}

impl LockStatus {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Active),
            1 => Some(Self::Closed),
            2 => Some(Self::Withdrawn),
            3 => Some(Self::Retracted),
            _ => None,
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        [Self::Active, Self::Closed, Self::Withdrawn, Self::Retracted]
            .into_iter()
            .find(|status| status.as_str() == name)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "Active",
            Self::Closed => "Closed",
            Self::Withdrawn => "Withdrawn",
            Self::Retracted => "Retracted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Withdrawn | Self::Retracted)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LocksProfile;

impl ReturnDecoder for LocksProfile {
    fn decode_return(&self, method: &str, data: &[u8]) -> Option<Value> {
        match method {
            LOCK_STATUS => {
                let raw = ITokenLocker::lockStatusCall::abi_decode_returns(data).ok()?;
                match LockStatus::from_u8(raw) {
                    Some(status) => Some(Value::from(status.as_str())),
                    None => Some(Value::from(raw)),
                }
            }
            PREVIEW_WITHDRAWABLE => {
                ITokenLocker::previewWithdrawableCall::abi_decode_returns(data).ok().map(u256_value)
            }
            _ => None,
        }
    }
}

impl EventProfile for LocksProfile {
    fn name(&self) -> &'static str {
        "locks"
    }

    fn event_signature(&self) -> B256 {
        ITokenLocker::LockClosed::SIGNATURE_HASH
    }

    fn decode_log(&self, log: &Log) -> Result<Fields, DecodeError> {
        let event = log.log_decode::<ITokenLocker::LockClosed>()?.inner.data;
        let mut fields = Fields::new();
        fields.insert("lockId".into(), u256_value(event.lockId));
        fields.insert("owner".into(), address_value(event.owner));
        fields.insert("token".into(), address_value(event.token));
        fields.insert("amount".into(), u256_value(event.amount));
        fields.insert("unlockTime".into(), Value::from(event.unlockTime));
        Ok(fields)
    }

    fn primary_key(&self, fields: &Fields) -> Option<String> {
        fields.get("lockId")?.as_str().map(str::to_owned)
    }

    fn is_terminal(&self, record: &EventRecord) -> bool {
        record
            .fields
            .get(STATUS_FIELD)
            .and_then(Value::as_str)
            .and_then(LockStatus::parse)
            .is_some_and(|status| status.is_terminal())
    }

    fn detail_calls(&self, contract: Address, record: &EventRecord) -> Vec<DetailCall> {
        let Some(lock_id) = field_u256(&record.fields, "lockId") else {
            return Vec::new();
        };
        vec![
            DetailCall {
                method: LOCK_STATUS,
                call: MulticallCall::new(contract, &ITokenLocker::lockStatusCall { lockId: lock_id }),
            },
            DetailCall {
                method: PREVIEW_WITHDRAWABLE,
                call: MulticallCall::new(
                    contract,
                    &ITokenLocker::previewWithdrawableCall { lockId: lock_id },
                ),
            },
        ]
    }

    fn field_for(&self, method: &str) -> Option<&'static str> {
        match method {
            LOCK_STATUS => Some(STATUS_FIELD),
            PREVIEW_WITHDRAWABLE => Some(WITHDRAWABLE_FIELD),
            _ => None,
        }
    }
}

/// Withdrawable balance of a hydrated lock record.
pub fn withdrawable(record: &EventRecord) -> Option<U256> {
    field_u256(&record.fields, WITHDRAWABLE_FIELD)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::make_log;
    use alloy::{primitives::address, sol_types::SolValue};

    const CONTRACT: Address = address!("0x0000000000000000000000000000000000005678");

    fn closed(id: u64) -> ITokenLocker::LockClosed {
        ITokenLocker::LockClosed {
            lockId: U256::from(id),
            owner: address!("0x00000000000000000000000000000000000000aa"),
            token: address!("0x00000000000000000000000000000000000000cc"),
            amount: U256::from(10u128.pow(21)),
            unlockTime: 1_800_000_000,
        }
    }

    #[test]
    fn decodes_closed_log() {
        let log = make_log(CONTRACT, &closed(42), 77, 1);
        let record = LocksProfile.record_from_log(&log).unwrap().unwrap();
        assert_eq!(record.primary_key, "42");
        assert_eq!(record.fields["amount"], Value::from("1000000000000000000000"));
        assert_eq!(record.fields["unlockTime"], Value::from(1_800_000_000u64));
    }

    #[test]
    fn hydrated_fields() {
        let status = LocksProfile.decode_return(LOCK_STATUS, &U256::from(3u8).abi_encode());
        assert_eq!(status, Some(Value::from("Retracted")));
        let amount = LocksProfile.decode_return(PREVIEW_WITHDRAWABLE, &U256::from(55).abi_encode());
        assert_eq!(amount, Some(Value::from("55")));

        let log = make_log(CONTRACT, &closed(1), 77, 0);
        let mut record = LocksProfile.record_from_log(&log).unwrap().unwrap();
        record.fields.insert(STATUS_FIELD.into(), status.unwrap());
        record.fields.insert(WITHDRAWABLE_FIELD.into(), amount.unwrap());
        assert!(LocksProfile.is_terminal(&record));
        assert_eq!(withdrawable(&record), Some(U256::from(55)));
    }

    #[test]
    fn closed_lock_is_not_terminal() {
        let log = make_log(CONTRACT, &closed(1), 77, 0);
        let mut record = LocksProfile.record_from_log(&log).unwrap().unwrap();
        record.fields.insert(STATUS_FIELD.into(), Value::from(LockStatus::Closed.as_str()));
        assert!(!LocksProfile.is_terminal(&record));
    }

    #[test]
    fn malformed_log_is_rejected() {
        let mut log = make_log(CONTRACT, &closed(1), 77, 0);
        log.inner.data = alloy::primitives::LogData::new_unchecked(vec![], Default::default());
        assert!(LocksProfile.record_from_log(&log).is_err());
    }
}
