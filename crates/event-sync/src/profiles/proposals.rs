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

//! Multi-signature timelock proposals.

use alloy::{
    primitives::{Address, B256},
    rpc::types::Log,
    sol,
    sol_types::{SolCall, SolEvent},
};
use serde_json::Value;

use crate::{
    multicall::MulticallCall,
    profile::{
        address_value, b256_value, field_b256, u256_value, DecodeError, DetailCall, EventProfile,
        ReturnDecoder,
    },
    record::{EventRecord, Fields},
};

sol! {
    interface IProposalTimelock {
        event ProposalCreated(
            bytes32 indexed operationId,
            address indexed proposer,
            address target,
            uint256 value,
            bytes data,
            uint256 eta
        );

        function operationState(bytes32 operationId) external view returns (uint8);
        function signatureCount(bytes32 operationId) external view returns (uint256);
    }
}

pub const STATE_FIELD: &str = "state";
pub const SIGNATURES_FIELD: &str = "signatureCount";

const OPERATION_STATE: &str = "operationState";
const SIGNATURE_COUNT: &str = "signatureCount";

/// Lifecycle of a timelock operation as reported by `operationState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    Pending,
    Ready,
    Executed,
    Expired,
    Cancelled,
}

impl OperationState {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Pending),
            1 => Some(Self::Ready),
            2 => Some(Self::Executed),
            3 => Some(Self::Expired),
            4 => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        [Self::Pending, Self::Ready, Self::Executed, Self::Expired, Self::Cancelled]
            .into_iter()
            .find(|state| state.as_str() == name)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Ready => "Ready",
            Self::Executed => "Executed",
            Self::Expired => "Expired",
            Self::Cancelled => "Cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Executed | Self::Expired | Self::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProposalsProfile;

impl ReturnDecoder for ProposalsProfile {
    fn decode_return(&self, method: &str, data: &[u8]) -> Option<Value> {
        match method {
            OPERATION_STATE => {
                let raw = IProposalTimelock::operationStateCall::abi_decode_returns(data).ok()?;
                match OperationState::from_u8(raw) {
                    Some(state) => Some(Value::from(state.as_str())),
                    None => Some(Value::from(raw)),
                }
            }
            SIGNATURE_COUNT => IProposalTimelock::signatureCountCall::abi_decode_returns(data)
                .ok()
                .map(u256_value),
            _ => None,
        }
    }
}

impl EventProfile for ProposalsProfile {
    fn name(&self) -> &'static str {
        "proposals"
    }

    fn event_signature(&self) -> B256 {
        IProposalTimelock::ProposalCreated::SIGNATURE_HASH
    }

    fn decode_log(&self, log: &Log) -> Result<Fields, DecodeError> {
        let event = log.log_decode::<IProposalTimelock::ProposalCreated>()?.inner.data;
        let mut fields = Fields::new();
        fields.insert("operationId".into(), b256_value(event.operationId));
        fields.insert("proposer".into(), address_value(event.proposer));
        fields.insert("target".into(), address_value(event.target));
        fields.insert("value".into(), u256_value(event.value));
        fields.insert("data".into(), Value::String(event.data.to_string()));
        fields.insert("eta".into(), u256_value(event.eta));
        Ok(fields)
    }

    fn primary_key(&self, fields: &Fields) -> Option<String> {
        fields.get("operationId")?.as_str().map(str::to_owned)
    }

    fn is_terminal(&self, record: &EventRecord) -> bool {
        record
            .fields
            .get(STATE_FIELD)
            .and_then(Value::as_str)
            .and_then(OperationState::parse)
            .is_some_and(|state| state.is_terminal())
    }

    fn detail_calls(&self, contract: Address, record: &EventRecord) -> Vec<DetailCall> {
        let Some(operation_id) = field_b256(&record.fields, "operationId") else {
            return Vec::new();
        };
        vec![
            DetailCall {
                method: OPERATION_STATE,
                call: MulticallCall::new(
                    contract,
                    &IProposalTimelock::operationStateCall { operationId: operation_id },
                ),
            },
            DetailCall {
                method: SIGNATURE_COUNT,
                call: MulticallCall::new(
                    contract,
                    &IProposalTimelock::signatureCountCall { operationId: operation_id },
                ),
            },
        ]
    }

    fn field_for(&self, method: &str) -> Option<&'static str> {
        match method {
            OPERATION_STATE => Some(STATE_FIELD),
            SIGNATURE_COUNT => Some(SIGNATURES_FIELD),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::make_log;
    use alloy::{
        primitives::{address, Bytes, U256},
        sol_types::SolValue,
    };

    const CONTRACT: Address = address!("0x0000000000000000000000000000000000001234");

    fn proposal(id: u8) -> IProposalTimelock::ProposalCreated {
        IProposalTimelock::ProposalCreated {
            operationId: B256::with_last_byte(id),
            proposer: address!("0x00000000000000000000000000000000000000aa"),
            target: address!("0x00000000000000000000000000000000000000bb"),
            value: U256::from(7),
            data: Bytes::from(vec![0xde, 0xad]),
            eta: U256::from(1_700_000_000u64),
        }
    }

    #[test]
    fn decodes_created_log() {
        let log = make_log(CONTRACT, &proposal(1), 100, 2);
        let record = ProposalsProfile.record_from_log(&log).unwrap().unwrap();

        assert_eq!(record.primary_key, B256::with_last_byte(1).to_string());
        assert_eq!(record.block_number, 100);
        assert_eq!(record.log_index, 2);
        assert_eq!(record.fields["value"], Value::from("7"));
        assert_eq!(record.fields["data"], Value::from("0xdead"));
        assert!(!record.terminal);
    }

    #[test]
    fn decodes_operation_state() {
        let executed = U256::from(2u8).abi_encode();
        assert_eq!(
            ProposalsProfile.decode_return(OPERATION_STATE, &executed),
            Some(Value::from("Executed"))
        );
        let unknown = U256::from(9u8).abi_encode();
        assert_eq!(ProposalsProfile.decode_return(OPERATION_STATE, &unknown), Some(Value::from(9)));
        assert_eq!(ProposalsProfile.decode_return(OPERATION_STATE, &[]), None);
        assert_eq!(ProposalsProfile.decode_return("unknown", &executed), None);
    }

    #[test]
    fn terminal_states() {
        let log = make_log(CONTRACT, &proposal(1), 100, 0);
        let mut record = ProposalsProfile.record_from_log(&log).unwrap().unwrap();
        for (state, terminal) in [
            ("Pending", false),
            ("Ready", false),
            ("Executed", true),
            ("Expired", true),
            ("Cancelled", true),
        ] {
            record.fields.insert(STATE_FIELD.into(), Value::from(state));
            assert_eq!(ProposalsProfile.is_terminal(&record), terminal, "{state}");
        }
        assert!(OperationState::Cancelled.is_terminal());
    }

    #[test]
    fn two_detail_calls_per_record() {
        let log = make_log(CONTRACT, &proposal(3), 100, 0);
        let record = ProposalsProfile.record_from_log(&log).unwrap().unwrap();
        let calls = ProposalsProfile.detail_calls(CONTRACT, &record);
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].method, OPERATION_STATE);
        assert_eq!(calls[0].call.target, CONTRACT);
        assert_eq!(
            calls[1].call.call_data,
            Bytes::from(
                IProposalTimelock::signatureCountCall { operationId: B256::with_last_byte(3) }
                    .abi_encode()
            )
        );
    }
}
