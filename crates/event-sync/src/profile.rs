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

//! Per-contract behavior plugged into the generic scan and hydration pipeline.

use alloy::{
    primitives::{Address, B256, U256},
    rpc::types::Log,
};
use serde_json::Value;
use thiserror::Error;

use crate::{
    errors::{impl_coded_debug, CodedError},
    multicall::MulticallCall,
    record::{EventRecord, Fields},
};

#[derive(Error)]
pub enum DecodeError {
    #[error("{code} Failed to decode log: {0}", code = self.code())]
    Abi(#[from] alloy::sol_types::Error),

    #[error("{code} Decoded log has no primary key", code = self.code())]
    MissingKey,
}

impl_coded_debug!(DecodeError);

impl CodedError for DecodeError {
    fn code(&self) -> &str {
        match self {
            DecodeError::Abi(_) => "[ES-DEC-001]",
            DecodeError::MissingKey => "[ES-DEC-002]",
        }
    }
}

/// A detail call for one record, tagged with the field it populates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailCall {
    pub method: &'static str,
    pub call: MulticallCall,
}

/// Decodes the raw return data of a detail call into a field value.
pub trait ReturnDecoder: Send + Sync {
    /// Returns `None` when the data does not decode for `method`.
    fn decode_return(&self, method: &str, data: &[u8]) -> Option<Value>;
}

/// Describes how to scan, key and hydrate the events of one contract type.
pub trait EventProfile: ReturnDecoder {
    /// Short identifier, also used in log messages and cache keys.
    fn name(&self) -> &'static str;

    /// Topic0 of the scanned event.
    fn event_signature(&self) -> B256;

    /// Decodes a raw log into record fields.
    fn decode_log(&self, log: &Log) -> Result<Fields, DecodeError>;

    /// Extracts the primary key from decoded fields.
    fn primary_key(&self, fields: &Fields) -> Option<String>;

    /// True if the record can no longer change on-chain.
    fn is_terminal(&self, record: &EventRecord) -> bool;

    /// Per-record detail reads used to hydrate mutable state.
    fn detail_calls(&self, contract: Address, record: &EventRecord) -> Vec<DetailCall>;

    /// Record field populated by the result of the given detail method.
    fn field_for(&self, method: &str) -> Option<&'static str>;

    /// Builds a record from a raw log. Logs without position metadata are rejected.
    fn record_from_log(&self, log: &Log) -> Result<Option<EventRecord>, DecodeError> {
        let (Some(block_number), Some(tx_hash), Some(log_index)) =
            (log.block_number, log.transaction_hash, log.log_index)
        else {
            return Ok(None);
        };
        let fields = self.decode_log(log)?;
        let primary_key = self.primary_key(&fields).ok_or(DecodeError::MissingKey)?;
        let mut record = EventRecord {
            primary_key,
            block_number,
            tx_hash,
            log_index,
            fields,
            terminal: false,
            timestamp: None,
        };
        record.terminal = self.is_terminal(&record);
        Ok(Some(record))
    }
}

/// JSON representation of a uint256. Decimal string so it survives JSON number precision limits.
pub fn u256_value(value: U256) -> Value {
    Value::String(value.to_string())
}

pub fn address_value(value: Address) -> Value {
    Value::String(value.to_string())
}

pub fn b256_value(value: B256) -> Value {
    Value::String(value.to_string())
}

/// Reads back a field written by [u256_value].
pub fn field_u256(fields: &Fields, name: &str) -> Option<U256> {
    fields.get(name)?.as_str()?.parse().ok()
}

/// Reads back a field written by [b256_value].
pub fn field_b256(fields: &Fields, name: &str) -> Option<B256> {
    fields.get(name)?.as_str()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_read_back() {
        let mut fields = Fields::new();
        fields.insert("amount".into(), u256_value(U256::from(1_000_000_000_000_000_000u128)));
        fields.insert("id".into(), b256_value(B256::with_last_byte(9)));
        assert_eq!(fields["amount"], Value::from("1000000000000000000"));
        assert_eq!(field_u256(&fields, "amount"), Some(U256::from(1_000_000_000_000_000_000u128)));
        assert_eq!(field_b256(&fields, "id"), Some(B256::with_last_byte(9)));
        assert_eq!(field_u256(&fields, "missing"), None);
    }
}
