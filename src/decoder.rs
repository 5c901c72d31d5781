// Copyright (c) 2026 Bilinear Labs
// SPDX-License-Identifier: MIT

//! Module that turns raw logs into categorized events using a contract ABI.

use crate::{block::RawLog, contract::CategorizedEvent};
use alloy::{
    dyn_abi::{DecodedEvent, DynSolValue, EventExt},
    json_abi::{Event, JsonAbi},
    primitives::B256,
};
use anyhow::{Context, Result, anyhow};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Decoder for the events declared in one contract's ABI.
///
/// Anonymous events carry no selector topic and cannot be matched back to
/// their descriptor, so they are not indexed here.
#[derive(Debug, Clone)]
pub struct EventDecoder {
    events: HashMap<B256, Event>,
}

impl EventDecoder {
    pub fn from_abi(abi: &JsonAbi) -> Self {
        let events = abi
            .events()
            .filter(|event| !event.anonymous)
            .map(|event| (event.selector(), event.clone()))
            .collect();
        Self { events }
    }

    /// Builds a decoder from the raw JSON of a contract ABI.
    pub fn from_json(raw: &Value) -> Result<Self> {
        let abi: JsonAbi =
            serde_json::from_value(raw.clone()).context("failed to parse the contract ABI")?;
        Ok(Self::from_abi(&abi))
    }

    /// Number of decodable events declared by the ABI.
    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Decodes a single raw log into a categorized event.
    pub fn decode(&self, log: &RawLog) -> Result<CategorizedEvent> {
        let topic0 = log
            .topics
            .first()
            .ok_or_else(|| anyhow!("log carries no topics"))?;
        let event = self
            .events
            .get(topic0)
            .ok_or_else(|| anyhow!("no event in the ABI matches the selector {topic0}"))?;

        let DecodedEvent { indexed, body, .. } = event
            .decode_log_parts(log.topics.iter().copied(), &log.data)
            .with_context(|| format!("failed to decode a {} log", event.name))?;

        let mut args = Map::new();
        let mut indexed_values = indexed.into_iter();
        let mut body_values = body.into_iter();
        for (position, input) in event.inputs.iter().enumerate() {
            let value = if input.indexed {
                indexed_values.next()
            } else {
                body_values.next()
            };
            let Some(value) = value else {
                return Err(anyhow!(
                    "decoded values do not cover the input {position} of {}",
                    event.name
                ));
            };
            let name = if input.name.is_empty() {
                format!("arg{position}")
            } else {
                input.name.clone()
            };
            args.insert(name, dyn_sol_value_to_json(&value));
        }

        Ok(CategorizedEvent {
            block_number: log.block_number,
            block_timestamp: log.block_timestamp,
            address: log.address,
            event_name: event.name.to_string(),
            args,
        })
    }
}

/// Renders a decoded Solidity value as JSON.
///
/// Numeric values are rendered as decimal strings: uint256 does not fit a
/// JSON number.
fn dyn_sol_value_to_json(value: &DynSolValue) -> Value {
    match value {
        DynSolValue::Address(a) => Value::String(a.to_string()),
        DynSolValue::Bool(b) => Value::Bool(*b),
        DynSolValue::Int(i, _) => Value::String(i.to_string()),
        DynSolValue::Uint(u, _) => Value::String(u.to_string()),
        DynSolValue::String(s) => Value::String(s.clone()),
        DynSolValue::FixedBytes(bytes, size) => {
            Value::String(format!("0x{}", hex::encode(&bytes[..(*size).min(32)])))
        }
        DynSolValue::Bytes(bytes) => Value::String(format!("0x{}", hex::encode(bytes))),
        DynSolValue::Array(items) | DynSolValue::FixedArray(items) | DynSolValue::Tuple(items) => {
            Value::Array(items.iter().map(dyn_sol_value_to_json).collect())
        }
        other => Value::String(format!("{other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{erc20_abi_json, fake_address, transfer_log, truncated_transfer_log};

    #[test]
    fn decodes_a_transfer_log() {
        let decoder =
            EventDecoder::from_json(&erc20_abi_json()).expect("the fixture ABI must parse");
        assert_eq!(decoder.event_count(), 2);

        let contract = fake_address();
        let event = decoder
            .decode(&transfer_log(contract, 42, 1000))
            .expect("a well formed transfer log must decode");

        assert_eq!(event.event_name, "Transfer");
        assert_eq!(event.block_number, 42);
        assert_eq!(event.address, contract);
        assert_eq!(event.args.get("value"), Some(&Value::String("1000".into())));
        assert!(event.args.contains_key("from"));
        assert!(event.args.contains_key("to"));
    }

    #[test]
    fn unknown_selector_is_an_error() {
        let decoder =
            EventDecoder::from_json(&erc20_abi_json()).expect("the fixture ABI must parse");

        let mut log = transfer_log(fake_address(), 1, 1);
        log.topics[0] = B256::repeat_byte(0xab);

        let err = decoder
            .decode(&log)
            .expect_err("a selector outside the ABI must not decode");
        assert!(err.to_string().contains("no event in the ABI"));
    }

    #[test]
    fn malformed_payload_is_an_error() {
        let decoder =
            EventDecoder::from_json(&erc20_abi_json()).expect("the fixture ABI must parse");

        decoder
            .decode(&truncated_transfer_log(fake_address(), 1))
            .expect_err("a truncated data payload must not decode");
    }

    #[test]
    fn log_without_topics_is_an_error() {
        let decoder =
            EventDecoder::from_json(&erc20_abi_json()).expect("the fixture ABI must parse");

        let mut log = transfer_log(fake_address(), 1, 1);
        log.topics.clear();

        let err = decoder
            .decode(&log)
            .expect_err("a log without topics must not decode");
        assert!(err.to_string().contains("no topics"));
    }
}
