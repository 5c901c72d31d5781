// Copyright (c) 2026 Bilinear Labs
// SPDX-License-Identifier: MIT

//! Module with the smart contract descriptor and the messages exchanged with
//! the registration endpoint and the downstream aggregator.

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Descriptor of a tracked smart contract.
///
/// # Description
///
/// A contract is identified by `(network_id, address)`. Within one manager the
/// network id is constant and the address is unique; two workers for the same
/// address never coexist. `categorized_block_number` is the progress
/// watermark: the highest block whose logs have already been categorized for
/// this contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Smartcontract {
    pub network_id: String,
    pub address: Address,
    #[serde(default)]
    pub categorized_block_number: u64,
    #[serde(default)]
    pub categorized_block_timestamp: u64,
}

/// Request received by a manager's registration endpoint.
///
/// `abis` is positionally aligned with `smartcontracts`: the i-th ABI
/// describes the i-th contract. ABIs travel as raw JSON so that a single
/// malformed descriptor only skips its own pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackRequest {
    pub smartcontracts: Vec<Smartcontract>,
    pub abis: Vec<Value>,
}

/// One decoded event, ready for the downstream aggregator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorizedEvent {
    pub block_number: u64,
    pub block_timestamp: u64,
    pub address: Address,
    pub event_name: String,
    pub args: Map<String, Value>,
}

/// Message pushed downstream for every categorized worker batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorizedPush {
    pub smartcontracts: Vec<Smartcontract>,
    pub logs: Vec<CategorizedEvent>,
}

/// Anything that can enumerate the contracts it currently tracks.
///
/// Implemented by the manager shared state and consumed by the introspection
/// endpoint of the metrics server.
pub trait ContractSource: Send + Sync {
    fn smartcontracts(&self) -> Vec<Smartcontract>;
}
