// Copyright (c) 2026 Bilinear Labs
// SPDX-License-Identifier: MIT

//! Module with utilities for testing.

use crate::{
    block::{LiveBlock, RawLog},
    contract::Smartcontract,
    decoder::EventDecoder,
    worker::Worker,
};
use alloy::{
    json_abi::Event,
    primitives::{Address, B256, Bytes, U256},
};
use fake::{Fake, Faker};
use serde_json::{Value, json};
use std::str::FromStr;

/// Generates a random Ethereum address (20 bytes).
pub fn fake_address() -> Address {
    let bytes: [u8; 20] = Faker.fake();
    Address::from(bytes)
}

/// Encodes an address as an indexed event topic.
pub fn address_topic(address: Address) -> B256 {
    B256::left_padding_from(address.as_slice())
}

/// ERC20 Transfer event
pub fn transfer_event() -> Event {
    Event::from_str("event Transfer(address indexed from, address indexed to, uint256 value)")
        .expect("failed to parse Transfer event")
}

/// ERC20 Approval event
pub fn approval_event() -> Event {
    Event::from_str("event Approval(address indexed owner, address indexed spender, uint256 value)")
        .expect("failed to parse Approval event")
}

/// The raw JSON of a minimal ERC20 ABI, as a registration request carries it.
pub fn erc20_abi_json() -> Value {
    json!([
        {
            "type": "event",
            "name": "Transfer",
            "anonymous": false,
            "inputs": [
                { "indexed": true, "internalType": "address", "name": "from", "type": "address" },
                { "indexed": true, "internalType": "address", "name": "to", "type": "address" },
                { "indexed": false, "internalType": "uint256", "name": "value", "type": "uint256" }
            ]
        },
        {
            "type": "event",
            "name": "Approval",
            "anonymous": false,
            "inputs": [
                { "indexed": true, "internalType": "address", "name": "owner", "type": "address" },
                { "indexed": true, "internalType": "address", "name": "spender", "type": "address" },
                { "indexed": false, "internalType": "uint256", "name": "value", "type": "uint256" }
            ]
        }
    ])
}

/// A well formed Transfer log emitted by `contract` at `block_number`.
pub fn transfer_log(contract: Address, block_number: u64, value: u64) -> RawLog {
    RawLog {
        address: contract,
        topics: vec![
            transfer_event().selector(),
            address_topic(fake_address()),
            address_topic(fake_address()),
        ],
        data: Bytes::from(U256::from(value).to_be_bytes_vec()),
        block_number,
        block_timestamp: 1_700_000_000 + block_number,
        transaction_index: 0,
        log_index: 0,
    }
}

/// A Transfer log whose data payload is too short to decode.
pub fn truncated_transfer_log(contract: Address, block_number: u64) -> RawLog {
    RawLog {
        data: Bytes::from(vec![0x12, 0x34]),
        ..transfer_log(contract, block_number, 0)
    }
}

/// A subscribed block carrying the given logs.
pub fn live_block(network_id: &str, block_number: u64, logs: Vec<RawLog>) -> LiveBlock {
    LiveBlock {
        network_id: network_id.to_string(),
        block_number,
        block_timestamp: 1_700_000_000 + block_number,
        logs,
    }
}

/// A worker tracking `address` with its watermark at `block_number`.
pub fn worker_at(address: Address, block_number: u64) -> Worker {
    let decoder = EventDecoder::from_json(&erc20_abi_json()).expect("the fixture ABI must parse");
    Worker::new(
        Smartcontract {
            network_id: "1".to_string(),
            address,
            categorized_block_number: block_number,
            categorized_block_timestamp: 0,
        },
        decoder,
    )
}
