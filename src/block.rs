// Copyright (c) 2026 Bilinear Labs
// SPDX-License-Identifier: MIT

//! Module with the raw log and live block data types.

use alloy::{
    primitives::{Address, B256, Bytes},
    rpc::types::Log,
};
use serde::{Deserialize, Serialize};

/// A raw, undecoded event log as served by the blockchain client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: u64,
    #[serde(default)]
    pub block_timestamp: u64,
    #[serde(default)]
    pub transaction_index: u64,
    #[serde(default)]
    pub log_index: u64,
}

impl RawLog {
    /// Converts an RPC log into a [`RawLog`].
    ///
    /// Pending logs carry no block number and are discarded.
    pub fn from_rpc(log: &Log) -> Option<Self> {
        let block_number = log.block_number?;
        Some(Self {
            address: log.address(),
            topics: log.topics().to_vec(),
            data: log.data().data.clone(),
            block_number,
            block_timestamp: log.block_timestamp.unwrap_or_default(),
            transaction_index: log.transaction_index.unwrap_or_default(),
            log_index: log.log_index.unwrap_or_default(),
        })
    }
}

/// One block received from the live subscription.
///
/// Also the wire format of the broadcast: feeds serialize a `LiveBlock` to a
/// JSON string and subscribers parse it back, skipping anything addressed to
/// another network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveBlock {
    pub network_id: String,
    pub block_number: u64,
    pub block_timestamp: u64,
    pub logs: Vec<RawLog>,
}

impl LiveBlock {
    /// Returns the logs emitted by the given contract in this block.
    pub fn logs_for(&self, address: Address) -> Vec<RawLog> {
        self.logs
            .iter()
            .filter(|log| log.address == address)
            .cloned()
            .collect()
    }
}
