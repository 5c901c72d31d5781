// Copyright (c) 2026 Bilinear Labs
// SPDX-License-Identifier: MIT

//! Module with the per-contract worker and the ordered worker set.

use crate::{
    block::RawLog,
    contract::{CategorizedEvent, Smartcontract},
    decoder::EventDecoder,
};
use alloy::primitives::Address;
use tracing::warn;

/// Categorization worker for one tracked smart contract.
#[derive(Debug, Clone)]
pub struct Worker {
    pub smartcontract: Smartcontract,
    decoder: EventDecoder,
}

impl Worker {
    pub fn new(smartcontract: Smartcontract, decoder: EventDecoder) -> Self {
        Self {
            smartcontract,
            decoder,
        }
    }

    pub fn address(&self) -> Address {
        self.smartcontract.address
    }

    /// Progress watermark: the highest block already categorized.
    pub fn categorized_block_number(&self) -> u64 {
        self.smartcontract.categorized_block_number
    }

    /// Decodes a batch of raw logs and advances the progress watermark.
    ///
    /// # Description
    ///
    /// Only logs emitted by this worker's contract in blocks newer than the
    /// watermark survive the filter, which makes duplicate block delivery a
    /// no-op. A log that fails to decode is reported and dropped; the
    /// watermark still advances past its block. Returns the decoded events
    /// and the maximum block seen, which is the current watermark when the
    /// batch contained nothing new.
    pub fn categorize(&mut self, logs: &[RawLog]) -> (Vec<CategorizedEvent>, u64) {
        let cursor = self.smartcontract.categorized_block_number;
        let mut max_block = cursor;
        let mut max_timestamp = self.smartcontract.categorized_block_timestamp;
        let mut events = Vec::new();

        for log in logs {
            if log.address != self.smartcontract.address || log.block_number <= cursor {
                continue;
            }
            if log.block_number >= max_block {
                max_block = log.block_number;
                if log.block_timestamp != 0 {
                    max_timestamp = log.block_timestamp;
                }
            }
            match self.decoder.decode(log) {
                Ok(event) => events.push(event),
                Err(e) => warn!(
                    address = %self.smartcontract.address,
                    block_number = log.block_number,
                    "dropping a log that failed to decode: {e:#}"
                ),
            }
        }

        self.smartcontract.categorized_block_number = max_block;
        self.smartcontract.categorized_block_timestamp = max_timestamp;
        (events, max_block)
    }
}

/// An ordered collection of workers.
#[derive(Debug, Default)]
pub struct Workers(Vec<Worker>);

impl From<Vec<Worker>> for Workers {
    fn from(workers: Vec<Worker>) -> Self {
        Self(workers)
    }
}

impl Workers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push(&mut self, worker: Worker) {
        self.0.push(worker);
    }

    /// Moves every worker of `other` to the end of this set.
    pub fn append(&mut self, mut other: Workers) {
        self.0.append(&mut other.0);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Worker> {
        self.0.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Worker> {
        self.0.iter_mut()
    }

    /// Stable sort by progress watermark, then by address.
    ///
    /// The address tie-break keeps the iteration order deterministic for
    /// workers registered with the same recorded block.
    pub fn sort(mut self) -> Self {
        self.0.sort_by(|a, b| {
            a.categorized_block_number()
                .cmp(&b.categorized_block_number())
                .then_with(|| a.address().cmp(&b.address()))
        });
        self
    }

    /// Splits the set at a pivot block into `(behind, ahead)`.
    ///
    /// `behind` holds the workers whose watermark is strictly below the
    /// pivot, `ahead` everyone else. Order is preserved on both sides.
    pub fn split(self, pivot: u64) -> (Workers, Workers) {
        let (behind, ahead) = self
            .0
            .into_iter()
            .partition(|worker| worker.categorized_block_number() < pivot);
        (Workers(behind), Workers(ahead))
    }

    /// The lowest watermark across the set, `None` when the set is empty.
    pub fn earliest_block_number(&self) -> Option<u64> {
        self.0
            .iter()
            .map(Worker::categorized_block_number)
            .min()
    }

    /// Deduplicated member addresses, in set order.
    pub fn addresses(&self) -> Vec<Address> {
        let mut addresses: Vec<Address> = Vec::with_capacity(self.0.len());
        for worker in &self.0 {
            if !addresses.contains(&worker.address()) {
                addresses.push(worker.address());
            }
        }
        addresses
    }

    /// Flattened contract descriptors, used by introspection queries.
    pub fn smartcontracts(&self) -> Vec<Smartcontract> {
        self.0
            .iter()
            .map(|worker| worker.smartcontract.clone())
            .collect()
    }

    pub fn contains_address(&self, address: Address) -> bool {
        self.0.iter().any(|worker| worker.address() == address)
    }
}
