// Copyright (c) 2026 Bilinear Labs
// SPDX-License-Identifier: MIT

//! Module with the per-network producer of the live block broadcast.

use crate::{
    CancellationToken,
    block::{LiveBlock, RawLog},
    constants,
};
use alloy::{eips::BlockNumberOrTag, providers::Provider, rpc::types::Filter};
use anyhow::{Result, anyhow};
use futures::{StreamExt, stream};
use std::sync::Arc;
use tokio::{
    sync::broadcast,
    time::{Duration, sleep},
};
use tracing::{debug, info, warn};

/// Polls a provider for new heads and broadcasts them as live blocks.
///
/// # Description
///
/// The feed is the upstream end of the subscription: every new block is
/// serialized to a JSON envelope and published on the process wide broadcast
/// channel, where each manager's subscriber filters by network id. Block
/// payloads are fetched concurrently but always emitted in block order.
pub struct BlockFeed {
    network_id: String,
    provider: Arc<dyn Provider + Send + Sync>,
    broadcasts: broadcast::Sender<String>,
    poll_interval: u64,
    cancellation_token: CancellationToken,
}

impl BlockFeed {
    pub fn new(
        network_id: String,
        provider: Arc<dyn Provider + Send + Sync>,
        broadcasts: broadcast::Sender<String>,
        poll_interval: u64,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            network_id,
            provider,
            broadcasts,
            poll_interval,
            cancellation_token,
        }
    }

    pub async fn run(self) {
        let mut cancellation_receiver = self.cancellation_token.subscribe();

        info!(network_id = %self.network_id, "starting the block feed");

        let mut last_seen: u64 = 0;
        loop {
            tokio::select! {
                _ = cancellation_receiver.recv() => {
                    debug!("BlockFeed::Cancellation requested, shutting down gracefully...");
                    return;
                }
                _ = sleep(Duration::from_secs(self.poll_interval)) => {}
            }

            let head = match self
                .provider
                .get_block_by_number(BlockNumberOrTag::Latest)
                .await
            {
                Ok(Some(block)) => block.header.number,
                Ok(None) => {
                    warn!("the chain head is not available yet");
                    continue;
                }
                Err(e) => {
                    warn!("failed to fetch the chain head: {e}");
                    continue;
                }
            };

            // The first observed head becomes the starting point; everything
            // before it belongs to catch-up, not to the live feed.
            if last_seen == 0 {
                last_seen = head.saturating_sub(1);
            }
            if head <= last_seen {
                continue;
            }

            let provider = self.provider.clone();
            let network_id = self.network_id.clone();
            let mut envelopes = stream::iter((last_seen + 1)..=head)
                .map(|number| {
                    let provider = provider.clone();
                    let network_id = network_id.clone();
                    async move { fetch_block(provider, network_id, number).await }
                })
                .buffered(constants::MAX_CONCURRENT_REQUESTS);

            while let Some(result) = envelopes.next().await {
                match result {
                    Ok(block) => {
                        debug!(
                            block_number = block.block_number,
                            logs_amount = block.logs.len(),
                            "broadcasting a live block"
                        );
                        let number = block.block_number;
                        match serde_json::to_string(&block) {
                            Ok(raw) => {
                                // No subscriber is not an error for a broadcast.
                                let _ = self.broadcasts.send(raw);
                                last_seen = number;
                            }
                            Err(e) => warn!("failed to serialize a live block: {e}"),
                        }
                    }
                    Err(e) => {
                        warn!("failed to assemble a live block, retrying next poll: {e:#}");
                        break;
                    }
                }
            }
        }
    }
}

/// Fetches one block's timestamp and logs and builds its broadcast envelope.
async fn fetch_block(
    provider: Arc<dyn Provider + Send + Sync>,
    network_id: String,
    number: u64,
) -> Result<LiveBlock> {
    let block = provider
        .get_block_by_number(BlockNumberOrTag::Number(number))
        .await?
        .ok_or_else(|| anyhow!("block {number} is not available"))?;
    let block_timestamp = block.header.timestamp;

    let filter = Filter::new().from_block(number).to_block(number);
    let logs = provider.get_logs(&filter).await?;

    let logs = logs
        .iter()
        .filter_map(RawLog::from_rpc)
        .map(|mut log| {
            if log.block_timestamp == 0 {
                log.block_timestamp = block_timestamp;
            }
            log
        })
        .collect();

    Ok(LiveBlock {
        network_id,
        block_number: number,
        block_timestamp,
        logs,
    })
}
