// Copyright (c) 2026 Bilinear Labs
// SPDX-License-Identifier: MIT

//! Module with the task that consumes the live block broadcast.

use crate::{CancellationToken, block::LiveBlock, manager::ManagerShared};
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, error, info, warn};

/// Consumer of the block broadcast for one network.
///
/// # Description
///
/// The subscriber performs no decoding. It parses each broadcast message,
/// drops anything addressed to another network, records the live edge from
/// the first accepted block and enqueues the rest onto the manager's block
/// queue. Its only suspension point is the broadcast receive.
pub struct Subscriber {
    shared: Arc<ManagerShared>,
    broadcasts: broadcast::Receiver<String>,
    cancellation_token: CancellationToken,
}

impl Subscriber {
    pub fn new(
        shared: Arc<ManagerShared>,
        broadcasts: broadcast::Receiver<String>,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            shared,
            broadcasts,
            cancellation_token,
        }
    }

    pub async fn run(mut self) {
        let mut cancellation_receiver = self.cancellation_token.subscribe();

        info!(
            network_id = %self.shared.network_id,
            "waiting for subscribed blocks"
        );

        loop {
            let message = tokio::select! {
                _ = cancellation_receiver.recv() => {
                    debug!("Subscriber::Cancellation requested, shutting down gracefully...");
                    return;
                }
                message = self.broadcasts.recv() => message,
            };

            match message {
                Ok(raw) => {
                    if let Err(e) = self.handle_message(&raw) {
                        error!("failed to access the manager state: {e:#}");
                        self.cancellation_token.graceful_shutdown();
                        return;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "subscriber lagged behind the block broadcast");
                }
                Err(RecvError::Closed) => {
                    info!("block broadcast closed, subscriber exiting");
                    return;
                }
            }
        }
    }

    /// Applies one broadcast message to the manager state.
    ///
    /// Malformed messages and blocks for other networks are skipped; the
    /// stream continues. Only a poisoned state lock is an error.
    fn handle_message(&self, raw: &str) -> Result<()> {
        let block: LiveBlock = match serde_json::from_str(raw) {
            Ok(block) => block,
            Err(e) => {
                warn!("skipping an unparsable broadcast message: {e}");
                return Ok(());
            }
        };

        if block.network_id != self.shared.network_id {
            warn!(
                network_id = %block.network_id,
                manager_network_id = %self.shared.network_id,
                "skipping a block broadcast for another network"
            );
            return Ok(());
        }

        let mut state = self.shared.lock()?;

        if state.live_edge == 0 {
            state.live_edge = block.block_number;
            self.shared
                .metrics
                .record_live_edge(&self.shared.network_id, block.block_number);
            info!(
                block_number = block.block_number,
                "live edge set from the first subscribed block"
            );
        } else if block.block_number < state.live_edge {
            // Late delivery from before the subscription settled.
            return Ok(());
        }

        debug!(
            block_number = block.block_number,
            logs_amount = block.logs.len(),
            "add a block to consume"
        );

        if !state.block_queue.push(block) {
            self.shared
                .metrics
                .record_dropped_block(&self.shared.network_id);
            debug!("block queue full, dropping the newest block");
        }

        Ok(())
    }
}
