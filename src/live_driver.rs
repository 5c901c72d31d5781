// Copyright (c) 2026 Bilinear Labs
// SPDX-License-Identifier: MIT

//! Module with the task that applies queued live blocks to current workers.

use crate::{
    CancellationToken, TxCategorized, constants, contract::CategorizedPush,
    manager::ManagerShared,
};
use anyhow::Result;
use std::sync::Arc;
use tokio::time::{Duration, sleep};
use tracing::{debug, error, info};

/// Consumer of the block queue for the caught-up workers of one manager.
///
/// # Description
///
/// The driver ticks once per second. On every tick it drains the queue one
/// block at a time and lets every current worker categorize the blocks it has
/// not seen yet, pushing one downstream message per worker and block. For a
/// single worker, blocks are applied in the order they leave the queue; there
/// is no ordering guarantee across workers.
pub struct LiveDriver {
    shared: Arc<ManagerShared>,
    sink: TxCategorized,
    cancellation_token: CancellationToken,
}

impl LiveDriver {
    pub fn new(
        shared: Arc<ManagerShared>,
        sink: TxCategorized,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            shared,
            sink,
            cancellation_token,
        }
    }

    pub async fn run(self) {
        let mut cancellation_receiver = self.cancellation_token.subscribe();

        info!(
            network_id = %self.shared.network_id,
            "starting to consume subscribed blocks"
        );

        loop {
            tokio::select! {
                _ = cancellation_receiver.recv() => {
                    debug!("LiveDriver::Cancellation requested, shutting down gracefully...");
                    return;
                }
                _ = sleep(Duration::from_secs(constants::LIVE_DRIVE_INTERVAL)) => {}
            }

            // Drain whatever accumulated since the last tick.
            loop {
                let pushes = match self.next_block_pushes() {
                    Ok(Some(pushes)) => pushes,
                    Ok(None) => break,
                    Err(e) => {
                        error!("failed to access the manager state: {e:#}");
                        self.cancellation_token.graceful_shutdown();
                        return;
                    }
                };

                for push in pushes {
                    debug!("send a notification to the downstream categorizer");
                    if self.sink.send(push).await.is_err() {
                        // Events cannot be dropped; losing the channel is fatal.
                        error!("downstream push channel closed, terminating the manager");
                        self.cancellation_token.graceful_shutdown();
                        return;
                    }
                }
            }
        }
    }

    /// Pops one block and categorizes it with every current worker.
    ///
    /// Returns `None` when there is nothing to do on this tick. The push
    /// messages are built under the state lock and sent after releasing it.
    fn next_block_pushes(&self) -> Result<Option<Vec<CategorizedPush>>> {
        let mut state = self.shared.lock()?;

        if state.current_workers.is_empty() {
            return Ok(None);
        }
        let Some(block) = state.block_queue.pop() else {
            return Ok(None);
        };

        let mut pushes = Vec::new();
        for worker in state.current_workers.iter_mut() {
            if block.block_number <= worker.categorized_block_number() {
                continue;
            }

            let logs = block.logs_for(worker.address());
            let (events, recent_block_number) = worker.categorize(&logs);

            self.shared.metrics.record_categorized_block(
                &self.shared.network_id,
                &worker.address().to_string(),
                recent_block_number,
            );
            debug!(
                address = %worker.address(),
                block_number = block.block_number,
                logs_amount = events.len(),
                "categorized a smartcontract"
            );

            pushes.push(CategorizedPush {
                smartcontracts: vec![worker.smartcontract.clone()],
                logs: events,
            });
        }

        Ok(Some(pushes))
    }
}
