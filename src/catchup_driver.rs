// Copyright (c) 2026 Bilinear Labs
// SPDX-License-Identifier: MIT

//! Module with the per-group task that catches outdated workers up to the
//! live edge.

use crate::{
    CancellationToken, TxCategorized,
    block::RawLog,
    constants,
    contract::CategorizedPush,
    group::GroupId,
    manager::ManagerShared,
    rpc::LogClient,
};
use alloy::primitives::Address;
use anyhow::Result;
use std::sync::Arc;
use tokio::time::{Duration, sleep};
use tracing::{debug, error, info, warn};

/// Catch-up loop for one group of outdated workers.
///
/// # Description
///
/// Every pass range-queries the logs from the group cursor forward for the
/// union of ALL addresses tracked by the manager: range queries are the
/// expensive network operation and one query serves as many workers as
/// possible. Logs for contracts outside the group are discarded by the
/// per-worker address filter. A failed query is retried on the next pass
/// without advancing the cursor. When the cursor reaches the live edge the
/// whole group is promoted into the current set and the driver exits.
pub struct CatchUpDriver {
    shared: Arc<ManagerShared>,
    group_id: GroupId,
    client: Arc<dyn LogClient>,
    sink: TxCategorized,
    cancellation_token: CancellationToken,
}

impl CatchUpDriver {
    pub fn new(
        shared: Arc<ManagerShared>,
        group_id: GroupId,
        client: Arc<dyn LogClient>,
        sink: TxCategorized,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            shared,
            group_id,
            client,
            sink,
            cancellation_token,
        }
    }

    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(self) {
        info!(
            network_id = %self.shared.network_id,
            group_id = self.group_id,
            "starting categorization of old smartcontracts"
        );

        loop {
            if self.cancellation_token.is_cancelled() {
                return;
            }

            let snapshot = match self.snapshot() {
                Ok(Some(snapshot)) => snapshot,
                Ok(None) => {
                    debug!(group_id = self.group_id, "catch-up group is gone");
                    return;
                }
                Err(e) => {
                    error!("failed to access the manager state: {e:#}");
                    self.cancellation_token.graceful_shutdown();
                    return;
                }
            };
            let (from_block, addresses) = snapshot;

            debug!(
                from_block,
                addresses_amount = addresses.len(),
                "fetching logs for the catch-up group"
            );

            let logs = match self.client.logs_from(from_block, &addresses).await {
                Ok(logs) => logs,
                Err(e) => {
                    warn!(
                        from_block,
                        "SKIP, the range query failed for this pass: {e:#}"
                    );
                    sleep(Duration::from_secs(constants::CATCHUP_RETRY_INTERVAL)).await;
                    continue;
                }
            };

            debug!(logs_amount = logs.len(), "fetched logs from the blockchain client");

            let (pushes, caught_up) = match self.apply(logs) {
                Ok(Some(outcome)) => outcome,
                Ok(None) => {
                    debug!(group_id = self.group_id, "catch-up group is gone");
                    return;
                }
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

            if caught_up {
                info!(group_id = self.group_id, "caught the current blocks");
                return;
            }
        }
    }

    /// The next range query bounds: cursor + 1 and every tracked address.
    fn snapshot(&self) -> Result<Option<(u64, Vec<Address>)>> {
        let state = self.shared.lock()?;
        let Some(group) = state.old_groups.iter().find(|g| g.id() == self.group_id) else {
            return Ok(None);
        };
        Ok(Some((group.block_number + 1, state.all_addresses())))
    }

    /// Categorizes one range-query response and advances the group cursor.
    ///
    /// When the cursor meets the live edge the group members are moved into
    /// the current worker set (under the same lock, so they appear there
    /// exactly once) and the group is removed.
    fn apply(&self, logs: Vec<RawLog>) -> Result<Option<(Vec<CategorizedPush>, bool)>> {
        let mut state = self.shared.lock()?;
        let live_edge = state.live_edge;

        let mut pushes = Vec::new();
        let caught_up = {
            let Some(group) = state.old_groups.get_mut(self.group_id) else {
                return Ok(None);
            };

            let from_block = group.block_number + 1;
            let mut block_number_to = from_block;

            for worker in group.workers.iter_mut() {
                let worker_logs: Vec<RawLog> = logs
                    .iter()
                    .filter(|log| log.address == worker.address())
                    .cloned()
                    .collect();
                if worker_logs.is_empty() {
                    continue;
                }

                let (events, recent_block_number) = worker.categorize(&worker_logs);
                block_number_to = block_number_to.max(recent_block_number);

                self.shared.metrics.record_categorized_block(
                    &self.shared.network_id,
                    &worker.address().to_string(),
                    recent_block_number,
                );

                pushes.push(CategorizedPush {
                    smartcontracts: vec![worker.smartcontract.clone()],
                    logs: events,
                });
            }

            // The cursor never regresses, even on an empty pass.
            group.block_number = group.block_number.max(block_number_to);
            group.block_number >= live_edge
        };

        if caught_up {
            if let Some(group) = state.old_groups.remove(self.group_id) {
                state.current_workers.append(group.workers);
            }
        }

        Ok(Some((pushes, caught_up)))
    }
}
