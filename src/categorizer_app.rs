// Copyright (c) 2026 Bilinear Labs
// SPDX-License-Identifier: MIT

//! Module that wires the managers, block feeds and downstream writer.

use crate::{
    CancellationToken, TxRegistration,
    block_feed::BlockFeed,
    configuration::{CategorizerConfiguration, ContractJob, SubscriptionAuth},
    constants,
    contract::{ContractSource, Smartcontract, TrackRequest},
    manager::Manager,
    metrics::MetricsHandle,
    rpc::{AlloyLogClient, LogClient, RpcHost, build_provider},
    sink::run_downstream_writer,
};
use alloy::primitives::Address;
use anyhow::{Context, Result};
use serde_json::Value;
use std::{collections::HashMap, sync::Arc};
use tokio::{
    signal::ctrl_c,
    sync::{broadcast, mpsc},
};
use tracing::{error, info, warn};

pub struct CategorizerApp {
    configuration: CategorizerConfiguration,
    cancellation_token: CancellationToken,
}

impl CategorizerApp {
    /// Builds a new instance of the categorizer app from the resolved
    /// configuration.
    pub fn build_app(configuration: CategorizerConfiguration) -> Result<Self> {
        if configuration.networks.is_empty() {
            anyhow::bail!(
                "No networks configured. Add at least one entry under 'networks' in the configuration file."
            );
        }

        match &configuration.auth {
            SubscriptionAuth::Plain => {
                warn!("curve authentication disabled on the block subscription")
            }
            SubscriptionAuth::Curve { .. } => {
                info!("curve authentication keys loaded for the block subscription")
            }
        }

        Ok(Self {
            configuration,
            cancellation_token: CancellationToken::default(),
        })
    }

    /// Runs the categorizer app.
    pub async fn run(&self) -> Result<()> {
        let metrics = MetricsHandle::new(&self.configuration.metrics)?;

        // Buffer between every worker and the downstream writer.
        let (push_tx, push_rx) = mpsc::channel(constants::DEFAULT_PUSH_BUFFER);
        let (broadcast_tx, _) = broadcast::channel(constants::DEFAULT_BROADCAST_BUFFER);

        let mut registration_handles: HashMap<String, TxRegistration> = HashMap::new();
        let mut sources: Vec<Arc<dyn ContractSource>> = Vec::new();
        let mut manager_handles = Vec::new();

        for network in &self.configuration.networks {
            let host: RpcHost = network.rpc_host.parse().with_context(|| {
                format!("invalid RPC host for the network {}", network.network_id)
            })?;
            if host.network_id != network.network_id {
                anyhow::bail!(
                    "The RPC host '{}' does not belong to the network {}",
                    network.rpc_host,
                    network.network_id
                );
            }

            let provider = build_provider(&host)?;
            let client: Arc<dyn LogClient> = Arc::new(AlloyLogClient::new(
                provider.clone(),
                network.block_range.unwrap_or(constants::DEFAULT_BLOCK_RANGE),
            ));

            let (registration_tx, registration_rx) =
                mpsc::channel(constants::DEFAULT_REGISTRATION_BUFFER);

            let manager = Manager::new(
                network.network_id.clone(),
                broadcast_tx.subscribe(),
                registration_rx,
                client,
                push_tx.clone(),
                metrics.clone(),
                self.cancellation_token.clone(),
            );
            sources.push(manager.shared());

            info!(network_id = %network.network_id, "spawning the categorization manager");
            manager_handles.push(tokio::spawn(manager.run()));

            let feed = BlockFeed::new(
                network.network_id.clone(),
                provider,
                broadcast_tx.clone(),
                network
                    .poll_interval
                    .unwrap_or(constants::DEFAULT_FEED_POLL_INTERVAL),
                self.cancellation_token.clone(),
            );
            tokio::spawn(feed.run());

            registration_handles.insert(network.network_id.clone(), registration_tx);
        }

        metrics
            .serve(self.configuration.metrics.clone(), sources)
            .await
            .with_context(|| "Failure in the metrics server")?;

        tokio::spawn(run_downstream_writer(
            push_rx,
            self.cancellation_token.clone(),
        ));

        self.seed_contracts(&registration_handles).await?;

        info!("Starting the categorization of events");

        // Spawn a task that handles Ctrl+C and signals the managers.
        let ctrl_c_task = Self::spawn_ctrl_c_handler(self.cancellation_token.clone());

        for handle in manager_handles {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("a categorization manager failed: {e:#}"),
                Err(e) => error!("a categorization manager panicked: {e}"),
            }
        }

        ctrl_c_task.abort();
        info!("Shutdown complete");

        Ok(())
    }

    /// Turns the configured contracts into registration requests, one per
    /// network, and sends them through the same endpoint dynamic requests
    /// use.
    async fn seed_contracts(
        &self,
        registration_handles: &HashMap<String, TxRegistration>,
    ) -> Result<()> {
        let mut requests: HashMap<String, TrackRequest> = HashMap::new();

        for job in &self.configuration.contracts {
            if !registration_handles.contains_key(&job.network_id) {
                warn!(
                    network_id = %job.network_id,
                    address = %job.address,
                    "skipping a seeded contract for an unconfigured network"
                );
                continue;
            }
            let (smartcontract, abi) = match seeded_pair(job) {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(
                        address = %job.address,
                        "skipping an unusable seeded contract: {e:#}"
                    );
                    continue;
                }
            };

            let request = requests
                .entry(job.network_id.clone())
                .or_insert_with(|| TrackRequest {
                    smartcontracts: Vec::new(),
                    abis: Vec::new(),
                });
            request.smartcontracts.push(smartcontract);
            request.abis.push(abi);
        }

        for (network_id, request) in requests {
            if let Some(handle) = registration_handles.get(&network_id) {
                info!(
                    network_id = %network_id,
                    amount = request.smartcontracts.len(),
                    "registering the seeded contracts"
                );
                if handle.send(request).await.is_err() {
                    anyhow::bail!("The registration endpoint of the network {network_id} is gone");
                }
            }
        }

        Ok(())
    }

    fn spawn_ctrl_c_handler(cancellation_token: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            ctrl_c().await.ok();
            warn!("Received Ctrl+C, shutting down gracefully...");
            // Signal cancellation to every manager task
            cancellation_token.graceful_shutdown();
        })
    }
}

/// Builds the descriptor/ABI pair for one seeded contract.
fn seeded_pair(job: &ContractJob) -> Result<(Smartcontract, Value)> {
    let address: Address = job
        .address
        .parse()
        .with_context(|| format!("invalid contract address {}", job.address))?;
    let raw = std::fs::read_to_string(&job.abi_path)
        .with_context(|| format!("failed to read the ABI file {}", job.abi_path))?;
    let abi: Value = serde_json::from_str(&raw)
        .with_context(|| format!("the ABI file {} is not valid JSON", job.abi_path))?;

    Ok((
        Smartcontract {
            network_id: job.network_id.clone(),
            address,
            categorized_block_number: job.start_block.unwrap_or(0),
            categorized_block_timestamp: 0,
        },
        abi,
    ))
}
