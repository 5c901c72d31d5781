// Copyright (c) 2026 Bilinear Labs
// SPDX-License-Identifier: MIT
//
//! Prometheus metrics exporter and introspection endpoint.
use crate::contract::{ContractSource, Smartcontract};
use anyhow::{Context, Result};
use axum::{
    Router,
    body::Body,
    extract::State,
    http::{
        HeaderValue, StatusCode,
        header::{ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE},
    },
    response::{IntoResponse, Json, Response},
    routing::get,
};
use prometheus::{Encoder, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};
use serde::Serialize;
use std::{net::SocketAddr, sync::Arc};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Configuration for the Prometheus metrics server.
#[derive(Clone, Debug)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub address: String,
    pub port: u16,
    pub allow_origin: Option<String>,
}

#[derive(Clone, Default)]
pub struct MetricsHandle {
    inner: Option<Arc<MetricsInner>>,
}

#[derive(Clone)]
struct MetricsInner {
    registry: Registry,
    live_edge: IntGaugeVec,
    categorized_block: IntGaugeVec,
    dropped_blocks: IntCounterVec,
    allow_origin: Option<String>,
}

impl MetricsHandle {
    pub fn new(config: &MetricsConfig) -> Result<Self> {
        if !config.enabled {
            return Ok(Self { inner: None });
        }

        let registry = Registry::new_custom(Some("logsieve".to_string()), None)?;

        let live_edge = IntGaugeVec::new(
            Opts::new(
                "live_edge",
                "First block number observed from the live subscription of a network.",
            ),
            &["network_id"],
        )?;
        registry.register(Box::new(live_edge.clone()))?;

        let categorized_block = IntGaugeVec::new(
            Opts::new(
                "categorized_block",
                "Latest block categorized for a contract on a specific network.",
            ),
            &["network_id", "contract_address"],
        )?;
        registry.register(Box::new(categorized_block.clone()))?;

        let dropped_blocks = IntCounterVec::new(
            Opts::new(
                "dropped_blocks",
                "Subscribed blocks dropped because the block queue was full.",
            ),
            &["network_id"],
        )?;
        registry.register(Box::new(dropped_blocks.clone()))?;

        // Standard build info style metric: value is always 1.
        let build_info = IntGaugeVec::new(
            Opts::new("build_info", "Build information about the running binary."),
            &["version"],
        )?;
        build_info
            .with_label_values(&[env!("CARGO_PKG_VERSION")])
            .set(1);
        registry.register(Box::new(build_info.clone()))?;

        Ok(Self {
            inner: Some(Arc::new(MetricsInner {
                registry,
                live_edge,
                categorized_block,
                dropped_blocks,
                allow_origin: config.allow_origin.clone(),
            })),
        })
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    #[inline]
    pub fn record_live_edge(&self, network_id: &str, block: u64) {
        if let Some(inner) = &self.inner {
            inner
                .live_edge
                .with_label_values(&[network_id])
                .set(block as i64);
        }
    }

    #[inline]
    pub fn record_categorized_block(&self, network_id: &str, contract: &str, block: u64) {
        if let Some(inner) = &self.inner {
            inner
                .categorized_block
                .with_label_values(&[network_id, contract])
                .set(block as i64);
        }
    }

    #[inline]
    pub fn record_dropped_block(&self, network_id: &str) {
        if let Some(inner) = &self.inner {
            inner.dropped_blocks.with_label_values(&[network_id]).inc();
        }
    }

    /// Serves `/metrics` plus the `/contracts` introspection route.
    pub async fn serve(
        &self,
        config: MetricsConfig,
        sources: Vec<Arc<dyn ContractSource>>,
    ) -> Result<Option<JoinHandle<()>>> {
        let Some(inner) = self.inner.clone() else {
            return Ok(None);
        };

        let addr: SocketAddr = format!("{}:{}", config.address, config.port).parse()?;
        let state = MetricsState {
            registry: inner.registry.clone(),
            allow_origin: inner.allow_origin.clone(),
            sources: Arc::new(sources),
        };

        let app = Router::new()
            .route("/metrics", get(metrics_handler))
            .route("/contracts", get(contracts_handler))
            .with_state(state);

        let handle = tokio::spawn(async move {
            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .unwrap_or_else(|_| panic!("Failed to bind metrics server to {addr}"));
            info!(
                "Metrics server listening on {}",
                listener.local_addr().expect("listener has a local address")
            );

            axum::serve(listener, app)
                .await
                .unwrap_or_else(|e| panic!("Metrics server error: {e}"));
        });

        Ok(Some(handle))
    }
}

#[derive(Clone)]
struct MetricsState {
    registry: Registry,
    allow_origin: Option<String>,
    sources: Arc<Vec<Arc<dyn ContractSource>>>,
}

#[derive(Serialize)]
struct ContractsResponse {
    contracts: Vec<Smartcontract>,
}

/// GET handler for /contracts.
///
/// Lists every smart contract currently tracked by the managers of this
/// process, catch-up and current alike.
async fn contracts_handler(State(state): State<MetricsState>) -> Json<ContractsResponse> {
    let contracts = state
        .sources
        .iter()
        .flat_map(|source| source.smartcontracts())
        .collect();
    Json(ContractsResponse { contracts })
}

/// GET handler for /metrics.
///
/// Renders the registry in the Prometheus text exposition format.
async fn metrics_handler(State(state): State<MetricsState>) -> Response {
    let body = match encode_registry(&state.registry) {
        Ok(body) => body,
        Err(e) => {
            error!("could not render the metrics page: {e:#}");
            return (StatusCode::INTERNAL_SERVER_ERROR, "metrics are unavailable").into_response();
        }
    };

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, TextEncoder::new().format_type());
    if let Some(origin) = state.allow_origin.as_deref() {
        match HeaderValue::from_str(origin) {
            Ok(value) => builder = builder.header(ACCESS_CONTROL_ALLOW_ORIGIN, value),
            Err(_) => warn!(origin, "ignoring a CORS origin that is not a valid header value"),
        }
    }

    builder.body(Body::from(body)).unwrap_or_else(|e| {
        error!("could not assemble the metrics response: {e}");
        (StatusCode::INTERNAL_SERVER_ERROR, "metrics are unavailable").into_response()
    })
}

/// Serializes every registered metric family.
fn encode_registry(registry: &Registry) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&registry.gather(), &mut buffer)
        .context("failed to encode the metric families")?;
    Ok(buffer)
}
