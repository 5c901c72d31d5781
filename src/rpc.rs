// Copyright (c) 2026 Bilinear Labs
// SPDX-License-Identifier: MIT

//! Module with the blockchain client plumbing: RPC host parsing, provider
//! construction and the range-log query client.

use crate::{block::RawLog, constants};
use alloy::{
    primitives::Address,
    providers::{Provider, ProviderBuilder},
    rpc::{client::RpcClient, types::Filter},
    transports::{
        TransportError,
        http::reqwest::Url,
        layers::{RetryBackoffLayer, RetryPolicy},
    },
};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;

/// One blockchain RPC endpoint and the network it serves.
///
/// Built from a descriptor of the form
/// `<network_id>[:<username>:<password>]@<url>`, e.g.
/// `base:alice:hunter2@https://rpc.example.org:8545`.
#[derive(Debug, Clone)]
pub struct RpcHost {
    pub network_id: String,
    endpoint: Url,
    credentials: Option<(SecretString, SecretString)>,
}

impl RpcHost {
    /// The endpoint URL with the basic-auth credentials applied.
    pub fn endpoint(&self) -> Result<Url> {
        let mut url = self.endpoint.clone();
        if let Some((username, password)) = &self.credentials {
            if url.set_username(username.expose_secret()).is_err()
                || url.set_password(Some(password.expose_secret())).is_err()
            {
                return Err(anyhow!(
                    "the endpoint {} cannot carry basic-auth credentials",
                    self.endpoint
                ));
            }
        }
        Ok(url)
    }
}

impl std::str::FromStr for RpcHost {
    type Err = anyhow::Error;

    fn from_str(descriptor: &str) -> Result<Self, Self::Err> {
        // Everything after the last '@' is the endpoint, so passwords may
        // contain '@' without escaping. Credentials are kept out of error
        // messages.
        let (prefix, raw_endpoint) = descriptor.rsplit_once('@').ok_or_else(|| {
            anyhow!(
                "an RPC host descriptor needs the shape '<network_id>[:<username>:<password>]@<url>'"
            )
        })?;

        let mut fields = prefix.splitn(3, ':');
        let network_id = fields.next().unwrap_or_default().to_string();
        if network_id.is_empty() {
            return Err(anyhow!("the RPC host descriptor names no network id"));
        }
        let credentials = match (fields.next(), fields.next()) {
            (Some(username), Some(password)) => {
                Some((SecretString::from(username), SecretString::from(password)))
            }
            (Some(_), None) => {
                return Err(anyhow!(
                    "the RPC host descriptor names a username but no password"
                ));
            }
            _ => None,
        };

        let endpoint = Url::parse(raw_endpoint)
            .with_context(|| format!("'{raw_endpoint}' is not a valid endpoint URL"))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(anyhow!(
                "the endpoint '{raw_endpoint}' must use http or https"
            ));
        }

        Ok(Self {
            network_id,
            endpoint,
            credentials,
        })
    }
}

#[derive(Debug, Copy, Clone, Default)]
#[non_exhaustive]
pub struct AlwaysRetryPolicy;

impl RetryPolicy for AlwaysRetryPolicy {
    fn should_retry(&self, _error: &TransportError) -> bool {
        // Transient and permanent transport failures are indistinguishable
        // here; the drivers treat exhausted retries as transient anyway.
        true
    }

    fn backoff_hint(&self, _error: &TransportError) -> Option<std::time::Duration> {
        None
    }
}

/// Builds a retrying HTTP provider for the given host.
pub fn build_provider(host: &RpcHost) -> Result<Arc<dyn Provider + Send + Sync>> {
    let retry_policy = RetryBackoffLayer::new_with_policy(
        constants::DEFAULT_BACKOFF_MAX_RETRIES,
        constants::DEFAULT_BACKOFF_TIME,
        constants::DEFAULT_BACKOFF_CUP_SIZE,
        AlwaysRetryPolicy::default(),
    );

    let provider = ProviderBuilder::new()
        .connect_client(RpcClient::builder().layer(retry_policy).http(host.endpoint()?));

    Ok(Arc::new(provider))
}

/// Range-log query client used by the catch-up drivers.
#[async_trait]
pub trait LogClient: Send + Sync {
    /// Fetches the raw logs emitted by the given contracts in blocks at or
    /// after `from_block`, ordered by block then log index.
    async fn logs_from(&self, from_block: u64, addresses: &[Address]) -> Result<Vec<RawLog>>;
}

/// [`LogClient`] backed by an alloy provider, with a bounded look-ahead.
pub struct AlloyLogClient {
    provider: Arc<dyn Provider + Send + Sync>,
    block_range: u64,
}

impl AlloyLogClient {
    pub fn new(provider: Arc<dyn Provider + Send + Sync>, block_range: u64) -> Self {
        Self {
            provider,
            block_range,
        }
    }
}

#[async_trait]
impl LogClient for AlloyLogClient {
    async fn logs_from(&self, from_block: u64, addresses: &[Address]) -> Result<Vec<RawLog>> {
        let to_block = from_block.saturating_add(self.block_range.saturating_sub(1));
        let filter = Filter::new()
            .from_block(from_block)
            .to_block(to_block)
            .address(addresses.to_vec());

        let logs = self.provider.get_logs(&filter).await?;

        let mut raw: Vec<RawLog> = logs.iter().filter_map(RawLog::from_rpc).collect();
        raw.sort_by_key(|log| (log.block_number, log.log_index));
        Ok(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_host_with_credentials() {
        let host = "base:user:pass@http://localhost:9822"
            .parse::<RpcHost>()
            .expect("a well formed host must parse");
        assert_eq!(host.network_id, "base");

        let endpoint = host.endpoint().expect("the credentials must apply");
        assert_eq!(endpoint.host_str(), Some("localhost"));
        assert_eq!(endpoint.port(), Some(9822));
        assert_eq!(endpoint.username(), "user");
        assert_eq!(endpoint.password(), Some("pass"));
    }

    #[test]
    fn authless_hosts_keep_their_scheme_defaults() {
        let host = "1@https://rpc.example.org"
            .parse::<RpcHost>()
            .expect("an authless host must parse");

        let endpoint = host.endpoint().expect("there are no credentials to apply");
        assert_eq!(endpoint.username(), "");
        assert_eq!(endpoint.password(), None);
        assert_eq!(endpoint.port_or_known_default(), Some(443));
    }

    #[test]
    fn rejects_malformed_descriptors() {
        assert!(
            "http://localhost:9822".parse::<RpcHost>().is_err(),
            "a descriptor without a network id prefix must not parse"
        );
        assert!(
            "@http://localhost:9822".parse::<RpcHost>().is_err(),
            "an empty network id must not parse"
        );
        assert!(
            "1:user@http://localhost:9822".parse::<RpcHost>().is_err(),
            "a username without a password must not parse"
        );
        assert!(
            "1@ftp://localhost".parse::<RpcHost>().is_err(),
            "only http and https endpoints are supported"
        );
    }
}
