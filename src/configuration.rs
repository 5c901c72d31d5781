// Copyright (c) 2026 Bilinear Labs
// SPDX-License-Identifier: MIT

//! Module that handles the configuration of the application.

use crate::{cli::CategorizerArgs, constants, error_codes, metrics::MetricsConfig};
use clap::Parser;
use config::{Config, ConfigError, Environment, File};
use secrecy::SecretString;
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, error};

/// Configuration as parsed from a file. Fields are optional to allow partial configs.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct FileConfiguration {
    #[serde(default)]
    pub networks: Vec<NetworkJob>,
    #[serde(default)]
    pub contracts: Vec<ContractJob>,
    pub metrics_address: Option<String>,
    pub metrics_port: Option<u16>,
    pub metrics_allow_origin: Option<String>,
    pub disable_metrics: Option<bool>,
    pub broadcast_public_key: Option<SecretString>,
    pub subscribe_public_key: Option<SecretString>,
    pub subscribe_secret_key: Option<SecretString>,
}

/// One blockchain network to categorize.
#[derive(Debug, Deserialize, Clone)]
pub struct NetworkJob {
    pub network_id: String,
    pub rpc_host: String,
    pub block_range: Option<u64>,
    pub poll_interval: Option<u64>,
}

/// A contract registered at startup, before any dynamic request arrives.
#[derive(Debug, Deserialize, Clone)]
pub struct ContractJob {
    pub network_id: String,
    pub address: String,
    pub abi_path: String,
    pub start_block: Option<u64>,
}

/// Authentication posture of the block subscription.
#[derive(Debug, Clone)]
pub enum SubscriptionAuth {
    /// `--plain` was given: the subscription transport runs unauthenticated.
    Plain,
    /// Curve key material taken from the service configuration.
    Curve {
        broadcast_public_key: SecretString,
        public_key: SecretString,
        secret_key: SecretString,
    },
}

/// Fully resolved configuration with all defaults applied.
#[derive(Debug, Clone)]
pub struct CategorizerConfiguration {
    pub networks: Vec<NetworkJob>,
    pub contracts: Vec<ContractJob>,
    pub metrics: MetricsConfig,
    pub auth: SubscriptionAuth,
    pub verbosity: u8,
}

impl CategorizerConfiguration {
    /// Build the categorizer configuration from CLI arguments.
    ///
    /// The configuration file is mandatory: it is the only place the tracked
    /// networks are described. CLI-only options (`verbosity`, `plain`) are
    /// always taken from the command line.
    ///
    /// # Panics
    ///
    /// This function will log an error and exit the process if the
    /// configuration file cannot be found, contains parsing errors or lacks
    /// the subscribe credentials while `--plain` is absent.
    pub fn from_args(args: CategorizerArgs) -> Self {
        debug!("Loading configuration from file: {}", args.config);
        let file_config = match FileConfiguration::load(&args.config) {
            Ok(config) => config,
            Err(e) => match e {
                ConfigError::NotFound(ref path) => {
                    error!("Configuration file not found: {}", path);
                    std::process::exit(error_codes::ERROR_CODE_CONFIGURATION_FILE_NOT_FOUND);
                }
                ConfigError::FileParse { ref uri, ref cause } => {
                    error!(
                        "Failed to parse configuration file: {}",
                        uri.as_deref().unwrap_or(&args.config)
                    );
                    error!("Parse error: {}", cause);
                    std::process::exit(
                        error_codes::ERROR_CODE_FAILED_TO_LOAD_CONFIGURATION_FROM_FILE,
                    );
                }
                _ => {
                    error!(
                        "Failed to load configuration from file '{}': {}",
                        args.config, e
                    );
                    std::process::exit(
                        error_codes::ERROR_CODE_FAILED_TO_LOAD_CONFIGURATION_FROM_FILE,
                    );
                }
            },
        };

        let Some(auth) = resolve_auth(args.plain, &file_config) else {
            error!(
                "The block subscription requires curve keys: set broadcast_public_key, subscribe_public_key and subscribe_secret_key in the configuration, or pass --plain to disable authentication."
            );
            std::process::exit(error_codes::ERROR_CODE_MISSING_SUBSCRIBE_CREDENTIALS);
        };

        // Resolve all fields with defaults
        Self {
            networks: file_config.networks,
            contracts: file_config.contracts,
            metrics: MetricsConfig {
                enabled: !file_config.disable_metrics.unwrap_or(false),
                address: file_config
                    .metrics_address
                    .unwrap_or_else(|| "127.0.0.1".to_string()),
                port: file_config
                    .metrics_port
                    .unwrap_or(constants::DEFAULT_METRICS_PORT),
                allow_origin: file_config.metrics_allow_origin,
            },
            auth,
            verbosity: args.verbosity,
        }
    }

    /// Parse CLI arguments and build the categorizer configuration.
    ///
    /// # Panics
    ///
    /// Same conditions as [`CategorizerConfiguration::from_args`].
    pub fn parse() -> Self {
        let args = CategorizerArgs::parse();
        Self::from_args(args)
    }
}

/// Resolves the subscription authentication posture.
///
/// Returns `None` when authentication is required but the key material is
/// incomplete.
fn resolve_auth(plain: bool, file_config: &FileConfiguration) -> Option<SubscriptionAuth> {
    if plain {
        return Some(SubscriptionAuth::Plain);
    }

    match (
        file_config.broadcast_public_key.clone(),
        file_config.subscribe_public_key.clone(),
        file_config.subscribe_secret_key.clone(),
    ) {
        (Some(broadcast_public_key), Some(public_key), Some(secret_key)) => {
            Some(SubscriptionAuth::Curve {
                broadcast_public_key,
                public_key,
                secret_key,
            })
        }
        _ => None,
    }
}

impl FileConfiguration {
    /// Load from a YAML/JSON file with a LOGSIEVE_* environment overlay.
    pub fn load(config_file: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from(Path::new(config_file)))
            .add_source(Environment::with_prefix("LOGSIEVE"))
            .build()?
            .try_deserialize()
    }
}
