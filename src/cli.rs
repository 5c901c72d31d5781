// Copyright (c) 2026 Bilinear Labs
// SPDX-License-Identifier: MIT

//! Module that handles the command line interface.

use clap::Parser;

#[derive(Parser, Debug)]
#[command(author = "Bilinear Labs")]
#[command(version = "0.1.0")]
#[command(about = "Logsieve")]
#[command(long_about = "Per-network EVM event categorization engine")]
pub struct CategorizerArgs {
    #[arg(
        short,
        long,
        default_value = "logsieve.yaml",
        help = "Path to the configuration file.
            \nLists the networks to categorize, the seeded contracts and the metrics endpoint."
    )]
    pub config: String,
    #[arg(
        long,
        help = "Disable curve authentication on the block subscription.
            \nWhen absent, the subscribe key pair and the broadcaster's public key must be present in the configuration."
    )]
    pub plain: bool,
    #[arg(
        short,
        long,
        action = clap::ArgAction::Count,
        help = "Logging verbosity. Repeat for more detail: -v info, -vv debug, -vvv trace."
    )]
    pub verbosity: u8,
}
