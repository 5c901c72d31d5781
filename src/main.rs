// Copyright (c) 2026 Bilinear Labs
// SPDX-License-Identifier: MIT

use anyhow::Result;
use logsieve::{CategorizerApp, configuration::CategorizerConfiguration, telemetry};

#[tokio::main]
async fn main() -> Result<()> {
    let configuration = CategorizerConfiguration::parse();

    telemetry::setup_tracing(configuration.verbosity)?;

    let app = CategorizerApp::build_app(configuration)?;
    app.run().await
}
