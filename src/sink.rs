// Copyright (c) 2026 Bilinear Labs
// SPDX-License-Identifier: MIT

//! Module with the process end of the downstream push channel.

use crate::{CancellationToken, RxCategorized};
use tracing::{debug, error, info};

/// Drains the push channel and writes each message as one JSON line.
///
/// The aggregator itself is an external system; this writer is the transport
/// stand-in that keeps the channel flowing and makes the output consumable by
/// anything that reads line delimited JSON.
pub async fn run_downstream_writer(
    mut pushes: RxCategorized,
    cancellation_token: CancellationToken,
) {
    let mut cancellation_receiver = cancellation_token.subscribe();

    info!("downstream writer started");

    loop {
        let push = tokio::select! {
            _ = cancellation_receiver.recv() => {
                debug!("DownstreamWriter::Cancellation requested, shutting down gracefully...");
                return;
            }
            push = pushes.recv() => push,
        };

        match push {
            Some(push) => match serde_json::to_string(&push) {
                Ok(line) => println!("{line}"),
                Err(e) => error!("failed to serialize a categorized push: {e}"),
            },
            None => {
                info!("push channel closed, downstream writer exiting");
                return;
            }
        }
    }
}
