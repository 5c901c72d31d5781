// Copyright (c) 2026 Bilinear Labs
// SPDX-License-Identifier: MIT

//! Library of the Logsieve crate.
//!
//! One [`manager::Manager`] per blockchain network consumes raw on-chain
//! event logs, decodes them against the tracked contracts' ABIs and pushes
//! the categorized events to a downstream aggregator.

pub mod block;
pub mod block_feed;
pub mod block_queue;
pub mod catchup_driver;
pub mod categorizer_app;
pub mod cli;
pub mod configuration;
pub mod constants;
pub mod contract;
pub mod decoder;
pub mod error_codes;
pub mod group;
pub mod live_driver;
pub mod manager;
pub mod metrics;
pub mod rpc;
pub mod sink;
pub mod subscriber;
pub mod telemetry;
pub mod worker;

#[cfg(test)]
pub mod test_utils;

pub use block::{LiveBlock, RawLog};
pub use block_queue::BlockQueue;
pub use categorizer_app::CategorizerApp;
pub use contract::{CategorizedEvent, CategorizedPush, Smartcontract, TrackRequest};
pub use decoder::EventDecoder;
pub use group::{OldGroupList, OldWorkerGroup};
pub use manager::{Manager, ManagerShared};
pub use worker::{Worker, Workers};

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tokio::sync::{broadcast, mpsc};

/// Producer side of the downstream push channel.
pub type TxCategorized = mpsc::Sender<CategorizedPush>;
/// Consumer side of the downstream push channel.
pub type RxCategorized = mpsc::Receiver<CategorizedPush>;

/// Producer side of a manager's registration endpoint.
pub type TxRegistration = mpsc::Sender<TrackRequest>;
/// Consumer side of a manager's registration endpoint.
pub type RxRegistration = mpsc::Receiver<TrackRequest>;

/// Cooperative shutdown signal shared by all the long running tasks.
///
/// Tasks either poll [`CancellationToken::is_cancelled`] between iterations
/// or `select!` over a receiver obtained from [`CancellationToken::subscribe`].
#[derive(Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    notify: broadcast::Sender<()>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        let (notify, _) = broadcast::channel(1);
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            notify,
        }
    }
}

impl CancellationToken {
    /// Signals every subscribed task to exit at its next suspension point.
    pub fn graceful_shutdown(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        // Err here only means there is no live receiver, which is fine.
        let _ = self.notify.send(());
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.notify.subscribe()
    }
}
