// Copyright (c) 2026 Bilinear Labs
// SPDX-License-Identifier: MIT

//! Default values shared across the crate.

/// How many blocks a single range query looks ahead.
pub const DEFAULT_BLOCK_RANGE: u64 = 100;

/// Seconds between two head polls of a block feed.
pub const DEFAULT_FEED_POLL_INTERVAL: u64 = 1;

/// Seconds between two drains of the live block queue.
pub const LIVE_DRIVE_INTERVAL: u64 = 1;

/// Seconds between two checks for the live edge during manager startup.
pub const LIVE_EDGE_POLL_INTERVAL: u64 = 1;

/// Seconds a catch-up driver waits before retrying a failed range query.
pub const CATCHUP_RETRY_INTERVAL: u64 = 1;

/// Concurrent block-log fetches issued by a block feed.
pub const MAX_CONCURRENT_REQUESTS: usize = 4;

/// Capacity of the downstream push channel.
pub const DEFAULT_PUSH_BUFFER: usize = 100;

/// Capacity of a manager's registration endpoint channel.
pub const DEFAULT_REGISTRATION_BUFFER: usize = 16;

/// Capacity of the process wide block broadcast channel.
pub const DEFAULT_BROADCAST_BUFFER: usize = 64;

/// Default listen port of the metrics and introspection server.
pub const DEFAULT_METRICS_PORT: u16 = 9464;

/// Retries of the provider backoff layer before a request errors out.
pub const DEFAULT_BACKOFF_MAX_RETRIES: u32 = 10;

/// Initial backoff of the provider retry layer, in milliseconds.
pub const DEFAULT_BACKOFF_TIME: u64 = 1000;

/// Compute units per second assumed by the provider retry layer.
pub const DEFAULT_BACKOFF_CUP_SIZE: u64 = 100;
