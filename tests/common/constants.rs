//! Shared test constants

pub const ORDERS_TOPIC: &str = "/topic/orders";

/// How long helpers wait for an asynchronous condition before failing the test
pub const WAIT_TIMEOUT_MS: u64 = 5000;

pub const WAIT_POLL_INTERVAL_MS: u64 = 20;
