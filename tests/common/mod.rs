//! Common test infrastructure
//!
//! This module provides the fake backend and helpers shared by the end-to-end tests.
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{order_json, FakeBackend, PushMode};
//!
//! #[tokio::test]
//! async fn test_orders_served() {
//!     let backend = FakeBackend::spawn(PushMode::Stomp, vec![order_json(1)]).await;
//!     // point a session at backend.base_url
//! }
//! ```

#![allow(dead_code)]

mod constants;
mod fixtures;
mod server;

// Public API - this is what tests import
pub use constants::*;
pub use fixtures::{order_json, push_json, test_config, wait_until};
pub use server::{FakeBackend, PushMode};
