mod client;
mod models;

#[cfg(any(test, feature = "mock"))]
pub use client::MockOrderSource;
pub use client::{HttpOrderClient, OrderSource};
pub use models::Order;
