//! HTTP client for the storefront backend's order listing.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;

use super::models::Order;

/// Read access to the backend's full order list.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait OrderSource: Send + Sync {
    async fn list_orders(&self) -> Result<Vec<Order>>;
}

pub struct HttpOrderClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpOrderClient {
    /// Create a new order client.
    ///
    /// # Arguments
    /// * `base_url` - Base URL of the storefront backend (e.g., "http://localhost:8080")
    /// * `timeout_sec` - Request timeout in seconds
    pub fn new(base_url: &str, timeout_sec: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_sec))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn orders_url(&self) -> String {
        format!("{}/orders", self.base_url)
    }
}

#[async_trait]
impl OrderSource for HttpOrderClient {
    async fn list_orders(&self) -> Result<Vec<Order>> {
        let response = self
            .client
            .get(self.orders_url())
            .send()
            .await
            .context("Failed to fetch orders")?;

        if !response.status().is_success() {
            anyhow::bail!("Failed to fetch orders: status {}", response.status());
        }

        response
            .json()
            .await
            .context("Failed to parse orders response")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orders_url_strips_trailing_slash() {
        let client = HttpOrderClient::new("http://localhost:8080/", 5).unwrap();
        assert_eq!(client.orders_url(), "http://localhost:8080/orders");
    }
}
