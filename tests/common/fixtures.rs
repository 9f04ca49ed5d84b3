//! Test fixtures: order payloads, session configuration and wait helpers

use order_notifier::config::{
    AppConfig, CliConfig, DesktopConfig, FileConfig, PollingConfig, PushConfig, TransportKind,
};
use serde_json::{json, Value};
use std::path::Path;
use std::time::{Duration, Instant};

use super::constants::{WAIT_POLL_INTERVAL_MS, WAIT_TIMEOUT_MS};

fn created_at(id: i64) -> String {
    format!("2024-06-01T{:02}:{:02}:00", 10 + id / 60, id % 60)
}

/// An order as returned by `GET /orders`, including a field the client does not model.
pub fn order_json(id: i64) -> Value {
    json!({
        "id": id,
        "customerName": format!("Customer {}", id),
        "customerEmail": format!("customer{}@example.com", id),
        "customerPhone": null,
        "totalAmount": 20.0 + id as f64,
        "createdAt": created_at(id),
        "status": "PENDING"
    })
}

/// An order as published on the push topic.
pub fn push_json(id: i64) -> String {
    json!({
        "orderId": id,
        "customerName": format!("Customer {}", id),
        "customerEmail": format!("customer{}@example.com", id),
        "totalAmount": 20.0 + id as f64,
        "createdAt": created_at(id)
    })
    .to_string()
}

/// Session configuration pointed at `backend_url` with fast reconnects and no desktop alerts.
pub fn test_config(backend_url: &str, db_dir: &Path, transport: TransportKind) -> AppConfig {
    let cli = CliConfig {
        backend_url: Some(backend_url.to_string()),
        db_path: Some(db_dir.join("notifier.db")),
        transport: Some(transport),
        ..Default::default()
    };
    let file = FileConfig {
        polling: Some(PollingConfig {
            fast_interval_secs: Some(1),
            slow_interval_secs: Some(30),
            ..Default::default()
        }),
        push: Some(PushConfig {
            base_delay_ms: Some(100),
            ..Default::default()
        }),
        desktop: Some(DesktopConfig {
            enabled: Some(false),
        }),
        ..Default::default()
    };
    AppConfig::resolve(&cli, Some(file)).expect("Failed to resolve test config")
}

/// Polls `condition` until it holds, panicking after the shared timeout.
pub async fn wait_until<F: FnMut() -> bool>(what: &str, mut condition: F) {
    let start = Instant::now();
    let timeout = Duration::from_millis(WAIT_TIMEOUT_MS);
    while !condition() {
        if start.elapsed() > timeout {
            panic!("Timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(WAIT_POLL_INTERVAL_MS)).await;
    }
}
