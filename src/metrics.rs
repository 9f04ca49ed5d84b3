use axum::{http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{Counter, CounterVec, Encoder, Gauge, Opts, Registry, TextEncoder};

/// Metric name prefix for all order-notifier metrics
const PREFIX: &str = "order_notifier";

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // Feed Metrics
    pub static ref NOTIFICATIONS_CREATED_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_notifications_created_total"), "Notifications added to the feed"),
        &["source"]
    ).expect("Failed to create notifications_created_total metric");

    pub static ref DUPLICATES_SKIPPED_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_duplicates_skipped_total"), "Order events dropped because the order was already in the feed"),
        &["source"]
    ).expect("Failed to create duplicates_skipped_total metric");

    pub static ref UNREAD_NOTIFICATIONS: Gauge = Gauge::new(
        format!("{PREFIX}_unread_notifications"),
        "Unread notifications in the feed"
    ).expect("Failed to create unread_notifications metric");

    pub static ref PERSISTENCE_FAILURES_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_persistence_failures_total"),
        "Failed writes to local notification state"
    ).expect("Failed to create persistence_failures_total metric");

    // Polling Metrics
    pub static ref POLL_FAILURES_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_poll_failures_total"),
        "Failed order list fetches"
    ).expect("Failed to create poll_failures_total metric");

    // Push Metrics
    pub static ref PUSH_CONNECTED: Gauge = Gauge::new(
        format!("{PREFIX}_push_connected"),
        "1 while the push channel is connected"
    ).expect("Failed to create push_connected metric");

    pub static ref PUSH_RECONNECT_ATTEMPTS: Gauge = Gauge::new(
        format!("{PREFIX}_push_reconnect_attempts"),
        "Reconnect attempts since the last successful push connection"
    ).expect("Failed to create push_reconnect_attempts metric");

    pub static ref PUSH_CONNECT_FAILURES_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_push_connect_failures_total"),
        "Failed push connect or handshake attempts"
    ).expect("Failed to create push_connect_failures_total metric");

    pub static ref PUSH_MALFORMED_MESSAGES_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_push_malformed_messages_total"),
        "Push messages dropped because they could not be decoded"
    ).expect("Failed to create push_malformed_messages_total metric");
}

/// Initialize all metrics and register them with the Prometheus registry
pub fn init_metrics() {
    // Register all metrics - ignore errors if already registered (for tests)
    let _ = REGISTRY.register(Box::new(NOTIFICATIONS_CREATED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(DUPLICATES_SKIPPED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(UNREAD_NOTIFICATIONS.clone()));
    let _ = REGISTRY.register(Box::new(PERSISTENCE_FAILURES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(POLL_FAILURES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(PUSH_CONNECTED.clone()));
    let _ = REGISTRY.register(Box::new(PUSH_RECONNECT_ATTEMPTS.clone()));
    let _ = REGISTRY.register(Box::new(PUSH_CONNECT_FAILURES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(PUSH_MALFORMED_MESSAGES_TOTAL.clone()));

    tracing::info!("Metrics initialized");
}

pub fn record_created(source: &str, count: usize) {
    NOTIFICATIONS_CREATED_TOTAL
        .with_label_values(&[source])
        .inc_by(count as f64);
}

pub fn record_duplicate(source: &str) {
    DUPLICATES_SKIPPED_TOTAL.with_label_values(&[source]).inc();
}

pub fn set_unread(count: usize) {
    UNREAD_NOTIFICATIONS.set(count as f64);
}

pub fn record_persistence_failure() {
    PERSISTENCE_FAILURES_TOTAL.inc();
}

pub fn record_poll_failure() {
    POLL_FAILURES_TOTAL.inc();
}

pub fn set_push_connected(connected: bool) {
    PUSH_CONNECTED.set(if connected { 1.0 } else { 0.0 });
}

pub fn set_reconnect_attempts(attempts: u32) {
    PUSH_RECONNECT_ATTEMPTS.set(attempts as f64);
}

pub fn record_push_connect_failure() {
    PUSH_CONNECT_FAILURES_TOTAL.inc();
}

pub fn record_malformed_push() {
    PUSH_MALFORMED_MESSAGES_TOTAL.inc();
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let response = String::from_utf8(buffer).unwrap_or_default();
            (StatusCode::OK, response)
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}
