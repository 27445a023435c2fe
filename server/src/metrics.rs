use lazy_static::lazy_static;
use prometheus::{Counter, Encoder, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref MESSAGES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "fleet_bus_messages_total",
        "Total messages received from the bus"
    ))
    .unwrap();
    pub static ref DEVICE_UPDATES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "fleet_device_updates_total",
        "Total reconciled device updates persisted and broadcast"
    ))
    .unwrap();
    pub static ref INVALID_MESSAGES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "fleet_invalid_messages_total",
        "Total messages dropped as undecodable or out of range"
    ))
    .unwrap();
    pub static ref UNKNOWN_DEVICE_TOTAL: Counter = Counter::with_opts(Opts::new(
        "fleet_unknown_device_total",
        "Total messages dropped because no device matched the thing name"
    ))
    .unwrap();
    pub static ref NOTIFICATIONS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "fleet_notifications_total",
        "Total alert notifications created from telemetry"
    ))
    .unwrap();
    pub static ref DB_FAILURES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "fleet_db_failures_total",
        "Total database write failures on the ingest path"
    ))
    .unwrap();
    pub static ref BUS_RECONNECTS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "fleet_bus_reconnects_total",
        "Total bus connections re-established after a loss"
    ))
    .unwrap();
    pub static ref BROADCAST_DROPPED_TOTAL: Counter = Counter::with_opts(Opts::new(
        "fleet_broadcast_dropped_total",
        "Total events skipped for slow or closed subscribers"
    ))
    .unwrap();
    pub static ref WS_CLIENTS: Gauge = Gauge::with_opts(Opts::new(
        "fleet_ws_clients",
        "Currently connected WebSocket subscribers"
    ))
    .unwrap();
    pub static ref INGEST_LATENCY_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "fleet_ingest_latency_seconds",
            "Time from decode to persisted and broadcast update"
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0
        ])
    )
    .unwrap();
}

pub fn init_metrics() {
    REGISTRY.register(Box::new(MESSAGES_TOTAL.clone())).unwrap();
    REGISTRY
        .register(Box::new(DEVICE_UPDATES_TOTAL.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(INVALID_MESSAGES_TOTAL.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(UNKNOWN_DEVICE_TOTAL.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(NOTIFICATIONS_TOTAL.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(DB_FAILURES_TOTAL.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(BUS_RECONNECTS_TOTAL.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(BROADCAST_DROPPED_TOTAL.clone()))
        .unwrap();
    REGISTRY.register(Box::new(WS_CLIENTS.clone())).unwrap();
    REGISTRY
        .register(Box::new(INGEST_LATENCY_SECONDS.clone()))
        .unwrap();
}

pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}
