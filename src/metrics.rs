// Prometheus metrics for the rate limiter
//
// Exposed on the /metrics/ HTTP endpoint:
// - Admit/reject decisions per tier and endpoint class (counter)
// - Window store failures (counter)
// - Check latency (histogram)
// - Live timestamp lists (gauge)

use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, Histogram, IntCounter, IntGauge, Registry, TextEncoder,
};
use std::sync::Arc;

lazy_static! {
    pub static ref REGISTRY: Arc<Registry> = Arc::new(Registry::new());

    pub static ref RATE_LIMIT_DECISIONS_TOTAL: CounterVec = CounterVec::new(
        prometheus::Opts::new("ratelimit_decisions_total", "Rate limit decisions by outcome"),
        &["tier", "endpoint_class", "outcome"]
    ).expect("Failed to create decisions metric");

    pub static ref RATE_LIMIT_STORE_ERRORS_TOTAL: IntCounter = IntCounter::new(
        "ratelimit_store_errors_total",
        "Window store failures handled by the configured failure mode"
    ).expect("Failed to create store errors metric");

    pub static ref RATE_LIMIT_CHECK_DURATION_SECONDS: Histogram = Histogram::with_opts(
        prometheus::HistogramOpts::new("ratelimit_check_duration_seconds", "Time spent deciding one request"),
    ).expect("Failed to create check duration metric");

    pub static ref RATE_LIMIT_TRACKED_WINDOWS: IntGauge = IntGauge::new(
        "ratelimit_tracked_windows",
        "Live timestamp lists held by the window store"
    ).expect("Failed to create tracked windows metric");
}

/// Initialize metrics registry - must be called once at startup
pub fn init() -> prometheus::Result<()> {
    REGISTRY.register(Box::new(RATE_LIMIT_DECISIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RATE_LIMIT_STORE_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RATE_LIMIT_CHECK_DURATION_SECONDS.clone()))?;
    REGISTRY.register(Box::new(RATE_LIMIT_TRACKED_WINDOWS.clone()))?;
    Ok(())
}

/// Record one admit/reject decision
pub fn record_decision(tier: &str, endpoint_class: &str, limited: bool) {
    let outcome = if limited { "rejected" } else { "admitted" };
    RATE_LIMIT_DECISIONS_TOTAL
        .with_label_values(&[tier, endpoint_class, outcome])
        .inc();
}

/// Gather all metrics in Prometheus text format
pub fn gather_metrics() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| anyhow::anyhow!("Failed to encode metrics: {}", e))?;
    String::from_utf8(buffer).map_err(|e| anyhow::anyhow!("Invalid UTF-8 in metrics: {}", e))
}
