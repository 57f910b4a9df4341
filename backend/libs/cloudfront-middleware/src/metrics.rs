/// Prometheus metrics for IP range refresh and redirect decisions
#[cfg(feature = "metrics")]
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, IntCounter,
    IntCounterVec, IntGauge,
};

#[cfg(feature = "metrics")]
use once_cell::sync::Lazy;

#[cfg(feature = "metrics")]
static IP_RANGES_REFRESH: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "cloudfront_ip_ranges_refresh_total",
        "Total number of AWS IP range refresh attempts",
        &["result"]
    )
    .expect("Failed to register IP ranges refresh metric")
});

#[cfg(feature = "metrics")]
static IP_RANGES_LOADED: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "cloudfront_ip_ranges_loaded",
        "Number of IP ranges in the current snapshot"
    )
    .expect("Failed to register IP ranges loaded metric")
});

#[cfg(feature = "metrics")]
static REDIRECT_DECISIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "cloudfront_redirect_decisions_total",
        "Total number of redirect decisions by outcome",
        &["decision"]
    )
    .expect("Failed to register redirect decisions metric")
});

#[cfg(feature = "metrics")]
static REDIRECT_COLD_STARTS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "cloudfront_redirect_cold_start_total",
        "Total number of redirect decisions made before any IP ranges loaded"
    )
    .expect("Failed to register redirect cold start metric")
});

/// Metrics collector for the range refresher
#[cfg(feature = "metrics")]
pub struct RefreshMetrics;

#[cfg(feature = "metrics")]
impl RefreshMetrics {
    pub fn record_success(ranges: usize) {
        IP_RANGES_REFRESH.with_label_values(&["success"]).inc();
        IP_RANGES_LOADED.set(ranges as i64);
    }

    pub fn record_failure() {
        IP_RANGES_REFRESH.with_label_values(&["failure"]).inc();
    }
}

/// Metrics collector for redirect decisions
#[cfg(feature = "metrics")]
pub struct DecisionMetrics;

#[cfg(feature = "metrics")]
impl DecisionMetrics {
    pub fn record(decision: &str) {
        REDIRECT_DECISIONS.with_label_values(&[decision]).inc();
    }

    pub fn record_cold_start() {
        REDIRECT_COLD_STARTS.inc();
    }
}

// No-op implementations when metrics feature is disabled
#[cfg(not(feature = "metrics"))]
pub struct RefreshMetrics;

#[cfg(not(feature = "metrics"))]
impl RefreshMetrics {
    pub fn record_success(_ranges: usize) {}
    pub fn record_failure() {}
}

#[cfg(not(feature = "metrics"))]
pub struct DecisionMetrics;

#[cfg(not(feature = "metrics"))]
impl DecisionMetrics {
    pub fn record(_decision: &str) {}
    pub fn record_cold_start() {}
}
