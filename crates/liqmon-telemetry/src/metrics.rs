//! Prometheus metrics for the liquidation monitor.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. If registration fails
//! it indicates a fatal configuration error (duplicate metric names) that
//! should crash at startup rather than fail silently. These panics only
//! occur during static initialization, never at runtime.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, register_histogram_vec,
    register_int_counter_vec, register_int_gauge, register_int_gauge_vec, CounterVec, Gauge,
    GaugeVec, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec,
};

/// Positions currently tracked in the cache, by tier.
pub static POSITIONS_TRACKED: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "liqmon_positions_tracked",
        "Positions currently held in the cache",
        &["tier"]
    )
    .unwrap()
});

/// Wallets currently registered.
pub static WALLETS_REGISTERED: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("liqmon_wallets_registered", "Total wallets in the registry").unwrap()
});

/// Alerts emitted, by kind.
pub static ALERTS_EMITTED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "liqmon_alerts_emitted_total",
        "Total alerts emitted after dedup",
        &["kind"]
    )
    .unwrap()
});

/// Alerts suppressed by the dedup store, by kind.
pub static ALERTS_DEDUPED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "liqmon_alerts_deduped_total",
        "Total alerts suppressed because an equivalent one was already emitted today",
        &["kind"]
    )
    .unwrap()
});

/// Refresh cycle latency in milliseconds, by exchange.
pub static REFRESH_LATENCY_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "liqmon_refresh_latency_ms",
        "Time to refresh one wallet/exchange pair",
        &["exchange"],
        vec![5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0]
    )
    .unwrap()
});

/// Fetcher errors, by kind and exchange.
pub static FETCHER_ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "liqmon_fetcher_errors_total",
        "Total fetcher errors",
        &["kind", "exchange"]
    )
    .unwrap()
});

/// Backoff retries consumed by the fetcher's admission gate.
pub static FETCHER_RETRIES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "liqmon_fetcher_retries_total",
        "Total backoff retry attempts",
        &["exchange"]
    )
    .unwrap()
});

/// Discovery cycle duration in seconds.
pub static DISCOVERY_CYCLE_SECONDS: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "liqmon_discovery_cycle_seconds",
        "Duration of the most recent discovery cycle"
    )
    .unwrap()
});

/// Discovery loop's current adaptive interval in minutes.
pub static DISCOVERY_INTERVAL_MINUTES: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "liqmon_discovery_interval_minutes",
        "Current adaptive discovery interval"
    )
    .unwrap()
});

/// Cohort traders admitted vs. filtered, by cohort and outcome.
pub static COHORT_ADMITTED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "liqmon_cohort_admitted_total",
        "Cohort traders processed by discovery, by outcome",
        &["cohort", "outcome"]
    )
    .unwrap()
});

/// Persistence flush durations.
pub static PERSISTENCE_FLUSH_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "liqmon_persistence_flush_ms",
        "Time to flush a batched persistence write",
        &["table"],
        vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0]
    )
    .unwrap()
});

/// Facade over the static metrics above; keeps call sites free of
/// Prometheus-specific label plumbing.
pub struct Metrics;

impl Metrics {
    pub fn set_positions_tracked(tier: &str, count: i64) {
        POSITIONS_TRACKED.with_label_values(&[tier]).set(count);
    }

    pub fn set_wallets_registered(count: i64) {
        WALLETS_REGISTERED.set(count);
    }

    pub fn alert_emitted(kind: &str) {
        ALERTS_EMITTED_TOTAL.with_label_values(&[kind]).inc();
    }

    pub fn alert_deduped(kind: &str) {
        ALERTS_DEDUPED_TOTAL.with_label_values(&[kind]).inc();
    }

    pub fn refresh_latency(exchange: &str, millis: f64) {
        REFRESH_LATENCY_MS.with_label_values(&[exchange]).observe(millis);
    }

    pub fn fetcher_error(kind: &str, exchange: &str) {
        FETCHER_ERRORS_TOTAL.with_label_values(&[kind, exchange]).inc();
    }

    pub fn fetcher_retry(exchange: &str) {
        FETCHER_RETRIES_TOTAL.with_label_values(&[exchange]).inc();
    }

    pub fn discovery_cycle_seconds(seconds: f64) {
        DISCOVERY_CYCLE_SECONDS.set(seconds);
    }

    pub fn discovery_interval_minutes(minutes: f64) {
        DISCOVERY_INTERVAL_MINUTES.set(minutes);
    }

    pub fn cohort_admitted(cohort: &str, outcome: &str) {
        COHORT_ADMITTED_TOTAL.with_label_values(&[cohort, outcome]).inc();
    }

    pub fn persistence_flush(table: &str, millis: f64) {
        PERSISTENCE_FLUSH_MS.with_label_values(&[table]).observe(millis);
    }
}
