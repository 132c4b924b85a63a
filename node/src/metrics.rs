//! # Prometheus Metrics
//!
//! Treasury health gauges plus RPC and event counters. Scraped at
//! `/metrics` on the metrics port.
//!
//! All metrics live in a dedicated [`prometheus::Registry`] with the
//! `ballast` prefix so they do not collide with any default global registry
//! consumers.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use ballast_contracts::HealthSummary;
use ballast_protocol::config::{BPS_DENOMINATOR, PRECISION};
use prometheus::{
    Encoder, Gauge, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

/// Every metric handle the node records into.
#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// Current NAV per share, as a decimal.
    pub nav_per_share: Gauge,
    /// Seconds since the current NAV report finalized; -1 before the first.
    pub nav_report_age_seconds: IntGauge,
    /// 1 while the current report is within the staleness window.
    pub nav_fresh: IntGauge,
    /// Rebased supply, whole tokens.
    pub total_supply: Gauge,
    /// Collateral value, whole tokens.
    pub collateral_value: Gauge,
    /// Coverage in bps; 0 while supply is zero.
    pub collateral_ratio_bps: IntGauge,
    /// 1 while the circuit breaker blocks deposits.
    pub circuit_breaker_tripped: IntGauge,
    /// Redemption requests waiting to settle.
    pub pending_redemptions: IntGauge,
    /// Accounts holding shares.
    pub holders: IntGauge,
    /// JSON-RPC calls by method and outcome.
    pub rpc_requests_total: IntCounterVec,
    /// JSON-RPC handling latency.
    pub rpc_latency_seconds: Histogram,
    /// Committed treasury events by name.
    pub events_published_total: IntCounterVec,
    /// Completed keeper passes.
    pub keeper_runs_total: IntCounter,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("ballast".into()), None)?;

        let nav_per_share = Gauge::new("nav_per_share", "Current NAV per share")?;
        let nav_report_age_seconds = IntGauge::new(
            "nav_report_age_seconds",
            "Seconds since the current NAV report finalized",
        )?;
        let nav_fresh = IntGauge::new("nav_fresh", "Whether the current NAV report is fresh")?;
        let total_supply = Gauge::new("total_supply", "Rebased token supply")?;
        let collateral_value = Gauge::new("collateral_value", "Collateral held, normalized")?;
        let collateral_ratio_bps =
            IntGauge::new("collateral_ratio_bps", "Collateral coverage of supply, bps")?;
        let circuit_breaker_tripped = IntGauge::new(
            "circuit_breaker_tripped",
            "Whether the circuit breaker is blocking deposits",
        )?;
        let pending_redemptions =
            IntGauge::new("pending_redemptions", "Redemption requests waiting to settle")?;
        let holders = IntGauge::new("holders", "Accounts holding shares")?;
        let rpc_requests_total = IntCounterVec::new(
            Opts::new("rpc_requests_total", "JSON-RPC calls by method and outcome"),
            &["method", "outcome"],
        )?;
        let rpc_latency_seconds = Histogram::with_opts(
            HistogramOpts::new("rpc_latency_seconds", "JSON-RPC handling latency in seconds")
                .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5]),
        )?;
        let events_published_total = IntCounterVec::new(
            Opts::new("events_published_total", "Committed treasury events by name"),
            &["event"],
        )?;
        let keeper_runs_total = IntCounter::new("keeper_runs_total", "Completed keeper passes")?;

        registry.register(Box::new(nav_per_share.clone()))?;
        registry.register(Box::new(nav_report_age_seconds.clone()))?;
        registry.register(Box::new(nav_fresh.clone()))?;
        registry.register(Box::new(total_supply.clone()))?;
        registry.register(Box::new(collateral_value.clone()))?;
        registry.register(Box::new(collateral_ratio_bps.clone()))?;
        registry.register(Box::new(circuit_breaker_tripped.clone()))?;
        registry.register(Box::new(pending_redemptions.clone()))?;
        registry.register(Box::new(holders.clone()))?;
        registry.register(Box::new(rpc_requests_total.clone()))?;
        registry.register(Box::new(rpc_latency_seconds.clone()))?;
        registry.register(Box::new(events_published_total.clone()))?;
        registry.register(Box::new(keeper_runs_total.clone()))?;

        Ok(Self {
            registry,
            nav_per_share,
            nav_report_age_seconds,
            nav_fresh,
            total_supply,
            collateral_value,
            collateral_ratio_bps,
            circuit_breaker_tripped,
            pending_redemptions,
            holders,
            rpc_requests_total,
            rpc_latency_seconds,
            events_published_total,
            keeper_runs_total,
        })
    }

    /// Copies a health snapshot into the gauges.
    pub fn observe_health(&self, health: &HealthSummary) {
        self.nav_per_share.set(to_decimal(health.nav_per_share));
        self.nav_report_age_seconds
            .set(health.seconds_since_last_report.unwrap_or(-1));
        self.nav_fresh.set(i64::from(health.nav_fresh));
        self.total_supply.set(to_decimal(health.total_supply));
        self.collateral_value.set(to_decimal(health.total_collateral_value));
        // Ratios above i64::MAX bps don't happen; clamp rather than wrap.
        let ratio = health
            .collateral_ratio_bps
            .map(|r| i64::try_from(r).unwrap_or(i64::MAX))
            .unwrap_or(0);
        self.collateral_ratio_bps.set(ratio);
        self.circuit_breaker_tripped
            .set(i64::from(health.circuit_breaker.tripped));
        self.pending_redemptions
            .set(i64::try_from(health.pending_redemptions).unwrap_or(i64::MAX));
        self.holders.set(i64::try_from(health.holders).unwrap_or(i64::MAX));
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// 18-decimal fixed point to a float for display. Lossy by nature.
fn to_decimal(value: u128) -> f64 {
    value as f64 / PRECISION as f64
}

/// Bps as a fraction, for log lines.
pub fn bps_fraction(bps: u128) -> f64 {
    bps as f64 / BPS_DENOMINATOR as f64
}

/// Shared metrics state passed to axum handlers.
pub type SharedMetrics = Arc<NodeMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
