//! # Prometheus Metrics
//!
//! Operational metrics for the credit ledger service, scraped at the
//! `/metrics` HTTP endpoint on the configured metrics port.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] so
//! they do not collide with any default global registry consumers.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, Registry, TextEncoder};
use std::sync::Arc;

/// Holds all Prometheus metric handles for the service.
///
/// Clone-friendly (wraps `Arc` internally via prometheus handles) so it
/// can be shared across request handlers.
#[derive(Clone)]
pub struct LedgerMetrics {
    /// Prometheus registry that owns all metrics below.
    registry: Registry,
    /// Total number of earn operations that added credits.
    pub earns_total: IntCounter,
    /// Total number of successful spend operations.
    pub spends_total: IntCounter,
    /// Total number of spends rejected for insufficient credits.
    pub insufficient_funds_total: IntCounter,
    /// Total credits granted across all earn operations.
    pub credits_earned_total: IntCounter,
    /// Total credits charged across all spend operations.
    pub credits_spent_total: IntCounter,
    /// Histogram of spend operation latency in seconds.
    pub spend_latency_seconds: Histogram,
}

impl LedgerMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Self {
        let registry = Registry::new_custom(Some("curio".into()), None)
            .expect("failed to create prometheus registry");

        let earns_total = IntCounter::new(
            "ledger_earns_total",
            "Total number of earn operations that added credits",
        )
        .expect("metric creation");
        registry
            .register(Box::new(earns_total.clone()))
            .expect("metric registration");

        let spends_total = IntCounter::new(
            "ledger_spends_total",
            "Total number of successful spend operations",
        )
        .expect("metric creation");
        registry
            .register(Box::new(spends_total.clone()))
            .expect("metric registration");

        let insufficient_funds_total = IntCounter::new(
            "ledger_insufficient_funds_total",
            "Total number of spends rejected for insufficient credits",
        )
        .expect("metric creation");
        registry
            .register(Box::new(insufficient_funds_total.clone()))
            .expect("metric registration");

        let credits_earned_total = IntCounter::new(
            "ledger_credits_earned_total",
            "Total credits granted across all earn operations",
        )
        .expect("metric creation");
        registry
            .register(Box::new(credits_earned_total.clone()))
            .expect("metric registration");

        let credits_spent_total = IntCounter::new(
            "ledger_credits_spent_total",
            "Total credits charged across all spend operations",
        )
        .expect("metric creation");
        registry
            .register(Box::new(credits_spent_total.clone()))
            .expect("metric registration");

        let spend_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "ledger_spend_latency_seconds",
                "End-to-end spend operation latency in seconds",
            )
            .buckets(vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
            ]),
        )
        .expect("metric creation");
        registry
            .register(Box::new(spend_latency_seconds.clone()))
            .expect("metric registration");

        Self {
            registry,
            earns_total,
            spends_total,
            insufficient_funds_total,
            credits_earned_total,
            credits_spent_total,
            spend_latency_seconds,
        }
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer).expect("prometheus output is valid utf-8"))
    }
}

/// Shared metrics state passed to axum handlers.
pub type SharedMetrics = Arc<LedgerMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
///
/// Returns HTTP 500 if encoding fails (should never happen in practice).
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_encode_with_namespace() {
        let metrics = LedgerMetrics::new();
        metrics.earns_total.inc();
        metrics.credits_spent_total.inc_by(25);

        let body = metrics.encode().expect("encode");
        assert!(body.contains("curio_ledger_earns_total 1"));
        assert!(body.contains("curio_ledger_credits_spent_total 25"));
    }
}
