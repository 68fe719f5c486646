//! Prometheus metrics for the gateway, feature-gated behind `metrics`.
//!
//! Trimmed down from the teacher's `RegistryMetrics`
//! (`dashflow-registry/src/metrics.rs`) to the categories this service
//! actually has: HTTP request metrics plus a handful of domain counters
//! (sessions started, strikes, chain breaks) in place of the teacher's
//! cache/storage/search categories, which have no counterpart here.

use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry};

const HTTP_LATENCY_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0];

#[derive(Clone)]
pub struct GatewayMetrics {
    pub registry: Registry,
    pub http_requests_total: IntCounterVec,
    pub http_request_duration_seconds: HistogramVec,
    pub http_requests_in_flight: IntGauge,
    pub sessions_started_total: IntCounter,
    pub strikes_total: IntCounterVec,
    pub chain_breaks_total: IntCounter,
}

impl GatewayMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let http_requests_total = IntCounterVec::new(
            Opts::new("http_requests_total", "Total HTTP requests"),
            &["method", "path", "status"],
        )?;
        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "http_request_duration_seconds",
                "HTTP request duration in seconds",
            )
            .buckets(HTTP_LATENCY_BUCKETS.to_vec()),
            &["method", "path"],
        )?;
        let http_requests_in_flight = IntGauge::new(
            "http_requests_in_flight",
            "Currently in-flight HTTP requests",
        )?;
        let sessions_started_total = IntCounter::new(
            "interview_sessions_started_total",
            "Total interview sessions that reached Active",
        )?;
        let strikes_total = IntCounterVec::new(
            Opts::new("interview_strikes_total", "Total anti-cheat strikes"),
            &["event_type", "severity"],
        )?;
        let chain_breaks_total = IntCounter::new(
            "interview_chain_breaks_total",
            "Total anti-cheat batches rejected for chain violations",
        )?;

        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;
        registry.register(Box::new(http_requests_in_flight.clone()))?;
        registry.register(Box::new(sessions_started_total.clone()))?;
        registry.register(Box::new(strikes_total.clone()))?;
        registry.register(Box::new(chain_breaks_total.clone()))?;

        Ok(Self {
            registry,
            http_requests_total,
            http_request_duration_seconds,
            http_requests_in_flight,
            sessions_started_total,
            strikes_total,
            chain_breaks_total,
        })
    }

    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        self.http_requests_total
            .with_label_values(&[method, path, &status.to_string()])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }

    pub fn encode(&self) -> String {
        use prometheus::{Encoder, TextEncoder};
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        let _ = encoder.encode(&metric_families, &mut buffer);
        String::from_utf8(buffer).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_includes_registered_metric_names() {
        let metrics = GatewayMetrics::new().unwrap();
        metrics.sessions_started_total.inc();
        let text = metrics.encode();
        assert!(text.contains("interview_sessions_started_total"));
    }
}
