//! Metrics collection for observability

use prometheus::{
    register_counter_vec_with_registry, register_counter_with_registry,
    register_gauge_with_registry, register_histogram_with_registry, Counter, CounterVec, Gauge,
    Histogram, Opts, Registry,
};
use once_cell::sync::Lazy;
use std::sync::Arc;

/// Global metrics registry
pub static METRICS: Lazy<Arc<Metrics>> = Lazy::new(|| {
    Arc::new(Metrics::new().expect("Failed to initialize metrics"))
});

/// Metrics collector
pub struct Metrics {
    registry: Registry,

    // Extraction metrics
    pub extractions: CounterVec,
    pub extraction_failures: CounterVec,
    pub debounced_events: Counter,

    // Scoring metrics
    pub scoring_duration: Histogram,
    pub provider_fallbacks: CounterVec,

    // Compression metrics
    pub compressions: Counter,
    pub tokens_removed: Counter,
    pub summarizations: Counter,

    // Health metrics
    pub health_score: Gauge,
    pub health_checks: Counter,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let extractions = register_counter_vec_with_registry!(
            Opts::new("autopilot_extractions_total", "Completed extractions by source"),
            &["source"],
            registry
        )?;

        let extraction_failures = register_counter_vec_with_registry!(
            Opts::new("autopilot_extraction_failures_total", "Failed extractions by source"),
            &["source"],
            registry
        )?;

        let debounced_events = register_counter_with_registry!(
            Opts::new(
                "autopilot_debounced_events_total",
                "File events collapsed by the debouncer"
            ),
            registry
        )?;

        let scoring_duration = register_histogram_with_registry!(
            "autopilot_scoring_duration_seconds",
            "Time spent scoring and ranking a corpus",
            registry
        )?;

        let provider_fallbacks = register_counter_vec_with_registry!(
            Opts::new(
                "autopilot_provider_fallbacks_total",
                "Provider calls that fell back to the local algorithm"
            ),
            &["provider"],
            registry
        )?;

        let compressions = register_counter_with_registry!(
            Opts::new("autopilot_compressions_total", "Compression runs over budget"),
            registry
        )?;

        let tokens_removed = register_counter_with_registry!(
            Opts::new("autopilot_tokens_removed_total", "Tokens removed by compression"),
            registry
        )?;

        let summarizations = register_counter_with_registry!(
            Opts::new("autopilot_summarizations_total", "Items summarized"),
            registry
        )?;

        let health_score = register_gauge_with_registry!(
            Opts::new("autopilot_health_score", "Most recent corpus health score"),
            registry
        )?;

        let health_checks = register_counter_with_registry!(
            Opts::new("autopilot_health_checks_total", "Health assessments run"),
            registry
        )?;

        Ok(Self {
            registry,
            extractions,
            extraction_failures,
            debounced_events,
            scoring_duration,
            provider_fallbacks,
            compressions,
            tokens_removed,
            summarizations,
            health_score,
            health_checks,
        })
    }

    /// Get the metrics registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record the outcome of an extraction
    pub fn record_extraction(&self, source: &str, success: bool) {
        if success {
            self.extractions.with_label_values(&[source]).inc();
        } else {
            self.extraction_failures.with_label_values(&[source]).inc();
        }
    }

    /// Record a provider call that used the local fallback
    pub fn record_fallback(&self, provider: &str) {
        self.provider_fallbacks.with_label_values(&[provider]).inc();
    }

    /// Record a compression run
    pub fn record_compression(&self, tokens_removed: usize) {
        self.compressions.inc();
        self.tokens_removed.inc_by(tokens_removed as f64);
    }

    /// Record a health assessment
    pub fn record_health(&self, score: f64) {
        self.health_checks.inc();
        self.health_score.set(score);
    }

    /// Export metrics in Prometheus text format
    pub fn export_prometheus(&self) -> String {
        use prometheus::Encoder;

        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        if encoder.encode(&metric_families, &mut buffer).is_err() {
            return String::new();
        }

        String::from_utf8(buffer).unwrap_or_default()
    }
}
