// Private module declaration
mod server;

use prometheus::{
    HistogramOpts, HistogramVec, IntCounter, IntCounterVec,
    IntGauge, Opts, Registry,
};

// Re-export for public API
pub use server::start_metrics_server;

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// Covers the write side (outbox relay), the read side (projectors) and the
// resilience utilities in between:
// - Outbox publish throughput and failures
// - Projection outcomes, failures and latency
// - Dead letters by source
// - Retry attempts and outcomes
// - Circuit breaker state transitions
// - Cross-store inconsistencies left for an operator
//
// All metrics are registered with Prometheus and can be scraped via /metrics
// ============================================================================

/// Central metrics registry for the entire application
pub struct Metrics {
    registry: Registry,

    // Outbox Relay Metrics
    pub outbox_published: IntCounterVec,
    pub outbox_failed: IntCounterVec,

    // Projection Metrics
    pub projection_applied: IntCounterVec,
    pub projection_failed: IntCounterVec,
    pub projection_duration: HistogramVec,

    // Retry Metrics
    pub retry_attempts_total: IntCounterVec,
    pub retry_success: IntCounterVec,
    pub retry_failure: IntCounterVec,

    // DLQ Metrics
    pub dlq_messages_total: IntCounter,
    pub dlq_messages_by_source: IntCounterVec,

    // Circuit Breaker Metrics
    pub circuit_breaker_state: IntGauge,
    pub circuit_breaker_transitions: IntCounterVec,

    // Consistency Metrics
    pub consistency_failures: IntCounterVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        // Outbox Relay Metrics
        let outbox_published = IntCounterVec::new(
            Opts::new("outbox_messages_published_total", "Outbox messages published to the broker"),
            &["topic"],
        )?;
        registry.register(Box::new(outbox_published.clone()))?;

        let outbox_failed = IntCounterVec::new(
            Opts::new("outbox_publish_failures_total", "Outbox publish attempts that failed"),
            &["topic"],
        )?;
        registry.register(Box::new(outbox_failed.clone()))?;

        // Projection Metrics
        let projection_applied = IntCounterVec::new(
            Opts::new("projection_events_applied_total", "Events handled by projectors"),
            &["aggregate", "outcome"],
        )?;
        registry.register(Box::new(projection_applied.clone()))?;

        let projection_failed = IntCounterVec::new(
            Opts::new("projection_events_failed_total", "Events projectors could not apply"),
            &["aggregate", "reason"],
        )?;
        registry.register(Box::new(projection_failed.clone()))?;

        let projection_duration = HistogramVec::new(
            HistogramOpts::new("projection_duration_seconds", "Time spent applying one event")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["aggregate"],
        )?;
        registry.register(Box::new(projection_duration.clone()))?;

        // Retry Metrics
        let retry_attempts_total = IntCounterVec::new(
            Opts::new("retry_attempts_total", "Total retry attempts"),
            &["operation", "attempt"],
        )?;
        registry.register(Box::new(retry_attempts_total.clone()))?;

        let retry_success = IntCounterVec::new(
            Opts::new("retry_success_total", "Total successful retries"),
            &["operation"],
        )?;
        registry.register(Box::new(retry_success.clone()))?;

        let retry_failure = IntCounterVec::new(
            Opts::new("retry_failure_total", "Total failed retries after all attempts"),
            &["operation"],
        )?;
        registry.register(Box::new(retry_failure.clone()))?;

        // DLQ Metrics
        let dlq_messages_total = IntCounter::new(
            "dlq_messages_total",
            "Total messages in dead letter queue",
        )?;
        registry.register(Box::new(dlq_messages_total.clone()))?;

        let dlq_messages_by_source = IntCounterVec::new(
            Opts::new("dlq_messages_by_source", "DLQ messages by source and event type"),
            &["source", "event_type"],
        )?;
        registry.register(Box::new(dlq_messages_by_source.clone()))?;

        // Circuit Breaker Metrics
        let circuit_breaker_state = IntGauge::new(
            "circuit_breaker_state",
            "Circuit breaker state (0=Closed, 1=Open, 2=HalfOpen)",
        )?;
        registry.register(Box::new(circuit_breaker_state.clone()))?;

        let circuit_breaker_transitions = IntCounterVec::new(
            Opts::new("circuit_breaker_transitions_total", "Circuit breaker state transitions"),
            &["from_state", "to_state"],
        )?;
        registry.register(Box::new(circuit_breaker_transitions.clone()))?;

        // Consistency Metrics
        let consistency_failures = IntCounterVec::new(
            Opts::new(
                "consistency_failures_total",
                "Cross-store writes that left the stores out of step",
            ),
            &["operation"],
        )?;
        registry.register(Box::new(consistency_failures.clone()))?;

        Ok(Self {
            registry,
            outbox_published,
            outbox_failed,
            projection_applied,
            projection_failed,
            projection_duration,
            retry_attempts_total,
            retry_success,
            retry_failure,
            dlq_messages_total,
            dlq_messages_by_source,
            circuit_breaker_state,
            circuit_breaker_transitions,
            consistency_failures,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_outbox_published(&self, topic: &str) {
        self.outbox_published.with_label_values(&[topic]).inc();
    }

    pub fn record_outbox_failure(&self, topic: &str) {
        self.outbox_failed.with_label_values(&[topic]).inc();
    }

    /// Helper to record one projected event
    pub fn record_projection(&self, aggregate: &str, outcome: &str, duration_secs: f64) {
        self.projection_applied.with_label_values(&[aggregate, outcome]).inc();
        self.projection_duration.with_label_values(&[aggregate]).observe(duration_secs);
    }

    pub fn record_projection_failure(&self, aggregate: &str, reason: &str, duration_secs: f64) {
        self.projection_failed.with_label_values(&[aggregate, reason]).inc();
        self.projection_duration.with_label_values(&[aggregate]).observe(duration_secs);
    }

    /// Helper to record retry attempt
    pub fn record_retry_attempt(&self, operation: &str, attempt: u32) {
        self.retry_attempts_total.with_label_values(&[operation, &attempt.to_string()]).inc();
    }

    /// Helper to record retry outcome
    pub fn record_retry_outcome(&self, operation: &str, success: bool) {
        if success {
            self.retry_success.with_label_values(&[operation]).inc();
        } else {
            self.retry_failure.with_label_values(&[operation]).inc();
        }
    }

    /// Helper to record DLQ message
    pub fn record_dlq_message(&self, source: &str, event_type: &str) {
        self.dlq_messages_total.inc();
        self.dlq_messages_by_source.with_label_values(&[source, event_type]).inc();
    }

    /// Helper to update circuit breaker state
    pub fn update_circuit_breaker_state(&self, state: u8) {
        self.circuit_breaker_state.set(state as i64);
    }

    /// Helper to record circuit breaker transition
    pub fn record_circuit_breaker_transition(&self, from_state: &str, to_state: &str) {
        self.circuit_breaker_transitions.with_label_values(&[from_state, to_state]).inc();
    }

    pub fn record_consistency_failure(&self, operation: &str) {
        self.consistency_failures.with_label_values(&[operation]).inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter_total(metrics: &Metrics, name: &str) -> f64 {
        metrics
            .registry
            .gather()
            .iter()
            .find(|family| family.name() == name)
            .map(|family| family.metric.iter().map(|m| m.counter.value.unwrap_or_default()).sum())
            .unwrap_or(0.0)
    }

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        metrics.dlq_messages_total.inc_by(0);
        assert!(!metrics.registry.gather().is_empty());
    }

    #[test]
    fn test_record_projection() {
        let metrics = Metrics::new().unwrap();
        metrics.record_projection("Account", "inserted", 0.002);
        metrics.record_projection("Account", "updated", 0.004);
        metrics.record_projection_failure("Customer", "unknown_status", 0.001);

        assert_eq!(counter_total(&metrics, "projection_events_applied_total"), 2.0);
        assert_eq!(counter_total(&metrics, "projection_events_failed_total"), 1.0);
    }

    #[test]
    fn test_record_retry() {
        let metrics = Metrics::new().unwrap();
        metrics.record_retry_attempt("kafka_publish", 1);
        metrics.record_retry_attempt("kafka_publish", 2);
        metrics.record_retry_outcome("kafka_publish", true);

        let gathered = metrics.registry.gather();
        let attempts = gathered.iter().find(|m| m.name() == "retry_attempts_total").unwrap();
        assert_eq!(attempts.metric.len(), 2); // Two different attempt labels
    }

    #[test]
    fn test_record_dlq_message() {
        let metrics = Metrics::new().unwrap();
        metrics.record_dlq_message("relay", "AccountCreated");
        metrics.record_dlq_message("projection", "CustomerUpdated");

        assert_eq!(counter_total(&metrics, "dlq_messages_total"), 2.0);
        assert_eq!(counter_total(&metrics, "dlq_messages_by_source"), 2.0);
    }

    #[test]
    fn test_circuit_breaker_metrics() {
        let metrics = Metrics::new().unwrap();
        metrics.update_circuit_breaker_state(0); // Closed
        metrics.record_circuit_breaker_transition("Closed", "Open");
        metrics.update_circuit_breaker_state(1); // Open

        assert_eq!(metrics.circuit_breaker_state.get(), 1);
        assert_eq!(counter_total(&metrics, "circuit_breaker_transitions_total"), 1.0);
    }
}
