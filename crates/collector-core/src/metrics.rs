//! Metrics for the collector pipeline.
//!
//! Thin wrapper over the `metrics` facade; exporter wiring is left to the
//! embedding process.

use metrics::{counter, histogram};
use std::time::Duration;

/// Metric names as constants for consistency
pub mod names {
    pub const MESSAGES_RECEIVED: &str = "collector_messages_received_total";
    pub const BATCHES_PUBLISHED: &str = "collector_batches_published_total";
    pub const BATCH_SIZE: &str = "collector_batch_size";
    pub const PUBLISH_LATENCY: &str = "collector_publish_latency_seconds";
    pub const PUBLISH_FAILURES: &str = "collector_publish_failures_total";
    pub const ACK_FAILURES: &str = "collector_ack_failures_total";
}

/// Pipeline metrics, labeled by component
#[derive(Clone)]
pub struct CollectorMetrics {
    component: String,
}

impl CollectorMetrics {
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
        }
    }

    /// Record one message forwarded into the pipeline
    pub fn record_message_received(&self) {
        counter!(names::MESSAGES_RECEIVED, "component" => self.component.clone()).increment(1);
    }

    /// Record a successfully published batch and its size
    pub fn record_batch_published(&self, size: usize, reason: &str) {
        counter!(
            names::BATCHES_PUBLISHED,
            "component" => self.component.clone(),
            "reason" => reason.to_string(),
        )
        .increment(1);
        histogram!(names::BATCH_SIZE, "component" => self.component.clone()).record(size as f64);
    }

    /// Record downstream publish latency
    pub fn record_publish_latency(&self, duration: Duration) {
        histogram!(names::PUBLISH_LATENCY, "component" => self.component.clone())
            .record(duration.as_secs_f64());
    }

    /// Record a failed publish attempt
    pub fn record_publish_failure(&self) {
        counter!(names::PUBLISH_FAILURES, "component" => self.component.clone()).increment(1);
    }

    /// Record a failed acknowledgment
    pub fn record_ack_failure(&self) {
        counter!(names::ACK_FAILURES, "component" => self.component.clone()).increment(1);
    }
}
