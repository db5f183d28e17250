//! Delivery metrics
//!
//! Recorded through the `metrics` facade. Installing an exporter is up to the
//! binary.

use crate::models::DeliveryStrategy;
use crate::provider::FailureKind;
use metrics::{counter, histogram};
use std::time::Duration;

/// Metrics helper for the delivery path
#[derive(Debug, Clone, Copy)]
pub struct DispatchMetrics {
    strategy: DeliveryStrategy,
}

impl DispatchMetrics {
    pub fn new(strategy: DeliveryStrategy) -> Self {
        Self { strategy }
    }

    /// A job left the trigger and was accepted by the backend
    pub fn dispatched(&self) {
        counter!(
            "notifications_dispatched_total",
            "strategy" => self.strategy.to_string()
        )
        .increment(1);
    }

    pub fn failed(&self, kind: FailureKind) {
        counter!(
            "notifications_failed_total",
            "strategy" => self.strategy.to_string(),
            "kind" => kind.as_ref().to_string()
        )
        .increment(1);
    }

    pub fn retried(&self) {
        counter!(
            "notifications_retried_total",
            "strategy" => self.strategy.to_string()
        )
        .increment(1);
    }

    /// Time spent inside the transmission provider
    pub fn delivery_duration(&self, duration: Duration) {
        histogram!(
            "notification_delivery_duration_seconds",
            "strategy" => self.strategy.to_string()
        )
        .record(duration.as_secs_f64());
    }
}
