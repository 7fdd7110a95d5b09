//! Prometheus metrics for the booking engine.
//!
//! Counters and histograms are recorded through the `metrics` facade and are
//! no-ops until a recorder is installed. [`MetricsExporter::install`]
//! installs the Prometheus recorder and exposes the text rendering; serving
//! it over HTTP is left to the embedding service.
//!
//! # Example
//!
//! ```rust,no_run
//! use homeservice_runtime::metrics::MetricsExporter;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let exporter = MetricsExporter::install()?;
//! println!("{}", exporter.render());
//! # Ok(())
//! # }
//! ```

use homeservice_core::{Audience, BookingKind, Topic};
use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::sync::Once;
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Installed Prometheus recorder.
pub struct MetricsExporter {
    handle: PrometheusHandle,
}

impl MetricsExporter {
    /// Register metric descriptions and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::Install`] if a global recorder is already
    /// installed; only one may exist per process.
    pub fn install() -> Result<Self, MetricsError> {
        register_metrics();

        let handle = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?
            .install_recorder()
            .map_err(|e| MetricsError::Install(e.to_string()))?;

        tracing::info!("Prometheus metrics recorder installed");
        Ok(Self { handle })
    }

    /// Render current metrics in Prometheus text format.
    #[must_use]
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Register all metric descriptions (idempotent).
pub fn register_metrics() {
    static REGISTER: Once = Once::new();

    REGISTER.call_once(|| {
        // Lifecycle
        describe_counter!("booking_created_total", "Bookings created");
        describe_counter!(
            "booking_transitions_applied_total",
            "Transitions whose guarded update matched and committed"
        );
        describe_counter!(
            "booking_transition_conflicts_total",
            "Transitions rejected because the booking was not in the expected state"
        );
        describe_counter!(
            "booking_transition_failures_total",
            "Transitions rolled back on a storage failure"
        );
        describe_histogram!(
            "booking_transition_duration_seconds",
            "Time taken to execute a transition, retries included"
        );

        // Side effects
        describe_counter!("booking_allocations_recorded_total", "Allocation ledger writes");
        describe_counter!("booking_notifications_emitted_total", "Notification rows written");
        describe_counter!(
            "booking_notifications_dismissed_total",
            "Notifications hidden by an audience"
        );

        // Retry
        describe_counter!("booking_retry_attempts_total", "Retries of failed transitions");
        describe_counter!("booking_retry_successes_total", "Transitions that succeeded after a retry");
        describe_counter!("booking_retry_exhausted_total", "Transitions that ran out of retries");
    });
}

/// Lifecycle metrics recorder.
pub struct BookingMetrics;

impl BookingMetrics {
    /// Record a created booking.
    pub fn record_created(kind: BookingKind) {
        counter!("booking_created_total", "kind" => kind.as_str()).increment(1);
    }

    /// Record an applied transition.
    pub fn record_applied(kind: BookingKind, transition: &'static str, duration: Duration) {
        counter!("booking_transitions_applied_total", "kind" => kind.as_str(), "transition" => transition)
            .increment(1);
        histogram!("booking_transition_duration_seconds", "transition" => transition)
            .record(duration.as_secs_f64());
    }

    /// Record a guard conflict.
    pub fn record_conflict(kind: BookingKind, transition: &'static str) {
        counter!("booking_transition_conflicts_total", "kind" => kind.as_str(), "transition" => transition)
            .increment(1);
    }

    /// Record a rolled-back transition.
    pub fn record_failure(kind: BookingKind, transition: &'static str) {
        counter!("booking_transition_failures_total", "kind" => kind.as_str(), "transition" => transition)
            .increment(1);
    }

    /// Record an allocation write.
    pub fn record_allocation(kind: BookingKind) {
        counter!("booking_allocations_recorded_total", "kind" => kind.as_str()).increment(1);
    }
}

/// Notification metrics recorder.
pub struct NotificationMetrics;

impl NotificationMetrics {
    /// Record an emitted notification.
    pub fn record_emitted(topic: Topic, kind: BookingKind) {
        counter!("booking_notifications_emitted_total", "description" => topic.description(kind))
            .increment(1);
    }

    /// Record dismissed notifications.
    pub fn record_dismissed(audience: Audience, count: u64) {
        if count > 0 {
            counter!("booking_notifications_dismissed_total", "audience" => audience.as_str())
                .increment(count);
        }
    }
}

/// Retry metrics recorder.
pub struct RetryMetrics;

impl RetryMetrics {
    /// Record a retry attempt.
    pub fn record_attempt() {
        counter!("booking_retry_attempts_total").increment(1);
    }

    /// Record a successful retry.
    pub fn record_success() {
        counter!("booking_retry_successes_total").increment(1);
    }

    /// Record exhausted retries.
    pub fn record_exhausted() {
        counter!("booking_retry_exhausted_total").increment(1);
    }
}
