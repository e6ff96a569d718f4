//! Observability metrics for the lifecycle handler.
//!
//! ## Metrics Exported
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `ratewall_events_total` | Counter | `request_type`, `status` | Lifecycle events by outcome |
//! | `ratewall_event_duration_seconds` | Histogram | `request_type` | Time from intake to report |
//! | `ratewall_control_plane_calls_total` | Counter | `backend`, `operation`, `result` | Control-plane calls |
//! | `ratewall_reports_total` | Counter | `result` | Callback deliveries |
//!
//! Metrics go through the `metrics` crate facade; without an installed
//! recorder every call is a no-op.

use std::time::{Duration, Instant};

use metrics::{counter, histogram};

/// Metric names as constants for consistency.
pub mod names {
    /// Counter: Lifecycle events by request type and status.
    pub const EVENTS_TOTAL: &str = "ratewall_events_total";
    /// Histogram: Event handling duration in seconds.
    pub const EVENT_DURATION_SECONDS: &str = "ratewall_event_duration_seconds";
    /// Counter: Control-plane calls.
    pub const CONTROL_PLANE_CALLS_TOTAL: &str = "ratewall_control_plane_calls_total";
    /// Counter: Callback delivery attempts that finished.
    pub const REPORTS_TOTAL: &str = "ratewall_reports_total";
}

/// Label keys used across metrics.
pub mod labels {
    /// Lifecycle request type.
    pub const REQUEST_TYPE: &str = "request_type";
    /// Outcome status (SUCCESS, FAILED).
    pub const STATUS: &str = "status";
    /// Control-plane backend name.
    pub const BACKEND: &str = "backend";
    /// Control-plane operation (fetch, apply).
    pub const OPERATION: &str = "operation";
    /// Call result (`ok` or a failure kind).
    pub const RESULT: &str = "result";
}

/// Records handler metrics with consistent labels.
#[derive(Debug, Clone, Default)]
pub struct ResourceMetrics;

impl ResourceMetrics {
    /// Creates a new metrics recorder.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Records a completed lifecycle event.
    pub fn record_event(&self, request_type: &str, status: &str) {
        counter!(
            names::EVENTS_TOTAL,
            labels::REQUEST_TYPE => request_type.to_string(),
            labels::STATUS => status.to_string(),
        )
        .increment(1);
    }

    /// Records event handling duration.
    pub fn observe_event_duration(&self, request_type: &str, duration: Duration) {
        histogram!(
            names::EVENT_DURATION_SECONDS,
            labels::REQUEST_TYPE => request_type.to_string(),
        )
        .record(duration.as_secs_f64());
    }

    /// Records a control-plane call.
    pub fn record_control_plane_call(&self, backend: &str, operation: &str, result: &str) {
        counter!(
            names::CONTROL_PLANE_CALLS_TOTAL,
            labels::BACKEND => backend.to_string(),
            labels::OPERATION => operation.to_string(),
            labels::RESULT => result.to_string(),
        )
        .increment(1);
    }

    /// Records a callback delivery.
    pub fn record_report(&self, result: &str) {
        counter!(names::REPORTS_TOTAL, labels::RESULT => result.to_string()).increment(1);
    }
}

/// Measures one lifecycle event from intake until its report is sent.
///
/// The duration lands in `ratewall_event_duration_seconds` when the timer
/// is dropped, so early returns and Failed outcomes are timed as well.
#[derive(Debug)]
pub struct EventTimer {
    request_type: String,
    started: Instant,
}

impl EventTimer {
    /// Starts timing an event of `request_type`.
    #[must_use]
    pub fn start(request_type: impl Into<String>) -> Self {
        Self {
            request_type: request_type.into(),
            started: Instant::now(),
        }
    }

    /// Time spent on the event so far.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl Drop for EventTimer {
    fn drop(&mut self) {
        ResourceMetrics::new().observe_event_duration(&self.request_type, self.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_record_without_recorder() {
        let metrics = ResourceMetrics::new();
        metrics.record_event("Create", "SUCCESS");
        metrics.record_control_plane_call("memory", "fetch", "ok");
        metrics.record_report("delivered");
        metrics.observe_event_duration("Delete", Duration::from_millis(3));
    }

    #[test]
    fn event_timer_tracks_elapsed_time() {
        let timer = EventTimer::start("Create");
        std::thread::sleep(Duration::from_millis(5));
        assert!(timer.elapsed() >= Duration::from_millis(5));
        drop(timer);
    }
}
