//! Reporter that records signals instead of sending them.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use super::Reporter;
use crate::error::{Error, Result};
use crate::event::LifecycleEvent;
use crate::outcome::Outcome;

/// A report captured by [`RecordingReporter`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedReport {
    /// The event the report answered.
    pub event: LifecycleEvent,
    /// The outcome sent.
    pub outcome: Outcome,
}

/// In-memory reporter for tests.
///
/// Every call is counted, including calls made while delivery is switched
/// off with [`RecordingReporter::fail_deliveries`].
#[derive(Debug, Default)]
pub struct RecordingReporter {
    reports: RwLock<Vec<RecordedReport>>,
    calls: AtomicUsize,
    failing: AtomicBool,
}

fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::internal("reporter lock poisoned")
}

impl RecordingReporter {
    /// Creates an empty reporter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent reports fail (or succeed again).
    pub fn fail_deliveries(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of `report` calls so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Reports that were delivered, in order.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn reports(&self) -> Result<Vec<RecordedReport>> {
        let reports = self.reports.read().map_err(poison_err)?;
        Ok(reports.clone())
    }

    /// The most recently delivered outcome.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn last_outcome(&self) -> Result<Option<Outcome>> {
        let reports = self.reports.read().map_err(poison_err)?;
        Ok(reports.last().map(|report| report.outcome.clone()))
    }
}

#[async_trait]
impl Reporter for RecordingReporter {
    async fn report(&self, event: &LifecycleEvent, outcome: &Outcome) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::report("callback endpoint unreachable"));
        }

        let mut reports = self.reports.write().map_err(poison_err)?;
        reports.push(RecordedReport {
            event: event.clone(),
            outcome: outcome.clone(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::rule_add_status;
    use serde_json::json;

    fn event() -> LifecycleEvent {
        LifecycleEvent::salvage(&json!({"ResponseURL": "https://callbacks.example/r"}))
            .unwrap_or_else(|| unreachable!())
    }

    #[tokio::test]
    async fn records_reports_in_order() -> Result<()> {
        let reporter = RecordingReporter::new();
        reporter
            .report(&event(), &Outcome::success("a", rule_add_status("200")))
            .await?;
        reporter
            .report(&event(), &Outcome::success("b", rule_add_status("200")))
            .await?;

        assert_eq!(reporter.calls(), 2);
        let reports = reporter.reports()?;
        assert_eq!(reports[0].outcome.physical_id, "a");
        assert_eq!(
            reporter.last_outcome()?.map(|o| o.physical_id),
            Some("b".to_string())
        );
        Ok(())
    }

    #[tokio::test]
    async fn failing_reporter_counts_calls() {
        let reporter = RecordingReporter::new();
        reporter.fail_deliveries(true);
        let result = reporter
            .report(&event(), &Outcome::success("a", rule_add_status("200")))
            .await;
        assert!(matches!(result, Err(Error::Report { .. })));
        assert_eq!(reporter.calls(), 1);
        assert!(reporter.reports().is_ok_and(|r| r.is_empty()));
    }
}
