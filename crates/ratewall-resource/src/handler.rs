//! Top-level lifecycle handler.
//!
//! [`CustomResourceHandler`] ties the pieces together for one invocation:
//!
//! 1. Mutations of the same web ACL are serialized within the process.
//! 2. The dispatcher runs; a panic inside it becomes a Failed outcome.
//! 3. The reporter is called exactly once, whatever happened above.
//!
//! A redelivered request goes through the same steps. The dispatcher always
//! re-fetches the web ACL, so no earlier outcome is reused.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use ratewall_core::HandlerConfig;
use ratewall_core::observability::lifecycle_span;
use serde_json::Value;
use tracing::Instrument;

use crate::control_plane::ControlPlane;
use crate::dispatcher::LifecycleDispatcher;
use crate::error::Result;
use crate::event::LifecycleEvent;
use crate::guard::IdempotencyGuard;
use crate::metrics::{EventTimer, ResourceMetrics};
use crate::outcome::{FailureKind, Outcome};
use crate::reporter::Reporter;

/// Handles lifecycle events end to end.
pub struct CustomResourceHandler<C: ControlPlane + ?Sized, R: Reporter + ?Sized> {
    dispatcher: LifecycleDispatcher<C>,
    reporter: Arc<R>,
    guard: Arc<IdempotencyGuard>,
    metrics: ResourceMetrics,
}

impl<C: ControlPlane + ?Sized, R: Reporter + ?Sized> CustomResourceHandler<C, R> {
    /// Creates a handler from its collaborators.
    #[must_use]
    pub fn new(
        control_plane: Arc<C>,
        reporter: Arc<R>,
        guard: Arc<IdempotencyGuard>,
        config: &HandlerConfig,
    ) -> Self {
        Self {
            dispatcher: LifecycleDispatcher::new(control_plane, config),
            reporter,
            guard,
            metrics: ResourceMetrics::new(),
        }
    }

    /// Handles a raw invocation payload.
    ///
    /// A payload that is not a lifecycle event but still names a
    /// `ResponseURL` is answered with an `invalid_event` failure.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be parsed and carries no
    /// `ResponseURL` to report to.
    pub async fn handle_value(&self, payload: Value) -> Result<Outcome> {
        let salvaged = LifecycleEvent::salvage(&payload);
        match LifecycleEvent::from_value(payload) {
            Ok(event) => Ok(self.handle(&event).await),
            Err(err) => {
                let Some(event) = salvaged else {
                    tracing::error!(error = %err, "unreportable payload; nothing to signal");
                    return Err(err);
                };
                let outcome = Outcome::failed(
                    self.dispatcher.physical_id_for(&event),
                    FailureKind::InvalidEvent,
                    err.to_string(),
                );
                let outcome = async {
                    tracing::error!(error = %err, "rejecting malformed lifecycle event");
                    self.finish(&event, outcome).await
                }
                .instrument(span_for(&event))
                .await;
                Ok(outcome)
            }
        }
    }

    /// Handles one lifecycle event and reports its outcome.
    ///
    /// Never fails: every error, including a panic in the dispatcher, is
    /// turned into a Failed outcome and reported.
    pub async fn handle(&self, event: &LifecycleEvent) -> Outcome {
        async {
            let _timer = EventTimer::start(event.request_type.as_str());
            tracing::info!(request_key = %event.idempotency_key(), "lifecycle event received");
            let outcome = self.resolve(event).await;
            self.finish(event, outcome).await
        }
        .instrument(span_for(event))
        .await
    }

    async fn resolve(&self, event: &LifecycleEvent) -> Outcome {
        let lock_key = event.resource_properties.target().map_or_else(
            |_| format!("logical/{}", event.logical_resource_id),
            |target| target.lock_key(),
        );
        let _permit = match self.guard.acquire(&lock_key).await {
            Ok(permit) => {
                tracing::debug!(
                    lock_key = %lock_key,
                    active_targets = self.guard.active_targets().unwrap_or_default(),
                    "target lock acquired"
                );
                Some(permit)
            }
            Err(err) => {
                tracing::warn!(error = %err, "proceeding without target lock");
                None
            }
        };

        match AssertUnwindSafe(self.dispatcher.dispatch(event))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(panic = %message, "dispatcher panicked");
                Outcome::failed(
                    self.dispatcher.physical_id_for(event),
                    FailureKind::Internal,
                    format!("handler panicked: {message}"),
                )
            }
        }
    }

    async fn finish(&self, event: &LifecycleEvent, outcome: Outcome) -> Outcome {
        tracing::Span::current().record("outcome", outcome.status.as_str());
        self.metrics
            .record_event(event.request_type.as_str(), outcome.status.as_str());

        if let Err(err) = self.reporter.report(event, &outcome).await {
            tracing::error!(error = %err, "failed to deliver completion signal");
        }
        outcome
    }
}

fn span_for(event: &LifecycleEvent) -> tracing::Span {
    lifecycle_span(
        event.request_type.as_str(),
        &event.request_id,
        &event.logical_resource_id,
        event.stack_name(),
    )
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_message_reads_common_payloads() {
        let literal: Box<dyn Any + Send> = Box::new("boom");
        let owned: Box<dyn Any + Send> = Box::new(String::from("bang"));
        let other: Box<dyn Any + Send> = Box::new(7_u8);

        assert_eq!(panic_message(literal.as_ref()), "boom");
        assert_eq!(panic_message(owned.as_ref()), "bang");
        assert_eq!(panic_message(other.as_ref()), "unknown panic payload");
    }
}
