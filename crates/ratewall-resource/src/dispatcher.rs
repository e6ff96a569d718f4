//! Routing of lifecycle events to their branch.
//!
//! Only Create mutates the web ACL. Update and Delete read it for the audit
//! log and acknowledge without changing anything; the rule installed on
//! Create stays in place when the stack is deleted.

use std::sync::Arc;

use ratewall_core::HandlerConfig;

use crate::control_plane::{ControlPlane, ExternalResourceState, MutationResult};
use crate::error::{Error, Result};
use crate::event::{LifecycleEvent, RPS_LIMIT, RequestType};
use crate::metrics::ResourceMetrics;
use crate::outcome::{DELETE_TRIGGERED, NO_UPDATES_MADE, Outcome, rule_add_status};
use crate::rule::{RateRule, TargetAcl};

const FETCH: &str = "fetch";
const APPLY: &str = "apply";

/// Routes lifecycle events and drives the control plane.
pub struct LifecycleDispatcher<C: ControlPlane + ?Sized> {
    control_plane: Arc<C>,
    default_rate_limit: u64,
    physical_id: String,
    metrics: ResourceMetrics,
}

impl<C: ControlPlane + ?Sized> LifecycleDispatcher<C> {
    /// Creates a dispatcher over `control_plane`.
    #[must_use]
    pub fn new(control_plane: Arc<C>, config: &HandlerConfig) -> Self {
        Self {
            control_plane,
            default_rate_limit: config.default_rate_limit,
            physical_id: config.physical_id.clone(),
            metrics: ResourceMetrics::new(),
        }
    }

    /// Physical id to report for `event`.
    ///
    /// Create uses the configured id; later events echo the id the
    /// orchestrator already holds so it never changes.
    #[must_use]
    pub fn physical_id_for(&self, event: &LifecycleEvent) -> String {
        match (&event.request_type, event.physical_resource_id.as_deref()) {
            (RequestType::Create, _) | (_, None | Some("")) => self.physical_id.clone(),
            (_, Some(existing)) => existing.to_string(),
        }
    }

    /// Handles `event`, converting any error into a tagged failure.
    pub async fn dispatch(&self, event: &LifecycleEvent) -> Outcome {
        match self.try_dispatch(event).await {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!(
                    error = %err,
                    failure_kind = %err.failure_kind(),
                    "lifecycle event failed"
                );
                Outcome::failed(self.physical_id_for(event), err.failure_kind(), err.to_string())
            }
        }
    }

    /// Handles `event`.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown request types and for any Create failure.
    pub async fn try_dispatch(&self, event: &LifecycleEvent) -> Result<Outcome> {
        match &event.request_type {
            RequestType::Create => self.create(event).await,
            RequestType::Update => {
                self.audit(event).await;
                if let Some(old) = &event.old_resource_properties {
                    let before = old.get_str(RPS_LIMIT);
                    let after = event.resource_properties.get_str(RPS_LIMIT);
                    if before != after {
                        tracing::warn!(
                            before = ?before,
                            after = ?after,
                            "rate limit changed but updates are not applied; replace the resource to change it"
                        );
                    }
                }
                Ok(Outcome::success(
                    self.physical_id_for(event),
                    rule_add_status(NO_UPDATES_MADE),
                ))
            }
            RequestType::Delete => {
                self.audit(event).await;
                Ok(Outcome::success(
                    self.physical_id_for(event),
                    rule_add_status(DELETE_TRIGGERED),
                ))
            }
            RequestType::Other(other) => Err(Error::UnsupportedRequestType {
                request_type: other.clone(),
            }),
        }
    }

    /// Installs the rate rule requested by a Create.
    ///
    /// # Errors
    ///
    /// Returns an error if the properties are invalid, the web ACL cannot be
    /// read, fail-injection was requested, or the update is rejected.
    #[tracing::instrument(skip(self, event), fields(web_acl = tracing::field::Empty, limit = tracing::field::Empty))]
    pub async fn create(&self, event: &LifecycleEvent) -> Result<Outcome> {
        let properties = &event.resource_properties;
        let target = properties.target()?;
        let limit = properties.rate_limit(self.default_rate_limit)?;

        let span = tracing::Span::current();
        span.record("web_acl", tracing::field::display(&target));
        span.record("limit", limit);

        let state = self.fetch(&target).await?;

        if properties.fail_create() {
            tracing::warn!("create failure requested; leaving web ACL untouched");
            return Err(Error::InjectedFailure);
        }

        let rule = RateRule::block_by_ip(limit);
        let result = self.apply(&target, &rule, state).await?;
        if !result.success {
            return Err(Error::control_plane_status(
                format!("update of {target} returned HTTP {}", result.status_code),
                result.status_code,
            ));
        }

        tracing::info!(
            rule = %rule.name,
            status_code = result.status_code,
            "rate rule installed"
        );
        Ok(Outcome::success(
            self.physical_id.clone(),
            rule_add_status(&result.status_code.to_string()),
        ))
    }

    /// Reads the target for the audit log.
    ///
    /// Failures are logged and swallowed: Update and Delete never touch the
    /// web ACL, and a failure here must not block stack deletion.
    pub async fn audit(&self, event: &LifecycleEvent) {
        let target = match event.resource_properties.target() {
            Ok(target) => target,
            Err(err) => {
                tracing::warn!(error = %err, "skipping audit read");
                return;
            }
        };

        if let Err(err) = self.fetch(&target).await {
            tracing::warn!(web_acl = %target, error = %err, "audit read failed");
        }
    }

    async fn fetch(&self, target: &TargetAcl) -> Result<ExternalResourceState> {
        let backend = self.control_plane.backend_name();
        let result = self.control_plane.fetch(target).await;
        self.metrics
            .record_control_plane_call(backend, FETCH, &result_label(&result));

        let state = result?;
        let rules: Vec<&str> = state.rules.iter().map(|r| r.name.as_str()).collect();
        tracing::info!(
            web_acl = %target,
            arn = state.arn.as_deref().unwrap_or_default(),
            rules = ?rules,
            "fetched web ACL"
        );
        Ok(state)
    }

    async fn apply(
        &self,
        target: &TargetAcl,
        rule: &RateRule,
        state: ExternalResourceState,
    ) -> Result<MutationResult> {
        let backend = self.control_plane.backend_name();
        let result = self
            .control_plane
            .apply_rate_limit(target, rule, state.lock_token)
            .await;
        self.metrics
            .record_control_plane_call(backend, APPLY, &result_label(&result));
        result
    }
}

fn result_label<T>(result: &Result<T>) -> String {
    match result {
        Ok(_) => "ok".to_string(),
        Err(err) => err.failure_kind().to_string(),
    }
}
