//! AWS WAFv2 control-plane implementation.
//!
//! This module provides [`WafV2ControlPlane`], the production implementation
//! of the [`ControlPlane`] trait on top of the WAFv2 `GetWebACL` and
//! `UpdateWebACL` operations.
//!
//! ## Features
//!
//! - **Optimistic locking**: `WAFOptimisticLockException` surfaces as
//!   [`Error::StaleLockToken`] and is never retried here
//! - **Full replace**: The update carries only the rate rule, an `Allow`
//!   default action and the web ACL's own visibility config
//! - **Credentials**: Resolved through the default AWS provider chain
//!
//! ## Usage
//!
//! This module is only compiled when the `aws` feature is enabled:
//!
//! ```toml
//! [dependencies]
//! ratewall-resource = { version = "0.1", features = ["aws"] }
//! ```

use async_trait::async_trait;
use aws_sdk_wafv2::Client;
use aws_sdk_wafv2::error::{DisplayErrorContext, SdkError};
use aws_sdk_wafv2::types::{
    AllowAction, BlockAction, DefaultAction, RateBasedStatement,
    RateBasedStatementAggregateKeyType, Rule, RuleAction, Scope as WafScope, Statement,
    VisibilityConfig,
};

use super::{ControlPlane, ExternalResourceState, LockToken, MutationResult};
use crate::error::{Error, Result};
use crate::rule::{ACL_METRIC_NAME, RateRule, RuleSummary, Scope, TargetAcl};

/// WAFv2-backed control plane.
#[derive(Debug, Clone)]
pub struct WafV2ControlPlane {
    client: Client,
    description: String,
}

impl WafV2ControlPlane {
    /// Creates a control plane from an existing SDK client.
    #[must_use]
    pub fn new(client: Client, description: impl Into<String>) -> Self {
        Self {
            client,
            description: description.into(),
        }
    }

    /// Creates a control plane using the ambient AWS configuration
    /// (region, credentials, retry settings).
    pub async fn from_env(description: impl Into<String>) -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::new(Client::new(&config), description)
    }

    fn not_found(target: &TargetAcl) -> Error {
        Error::ResourceNotFound {
            name: target.name.clone(),
            id: target.id.clone(),
            scope: target.scope.to_string(),
        }
    }

    fn build_rule(rule: &RateRule) -> Result<Rule> {
        let limit = i64::try_from(rule.limit).map_err(|_| {
            Error::invalid_properties(format!("rate limit {} is out of range", rule.limit))
        })?;

        let statement = Statement::builder()
            .rate_based_statement(
                RateBasedStatement::builder()
                    .limit(limit)
                    .aggregate_key_type(RateBasedStatementAggregateKeyType::Ip)
                    .build()
                    .map_err(|e| Error::internal(format!("invalid rate statement: {e}")))?,
            )
            .build();

        let visibility = VisibilityConfig::builder()
            .sampled_requests_enabled(rule.visibility.sampled_requests)
            .cloud_watch_metrics_enabled(rule.visibility.cloudwatch_metrics)
            .metric_name(&rule.visibility.metric_name)
            .build()
            .map_err(|e| Error::internal(format!("invalid rule visibility: {e}")))?;

        Rule::builder()
            .name(&rule.name)
            .priority(rule.priority)
            .statement(statement)
            .action(RuleAction::builder().block(BlockAction::builder().build()).build())
            .visibility_config(visibility)
            .build()
            .map_err(|e| Error::internal(format!("invalid rule: {e}")))
    }

    fn acl_visibility() -> Result<VisibilityConfig> {
        VisibilityConfig::builder()
            .sampled_requests_enabled(true)
            .cloud_watch_metrics_enabled(true)
            .metric_name(ACL_METRIC_NAME)
            .build()
            .map_err(|e| Error::internal(format!("invalid web ACL visibility: {e}")))
    }
}

const fn waf_scope(scope: Scope) -> WafScope {
    match scope {
        Scope::Regional => WafScope::Regional,
        Scope::CloudFront => WafScope::Cloudfront,
    }
}

fn status_of<E>(err: &SdkError<E>) -> Option<u16> {
    err.raw_response().map(|response| response.status().as_u16())
}

#[async_trait]
impl ControlPlane for WafV2ControlPlane {
    #[tracing::instrument(skip(self, target), fields(web_acl = %target))]
    async fn fetch(&self, target: &TargetAcl) -> Result<ExternalResourceState> {
        let output = self
            .client
            .get_web_acl()
            .name(&target.name)
            .scope(waf_scope(target.scope))
            .id(&target.id)
            .send()
            .await
            .map_err(|err| {
                let status_code = status_of(&err);
                let message = format!("GetWebACL failed: {}", DisplayErrorContext(&err));
                let service_error = err.into_service_error();
                if service_error.is_waf_nonexistent_item_exception() {
                    Self::not_found(target)
                } else {
                    Error::ControlPlane {
                        message,
                        status_code,
                        source: Some(Box::new(service_error)),
                    }
                }
            })?;

        let lock_token = output
            .lock_token()
            .filter(|token| !token.is_empty())
            .ok_or_else(|| Error::control_plane("GetWebACL returned no lock token"))?;
        let web_acl = output.web_acl().ok_or_else(|| Self::not_found(target))?;

        let rules = web_acl
            .rules()
            .iter()
            .map(|rule| RuleSummary {
                name: rule.name().to_string(),
                priority: rule.priority(),
                rate_limit: rule
                    .statement()
                    .and_then(Statement::rate_based_statement)
                    .and_then(|statement| u64::try_from(statement.limit()).ok()),
            })
            .collect();

        Ok(ExternalResourceState {
            target: target.clone(),
            arn: Some(web_acl.arn().to_string()),
            rules,
            lock_token: LockToken::new(lock_token),
        })
    }

    #[tracing::instrument(skip(self, target, rule, lock_token), fields(web_acl = %target, rule = %rule.name))]
    async fn apply_rate_limit(
        &self,
        target: &TargetAcl,
        rule: &RateRule,
        lock_token: LockToken,
    ) -> Result<MutationResult> {
        let output = self
            .client
            .update_web_acl()
            .name(&target.name)
            .scope(waf_scope(target.scope))
            .id(&target.id)
            .default_action(
                DefaultAction::builder()
                    .allow(AllowAction::builder().build())
                    .build(),
            )
            .description(&self.description)
            .rules(Self::build_rule(rule)?)
            .visibility_config(Self::acl_visibility()?)
            .lock_token(lock_token.into_inner())
            .send()
            .await
            .map_err(|err| {
                let status_code = status_of(&err);
                let message = format!("UpdateWebACL failed: {}", DisplayErrorContext(&err));
                let service_error = err.into_service_error();
                if service_error.is_waf_optimistic_lock_exception() {
                    Error::StaleLockToken {
                        name: target.name.clone(),
                        id: target.id.clone(),
                    }
                } else if service_error.is_waf_nonexistent_item_exception() {
                    Self::not_found(target)
                } else {
                    Error::ControlPlane {
                        message,
                        status_code,
                        source: Some(Box::new(service_error)),
                    }
                }
            })?;

        // The SDK only yields an output for 2xx responses.
        Ok(MutationResult::from_status(
            200,
            output.next_lock_token().map(str::to_string),
        ))
    }

    fn backend_name(&self) -> &str {
        "wafv2"
    }
}
