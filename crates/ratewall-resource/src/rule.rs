//! Web ACL targets and the rate-based rule installed into them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Priority of the installed rate rule.
pub const RATE_RULE_PRIORITY: i32 = 133;

/// Metric name of the web ACL's own visibility config.
pub const ACL_METRIC_NAME: &str = "secureApiThrottlingMetric";

/// Where a web ACL lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Scope {
    /// Regional resources (API Gateway stages, load balancers).
    Regional,
    /// CloudFront distributions.
    #[serde(rename = "CLOUDFRONT")]
    CloudFront,
}

impl Scope {
    /// Returns the control-plane value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Regional => "REGIONAL",
            Self::CloudFront => "CLOUDFRONT",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "REGIONAL" => Ok(Self::Regional),
            "CLOUDFRONT" => Ok(Self::CloudFront),
            other => Err(Error::invalid_properties(format!(
                "web ACL scope must be REGIONAL or CLOUDFRONT (got {other})"
            ))),
        }
    }
}

/// The web ACL a lifecycle event points at.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetAcl {
    /// Web ACL name.
    pub name: String,
    /// Web ACL id.
    pub id: String,
    /// Web ACL scope.
    pub scope: Scope,
}

impl TargetAcl {
    /// Creates a new target.
    #[must_use]
    pub fn new(name: impl Into<String>, id: impl Into<String>, scope: Scope) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
            scope,
        }
    }

    /// Key used to serialize mutations of this web ACL.
    #[must_use]
    pub fn lock_key(&self) -> String {
        format!("{}/{}/{}", self.scope, self.name, self.id)
    }
}

impl fmt::Display for TargetAcl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.scope, self.name, self.id)
    }
}

/// Action taken when a rule matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    /// Reject the request.
    Block,
}

/// What a rate-based statement counts requests by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AggregateKey {
    /// Client IP address.
    Ip,
}

/// Sampling and metrics settings of a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Visibility {
    /// Keep sampled matching requests.
    pub sampled_requests: bool,
    /// Publish metrics.
    pub cloudwatch_metrics: bool,
    /// Metric name.
    pub metric_name: String,
}

/// The rate-based rule the handler installs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateRule {
    /// Rule name (`limit_rps_to_<limit>`).
    pub name: String,
    /// Evaluation priority.
    pub priority: i32,
    /// Requests allowed per client over the rolling window.
    pub limit: u64,
    /// Action on match.
    pub action: RuleAction,
    /// Aggregation key.
    pub aggregate_key: AggregateKey,
    /// Visibility settings.
    pub visibility: Visibility,
}

impl RateRule {
    /// Builds the block-by-client-IP rule for `limit`.
    #[must_use]
    pub fn block_by_ip(limit: u64) -> Self {
        let name = format!("limit_rps_to_{limit}");
        Self {
            visibility: Visibility {
                sampled_requests: true,
                cloudwatch_metrics: true,
                metric_name: format!("{name}_metric"),
            },
            name,
            priority: RATE_RULE_PRIORITY,
            limit,
            action: RuleAction::Block,
            aggregate_key: AggregateKey::Ip,
        }
    }
}

/// A rule as read back from the control plane.
///
/// Only the fields needed for audit logging; rules the handler did not
/// write may use statements other than rate-based ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSummary {
    /// Rule name.
    pub name: String,
    /// Evaluation priority.
    pub priority: i32,
    /// Rate limit, if the rule is rate-based.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<u64>,
}

impl From<&RateRule> for RuleSummary {
    fn from(rule: &RateRule) -> Self {
        Self {
            name: rule.name.clone(),
            priority: rule.priority,
            rate_limit: Some(rule.limit),
        }
    }
}
