//! Control-plane abstraction for the rate-limited web ACL.
//!
//! This module provides:
//!
//! - [`ControlPlane`]: Trait for reading a web ACL and replacing its rules
//! - [`ExternalResourceState`]: Freshly fetched state plus its [`LockToken`]
//! - [`memory::InMemoryControlPlane`]: In-memory implementation for tests
//! - `wafv2::WafV2ControlPlane`: AWS WAFv2 implementation (feature `aws`)
//!
//! ## Design Principles
//!
//! - **Fresh reads**: State is fetched on every invocation; nothing is cached
//! - **Optimistic locking**: Mutations are conditioned on the fetched token
//! - **Full replace**: Applying a rule destroys the previous rule set

pub mod memory;
#[cfg(feature = "aws")]
pub mod wafv2;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::rule::{RateRule, RuleSummary, TargetAcl};

/// Opaque version of a web ACL required for conditional updates.
///
/// Not `Clone`: the mutation it guards consumes it, so only the invocation
/// that fetched a token can present it.
#[derive(PartialEq, Eq)]
pub struct LockToken(String);

impl LockToken {
    /// Wraps a token returned by the control plane.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the token value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the owned token value.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Debug for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LockToken").field(&self.0).finish()
    }
}

/// Current state of a web ACL, fetched fresh for one invocation.
#[derive(Debug)]
pub struct ExternalResourceState {
    /// The web ACL that was read.
    pub target: TargetAcl,
    /// ARN, when the control plane reports one.
    pub arn: Option<String>,
    /// Rules currently installed.
    pub rules: Vec<RuleSummary>,
    /// Token the next conditional update must present.
    pub lock_token: LockToken,
}

/// Result of a successful conditional update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationResult {
    /// Whether the service accepted the update.
    pub success: bool,
    /// HTTP status of the update call.
    pub status_code: u16,
    /// Token issued for the new version, if returned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_lock_token: Option<String>,
}

impl MutationResult {
    /// Creates a result from an HTTP status.
    #[must_use]
    pub fn from_status(status_code: u16, next_lock_token: Option<String>) -> Self {
        Self {
            success: (200..300).contains(&status_code),
            status_code,
            next_lock_token,
        }
    }
}

/// Reads and conditionally mutates the rate-limited web ACL.
///
/// Implementations must surface a superseded token as
/// [`Error::StaleLockToken`](crate::error::Error::StaleLockToken) and must
/// not retry; the orchestrator owns retry policy.
///
/// ## Example
///
/// ```rust,ignore
/// use ratewall_resource::control_plane::ControlPlane;
/// use ratewall_resource::rule::{RateRule, TargetAcl};
///
/// async fn install<C: ControlPlane>(cp: &C, target: &TargetAcl) -> Result<()> {
///     let state = cp.fetch(target).await?;
///     let result = cp
///         .apply_rate_limit(target, &RateRule::block_by_ip(110), state.lock_token)
///         .await?;
///     println!("status {}", result.status_code);
/// }
/// ```
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Retrieves the current rule configuration and lock token.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failures or when the web ACL is not
    /// found; callers must not guess a token.
    async fn fetch(&self, target: &TargetAcl) -> Result<ExternalResourceState>;

    /// Replaces the entire rule set with `rule`, conditioned on `lock_token`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StaleLockToken`](crate::error::Error::StaleLockToken)
    /// if another writer updated the web ACL since the token was read, and a
    /// control-plane error on transport or service failures.
    async fn apply_rate_limit(
        &self,
        target: &TargetAcl,
        rule: &RateRule,
        lock_token: LockToken,
    ) -> Result<MutationResult>;

    /// Returns a short backend name for logs and metrics.
    fn backend_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mutation_result_success_follows_status() {
        assert!(MutationResult::from_status(200, None).success);
        assert!(!MutationResult::from_status(500, None).success);
        assert!(!MutationResult::from_status(409, None).success);
    }

    #[test]
    fn lock_token_round_trip() {
        let token = LockToken::new("tok-1");
        assert_eq!(token.as_str(), "tok-1");
        assert_eq!(format!("{token:?}"), "LockToken(\"tok-1\")");
        assert_eq!(token.into_inner(), "tok-1");
    }
}
