//! Invocation outcomes reported back to the orchestrator.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Attribute carrying the mutation status (`HTTPStatusCode-<code>`).
pub const RULE_ADD_STATUS: &str = "rule_add_status";

/// Attribute carrying the [`FailureKind`] of a failed outcome.
pub const FAILURE_KIND: &str = "failure_kind";

/// Status marker for an Update that changed nothing.
pub const NO_UPDATES_MADE: &str = "no_updates_made";

/// Status marker for a Delete acknowledged without reverting the rule.
pub const DELETE_TRIGGERED: &str = "delete_triggered";

/// Completion status sent in the callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseStatus {
    /// The lifecycle operation succeeded.
    Success,
    /// The lifecycle operation failed; the orchestrator rolls back.
    Failed,
}

impl ResponseStatus {
    /// Returns the wire value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category of a failed outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The payload was not a lifecycle event.
    InvalidEvent,
    /// Resource properties were missing or malformed.
    InvalidProperties,
    /// Unknown request type.
    UnsupportedRequestType,
    /// Fail-injection requested on Create.
    InjectedFailure,
    /// The target could not be read.
    ResourceUnreadable,
    /// The optimistic-lock token was superseded.
    LockTokenStale,
    /// Transport, timeout, or service-side failure.
    ControlPlaneUnavailable,
    /// Anything else, including panics.
    Internal,
}

impl FailureKind {
    /// Returns the attribute value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidEvent => "invalid_event",
            Self::InvalidProperties => "invalid_properties",
            Self::UnsupportedRequestType => "unsupported_request_type",
            Self::InjectedFailure => "injected_failure",
            Self::ResourceUnreadable => "resource_unreadable",
            Self::LockTokenStale => "lock_token_stale",
            Self::ControlPlaneUnavailable => "control_plane_unavailable",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one lifecycle invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outcome {
    /// Success or failure.
    pub status: ResponseStatus,
    /// Stable identifier of the provisioned resource.
    pub physical_id: String,
    /// Human-readable reason (failures carry the error message).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Attributes exposed to the orchestrator.
    pub data: BTreeMap<String, String>,
}

impl Outcome {
    /// Creates a successful outcome.
    #[must_use]
    pub fn success(physical_id: impl Into<String>, data: BTreeMap<String, String>) -> Self {
        Self {
            status: ResponseStatus::Success,
            physical_id: physical_id.into(),
            reason: None,
            data,
        }
    }

    /// Creates a failed outcome tagged with its kind.
    #[must_use]
    pub fn failed(
        physical_id: impl Into<String>,
        kind: FailureKind,
        reason: impl Into<String>,
    ) -> Self {
        let mut data = BTreeMap::new();
        data.insert(FAILURE_KIND.to_string(), kind.as_str().to_string());
        Self {
            status: ResponseStatus::Failed,
            physical_id: physical_id.into(),
            reason: Some(reason.into()),
            data,
        }
    }

    /// Returns true if the outcome is a success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }

    /// Returns an attribute value.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str)
    }

    /// Returns the failure kind of a failed outcome.
    #[must_use]
    pub fn failure_kind(&self) -> Option<&str> {
        self.attribute(FAILURE_KIND)
    }
}

/// Builds the `rule_add_status` attribute map for a status marker.
#[must_use]
pub fn rule_add_status(marker: &str) -> BTreeMap<String, String> {
    let mut data = BTreeMap::new();
    data.insert(RULE_ADD_STATUS.to_string(), format!("HTTPStatusCode-{marker}"));
    data
}
