//! Completion signals sent back to the provisioning orchestrator.
//!
//! This module provides:
//!
//! - [`Reporter`]: Trait for delivering an [`Outcome`] for a [`LifecycleEvent`]
//! - [`ResponseBody`]: The callback document, kept under [`MAX_BODY_BYTES`]
//! - [`http::HttpReporter`]: Pre-signed URL `PUT` with retries
//! - [`memory::RecordingReporter`]: Records reports for tests

pub mod http;
pub mod memory;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::event::LifecycleEvent;
use crate::outcome::{Outcome, ResponseStatus};

/// Largest callback body the orchestrator accepts.
pub const MAX_BODY_BYTES: usize = 4096;

const TRUNCATION_MARKER: &str = "... [truncated]";

/// Reason sent when an outcome carries none.
#[must_use]
pub fn default_reason(log_stream_name: Option<&str>) -> String {
    format!(
        "See the details in CloudWatch Log Stream: {}",
        log_stream_name.unwrap_or("unavailable")
    )
}

/// Callback document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResponseBody {
    /// `SUCCESS` or `FAILED`.
    pub status: ResponseStatus,
    /// Human-readable reason.
    pub reason: String,
    /// Stable identifier of the resource.
    pub physical_resource_id: String,
    /// Echoed from the event.
    pub stack_id: String,
    /// Echoed from the event.
    pub request_id: String,
    /// Echoed from the event.
    pub logical_resource_id: String,
    /// Whether the orchestrator must mask `Data`.
    pub no_echo: bool,
    /// Attributes exposed to the template.
    pub data: BTreeMap<String, String>,
}

impl ResponseBody {
    /// Builds the callback document for an outcome.
    #[must_use]
    pub fn new(event: &LifecycleEvent, outcome: &Outcome, default_reason: &str) -> Self {
        Self {
            status: outcome.status,
            reason: outcome
                .reason
                .clone()
                .unwrap_or_else(|| default_reason.to_string()),
            physical_resource_id: outcome.physical_id.clone(),
            stack_id: event.stack_id.clone(),
            request_id: event.request_id.clone(),
            logical_resource_id: event.logical_resource_id.clone(),
            no_echo: false,
            data: outcome.data.clone(),
        }
    }

    /// Serializes the body, truncating the reason until it fits in
    /// [`MAX_BODY_BYTES`].
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails or the body is too large
    /// even with an empty reason.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let body = serde_json::to_vec(self).map_err(|e| Error::serialization(e.to_string()))?;
        if body.len() <= MAX_BODY_BYTES {
            return Ok(body);
        }

        let mut trimmed = self.clone();
        let mut keep = self
            .reason
            .len()
            .saturating_sub(body.len() - MAX_BODY_BYTES + TRUNCATION_MARKER.len());
        loop {
            trimmed.reason = format!(
                "{}{TRUNCATION_MARKER}",
                truncate_at_char_boundary(&self.reason, keep)
            );
            let body =
                serde_json::to_vec(&trimmed).map_err(|e| Error::serialization(e.to_string()))?;
            if body.len() <= MAX_BODY_BYTES {
                return Ok(body);
            }
            if keep == 0 {
                return Err(Error::serialization(format!(
                    "callback body is {} bytes without a reason (limit {MAX_BODY_BYTES})",
                    body.len()
                )));
            }
            // Escaped characters can take more than one byte per input byte.
            keep = keep.saturating_sub(body.len() - MAX_BODY_BYTES);
        }
    }
}

fn truncate_at_char_boundary(s: &str, max: usize) -> &str {
    let mut end = max.min(s.len());
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Delivers completion signals.
///
/// Implementations are called exactly once per event; a returned error is
/// logged by the caller and never retried there.
#[async_trait]
pub trait Reporter: Send + Sync {
    /// Sends `outcome` for `event`.
    ///
    /// # Errors
    ///
    /// Returns an error if the signal could not be delivered.
    async fn report(&self, event: &LifecycleEvent, outcome: &Outcome) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::{FailureKind, rule_add_status};
    use serde_json::json;

    fn event() -> LifecycleEvent {
        LifecycleEvent::salvage(&json!({
            "RequestType": "Create",
            "ResponseURL": "https://callbacks.example/response",
            "StackId": "arn:aws:cloudformation:us-east-1:123456789012:stack/secure-api/5b8a",
            "RequestId": "req-1",
            "LogicalResourceId": "wafRateRuleCreator"
        }))
        .unwrap_or_else(|| unreachable!())
    }

    #[test]
    fn body_uses_wire_field_names() -> Result<()> {
        let outcome = Outcome::success("WafRateRuleCreatorResource", rule_add_status("200"));
        let body = ResponseBody::new(&event(), &outcome, &default_reason(Some("stream-1")));
        let value: serde_json::Value = serde_json::from_slice(&body.to_bytes()?)
            .map_err(|e| Error::serialization(e.to_string()))?;

        assert_eq!(value["Status"], "SUCCESS");
        assert_eq!(
            value["Reason"],
            "See the details in CloudWatch Log Stream: stream-1"
        );
        assert_eq!(value["PhysicalResourceId"], "WafRateRuleCreatorResource");
        assert_eq!(value["RequestId"], "req-1");
        assert_eq!(value["LogicalResourceId"], "wafRateRuleCreator");
        assert_eq!(value["NoEcho"], false);
        assert_eq!(value["Data"]["rule_add_status"], "HTTPStatusCode-200");
        Ok(())
    }

    #[test]
    fn failure_reason_is_the_error_message() {
        let outcome = Outcome::failed("res", FailureKind::InjectedFailure, "create failure requested");
        let body = ResponseBody::new(&event(), &outcome, "default");
        assert_eq!(body.status, ResponseStatus::Failed);
        assert_eq!(body.reason, "create failure requested");
    }

    #[test]
    fn oversized_reason_is_truncated() -> Result<()> {
        let outcome = Outcome::failed("res", FailureKind::Internal, "é\"".repeat(3000));
        let body = ResponseBody::new(&event(), &outcome, "default").to_bytes()?;
        assert!(body.len() <= MAX_BODY_BYTES);

        let value: serde_json::Value =
            serde_json::from_slice(&body).map_err(|e| Error::serialization(e.to_string()))?;
        let reason = value["Reason"].as_str().unwrap_or_default();
        assert!(reason.ends_with(TRUNCATION_MARKER));
        assert_eq!(value["Data"]["failure_kind"], "internal");
        Ok(())
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_at_char_boundary("héllo", 2), "h");
        assert_eq!(truncate_at_char_boundary("abc", 10), "abc");
    }
}
