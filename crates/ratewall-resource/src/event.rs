//! Lifecycle events delivered by the provisioning orchestrator.
//!
//! The orchestrator stringifies scalar property values, so every property
//! accessor accepts both `"110"` and `110`.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::rule::{Scope, TargetAcl};

/// Property naming the web ACL.
pub const WEB_ACL_NAME: &str = "Web_acl_name";
/// Property naming the web ACL id.
pub const WEB_ACL_ID: &str = "Web_acl_id";
/// Property naming the web ACL scope.
pub const WEB_ACL_SCOPE: &str = "Web_acl_scope";
/// Property carrying the desired rate limit.
pub const RPS_LIMIT: &str = "Rps_limit";
/// Property requesting an injected Create failure.
pub const FAIL_CREATE: &str = "FailCreate";

/// Lifecycle request type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RequestType {
    /// The resource is being created.
    Create,
    /// The resource's properties changed.
    Update,
    /// The resource is being removed.
    Delete,
    /// Anything else; always fails.
    Other(String),
}

impl RequestType {
    /// Returns the wire value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Create => "Create",
            Self::Update => "Update",
            Self::Delete => "Delete",
            Self::Other(other) => other,
        }
    }
}

impl Default for RequestType {
    fn default() -> Self {
        Self::Other(String::new())
    }
}

impl From<String> for RequestType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Create" => Self::Create,
            "Update" => Self::Update,
            "Delete" => Self::Delete,
            _ => Self::Other(value),
        }
    }
}

impl From<RequestType> for String {
    fn from(value: RequestType) -> Self {
        match value {
            RequestType::Other(other) => other,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resource properties supplied with the event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceProperties(Map<String, Value>);

impl ResourceProperties {
    /// Creates an empty property map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a property.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Returns the raw property value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Returns a property as a string, accepting stringified scalars.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    fn required(&self, key: &str) -> Result<String> {
        self.get_str(key)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| Error::invalid_properties(format!("{key} is required")))
    }

    /// Resolves the web ACL the event targets.
    ///
    /// # Errors
    ///
    /// Returns an error if the name, id or scope is missing, or the scope is
    /// not a known value.
    pub fn target(&self) -> Result<TargetAcl> {
        let name = self.required(WEB_ACL_NAME)?;
        let id = self.required(WEB_ACL_ID)?;
        let scope: Scope = self.required(WEB_ACL_SCOPE)?.parse()?;
        Ok(TargetAcl::new(name, id, scope))
    }

    /// Returns the requested rate limit, or `default` when absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a whole number or lies outside
    /// the range the firewall accepts.
    pub fn rate_limit(&self, default: u64) -> Result<u64> {
        use ratewall_core::config::{MAX_RATE_LIMIT, MIN_RATE_LIMIT};

        let limit = match self.0.get(RPS_LIMIT) {
            None | Some(Value::Null) => default,
            Some(Value::Number(n)) => n.as_u64().ok_or_else(|| {
                Error::invalid_properties(format!("{RPS_LIMIT} must be a whole number (got {n})"))
            })?,
            Some(Value::String(s)) if s.trim().is_empty() => default,
            Some(Value::String(s)) => s.trim().parse::<u64>().map_err(|_| {
                Error::invalid_properties(format!("{RPS_LIMIT} must be a whole number (got {s:?})"))
            })?,
            Some(other) => {
                return Err(Error::invalid_properties(format!(
                    "{RPS_LIMIT} must be a whole number (got {other})"
                )));
            }
        };

        if !(MIN_RATE_LIMIT..=MAX_RATE_LIMIT).contains(&limit) {
            return Err(Error::invalid_properties(format!(
                "{RPS_LIMIT} must be between {MIN_RATE_LIMIT} and {MAX_RATE_LIMIT} (got {limit})"
            )));
        }
        Ok(limit)
    }

    /// Returns true if a Create failure was requested.
    ///
    /// Any present, non-empty value counts. The orchestrator stringifies
    /// every property, so `"false"` and `"0"` request a failure too; only
    /// JSON `false`, `null`, `0`, `""` and empty collections do not.
    #[must_use]
    pub fn fail_create(&self) -> bool {
        match self.0.get(FAIL_CREATE) {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n.abs() > 0.0),
            Some(Value::String(s)) => !s.is_empty(),
            Some(Value::Array(items)) => !items.is_empty(),
            Some(Value::Object(fields)) => !fields.is_empty(),
        }
    }
}

/// A lifecycle notification for one custom resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LifecycleEvent {
    /// Create, Update, Delete, or something unsupported.
    #[serde(default)]
    pub request_type: RequestType,
    /// Pre-signed URL the completion signal is sent to.
    #[serde(rename = "ResponseURL")]
    pub response_url: String,
    /// Stack the resource belongs to.
    #[serde(default)]
    pub stack_id: String,
    /// Unique id of this request; redeliveries reuse it.
    #[serde(default)]
    pub request_id: String,
    /// Logical name of the resource in the template.
    #[serde(default)]
    pub logical_resource_id: String,
    /// Declared resource type.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub resource_type: String,
    /// Physical id returned by the earlier Create (Update/Delete only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physical_resource_id: Option<String>,
    /// Function the orchestrator invoked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_token: Option<String>,
    /// Desired properties.
    #[serde(default)]
    pub resource_properties: ResourceProperties,
    /// Previous properties (Update only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_resource_properties: Option<ResourceProperties>,
}

impl LifecycleEvent {
    /// Parses an invocation payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not a lifecycle event.
    pub fn from_value(payload: Value) -> Result<Self> {
        serde_json::from_value(payload).map_err(|e| Error::InvalidEvent {
            message: e.to_string(),
        })
    }

    /// Recovers just enough of a malformed payload to report a failure.
    ///
    /// Returns `None` when the payload carries no `ResponseURL`, in which
    /// case there is nobody to report to.
    #[must_use]
    pub fn salvage(payload: &Value) -> Option<Self> {
        let field = |key: &str| {
            payload
                .get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
        };

        let response_url = field("ResponseURL").filter(|url| !url.is_empty())?;
        Some(Self {
            request_type: field("RequestType").map(RequestType::from).unwrap_or_default(),
            response_url,
            stack_id: field("StackId").unwrap_or_default(),
            request_id: field("RequestId").unwrap_or_default(),
            logical_resource_id: field("LogicalResourceId").unwrap_or_default(),
            resource_type: field("ResourceType").unwrap_or_default(),
            physical_resource_id: field("PhysicalResourceId"),
            service_token: None,
            resource_properties: ResourceProperties::new(),
            old_resource_properties: None,
        })
    }

    /// Returns the stack name encoded in the stack id.
    ///
    /// Stack ids look like `arn:aws:cloudformation:<region>:<account>:stack/<name>/<uuid>`;
    /// anything else is returned unchanged.
    #[must_use]
    pub fn stack_name(&self) -> &str {
        self.stack_id.rsplit('/').nth(1).unwrap_or(&self.stack_id)
    }

    /// Key identifying redeliveries of this request.
    #[must_use]
    pub fn idempotency_key(&self) -> String {
        format!(
            "{}/{}/{}/{}",
            self.stack_id, self.logical_resource_id, self.request_id, self.request_type
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn create_payload() -> Value {
        json!({
            "RequestType": "Create",
            "ResponseURL": "https://callbacks.example/response",
            "StackId": "arn:aws:cloudformation:us-east-1:123456789012:stack/secure-api/5b8a-11e8",
            "RequestId": "req-1",
            "LogicalResourceId": "wafRateRuleCreator",
            "ResourceType": "AWS::CloudFormation::CustomResource",
            "ResourceProperties": {
                "ServiceToken": "arn:aws:lambda:us-east-1:123456789012:function:creator",
                "Web_acl_name": "acl1",
                "Web_acl_id": "id1",
                "Web_acl_scope": "REGIONAL",
                "Rps_limit": "110"
            }
        })
    }

    #[test]
    fn parses_wire_event() -> Result<()> {
        let event = LifecycleEvent::from_value(create_payload())?;
        assert_eq!(event.request_type, RequestType::Create);
        assert_eq!(event.request_id, "req-1");
        assert_eq!(event.stack_name(), "secure-api");
        assert_eq!(
            event.resource_properties.target()?,
            TargetAcl::new("acl1", "id1", Scope::Regional)
        );
        assert_eq!(event.resource_properties.rate_limit(200)?, 110);
        assert!(!event.resource_properties.fail_create());
        Ok(())
    }

    #[test]
    fn unknown_request_type_is_preserved() -> Result<()> {
        let mut payload = create_payload();
        payload["RequestType"] = json!("Rollback");
        let event = LifecycleEvent::from_value(payload)?;
        assert_eq!(event.request_type, RequestType::Other("Rollback".into()));
        assert_eq!(event.request_type.as_str(), "Rollback");
        Ok(())
    }

    #[test]
    fn missing_response_url_is_rejected() {
        let mut payload = create_payload();
        if let Some(object) = payload.as_object_mut() {
            object.remove("ResponseURL");
        }
        let result = LifecycleEvent::from_value(payload);
        assert!(matches!(result, Err(Error::InvalidEvent { .. })));
    }

    #[test]
    fn salvage_keeps_reporting_fields() {
        let payload = json!({
            "RequestType": "Create",
            "ResponseURL": "https://callbacks.example/response",
            "RequestId": "req-9",
            "ResourceProperties": "not-a-map"
        });
        assert!(LifecycleEvent::from_value(payload.clone()).is_err());

        let salvaged = LifecycleEvent::salvage(&payload);
        assert!(salvaged.is_some_and(|e| e.request_id == "req-9"
            && e.response_url == "https://callbacks.example/response"));
        assert!(LifecycleEvent::salvage(&json!({"RequestId": "x"})).is_none());
    }

    #[test]
    fn rate_limit_defaults_and_validates() {
        let props = ResourceProperties::new();
        assert_eq!(props.rate_limit(110).ok(), Some(110));

        let numeric = ResourceProperties::new().with(RPS_LIMIT, 2000);
        assert_eq!(numeric.rate_limit(110).ok(), Some(2000));

        let too_low = ResourceProperties::new().with(RPS_LIMIT, "5");
        assert!(too_low.rate_limit(110).is_err());

        let garbage = ResourceProperties::new().with(RPS_LIMIT, "fast");
        assert!(garbage.rate_limit(110).is_err());

        let fractional = ResourceProperties::new().with(RPS_LIMIT, 110.5);
        assert!(fractional.rate_limit(110).is_err());
    }

    #[test]
    fn fail_create_on_any_present_value() {
        for value in ["true", "True", "false", "yes", "1", "0"] {
            assert!(
                ResourceProperties::new().with(FAIL_CREATE, value).fail_create(),
                "{value:?} should request a failure"
            );
        }
        assert!(ResourceProperties::new().with(FAIL_CREATE, true).fail_create());
        assert!(ResourceProperties::new().with(FAIL_CREATE, 1).fail_create());

        assert!(!ResourceProperties::new().with(FAIL_CREATE, "").fail_create());
        assert!(!ResourceProperties::new().with(FAIL_CREATE, false).fail_create());
        assert!(!ResourceProperties::new().with(FAIL_CREATE, 0).fail_create());
        assert!(!ResourceProperties::new().with(FAIL_CREATE, Value::Null).fail_create());
        assert!(!ResourceProperties::new().fail_create());
    }

    #[test]
    fn target_requires_all_fields() {
        let props = ResourceProperties::new()
            .with(WEB_ACL_NAME, "acl1")
            .with(WEB_ACL_SCOPE, "REGIONAL");
        let err = props.target().err();
        assert!(err.is_some_and(|e| e.to_string().contains(WEB_ACL_ID)));
    }

    #[test]
    fn stack_name_falls_back_to_raw_id() {
        let mut event = LifecycleEvent::salvage(&json!({"ResponseURL": "https://x"}))
            .unwrap_or_else(|| unreachable!());
        event.stack_id = "plain-stack".into();
        assert_eq!(event.stack_name(), "plain-stack");
    }

    #[test]
    fn idempotency_key_distinguishes_request_types() -> Result<()> {
        let create = LifecycleEvent::from_value(create_payload())?;
        let mut delete = create.clone();
        delete.request_type = RequestType::Delete;
        assert_ne!(create.idempotency_key(), delete.idempotency_key());
        assert!(create.idempotency_key().ends_with("/req-1/Create"));
        Ok(())
    }
}
