//! Pre-built test fixtures for common test scenarios.
//!
//! Provides factory functions to create lifecycle events and a fully wired
//! handler with sensible defaults.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use ratewall_core::HandlerConfig;
use ratewall_resource::control_plane::memory::InMemoryControlPlane;
use ratewall_resource::event::LifecycleEvent;
use ratewall_resource::guard::IdempotencyGuard;
use ratewall_resource::handler::CustomResourceHandler;
use ratewall_resource::reporter::memory::RecordingReporter;
use ratewall_resource::rule::{Scope, TargetAcl};
use serde_json::{Value, json};

/// Stack id used by every fixture event.
pub const STACK_ID: &str =
    "arn:aws:cloudformation:us-east-1:123456789012:stack/secure-api/5b8a0f10-11e8-a2a1-0afff1c0ea2b";

/// Logical id used by every fixture event.
pub const LOGICAL_RESOURCE_ID: &str = "wafRateRuleCreator";

static NEXT_REQUEST: AtomicU64 = AtomicU64::new(1);

/// The web ACL fixture events point at.
pub fn default_target() -> TargetAcl {
    TargetAcl::new("acl1", "id1", Scope::Regional)
}

/// Factory for lifecycle events.
///
/// Each event gets a fresh `RequestId`, so two events built by the factory
/// are never treated as redeliveries of each other.
pub struct EventFactory;

impl EventFactory {
    /// Raw payload for `request_type` targeting [`default_target`] with a
    /// limit of 110, exactly as the orchestrator sends it.
    pub fn payload(request_type: &str, response_url: &str) -> Value {
        let request_id = format!("req-{}", NEXT_REQUEST.fetch_add(1, Ordering::SeqCst));
        let mut payload = json!({
            "RequestType": request_type,
            "ServiceToken": "arn:aws:lambda:us-east-1:123456789012:function:waf-rate-rule-creator",
            "ResponseURL": response_url,
            "StackId": STACK_ID,
            "RequestId": request_id,
            "LogicalResourceId": LOGICAL_RESOURCE_ID,
            "ResourceType": "AWS::CloudFormation::CustomResource",
            "ResourceProperties": {
                "ServiceToken": "arn:aws:lambda:us-east-1:123456789012:function:waf-rate-rule-creator",
                "Web_acl_name": "acl1",
                "Web_acl_id": "id1",
                "Web_acl_scope": "REGIONAL",
                "Rps_limit": "110"
            }
        });
        if request_type != "Create" {
            payload["PhysicalResourceId"] = json!("WafRateRuleCreatorResource");
        }
        if request_type == "Update" {
            payload["OldResourceProperties"] = payload["ResourceProperties"].clone();
        }
        payload
    }

    /// Event of any request type.
    pub fn of_type(request_type: &str, response_url: &str) -> LifecycleEvent {
        LifecycleEvent::from_value(Self::payload(request_type, response_url))
            .expect("fixture payload is a valid event")
    }

    /// Create event.
    pub fn create(response_url: &str) -> LifecycleEvent {
        Self::of_type("Create", response_url)
    }

    /// Create event with a property overridden.
    pub fn create_with(response_url: &str, key: &str, value: impl Into<Value>) -> LifecycleEvent {
        let mut event = Self::create(response_url);
        event.resource_properties = event.resource_properties.with(key, value);
        event
    }

    /// Update event with unchanged properties.
    pub fn update(response_url: &str) -> LifecycleEvent {
        Self::of_type("Update", response_url)
    }

    /// Delete event.
    pub fn delete(response_url: &str) -> LifecycleEvent {
        Self::of_type("Delete", response_url)
    }
}

/// A handler wired to in-memory collaborators.
pub struct HandlerHarness {
    /// Control plane holding [`default_target`].
    pub control_plane: Arc<InMemoryControlPlane>,
    /// Reporter recording every signal.
    pub reporter: Arc<RecordingReporter>,
    /// Guard shared with the handler.
    pub guard: Arc<IdempotencyGuard>,
    /// The handler under test.
    pub handler: CustomResourceHandler<InMemoryControlPlane, RecordingReporter>,
}

impl HandlerHarness {
    /// Creates a harness whose control plane holds [`default_target`].
    pub fn new() -> Self {
        Self::with_control_plane(InMemoryControlPlane::new().with_acl(default_target()))
    }

    /// Creates a harness around a prepared control plane.
    pub fn with_control_plane(control_plane: InMemoryControlPlane) -> Self {
        let config = HandlerConfig::default();
        let control_plane = Arc::new(control_plane);
        let reporter = Arc::new(RecordingReporter::new());
        let guard = Arc::new(IdempotencyGuard::new());
        let handler = CustomResourceHandler::new(
            Arc::clone(&control_plane),
            Arc::clone(&reporter),
            Arc::clone(&guard),
            &config,
        );
        Self {
            control_plane,
            reporter,
            guard,
            handler,
        }
    }
}

impl Default for HandlerHarness {
    fn default() -> Self {
        Self::new()
    }
}
