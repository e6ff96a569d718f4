//! # ratewall-resource
//!
//! Custom resource lifecycle handler that installs a rate-based rule into a
//! web application firewall ACL and signals the provisioning orchestrator.
//!
//! This crate provides:
//!
//! - **Control Plane**: Fresh reads and lock-token-conditioned updates of the
//!   web ACL ([`control_plane::ControlPlane`])
//! - **Dispatcher**: Create installs the rule; Update and Delete acknowledge
//! - **Reporter**: Exactly one completion signal per event
//! - **Guard**: Per-ACL serialization of concurrent invocations
//!
//! ## Guarantees
//!
//! - **Single mutation path**: Only Create writes, using the token its own
//!   fetch returned
//! - **Always answered**: Every event with a `ResponseURL` gets one signal,
//!   even when the dispatcher panics
//! - **Classified failures**: Failed outcomes carry a `failure_kind`
//!   attribute
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use ratewall_core::HandlerConfig;
//! use ratewall_resource::control_plane::memory::InMemoryControlPlane;
//! use ratewall_resource::guard::IdempotencyGuard;
//! use ratewall_resource::handler::CustomResourceHandler;
//! use ratewall_resource::reporter::memory::RecordingReporter;
//! use ratewall_resource::rule::{Scope, TargetAcl};
//!
//! let config = HandlerConfig::default();
//! let control_plane = Arc::new(
//!     InMemoryControlPlane::new().with_acl(TargetAcl::new("acl1", "id1", Scope::Regional)),
//! );
//! let handler = CustomResourceHandler::new(
//!     control_plane,
//!     Arc::new(RecordingReporter::new()),
//!     Arc::new(IdempotencyGuard::new()),
//!     &config,
//! );
//! # let _ = handler;
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod control_plane;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod guard;
pub mod handler;
pub mod metrics;
pub mod outcome;
pub mod reporter;
pub mod rule;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::control_plane::memory::InMemoryControlPlane;
    pub use crate::control_plane::{ControlPlane, ExternalResourceState, LockToken, MutationResult};
    pub use crate::dispatcher::LifecycleDispatcher;
    pub use crate::error::{Error, Result};
    pub use crate::event::{LifecycleEvent, RequestType, ResourceProperties};
    pub use crate::guard::IdempotencyGuard;
    pub use crate::handler::CustomResourceHandler;
    pub use crate::outcome::{FailureKind, Outcome, ResponseStatus};
    pub use crate::reporter::Reporter;
    pub use crate::reporter::http::HttpReporter;
    pub use crate::reporter::memory::RecordingReporter;
    pub use crate::rule::{RateRule, Scope, TargetAcl};
}
