//! Shared test utilities for ratewall integration tests.
//!
//! This crate provides:
//! - [`EventFactory`]: Lifecycle events with sensible defaults
//! - [`HandlerHarness`]: A handler wired to in-memory collaborators
//! - [`CallbackServer`]: A local HTTP endpoint recording completion signals
//!
//! # Example
//!
//! ```rust,ignore
//! use ratewall_test_utils::{EventFactory, HandlerHarness};
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let harness = HandlerHarness::new();
//!     let outcome = harness.handler.handle(&EventFactory::create("http://x")).await;
//!     assert!(outcome.is_success());
//! }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]
// Test utilities use expect/unwrap for cleaner test code - panics are acceptable in tests
#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::missing_panics_doc)]

pub mod callback;
pub mod fixtures;

pub use callback::*;
pub use fixtures::*;

/// Initialize test logging (call once per test module).
pub fn init_test_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("ratewall_resource=debug".parse().expect("valid directive")),
        )
        .with_test_writer()
        .try_init();
}
