//! # ratewall-core
//!
//! Shared primitives for the ratewall custom resource handler:
//!
//! - **Error Types**: configuration errors and the crate result alias
//! - **Configuration**: [`HandlerConfig`] loaded from the function environment
//! - **Observability**: explicit logging initialization and span helpers
//!
//! ## Example
//!
//! ```rust
//! use ratewall_core::config::HandlerConfig;
//! use ratewall_core::observability::init_logging;
//!
//! let config = HandlerConfig::default();
//! init_logging(config.log_level, config.log_format);
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod observability;

pub use config::HandlerConfig;
pub use error::{Error, Result};
