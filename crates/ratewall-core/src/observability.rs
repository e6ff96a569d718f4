//! Observability infrastructure for ratewall.
//!
//! Logging is initialized explicitly by the process entry point with the
//! level taken from configuration. Nothing is configured at import time.

use std::fmt;
use std::str::FromStr;
use std::sync::Once;

use serde::{Deserialize, Serialize};
use tracing::Span;
use tracing_subscriber::{EnvFilter, fmt as tracing_fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::Error;

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON structured logs (for the function runtime).
    #[default]
    Json,
    /// Pretty-printed logs (for development).
    Pretty,
}

impl FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" | "text" => Ok(Self::Pretty),
            other => Err(Error::configuration(format!(
                "log format must be one of: json, pretty (got {other})"
            ))),
        }
    }
}

/// Minimum level of emitted log records.
///
/// Accepts the level names used by the deployment templates (`INFO`,
/// `WARNING`, `CRITICAL`, ...) in addition to tracing's own names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Everything, including per-call tracing.
    Trace,
    /// Debug output.
    Debug,
    /// Informational output.
    #[default]
    Info,
    /// Warnings only.
    Warn,
    /// Errors only.
    Error,
}

impl LogLevel {
    /// Returns the `EnvFilter` directive for this level.
    #[must_use]
    pub const fn as_directive(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_directive())
    }
}

impl FromStr for LogLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" | "notset" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" | "critical" | "fatal" => Ok(Self::Error),
            other => Err(Error::configuration(format!(
                "LOG_LEVEL must be a level name such as INFO or DEBUG (got {other})"
            ))),
        }
    }
}

/// Initializes the logging subsystem.
///
/// Call once at process startup. Safe to call multiple times;
/// subsequent calls are no-ops.
///
/// `RUST_LOG` takes precedence over `level` when it is set, so a single
/// module can be turned up without redeploying configuration.
pub fn init_logging(level: LogLevel, format: LogFormat) {
    INIT.call_once(|| {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(level.as_directive()));

        match format {
            LogFormat::Json => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(tracing_fmt::layer().json().with_ansi(false))
                    .init();
            }
            LogFormat::Pretty => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(tracing_fmt::layer().pretty())
                    .init();
            }
        }
    });
}

/// Creates a span for one lifecycle invocation with standard fields.
///
/// `outcome` is left empty and recorded once the invocation settles.
#[must_use]
pub fn lifecycle_span(
    request_type: &str,
    request_id: &str,
    logical_resource_id: &str,
    stack_name: &str,
) -> Span {
    tracing::info_span!(
        "lifecycle",
        request_type = request_type,
        request_id = request_id,
        logical_resource_id = logical_resource_id,
        stack = stack_name,
        outcome = tracing::field::Empty,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_logging_is_idempotent() {
        init_logging(LogLevel::Info, LogFormat::Pretty);
        init_logging(LogLevel::Debug, LogFormat::Json);
    }

    #[test]
    fn log_level_accepts_deployment_names() {
        assert_eq!("INFO".parse::<LogLevel>().ok(), Some(LogLevel::Info));
        assert_eq!("WARNING".parse::<LogLevel>().ok(), Some(LogLevel::Warn));
        assert_eq!("CRITICAL".parse::<LogLevel>().ok(), Some(LogLevel::Error));
        assert_eq!(" debug ".parse::<LogLevel>().ok(), Some(LogLevel::Debug));
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn log_format_parses() {
        assert_eq!("JSON".parse::<LogFormat>().ok(), Some(LogFormat::Json));
        assert_eq!("pretty".parse::<LogFormat>().ok(), Some(LogFormat::Pretty));
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn lifecycle_span_records_outcome() {
        let span = lifecycle_span("Create", "req-1", "WafRule", "api-stack");
        let _guard = span.enter();
        span.record("outcome", "SUCCESS");
        tracing::info!("lifecycle message");
    }
}
