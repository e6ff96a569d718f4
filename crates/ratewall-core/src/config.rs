//! Handler configuration.
//!
//! Settings come from the function environment. Parsing is separated from
//! the process environment (`from_lookup`) so it can be exercised without
//! mutating global state.

use std::time::Duration;

use crate::error::{Error, Result};
use crate::observability::{LogFormat, LogLevel};

/// Rate limit applied when a Create event does not name one.
pub const DEFAULT_RATE_LIMIT: u64 = 110;

/// Smallest rate limit the firewall accepts.
pub const MIN_RATE_LIMIT: u64 = 10;

/// Largest rate limit the firewall accepts.
pub const MAX_RATE_LIMIT: u64 = 2_000_000_000;

/// Physical resource identifier reported to the orchestrator.
pub const DEFAULT_PHYSICAL_ID: &str = "WafRateRuleCreatorResource";

/// Description written to the web ACL when rules are replaced.
pub const DEFAULT_ACL_DESCRIPTION: &str =
    "ratewall: Protect API with Web Application Firewall - Rate Based Rules";

const DEFAULT_APP_ENV: &str = "Production";
const DEFAULT_REPORT_TIMEOUT: Duration = Duration::from_millis(3_000);
const DEFAULT_REPORT_MAX_ATTEMPTS: u32 = 3;

/// Runtime configuration for the lifecycle handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerConfig {
    /// Minimum log level (`LOG_LEVEL`).
    pub log_level: LogLevel,
    /// Log output format (`RATEWALL_LOG_FORMAT`).
    pub log_format: LogFormat,
    /// Deployment label (`APP_ENV`).
    pub app_env: String,
    /// Rate limit used when the event omits `Rps_limit`.
    pub default_rate_limit: u64,
    /// Physical resource identifier for created resources.
    pub physical_id: String,
    /// Description written to the web ACL on update.
    pub acl_description: String,
    /// Timeout for a single callback delivery attempt.
    pub report_timeout: Duration,
    /// Maximum callback delivery attempts.
    pub report_max_attempts: u32,
    /// Log stream quoted in the default response reason.
    pub log_stream_name: Option<String>,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            log_format: LogFormat::default(),
            app_env: DEFAULT_APP_ENV.to_string(),
            default_rate_limit: DEFAULT_RATE_LIMIT,
            physical_id: DEFAULT_PHYSICAL_ID.to_string(),
            acl_description: DEFAULT_ACL_DESCRIPTION.to_string(),
            report_timeout: DEFAULT_REPORT_TIMEOUT,
            report_max_attempts: DEFAULT_REPORT_MAX_ATTEMPTS,
            log_stream_name: None,
        }
    }
}

impl HandlerConfig {
    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if any variable is present but cannot be parsed.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration through an arbitrary variable lookup.
    ///
    /// Blank values are treated as unset.
    ///
    /// # Errors
    ///
    /// Returns an error if any variable is present but cannot be parsed or
    /// is out of range.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name).and_then(|v| {
                let trimmed = v.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            })
        };

        let mut config = Self::default();

        if let Some(level) = get("LOG_LEVEL") {
            config.log_level = level.parse()?;
        }
        if let Some(format) = get("RATEWALL_LOG_FORMAT") {
            config.log_format = format.parse()?;
        }
        if let Some(app_env) = get("APP_ENV") {
            config.app_env = app_env;
        }
        if let Some(limit) = get("RATEWALL_DEFAULT_RPS_LIMIT") {
            config.default_rate_limit = parse_u64("RATEWALL_DEFAULT_RPS_LIMIT", &limit)?;
        }
        if let Some(physical_id) = get("RATEWALL_PHYSICAL_ID") {
            config.physical_id = physical_id;
        }
        if let Some(description) = get("RATEWALL_ACL_DESCRIPTION") {
            config.acl_description = description;
        }
        if let Some(timeout) = get("RATEWALL_REPORT_TIMEOUT_MS") {
            config.report_timeout =
                Duration::from_millis(parse_u64("RATEWALL_REPORT_TIMEOUT_MS", &timeout)?);
        }
        if let Some(attempts) = get("RATEWALL_REPORT_MAX_ATTEMPTS") {
            config.report_max_attempts = u32::try_from(parse_u64(
                "RATEWALL_REPORT_MAX_ATTEMPTS",
                &attempts,
            )?)
            .map_err(|_| Error::configuration("RATEWALL_REPORT_MAX_ATTEMPTS is too large"))?;
        }
        config.log_stream_name = get("AWS_LAMBDA_LOG_STREAM_NAME");

        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        if !(MIN_RATE_LIMIT..=MAX_RATE_LIMIT).contains(&self.default_rate_limit) {
            return Err(Error::configuration(format!(
                "default rate limit must be between {MIN_RATE_LIMIT} and {MAX_RATE_LIMIT} (got {})",
                self.default_rate_limit
            )));
        }
        if self.physical_id.is_empty() {
            return Err(Error::configuration("physical id cannot be empty"));
        }
        if self.report_timeout.is_zero() {
            return Err(Error::configuration(
                "report timeout must be greater than zero",
            ));
        }
        if self.report_max_attempts == 0 {
            return Err(Error::configuration(
                "report max attempts must be at least 1",
            ));
        }
        Ok(())
    }
}

fn parse_u64(name: &str, value: &str) -> Result<u64> {
    value
        .parse::<u64>()
        .map_err(|e| Error::configuration(format!("{name} must be a u64: {e}")))
}
