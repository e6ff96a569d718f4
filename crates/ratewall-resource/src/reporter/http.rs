//! Pre-signed URL callback delivery.
//!
//! The orchestrator hands out a pre-signed object-store URL per request.
//! The signature covers the headers, so the `PUT` carries an empty
//! `Content-Type` and nothing else beyond the body length.

use std::time::Duration;

use async_trait::async_trait;
use ratewall_core::HandlerConfig;
use reqwest::header::CONTENT_TYPE;

use super::{Reporter, ResponseBody, default_reason};
use crate::error::{Error, Result};
use crate::event::LifecycleEvent;
use crate::metrics::ResourceMetrics;
use crate::outcome::Outcome;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const MAX_BACKOFF_MS: u64 = 500;

/// Reporter that `PUT`s the callback document to the event's `ResponseURL`.
#[derive(Debug, Clone)]
pub struct HttpReporter {
    client: reqwest::Client,
    request_timeout: Duration,
    max_attempts: u32,
    default_reason: String,
    metrics: ResourceMetrics,
}

impl HttpReporter {
    /// Creates a reporter from handler configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &HandlerConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| Error::report_with_source("failed to build HTTP client", e))?;

        Ok(Self {
            client,
            request_timeout: config.report_timeout,
            max_attempts: config.report_max_attempts.max(1),
            default_reason: default_reason(config.log_stream_name.as_deref()),
            metrics: ResourceMetrics::new(),
        })
    }

    fn backoff(attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let backoff_ms = 50_u64
            .saturating_mul(2_u64.saturating_pow(exponent))
            .min(MAX_BACKOFF_MS);
        Duration::from_millis(backoff_ms)
    }

    async fn deliver(&self, url: &str, body: Vec<u8>) -> Result<u32> {
        let mut attempt = 0;

        loop {
            attempt += 1;

            let response = self
                .client
                .put(url)
                .header(CONTENT_TYPE, "")
                .body(body.clone())
                .timeout(self.request_timeout)
                .send()
                .await;

            match response {
                Ok(resp) if resp.status().is_success() => return Ok(attempt),
                Ok(resp) => {
                    let status = resp.status();
                    let text = resp.text().await.unwrap_or_default();
                    let retryable = status.as_u16() == 429 || status.is_server_error();

                    if retryable && attempt < self.max_attempts {
                        tracing::warn!(attempt, status = status.as_u16(), "callback rejected; retrying");
                        tokio::time::sleep(Self::backoff(attempt)).await;
                        continue;
                    }

                    return Err(Error::report(format!(
                        "callback rejected (status={status}): {text}"
                    )));
                }
                Err(err) => {
                    // A timed-out PUT may still land; resending risks a
                    // second signal for the same request.
                    if err.is_timeout() {
                        return Err(Error::report_with_source("callback request timed out", err));
                    }

                    if attempt < self.max_attempts {
                        tracing::warn!(attempt, error = %err, "callback transport error; retrying");
                        tokio::time::sleep(Self::backoff(attempt)).await;
                        continue;
                    }

                    return Err(Error::report_with_source("callback request failed", err));
                }
            }
        }
    }
}

#[async_trait]
impl Reporter for HttpReporter {
    #[tracing::instrument(
        skip(self, event, outcome),
        fields(request_id = %event.request_id, status = %outcome.status)
    )]
    async fn report(&self, event: &LifecycleEvent, outcome: &Outcome) -> Result<()> {
        let body = ResponseBody::new(event, outcome, &self.default_reason).to_bytes()?;
        tracing::debug!(bytes = body.len(), "sending callback");

        match self.deliver(&event.response_url, body).await {
            Ok(attempts) => {
                self.metrics.record_report("delivered");
                tracing::info!(attempts, "callback delivered");
                Ok(())
            }
            Err(err) => {
                self.metrics.record_report("failed");
                Err(err)
            }
        }
    }
}
