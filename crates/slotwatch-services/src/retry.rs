//! Retry for webhook deliveries with exponential backoff.
//!
//! Timeouts, connection failures, 5xx, 408 and 429 answers are retried.
//! Other 4xx answers are permanent. Reservation requests never go through
//! here.

use std::future::Future;
use std::time::Duration;

use reqwest::{header::RETRY_AFTER, Response, StatusCode};
use slotwatch_core::NotifyError;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 500;
pub const DEFAULT_MAX_DELAY_MS: u64 = 5000;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempts after the first one
    pub max_retries: u32,
    /// Delay before the first retry, doubled for each later one
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_delay: Duration::from_millis(DEFAULT_INITIAL_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
        }
    }
}

impl RetryConfig {
    pub fn new(max_retries: u32, initial_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_retries,
            initial_delay: Duration::from_millis(initial_delay_ms),
            max_delay: Duration::from_millis(max_delay_ms),
        }
    }

    /// No retries at all.
    pub fn none() -> Self {
        Self::new(0, 0, 0)
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt);
        let delay_ms = (self.initial_delay.as_millis() as u64).saturating_mul(factor);
        Duration::from_millis(delay_ms.min(self.max_delay.as_millis() as u64))
    }
}

pub fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
}

pub fn is_retryable_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect()
}

/// Seconds the server asked us to wait, from `Retry-After`.
fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Run a webhook request until it succeeds, fails permanently, or retries run out.
///
/// # Errors
/// `WebhookStatus` for the last non-2xx answer, `WebhookFailed` for the last
/// transport error.
pub async fn deliver_with_retry<F, Fut>(config: &RetryConfig, operation: F) -> Result<Response, NotifyError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<Response, reqwest::Error>>,
{
    let mut attempt = 0;

    loop {
        let (failure, server_delay) = match operation().await {
            Ok(response) if response.status().is_success() => {
                if attempt > 0 {
                    tracing::info!("Webhook delivered after {} retries", attempt);
                }
                return Ok(response);
            }
            Ok(response) => {
                let status = response.status();
                let retryable = is_retryable_status(status);
                let server_delay = retry_after(&response);
                let message = response.text().await.unwrap_or_default();
                let failure = NotifyError::WebhookStatus {
                    status: status.as_u16(),
                    message,
                };
                if !retryable {
                    return Err(failure);
                }
                (failure, server_delay)
            }
            Err(e) => {
                if !is_retryable_error(&e) {
                    return Err(NotifyError::WebhookFailed(e.to_string()));
                }
                (NotifyError::WebhookFailed(e.to_string()), None)
            }
        };

        if attempt >= config.max_retries {
            tracing::error!("Webhook delivery failed after {} attempts", attempt + 1);
            return Err(failure);
        }

        let delay = server_delay
            .map(|d| d.min(config.max_delay))
            .unwrap_or_else(|| config.delay_for_attempt(attempt));
        tracing::warn!(
            "Webhook attempt {} of {} failed ({}), retrying in {:?}",
            attempt + 1,
            config.max_retries + 1,
            failure,
            delay
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
