use rand::Rng;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::time::Duration;
use tracing::warn;

use super::provider::{truncate_for_log, ProviderError};

/// Every request is tried at most twice: the first attempt plus one retry.
const MAX_ATTEMPTS: u32 = 2;
/// Upper bound on a server-supplied Retry-After.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Backoff applied between the first attempt and the single retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub rate_limit_backoff: Duration,
    pub server_error_backoff: Duration,
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            rate_limit_backoff: Duration::from_millis(2_000),
            server_error_backoff: Duration::from_millis(3_000),
            jitter: Duration::from_millis(1_000),
        }
    }
}

impl RetryPolicy {
    /// No sleeping at all; for tests against a local mock server.
    pub fn immediate() -> Self {
        Self {
            rate_limit_backoff: Duration::ZERO,
            server_error_backoff: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }

    fn rate_limit_delay(&self, retry_after: Option<Duration>) -> Duration {
        let base = jittered(self.rate_limit_backoff, self.jitter);
        match retry_after {
            Some(ra) if ra > base => ra.min(MAX_RETRY_AFTER),
            _ => base,
        }
    }

    fn server_error_delay(&self) -> Duration {
        jittered(self.server_error_backoff, self.jitter)
    }
}

/// Sleep inserted between units of work (regions, queries, pages).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ThrottleConfig {
    pub base: Duration,
    pub jitter: Duration,
}

impl ThrottleConfig {
    pub fn none() -> Self {
        Self::default()
    }

    pub async fn pause(&self) {
        let delay = jittered(self.base, self.jitter);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

fn jittered(base: Duration, jitter: Duration) -> Duration {
    let max = jitter.as_millis() as u64;
    if max == 0 {
        return base;
    }
    let extra = rand::thread_rng().gen_range(0..=max);
    base + Duration::from_millis(extra)
}

/// Outcome of a request after the retry policy has been applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched {
    Body(String),
    /// Still throttled after the retry; callers treat this as "no data".
    RateLimited,
    NotFound,
}

pub fn build_client(
    provider: &'static str,
    timeout: Duration,
    user_agent: &str,
) -> Result<Client, ProviderError> {
    Client::builder()
        .user_agent(user_agent.to_string())
        .timeout(timeout)
        .build()
        .map_err(|source| ProviderError::Transport { provider, source })
}

fn retry_after(resp: &Response) -> Option<Duration> {
    resp.headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Send the request built by `build`, applying the shared failure policy:
///
/// - 429: one retry after the rate-limit backoff, then [`Fetched::RateLimited`]
/// - 5xx or connect/timeout errors: one retry after the server-error backoff,
///   then a hard error
/// - 404: [`Fetched::NotFound`]
/// - any other non-success status: hard error
pub async fn send_with_retry<F>(
    provider: &'static str,
    policy: &RetryPolicy,
    build: F,
) -> Result<Fetched, ProviderError>
where
    F: Fn() -> RequestBuilder,
{
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        let last = attempt >= MAX_ATTEMPTS;

        let resp = match build().send().await {
            Ok(resp) => resp,
            Err(source) => {
                if last {
                    return Err(ProviderError::Transport { provider, source });
                }
                warn!(provider, attempt, error = %source, "request failed; retrying");
                tokio::time::sleep(policy.server_error_delay()).await;
                continue;
            }
        };

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            if last {
                warn!(provider, attempt, "still rate limited after retry; returning no data");
                return Ok(Fetched::RateLimited);
            }
            let delay = policy.rate_limit_delay(retry_after(&resp));
            warn!(provider, attempt, delay_ms = delay.as_millis() as u64, "rate limited; backing off");
            tokio::time::sleep(delay).await;
            continue;
        }
        if status.is_server_error() {
            let body = resp.text().await.unwrap_or_default();
            if last {
                return Err(ProviderError::Server {
                    provider,
                    status: status.as_u16(),
                    body: truncate_for_log(&body, 300),
                });
            }
            warn!(provider, attempt, status = status.as_u16(), "server error; retrying");
            tokio::time::sleep(policy.server_error_delay()).await;
            continue;
        }
        if status == StatusCode::NOT_FOUND {
            return Ok(Fetched::NotFound);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                provider,
                status: status.as_u16(),
                body: truncate_for_log(&body, 300),
            });
        }
        let body = resp
            .text()
            .await
            .map_err(|source| ProviderError::Transport { provider, source })?;
        return Ok(Fetched::Body(body));
    }
}
