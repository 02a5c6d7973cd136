//! Request executor: the single network primitive every provider uses.
//!
//! A [`RequestExecutor`] issues one HTTP GET with a rotating User-Agent and a
//! generic `Accept: */*` header, retrying transient failures with
//! exponential backoff and jitter.
//!
//! # Retry Strategy
//!
//! ```text
//! delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
//! ```
//!
//! A 400 ("bad request") and a 429 ("rate limited") are terminal and returned
//! immediately; callers decide whether those end pagination cleanly. Both
//! the request and the backoff sleep race the run's cancellation token.

use crate::error::RequestError;
use bytes::Bytes;
use rand::seq::IndexedRandom;
use rand::{Rng, rng};
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, USER_AGENT};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// Browser User-Agent strings, one picked at random for every attempt.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:133.0) Gecko/20100101 Firefox/133.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.6 Safari/605.1.15",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_6 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.6 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36 Edg/131.0.0.0",
];

/// Select a random User-Agent string from the rotation list.
pub fn random_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rng())
        .copied()
        // USER_AGENTS is a non-empty const slice
        .unwrap_or(USER_AGENTS[0])
}

/// Build the shared [`reqwest::Client`].
///
/// `proxy` accepts `http://`, `https://` and `socks5://` URLs. When
/// `insecure` is set, invalid TLS certificates are accepted.
pub fn build_client(proxy: Option<&str>, insecure: bool) -> Result<reqwest::Client, reqwest::Error> {
    let mut builder = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::limited(10))
        .danger_accept_invalid_certs(insecure);

    if let Some(proxy) = proxy {
        builder = builder.proxy(reqwest::Proxy::all(proxy)?);
    }

    builder.build()
}

/// How many times, and how patiently, to retry a failed request.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt; 0 means a single attempt.
    pub max_retries: u32,
    /// Initial delay between retries (doubles with each attempt).
    pub base_delay: Duration,
    /// Cap on the exponential part of the delay.
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }

    /// Retry immediately, without sleeping.
    #[cfg(test)]
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        let delay = self.base_delay.saturating_mul(factor).min(self.max_delay);
        let jitter_ms: u64 = rng().random_range(0..=250);
        delay + Duration::from_millis(jitter_ms)
    }
}

/// Issues GET requests with bounded retry. Cheap to clone and safe to share
/// between workers.
#[derive(Debug, Clone)]
pub struct RequestExecutor {
    client: reqwest::Client,
    retry: RetryPolicy,
    timeout: Duration,
}

impl RequestExecutor {
    pub fn new(client: reqwest::Client, retry: RetryPolicy, timeout: Duration) -> Self {
        Self {
            client,
            retry,
            timeout,
        }
    }

    /// Fetch `url` and return its body.
    ///
    /// Extra `headers` are added to every attempt; entries with an empty
    /// name are ignored.
    ///
    /// # Errors
    ///
    /// - [`RequestError::BadRequest`] / [`RequestError::RateLimited`] on the
    ///   first 400 / 429, without retrying.
    /// - [`RequestError::Cancelled`] as soon as `cancel` fires, whether an
    ///   attempt is in flight or the executor is backing off.
    /// - The last attempt's error once `max_retries` retries are exhausted.
    #[instrument(level = "debug", skip(self, cancel, headers))]
    pub async fn get(
        &self,
        cancel: &CancellationToken,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<Bytes, RequestError> {
        let total_t0 = Instant::now();
        let mut attempt = 0u32;

        loop {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RequestError::Cancelled),
                outcome = self.attempt(url, headers) => outcome,
            };
            match outcome {
                Ok(body) => return Ok(body),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    attempt += 1;
                    if attempt > self.retry.max_retries {
                        debug!(
                            attempt,
                            max = self.retry.max_retries,
                            elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
                            error = %e,
                            "request exhausted retries"
                        );
                        return Err(e);
                    }

                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        attempt,
                        max = self.retry.max_retries,
                        ?delay,
                        error = %e,
                        "request attempt failed; retrying"
                    );
                    if !delay.is_zero() {
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => return Err(RequestError::Cancelled),
                            _ = sleep(delay) => {}
                        }
                    }
                }
            }
        }
    }

    async fn attempt(&self, url: &str, headers: &[(&str, &str)]) -> Result<Bytes, RequestError> {
        let mut request = self
            .client
            .get(url)
            .timeout(self.timeout)
            .header(USER_AGENT, random_user_agent())
            .header(ACCEPT, "*/*");
        for (name, value) in headers {
            if !name.is_empty() {
                request = request.header(*name, *value);
            }
        }

        let response = request.send().await?;
        match response.status() {
            StatusCode::OK => {}
            StatusCode::BAD_REQUEST => return Err(RequestError::BadRequest),
            StatusCode::TOO_MANY_REQUESTS => return Err(RequestError::RateLimited),
            status => return Err(RequestError::Status(status.as_u16())),
        }

        let body = response.bytes().await?;
        if body.is_empty() {
            return Err(RequestError::EmptyResponse);
        }
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn executor(max_retries: u32) -> RequestExecutor {
        let client = build_client(None, false).expect("client should build");
        RequestExecutor::new(
            client,
            RetryPolicy::immediate(max_retries),
            Duration::from_secs(5),
        )
    }

    #[test]
    fn random_user_agent_returns_valid_ua() {
        let ua = random_user_agent();
        assert!(USER_AGENTS.contains(&ua));
        assert!(ua.starts_with("Mozilla/5.0"));
    }

    #[test]
    fn build_client_accepts_socks_proxy() {
        assert!(build_client(Some("socks5://127.0.0.1:9050"), true).is_ok());
    }

    #[test]
    fn backoff_is_capped() {
        let policy = RetryPolicy {
            max_retries: 10,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(4),
        };
        let delay = policy.delay_for(9);
        assert!(delay >= Duration::from_secs(4));
        assert!(delay <= Duration::from_millis(4250));
    }

    #[test]
    fn immediate_policy_never_sleeps() {
        assert_eq!(RetryPolicy::immediate(3).delay_for(3), Duration::ZERO);
    }

    #[tokio::test]
    async fn sends_user_agent_and_accept_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ok"))
            .and(header("accept", "*/*"))
            .and(header("api-key", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
            .expect(1)
            .mount(&server)
            .await;

        let body = executor(0)
            .get(&CancellationToken::new(), &format!("{}/ok", server.uri()), &[("API-Key", "secret"), ("", "ignored")])
            .await
            .expect("request should succeed");
        assert_eq!(&body[..], b"hello");

        let requests = server.received_requests().await.expect("recording enabled");
        let ua = requests[0]
            .headers
            .get("user-agent")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        assert!(USER_AGENTS.contains(&ua.as_str()));
    }

    #[tokio::test]
    async fn retries_server_errors_until_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .mount(&server)
            .await;

        let body = executor(2)
            .get(&CancellationToken::new(), &format!("{}/flaky", server.uri()), &[])
            .await
            .expect("third attempt should succeed");
        assert_eq!(&body[..], b"[]");
    }

    #[tokio::test]
    async fn non_200_reported_after_retries_exhausted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .expect(3)
            .mount(&server)
            .await;

        let err = executor(2)
            .get(&CancellationToken::new(), &format!("{}/down", server.uri()), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, RequestError::Status(502)));
    }

    #[tokio::test]
    async fn bad_request_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(400))
            .expect(1)
            .mount(&server)
            .await;

        let err = executor(5)
            .get(&CancellationToken::new(), &format!("{}/bad", server.uri()), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, RequestError::BadRequest));
    }

    #[tokio::test]
    async fn rate_limit_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .expect(1)
            .mount(&server)
            .await;

        let err = executor(5)
            .get(&CancellationToken::new(), &format!("{}/slow-down", server.uri()), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, RequestError::RateLimited));
    }

    #[tokio::test]
    async fn empty_body_is_distinct_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let err = executor(1)
            .get(&CancellationToken::new(), &format!("{}/empty", server.uri()), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, RequestError::EmptyResponse));
    }

    #[tokio::test]
    async fn connection_failure_is_transport_error() {
        let err = executor(1)
            .get(&CancellationToken::new(), "http://127.0.0.1:1/unreachable", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, RequestError::Transport(_)));
    }

    #[tokio::test]
    async fn cancellation_interrupts_in_flight_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let client = build_client(None, false).expect("client should build");
        let executor = RequestExecutor::new(client, RetryPolicy::new(5), Duration::from_secs(45));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let err = executor
            .get(&cancel, &format!("{}/slow", server.uri()), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, RequestError::Cancelled));
        assert!(started.elapsed() < Duration::from_millis(450));
    }

    #[tokio::test]
    async fn cancellation_interrupts_backoff() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let client = build_client(None, false).expect("client should build");
        let policy = RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(10),
        };
        let executor = RequestExecutor::new(client, policy, Duration::from_secs(5));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(200)).await;
            trigger.cancel();
        });

        let err = tokio::time::timeout(
            Duration::from_secs(3),
            executor.get(&cancel, &format!("{}/down", server.uri()), &[]),
        )
        .await
        .expect("backoff should not outlive cancellation")
        .unwrap_err();
        assert!(matches!(err, RequestError::Cancelled));
    }

    #[tokio::test]
    async fn already_cancelled_sends_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x"))
            .expect(0)
            .mount(&server)
            .await;

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = executor(3)
            .get(&cancel, &format!("{}/never", server.uri()), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, RequestError::Cancelled));
    }
}
