use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use lapwise_core::config::SearchConfig;
use lapwise_core::recommendation::{GroundingError, RawListing, SearchGrounding};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 3, base_delay_ms: 250, max_delay_ms: 4_000 }
    }
}

impl From<&SearchConfig> for RetryPolicy {
    fn from(config: &SearchConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay_ms: config.retry_base_delay_ms,
            max_delay_ms: config.retry_max_delay_ms,
        }
    }
}

impl RetryPolicy {
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

/// Failure of a single search attempt.
#[derive(Debug)]
pub enum AttemptError {
    Transient(String),
    Fatal(GroundingError),
}

/// Runs `operation` until it succeeds, fails fatally, or the retries run out.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, mut operation: F) -> Result<T, GroundingError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, AttemptError>>,
{
    let mut last_reason = String::new();
    for attempt in 0..=policy.max_retries {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(AttemptError::Fatal(error)) => return Err(error),
            Err(AttemptError::Transient(reason)) => {
                warn!(
                    event_name = "search.attempt.failed",
                    attempt,
                    max_retries = policy.max_retries,
                    error = %reason,
                    "search attempt failed"
                );
                last_reason = reason;
                if attempt < policy.max_retries {
                    tokio::time::sleep(policy.backoff(attempt)).await;
                }
            }
        }
    }

    Err(GroundingError::Unavailable { attempts: policy.max_retries + 1, reason: last_reason })
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    max_results: usize,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<RawListing>,
}

/// Parses the search endpoint's `{ "results": [...] }` body.
pub fn parse_search_response(body: &str) -> Result<Vec<RawListing>, GroundingError> {
    serde_json::from_str::<SearchResponse>(body)
        .map(|response| response.results)
        .map_err(|error| GroundingError::MalformedResponse(error.to_string()))
}

/// Search collaborator reached over HTTP.
pub struct HttpSearchGrounding {
    endpoint: String,
    api_key: Option<SecretString>,
    max_results: usize,
    retry: RetryPolicy,
    http_client: Client,
}

impl HttpSearchGrounding {
    pub fn from_config(config: &SearchConfig, max_results: usize) -> Result<Self, GroundingError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|error| GroundingError::Unavailable { attempts: 0, reason: error.to_string() })?;

        Ok(Self {
            endpoint: config.endpoint.trim().to_string(),
            api_key: config.api_key.clone(),
            // Ask for a few extra listings; some are always dropped as unviable.
            max_results: max_results.saturating_mul(2),
            retry: RetryPolicy::from(config),
            http_client,
        })
    }

    async fn attempt(&self, query: &str) -> Result<Vec<RawListing>, AttemptError> {
        let mut builder = self
            .http_client
            .post(&self.endpoint)
            .json(&SearchRequest { query, max_results: self.max_results });
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key.expose_secret());
        }

        let response =
            builder.send().await.map_err(|error| AttemptError::Transient(error.to_string()))?;
        let status = response.status();
        let body =
            response.text().await.map_err(|error| AttemptError::Transient(error.to_string()))?;

        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(AttemptError::Transient(format!("search endpoint returned {status}")));
        }
        if !status.is_success() {
            return Err(AttemptError::Fatal(GroundingError::Unavailable {
                attempts: 1,
                reason: format!("search endpoint rejected the request with {status}"),
            }));
        }

        parse_search_response(&body).map_err(AttemptError::Fatal)
    }
}

#[async_trait]
impl SearchGrounding for HttpSearchGrounding {
    async fn search(&self, query: &str) -> Result<Vec<RawListing>, GroundingError> {
        debug!(event_name = "search.request.sent", endpoint = %self.endpoint, query, "searching");
        with_retry(self.retry, |_| self.attempt(query)).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use lapwise_core::recommendation::GroundingError;

    use super::{parse_search_response, with_retry, AttemptError, RetryPolicy};

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy { max_retries, base_delay_ms: 1, max_delay_ms: 2 }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy { max_retries: 5, base_delay_ms: 250, max_delay_ms: 1_000 };
        assert_eq!(policy.backoff(0), Duration::from_millis(250));
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(2), Duration::from_millis(1_000));
        assert_eq!(policy.backoff(40), Duration::from_millis(1_000));
    }

    #[tokio::test]
    async fn transient_failures_are_retried_until_success() {
        let calls = AtomicU32::new(0);
        let result = with_retry(fast_policy(3), |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 2 {
                    Err(AttemptError::Transient("503".to_string()))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_report_unavailable() {
        let result: Result<(), GroundingError> = with_retry(fast_policy(2), |_| async {
            Err(AttemptError::Transient("connection refused".to_string()))
        })
        .await;

        assert_eq!(
            result,
            Err(GroundingError::Unavailable { attempts: 3, reason: "connection refused".to_string() })
        );
    }

    #[tokio::test]
    async fn fatal_failures_stop_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), GroundingError> = with_retry(fast_policy(5), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AttemptError::Fatal(GroundingError::MalformedResponse("eof".to_string()))) }
        })
        .await;

        assert!(matches!(result, Err(GroundingError::MalformedResponse(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn response_bodies_parse_into_listings() {
        let listings = parse_search_response(
            r#"{"results": [
                {"title": "Legion 5i", "specs": "i7-13650HX, 16GB RAM", "price": "Rs 79,990",
                 "link": "https://example.test/legion", "pros": ["fast"], "cons": []},
                {"title": "Aspire 7", "specs": ["i5-12450H", "8GB RAM"], "price": 56990}
            ]}"#,
        )
        .expect("parsed");

        assert_eq!(listings.len(), 2);
        assert_eq!(listings[0].link.as_deref(), Some("https://example.test/legion"));
        assert_eq!(listings[1].price, "56990");

        assert!(matches!(
            parse_search_response("<html>busy</html>"),
            Err(GroundingError::MalformedResponse(_))
        ));
    }
}
