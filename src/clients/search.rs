//! External search collaborator client.
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clients::headers::build_idempotent_headers;
use crate::util::retry::RetryConfig;

/// One result returned by the search collaborator.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SearchResult {
    pub(crate) title: String,
    pub(crate) url: String,
    pub(crate) content: String,
    #[serde(default)]
    pub(crate) score: f64,
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    search_depth: &'a str,
    max_results: usize,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[async_trait]
pub(crate) trait SearchClient: Send + Sync {
    /// `job_id` keys the outbound idempotency header so a retried call is
    /// recognizable upstream.
    async fn search(&self, job_id: Uuid, query: &str, max_results: usize) -> Result<Vec<SearchResult>>;
}

/// Talks to the configured search vendor over HTTP, with retry on
/// retryable failures using the shared backoff policy.
pub(crate) struct HttpSearchClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
    retry: RetryConfig,
}

impl HttpSearchClient {
    #[must_use]
    pub(crate) fn new(base_url: String, api_key: String, timeout: Duration, retry: RetryConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            api_key,
            timeout,
            retry,
        }
    }
}

#[async_trait]
impl SearchClient for HttpSearchClient {
    async fn search(&self, job_id: Uuid, query: &str, max_results: usize) -> Result<Vec<SearchResult>> {
        let url = format!("{}/search", self.base_url);
        let body = SearchRequest {
            query,
            search_depth: "basic",
            max_results,
        };
        let headers = build_idempotent_headers(job_id, query);

        let mut attempt = 0usize;
        loop {
            let call = self
                .http
                .post(&url)
                .bearer_auth(&self.api_key)
                .headers(headers.clone())
                .json(&body)
                .send();

            let result = tokio::time::timeout(self.timeout, call).await;

            match result {
                Ok(Ok(response)) => {
                    let response = response.error_for_status();
                    match response {
                        Ok(response) => {
                            let parsed: SearchResponse = response
                                .json()
                                .await
                                .context("decoding search response")?;
                            return Ok(parsed.results);
                        }
                        Err(err) if self.retry.can_retry(attempt) && is_retryable_status(&err) => {
                            tokio::time::sleep(self.retry.delay_for_attempt(attempt)).await;
                            attempt += 1;
                        }
                        Err(err) => return Err(err.into()),
                    }
                }
                Ok(Err(err)) if self.retry.can_retry(attempt) => {
                    tokio::time::sleep(self.retry.delay_for_attempt(attempt)).await;
                    attempt += 1;
                    let _ = err;
                }
                Ok(Err(err)) => return Err(err.into()),
                Err(elapsed) if self.retry.can_retry(attempt) => {
                    tokio::time::sleep(self.retry.delay_for_attempt(attempt)).await;
                    attempt += 1;
                    let _ = elapsed;
                }
                Err(elapsed) => return Err(elapsed.into()),
            }
        }
    }
}

fn is_retryable_status(err: &reqwest::Error) -> bool {
    err.status()
        .is_some_and(|status| status.as_u16() == 429 || status.is_server_error())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn search_returns_parsed_results() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [
                    {"title": "Acme news", "url": "https://example.com/a", "content": "c", "score": 0.8}
                ]
            })))
            .mount(&server)
            .await;

        let client = HttpSearchClient::new(
            server.uri(),
            "key".to_owned(),
            Duration::from_secs(5),
            RetryConfig::new(1, 10, 100),
        );

        let results = client.search(Uuid::new_v4(), "acme", 15).await.expect("search");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].url, "https://example.com/a");
    }

    #[tokio::test]
    async fn search_retries_on_server_error_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"results": []})))
            .mount(&server)
            .await;

        let client = HttpSearchClient::new(
            server.uri(),
            "key".to_owned(),
            Duration::from_secs(5),
            RetryConfig::new(3, 5, 50),
        );

        let results = client.search(Uuid::new_v4(), "acme", 15).await.expect("search");
        assert!(results.is_empty());
    }
}
