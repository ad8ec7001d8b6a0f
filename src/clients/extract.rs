//! External content-extraction collaborator client.
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clients::headers::build_idempotent_headers;
use crate::util::retry::RetryConfig;

#[derive(Debug, Serialize)]
struct ExtractRequest<'a> {
    urls: &'a [String],
    extract_depth: &'a str,
}

#[derive(Debug, Deserialize)]
struct ExtractResponse {
    #[serde(default)]
    results: Vec<ExtractedPage>,
}

#[derive(Debug, Deserialize)]
struct ExtractedPage {
    #[serde(default)]
    raw_content: String,
}

#[async_trait]
pub(crate) trait ExtractClient: Send + Sync {
    /// Fetch full text for a single URL. Returns `None` when the
    /// collaborator yields no usable content, rather than failing the
    /// caller. `job_id` keys the outbound idempotency header so a retried
    /// call is recognizable upstream.
    async fn extract(&self, job_id: Uuid, url: &str) -> Result<Option<String>>;
}

pub(crate) struct HttpExtractClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
    retry: RetryConfig,
}

impl HttpExtractClient {
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
impl ExtractClient for HttpExtractClient {
    async fn extract(&self, job_id: Uuid, url: &str) -> Result<Option<String>> {
        let endpoint = format!("{}/extract", self.base_url);
        let urls = [url.to_owned()];
        let body = ExtractRequest {
            urls: &urls,
            extract_depth: "basic",
        };
        let headers = build_idempotent_headers(job_id, url);

        let mut attempt = 0usize;
        loop {
            let call = self
                .http
                .post(&endpoint)
                .bearer_auth(&self.api_key)
                .headers(headers.clone())
                .json(&body)
                .send();

            match tokio::time::timeout(self.timeout, call).await {
                Ok(Ok(response)) => match response.error_for_status() {
                    Ok(response) => {
                        let parsed: ExtractResponse = response
                            .json()
                            .await
                            .context("decoding extract response")?;
                        return Ok(parsed
                            .results
                            .into_iter()
                            .next()
                            .map(|page| page.raw_content)
                            .filter(|text| !text.trim().is_empty()));
                    }
                    Err(err) if self.retry.can_retry(attempt) && retryable(&err) => {
                        tokio::time::sleep(self.retry.delay_for_attempt(attempt)).await;
                        attempt += 1;
                    }
                    Err(err) => return Err(err.into()),
                },
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

fn retryable(err: &reqwest::Error) -> bool {
    err.status()
        .is_some_and(|status| status.as_u16() == 429 || status.is_server_error())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn extract_returns_raw_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/extract"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [{"raw_content": "full page text"}]
            })))
            .mount(&server)
            .await;

        let client = HttpExtractClient::new(
            server.uri(),
            "key".to_owned(),
            Duration::from_secs(5),
            RetryConfig::new(1, 10, 100),
        );

        let text = client.extract(Uuid::new_v4(), "https://acme.example").await.expect("extract");
        assert_eq!(text.as_deref(), Some("full page text"));
    }

    #[tokio::test]
    async fn extract_returns_none_for_blank_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/extract"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [{"raw_content": "   "}]
            })))
            .mount(&server)
            .await;

        let client = HttpExtractClient::new(
            server.uri(),
            "key".to_owned(),
            Duration::from_secs(5),
            RetryConfig::new(1, 10, 100),
        );

        let text = client.extract(Uuid::new_v4(), "https://acme.example").await.expect("extract");
        assert!(text.is_none());
    }
}
