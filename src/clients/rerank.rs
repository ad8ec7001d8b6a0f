//! Optional reranking collaborator. Absent a configured API key, the
//! curator falls back to upstream search scores via [`IdentityRerank`].
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clients::headers::build_idempotent_headers;
use crate::util::retry::RetryConfig;

#[derive(Debug, Serialize)]
struct RerankRequest<'a> {
    query: &'a str,
    documents: &'a [String],
}

#[derive(Debug, Deserialize)]
struct RerankResponse {
    #[serde(default)]
    results: Vec<RerankResult>,
}

#[derive(Debug, Deserialize)]
struct RerankResult {
    index: usize,
    relevance_score: f64,
}

#[async_trait]
pub(crate) trait RerankClient: Send + Sync {
    /// Score `documents` against `query`. Returns one score per input
    /// document, in input order. `job_id` keys the outbound idempotency
    /// header so a retried call is recognizable upstream.
    async fn rerank(&self, job_id: Uuid, query: &str, documents: &[String]) -> Result<Vec<f64>>;
}

pub(crate) struct HttpRerankClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
    retry: RetryConfig,
}

impl HttpRerankClient {
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
impl RerankClient for HttpRerankClient {
    async fn rerank(&self, job_id: Uuid, query: &str, documents: &[String]) -> Result<Vec<f64>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let endpoint = format!("{}/rerank", self.base_url);
        let body = RerankRequest { query, documents };
        let headers = build_idempotent_headers(job_id, query);

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
                        let parsed: RerankResponse =
                            response.json().await.context("decoding rerank response")?;
                        let mut scores = vec![0.0; documents.len()];
                        for result in parsed.results {
                            if let Some(slot) = scores.get_mut(result.index) {
                                *slot = result.relevance_score;
                            }
                        }
                        return Ok(scores);
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

/// Pass-through reranker used when no reranking vendor is configured: the
/// curator then filters on upstream search scores directly.
pub(crate) struct IdentityRerank;

#[async_trait]
impl RerankClient for IdentityRerank {
    async fn rerank(&self, _job_id: Uuid, _query: &str, documents: &[String]) -> Result<Vec<f64>> {
        Ok(vec![0.0; documents.len()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn rerank_maps_scores_back_to_input_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rerank"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [
                    {"index": 1, "relevance_score": 0.9},
                    {"index": 0, "relevance_score": 0.3}
                ]
            })))
            .mount(&server)
            .await;

        let client = HttpRerankClient::new(
            server.uri(),
            "key".to_owned(),
            Duration::from_secs(5),
            RetryConfig::new(1, 10, 100),
        );

        let scores = client
            .rerank(Uuid::new_v4(), "acme", &["doc a".to_owned(), "doc b".to_owned()])
            .await
            .expect("rerank");
        assert_eq!(scores, vec![0.3, 0.9]);
    }

    #[tokio::test]
    async fn identity_rerank_returns_zeroed_scores() {
        let client = IdentityRerank;
        let scores = client
            .rerank(Uuid::new_v4(), "acme", &["a".to_owned(), "b".to_owned()])
            .await
            .unwrap();
        assert_eq!(scores, vec![0.0, 0.0]);
    }
}
