//! Grounding stage: fetches the company homepage, if one was given.
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::warn;

use crate::clients::extract::ExtractClient;
use crate::job::manager::JobReporter;

use super::state::{ResearchState, SiteScrape};

pub(crate) struct GroundingDelta {
    pub(crate) site_scrape: Option<SiteScrape>,
    pub(crate) message: String,
}

#[async_trait]
pub(crate) trait GroundingStage: Send + Sync {
    async fn run(&self, state: &ResearchState, reporter: &JobReporter) -> Result<GroundingDelta>;
}

pub(crate) struct GroundingStageImpl {
    extract: Arc<dyn ExtractClient>,
}

impl GroundingStageImpl {
    #[must_use]
    pub(crate) fn new(extract: Arc<dyn ExtractClient>) -> Self {
        Self { extract }
    }
}

#[async_trait]
impl GroundingStage for GroundingStageImpl {
    async fn run(&self, state: &ResearchState, reporter: &JobReporter) -> Result<GroundingDelta> {
        reporter.set_progress(5, Some("Analyzing company website"));

        let Some(url) = state.company_url.as_deref() else {
            return Ok(GroundingDelta {
                site_scrape: None,
                message: "No company URL provided; skipping site scrape".to_owned(),
            });
        };

        reporter.cancellation().check()?;

        match self.extract.extract(reporter.job_id(), url).await {
            Ok(Some(raw_content)) => Ok(GroundingDelta {
                site_scrape: Some(SiteScrape {
                    url: url.to_owned(),
                    title: state.company.clone(),
                    raw_content,
                }),
                message: format!("Fetched company homepage at {url}"),
            }),
            Ok(None) => {
                warn!(url, "company homepage extraction returned no text");
                Ok(GroundingDelta {
                    site_scrape: None,
                    message: format!("Company homepage at {url} yielded no text"),
                })
            }
            Err(err) => {
                warn!(url, error = %err, "company homepage extraction failed");
                Ok(GroundingDelta {
                    site_scrape: None,
                    message: format!("Failed to fetch company homepage at {url}"),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_metrics() -> std::sync::Arc<crate::observability::metrics::Metrics> {
        std::sync::Arc::new(
            crate::observability::metrics::Metrics::new(std::sync::Arc::new(prometheus::Registry::new()))
                .expect("metrics register"),
        )
    }
    use crate::job::manager::JobManager;
    use std::sync::Mutex;

    struct StubExtract {
        result: Mutex<Option<Result<Option<String>>>>,
    }

    #[async_trait]
    impl ExtractClient for StubExtract {
        async fn extract(&self, _job_id: uuid::Uuid, _url: &str) -> Result<Option<String>> {
            self.result.lock().unwrap().take().expect("single call")
        }
    }

    fn reporter() -> (JobManager, JobReporter) {
        let manager = JobManager::new(4, 8, 3600, test_metrics(), std::sync::Arc::new(crate::store::report_store::NoopReportStore));
        let (_job_id, reporter) = manager
            .submit(&crate::job::types::ResearchRequest {
                company: "Acme".to_owned(),
                company_url: Some("https://acme.example".to_owned()),
                industry: None,
                hq_location: None,
            })
            .expect("submit");
        (manager, reporter)
    }

    #[tokio::test]
    async fn grounding_without_url_skips_extraction() {
        let stage = GroundingStageImpl::new(Arc::new(StubExtract {
            result: Mutex::new(Some(Ok(None))),
        }));
        let state = ResearchState::new("Acme".to_owned(), None, None, None);
        let (_manager, reporter) = reporter();

        let delta = stage.run(&state, &reporter).await.expect("run");
        assert!(delta.site_scrape.is_none());
    }

    #[tokio::test]
    async fn grounding_with_text_populates_site_scrape() {
        let stage = GroundingStageImpl::new(Arc::new(StubExtract {
            result: Mutex::new(Some(Ok(Some("Acme makes widgets".to_owned())))),
        }));
        let state = ResearchState::new(
            "Acme".to_owned(),
            Some("https://acme.example".to_owned()),
            None,
            None,
        );
        let (_manager, reporter) = reporter();

        let delta = stage.run(&state, &reporter).await.expect("run");
        let scrape = delta.site_scrape.expect("site scrape");
        assert_eq!(scrape.raw_content, "Acme makes widgets");
    }

    #[tokio::test]
    async fn grounding_survives_extraction_failure() {
        let stage = GroundingStageImpl::new(Arc::new(StubExtract {
            result: Mutex::new(Some(Err(anyhow::anyhow!("boom")))),
        }));
        let state = ResearchState::new(
            "Acme".to_owned(),
            Some("https://acme.example".to_owned()),
            None,
            None,
        );
        let (_manager, reporter) = reporter();

        let delta = stage.run(&state, &reporter).await.expect("run");
        assert!(delta.site_scrape.is_none());
    }
}
