//! Collector stage: fan-in barrier merging the four researcher deltas.
//!
//! Performs no network I/O; it exists as its own stage — mirroring the
//! teacher's `PipelineStages` container pattern — so the curator always
//! observes a fully-merged state regardless of which researcher finished
//! last.
use anyhow::Result;
use async_trait::async_trait;

use crate::job::events::Event;
use crate::job::manager::JobReporter;

use super::researcher::ResearcherDelta;
use super::state::Category;

pub(crate) struct CollectorDelta {
    pub(crate) deltas: Vec<ResearcherDelta>,
    pub(crate) message: String,
}

#[async_trait]
pub(crate) trait CollectorStage: Send + Sync {
    async fn run(&self, deltas: Vec<ResearcherDelta>, reporter: &JobReporter) -> Result<CollectorDelta>;
}

pub(crate) struct CollectorStageImpl;

#[async_trait]
impl CollectorStage for CollectorStageImpl {
    async fn run(&self, deltas: Vec<ResearcherDelta>, reporter: &JobReporter) -> Result<CollectorDelta> {
        let mut counts = [0usize; 4];
        for delta in &deltas {
            let index = Category::ALL.iter().position(|c| *c == delta.category).unwrap_or(0);
            counts[index] = delta.documents.len();
            reporter.emit(Event::category_complete(delta.category.label(), delta.documents.len()));
        }

        let message = format!(
            "Collected {} financial, {} news, {} industry, {} company documents",
            counts[0], counts[1], counts[2], counts[3]
        );

        Ok(CollectorDelta { deltas, message })
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
    use crate::pipeline::state::DocumentMap;

    fn reporter() -> (JobManager, crate::job::manager::JobReporter) {
        let manager = JobManager::new(4, 8, 3600, test_metrics(), std::sync::Arc::new(crate::store::report_store::NoopReportStore));
        let (_job_id, reporter) = manager
            .submit(&crate::job::types::ResearchRequest {
                company: "Acme".to_owned(),
                company_url: None,
                industry: None,
                hq_location: None,
            })
            .expect("submit");
        (manager, reporter)
    }

    #[tokio::test]
    async fn collector_summarizes_per_category_counts() {
        let stage = CollectorStageImpl;
        let (_manager, reporter) = reporter();

        let deltas = vec![
            ResearcherDelta {
                category: Category::Financial,
                documents: DocumentMap::new(),
                message: String::new(),
            },
            ResearcherDelta {
                category: Category::News,
                documents: DocumentMap::new(),
                message: String::new(),
            },
        ];

        let result = stage.run(deltas, &reporter).await.expect("run");
        assert!(result.message.contains("0 financial"));
        assert!(result.message.contains("0 news"));
    }
}
