//! Output stage: emits the terminal status update and writes through to
//! the optional persistence collaborator.
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::warn;

use crate::job::manager::JobReporter;
use crate::job::types::JobResult;
use crate::store::report_store::ReportStore;

#[async_trait]
pub(crate) trait OutputStage: Send + Sync {
    async fn run(&self, company: &str, report: &str, reporter: &JobReporter) -> Result<()>;
}

pub(crate) struct OutputStageImpl {
    report_store: Arc<dyn ReportStore>,
}

impl OutputStageImpl {
    #[must_use]
    pub(crate) fn new(report_store: Arc<dyn ReportStore>) -> Self {
        Self { report_store }
    }
}

#[async_trait]
impl OutputStage for OutputStageImpl {
    async fn run(&self, company: &str, report: &str, reporter: &JobReporter) -> Result<()> {
        if let Err(error) = self.report_store.save_report(reporter.job_id(), report).await {
            warn!(job_id = %reporter.job_id(), %error, "failed to persist completed report");
        }

        reporter.complete(JobResult {
            company: company.to_owned(),
            report: report.to_owned(),
        });

        Ok(())
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
    use crate::store::report_store::NoopReportStore;

    #[tokio::test]
    async fn output_marks_job_completed_with_result() {
        let manager = JobManager::new(4, 8, 3600, test_metrics(), std::sync::Arc::new(crate::store::report_store::NoopReportStore));
        let (job_id, reporter) = manager
            .submit(&crate::job::types::ResearchRequest {
                company: "Acme".to_owned(),
                company_url: None,
                industry: None,
                hq_location: None,
            })
            .expect("submit");

        let stage = OutputStageImpl::new(Arc::new(NoopReportStore));
        stage.run("Acme", "# Acme\n", &reporter).await.expect("run");

        let snapshot = manager.status(job_id).expect("status");
        assert_eq!(snapshot.status, crate::job::types::JobStatus::Completed);
        assert_eq!(snapshot.progress, 100);
        assert_eq!(snapshot.result.unwrap().report, "# Acme\n");
    }
}
