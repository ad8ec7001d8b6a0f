//! Editor stage: two sequential language-model passes compiling the four
//! briefings into a single polished report, plus a references section.
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;

use crate::clients::llm::LlmClient;
use crate::job::events::Event;
use crate::job::manager::JobReporter;
use crate::util::error::EmptyContent;
use crate::util::markdown::render_references;

use super::state::Category;

const MARKDOWN_RULES: &str = "Use a single # for the title, ## for sections, ### for subsections, \
    * for every bullet (never - or •), [text](url) for links, and one blank line between structural elements.";

#[async_trait]
pub(crate) trait EditorStage: Send + Sync {
    async fn run(
        &self,
        company: &str,
        briefings: &[(Category, String)],
        references: &[String],
        reporter: &JobReporter,
    ) -> Result<String>;
}

pub(crate) struct EditorStageImpl {
    llm: Arc<dyn LlmClient>,
}

impl EditorStageImpl {
    #[must_use]
    pub(crate) fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    async fn stream_and_emit(&self, system: &str, prompt: &str, reporter: &JobReporter) -> Result<String> {
        let mut stream = self.llm.stream_completion(system, prompt).await?;
        let mut out = String::new();
        while let Some(fragment) = stream.next().await {
            let fragment = fragment?;
            reporter.emit(Event::report_chunk(&fragment));
            out.push_str(&fragment);
        }
        Ok(out)
    }
}

#[async_trait]
impl EditorStage for EditorStageImpl {
    async fn run(
        &self,
        company: &str,
        briefings: &[(Category, String)],
        references: &[String],
        reporter: &JobReporter,
    ) -> Result<String> {
        reporter.cancellation().check()?;

        let concatenated: String = briefings
            .iter()
            .map(|(category, text)| format!("## {}\n\n{}\n\n", category.heading(), text))
            .collect();

        let compile_prompt = format!(
            "Compile the following category briefings about {company} into a cohesive markdown report. {MARKDOWN_RULES}\n\n{concatenated}"
        );
        let draft = self
            .stream_and_emit(
                "You are a research editor compiling a company report.",
                &compile_prompt,
                reporter,
            )
            .await
            .context("editor compile pass failed")?;

        reporter.cancellation().check()?;

        let polish_prompt = format!(
            "Deduplicate repeated points and normalize formatting in the following markdown report. {MARKDOWN_RULES}\n\n{draft}"
        );
        let polished = self
            .stream_and_emit(
                "You are a research editor polishing a company report.",
                &polish_prompt,
                reporter,
            )
            .await
            .context("editor polish pass failed")?;

        if polished.trim().is_empty() {
            return Err(EmptyContent("editor produced an empty report".to_owned()).into());
        }

        let mut report = polished;
        if !report.ends_with('\n') {
            report.push('\n');
        }
        report.push('\n');
        report.push_str(&render_references(references));

        Ok(report)
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
    use futures::stream;

    struct StubLlm {
        response: &'static str,
    }

    #[async_trait]
    impl LlmClient for StubLlm {
        async fn stream_completion(
            &self,
            _system: &str,
            _prompt: &str,
        ) -> Result<crate::clients::llm::CompletionStream> {
            Ok(Box::pin(stream::iter(vec![Ok(self.response.to_owned())])))
        }
    }

    fn reporter() -> (JobManager, JobReporter) {
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
    async fn editor_appends_references_section() {
        let stage = EditorStageImpl::new(Arc::new(StubLlm {
            response: "# Acme\n\n## Company\n\nAcme is a widget maker.\n",
        }));
        let (_manager, reporter) = reporter();

        let briefings = vec![(Category::Company, "Acme is a widget maker.".to_owned())];
        let references = vec!["https://acme.example".to_owned()];

        let report = stage
            .run("Acme", &briefings, &references, &reporter)
            .await
            .expect("run");

        assert!(report.contains("## References"));
        assert!(report.contains("* [https://acme.example](https://acme.example)"));
    }

    #[tokio::test]
    async fn editor_fails_on_empty_polish_output() {
        let stage = EditorStageImpl::new(Arc::new(StubLlm { response: "" }));
        let (_manager, reporter) = reporter();

        let result = stage.run("Acme", &[], &[], &reporter).await;
        assert!(result.is_err());
    }
}
