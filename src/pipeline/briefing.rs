//! Briefing stage: turns each category's curated, enriched documents into
//! a short narrative via the language model.
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::clients::llm::{collect, LlmClient};
use crate::job::events::Event;
use crate::job::manager::JobReporter;
use crate::util::markdown::truncate;

use super::state::{Category, DocumentMap};

const PER_DOCUMENT_CHAR_CAP: usize = 8_000;
const TOTAL_CHAR_BUDGET: usize = 120_000;

#[async_trait]
pub(crate) trait BriefingStage: Send + Sync {
    async fn run(
        &self,
        category: Category,
        company: &str,
        industry: Option<&str>,
        documents: &DocumentMap,
        reporter: &JobReporter,
    ) -> Result<String>;
}

pub(crate) struct BriefingStageImpl {
    llm: Arc<dyn LlmClient>,
}

impl BriefingStageImpl {
    #[must_use]
    pub(crate) fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

fn build_prompt(category: Category, company: &str, industry: Option<&str>, documents: &DocumentMap) -> String {
    let mut sorted: Vec<_> = documents.values().collect();
    sorted.sort_by(|a, b| {
        let a_score = a.evaluation.as_ref().map_or(a.score, |e| e.overall_score);
        let b_score = b.evaluation.as_ref().map_or(b.score, |e| e.overall_score);
        b_score.partial_cmp(&a_score).unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut body = String::new();
    let mut used = 0usize;
    for doc in sorted {
        let text = doc.raw_content.as_deref().unwrap_or(&doc.content);
        let capped = truncate(text, PER_DOCUMENT_CHAR_CAP);
        if used + capped.len() > TOTAL_CHAR_BUDGET {
            break;
        }
        used += capped.len();
        body.push_str(&format!("### {}\n{}\n\n", doc.title, capped));
    }

    let industry_clause = industry.map_or(String::new(), |industry| format!(" in the {industry} industry"));
    format!(
        "Write a concise {} briefing for {company}{industry_clause} based on the following sources:\n\n{body}",
        category.heading().to_lowercase(),
    )
}

#[async_trait]
impl BriefingStage for BriefingStageImpl {
    async fn run(
        &self,
        category: Category,
        company: &str,
        industry: Option<&str>,
        documents: &DocumentMap,
        reporter: &JobReporter,
    ) -> Result<String> {
        reporter.emit(Event::status_update(
            crate::job::types::JobStatus::Processing,
            90,
            Some(&format!("Generating {} briefing", category.heading())),
            None,
            None,
        ));

        if documents.is_empty() {
            return Ok(String::new());
        }

        let prompt = build_prompt(category, company, industry, documents);
        let stream = self
            .llm
            .stream_completion("You write concise business research briefings.", &prompt)
            .await?;
        let text = collect(stream).await?;

        reporter.emit(Event::status_update(
            crate::job::types::JobStatus::Processing,
            90,
            Some(&format!("Completed {} briefing ({} characters)", category.heading(), text.len())),
            None,
            None,
        ));

        Ok(text)
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
    use crate::pipeline::state::{Document, DocumentSource};
    use futures::stream;

    struct StubLlm;

    #[async_trait]
    impl LlmClient for StubLlm {
        async fn stream_completion(
            &self,
            _system: &str,
            _prompt: &str,
        ) -> Result<crate::clients::llm::CompletionStream> {
            Ok(Box::pin(stream::iter(vec![Ok("Acme is growing.".to_owned())])))
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
    async fn briefing_returns_empty_string_for_empty_category() {
        let stage = BriefingStageImpl::new(Arc::new(StubLlm));
        let (_manager, reporter) = reporter();
        let text = stage
            .run(Category::News, "Acme", None, &DocumentMap::new(), &reporter)
            .await
            .expect("run");
        assert!(text.is_empty());
    }

    #[tokio::test]
    async fn briefing_collects_streamed_text() {
        let stage = BriefingStageImpl::new(Arc::new(StubLlm));
        let mut documents = DocumentMap::new();
        documents.insert(
            "https://a.example".to_owned(),
            Document {
                url: "https://a.example".to_owned(),
                title: "Acme raises funding".to_owned(),
                content: "Acme raised a round".to_owned(),
                raw_content: None,
                query: "acme".to_owned(),
                source: DocumentSource::WebSearch,
                score: 0.9,
                evaluation: None,
            },
        );

        let (_manager, reporter) = reporter();
        let text = stage
            .run(Category::Financial, "Acme", None, &documents, &reporter)
            .await
            .expect("run");
        assert_eq!(text, "Acme is growing.");
    }
}
