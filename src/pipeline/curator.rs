//! Curator stage: filters and scores each category's documents, then
//! selects the cross-category reference list.
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::clients::rerank::RerankClient;
use crate::job::events::Event;
use crate::job::manager::JobReporter;

use super::state::{Category, Document, DocumentMap, Evaluation};

const TOP_PER_CATEGORY: usize = 30;

pub(crate) struct CuratorDelta {
    pub(crate) curated: [(Category, DocumentMap); 4],
    pub(crate) references: Vec<String>,
    pub(crate) message: String,
}

#[async_trait]
pub(crate) trait CuratorStage: Send + Sync {
    async fn run(
        &self,
        categories: &[(Category, DocumentMap)],
        score_threshold: f64,
        max_references: usize,
        reporter: &JobReporter,
    ) -> Result<CuratorDelta>;
}

pub(crate) struct CuratorStageImpl {
    rerank: Arc<dyn RerankClient>,
}

impl CuratorStageImpl {
    #[must_use]
    pub(crate) fn new(rerank: Arc<dyn RerankClient>) -> Self {
        Self { rerank }
    }
}

async fn curate_category(
    rerank: &Arc<dyn RerankClient>,
    category: Category,
    documents: &DocumentMap,
    score_threshold: f64,
    reporter: &JobReporter,
) -> DocumentMap {
    let urls: Vec<String> = documents.keys().cloned().collect();
    let contents: Vec<String> = documents.values().map(|doc| doc.content.clone()).collect();

    let rerank_scores = if contents.is_empty() {
        Vec::new()
    } else {
        rerank
            .rerank(reporter.job_id(), &category.heading().to_lowercase(), &contents)
            .await
            .unwrap_or_else(|_| vec![0.0; contents.len()])
    };
    let has_rerank_scores = rerank_scores.iter().any(|score| *score != 0.0);

    let mut scored: Vec<(String, Document, f64)> = urls
        .into_iter()
        .zip(documents.values().cloned())
        .enumerate()
        .map(|(index, (url, doc))| {
            let score = if has_rerank_scores {
                rerank_scores.get(index).copied().unwrap_or(doc.score)
            } else {
                doc.score
            };
            (url, doc, score)
        })
        .collect();

    scored.retain(|(_, _, score)| *score >= score_threshold);
    scored.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(TOP_PER_CATEGORY);

    let mut curated = DocumentMap::new();
    for (url, mut doc, score) in scored {
        doc.evaluation = Some(Evaluation {
            overall_score: score,
            query: doc.query.clone(),
        });
        reporter.emit(Event::document_kept(category.label(), &url, score));
        curated.insert(url, doc);
    }

    curated
}

#[async_trait]
impl CuratorStage for CuratorStageImpl {
    async fn run(
        &self,
        categories: &[(Category, DocumentMap)],
        score_threshold: f64,
        max_references: usize,
        reporter: &JobReporter,
    ) -> Result<CuratorDelta> {
        reporter.cancellation().check()?;

        let mut curated_by_category: Vec<(Category, DocumentMap)> = Vec::with_capacity(4);
        for (category, documents) in categories {
            let curated = curate_category(&self.rerank, *category, documents, score_threshold, reporter).await;
            curated_by_category.push((*category, curated));
        }

        let mut all_scored: Vec<(String, f64)> = Vec::new();
        for (_, curated) in &curated_by_category {
            for (url, doc) in curated {
                let score = doc.evaluation.as_ref().map_or(doc.score, |eval| eval.overall_score);
                all_scored.push((url.clone(), score));
            }
        }

        all_scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let mut seen = std::collections::HashSet::new();
        let mut references = Vec::new();
        for (url, _) in all_scored {
            if seen.insert(url.clone()) {
                references.push(url);
            }
            if references.len() >= max_references {
                break;
            }
        }

        let message = format!(
            "Curated {} references from {} categories",
            references.len(),
            curated_by_category.len()
        );

        let mut iter = curated_by_category.into_iter();
        let curated: [(Category, DocumentMap); 4] = [
            iter.next().unwrap_or((Category::Financial, DocumentMap::new())),
            iter.next().unwrap_or((Category::News, DocumentMap::new())),
            iter.next().unwrap_or((Category::Industry, DocumentMap::new())),
            iter.next().unwrap_or((Category::Company, DocumentMap::new())),
        ];

        Ok(CuratorDelta {
            curated,
            references,
            message,
        })
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
    use crate::pipeline::state::DocumentSource;

    struct StubRerank;

    #[async_trait]
    impl RerankClient for StubRerank {
        async fn rerank(&self, _job_id: uuid::Uuid, _query: &str, documents: &[String]) -> Result<Vec<f64>> {
            Ok(vec![0.0; documents.len()])
        }
    }

    fn doc(url: &str, score: f64) -> Document {
        Document {
            url: url.to_owned(),
            title: "title".to_owned(),
            content: "content".to_owned(),
            raw_content: None,
            query: "q".to_owned(),
            source: DocumentSource::WebSearch,
            score,
            evaluation: None,
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
    async fn curator_filters_below_threshold_and_caps_references() {
        let stage = CuratorStageImpl::new(Arc::new(StubRerank));
        let mut financial = DocumentMap::new();
        financial.insert("https://a.example".to_owned(), doc("https://a.example", 0.9));
        financial.insert("https://b.example".to_owned(), doc("https://b.example", 0.1));

        let categories = vec![
            (Category::Financial, financial),
            (Category::News, DocumentMap::new()),
            (Category::Industry, DocumentMap::new()),
            (Category::Company, DocumentMap::new()),
        ];

        let (_manager, reporter) = reporter();
        let delta = stage.run(&categories, 0.4, 10, &reporter).await.expect("run");

        assert_eq!(delta.references, vec!["https://a.example".to_owned()]);
    }

    #[tokio::test]
    async fn curator_dedupes_across_categories_keeping_highest_score() {
        let stage = CuratorStageImpl::new(Arc::new(StubRerank));
        let mut financial = DocumentMap::new();
        financial.insert("https://shared.example".to_owned(), doc("https://shared.example", 0.5));
        let mut news = DocumentMap::new();
        news.insert("https://shared.example".to_owned(), doc("https://shared.example", 0.9));

        let categories = vec![
            (Category::Financial, financial),
            (Category::News, news),
            (Category::Industry, DocumentMap::new()),
            (Category::Company, DocumentMap::new()),
        ];

        let (_manager, reporter) = reporter();
        let delta = stage.run(&categories, 0.4, 10, &reporter).await.expect("run");

        assert_eq!(delta.references.len(), 1);
    }
}
