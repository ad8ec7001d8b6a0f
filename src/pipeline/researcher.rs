//! Researcher stages: one specialization per category, sharing a common
//! query-generation → search → assemble procedure.
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Semaphore;
use tracing::warn;

use crate::clients::llm::{collect, LlmClient};
use crate::clients::search::SearchClient;
use crate::job::events::Event;
use crate::job::manager::JobReporter;
use crate::util::url::canonicalize;

use super::state::{Category, Document, DocumentMap, DocumentSource};

const MAX_QUERIES: usize = 4;
const SEARCH_BATCH_SIZE: usize = 4;
const MAX_SEARCH_RESULTS: usize = 15;
const MIN_QUERY_WORDS: usize = 3;

pub(crate) struct ResearcherDelta {
    pub(crate) category: Category,
    pub(crate) documents: DocumentMap,
    pub(crate) message: String,
}

#[async_trait]
pub(crate) trait ResearcherStage: Send + Sync {
    async fn run(
        &self,
        category: Category,
        company: &str,
        industry: Option<&str>,
        site_scrape: Option<&super::state::SiteScrape>,
        reporter: &JobReporter,
    ) -> Result<ResearcherDelta>;
}

pub(crate) struct ResearcherStageImpl {
    llm: Arc<dyn LlmClient>,
    search: Arc<dyn SearchClient>,
}

impl ResearcherStageImpl {
    #[must_use]
    pub(crate) fn new(llm: Arc<dyn LlmClient>, search: Arc<dyn SearchClient>) -> Self {
        Self { llm, search }
    }
}

fn category_instruction(category: Category, company: &str, industry: Option<&str>) -> String {
    let industry_clause = industry.map_or(String::new(), |industry| format!(" in the {industry} industry"));
    match category {
        Category::Financial => format!(
            "Generate search queries to find recent financial performance, revenue, and funding information for {company}{industry_clause}."
        ),
        Category::News => format!(
            "Generate search queries to find recent news and press coverage about {company}{industry_clause}."
        ),
        Category::Industry => format!(
            "Generate search queries to find industry context and competitive positioning for {company}{industry_clause}."
        ),
        Category::Company => format!(
            "Generate search queries to find company overview, leadership, and product information for {company}{industry_clause}."
        ),
    }
}

fn default_homepage_query(category: Category, company: &str) -> String {
    match category {
        Category::Financial => format!("{company} financial overview"),
        Category::News => format!("{company} company news"),
        Category::Industry => format!("{company} industry position"),
        Category::Company => format!("{company} company overview"),
    }
}

/// Parse completed query lines from a streamed model response. Emits
/// `query_generating` for the running partial and `query_generated` for
/// each completed, qualifying line; caps at `MAX_QUERIES` and discards any
/// trailing partial that never saw a newline.
async fn generate_queries(
    llm: &Arc<dyn LlmClient>,
    category: Category,
    company: &str,
    industry: Option<&str>,
    reporter: &JobReporter,
) -> Vec<String> {
    let instruction = category_instruction(category, company, industry);
    let system = "You generate concise web search queries, one per line.";

    let stream = match llm.stream_completion(system, &instruction).await {
        Ok(stream) => stream,
        Err(err) => {
            warn!(category = category.label(), error = %err, "query generation failed");
            reporter.emit(Event::error(category.analyst_tag(), &err.to_string()));
            return Vec::new();
        }
    };

    let full_text = match collect(stream).await {
        Ok(text) => text,
        Err(err) => {
            warn!(category = category.label(), error = %err, "query generation stream failed");
            reporter.emit(Event::error(category.analyst_tag(), &err.to_string()));
            return Vec::new();
        }
    };

    let mut queries = Vec::new();
    let mut partial = String::new();
    for ch in full_text.chars() {
        if ch == '\n' {
            let line = partial.trim().to_owned();
            partial.clear();
            if line.split_whitespace().count() >= MIN_QUERY_WORDS {
                reporter.emit(Event::query_generated(category.label(), &line));
                queries.push(line);
                if queries.len() >= MAX_QUERIES {
                    break;
                }
            }
        } else {
            partial.push(ch);
            reporter.emit(Event::query_generating(category.label(), &partial));
        }
    }

    queries
}

async fn run_searches(
    search: &Arc<dyn SearchClient>,
    category: Category,
    queries: &[String],
    reporter: &JobReporter,
) -> DocumentMap {
    let mut documents = DocumentMap::new();
    let semaphore = Arc::new(Semaphore::new(SEARCH_BATCH_SIZE));
    let job_id = reporter.job_id();

    for batch in queries.chunks(SEARCH_BATCH_SIZE) {
        if reporter.cancellation().is_cancelled() {
            break;
        }

        let mut handles = Vec::new();
        for query in batch {
            let search = Arc::clone(search);
            let query = query.clone();
            let permit = Arc::clone(&semaphore);
            reporter.emit(Event::query_searching(category.label(), &query));
            handles.push(tokio::spawn(async move {
                let _permit = permit.acquire_owned().await;
                let result = search.search(job_id, &query, MAX_SEARCH_RESULTS).await;
                (query, result)
            }));
        }

        for handle in handles {
            let (query, result) = match handle.await {
                Ok(pair) => pair,
                Err(_) => continue,
            };

            match result {
                Ok(results) => {
                    reporter.emit(Event::query_searched(category.label(), &query, results.len()));
                    for result in results {
                        if result.content.trim().is_empty() || result.url.trim().is_empty() {
                            continue;
                        }
                        let canonical = canonicalize(&result.url);
                        documents.entry(canonical.clone()).or_insert_with(|| {
                            reporter.emit(Event::document_kept(category.label(), &canonical, result.score));
                            Document {
                                url: canonical,
                                title: result.title,
                                content: result.content,
                                raw_content: None,
                                query: query.clone(),
                                source: DocumentSource::WebSearch,
                                score: result.score,
                                evaluation: None,
                            }
                        });
                    }
                }
                Err(err) => {
                    warn!(category = category.label(), query, error = %err, "search failed for query");
                }
            }
        }
    }

    documents
}

#[async_trait]
impl ResearcherStage for ResearcherStageImpl {
    async fn run(
        &self,
        category: Category,
        company: &str,
        industry: Option<&str>,
        site_scrape: Option<&super::state::SiteScrape>,
        reporter: &JobReporter,
    ) -> Result<ResearcherDelta> {
        reporter.emit(Event::category_start(category.label()));
        reporter.cancellation().check()?;

        let queries = generate_queries(&self.llm, category, company, industry, reporter).await;
        let mut documents = run_searches(&self.search, category, &queries, reporter).await;

        if let Some(scrape) = site_scrape {
            let canonical_company_url = canonicalize(&scrape.url);
            documents.entry(canonical_company_url.clone()).or_insert_with(|| Document {
                url: canonical_company_url,
                title: scrape.title.clone(),
                content: scrape.raw_content.clone(),
                raw_content: Some(scrape.raw_content.clone()),
                query: default_homepage_query(category, company),
                source: DocumentSource::CompanyWebsite,
                score: 1.0,
                evaluation: None,
            });
        }

        let message = format!(
            "{} found {} documents for {}",
            category.heading(),
            documents.len(),
            company
        );
        reporter.emit(Event::category_complete(category.label(), documents.len()));

        Ok(ResearcherDelta {
            category,
            documents,
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
    use crate::clients::search::SearchResult;
    use crate::job::manager::JobManager;
    use futures::stream;
    use std::sync::Mutex;

    struct StubLlm {
        text: &'static str,
    }

    #[async_trait]
    impl LlmClient for StubLlm {
        async fn stream_completion(
            &self,
            _system: &str,
            _prompt: &str,
        ) -> Result<crate::clients::llm::CompletionStream> {
            let chunks: Vec<Result<String>> = self.text.chars().map(|c| Ok(c.to_string())).collect();
            Ok(Box::pin(stream::iter(chunks)))
        }
    }

    struct StubSearch {
        results: Mutex<Vec<SearchResult>>,
    }

    #[async_trait]
    impl SearchClient for StubSearch {
        async fn search(&self, _job_id: uuid::Uuid, _query: &str, _max_results: usize) -> Result<Vec<SearchResult>> {
            Ok(self.results.lock().unwrap().clone())
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
    async fn researcher_caps_queries_at_four_and_assembles_documents() {
        let stage = ResearcherStageImpl::new(
            Arc::new(StubLlm {
                text: "acme quarterly revenue report\nacme fundraising news update\nacme series b round\nacme ipo filing details\nacme extra unused query\n",
            }),
            Arc::new(StubSearch {
                results: Mutex::new(vec![SearchResult {
                    title: "Acme raises funding".to_owned(),
                    url: "https://news.example/acme?utm=1".to_owned(),
                    content: "Acme raised a new round".to_owned(),
                    score: 0.8,
                }]),
            }),
        );

        let (_manager, reporter) = reporter();
        let delta = stage
            .run(Category::Financial, "Acme", None, None, &reporter)
            .await
            .expect("run");

        assert!(delta.documents.contains_key("https://news.example/acme"));
    }

    #[tokio::test]
    async fn researcher_seeds_homepage_document_when_site_scrape_present() {
        let stage = ResearcherStageImpl::new(
            Arc::new(StubLlm { text: "" }),
            Arc::new(StubSearch {
                results: Mutex::new(Vec::new()),
            }),
        );

        let scrape = super::super::state::SiteScrape {
            url: "https://acme.example".to_owned(),
            title: "Acme".to_owned(),
            raw_content: "Acme homepage text".to_owned(),
        };

        let (_manager, reporter) = reporter();
        let delta = stage
            .run(Category::Company, "Acme", None, Some(&scrape), &reporter)
            .await
            .expect("run");

        assert_eq!(delta.documents.len(), 1);
        let doc = delta.documents.values().next().unwrap();
        assert_eq!(doc.source, DocumentSource::CompanyWebsite);
    }
}
