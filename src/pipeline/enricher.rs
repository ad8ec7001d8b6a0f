//! Enricher stage: fetches full text for curated documents missing it.
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::Semaphore;

use crate::clients::extract::ExtractClient;
use crate::job::events::Event;
use crate::job::manager::JobReporter;

use super::state::{Category, DocumentMap};

const BATCH_SIZE: usize = 20;
const MAX_PER_CATEGORY: usize = 20;

#[async_trait]
pub(crate) trait EnricherStage: Send + Sync {
    async fn run(
        &self,
        categories: [(Category, DocumentMap); 4],
        reporter: &JobReporter,
    ) -> Result<[(Category, DocumentMap); 4]>;
}

pub(crate) struct EnricherStageImpl {
    extract: Arc<dyn ExtractClient>,
}

impl EnricherStageImpl {
    #[must_use]
    pub(crate) fn new(extract: Arc<dyn ExtractClient>) -> Self {
        Self { extract }
    }
}

async fn enrich_category(
    extract: &Arc<dyn ExtractClient>,
    category: Category,
    mut documents: DocumentMap,
    job_id: uuid::Uuid,
    reporter: &JobReporter,
) -> DocumentMap {
    let missing: Vec<String> = documents
        .iter()
        .filter(|(_, doc)| doc.raw_content.is_none())
        .take(MAX_PER_CATEGORY)
        .map(|(url, _)| url.clone())
        .collect();

    let semaphore = Arc::new(Semaphore::new(BATCH_SIZE));
    let mut handles = Vec::new();

    for url in missing {
        let extract = Arc::clone(extract);
        let permit = Arc::clone(&semaphore);
        handles.push(tokio::spawn(async move {
            let _permit = permit.acquire_owned().await;
            let result = extract.extract(job_id, &url).await;
            (url, result)
        }));
    }

    for handle in handles {
        let Ok((url, result)) = handle.await else {
            continue;
        };
        match result {
            Ok(Some(raw_content)) => {
                if let Some(doc) = documents.get_mut(&url) {
                    doc.raw_content = Some(raw_content);
                }
            }
            Ok(None) | Err(_) => {}
        }
    }

    reporter.emit(Event::category_complete(category.label(), documents.len()));
    documents
}

#[async_trait]
impl EnricherStage for EnricherStageImpl {
    async fn run(
        &self,
        categories: [(Category, DocumentMap); 4],
        reporter: &JobReporter,
    ) -> Result<[(Category, DocumentMap); 4]> {
        reporter.cancellation().check()?;

        let job_id = reporter.job_id();
        let futures = categories.into_iter().map(|(category, documents)| {
            let extract = Arc::clone(&self.extract);
            async move {
                let enriched = enrich_category(&extract, category, documents, job_id, reporter).await;
                (category, enriched)
            }
        });
        let results = join_all(futures).await;

        let mut iter = results.into_iter();
        Ok([
            iter.next().expect("four categories"),
            iter.next().expect("four categories"),
            iter.next().expect("four categories"),
            iter.next().expect("four categories"),
        ])
    }
}
