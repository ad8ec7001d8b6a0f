use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use sqlx::postgres::PgPoolOptions;
use tokio::task::JoinHandle;

use crate::{
    api,
    clients::extract::{ExtractClient, HttpExtractClient},
    clients::llm::{HttpLlmClient, LlmClient},
    clients::rerank::{HttpRerankClient, IdentityRerank, RerankClient},
    clients::search::{HttpSearchClient, SearchClient},
    config::Config,
    job::JobManager,
    observability::Telemetry,
    pipeline::briefing::BriefingStageImpl,
    pipeline::collector::CollectorStageImpl,
    pipeline::curator::CuratorStageImpl,
    pipeline::editor::EditorStageImpl,
    pipeline::enricher::EnricherStageImpl,
    pipeline::grounding::GroundingStageImpl,
    pipeline::orchestrator::{PipelineBuilder, PipelineOrchestrator},
    pipeline::output::OutputStageImpl,
    pipeline::researcher::ResearcherStageImpl,
    store::report_store::{NoopReportStore, PostgresReportStore, ReportStore},
    util::retry::RetryConfig,
};

#[derive(Clone)]
pub(crate) struct AppState {
    registry: Arc<ComponentRegistry>,
}

pub struct ComponentRegistry {
    config: Arc<Config>,
    telemetry: Telemetry,
    job_manager: Arc<JobManager>,
    orchestrator: Arc<PipelineOrchestrator>,
    report_store: Arc<dyn ReportStore>,
    pdf_client: reqwest::Client,
    _retention_sweep: JoinHandle<()>,
}

impl AppState {
    pub(crate) fn new(registry: ComponentRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub(crate) fn telemetry(&self) -> &Telemetry {
        &self.registry.telemetry
    }

    pub(crate) fn config(&self) -> &Config {
        &self.registry.config
    }

    pub(crate) fn job_manager(&self) -> Arc<JobManager> {
        Arc::clone(&self.registry.job_manager)
    }

    pub(crate) fn orchestrator(&self) -> Arc<PipelineOrchestrator> {
        Arc::clone(&self.registry.orchestrator)
    }

    pub(crate) fn report_store(&self) -> Arc<dyn ReportStore> {
        Arc::clone(&self.registry.report_store)
    }

    pub(crate) fn pdf_client(&self) -> &reqwest::Client {
        &self.registry.pdf_client
    }
}

impl ComponentRegistry {
    /// Builds every collaborator client, the in-memory job registry, and the
    /// pipeline orchestrator, then wires them into one shared registry.
    ///
    /// # Errors
    /// Returns an error if telemetry initialization or pipeline assembly fails.
    pub async fn build(config: Config) -> Result<Self> {
        let config = Arc::new(config);
        let telemetry = Telemetry::new()?;

        let retry = RetryConfig::new(
            config.http_max_retries(),
            config.http_backoff_base_ms(),
            config.http_backoff_cap_ms(),
        );

        let search = Arc::new(HttpSearchClient::new(
            config.search_base_url().to_owned(),
            config.search_api_key().to_owned(),
            config.search_timeout(),
            retry,
        ));
        let extract = Arc::new(HttpExtractClient::new(
            config.extract_base_url().to_owned(),
            config.extract_api_key().to_owned(),
            config.extract_timeout(),
            retry,
        ));
        let rerank: Arc<dyn RerankClient> = match config.rerank_api_key() {
            Some(api_key) => Arc::new(HttpRerankClient::new(
                config.rerank_base_url().to_owned(),
                api_key.to_owned(),
                config.rerank_timeout(),
                retry,
            )),
            None => Arc::new(IdentityRerank),
        };
        let llm = Arc::new(HttpLlmClient::new(
            config.llm_base_url().to_owned(),
            config.llm_api_key().to_owned(),
            config.llm_model().to_owned(),
            config.llm_timeout(),
            retry,
        ));

        let report_store: Arc<dyn ReportStore> = match config.persistence_dsn() {
            Some(dsn) => {
                let pool = PgPoolOptions::new()
                    .max_connections(config.persistence_max_connections())
                    .min_connections(config.persistence_min_connections())
                    .acquire_timeout(config.persistence_acquire_timeout())
                    .idle_timeout(Some(config.persistence_idle_timeout()))
                    .max_lifetime(Some(config.persistence_max_lifetime()))
                    .test_before_acquire(true)
                    .connect_lazy(dsn)
                    .context("failed to configure persistence connection pool")?;
                Arc::new(PostgresReportStore::new(pool))
            }
            None => Arc::new(NoopReportStore),
        };

        let job_manager = Arc::new(JobManager::new(
            config.max_concurrent_jobs().get(),
            config.event_bus_buffer_size(),
            config.job_retention().as_secs(),
            telemetry.metrics_handle(),
            Arc::clone(&report_store),
        ));

        let extract_dyn = Arc::clone(&extract) as Arc<dyn ExtractClient>;
        let llm_dyn = Arc::clone(&llm) as Arc<dyn LlmClient>;
        let search_dyn = Arc::clone(&search) as Arc<dyn SearchClient>;

        let stages = PipelineBuilder::new()
            .grounding(Arc::new(GroundingStageImpl::new(Arc::clone(&extract_dyn))))
            .researcher(Arc::new(ResearcherStageImpl::new(
                Arc::clone(&llm_dyn),
                search_dyn,
            )))
            .collector(Arc::new(CollectorStageImpl))
            .curator(Arc::new(CuratorStageImpl::new(Arc::clone(&rerank))))
            .enricher(Arc::new(EnricherStageImpl::new(extract_dyn)))
            .briefing(Arc::new(BriefingStageImpl::new(Arc::clone(&llm_dyn))))
            .editor(Arc::new(EditorStageImpl::new(llm_dyn)))
            .output(Arc::new(OutputStageImpl::new(Arc::clone(&report_store))))
            .build()?;

        let orchestrator = Arc::new(PipelineOrchestrator::new(
            stages,
            config.curation_score_threshold(),
            config.curation_max_references(),
            telemetry.metrics_handle(),
        ));

        let retention_sweep = crate::job::gc::spawn_retention_sweep(Arc::clone(&job_manager));

        let pdf_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("failed to build pdf render http client")?;

        Ok(Self {
            config,
            telemetry,
            job_manager,
            orchestrator,
            report_store,
            pdf_client,
            _retention_sweep: retention_sweep,
        })
    }

    #[must_use]
    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }
}

pub fn build_router(registry: ComponentRegistry) -> Router {
    let state = AppState::new(registry);
    api::router(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ENV_MUTEX;

    #[tokio::test]
    async fn component_registry_builds() {
        let config = {
            let _lock = ENV_MUTEX.lock().expect("env mutex");
            // SAFETY: environment modifications are serialized by ENV_MUTEX held via _lock.
            unsafe {
                std::env::set_var("SEARCH_API_KEY", "search-key");
                std::env::set_var("LLM_API_KEY", "llm-key");
                std::env::set_var("LLM_BASE_URL", "http://localhost:8099/v1");
            }

            Config::from_env().expect("config loads")
        };
        let registry = ComponentRegistry::build(config)
            .await
            .expect("registry builds");
        let state = AppState::new(registry);

        state.telemetry().record_ready_probe();
        assert_eq!(state.job_manager().active_job_count(), 0);
    }
}
