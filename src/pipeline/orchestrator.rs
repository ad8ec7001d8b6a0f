//! Pipeline engine: owns the fixed research DAG and drives one job from
//! grounding through to the final report.
use std::sync::Arc;

use anyhow::Result;
use futures::future::join_all;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use tracing::{error, info};

use crate::job::events::Event;
use crate::job::manager::JobReporter;
use crate::job::types::JobStatus;
use crate::observability::metrics::Metrics;

use super::briefing::BriefingStage;
use super::collector::CollectorStage;
use super::curator::CuratorStage;
use super::editor::EditorStage;
use super::enricher::EnricherStage;
use super::grounding::GroundingStage;
use super::output::OutputStage;
use super::researcher::ResearcherStage;
use super::state::{Category, ResearchState};

/// Trait objects for every named stage in the DAG, held behind `Arc` so a
/// single orchestrator instance can drive many concurrent jobs.
pub(crate) struct PipelineStages {
    pub(crate) grounding: Arc<dyn GroundingStage>,
    pub(crate) researcher: Arc<dyn ResearcherStage>,
    pub(crate) collector: Arc<dyn CollectorStage>,
    pub(crate) curator: Arc<dyn CuratorStage>,
    pub(crate) enricher: Arc<dyn EnricherStage>,
    pub(crate) briefing: Arc<dyn BriefingStage>,
    pub(crate) editor: Arc<dyn EditorStage>,
    pub(crate) output: Arc<dyn OutputStage>,
}

#[derive(Default)]
pub(crate) struct PipelineBuilder {
    grounding: Option<Arc<dyn GroundingStage>>,
    researcher: Option<Arc<dyn ResearcherStage>>,
    collector: Option<Arc<dyn CollectorStage>>,
    curator: Option<Arc<dyn CuratorStage>>,
    enricher: Option<Arc<dyn EnricherStage>>,
    briefing: Option<Arc<dyn BriefingStage>>,
    editor: Option<Arc<dyn EditorStage>>,
    output: Option<Arc<dyn OutputStage>>,
}

impl PipelineBuilder {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub(crate) fn grounding(mut self, stage: Arc<dyn GroundingStage>) -> Self {
        self.grounding = Some(stage);
        self
    }

    #[must_use]
    pub(crate) fn researcher(mut self, stage: Arc<dyn ResearcherStage>) -> Self {
        self.researcher = Some(stage);
        self
    }

    #[must_use]
    pub(crate) fn collector(mut self, stage: Arc<dyn CollectorStage>) -> Self {
        self.collector = Some(stage);
        self
    }

    #[must_use]
    pub(crate) fn curator(mut self, stage: Arc<dyn CuratorStage>) -> Self {
        self.curator = Some(stage);
        self
    }

    #[must_use]
    pub(crate) fn enricher(mut self, stage: Arc<dyn EnricherStage>) -> Self {
        self.enricher = Some(stage);
        self
    }

    #[must_use]
    pub(crate) fn briefing(mut self, stage: Arc<dyn BriefingStage>) -> Self {
        self.briefing = Some(stage);
        self
    }

    #[must_use]
    pub(crate) fn editor(mut self, stage: Arc<dyn EditorStage>) -> Self {
        self.editor = Some(stage);
        self
    }

    #[must_use]
    pub(crate) fn output(mut self, stage: Arc<dyn OutputStage>) -> Self {
        self.output = Some(stage);
        self
    }

    pub(crate) fn build(self) -> Result<PipelineStages> {
        Ok(PipelineStages {
            grounding: self.grounding.ok_or_else(|| anyhow::anyhow!("missing grounding stage"))?,
            researcher: self.researcher.ok_or_else(|| anyhow::anyhow!("missing researcher stage"))?,
            collector: self.collector.ok_or_else(|| anyhow::anyhow!("missing collector stage"))?,
            curator: self.curator.ok_or_else(|| anyhow::anyhow!("missing curator stage"))?,
            enricher: self.enricher.ok_or_else(|| anyhow::anyhow!("missing enricher stage"))?,
            briefing: self.briefing.ok_or_else(|| anyhow::anyhow!("missing briefing stage"))?,
            editor: self.editor.ok_or_else(|| anyhow::anyhow!("missing editor stage"))?,
            output: self.output.ok_or_else(|| anyhow::anyhow!("missing output stage"))?,
        })
    }
}

pub(crate) struct PipelineOrchestrator {
    stages: PipelineStages,
    curation_score_threshold: f64,
    curation_max_references: usize,
    metrics: Arc<Metrics>,
}

impl PipelineOrchestrator {
    #[must_use]
    pub(crate) fn new(
        stages: PipelineStages,
        curation_score_threshold: f64,
        curation_max_references: usize,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            stages,
            curation_score_threshold,
            curation_max_references,
            metrics,
        }
    }

    fn time_stage(&self, label: &str, started: std::time::Instant) {
        self.metrics
            .stage_duration
            .with_label_values(&[label])
            .observe(started.elapsed().as_secs_f64());
    }

    #[must_use]
    pub(crate) fn stages(&self) -> &PipelineStages {
        &self.stages
    }

    /// Drive one job end to end. Intended to be spawned as its own task;
    /// failures are reported onto the job rather than propagated to the
    /// caller, since there is no caller left listening by the time a
    /// background stage fails.
    pub(crate) async fn run(&self, state: ResearchState, reporter: JobReporter) {
        if let Err(err) = self.run_inner(state, &reporter).await {
            let kind = crate::util::error::classify_error(&err);
            error!(job_id = %reporter.job_id(), kind = kind.as_str(), error = %err, "pipeline failed");
            reporter.emit(Event::error(kind.as_str(), &err.to_string()));
            reporter.fail(&format!("{}: {}", kind.as_str(), err));
        }
    }

    async fn run_inner(&self, mut state: ResearchState, reporter: &JobReporter) -> Result<()> {
        reporter.cancellation().check()?;
        let started = std::time::Instant::now();
        let grounding_delta = self.stages.grounding.run(&state, reporter).await?;
        self.time_stage("grounding", started);
        state.site_scrape = grounding_delta.site_scrape;
        state.messages.push(grounding_delta.message);

        reporter.set_progress(10, Some("Researching"));
        reporter.cancellation().check()?;

        let site_scrape = state.site_scrape.clone();
        let mut researcher_futures: FuturesUnordered<_> = Category::ALL
            .into_iter()
            .map(|category| {
                let reporter = reporter.clone();
                let company = state.company.clone();
                let industry = state.industry.clone();
                let site_scrape = site_scrape.clone();
                let stage = Arc::clone(&self.stages.researcher);
                async move {
                    stage
                        .run(category, &company, industry.as_deref(), site_scrape.as_ref(), &reporter)
                        .await
                }
            })
            .collect();

        let started = std::time::Instant::now();
        let mut progress = 10u8;
        let mut researcher_deltas = Vec::with_capacity(4);
        while let Some(result) = researcher_futures.next().await {
            let delta = result?;
            progress = (progress + 10).min(60);
            reporter.set_progress(progress, Some(&delta.message));
            researcher_deltas.push(delta);
        }
        self.time_stage("researcher", started);

        reporter.cancellation().check()?;
        let started = std::time::Instant::now();
        let collector_delta = self.stages.collector.run(researcher_deltas, reporter).await?;
        self.time_stage("collector", started);
        for delta in collector_delta.deltas {
            *state.category_data_mut(delta.category) = delta.documents;
        }
        state.messages.push(collector_delta.message);

        reporter.set_progress(70, Some("Curating references"));
        reporter.cancellation().check()?;

        let categories: Vec<(Category, super::state::DocumentMap)> = Category::ALL
            .into_iter()
            .map(|category| (category, state.category_data(category).clone()))
            .collect();
        let started = std::time::Instant::now();
        let curator_delta = self
            .stages
            .curator
            .run(&categories, self.curation_score_threshold, self.curation_max_references, reporter)
            .await?;
        self.time_stage("curator", started);
        for (category, documents) in curator_delta.curated {
            *state.curated_data_mut(category) = documents;
        }
        state.references = curator_delta.references;
        state.messages.push(curator_delta.message);

        reporter.set_progress(80, Some("Enriching documents"));
        reporter.cancellation().check()?;

        let curated_categories: [(Category, super::state::DocumentMap); 4] = [
            (Category::Financial, state.curated_financial_data.clone()),
            (Category::News, state.curated_news_data.clone()),
            (Category::Industry, state.curated_industry_data.clone()),
            (Category::Company, state.curated_company_data.clone()),
        ];
        let started = std::time::Instant::now();
        let enriched = self.stages.enricher.run(curated_categories, reporter).await?;
        self.time_stage("enricher", started);
        for (category, documents) in enriched {
            *state.curated_data_mut(category) = documents;
        }

        reporter.set_progress(90, Some("Writing briefings"));
        reporter.cancellation().check()?;

        let briefing_futures = Category::ALL.into_iter().map(|category| {
            let reporter = reporter.clone();
            let company = state.company.clone();
            let industry = state.industry.clone();
            let documents = state.curated_data(category).clone();
            let stage = Arc::clone(&self.stages.briefing);
            async move { stage.run(category, &company, industry.as_deref(), &documents, &reporter).await }
        });

        let started = std::time::Instant::now();
        let briefing_texts: Vec<String> = join_all(briefing_futures).await.into_iter().collect::<Result<_>>()?;
        self.time_stage("briefing", started);
        for (category, text) in Category::ALL.into_iter().zip(briefing_texts.iter()) {
            *state.briefing_mut(category) = text.clone();
        }

        reporter.set_progress(95, Some("Composing final report"));
        reporter.cancellation().check()?;

        let briefings: Vec<(Category, String)> = Category::ALL
            .into_iter()
            .map(|category| (category, state.briefing(category).to_owned()))
            .collect();
        let started = std::time::Instant::now();
        let report = self
            .stages
            .editor
            .run(&state.company, &briefings, &state.references, reporter)
            .await?;
        self.time_stage("editor", started);
        state.report = report.clone();

        info!(job_id = %reporter.job_id(), "pipeline report composed");
        let started = std::time::Instant::now();
        self.stages.output.run(&state.company, &report, reporter).await?;
        self.time_stage("output", started);

        Ok(())
    }
}
