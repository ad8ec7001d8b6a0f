//! Optional write-through persistence for jobs and reports.
//!
//! The core pipeline never reads from this collaborator — status and
//! report reads are always served from the in-memory job registry. When no
//! persistence URI is configured, [`NoopReportStore`] is used and every
//! write is a no-op, in the style of the teacher's DAO-trait-plus-impl
//! split where a null object stands in for an absent backing store.
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::job::types::{JobStatus, ResearchRequest};

#[async_trait]
pub(crate) trait ReportStore: Send + Sync {
    async fn save_job(
        &self,
        job_id: Uuid,
        request: &ResearchRequest,
        status: JobStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<()>;

    async fn save_report(&self, job_id: Uuid, report: &str) -> Result<()>;
}

/// `sqlx::PgPool`-backed write-through store.
pub(crate) struct PostgresReportStore {
    pool: PgPool,
}

impl PostgresReportStore {
    #[must_use]
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReportStore for PostgresReportStore {
    async fn save_job(
        &self,
        job_id: Uuid,
        request: &ResearchRequest,
        status: JobStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO jobs (job_id, company, company_url, industry, hq_location, status, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (job_id) DO UPDATE SET status = $6, updated_at = $7
            ",
        )
        .bind(job_id)
        .bind(&request.company)
        .bind(&request.company_url)
        .bind(&request.industry)
        .bind(&request.hq_location)
        .bind(status_label(status))
        .bind(updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save_report(&self, job_id: Uuid, report: &str) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO reports (job_id, report)
            VALUES ($1, $2)
            ON CONFLICT (job_id) DO UPDATE SET report = $2
            ",
        )
        .bind(job_id)
        .bind(report)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn status_label(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Pending => "pending",
        JobStatus::Processing => "processing",
        JobStatus::Completed => "completed",
        JobStatus::Failed => "failed",
    }
}

/// No-op store used when no persistence URI is configured.
pub(crate) struct NoopReportStore;

#[async_trait]
impl ReportStore for NoopReportStore {
    async fn save_job(
        &self,
        _job_id: Uuid,
        _request: &ResearchRequest,
        _status: JobStatus,
        _updated_at: DateTime<Utc>,
    ) -> Result<()> {
        Ok(())
    }

    async fn save_report(&self, _job_id: Uuid, _report: &str) -> Result<()> {
        Ok(())
    }
}
