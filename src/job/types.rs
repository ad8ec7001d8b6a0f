use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A research request as submitted by a caller.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ResearchRequest {
    pub(crate) company: String,
    #[serde(default)]
    pub(crate) company_url: Option<String>,
    #[serde(default)]
    pub(crate) industry: Option<String>,
    #[serde(default)]
    pub(crate) hq_location: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    #[must_use]
    pub(crate) fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// The final product of a completed job.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct JobResult {
    pub(crate) company: String,
    pub(crate) report: String,
}

/// A point-in-time view of a job, safe to hand to callers.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct JobSnapshot {
    pub(crate) job_id: Uuid,
    pub(crate) status: JobStatus,
    pub(crate) progress: u8,
    pub(crate) message: Option<String>,
    pub(crate) error: Option<String>,
    pub(crate) result: Option<JobResult>,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
}

impl JobSnapshot {
    pub(crate) fn pending(job_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            job_id,
            status: JobStatus::Pending,
            progress: 0,
            message: None,
            error: None,
            result: None,
            created_at: now,
            updated_at: now,
        }
    }
}
