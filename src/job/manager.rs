//! In-memory job registry: submission, status, cancellation and the
//! reporter handle pipeline stages use to publish progress.
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tracing::warn;
use uuid::Uuid;

use crate::observability::metrics::Metrics;
use crate::store::report_store::ReportStore;
use crate::util::error::Cancelled;

use super::bus::{EventBus, EventSubscription};
use super::events::Event;
use super::types::{JobResult, JobSnapshot, JobStatus, ResearchRequest};

/// Error returned when a job cannot be accepted.
#[derive(Debug, thiserror::Error)]
pub(crate) enum SubmitError {
    #[error("at capacity: {0} jobs already running")]
    AtCapacity(usize),
}

/// Error returned when a job id is not known to the registry.
#[derive(Debug, thiserror::Error)]
#[error("job not found")]
pub(crate) struct JobNotFound;

struct JobEntry {
    snapshot: JobSnapshot,
    request: ResearchRequest,
    cancel_tx: watch::Sender<bool>,
}

/// Propagates cancellation into a running pipeline. Cheap to clone; every
/// stage holds one and checks it between units of work.
#[derive(Clone)]
pub(crate) struct CancellationSignal {
    rx: watch::Receiver<bool>,
}

impl CancellationSignal {
    #[must_use]
    pub(crate) fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Returns `Err` wrapping a [`Cancelled`] marker if cancellation has
    /// already been requested, so callers can bail with `?`.
    pub(crate) fn check(&self) -> anyhow::Result<()> {
        if self.is_cancelled() {
            return Err(Cancelled.into());
        }
        Ok(())
    }
}

/// Handle pipeline stages use to publish progress for one job.
///
/// Holds the job's capacity permit for its whole lifetime: the slot frees
/// only once every clone of this reporter (and the pipeline task driving it)
/// has been dropped.
#[derive(Clone)]
pub(crate) struct JobReporter {
    job_id: Uuid,
    manager: Arc<JobManagerInner>,
    cancellation: CancellationSignal,
    _permit: Arc<OwnedSemaphorePermit>,
}

impl JobReporter {
    #[must_use]
    pub(crate) fn job_id(&self) -> Uuid {
        self.job_id
    }

    #[must_use]
    pub(crate) fn cancellation(&self) -> CancellationSignal {
        self.cancellation.clone()
    }

    pub(crate) fn emit(&self, event: Event) {
        self.manager.bus.publish(self.job_id, event);
    }

    pub(crate) fn set_progress(&self, progress: u8, message: Option<&str>) {
        self.manager
            .update(self.job_id, JobStatus::Processing, progress, message, None, None);
    }

    pub(crate) fn complete(&self, result: JobResult) {
        self.manager
            .update(self.job_id, JobStatus::Completed, 100, None, None, Some(result));
    }

    pub(crate) fn fail(&self, message: &str) {
        self.manager.fail(self.job_id, message);
    }
}

struct JobManagerInner {
    jobs: Mutex<HashMap<Uuid, JobEntry>>,
    bus: EventBus,
    semaphore: Arc<Semaphore>,
    retention_secs: i64,
    report_store: Arc<dyn ReportStore>,
}

impl JobManagerInner {
    fn update(
        &self,
        job_id: Uuid,
        status: JobStatus,
        progress: u8,
        message: Option<&str>,
        error: Option<&str>,
        result: Option<JobResult>,
    ) {
        let now = Utc::now();
        let request = {
            let mut jobs = self.jobs.lock().expect("jobs lock");
            jobs.get_mut(&job_id).map(|entry| {
                entry.snapshot.status = status;
                entry.snapshot.progress = progress;
                entry.snapshot.message = message.map(str::to_owned);
                entry.snapshot.error = error.map(str::to_owned);
                entry.snapshot.result = result.clone();
                entry.snapshot.updated_at = now;
                entry.request.clone()
            })
        };
        self.bus.publish(
            job_id,
            Event::status_update(status, progress, message, error, result.as_ref()),
        );
        self.write_through(job_id, request, status, now);
    }

    fn fail(&self, job_id: Uuid, message: &str) {
        self.update(job_id, JobStatus::Failed, 100, None, Some(message), None);
        self.bus.publish(job_id, Event::error("internal", message));
    }

    /// Persists the job's status write-through, best-effort and off the hot
    /// path: the in-memory registry is always the source of truth for reads.
    fn write_through(&self, job_id: Uuid, request: Option<ResearchRequest>, status: JobStatus, updated_at: chrono::DateTime<Utc>) {
        let Some(request) = request else { return };
        let store = Arc::clone(&self.report_store);
        tokio::spawn(async move {
            if let Err(error) = store.save_job(job_id, &request, status, updated_at).await {
                warn!(%job_id, %error, "failed to persist job status");
            }
        });
    }
}

/// Owns every in-flight and recently-finished job.
pub(crate) struct JobManager {
    inner: Arc<JobManagerInner>,
}

impl JobManager {
    #[must_use]
    pub(crate) fn new(
        max_concurrent_jobs: usize,
        event_bus_buffer_size: usize,
        retention_secs: u64,
        metrics: Arc<Metrics>,
        report_store: Arc<dyn ReportStore>,
    ) -> Self {
        Self {
            inner: Arc::new(JobManagerInner {
                jobs: Mutex::new(HashMap::new()),
                bus: EventBus::new(event_bus_buffer_size, metrics),
                semaphore: Arc::new(Semaphore::new(max_concurrent_jobs)),
                retention_secs: retention_secs as i64,
                report_store,
            }),
        }
    }

    /// Reserve a capacity slot and register a new pending job. The returned
    /// [`JobReporter`] carries the permit for the lifetime of the pipeline
    /// run — dropping it (end of the spawned task) frees the slot.
    pub(crate) fn submit(&self, request: &ResearchRequest) -> Result<(Uuid, JobReporter), SubmitError> {
        let permit = Arc::clone(&self.inner.semaphore)
            .try_acquire_owned()
            .map_err(|_| SubmitError::AtCapacity(self.inner.semaphore.available_permits()))?;

        let job_id = Uuid::new_v4();
        let now = Utc::now();
        let (cancel_tx, cancel_rx) = watch::channel(false);

        self.inner.jobs.lock().expect("jobs lock").insert(
            job_id,
            JobEntry {
                snapshot: JobSnapshot::pending(job_id, now),
                request: request.clone(),
                cancel_tx,
            },
        );
        self.inner.write_through(job_id, Some(request.clone()), JobStatus::Pending, now);

        let reporter = JobReporter {
            job_id,
            manager: Arc::clone(&self.inner),
            cancellation: CancellationSignal { rx: cancel_rx },
            _permit: Arc::new(permit),
        };

        Ok((job_id, reporter))
    }

    #[must_use]
    pub(crate) fn status(&self, job_id: Uuid) -> Option<JobSnapshot> {
        self.inner
            .jobs
            .lock()
            .expect("jobs lock")
            .get(&job_id)
            .map(|entry| entry.snapshot.clone())
    }

    #[must_use]
    pub(crate) fn subscribe(&self, job_id: Uuid) -> Option<EventSubscription> {
        if !self.inner.jobs.lock().expect("jobs lock").contains_key(&job_id) {
            return None;
        }
        Some(self.inner.bus.subscribe(job_id))
    }

    /// Request cancellation of a running job. Idempotent; returns
    /// [`JobNotFound`] only if the id was never issued.
    pub(crate) fn cancel(&self, job_id: Uuid) -> Result<(), JobNotFound> {
        let jobs = self.inner.jobs.lock().expect("jobs lock");
        let entry = jobs.get(&job_id).ok_or(JobNotFound)?;
        let _ = entry.cancel_tx.send(true);
        Ok(())
    }

    /// Remove terminal jobs whose last update is older than the retention
    /// window. Called from the periodic sweep task.
    pub(crate) fn sweep_expired(&self) {
        let now = Utc::now();
        let mut expired = Vec::new();
        {
            let jobs = self.inner.jobs.lock().expect("jobs lock");
            for (job_id, entry) in jobs.iter() {
                if entry.snapshot.status.is_terminal()
                    && (now - entry.snapshot.updated_at).num_seconds() >= self.inner.retention_secs
                {
                    expired.push(*job_id);
                }
            }
        }
        if expired.is_empty() {
            return;
        }
        let mut jobs = self.inner.jobs.lock().expect("jobs lock");
        for job_id in expired {
            jobs.remove(&job_id);
            self.inner.bus.remove_job(job_id);
        }
    }

    #[must_use]
    pub(crate) fn active_job_count(&self) -> usize {
        self.inner
            .jobs
            .lock()
            .expect("jobs lock")
            .values()
            .filter(|entry| !entry.snapshot.status.is_terminal())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_metrics() -> Arc<Metrics> {
        Arc::new(Metrics::new(Arc::new(prometheus::Registry::new())).expect("metrics register"))
    }

    fn test_report_store() -> Arc<dyn ReportStore> {
        Arc::new(crate::store::report_store::NoopReportStore)
    }

    fn request() -> ResearchRequest {
        ResearchRequest {
            company: "Acme Corp".to_owned(),
            company_url: None,
            industry: None,
            hq_location: None,
        }
    }

    #[tokio::test]
    async fn submit_registers_a_pending_job() {
        let manager = JobManager::new(4, 8, 3600, test_metrics(), test_report_store());
        let (job_id, _reporter) = manager.submit(&request()).expect("submit");
        let snapshot = manager.status(job_id).expect("status");
        assert_eq!(snapshot.status, JobStatus::Pending);
        assert_eq!(snapshot.progress, 0);
    }

    #[tokio::test]
    async fn submit_rejects_when_at_capacity() {
        let manager = JobManager::new(1, 8, 3600, test_metrics(), test_report_store());
        let (_job_id, _reporter) = manager.submit(&request()).expect("first submit");
        let second = manager.submit(&request());
        assert!(matches!(second, Err(SubmitError::AtCapacity(_))));
    }

    #[test]
    fn cancel_unknown_job_errors() {
        let manager = JobManager::new(4, 8, 3600, test_metrics(), test_report_store());
        assert!(manager.cancel(Uuid::new_v4()).is_err());
    }

    #[tokio::test]
    async fn cancel_flips_the_reporter_signal() {
        let manager = JobManager::new(4, 8, 3600, test_metrics(), test_report_store());
        let (job_id, reporter) = manager.submit(&request()).expect("submit");
        assert!(!reporter.cancellation().is_cancelled());
        manager.cancel(job_id).expect("cancel");
        assert!(reporter.cancellation().is_cancelled());
        assert!(reporter.cancellation().check().is_err());
    }

    #[tokio::test]
    async fn reporter_complete_updates_snapshot() {
        let manager = JobManager::new(4, 8, 3600, test_metrics(), test_report_store());
        let (job_id, reporter) = manager.submit(&request()).expect("submit");
        reporter.complete(JobResult {
            company: "Acme Corp".to_owned(),
            report: "# Acme Corp\n".to_owned(),
        });
        let snapshot = manager.status(job_id).expect("status");
        assert_eq!(snapshot.status, JobStatus::Completed);
        assert_eq!(snapshot.progress, 100);
        assert!(snapshot.result.is_some());
    }

    #[tokio::test]
    async fn reporter_fail_records_error_message() {
        let manager = JobManager::new(4, 8, 3600, test_metrics(), test_report_store());
        let (job_id, reporter) = manager.submit(&request()).expect("submit");
        reporter.fail("search collaborator unavailable");
        let snapshot = manager.status(job_id).expect("status");
        assert_eq!(snapshot.status, JobStatus::Failed);
        assert_eq!(snapshot.error.as_deref(), Some("search collaborator unavailable"));
    }

    #[tokio::test]
    async fn sweep_expired_removes_old_terminal_jobs_only() {
        let manager = JobManager::new(4, 8, 0, test_metrics(), test_report_store());
        let (job_id, reporter) = manager.submit(&request()).expect("submit");
        let (pending_job_id, _pending_reporter) = manager.submit(&request()).expect("submit");

        reporter.complete(JobResult {
            company: "Acme Corp".to_owned(),
            report: String::new(),
        });

        manager.sweep_expired();

        assert!(manager.status(job_id).is_none());
        assert!(manager.status(pending_job_id).is_some());
    }

    #[tokio::test]
    async fn active_job_count_excludes_terminal_jobs() {
        let manager = JobManager::new(4, 8, 3600, test_metrics(), test_report_store());
        let (_first, reporter) = manager.submit(&request()).expect("submit");
        let (_second, _reporter2) = manager.submit(&request()).expect("submit");
        assert_eq!(manager.active_job_count(), 2);

        reporter.fail("boom");
        assert_eq!(manager.active_job_count(), 1);
    }
}
