pub(crate) mod bus;
pub(crate) mod events;
pub(crate) mod gc;
pub(crate) mod manager;
pub(crate) mod types;

pub(crate) use manager::{CancellationSignal, JobManager, JobNotFound, JobReporter, SubmitError};
pub(crate) use types::{JobResult, JobSnapshot, JobStatus, ResearchRequest};
