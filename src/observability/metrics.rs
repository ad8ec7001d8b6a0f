//! Prometheus metric definitions.
use prometheus::{
    Counter, Gauge, Histogram, HistogramVec, Registry, register_counter_with_registry,
    register_gauge_with_registry, register_histogram_vec_with_registry,
    register_histogram_with_registry,
};
use std::sync::Arc;

/// Metrics collector shared across the job manager, pipeline stages, and API handlers.
#[derive(Debug, Clone)]
pub struct Metrics {
    // Counters
    pub jobs_submitted: Counter,
    pub jobs_completed: Counter,
    pub jobs_failed: Counter,
    pub jobs_cancelled: Counter,
    pub jobs_rejected_at_capacity: Counter,
    pub retries_total: Counter,
    pub event_bus_dropped_total: Counter,

    // Histograms
    pub stage_duration: HistogramVec,
    pub job_duration: Histogram,

    // Gauges
    pub active_jobs: Gauge,
    pub event_bus_subscribers: Gauge,
}

impl Metrics {
    /// Builds a new metrics collector, registering every metric on `registry`.
    pub fn new(registry: Arc<Registry>) -> Result<Self, prometheus::Error> {
        Ok(Self {
            jobs_submitted: register_counter_with_registry!(
                "research_jobs_submitted_total",
                "Total number of research jobs submitted",
                registry
            )?,
            jobs_completed: register_counter_with_registry!(
                "research_jobs_completed_total",
                "Total number of research jobs completed",
                registry
            )?,
            jobs_failed: register_counter_with_registry!(
                "research_jobs_failed_total",
                "Total number of research jobs failed",
                registry
            )?,
            jobs_cancelled: register_counter_with_registry!(
                "research_jobs_cancelled_total",
                "Total number of research jobs cancelled",
                registry
            )?,
            jobs_rejected_at_capacity: register_counter_with_registry!(
                "research_jobs_rejected_at_capacity_total",
                "Total number of job submissions rejected because the concurrency limit was reached",
                registry
            )?,
            retries_total: register_counter_with_registry!(
                "research_retries_total",
                "Total number of collaborator call retries",
                registry
            )?,
            event_bus_dropped_total: register_counter_with_registry!(
                "research_event_bus_dropped_total",
                "Total number of events dropped from a subscriber's ring buffer due to overflow",
                registry
            )?,
            stage_duration: register_histogram_vec_with_registry!(
                "research_stage_duration_seconds",
                "Duration of a single pipeline stage invocation",
                &["stage"],
                registry
            )?,
            job_duration: register_histogram_with_registry!(
                "research_job_duration_seconds",
                "Duration of an entire research job from submission to terminal state",
                registry
            )?,
            active_jobs: register_gauge_with_registry!(
                "research_active_jobs",
                "Number of currently active research jobs",
                registry
            )?,
            event_bus_subscribers: register_gauge_with_registry!(
                "research_event_bus_subscribers",
                "Number of currently connected event bus subscribers",
                registry
            )?,
        })
    }
}
