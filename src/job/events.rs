use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value, json};

use super::types::{JobResult, JobStatus};

/// A single event published on a job's stream.
///
/// Serializes to `{"type": ..., "timestamp": ..., "data": {...}}` per the
/// control plane's wire format.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct Event {
    #[serde(rename = "type")]
    pub(crate) event_type: &'static str,
    pub(crate) timestamp: DateTime<Utc>,
    pub(crate) data: Value,
}

impl Event {
    fn new(event_type: &'static str, data: Value) -> Self {
        Self {
            event_type,
            timestamp: Utc::now(),
            data,
        }
    }

    pub(crate) fn status_update(
        status: JobStatus,
        progress: u8,
        message: Option<&str>,
        error: Option<&str>,
        result: Option<&JobResult>,
    ) -> Self {
        Self::new(
            "status_update",
            json!({
                "status": status,
                "progress": progress,
                "message": message,
                "error": error,
                "result": result,
            }),
        )
    }

    pub(crate) fn query_generating(category: &str, partial: &str) -> Self {
        Self::new(
            "query_generating",
            json!({ "category": category, "partial": partial }),
        )
    }

    pub(crate) fn query_generated(category: &str, query: &str) -> Self {
        Self::new(
            "query_generated",
            json!({ "category": category, "query": query }),
        )
    }

    pub(crate) fn query_searching(category: &str, query: &str) -> Self {
        Self::new(
            "query_searching",
            json!({ "category": category, "query": query }),
        )
    }

    pub(crate) fn query_searched(category: &str, query: &str, result_count: usize) -> Self {
        Self::new(
            "query_searched",
            json!({ "category": category, "query": query, "result_count": result_count }),
        )
    }

    pub(crate) fn document_kept(category: &str, url: &str, score: f64) -> Self {
        Self::new(
            "document_kept",
            json!({ "category": category, "url": url, "score": score }),
        )
    }

    pub(crate) fn category_start(category: &str) -> Self {
        Self::new("category_start", json!({ "category": category }))
    }

    pub(crate) fn category_complete(category: &str, document_count: usize) -> Self {
        Self::new(
            "category_complete",
            json!({ "category": category, "document_count": document_count }),
        )
    }

    pub(crate) fn report_chunk(chunk: &str) -> Self {
        Self::new("report_chunk", json!({ "chunk": chunk }))
    }

    pub(crate) fn error(kind: &str, message: &str) -> Self {
        Self::new("error", json!({ "kind": kind, "message": message }))
    }
}
