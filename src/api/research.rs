//! Job submission, status, report retrieval, cancellation, and the live
//! event-stream WebSocket.
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::job::{JobSnapshot, JobStatus, ResearchRequest, SubmitError};
use crate::pipeline::state::ResearchState;

#[derive(Debug, Serialize)]
pub(crate) struct SubmitResponse {
    status: &'static str,
    job_id: Uuid,
    websocket_url: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct CancelResponse {
    status: &'static str,
}

#[derive(Debug, Serialize)]
pub(crate) struct ReportResponse {
    report: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ErrorResponse {
    error: String,
}

impl ErrorResponse {
    fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

pub(crate) async fn submit(
    State(state): State<AppState>,
    Json(request): Json<ResearchRequest>,
) -> Result<(StatusCode, Json<SubmitResponse>), (StatusCode, Json<ErrorResponse>)> {
    if request.company.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("company must not be empty")),
        ));
    }

    let job_manager = state.job_manager();
    let metrics = state.telemetry().metrics();

    let (job_id, reporter) = job_manager.submit(&request).map_err(|error| match error {
        SubmitError::AtCapacity(running) => {
            metrics.jobs_rejected_at_capacity.inc();
            warn!(running, "rejected research job at capacity");
            (
                StatusCode::TOO_MANY_REQUESTS,
                Json(ErrorResponse::new(format!(
                    "at capacity: {running} jobs already running"
                ))),
            )
        }
    })?;

    metrics.jobs_submitted.inc();
    metrics.active_jobs.inc();
    info!(%job_id, company = %request.company, "research job submitted");

    let initial_state = ResearchState::new(
        request.company.clone(),
        request.company_url.clone(),
        request.industry.clone(),
        request.hq_location.clone(),
    );
    let orchestrator = state.orchestrator();
    let telemetry = state.telemetry().clone();

    tokio::spawn(async move {
        let started = std::time::Instant::now();
        orchestrator.run(initial_state, reporter).await;

        let metrics = telemetry.metrics();
        metrics.active_jobs.dec();
        metrics.job_duration.observe(started.elapsed().as_secs_f64());

        let Some(snapshot) = job_manager.status(job_id) else {
            return;
        };

        match snapshot.status {
            JobStatus::Completed => metrics.jobs_completed.inc(),
            JobStatus::Failed => metrics.jobs_failed.inc(),
            JobStatus::Pending | JobStatus::Processing => {}
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            status: "accepted",
            job_id,
            websocket_url: format!("/research/ws/{job_id}"),
        }),
    ))
}

pub(crate) async fn status(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobSnapshot>, StatusCode> {
    state
        .job_manager()
        .status(job_id)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

pub(crate) async fn report(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<ReportResponse>, StatusCode> {
    let snapshot = state
        .job_manager()
        .status(job_id)
        .ok_or(StatusCode::NOT_FOUND)?;

    match snapshot.result {
        Some(result) => Ok(Json(ReportResponse {
            report: result.report,
        })),
        None => Err(StatusCode::CONFLICT),
    }
}

pub(crate) async fn cancel(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<CancelResponse>, StatusCode> {
    match state.job_manager().cancel(job_id) {
        Ok(()) => {
            state.telemetry().metrics().jobs_cancelled.inc();
            info!(%job_id, "research job cancellation requested");
            Ok(Json(CancelResponse {
                status: "cancelling",
            }))
        }
        Err(_) => Err(StatusCode::NOT_FOUND),
    }
}

pub(crate) async fn stream(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    match state.job_manager().subscribe(job_id) {
        Some(subscription) => {
            ws.on_upgrade(move |socket| forward_events(socket, job_id, subscription, state))
        }
        None => (StatusCode::NOT_FOUND, "job not found").into_response(),
    }
}

async fn forward_events(
    mut socket: WebSocket,
    job_id: Uuid,
    subscription: crate::job::bus::EventSubscription,
    state: AppState,
) {
    state.telemetry().metrics().event_bus_subscribers.inc();

    loop {
        let event = subscription.recv().await;
        let is_terminal = event.event_type == "status_update"
            && event
                .data
                .get("status")
                .and_then(|value| value.as_str())
                .is_some_and(|status| status == "completed" || status == "failed");

        let payload = match serde_json::to_string(&event) {
            Ok(payload) => payload,
            Err(error) => {
                warn!(%job_id, %error, "failed to serialize event for subscriber");
                break;
            }
        };

        if socket.send(Message::Text(payload.into())).await.is_err() {
            break;
        }
        if is_terminal {
            let _ = socket.close().await;
            break;
        }
    }

    state.telemetry().metrics().event_bus_subscribers.dec();
}
