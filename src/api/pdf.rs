//! Thin proxy to an optional external PDF-rendering collaborator.
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::app::AppState;

#[derive(Debug, Deserialize, Serialize)]
pub(crate) struct PdfRequest {
    report_content: String,
    #[serde(default)]
    company_name: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: &'static str,
}

pub(crate) async fn generate(
    State(state): State<AppState>,
    Json(request): Json<PdfRequest>,
) -> impl IntoResponse {
    if request.report_content.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "report_content must not be empty",
            }),
        )
            .into_response();
    }

    let Some(base_url) = state.config().pdf_render_base_url() else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse {
                error: "pdf rendering is not configured",
            }),
        )
            .into_response();
    };

    let response = state
        .pdf_client()
        .post(base_url)
        .json(&request)
        .send()
        .await;

    match response {
        Ok(response) => {
            let status =
                StatusCode::from_u16(response.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
            match response.bytes().await {
                Ok(bytes) => (status, bytes).into_response(),
                Err(error) => {
                    error!(%error, "failed to read pdf render response body");
                    StatusCode::BAD_GATEWAY.into_response()
                }
            }
        }
        Err(error) => {
            error!(%error, "pdf render collaborator request failed");
            StatusCode::BAD_GATEWAY.into_response()
        }
    }
}
