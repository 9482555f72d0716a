use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use thedal_core::engine::ProviderStatus;
use thedal_core::types::{
    Candidate, Explanation, FeedbackEvent, FeedbackReceipt, RetrievalRequest, RetrievalResponse,
};
use thedal_core::{EngineError, MetricsSnapshot};

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/retrieve", post(retrieve))
        .route("/ingest", post(retrieve))
        .route("/enrich", post(enrich))
        .route("/rank", post(rank))
        .route("/explain", post(explain))
        .route("/feedback", post(feedback))
        .route("/metrics", get(metrics))
        .route("/status", get(status))
        .with_state(state)
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn retrieve(
    State(state): State<AppState>,
    Json(payload): Json<RetrievalRequest>,
) -> Result<Json<RetrievalResponse>, ApiError> {
    let response = state.engine.retrieve(payload).await?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
struct CandidatesBody {
    candidates: Vec<Candidate>,
    #[serde(default)]
    explain: bool,
}

#[derive(Debug, Serialize)]
struct EnrichedBody {
    enriched: Vec<Candidate>,
}

async fn enrich(
    State(state): State<AppState>,
    Json(payload): Json<CandidatesBody>,
) -> Json<EnrichedBody> {
    let enriched = state.engine.enrich_candidates(payload.candidates).await;
    Json(EnrichedBody { enriched })
}

#[derive(Debug, Serialize)]
struct RankedBody {
    ranked: Vec<Candidate>,
}

async fn rank(
    State(state): State<AppState>,
    Json(payload): Json<CandidatesBody>,
) -> Json<RankedBody> {
    let ranked = state.engine.rank_standalone(payload.candidates, payload.explain);
    Json(RankedBody { ranked })
}

#[derive(Debug, Deserialize)]
struct ExplainBody {
    candidate: Candidate,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExplainResponse {
    candidate_id: String,
    explanation: Explanation,
}

async fn explain(
    State(state): State<AppState>,
    Json(payload): Json<ExplainBody>,
) -> Json<ExplainResponse> {
    let explanation = state.engine.explain_one(&payload.candidate);
    Json(ExplainResponse {
        candidate_id: payload.candidate.candidate_id,
        explanation,
    })
}

async fn feedback(
    State(state): State<AppState>,
    Json(payload): Json<FeedbackEvent>,
) -> Result<Json<FeedbackReceipt>, ApiError> {
    let receipt = state.engine.record_feedback(payload)?;
    Ok(Json(receipt))
}

async fn metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.engine.metrics_snapshot())
}

async fn status(State(state): State<AppState>) -> Json<Vec<ProviderStatus>> {
    Json(state.engine.provider_status())
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error_code: String,
    message: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error_code: &'static str,
    message: String,
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        let status = match &err {
            EngineError::Validation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError {
            status,
            error_code: err.code_str(),
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error_code: self.error_code.to_string(),
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}
