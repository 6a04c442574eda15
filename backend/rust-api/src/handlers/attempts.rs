use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use crate::{
    error::AppError,
    models::attempt::{AnswerRequest, AttemptQuery, StartQuery, SubmissionRequest},
    services::{attempt_service::AttemptService, scoring_service::ScoringService, AppState},
};

/// Starts an attempt and returns the staged snapshot along with the
/// new attempt id. Repeated calls create additional attempt rows.
pub async fn start_attempt(
    State(state): State<Arc<AppState>>,
    Path(quiz_id): Path<i64>,
    Query(query): Query<StartQuery>,
) -> Result<impl IntoResponse, AppError> {
    tracing::info!("Starting attempt on quiz {} for user {}", quiz_id, query.user_id);

    let response = AttemptService::new(&state)
        .start_attempt(query.user_id, quiz_id, query.num)
        .await?;
    Ok(Json(response))
}

pub async fn record_answer(
    State(state): State<Arc<AppState>>,
    Path(quiz_id): Path<i64>,
    Query(query): Query<AttemptQuery>,
    Json(req): Json<AnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    let ack = AttemptService::new(&state)
        .record_answer(quiz_id, query.attempt_id, &req)
        .await?;
    Ok(Json(ack))
}

/// Reloads the staged snapshot with the user's selections annotated.
/// 404 once the snapshot TTL has elapsed.
pub async fn resume_attempt(
    State(state): State<Arc<AppState>>,
    Path((quiz_id, attempt_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, AppError> {
    let snapshot = AttemptService::new(&state)
        .resume_attempt(quiz_id, attempt_id)
        .await?;
    Ok(Json(snapshot))
}

/// Terminal submission. The body echoes the annotated snapshot, but
/// selection truth comes from the server-side answer map while that
/// map is alive; the echoed flags only matter once it has expired.
pub async fn submit_attempt(
    State(state): State<Arc<AppState>>,
    Path(quiz_id): Path<i64>,
    Query(query): Query<AttemptQuery>,
    Json(req): Json<SubmissionRequest>,
) -> Result<impl IntoResponse, AppError> {
    tracing::info!("Submitting attempt {} on quiz {}", query.attempt_id, quiz_id);

    let report = ScoringService::new(&state)
        .submit_attempt(quiz_id, query.attempt_id, &req)
        .await?;
    Ok(Json(report))
}
