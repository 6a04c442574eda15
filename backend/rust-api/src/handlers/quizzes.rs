use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        CreateChoiceRequest, CreateQuestionRequest, CreateQuizRequest, PageQuery, RegisterRequest,
        SampleQuizRequest, UpdateQuizRequest,
    },
    services::{quiz_service::QuizService, AppState},
};

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub user_id: i64,
}

pub async fn create_quiz(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let quiz = QuizService::new(&state).create_quiz(&req).await?;
    Ok((StatusCode::CREATED, Json(quiz)))
}

pub async fn list_quizzes(
    State(state): State<Arc<AppState>>,
    Query(page): Query<PageQuery>,
) -> Result<impl IntoResponse, AppError> {
    let list = QuizService::new(&state).list_quizzes(&page).await?;
    Ok(Json(list))
}

pub async fn get_quiz(
    State(state): State<Arc<AppState>>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let quiz = QuizService::new(&state).get_quiz(quiz_id).await?;
    Ok(Json(quiz))
}

pub async fn update_quiz(
    State(state): State<Arc<AppState>>,
    Path(quiz_id): Path<i64>,
    Json(req): Json<UpdateQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let quiz = QuizService::new(&state).update_quiz(quiz_id, &req).await?;
    Ok(Json(quiz))
}

pub async fn create_question(
    State(state): State<Arc<AppState>>,
    Path(quiz_id): Path<i64>,
    Json(req): Json<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let question = QuizService::new(&state)
        .create_question(quiz_id, &req)
        .await?;
    Ok((StatusCode::CREATED, Json(question)))
}

pub async fn create_choice(
    State(state): State<Arc<AppState>>,
    Path(question_id): Path<i64>,
    Json(req): Json<CreateChoiceRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let choice = QuizService::new(&state)
        .create_choice(question_id, &req)
        .await?;
    Ok((StatusCode::CREATED, Json(choice)))
}

pub async fn list_questions(
    State(state): State<Arc<AppState>>,
    Path(quiz_id): Path<i64>,
    Query(page): Query<PageQuery>,
) -> Result<impl IntoResponse, AppError> {
    let list = QuizService::new(&state)
        .list_quiz_questions(quiz_id, &page)
        .await?;
    Ok(Json(list))
}

pub async fn register_quiz(
    State(state): State<Arc<AppState>>,
    Path(quiz_id): Path<i64>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let registration = QuizService::new(&state)
        .register_user(quiz_id, req.user_id)
        .await?;
    Ok((StatusCode::CREATED, Json(registration)))
}

/// Strict attempt creation: registration required, one attempt per
/// (user, quiz). The session flow under /start is the lenient one.
pub async fn attempt_quiz(
    State(state): State<Arc<AppState>>,
    Path(quiz_id): Path<i64>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let attempt = QuizService::new(&state)
        .register_attempt(quiz_id, req.user_id)
        .await?;
    Ok((StatusCode::CREATED, Json(attempt)))
}

pub async fn quiz_statuses(
    State(state): State<Arc<AppState>>,
    Query(user): Query<UserQuery>,
) -> Result<impl IntoResponse, AppError> {
    let statuses = QuizService::new(&state).quiz_statuses(user.user_id).await?;
    Ok(Json(statuses))
}

pub async fn validate_quiz(
    State(state): State<Arc<AppState>>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let report = QuizService::new(&state).validate(quiz_id).await?;
    Ok(Json(report))
}

pub async fn sample_quiz(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SampleQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let quiz = QuizService::new(&state)
        .seed_sample_quiz(&req.title, req.description.as_deref(), req.user_id)
        .await?;
    Ok((StatusCode::CREATED, Json(quiz)))
}
