use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

pub mod attempt;

/// A quiz, owned by its authoring user. `question_count` is advisory
/// metadata recorded by the author; attempts always stage every
/// question the quiz has.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quiz {
    #[serde(rename = "_id")]
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub question_count: Option<u32>,
}

/// Order is assigned by the store at insert time (monotone per quiz),
/// never supplied by the client and never reused after deletion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    #[serde(rename = "_id")]
    pub id: i64,
    pub quiz_id: i64,
    pub text: String,
    pub order: u32,
}

/// `is_correct` is the single source of scoring truth. It must never
/// appear in any payload a user sees during an active attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    #[serde(rename = "_id")]
    pub id: i64,
    pub question_id: i64,
    pub text: String,
    pub is_correct: bool,
    pub order: u32,
}

/// One row per (user, quiz); the composite `_id` enforces uniqueness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserQuizRegistration {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: i64,
    pub quiz_id: i64,
    pub registered_at: DateTime<Utc>,
}

impl UserQuizRegistration {
    pub fn key(user_id: i64, quiz_id: i64) -> String {
        format!("{}:{}", user_id, quiz_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserQuizAttempt {
    #[serde(rename = "_id")]
    pub id: i64,
    pub user_id: i64,
    pub quiz_id: i64,
    pub attempted_at: DateTime<Utc>,
    pub is_submit: bool,
}

/// Durable record that a question was part of a submission. The
/// composite `_id` gives the (attempt_id, question_id) uniqueness
/// constraint that rejects duplicate submissions of the same question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserQuizAttemptQuestion {
    #[serde(rename = "_id")]
    pub id: String,
    pub attempt_id: i64,
    pub question_id: i64,
}

impl UserQuizAttemptQuestion {
    pub fn key(attempt_id: i64, question_id: i64) -> String {
        format!("{}:{}", attempt_id, question_id)
    }
}

/// Committed answer state, one row per (question, choice) pair in the
/// submission, written only at submission time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserQuizAttemptAnswer {
    pub attempt_id: i64,
    pub question_id: i64,
    pub choice_id: i64,
    pub is_selected: bool,
}

/// One score row per attempt; keyed by attempt id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserQuizScore {
    #[serde(rename = "_id")]
    pub attempt_id: i64,
    pub score: u32,
    pub total: u32,
}

// ---- Authoring / listing DTOs ----

#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuizRequest {
    pub user_id: i64,
    #[validate(length(min = 1, max = 255))]
    pub title: String,
    pub description: Option<String>,
    pub question_count: Option<u32>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateQuizRequest {
    #[validate(length(min = 1, max = 255))]
    pub title: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuestionRequest {
    #[validate(length(min = 1))]
    pub text: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateChoiceRequest {
    #[validate(length(min = 1))]
    pub text: String,
    #[serde(default)]
    pub is_correct: bool,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub user_id: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SampleQuizRequest {
    pub user_id: i64,
    #[validate(length(min = 1, max = 255))]
    pub title: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub page: u64,
    #[serde(default = "default_page_size")]
    pub page_size: u64,
}

fn default_page_size() -> u64 {
    10
}

#[derive(Debug, Serialize)]
pub struct QuizSummary {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct QuizListResponse {
    pub total_count: u64,
    pub page: u64,
    pub page_size: u64,
    pub quizzes: Vec<QuizSummary>,
}

/// Admin-only view: includes `is_correct`, which is why this shape is
/// never reachable from the attempt endpoints.
#[derive(Debug, Serialize)]
pub struct QuestionWithChoices {
    pub id: i64,
    pub quiz_id: i64,
    pub text: String,
    pub order: u32,
    pub choices: Vec<Choice>,
}

#[derive(Debug, Serialize)]
pub struct QuestionListResponse {
    pub total_count: u64,
    pub page: u64,
    pub page_size: u64,
    pub questions: Vec<QuestionWithChoices>,
}

#[derive(Debug, Serialize)]
pub struct QuizStatus {
    pub quiz_id: i64,
    pub registered: bool,
    pub attempted: bool,
}

/// Result of the structural sanity check. A query payload, not an
/// error: an invalid quiz answers 200 with `valid: false`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub reason: String,
}
