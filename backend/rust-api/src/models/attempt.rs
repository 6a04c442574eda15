use serde::{Deserialize, Serialize};

/// The staged copy of a quiz held in the session cache for the life of
/// one attempt. Choices carry no `is_correct` flag; it is stripped
/// before staging. Immutable once staged; only the answer map mutates.
///
/// Quiz metadata fields are optional because older staged payloads were
/// written as a bare question list (see `AttemptService::normalize_snapshot`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quiz_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub questions: Vec<SnapshotQuestion>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotQuestion {
    pub id: i64,
    pub text: String,
    pub choices: Vec<SnapshotChoice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotChoice {
    pub id: i64,
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StartAttemptResponse {
    pub attempt_id: i64,
    pub snapshot: Snapshot,
}

#[derive(Debug, Deserialize)]
pub struct StartQuery {
    pub user_id: i64,
    pub num: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct AttemptQuery {
    pub attempt_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct AnswerRequest {
    pub question_id: i64,
    pub selected_choice_id: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnswerAck {
    pub quiz_attempt_id: i64,
    pub question_id: i64,
    pub choice_id: i64,
    pub message: String,
}

/// Resume payload: the snapshot with every choice annotated with the
/// user's current selection state.
#[derive(Debug, Serialize, Deserialize)]
pub struct AnnotatedSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quiz_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub questions: Vec<AnnotatedQuestion>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnnotatedQuestion {
    pub id: i64,
    pub text: String,
    pub choices: Vec<AnnotatedChoice>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnnotatedChoice {
    pub id: i64,
    pub text: String,
    pub is_selected: bool,
}

/// Submission body: the client echoes back the annotated snapshot it
/// holds. The scoring engine treats the echoed `is_selected` flags as a
/// legacy convenience only; the server-side answer map wins whenever it
/// is still present (see `ScoringService::submit_attempt`).
#[derive(Debug, Deserialize, Serialize)]
pub struct SubmissionRequest {
    pub questions: Vec<SubmittedQuestion>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SubmittedQuestion {
    pub id: i64,
    pub choices: Vec<SubmittedChoice>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SubmittedChoice {
    pub id: i64,
    #[serde(default)]
    pub is_selected: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ScoreReport {
    pub message: String,
    pub score: u32,
    pub total: u32,
}
