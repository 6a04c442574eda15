use anyhow::Context;
use serde_json::Value;
use std::sync::Arc;

use crate::cache::{answers_key, snapshot_key, SessionCache, ANSWER_TTL_SECS, SNAPSHOT_TTL_SECS};
use crate::error::AppError;
use crate::metrics::{ANSWERS_RECORDED_TOTAL, ATTEMPTS_STARTED_TOTAL};
use crate::models::attempt::{
    AnnotatedChoice, AnnotatedQuestion, AnnotatedSnapshot, AnswerAck, AnswerRequest, Snapshot,
    SnapshotChoice, SnapshotQuestion, StartAttemptResponse,
};
use crate::services::AppState;
use crate::store::QuizStore;

/// No-answer sentinel: no real choice id can equal it, so nothing is
/// marked selected before the first answer lands.
const NO_SELECTION: i64 = -1;

/// Orchestrates the attempt lifecycle: staging the question/choice
/// snapshot in the session cache, recording answer selections, and
/// resuming after interruption. Submission lives in `ScoringService`.
pub struct AttemptService {
    store: Arc<dyn QuizStore>,
    cache: Arc<dyn SessionCache>,
}

impl AttemptService {
    pub fn new(state: &AppState) -> Self {
        Self {
            store: state.store.clone(),
            cache: state.cache.clone(),
        }
    }

    pub fn with_parts(store: Arc<dyn QuizStore>, cache: Arc<dyn SessionCache>) -> Self {
        Self { store, cache }
    }

    /// Starts a new attempt: inserts the attempt row, stages the full
    /// quiz snapshot (without correctness flags) under the attempt's
    /// cache key with a one-hour expiry, and returns the snapshot
    /// together with the new attempt id.
    ///
    /// Every question is staged, in primary-key order. The optional
    /// requested count is accepted for wire compatibility but does not
    /// limit staging; `quiz.question_count` is advisory metadata only.
    ///
    /// Every call creates a fresh attempt row; repeated starts stack
    /// attempts for the same (user, quiz). The strict creation path in
    /// `QuizService::register_attempt` is the one that enforces
    /// one-attempt-per-user.
    pub async fn start_attempt(
        &self,
        user_id: i64,
        quiz_id: i64,
        requested_count: Option<u32>,
    ) -> Result<StartAttemptResponse, AppError> {
        let quiz = self
            .store
            .find_quiz(quiz_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Quiz not found".to_string()))?;

        let attempt = self.store.insert_attempt(user_id, quiz_id).await?;
        let key = snapshot_key(quiz_id, attempt.id);

        // Same staging path the refresh flow relies on: a hit is
        // returned unchanged. For a freshly minted attempt id the key
        // cannot exist yet.
        if let Some(cached) = self.cache.get(&key).await? {
            let snapshot: Snapshot =
                serde_json::from_str(&cached).context("Staged snapshot is not valid JSON")?;
            return Ok(StartAttemptResponse {
                attempt_id: attempt.id,
                snapshot,
            });
        }

        if let Some(num) = requested_count {
            tracing::debug!(
                "Requested question count {} ignored for quiz {}; staging all questions",
                num,
                quiz_id
            );
        }

        let questions = self.store.list_questions(quiz_id).await?;
        let mut staged = Vec::with_capacity(questions.len());
        for question in questions {
            let choices = self
                .store
                .list_choices(question.id)
                .await?
                .into_iter()
                // is_correct is stripped here and must never reach the cache
                .map(|c| SnapshotChoice {
                    id: c.id,
                    text: c.text,
                })
                .collect();
            staged.push(SnapshotQuestion {
                id: question.id,
                text: question.text,
                choices,
            });
        }

        let snapshot = Snapshot {
            quiz_id: Some(quiz.id),
            title: Some(quiz.title),
            description: quiz.description,
            questions: staged,
        };

        let payload = serde_json::to_string(&snapshot).context("Failed to encode snapshot")?;
        self.cache.set_ex(&key, &payload, SNAPSHOT_TTL_SECS).await?;

        ATTEMPTS_STARTED_TOTAL.inc();
        tracing::info!(
            "Attempt {} started for user {} on quiz {} ({} questions staged)",
            attempt.id,
            user_id,
            quiz_id,
            snapshot.questions.len()
        );

        Ok(StartAttemptResponse {
            attempt_id: attempt.id,
            snapshot,
        })
    }

    /// Records one answer selection into the attempt's answer hash.
    /// Re-answering the same question overwrites the prior choice
    /// (last write wins). The 20-minute expiry is set only when the key
    /// has none yet; later writes never extend the deadline.
    pub async fn record_answer(
        &self,
        quiz_id: i64,
        attempt_id: i64,
        req: &AnswerRequest,
    ) -> Result<AnswerAck, AppError> {
        let key = answers_key(quiz_id, attempt_id);

        self.cache
            .hset(
                &key,
                &req.question_id.to_string(),
                &req.selected_choice_id.to_string(),
            )
            .await?;

        if self.cache.ttl(&key).await? < 0 {
            self.cache.expire(&key, ANSWER_TTL_SECS).await?;
        }

        ANSWERS_RECORDED_TOTAL.inc();
        tracing::debug!(
            "Attempt {} answered question {} with choice {}",
            attempt_id,
            req.question_id,
            req.selected_choice_id
        );

        Ok(AnswerAck {
            quiz_attempt_id: attempt_id,
            question_id: req.question_id,
            choice_id: req.selected_choice_id,
            message: "Answer updated successfully".to_string(),
        })
    }

    /// Reloads the staged snapshot and annotates every choice with the
    /// user's current selection. NotFound once the snapshot has
    /// expired: an expired attempt is unrecoverable by design.
    pub async fn resume_attempt(
        &self,
        quiz_id: i64,
        attempt_id: i64,
    ) -> Result<AnnotatedSnapshot, AppError> {
        let key = snapshot_key(quiz_id, attempt_id);
        let raw = self
            .cache
            .get(&key)
            .await?
            .ok_or_else(|| AppError::NotFound("No quiz data found".to_string()))?;

        let value: Value =
            serde_json::from_str(&raw).context("Staged snapshot is not valid JSON")?;
        let snapshot = normalize_snapshot(value)?;

        let answer_key = answers_key(quiz_id, attempt_id);
        let answers = if self.cache.exists(&answer_key).await? {
            self.cache.hgetall(&answer_key).await?
        } else {
            Default::default()
        };

        let questions = snapshot
            .questions
            .into_iter()
            .map(|q| {
                let selected = answers
                    .get(&q.id.to_string())
                    .and_then(|v| v.parse::<i64>().ok())
                    .unwrap_or(NO_SELECTION);
                AnnotatedQuestion {
                    id: q.id,
                    text: q.text,
                    choices: q
                        .choices
                        .into_iter()
                        .map(|c| AnnotatedChoice {
                            is_selected: c.id == selected,
                            id: c.id,
                            text: c.text,
                        })
                        .collect(),
                }
            })
            .collect();

        Ok(AnnotatedSnapshot {
            quiz_id: snapshot.quiz_id,
            title: snapshot.title,
            description: snapshot.description,
            questions,
        })
    }
}

/// Single adapter for the two snapshot shapes found in the cache: the
/// current `{quiz_id, title, description, questions}` object and the
/// legacy bare question list, which gets wrapped into the object form.
fn normalize_snapshot(value: Value) -> Result<Snapshot, AppError> {
    match value {
        Value::Array(items) => {
            if items.is_empty() {
                return Err(AppError::BadRequest(
                    "Staged snapshot list is empty".to_string(),
                ));
            }
            let questions: Vec<SnapshotQuestion> = serde_json::from_value(Value::Array(items))?;
            Ok(Snapshot {
                quiz_id: None,
                title: None,
                description: None,
                questions,
            })
        }
        other => Ok(serde_json::from_value(other)?),
    }
}
