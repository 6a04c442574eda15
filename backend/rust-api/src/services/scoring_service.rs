use std::collections::HashMap;
use std::sync::Arc;

use crate::cache::{answers_key, SessionCache};
use crate::error::AppError;
use crate::metrics::ATTEMPTS_SUBMITTED_TOTAL;
use crate::models::attempt::{ScoreReport, SubmissionRequest};
use crate::models::{UserQuizAttemptAnswer, UserQuizScore};
use crate::services::AppState;
use crate::store::{QuizStore, StoreError};

/// Reconciles a submission into durable records and a score. Terminal:
/// once an attempt is submitted there is no path back to in-progress.
pub struct ScoringService {
    store: Arc<dyn QuizStore>,
    cache: Arc<dyn SessionCache>,
}

impl ScoringService {
    pub fn new(state: &AppState) -> Self {
        Self {
            store: state.store.clone(),
            cache: state.cache.clone(),
        }
    }

    pub fn with_parts(store: Arc<dyn QuizStore>, cache: Arc<dyn SessionCache>) -> Self {
        Self { store, cache }
    }

    /// Persists the submitted answers and computes the final score.
    ///
    /// Selection truth: when the server-side answer map is still in the
    /// cache it overrides the client-echoed `is_selected` flags, so a
    /// client cannot inflate its score by asserting selections it never
    /// recorded. Only after the map has expired do the echoed flags
    /// stand (legacy convenience for old clients).
    ///
    /// The attempt is claimed up front with an atomic is_submit flip;
    /// a second submission, concurrent or later, gets a Conflict. The
    /// (attempt_id, question_id) uniqueness constraint is the second
    /// net against duplicate question rows within one payload.
    pub async fn submit_attempt(
        &self,
        quiz_id: i64,
        attempt_id: i64,
        submission: &SubmissionRequest,
    ) -> Result<ScoreReport, AppError> {
        self.store
            .find_quiz(quiz_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Quiz not found".to_string()))?;
        self.store
            .find_attempt(attempt_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Attempt not found".to_string()))?;

        if !self.store.claim_attempt_submission(attempt_id).await? {
            return Err(AppError::Conflict(
                "Attempt has already been submitted".to_string(),
            ));
        }

        let answer_key = answers_key(quiz_id, attempt_id);
        let staged: Option<HashMap<String, String>> = if self.cache.exists(&answer_key).await? {
            Some(self.cache.hgetall(&answer_key).await?)
        } else {
            tracing::warn!(
                "Attempt {} submitted after its answer map expired; falling back to client-asserted selections",
                attempt_id
            );
            None
        };

        let mut score = 0u32;
        let total = submission.questions.len() as u32;

        for question in &submission.questions {
            self.store
                .insert_attempt_question(attempt_id, question.id)
                .await
                .map_err(|e| match e {
                    StoreError::Duplicate(_) => AppError::Conflict(format!(
                        "Question {} was already submitted for this attempt",
                        question.id
                    )),
                    other => other.into(),
                })?;

            let staged_choice = staged.as_ref().map(|map| {
                map.get(&question.id.to_string())
                    .and_then(|v| v.parse::<i64>().ok())
            });

            for choice in &question.choices {
                let is_selected = match staged_choice {
                    // Answer map present: it is the only truth, an
                    // unanswered question selects nothing.
                    Some(selected) => selected == Some(choice.id),
                    None => choice.is_selected,
                };

                self.store
                    .insert_attempt_answer(&UserQuizAttemptAnswer {
                        attempt_id,
                        question_id: question.id,
                        choice_id: choice.id,
                        is_selected,
                    })
                    .await?;

                if is_selected {
                    // Correctness is read fresh from the durable store;
                    // the cached snapshot never carries it.
                    let correct = self
                        .store
                        .find_choice(choice.id)
                        .await?
                        .map(|c| c.is_correct)
                        .unwrap_or(false);
                    if correct {
                        score += 1;
                    }
                }
            }
        }

        self.store
            .insert_score(&UserQuizScore {
                attempt_id,
                score,
                total,
            })
            .await?;

        ATTEMPTS_SUBMITTED_TOTAL.inc();
        tracing::info!(
            "Attempt {} submitted: score {}/{} on quiz {}",
            attempt_id,
            score,
            total,
            quiz_id
        );

        Ok(ScoreReport {
            message: "Quiz submitted successfully".to_string(),
            score,
            total,
        })
    }
}
