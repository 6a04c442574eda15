use std::collections::HashSet;
use std::sync::Arc;

use crate::error::AppError;
use crate::models::{
    Choice, CreateChoiceRequest, CreateQuestionRequest, CreateQuizRequest, PageQuery, Question,
    QuestionListResponse, QuestionWithChoices, Quiz, QuizListResponse, QuizStatus, QuizSummary,
    UpdateQuizRequest, UserQuizAttempt, UserQuizRegistration, ValidationReport,
};
use crate::services::AppState;
use crate::store::{QuizStore, StoreError};

const SAMPLE_QUESTIONS: u32 = 100;
const SAMPLE_CHOICES: u32 = 5;

const MAX_PAGE_SIZE: u64 = 100;

/// Pagination inputs are client-supplied; the size is capped and the
/// offset saturates instead of overflowing.
fn page_window(page: &PageQuery) -> (u64, u64) {
    let page_size = page.page_size.min(MAX_PAGE_SIZE);
    (page.page.saturating_mul(page_size), page_size)
}

/// Authoring and registration glue around the durable store, plus the
/// structural validation the scoring engine's invariants assume.
pub struct QuizService {
    store: Arc<dyn QuizStore>,
}

impl QuizService {
    pub fn new(state: &AppState) -> Self {
        Self {
            store: state.store.clone(),
        }
    }

    pub fn with_store(store: Arc<dyn QuizStore>) -> Self {
        Self { store }
    }

    pub async fn create_quiz(&self, req: &CreateQuizRequest) -> Result<Quiz, AppError> {
        let quiz = self
            .store
            .insert_quiz(
                req.user_id,
                &req.title,
                req.description.as_deref(),
                req.question_count,
            )
            .await?;
        tracing::info!("Quiz {} created by user {}", quiz.id, req.user_id);
        Ok(quiz)
    }

    pub async fn get_quiz(&self, quiz_id: i64) -> Result<Quiz, AppError> {
        self.store
            .find_quiz(quiz_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Quiz not found".to_string()))
    }

    pub async fn update_quiz(
        &self,
        quiz_id: i64,
        req: &UpdateQuizRequest,
    ) -> Result<Quiz, AppError> {
        self.store
            .update_quiz(quiz_id, req.title.as_deref(), req.description.as_deref())
            .await?
            .ok_or_else(|| AppError::NotFound("Quiz not found".to_string()))
    }

    pub async fn list_quizzes(&self, page: &PageQuery) -> Result<QuizListResponse, AppError> {
        let (offset, page_size) = page_window(page);
        let (quizzes, total_count) = self.store.list_quizzes(offset, page_size as i64).await?;
        Ok(QuizListResponse {
            total_count,
            page: page.page,
            page_size,
            quizzes: quizzes
                .into_iter()
                .map(|q| QuizSummary {
                    id: q.id,
                    title: q.title,
                    description: q.description,
                })
                .collect(),
        })
    }

    pub async fn create_question(
        &self,
        quiz_id: i64,
        req: &CreateQuestionRequest,
    ) -> Result<Question, AppError> {
        self.get_quiz(quiz_id).await?;
        Ok(self.store.insert_question(quiz_id, &req.text).await?)
    }

    pub async fn create_choice(
        &self,
        question_id: i64,
        req: &CreateChoiceRequest,
    ) -> Result<Choice, AppError> {
        self.store
            .find_question(question_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Question not found".to_string()))?;
        Ok(self
            .store
            .insert_choice(question_id, &req.text, req.is_correct)
            .await?)
    }

    /// Admin listing of a quiz's questions with their choices,
    /// including `is_correct`. Not reachable from the attempt flow.
    pub async fn list_quiz_questions(
        &self,
        quiz_id: i64,
        page: &PageQuery,
    ) -> Result<QuestionListResponse, AppError> {
        self.get_quiz(quiz_id).await?;
        let (offset, page_size) = page_window(page);
        let (questions, total_count) = self
            .store
            .list_questions_page(quiz_id, offset, page_size as i64)
            .await?;

        let mut out = Vec::with_capacity(questions.len());
        for question in questions {
            let choices = self.store.list_choices(question.id).await?;
            out.push(QuestionWithChoices {
                id: question.id,
                quiz_id: question.quiz_id,
                text: question.text,
                order: question.order,
                choices,
            });
        }

        Ok(QuestionListResponse {
            total_count,
            page: page.page,
            page_size,
            questions: out,
        })
    }

    pub async fn register_user(
        &self,
        quiz_id: i64,
        user_id: i64,
    ) -> Result<UserQuizRegistration, AppError> {
        self.get_quiz(quiz_id).await?;
        self.store
            .insert_registration(user_id, quiz_id)
            .await
            .map_err(|e| match e {
                StoreError::Duplicate(_) => AppError::Conflict(
                    "User is already registered for this quiz".to_string(),
                ),
                other => other.into(),
            })
    }

    /// The strict attempt-creation path: requires a prior registration
    /// and rejects a second attempt for the same (user, quiz). The
    /// session flow's `start_attempt` deliberately does neither.
    pub async fn register_attempt(
        &self,
        quiz_id: i64,
        user_id: i64,
    ) -> Result<UserQuizAttempt, AppError> {
        self.get_quiz(quiz_id).await?;

        if self
            .store
            .find_registration(user_id, quiz_id)
            .await?
            .is_none()
        {
            return Err(AppError::Conflict(
                "User is not registered for this quiz".to_string(),
            ));
        }

        if self
            .store
            .find_attempt_for(user_id, quiz_id)
            .await?
            .is_some()
        {
            return Err(AppError::Conflict(
                "User has already attempted this quiz".to_string(),
            ));
        }

        Ok(self.store.insert_attempt(user_id, quiz_id).await?)
    }

    /// Per registered quiz: whether the user has attempted it yet.
    pub async fn quiz_statuses(&self, user_id: i64) -> Result<Vec<QuizStatus>, AppError> {
        let registered = self.store.list_registrations(user_id).await?;
        let attempted: HashSet<i64> = self
            .store
            .list_attempts(user_id)
            .await?
            .into_iter()
            .map(|a| a.quiz_id)
            .collect();

        Ok(registered
            .into_iter()
            .map(|r| QuizStatus {
                quiz_id: r.quiz_id,
                registered: true,
                attempted: attempted.contains(&r.quiz_id),
            })
            .collect())
    }

    /// Structural sanity check run by administrators before exposing a
    /// quiz to attempts. Fails closed; the reason names the first
    /// offending question. A query, never an error.
    pub async fn validate(&self, quiz_id: i64) -> Result<ValidationReport, AppError> {
        let Some(_) = self.store.find_quiz(quiz_id).await? else {
            return Ok(ValidationReport {
                valid: false,
                reason: "Quiz does not exist".to_string(),
            });
        };

        let questions = self.store.list_questions(quiz_id).await?;
        if questions.is_empty() {
            return Ok(ValidationReport {
                valid: false,
                reason: "Quiz has no questions".to_string(),
            });
        }

        for question in &questions {
            let choices = self.store.list_choices(question.id).await?;
            if choices.len() < 2 {
                return Ok(ValidationReport {
                    valid: false,
                    reason: format!("Question {} has fewer than 2 choices", question.id),
                });
            }
            if !choices.iter().any(|c| c.is_correct) {
                return Ok(ValidationReport {
                    valid: false,
                    reason: format!("Question {} has no correct choice", question.id),
                });
            }
        }

        Ok(ValidationReport {
            valid: true,
            reason: "Quiz is well-formed".to_string(),
        })
    }

    /// Seeds a full-size sample quiz: 100 questions of 5 choices each,
    /// with the first choice correct. Used by the end-to-end scenario.
    pub async fn seed_sample_quiz(
        &self,
        title: &str,
        description: Option<&str>,
        user_id: i64,
    ) -> Result<Quiz, AppError> {
        let quiz = self
            .store
            .insert_quiz(user_id, title, description, None)
            .await?;

        for i in 1..=SAMPLE_QUESTIONS {
            let question = self
                .store
                .insert_question(quiz.id, &format!("Question {}", i))
                .await?;
            for j in 1..=SAMPLE_CHOICES {
                self.store
                    .insert_choice(
                        question.id,
                        &format!("Question {} choice {}", i, j),
                        j == 1,
                    )
                    .await?;
            }
        }

        tracing::info!(
            "Sample quiz {} seeded with {}x{} questions/choices",
            quiz.id,
            SAMPLE_QUESTIONS,
            SAMPLE_CHOICES
        );
        Ok(quiz)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;

    #[test]
    fn page_window_caps_size_and_saturates_offset() {
        let huge = PageQuery {
            page: u64::MAX,
            page_size: 2,
        };
        assert_eq!(page_window(&huge), (u64::MAX, 2));

        let oversized = PageQuery {
            page: 1,
            page_size: 10_000,
        };
        assert_eq!(page_window(&oversized), (MAX_PAGE_SIZE, MAX_PAGE_SIZE));
    }

    #[tokio::test]
    async fn out_of_range_page_yields_empty_list() {
        let service = QuizService::with_store(Arc::new(InMemoryStore::new()));
        service
            .create_quiz(&CreateQuizRequest {
                user_id: 1,
                title: "Only".to_string(),
                description: None,
                question_count: None,
            })
            .await
            .unwrap();

        let list = service
            .list_quizzes(&PageQuery {
                page: u64::MAX,
                page_size: 2,
            })
            .await
            .unwrap();
        assert_eq!(list.total_count, 1);
        assert!(list.quizzes.is_empty());
    }
}
