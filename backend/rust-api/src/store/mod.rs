use async_trait::async_trait;

use crate::models::{
    Choice, Question, Quiz, UserQuizAttempt, UserQuizAttemptAnswer, UserQuizRegistration,
    UserQuizScore,
};

pub mod memory;
pub mod mongo;

/// Errors a store backend can surface. Uniqueness violations are the
/// only kind callers branch on (they become HTTP 409); everything else
/// fails the request closed.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("duplicate key: {0}")]
    Duplicate(String),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// The durable store collaborator: point lookups, inserts, and
/// paginated list queries over the quiz entities. Injected through
/// `AppState` so the session services are testable against an
/// in-memory fake.
///
/// Order values for questions and choices are assigned inside the
/// insert from a per-parent atomic sequence, never read-max-then-write,
/// so two concurrent inserts cannot collide.
#[async_trait]
pub trait QuizStore: Send + Sync {
    async fn ping(&self) -> StoreResult<()>;

    // Quizzes
    async fn insert_quiz(
        &self,
        user_id: i64,
        title: &str,
        description: Option<&str>,
        question_count: Option<u32>,
    ) -> StoreResult<Quiz>;
    async fn find_quiz(&self, quiz_id: i64) -> StoreResult<Option<Quiz>>;
    async fn update_quiz(
        &self,
        quiz_id: i64,
        title: Option<&str>,
        description: Option<&str>,
    ) -> StoreResult<Option<Quiz>>;
    async fn list_quizzes(&self, offset: u64, limit: i64) -> StoreResult<(Vec<Quiz>, u64)>;

    // Questions & choices
    async fn insert_question(&self, quiz_id: i64, text: &str) -> StoreResult<Question>;
    async fn find_question(&self, question_id: i64) -> StoreResult<Option<Question>>;
    /// All questions of a quiz in primary-key order.
    async fn list_questions(&self, quiz_id: i64) -> StoreResult<Vec<Question>>;
    async fn list_questions_page(
        &self,
        quiz_id: i64,
        offset: u64,
        limit: i64,
    ) -> StoreResult<(Vec<Question>, u64)>;
    async fn insert_choice(
        &self,
        question_id: i64,
        text: &str,
        is_correct: bool,
    ) -> StoreResult<Choice>;
    /// All choices of a question in primary-key order.
    async fn list_choices(&self, question_id: i64) -> StoreResult<Vec<Choice>>;
    async fn find_choice(&self, choice_id: i64) -> StoreResult<Option<Choice>>;

    // Registrations
    async fn insert_registration(
        &self,
        user_id: i64,
        quiz_id: i64,
    ) -> StoreResult<UserQuizRegistration>;
    async fn find_registration(
        &self,
        user_id: i64,
        quiz_id: i64,
    ) -> StoreResult<Option<UserQuizRegistration>>;
    async fn list_registrations(&self, user_id: i64) -> StoreResult<Vec<UserQuizRegistration>>;

    // Attempts
    async fn insert_attempt(&self, user_id: i64, quiz_id: i64) -> StoreResult<UserQuizAttempt>;
    async fn find_attempt(&self, attempt_id: i64) -> StoreResult<Option<UserQuizAttempt>>;
    async fn find_attempt_for(
        &self,
        user_id: i64,
        quiz_id: i64,
    ) -> StoreResult<Option<UserQuizAttempt>>;
    async fn list_attempts(&self, user_id: i64) -> StoreResult<Vec<UserQuizAttempt>>;
    /// Atomically flips `is_submit` from false to true. Returns false
    /// when the attempt was already submitted; the caller treats that
    /// as a Conflict, so two concurrent submissions cannot both score.
    async fn claim_attempt_submission(&self, attempt_id: i64) -> StoreResult<bool>;

    // Submission records
    async fn insert_attempt_question(&self, attempt_id: i64, question_id: i64) -> StoreResult<()>;
    async fn insert_attempt_answer(&self, answer: &UserQuizAttemptAnswer) -> StoreResult<()>;
    async fn insert_score(&self, score: &UserQuizScore) -> StoreResult<()>;
}
