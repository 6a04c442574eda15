use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use super::{QuizStore, StoreError, StoreResult};
use crate::models::{
    Choice, Question, Quiz, UserQuizAttempt, UserQuizAttemptAnswer, UserQuizAttemptQuestion,
    UserQuizRegistration, UserQuizScore,
};

#[derive(Default)]
struct Inner {
    counters: HashMap<String, i64>,
    quizzes: BTreeMap<i64, Quiz>,
    questions: BTreeMap<i64, Question>,
    choices: BTreeMap<i64, Choice>,
    registrations: HashMap<String, UserQuizRegistration>,
    attempts: BTreeMap<i64, UserQuizAttempt>,
    attempt_questions: HashSet<String>,
    attempt_answers: Vec<UserQuizAttemptAnswer>,
    scores: HashMap<i64, UserQuizScore>,
}

impl Inner {
    fn next_seq(&mut self, name: &str) -> i64 {
        let counter = self.counters.entry(name.to_string()).or_insert(0);
        *counter += 1;
        *counter
    }
}

/// In-memory `QuizStore` with the same id/order sequencing and
/// uniqueness semantics as the Mongo backend. Backs the test suite and
/// store-less local runs.
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QuizStore for InMemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn insert_quiz(
        &self,
        user_id: i64,
        title: &str,
        description: Option<&str>,
        question_count: Option<u32>,
    ) -> StoreResult<Quiz> {
        let mut inner = self.inner.lock().unwrap();
        let quiz = Quiz {
            id: inner.next_seq("quizzes"),
            user_id,
            title: title.to_string(),
            description: description.map(str::to_string),
            question_count,
        };
        inner.quizzes.insert(quiz.id, quiz.clone());
        Ok(quiz)
    }

    async fn find_quiz(&self, quiz_id: i64) -> StoreResult<Option<Quiz>> {
        Ok(self.inner.lock().unwrap().quizzes.get(&quiz_id).cloned())
    }

    async fn update_quiz(
        &self,
        quiz_id: i64,
        title: Option<&str>,
        description: Option<&str>,
    ) -> StoreResult<Option<Quiz>> {
        let mut inner = self.inner.lock().unwrap();
        let Some(quiz) = inner.quizzes.get_mut(&quiz_id) else {
            return Ok(None);
        };
        if let Some(title) = title {
            quiz.title = title.to_string();
        }
        if let Some(description) = description {
            quiz.description = Some(description.to_string());
        }
        Ok(Some(quiz.clone()))
    }

    async fn list_quizzes(&self, offset: u64, limit: i64) -> StoreResult<(Vec<Quiz>, u64)> {
        let inner = self.inner.lock().unwrap();
        let total = inner.quizzes.len() as u64;
        let quizzes = inner
            .quizzes
            .values()
            .skip(offset as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect();
        Ok((quizzes, total))
    }

    async fn insert_question(&self, quiz_id: i64, text: &str) -> StoreResult<Question> {
        let mut inner = self.inner.lock().unwrap();
        let order = inner.next_seq(&format!("questions:{}:order", quiz_id)) as u32;
        let question = Question {
            id: inner.next_seq("questions"),
            quiz_id,
            text: text.to_string(),
            order,
        };
        inner.questions.insert(question.id, question.clone());
        Ok(question)
    }

    async fn find_question(&self, question_id: i64) -> StoreResult<Option<Question>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .questions
            .get(&question_id)
            .cloned())
    }

    async fn list_questions(&self, quiz_id: i64) -> StoreResult<Vec<Question>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .questions
            .values()
            .filter(|q| q.quiz_id == quiz_id)
            .cloned()
            .collect())
    }

    async fn list_questions_page(
        &self,
        quiz_id: i64,
        offset: u64,
        limit: i64,
    ) -> StoreResult<(Vec<Question>, u64)> {
        let inner = self.inner.lock().unwrap();
        let all: Vec<Question> = inner
            .questions
            .values()
            .filter(|q| q.quiz_id == quiz_id)
            .cloned()
            .collect();
        let total = all.len() as u64;
        let page = all
            .into_iter()
            .skip(offset as usize)
            .take(limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }

    async fn insert_choice(
        &self,
        question_id: i64,
        text: &str,
        is_correct: bool,
    ) -> StoreResult<Choice> {
        let mut inner = self.inner.lock().unwrap();
        let order = inner.next_seq(&format!("choices:{}:order", question_id)) as u32;
        let choice = Choice {
            id: inner.next_seq("choices"),
            question_id,
            text: text.to_string(),
            is_correct,
            order,
        };
        inner.choices.insert(choice.id, choice.clone());
        Ok(choice)
    }

    async fn list_choices(&self, question_id: i64) -> StoreResult<Vec<Choice>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .choices
            .values()
            .filter(|c| c.question_id == question_id)
            .cloned()
            .collect())
    }

    async fn find_choice(&self, choice_id: i64) -> StoreResult<Option<Choice>> {
        Ok(self.inner.lock().unwrap().choices.get(&choice_id).cloned())
    }

    async fn insert_registration(
        &self,
        user_id: i64,
        quiz_id: i64,
    ) -> StoreResult<UserQuizRegistration> {
        let mut inner = self.inner.lock().unwrap();
        let key = UserQuizRegistration::key(user_id, quiz_id);
        if inner.registrations.contains_key(&key) {
            return Err(StoreError::Duplicate(key));
        }
        let registration = UserQuizRegistration {
            id: key.clone(),
            user_id,
            quiz_id,
            registered_at: Utc::now(),
        };
        inner.registrations.insert(key, registration.clone());
        Ok(registration)
    }

    async fn find_registration(
        &self,
        user_id: i64,
        quiz_id: i64,
    ) -> StoreResult<Option<UserQuizRegistration>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .registrations
            .get(&UserQuizRegistration::key(user_id, quiz_id))
            .cloned())
    }

    async fn list_registrations(&self, user_id: i64) -> StoreResult<Vec<UserQuizRegistration>> {
        let inner = self.inner.lock().unwrap();
        let mut registrations: Vec<UserQuizRegistration> = inner
            .registrations
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        registrations.sort_by_key(|r| r.quiz_id);
        Ok(registrations)
    }

    async fn insert_attempt(&self, user_id: i64, quiz_id: i64) -> StoreResult<UserQuizAttempt> {
        let mut inner = self.inner.lock().unwrap();
        let attempt = UserQuizAttempt {
            id: inner.next_seq("user_quiz_attempts"),
            user_id,
            quiz_id,
            attempted_at: Utc::now(),
            is_submit: false,
        };
        inner.attempts.insert(attempt.id, attempt.clone());
        Ok(attempt)
    }

    async fn find_attempt(&self, attempt_id: i64) -> StoreResult<Option<UserQuizAttempt>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .attempts
            .get(&attempt_id)
            .cloned())
    }

    async fn find_attempt_for(
        &self,
        user_id: i64,
        quiz_id: i64,
    ) -> StoreResult<Option<UserQuizAttempt>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .attempts
            .values()
            .find(|a| a.user_id == user_id && a.quiz_id == quiz_id)
            .cloned())
    }

    async fn list_attempts(&self, user_id: i64) -> StoreResult<Vec<UserQuizAttempt>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .attempts
            .values()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn claim_attempt_submission(&self, attempt_id: i64) -> StoreResult<bool> {
        let mut inner = self.inner.lock().unwrap();
        match inner.attempts.get_mut(&attempt_id) {
            Some(attempt) if !attempt.is_submit => {
                attempt.is_submit = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn insert_attempt_question(&self, attempt_id: i64, question_id: i64) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let key = UserQuizAttemptQuestion::key(attempt_id, question_id);
        if !inner.attempt_questions.insert(key.clone()) {
            return Err(StoreError::Duplicate(key));
        }
        Ok(())
    }

    async fn insert_attempt_answer(&self, answer: &UserQuizAttemptAnswer) -> StoreResult<()> {
        self.inner
            .lock()
            .unwrap()
            .attempt_answers
            .push(answer.clone());
        Ok(())
    }

    async fn insert_score(&self, score: &UserQuizScore) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.scores.contains_key(&score.attempt_id) {
            return Err(StoreError::Duplicate(score.attempt_id.to_string()));
        }
        inner.scores.insert(score.attempt_id, score.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn question_order_is_monotone_per_quiz() {
        let store = InMemoryStore::new();
        let quiz = store.insert_quiz(1, "Quiz", None, None).await.unwrap();
        let other = store.insert_quiz(1, "Other", None, None).await.unwrap();

        let q1 = store.insert_question(quiz.id, "one").await.unwrap();
        let q2 = store.insert_question(quiz.id, "two").await.unwrap();
        let other_q = store.insert_question(other.id, "three").await.unwrap();

        assert_eq!(q1.order, 1);
        assert_eq!(q2.order, 2);
        // A sibling quiz has its own sequence.
        assert_eq!(other_q.order, 1);
    }

    #[tokio::test]
    async fn choice_order_is_monotone_per_question() {
        let store = InMemoryStore::new();
        let quiz = store.insert_quiz(1, "Quiz", None, None).await.unwrap();
        let question = store.insert_question(quiz.id, "q").await.unwrap();

        let orders: Vec<u32> = [
            store.insert_choice(question.id, "a", true).await.unwrap(),
            store.insert_choice(question.id, "b", false).await.unwrap(),
            store.insert_choice(question.id, "c", false).await.unwrap(),
        ]
        .iter()
        .map(|c| c.order)
        .collect();

        assert_eq!(orders, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let store = InMemoryStore::new();
        store.insert_registration(5, 9).await.unwrap();
        let err = store.insert_registration(5, 9).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
    }

    #[tokio::test]
    async fn claim_attempt_submission_is_single_shot() {
        let store = InMemoryStore::new();
        let attempt = store.insert_attempt(1, 1).await.unwrap();
        assert!(store.claim_attempt_submission(attempt.id).await.unwrap());
        assert!(!store.claim_attempt_submission(attempt.id).await.unwrap());
        // Unknown attempts are never claimable.
        assert!(!store.claim_attempt_submission(999).await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_attempt_question_is_rejected() {
        let store = InMemoryStore::new();
        store.insert_attempt_question(1, 2).await.unwrap();
        let err = store.insert_attempt_question(1, 2).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
    }
}
