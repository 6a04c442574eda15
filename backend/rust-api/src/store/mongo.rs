use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::{
    bson::doc,
    options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument},
    Collection, Database,
};
use serde::Deserialize;

use super::{QuizStore, StoreError, StoreResult};
use crate::models::{
    Choice, Question, Quiz, UserQuizAttempt, UserQuizAttemptAnswer, UserQuizAttemptQuestion,
    UserQuizRegistration, UserQuizScore,
};

const QUIZZES: &str = "quizzes";
const QUESTIONS: &str = "questions";
const CHOICES: &str = "choices";
const REGISTRATIONS: &str = "user_quiz_registrations";
const ATTEMPTS: &str = "user_quiz_attempts";
const ATTEMPT_QUESTIONS: &str = "user_quiz_attempt_questions";
const ATTEMPT_ANSWERS: &str = "user_quiz_attempt_answers";
const SCORES: &str = "user_quiz_scores";
const COUNTERS: &str = "counters";

#[derive(Debug, Deserialize)]
struct CounterDoc {
    #[serde(rename = "_id")]
    #[allow(dead_code)]
    id: String,
    seq: i64,
}

/// MongoDB-backed durable store. Numeric ids and per-parent order
/// values come from the `counters` collection via an atomic
/// `findOneAndUpdate` + `$inc` upsert, so sequences survive restarts
/// and are never handed out twice.
pub struct MongoQuizStore {
    db: Database,
}

impl MongoQuizStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    async fn next_seq(&self, name: &str) -> StoreResult<i64> {
        let counters: Collection<CounterDoc> = self.db.collection(COUNTERS);
        let counter = counters
            .find_one_and_update(doc! { "_id": name }, doc! { "$inc": { "seq": 1i64 } })
            .with_options(
                FindOneAndUpdateOptions::builder()
                    .upsert(true)
                    .return_document(ReturnDocument::After)
                    .build(),
            )
            .await
            .with_context(|| format!("Failed to advance counter {}", name))?
            .ok_or_else(|| anyhow!("Counter upsert for {} returned no document", name))?;
        Ok(counter.seq)
    }
}

/// Maps a Mongo write error to `StoreError::Duplicate` when it is an
/// E11000 duplicate-key violation.
fn map_write_err(e: mongodb::error::Error, key: String, what: &str) -> StoreError {
    if let mongodb::error::ErrorKind::Write(mongodb::error::WriteFailure::WriteError(ref we)) =
        *e.kind
    {
        if we.code == 11000 {
            return StoreError::Duplicate(key);
        }
    }
    StoreError::Backend(anyhow::Error::new(e).context(format!("Failed to insert {}", what)))
}

#[async_trait]
impl QuizStore for MongoQuizStore {
    async fn ping(&self) -> StoreResult<()> {
        self.db
            .run_command(doc! { "ping": 1 })
            .await
            .context("MongoDB ping failed")?;
        Ok(())
    }

    async fn insert_quiz(
        &self,
        user_id: i64,
        title: &str,
        description: Option<&str>,
        question_count: Option<u32>,
    ) -> StoreResult<Quiz> {
        let quiz = Quiz {
            id: self.next_seq(QUIZZES).await?,
            user_id,
            title: title.to_string(),
            description: description.map(str::to_string),
            question_count,
        };
        let collection: Collection<Quiz> = self.db.collection(QUIZZES);
        collection
            .insert_one(&quiz)
            .await
            .map_err(|e| map_write_err(e, quiz.id.to_string(), "quiz"))?;
        Ok(quiz)
    }

    async fn find_quiz(&self, quiz_id: i64) -> StoreResult<Option<Quiz>> {
        let collection: Collection<Quiz> = self.db.collection(QUIZZES);
        Ok(collection
            .find_one(doc! { "_id": quiz_id })
            .await
            .context("Failed to query quiz")?)
    }

    async fn update_quiz(
        &self,
        quiz_id: i64,
        title: Option<&str>,
        description: Option<&str>,
    ) -> StoreResult<Option<Quiz>> {
        let mut set = doc! {};
        if let Some(title) = title {
            set.insert("title", title);
        }
        if let Some(description) = description {
            set.insert("description", description);
        }
        if set.is_empty() {
            return self.find_quiz(quiz_id).await;
        }

        let collection: Collection<Quiz> = self.db.collection(QUIZZES);
        Ok(collection
            .find_one_and_update(doc! { "_id": quiz_id }, doc! { "$set": set })
            .with_options(
                FindOneAndUpdateOptions::builder()
                    .return_document(ReturnDocument::After)
                    .build(),
            )
            .await
            .context("Failed to update quiz")?)
    }

    async fn list_quizzes(&self, offset: u64, limit: i64) -> StoreResult<(Vec<Quiz>, u64)> {
        let collection: Collection<Quiz> = self.db.collection(QUIZZES);
        let total = collection
            .count_documents(doc! {})
            .await
            .context("Failed to count quizzes")?;
        let cursor = collection
            .find(doc! {})
            .with_options(
                FindOptions::builder()
                    .sort(doc! { "_id": 1 })
                    .skip(offset)
                    .limit(limit)
                    .build(),
            )
            .await
            .context("Failed to list quizzes")?;
        let quizzes = cursor
            .try_collect()
            .await
            .context("Failed to collect quizzes")?;
        Ok((quizzes, total))
    }

    async fn insert_question(&self, quiz_id: i64, text: &str) -> StoreResult<Question> {
        let order = self.next_seq(&format!("questions:{}:order", quiz_id)).await? as u32;
        let question = Question {
            id: self.next_seq(QUESTIONS).await?,
            quiz_id,
            text: text.to_string(),
            order,
        };
        let collection: Collection<Question> = self.db.collection(QUESTIONS);
        collection
            .insert_one(&question)
            .await
            .map_err(|e| map_write_err(e, question.id.to_string(), "question"))?;
        Ok(question)
    }

    async fn find_question(&self, question_id: i64) -> StoreResult<Option<Question>> {
        let collection: Collection<Question> = self.db.collection(QUESTIONS);
        Ok(collection
            .find_one(doc! { "_id": question_id })
            .await
            .context("Failed to query question")?)
    }

    async fn list_questions(&self, quiz_id: i64) -> StoreResult<Vec<Question>> {
        let collection: Collection<Question> = self.db.collection(QUESTIONS);
        let cursor = collection
            .find(doc! { "quiz_id": quiz_id })
            .with_options(FindOptions::builder().sort(doc! { "_id": 1 }).build())
            .await
            .context("Failed to list questions")?;
        Ok(cursor
            .try_collect()
            .await
            .context("Failed to collect questions")?)
    }

    async fn list_questions_page(
        &self,
        quiz_id: i64,
        offset: u64,
        limit: i64,
    ) -> StoreResult<(Vec<Question>, u64)> {
        let collection: Collection<Question> = self.db.collection(QUESTIONS);
        let total = collection
            .count_documents(doc! { "quiz_id": quiz_id })
            .await
            .context("Failed to count questions")?;
        let cursor = collection
            .find(doc! { "quiz_id": quiz_id })
            .with_options(
                FindOptions::builder()
                    .sort(doc! { "_id": 1 })
                    .skip(offset)
                    .limit(limit)
                    .build(),
            )
            .await
            .context("Failed to list questions")?;
        let questions = cursor
            .try_collect()
            .await
            .context("Failed to collect questions")?;
        Ok((questions, total))
    }

    async fn insert_choice(
        &self,
        question_id: i64,
        text: &str,
        is_correct: bool,
    ) -> StoreResult<Choice> {
        let order = self
            .next_seq(&format!("choices:{}:order", question_id))
            .await? as u32;
        let choice = Choice {
            id: self.next_seq(CHOICES).await?,
            question_id,
            text: text.to_string(),
            is_correct,
            order,
        };
        let collection: Collection<Choice> = self.db.collection(CHOICES);
        collection
            .insert_one(&choice)
            .await
            .map_err(|e| map_write_err(e, choice.id.to_string(), "choice"))?;
        Ok(choice)
    }

    async fn list_choices(&self, question_id: i64) -> StoreResult<Vec<Choice>> {
        let collection: Collection<Choice> = self.db.collection(CHOICES);
        let cursor = collection
            .find(doc! { "question_id": question_id })
            .with_options(FindOptions::builder().sort(doc! { "_id": 1 }).build())
            .await
            .context("Failed to list choices")?;
        Ok(cursor
            .try_collect()
            .await
            .context("Failed to collect choices")?)
    }

    async fn find_choice(&self, choice_id: i64) -> StoreResult<Option<Choice>> {
        let collection: Collection<Choice> = self.db.collection(CHOICES);
        Ok(collection
            .find_one(doc! { "_id": choice_id })
            .await
            .context("Failed to query choice")?)
    }

    async fn insert_registration(
        &self,
        user_id: i64,
        quiz_id: i64,
    ) -> StoreResult<UserQuizRegistration> {
        let registration = UserQuizRegistration {
            id: UserQuizRegistration::key(user_id, quiz_id),
            user_id,
            quiz_id,
            registered_at: Utc::now(),
        };
        let collection: Collection<UserQuizRegistration> = self.db.collection(REGISTRATIONS);
        collection
            .insert_one(&registration)
            .await
            .map_err(|e| map_write_err(e, registration.id.clone(), "registration"))?;
        Ok(registration)
    }

    async fn find_registration(
        &self,
        user_id: i64,
        quiz_id: i64,
    ) -> StoreResult<Option<UserQuizRegistration>> {
        let collection: Collection<UserQuizRegistration> = self.db.collection(REGISTRATIONS);
        Ok(collection
            .find_one(doc! { "_id": UserQuizRegistration::key(user_id, quiz_id) })
            .await
            .context("Failed to query registration")?)
    }

    async fn list_registrations(&self, user_id: i64) -> StoreResult<Vec<UserQuizRegistration>> {
        let collection: Collection<UserQuizRegistration> = self.db.collection(REGISTRATIONS);
        let cursor = collection
            .find(doc! { "user_id": user_id })
            .with_options(FindOptions::builder().sort(doc! { "quiz_id": 1 }).build())
            .await
            .context("Failed to list registrations")?;
        Ok(cursor
            .try_collect()
            .await
            .context("Failed to collect registrations")?)
    }

    async fn insert_attempt(&self, user_id: i64, quiz_id: i64) -> StoreResult<UserQuizAttempt> {
        let attempt = UserQuizAttempt {
            id: self.next_seq(ATTEMPTS).await?,
            user_id,
            quiz_id,
            attempted_at: Utc::now(),
            is_submit: false,
        };
        let collection: Collection<UserQuizAttempt> = self.db.collection(ATTEMPTS);
        collection
            .insert_one(&attempt)
            .await
            .map_err(|e| map_write_err(e, attempt.id.to_string(), "attempt"))?;
        Ok(attempt)
    }

    async fn find_attempt(&self, attempt_id: i64) -> StoreResult<Option<UserQuizAttempt>> {
        let collection: Collection<UserQuizAttempt> = self.db.collection(ATTEMPTS);
        Ok(collection
            .find_one(doc! { "_id": attempt_id })
            .await
            .context("Failed to query attempt")?)
    }

    async fn find_attempt_for(
        &self,
        user_id: i64,
        quiz_id: i64,
    ) -> StoreResult<Option<UserQuizAttempt>> {
        let collection: Collection<UserQuizAttempt> = self.db.collection(ATTEMPTS);
        Ok(collection
            .find_one(doc! { "user_id": user_id, "quiz_id": quiz_id })
            .await
            .context("Failed to query attempt")?)
    }

    async fn list_attempts(&self, user_id: i64) -> StoreResult<Vec<UserQuizAttempt>> {
        let collection: Collection<UserQuizAttempt> = self.db.collection(ATTEMPTS);
        let cursor = collection
            .find(doc! { "user_id": user_id })
            .with_options(FindOptions::builder().sort(doc! { "_id": 1 }).build())
            .await
            .context("Failed to list attempts")?;
        Ok(cursor
            .try_collect()
            .await
            .context("Failed to collect attempts")?)
    }

    async fn claim_attempt_submission(&self, attempt_id: i64) -> StoreResult<bool> {
        let collection: Collection<UserQuizAttempt> = self.db.collection(ATTEMPTS);
        let claimed = collection
            .find_one_and_update(
                doc! { "_id": attempt_id, "is_submit": false },
                doc! { "$set": { "is_submit": true } },
            )
            .await
            .context("Failed to claim attempt submission")?;
        Ok(claimed.is_some())
    }

    async fn insert_attempt_question(&self, attempt_id: i64, question_id: i64) -> StoreResult<()> {
        let record = UserQuizAttemptQuestion {
            id: UserQuizAttemptQuestion::key(attempt_id, question_id),
            attempt_id,
            question_id,
        };
        let collection: Collection<UserQuizAttemptQuestion> =
            self.db.collection(ATTEMPT_QUESTIONS);
        collection
            .insert_one(&record)
            .await
            .map_err(|e| map_write_err(e, record.id.clone(), "attempt question"))?;
        Ok(())
    }

    async fn insert_attempt_answer(&self, answer: &UserQuizAttemptAnswer) -> StoreResult<()> {
        let collection: Collection<UserQuizAttemptAnswer> = self.db.collection(ATTEMPT_ANSWERS);
        collection
            .insert_one(answer)
            .await
            .map_err(|e| {
                map_write_err(
                    e,
                    format!("{}:{}", answer.attempt_id, answer.choice_id),
                    "attempt answer",
                )
            })?;
        Ok(())
    }

    async fn insert_score(&self, score: &UserQuizScore) -> StoreResult<()> {
        let collection: Collection<UserQuizScore> = self.db.collection(SCORES);
        collection
            .insert_one(score)
            .await
            .map_err(|e| map_write_err(e, score.attempt_id.to_string(), "score"))?;
        Ok(())
    }
}
