//! Service-level coverage of the attempt session protocol, driven
//! against the in-memory store and cache so expiry and trust-boundary
//! edge cases can be staged directly.

use std::sync::Arc;

use quizstage_api::{
    cache::{answers_key, memory::InMemoryCache, snapshot_key, SessionCache},
    error::AppError,
    models::attempt::{AnswerRequest, SubmissionRequest, SubmittedChoice, SubmittedQuestion},
    services::{attempt_service::AttemptService, scoring_service::ScoringService},
    store::{memory::InMemoryStore, QuizStore},
};

struct SeededQuestion {
    id: i64,
    correct_choice: i64,
    wrong_choice: i64,
}

async fn seed_quiz(store: &InMemoryStore, questions: usize) -> (i64, Vec<SeededQuestion>) {
    let quiz = store.insert_quiz(1, "Seeded", None, None).await.unwrap();
    let mut seeded = Vec::with_capacity(questions);
    for i in 0..questions {
        let question = store
            .insert_question(quiz.id, &format!("Q{}", i))
            .await
            .unwrap();
        let correct = store
            .insert_choice(question.id, "right", true)
            .await
            .unwrap();
        let wrong = store
            .insert_choice(question.id, "wrong", false)
            .await
            .unwrap();
        seeded.push(SeededQuestion {
            id: question.id,
            correct_choice: correct.id,
            wrong_choice: wrong.id,
        });
    }
    (quiz.id, seeded)
}

fn submission_selecting(
    questions: &[SeededQuestion],
    pick: impl Fn(&SeededQuestion) -> Option<i64>,
) -> SubmissionRequest {
    SubmissionRequest {
        questions: questions
            .iter()
            .map(|q| {
                let selected = pick(q);
                SubmittedQuestion {
                    id: q.id,
                    choices: [q.correct_choice, q.wrong_choice]
                        .into_iter()
                        .map(|id| SubmittedChoice {
                            id,
                            is_selected: selected == Some(id),
                        })
                        .collect(),
                }
            })
            .collect(),
    }
}

#[tokio::test]
async fn resume_fails_once_snapshot_expired() {
    let store = Arc::new(InMemoryStore::new());
    let cache = Arc::new(InMemoryCache::new());
    let attempts = AttemptService::with_parts(store.clone(), cache.clone());

    let (quiz_id, _) = seed_quiz(&store, 1).await;
    let started = attempts.start_attempt(3, quiz_id, None).await.unwrap();

    // Force the staged snapshot past its deadline.
    let key = snapshot_key(quiz_id, started.attempt_id);
    let payload = cache.get(&key).await.unwrap().unwrap();
    cache.set_ex(&key, &payload, 0).await.unwrap();

    let err = attempts
        .resume_attempt(quiz_id, started.attempt_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn answer_deadline_is_set_once_and_never_extended() {
    let store = Arc::new(InMemoryStore::new());
    let cache = Arc::new(InMemoryCache::new());
    let attempts = AttemptService::with_parts(store.clone(), cache.clone());

    let (quiz_id, questions) = seed_quiz(&store, 2).await;
    let started = attempts.start_attempt(3, quiz_id, None).await.unwrap();
    let key = answers_key(quiz_id, started.attempt_id);

    attempts
        .record_answer(
            quiz_id,
            started.attempt_id,
            &AnswerRequest {
                question_id: questions[0].id,
                selected_choice_id: questions[0].correct_choice,
            },
        )
        .await
        .unwrap();
    let first_deadline = cache.ttl(&key).await.unwrap();
    assert!(first_deadline > 0 && first_deadline <= 1200);

    // Shrink the deadline, then answer again: the second write must not
    // push it back out.
    cache.expire(&key, 7).await.unwrap();
    attempts
        .record_answer(
            quiz_id,
            started.attempt_id,
            &AnswerRequest {
                question_id: questions[1].id,
                selected_choice_id: questions[1].wrong_choice,
            },
        )
        .await
        .unwrap();
    assert!(cache.ttl(&key).await.unwrap() <= 7);
}

#[tokio::test]
async fn resume_accepts_legacy_bare_list_snapshot() {
    let store = Arc::new(InMemoryStore::new());
    let cache = Arc::new(InMemoryCache::new());
    let attempts = AttemptService::with_parts(store.clone(), cache.clone());

    let (quiz_id, _) = seed_quiz(&store, 1).await;
    let attempt = store.insert_attempt(3, quiz_id).await.unwrap();

    // Older writers staged the question list without the wrapping
    // object.
    let legacy = serde_json::json!([
        { "id": 10, "text": "legacy", "choices": [
            { "id": 20, "text": "a" },
            { "id": 21, "text": "b" }
        ]}
    ]);
    cache
        .set_ex(&snapshot_key(quiz_id, attempt.id), &legacy.to_string(), 60)
        .await
        .unwrap();

    attempts
        .record_answer(
            quiz_id,
            attempt.id,
            &AnswerRequest {
                question_id: 10,
                selected_choice_id: 21,
            },
        )
        .await
        .unwrap();

    let annotated = attempts.resume_attempt(quiz_id, attempt.id).await.unwrap();
    assert_eq!(annotated.title, None);
    assert_eq!(annotated.questions.len(), 1);
    let selections: Vec<bool> = annotated.questions[0]
        .choices
        .iter()
        .map(|c| c.is_selected)
        .collect();
    assert_eq!(selections, vec![false, true]);
}

#[tokio::test]
async fn resume_rejects_empty_legacy_snapshot() {
    let store = Arc::new(InMemoryStore::new());
    let cache = Arc::new(InMemoryCache::new());
    let attempts = AttemptService::with_parts(store.clone(), cache.clone());

    let (quiz_id, _) = seed_quiz(&store, 1).await;
    let attempt = store.insert_attempt(3, quiz_id).await.unwrap();
    cache
        .set_ex(&snapshot_key(quiz_id, attempt.id), "[]", 60)
        .await
        .unwrap();

    let err = attempts.resume_attempt(quiz_id, attempt.id).await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
}

#[tokio::test]
async fn server_side_answers_override_client_asserted_selections() {
    let store = Arc::new(InMemoryStore::new());
    let cache = Arc::new(InMemoryCache::new());
    let attempts = AttemptService::with_parts(store.clone(), cache.clone());
    let scoring = ScoringService::with_parts(store.clone(), cache.clone());

    let (quiz_id, questions) = seed_quiz(&store, 2).await;
    let started = attempts.start_attempt(3, quiz_id, None).await.unwrap();

    // The user actually recorded the wrong choice on both questions.
    for q in &questions {
        attempts
            .record_answer(
                quiz_id,
                started.attempt_id,
                &AnswerRequest {
                    question_id: q.id,
                    selected_choice_id: q.wrong_choice,
                },
            )
            .await
            .unwrap();
    }

    // The submission claims the correct choices were picked.
    let forged = submission_selecting(&questions, |q| Some(q.correct_choice));
    let report = scoring
        .submit_attempt(quiz_id, started.attempt_id, &forged)
        .await
        .unwrap();
    assert_eq!(report.score, 0);
    assert_eq!(report.total, 2);
}

#[tokio::test]
async fn client_selections_stand_when_answer_map_expired() {
    let store = Arc::new(InMemoryStore::new());
    let cache = Arc::new(InMemoryCache::new());
    let attempts = AttemptService::with_parts(store.clone(), cache.clone());
    let scoring = ScoringService::with_parts(store.clone(), cache.clone());

    let (quiz_id, questions) = seed_quiz(&store, 2).await;
    let started = attempts.start_attempt(3, quiz_id, None).await.unwrap();

    // No answer map in the cache at submission time.
    cache
        .del(&answers_key(quiz_id, started.attempt_id))
        .await
        .unwrap();

    let submission = submission_selecting(&questions, |q| Some(q.correct_choice));
    let report = scoring
        .submit_attempt(quiz_id, started.attempt_id, &submission)
        .await
        .unwrap();
    assert_eq!(report.score, 2);
    assert_eq!(report.total, 2);
}

#[tokio::test]
async fn unanswered_question_scores_nothing_while_map_is_live() {
    let store = Arc::new(InMemoryStore::new());
    let cache = Arc::new(InMemoryCache::new());
    let attempts = AttemptService::with_parts(store.clone(), cache.clone());
    let scoring = ScoringService::with_parts(store.clone(), cache.clone());

    let (quiz_id, questions) = seed_quiz(&store, 2).await;
    let started = attempts.start_attempt(3, quiz_id, None).await.unwrap();

    // Only the first question is answered (correctly). The map exists,
    // so the client's claim about the second question is ignored.
    attempts
        .record_answer(
            quiz_id,
            started.attempt_id,
            &AnswerRequest {
                question_id: questions[0].id,
                selected_choice_id: questions[0].correct_choice,
            },
        )
        .await
        .unwrap();

    let submission = submission_selecting(&questions, |q| Some(q.correct_choice));
    let report = scoring
        .submit_attempt(quiz_id, started.attempt_id, &submission)
        .await
        .unwrap();
    assert_eq!(report.score, 1);
}

#[tokio::test]
async fn second_submission_is_rejected() {
    let store = Arc::new(InMemoryStore::new());
    let cache = Arc::new(InMemoryCache::new());
    let attempts = AttemptService::with_parts(store.clone(), cache.clone());
    let scoring = ScoringService::with_parts(store.clone(), cache.clone());

    let (quiz_id, questions) = seed_quiz(&store, 1).await;
    let started = attempts.start_attempt(3, quiz_id, None).await.unwrap();

    let submission = submission_selecting(&questions, |_| None);
    scoring
        .submit_attempt(quiz_id, started.attempt_id, &submission)
        .await
        .unwrap();

    let err = scoring
        .submit_attempt(quiz_id, started.attempt_id, &submission)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn duplicate_question_in_payload_is_rejected() {
    let store = Arc::new(InMemoryStore::new());
    let cache = Arc::new(InMemoryCache::new());
    let attempts = AttemptService::with_parts(store.clone(), cache.clone());
    let scoring = ScoringService::with_parts(store.clone(), cache.clone());

    let (quiz_id, questions) = seed_quiz(&store, 1).await;
    let started = attempts.start_attempt(3, quiz_id, None).await.unwrap();

    let mut submission = submission_selecting(&questions, |_| None);
    let duplicate = SubmittedQuestion {
        id: questions[0].id,
        choices: vec![],
    };
    submission.questions.push(duplicate);

    let err = scoring
        .submit_attempt(quiz_id, started.attempt_id, &submission)
        .await
        .unwrap_err();
    match err {
        AppError::Conflict(msg) => {
            assert!(msg.contains(&questions[0].id.to_string()), "message: {}", msg)
        }
        other => panic!("expected Conflict, got {:?}", other),
    }
}

#[tokio::test]
async fn partial_submission_totals_only_submitted_questions() {
    let store = Arc::new(InMemoryStore::new());
    let cache = Arc::new(InMemoryCache::new());
    let attempts = AttemptService::with_parts(store.clone(), cache.clone());
    let scoring = ScoringService::with_parts(store.clone(), cache.clone());

    let (quiz_id, questions) = seed_quiz(&store, 5).await;
    let started = attempts.start_attempt(3, quiz_id, None).await.unwrap();

    for q in &questions[..2] {
        attempts
            .record_answer(
                quiz_id,
                started.attempt_id,
                &AnswerRequest {
                    question_id: q.id,
                    selected_choice_id: q.correct_choice,
                },
            )
            .await
            .unwrap();
    }

    let submission = submission_selecting(&questions[..2], |_| None);
    let report = scoring
        .submit_attempt(quiz_id, started.attempt_id, &submission)
        .await
        .unwrap();
    assert_eq!(report.total, 2);
    assert_eq!(report.score, 2);
}

#[tokio::test]
async fn submission_for_unknown_attempt_is_not_found() {
    let store = Arc::new(InMemoryStore::new());
    let cache = Arc::new(InMemoryCache::new());
    let scoring = ScoringService::with_parts(store.clone(), cache.clone());

    let (quiz_id, _) = seed_quiz(&store, 1).await;
    let err = scoring
        .submit_attempt(quiz_id, 999, &SubmissionRequest { questions: vec![] })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}
