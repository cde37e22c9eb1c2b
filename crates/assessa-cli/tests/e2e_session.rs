//! End-to-end session tests: engine over the in-memory store.
//!
//! These cover the full start → submit → statistics lifecycle, including
//! the guarantees that matter under concurrency and later bank edits.

use std::sync::Arc;

use serde_json::{json, Value};

use assessa_core::engine::{StartRequest, SubmitRequest};
use assessa_core::model::{QuestionBank, Survey};
use assessa_core::statistics::StatisticsFilter;
use assessa_core::traits::ResponseStore;
use assessa_core::{AssessmentEngine, EngineConfig, EngineError, ResubmitPolicy};
use assessa_store::{Entitlement, EntitlementKind, MemoryStore};

fn engine(store: &Arc<MemoryStore>, resubmission: ResubmitPolicy) -> AssessmentEngine {
    AssessmentEngine::new(
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        EngineConfig { resubmission },
    )
}

fn choice(id: &str, tags: &[&str]) -> Value {
    json!({
        "id": id,
        "text": format!("Question {id}"),
        "type": "single_choice",
        "options": ["A", "B", "C"],
        "correctAnswer": 1,
        "tags": tags,
    })
}

fn bank(id: &str, company: &str, questions: Vec<Value>) -> QuestionBank {
    serde_json::from_value(json!({
        "id": id,
        "name": id,
        "companyId": company,
        "questions": questions,
    }))
    .unwrap()
}

fn survey(id: &str, source: Value) -> Survey {
    let mut doc = json!({
        "id": id,
        "title": format!("Survey {id}"),
        "companyId": "acme",
        "type": "quiz",
        "maxAttempts": 3,
    });
    doc.as_object_mut()
        .unwrap()
        .extend(source.as_object().unwrap().clone());
    serde_json::from_value(doc).unwrap()
}

fn bank_survey(id: &str, bank_id: &str, count: usize) -> Survey {
    survey(
        id,
        json!({ "sourceType": "question_bank", "questionBankId": bank_id, "questionCount": count }),
    )
}

fn start_req(survey_id: &str, email: &str) -> StartRequest {
    StartRequest {
        survey_id: survey_id.into(),
        candidate_name: "Ada".into(),
        candidate_email: email.into(),
        ..Default::default()
    }
}

fn submit_req(response_id: uuid::Uuid, answers: Value) -> SubmitRequest {
    SubmitRequest {
        response_id,
        answers,
        time_spent: Some(60),
        answer_durations: Default::default(),
        is_auto_submit: false,
    }
}

fn ten_question_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    let questions = (0..10).map(|i| choice(&format!("q{i}"), &[])).collect();
    store.put_bank(bank("b1", "acme", questions));
    store.put_survey(bank_survey("s1", "b1", 4));
    store
}

fn ids(outcome: &assessa_core::engine::StartOutcome) -> Vec<String> {
    outcome.questions.iter().map(|q| q.id.clone()).collect()
}

// --- Session lifecycle ---

#[tokio::test]
async fn quota_draw_has_requested_size_without_duplicates() {
    let store = ten_question_store();
    let engine = engine(&store, ResubmitPolicy::Reject);

    let session = engine.start(start_req("s1", "ada@x.io")).await.unwrap();
    assert_eq!(session.total_questions, 4);
    let mut drawn = ids(&session);
    drawn.sort();
    drawn.dedup();
    assert_eq!(drawn.len(), 4);
}

#[tokio::test]
async fn resume_returns_locked_questions_after_bank_changes() {
    let store = ten_question_store();
    let engine = engine(&store, ResubmitPolicy::Reject);

    let first = engine.start(start_req("s1", "ada@x.io")).await.unwrap();
    let locked = store
        .find_by_id(first.response_id)
        .await
        .unwrap()
        .unwrap()
        .selected_questions;
    let locked_bytes = serde_json::to_vec(&locked).unwrap();

    // The author rewrites the bank, then deletes it.
    let replaced = (0..10)
        .map(|i| {
            let mut q = choice(&format!("q{i}"), &["edited"]);
            q["text"] = json!(format!("Reworded {i}"));
            q["correctAnswer"] = json!(2);
            q
        })
        .collect();
    store.put_bank(bank("b1", "acme", replaced));
    let mut resume = start_req("s1", "ADA@x.io ");
    resume.resume = true;
    let again = engine.start(resume.clone()).await.unwrap();
    assert_eq!(again.response_id, first.response_id);
    assert!(again.resumed);
    assert_eq!(ids(&again), ids(&first));

    store.remove_bank("b1");
    let third = engine.start(resume).await.unwrap();
    assert_eq!(ids(&third), ids(&first));

    let stored = store
        .find_by_id(first.response_id)
        .await
        .unwrap()
        .unwrap()
        .selected_questions;
    assert_eq!(stored, locked);
    assert_eq!(serde_json::to_vec(&stored).unwrap(), locked_bytes);

    // Scoring uses the locked list even though the bank is gone.
    let result = engine
        .submit(submit_req(first.response_id, json!([1, 1, 1, 1])))
        .await
        .unwrap();
    assert_eq!(result.score.percentage, 100);
    let scored: Vec<String> = result
        .question_results
        .iter()
        .map(|r| r.question_id.clone())
        .collect();
    assert_eq!(scored, ids(&first));
}

#[tokio::test]
async fn explicit_attempt_is_idempotent() {
    let store = ten_question_store();
    let engine = engine(&store, ResubmitPolicy::Reject);

    let mut req = start_req("s1", "ada@x.io");
    req.attempt = Some(2);
    let a = engine.start(req.clone()).await.unwrap();
    let b = engine.start(req).await.unwrap();
    assert_eq!(a.response_id, b.response_id);
    assert_eq!(a.attempt, 2);
    assert!(!a.resumed);
    assert!(b.resumed);
    assert_eq!(store.response_count(), 1);
}

#[tokio::test]
async fn new_attempts_are_numbered_until_the_limit() {
    let store = ten_question_store();
    let mut limited = bank_survey("s1", "b1", 4);
    limited.max_attempts = 2;
    store.put_survey(limited);
    let engine = engine(&store, ResubmitPolicy::Reject);

    let first = engine.start(start_req("s1", "ada@x.io")).await.unwrap();
    let second = engine.start(start_req("s1", "ada@x.io")).await.unwrap();
    assert_eq!(first.attempt, 1);
    assert_eq!(second.attempt, 2);
    assert_ne!(first.response_id, second.response_id);

    let err = engine.start(start_req("s1", "ada@x.io")).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::AttemptLimitExceeded {
            attempt: 3,
            max_attempts: 2
        }
    ));

    // Another candidate has their own attempts.
    let other = engine.start(start_req("s1", "bob@x.io")).await.unwrap();
    assert_eq!(other.attempt, 1);
}

#[tokio::test]
async fn resume_after_submission_starts_next_attempt() {
    let store = ten_question_store();
    let engine = engine(&store, ResubmitPolicy::Reject);

    let first = engine.start(start_req("s1", "ada@x.io")).await.unwrap();
    engine
        .submit(submit_req(first.response_id, json!([])))
        .await
        .unwrap();

    let mut resume = start_req("s1", "ada@x.io");
    resume.resume = true;
    let next = engine.start(resume).await.unwrap();
    assert_eq!(next.attempt, 2);
    assert!(!next.resumed);

    let mut explicit = start_req("s1", "ada@x.io");
    explicit.attempt = Some(1);
    let err = engine.start(explicit).await.unwrap_err();
    assert!(matches!(err, EngineError::AlreadySubmitted(id) if id == first.response_id));
}

#[tokio::test]
async fn concurrent_starts_create_one_response() {
    let store = ten_question_store();
    let engine = engine(&store, ResubmitPolicy::Reject);

    let (a, b) = tokio::join!(
        engine.start(start_req("s1", "ada@x.io")),
        engine.start(start_req("s1", "ada@x.io")),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.response_id, b.response_id);
    assert_eq!(ids(&a), ids(&b));
    assert_eq!(store.response_count(), 1);
}

#[tokio::test]
async fn concurrent_starts_across_tasks_create_one_response() {
    let store = ten_question_store();
    let engine = Arc::new(engine(&store, ResubmitPolicy::Reject));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                let mut req = start_req("s1", "ada@x.io");
                req.attempt = Some(1);
                engine.start(req).await
            })
        })
        .collect();

    let mut seen = Vec::new();
    for handle in handles {
        seen.push(handle.await.unwrap().unwrap().response_id);
    }
    seen.dedup();
    assert_eq!(seen.len(), 1);
    assert_eq!(store.response_count(), 1);
}

#[tokio::test]
async fn started_questions_are_masked() {
    let store = ten_question_store();
    let engine = engine(&store, ResubmitPolicy::Reject);

    let session = engine.start(start_req("s1", "ada@x.io")).await.unwrap();
    let wire = serde_json::to_value(&session).unwrap();
    for q in wire["questions"].as_array().unwrap() {
        assert!(q.get("correctAnswer").is_none());
        assert!(q.get("explanation").is_none());
        assert_eq!(q["options"], json!([{ "text": "A" }, { "text": "B" }, { "text": "C" }]));
    }
}

// --- Question sources ---

#[tokio::test]
async fn multi_bank_draw_respects_filters_and_origin() {
    let store = Arc::new(MemoryStore::new());
    store.put_bank(bank(
        "math",
        "acme",
        vec![
            choice("m1", &["algebra"]),
            choice("m2", &["algebra"]),
            choice("m3", &["geometry"]),
            choice("m4", &["algebra"]),
        ],
    ));
    store.put_bank(bank(
        "science",
        "acme",
        vec![choice("s1", &[]), choice("s2", &[])],
    ));
    store.put_survey(survey(
        "mixed",
        json!({
            "sourceType": "multi_question_bank",
            "multiQuestionBankConfig": [
                { "questionBankId": "math", "questionCount": 2, "filters": { "tags": ["algebra"] } },
                { "questionBankId": "science", "questionCount": 1 }
            ]
        }),
    ));
    let engine = engine(&store, ResubmitPolicy::Reject);

    let session = engine.start(start_req("mixed", "ada@x.io")).await.unwrap();
    assert_eq!(session.total_questions, 3);

    let stored = store.find_by_id(session.response_id).await.unwrap().unwrap();
    let from_math: Vec<_> = stored
        .selected_questions
        .iter()
        .filter(|s| s.bank_id.as_deref() == Some("math"))
        .collect();
    let from_science = stored
        .selected_questions
        .iter()
        .filter(|s| s.bank_id.as_deref() == Some("science"))
        .count();
    assert_eq!(from_math.len(), 2);
    assert_eq!(from_science, 1);
    assert!(from_math
        .iter()
        .all(|s| s.question_data.tags == vec!["algebra".to_string()]));

    let mut indices: Vec<usize> = stored.selected_questions.iter().map(|s| s.index).collect();
    indices.sort_unstable();
    assert_eq!(indices, vec![0, 1, 2]);
}

#[tokio::test]
async fn manual_selection_uses_pinned_snapshot() {
    let store = Arc::new(MemoryStore::new());
    store.put_bank(bank("b1", "acme", vec![choice("q1", &[]), choice("q2", &[])]));
    let mut pinned = choice("q1", &[]);
    pinned["text"] = json!("Pinned wording");
    store.put_survey(survey(
        "picked",
        json!({
            "sourceType": "manual_selection",
            "selectedQuestions": [
                { "questionBankId": "b1", "questionId": "q2" },
                { "questionBankId": "b1", "questionId": "q1", "questionSnapshot": pinned }
            ]
        }),
    ));
    let engine = engine(&store, ResubmitPolicy::Reject);

    let session = engine.start(start_req("picked", "ada@x.io")).await.unwrap();
    assert_eq!(ids(&session), vec!["q2", "q1"]);
    assert_eq!(session.questions[1].text, "Pinned wording");
}

#[tokio::test]
async fn missing_bank_and_short_pool_are_reported() {
    let store = ten_question_store();
    store.put_survey(bank_survey("ghost", "nope", 2));
    store.put_survey(bank_survey("greedy", "b1", 11));
    let engine = engine(&store, ResubmitPolicy::Reject);

    let err = engine.start(start_req("ghost", "ada@x.io")).await.unwrap_err();
    assert!(matches!(err, EngineError::BankNotFound(ref id) if id == "nope"));

    let err = engine.start(start_req("greedy", "ada@x.io")).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::InsufficientQuestions {
            requested: 11,
            available: 10,
            ..
        }
    ));
    // Nothing is persisted for a failed start.
    assert_eq!(store.response_count(), 0);

    let report = engine.validate("greedy").await.unwrap();
    assert!(!report.is_valid());
    assert_eq!(report.resolved_questions, None);
}

#[tokio::test]
async fn malformed_bank_question_blocks_every_session() {
    let store = Arc::new(MemoryStore::new());
    let mut questions: Vec<Value> = (0..10).map(|i| choice(&format!("q{i}"), &[])).collect();
    questions[4]["correctAnswer"] = json!(7);
    store.put_bank(bank("b1", "acme", questions));
    store.put_survey(bank_survey("s1", "b1", 2));
    let engine = engine(&store, ResubmitPolicy::Reject);

    for i in 0..20 {
        let err = engine
            .start(start_req("s1", &format!("c{i}@x.io")))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidQuestion { ref question_id, .. } if question_id == "q4"));

        let report = engine.validate("s1").await.unwrap();
        assert!(!report.is_valid());
        assert!(report.problems[0].contains("q4"));
    }
    assert_eq!(store.response_count(), 0);
}

#[tokio::test]
async fn foreign_banks_need_access() {
    let store = Arc::new(MemoryStore::new());
    store.put_bank(bank("private", "rival", vec![choice("p1", &[])]));
    let mut paid = bank("paid", "vendor", vec![choice("v1", &[])]);
    paid.visibility = assessa_core::model::BankVisibility::Marketplace;
    paid.pricing = assessa_core::model::BankPricing::Subscription;
    store.put_bank(paid);
    store.put_survey(bank_survey("uses-private", "private", 1));
    store.put_survey(bank_survey("uses-paid", "paid", 1));
    let engine = engine(&store, ResubmitPolicy::Reject);

    let err = engine
        .start(start_req("uses-private", "ada@x.io"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::AccessDenied { ref bank_id, .. } if bank_id == "private"));

    let err = engine
        .start(start_req("uses-paid", "ada@x.io"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::AccessDenied { .. }));

    store.grant(Entitlement::new("acme", "paid", EntitlementKind::Subscription));
    let session = engine.start(start_req("uses-paid", "ada@x.io")).await.unwrap();
    assert_eq!(ids(&session), vec!["v1"]);
}

#[tokio::test]
async fn plain_surveys_cannot_start_sessions() {
    let store = ten_question_store();
    let mut plain = bank_survey("poll", "b1", 2);
    plain.kind = assessa_core::model::SurveyKind::Survey;
    store.put_survey(plain);
    let engine = engine(&store, ResubmitPolicy::Reject);

    let err = engine.start(start_req("poll", "ada@x.io")).await.unwrap_err();
    assert!(matches!(err, EngineError::NotAnAssessment(_)));

    let err = engine.start(start_req("absent", "ada@x.io")).await.unwrap_err();
    assert!(matches!(err, EngineError::SurveyNotFound(_)));
}

// --- Scoring through submit ---

fn scored_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.put_survey(survey(
        "exam",
        json!({
            "sourceType": "manual",
            "questions": [
                {
                    "id": "primes", "text": "Primes?", "type": "multiple_choice",
                    "options": ["2", "4", "5", "9"], "correctAnswer": [0, 2], "points": 2
                },
                {
                    "id": "capital", "text": "Capital of France?", "type": "short_text",
                    "correctAnswer": "Paris"
                },
                {
                    "id": "sum", "text": "2 + 2?", "type": "single_choice",
                    "options": ["3", "4"], "correctAnswer": 1,
                    "explanation": "Basic arithmetic."
                }
            ],
            "scoringSettings": {
                "enablePartialScoring": true,
                "includeShortTextInScore": true,
                "showCorrectAnswers": true,
                "passingThreshold": 60
            }
        }),
    ));
    store
}

#[tokio::test]
async fn partial_credit_and_text_answers_are_scored() {
    let store = scored_store();
    let engine = engine(&store, ResubmitPolicy::Reject);
    let session = engine.start(start_req("exam", "ada@x.io")).await.unwrap();
    assert_eq!(ids(&session), vec!["primes", "capital", "sum"]);

    // One right and one wrong pick: 1/2 - 0.1 = 0.4 of 2 points.
    let result = engine
        .submit(submit_req(
            session.response_id,
            json!([[0, 1], "  Paris ", "4"]),
        ))
        .await
        .unwrap();

    let primes = &result.question_results[0];
    assert!(!primes.is_correct);
    assert!((primes.points_awarded - 0.8).abs() < 1e-9);
    assert_eq!(primes.correct_answer.as_deref(), Some("2, 5"));

    assert!(result.question_results[1].is_correct);
    assert!(result.question_results[2].is_correct);
    assert_eq!(
        result.question_results[2].explanation.as_deref(),
        Some("Basic arithmetic.")
    );

    assert!((result.score.total_points - 2.8).abs() < 1e-9);
    assert_eq!(result.score.max_possible_points, 4.0);
    assert_eq!(result.score.percentage, 70);
    assert_eq!(result.score.correct_answers, 2);
    assert_eq!(result.score.wrong_answers, 1);
    assert!(result.score.passed);
}

#[tokio::test]
async fn half_of_the_correct_options_counts_as_correct() {
    let store = scored_store();
    let engine = engine(&store, ResubmitPolicy::Reject);
    let session = engine.start(start_req("exam", "ada@x.io")).await.unwrap();

    let result = engine
        .submit(submit_req(session.response_id, json!({ "0": [2], "capital": "paris" })))
        .await
        .unwrap();

    assert!(result.question_results[0].is_correct);
    assert!((result.question_results[0].points_awarded - 1.0).abs() < 1e-9);
    // Text comparison is case-sensitive.
    assert!(!result.question_results[1].is_correct);
    assert!(!result.question_results[2].is_correct);
    assert_eq!(result.score.percentage, 25);
    assert!(!result.score.passed);
}

#[tokio::test]
async fn resubmission_follows_policy() {
    let store = scored_store();

    let strict = engine(&store, ResubmitPolicy::Reject);
    let session = strict.start(start_req("exam", "ada@x.io")).await.unwrap();
    strict
        .submit(submit_req(session.response_id, json!([])))
        .await
        .unwrap();
    let err = strict
        .submit(submit_req(session.response_id, json!([[0, 2], "Paris", 1])))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::AlreadySubmitted(_)));
    let stored = store.find_by_id(session.response_id).await.unwrap().unwrap();
    assert_eq!(stored.score.unwrap().percentage, 0);

    let lenient = engine(&store, ResubmitPolicy::Overwrite);
    let result = lenient
        .submit(submit_req(session.response_id, json!([[0, 2], "Paris", 1])))
        .await
        .unwrap();
    assert_eq!(result.score.percentage, 100);
    let stored = store.find_by_id(session.response_id).await.unwrap().unwrap();
    assert_eq!(stored.score.unwrap().percentage, 100);
    assert_eq!(stored.answers, json!([[0, 2], "Paris", 1]));
}

#[tokio::test]
async fn unknown_response_is_not_found() {
    let store = scored_store();
    let engine = engine(&store, ResubmitPolicy::Reject);
    let id = uuid::Uuid::new_v4();

    let err = engine.submit(submit_req(id, json!([]))).await.unwrap_err();
    assert!(matches!(err, EngineError::ResponseNotFound(missing) if missing == id));
}

// --- Statistics ---

#[tokio::test]
async fn statistics_cover_submitted_sessions() {
    let store = scored_store();
    let engine = engine(&store, ResubmitPolicy::Reject);

    for (email, answers) in [
        ("ada@x.io", json!([[0, 2], "Paris", 1])),
        ("bob@x.io", json!([[1], "Rome", 0])),
    ] {
        let session = engine.start(start_req("exam", email)).await.unwrap();
        engine
            .submit(submit_req(session.response_id, answers))
            .await
            .unwrap();
    }
    engine.start(start_req("exam", "cy@x.io")).await.unwrap();

    let all = engine
        .statistics("exam", &StatisticsFilter::default())
        .await
        .unwrap();
    assert_eq!(all.summary.total_responses, 3);
    assert_eq!(all.summary.submitted_responses, 2);

    let sum = all
        .aggregated_stats
        .iter()
        .find(|q| q.question_id == "sum")
        .unwrap();
    assert_eq!(sum.answered, 2);
    assert_eq!(sum.breakdown(), "3: 1, 4: 1");

    let capital = all
        .aggregated_stats
        .iter()
        .find(|q| q.question_id == "capital")
        .unwrap();
    assert_eq!(capital.answered, 2);
    assert_eq!(capital.breakdown(), "Paris, Rome");

    let filter = StatisticsFilter {
        submitted_only: true,
        candidate_email: Some("BOB@x.io".into()),
        ..Default::default()
    };
    let bob = engine.statistics("exam", &filter).await.unwrap();
    assert_eq!(bob.summary.total_responses, 1);
    assert_eq!(bob.user_responses[0].email, "bob@x.io");
}
