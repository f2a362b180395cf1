use std::collections::BTreeMap;

use chrono::Duration;
use progress_core::mastery::MasteryConfig;
use progress_core::model::{
    AttemptKey, AttemptRecord, AttemptStatus, CourseId, DifficultyLevel, DifficultyState,
    LearnerId, LessonId, MasteryRecord, OutcomeId, PracticeBlockId, StudentHistory,
};
use progress_core::time::fixed_now;
use storage::repository::{
    AttemptRepository, DifficultyRepository, MasteryRepository, StorageError,
};
use storage::sqlite::SqliteRepository;

async fn repo(name: &str) -> SqliteRepository {
    let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
    SqliteRepository::open(&url).await.expect("open")
}

fn key(learner: &str, lesson: &str) -> AttemptKey {
    AttemptKey::parse(lesson, learner, "course-1").unwrap()
}

#[tokio::test]
async fn sqlite_migrations_are_idempotent() {
    let repo = repo("memdb_migrate_twice").await;
    repo.migrate().await.expect("second migrate");
    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM schema_migrations")
        .fetch_one(repo.pool())
        .await
        .unwrap();
    assert_eq!(applied, 1);
}

#[tokio::test]
async fn sqlite_attempt_roundtrip_and_transitions() {
    let repo = repo("memdb_attempt_roundtrip").await;
    let mut attempt = AttemptRecord::start(&key("ada", "lesson-1"), fixed_now());
    repo.insert_attempt(&attempt).await.unwrap();

    let fetched = repo.get_attempt(attempt.id).await.unwrap().expect("stored");
    assert_eq!(fetched, attempt);

    attempt
        .transition(AttemptStatus::Completed, fixed_now() + Duration::minutes(12))
        .unwrap();
    repo.update_attempt(&attempt).await.unwrap();

    let learner = LearnerId::parse("ada").unwrap();
    let lesson = LessonId::parse("lesson-1").unwrap();
    assert!(
        repo.find_active_attempts(&learner, &lesson)
            .await
            .unwrap()
            .is_empty()
    );
    let summary = repo.completed_attempts(&learner, &lesson).await.unwrap();
    assert_eq!(summary.count, 1);
    assert_eq!(
        summary.last_completed_at,
        Some(fixed_now() + Duration::minutes(12))
    );
}

#[tokio::test]
async fn sqlite_rejects_second_active_attempt() {
    let repo = repo("memdb_one_active").await;
    let first = AttemptRecord::start(&key("ada", "lesson-1"), fixed_now());
    repo.insert_attempt(&first).await.unwrap();

    let second = AttemptRecord::start(&key("ada", "lesson-1"), fixed_now());
    assert!(matches!(
        repo.insert_attempt(&second).await,
        Err(StorageError::Conflict)
    ));

    // Different lesson or learner is unaffected.
    repo.insert_attempt(&AttemptRecord::start(&key("ada", "lesson-2"), fixed_now()))
        .await
        .unwrap();
    repo.insert_attempt(&AttemptRecord::start(&key("bo", "lesson-1"), fixed_now()))
        .await
        .unwrap();
}

#[tokio::test]
async fn sqlite_history_keeps_abandoned_attempts() {
    let repo = repo("memdb_history").await;
    let mut first = AttemptRecord::start(&key("ada", "lesson-1"), fixed_now());
    repo.insert_attempt(&first).await.unwrap();
    first
        .transition(AttemptStatus::Abandoned, fixed_now() + Duration::minutes(1))
        .unwrap();
    repo.update_attempt(&first).await.unwrap();

    let second = AttemptRecord::start(&key("ada", "lesson-1"), fixed_now() + Duration::minutes(2));
    repo.insert_attempt(&second).await.unwrap();

    let history = repo
        .attempt_history(
            &LearnerId::parse("ada").unwrap(),
            &LessonId::parse("lesson-1").unwrap(),
        )
        .await
        .unwrap();
    let statuses: Vec<_> = history.iter().map(|a| a.status).collect();
    assert_eq!(statuses, vec![AttemptStatus::Abandoned, AttemptStatus::Active]);
}

#[tokio::test]
async fn sqlite_update_missing_attempt_is_not_found() {
    let repo = repo("memdb_update_missing").await;
    let attempt = AttemptRecord::start(&key("ada", "lesson-1"), fixed_now());
    assert!(matches!(
        repo.update_attempt(&attempt).await,
        Err(StorageError::NotFound)
    ));
}

#[tokio::test]
async fn sqlite_attempt_without_created_at_is_still_readable() {
    let repo = repo("memdb_missing_created").await;
    let mut attempt = AttemptRecord::start(&key("ada", "lesson-1"), fixed_now());
    attempt.created_at = None;
    repo.insert_attempt(&attempt).await.unwrap();

    let fetched = repo.get_attempt(attempt.id).await.unwrap().expect("stored");
    assert!(fetched.require_created_at().is_err());
}

#[tokio::test]
async fn sqlite_mastery_document_roundtrip() {
    let repo = repo("memdb_mastery").await;
    let learner = LearnerId::parse("ada").unwrap();
    let course = CourseId::parse("algebra").unwrap();
    assert!(repo.get_mastery(&learner, &course).await.unwrap().is_none());

    let mut record = MasteryRecord::new(learner.clone(), course.clone());
    record
        .apply_observations(
            &BTreeMap::from([
                (OutcomeId::parse("fractions").unwrap(), 0.8),
                (OutcomeId::parse("ratios").unwrap(), 0.4),
            ]),
            &MasteryConfig::default(),
            fixed_now(),
        )
        .unwrap();
    repo.save_mastery(&record).await.unwrap();
    assert_eq!(
        repo.get_mastery(&learner, &course).await.unwrap(),
        Some(record.clone())
    );

    record
        .apply_observations(
            &BTreeMap::from([(OutcomeId::parse("fractions").unwrap(), 1.0)]),
            &MasteryConfig::default(),
            fixed_now() + Duration::hours(1),
        )
        .unwrap();
    repo.save_mastery(&record).await.unwrap();
    let stored = repo.get_mastery(&learner, &course).await.unwrap().unwrap();
    assert_eq!(stored.observations(&OutcomeId::parse("fractions").unwrap()), 2);
}

#[tokio::test]
async fn sqlite_corrupt_mastery_document_is_serialization_error() {
    let repo = repo("memdb_mastery_corrupt").await;
    sqlx::query(
        "INSERT INTO mastery_records (learner_id, course_id, document, updated_at)
         VALUES ('ada', 'algebra', '{not json', NULL)",
    )
    .execute(repo.pool())
    .await
    .unwrap();

    let err = repo
        .get_mastery(
            &LearnerId::parse("ada").unwrap(),
            &CourseId::parse("algebra").unwrap(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Serialization(_)));
}

#[tokio::test]
async fn sqlite_difficulty_and_history_upsert() {
    let repo = repo("memdb_difficulty").await;
    let learner = LearnerId::parse("ada").unwrap();
    let block = PracticeBlockId::parse("fractions").unwrap();

    let mut state = DifficultyState::at_level(DifficultyLevel::Medium);
    state.consecutive_correct = 2;
    state.confidence_score = 2.5;
    repo.save_difficulty(&learner, &block, &state).await.unwrap();
    assert_eq!(
        repo.get_difficulty(&learner, &block).await.unwrap(),
        Some(state)
    );

    let reset = DifficultyState::at_level(DifficultyLevel::Hard);
    repo.save_difficulty(&learner, &block, &reset).await.unwrap();
    assert_eq!(
        repo.get_difficulty(&learner, &block).await.unwrap(),
        Some(reset)
    );

    assert_eq!(
        repo.get_history(&learner).await.unwrap(),
        StudentHistory::default()
    );
    let history = StudentHistory::new(12, 10).unwrap();
    repo.save_history(&learner, &history).await.unwrap();
    assert_eq!(repo.get_history(&learner).await.unwrap(), history);
}
