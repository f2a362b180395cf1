use chrono::Duration;
use progress_core::difficulty::ChangeType;
use progress_core::model::{
    AnswerEvent, AttemptKey, AttemptStatus, DifficultyLevel, OutcomeId, PracticeBlockId,
};
use progress_core::time::fixed_now;
use services::{AttemptAction, AttemptState, Clock, EngineConfig, ProgressEngine, Submission};

fn submission(answer: AnswerEvent, score: f64) -> Submission {
    Submission::new(
        AttemptKey::parse("lesson-1", "ada", "algebra").unwrap(),
        PracticeBlockId::parse("fractions").unwrap(),
        answer,
    )
    .with_score(OutcomeId::parse("fractions.add").unwrap(), score)
}

#[tokio::test]
async fn practice_session_end_to_end() {
    let engine =
        ProgressEngine::in_memory(Clock::fixed(fixed_now()), EngineConfig::default()).unwrap();
    let attempts = engine.attempts();
    let progress = engine.progress();

    assert_eq!(
        attempts
            .get_status("lesson-1", "ada", true)
            .await
            .unwrap()
            .action,
        AttemptAction::Start
    );

    // Three correct answers move the block up; two misses bring it back.
    let mut levels = Vec::new();
    let mut attempt_id = None;
    for answer in [
        AnswerEvent::correct(),
        AnswerEvent::correct(),
        AnswerEvent::correct(),
        AnswerEvent::incorrect(),
        AnswerEvent::incorrect(),
    ] {
        let score = if answer.is_correct { 1.0 } else { 0.0 };
        let outcome = progress.submit_answer(&submission(answer, score)).await.unwrap();
        attempt_id.get_or_insert(outcome.attempt_id);
        assert_eq!(attempt_id, Some(outcome.attempt_id));
        levels.push((outcome.difficulty.state.level, outcome.difficulty.step.change_type));
    }
    assert_eq!(
        levels,
        vec![
            (DifficultyLevel::Easy, ChangeType::Unchanged),
            (DifficultyLevel::Easy, ChangeType::Unchanged),
            (DifficultyLevel::Medium, ChangeType::Upgrade),
            (DifficultyLevel::Medium, ChangeType::Unchanged),
            (DifficultyLevel::Easy, ChangeType::Downgrade),
        ]
    );

    let id = attempt_id.unwrap().to_string();
    let view = attempts.get_status("lesson-1", "ada", true).await.unwrap();
    assert_eq!(view.state, AttemptState::InProgress);

    let done = attempts.complete_attempt(&id, "ada").await.unwrap();
    assert_eq!(done.status, AttemptStatus::Completed);

    let view = attempts.get_status("lesson-1", "ada", true).await.unwrap();
    assert_eq!(view.state, AttemptState::Completed);
    assert_eq!(view.completed_count, 1);

    // A retake opens a fresh attempt.
    let retake = progress
        .submit_answer(&submission(AnswerEvent::correct(), 1.0))
        .await
        .unwrap();
    assert!(retake.is_new_attempt);
    assert_ne!(retake.attempt_id.to_string(), id);
}

#[tokio::test]
async fn mastery_converges_across_submissions_on_sqlite() {
    let engine = ProgressEngine::new_sqlite(
        "sqlite:file:memdb_progress_flow?mode=memory&cache=shared",
        Clock::fixed(fixed_now() + Duration::days(1)),
        EngineConfig::default(),
    )
    .await
    .expect("engine");
    let progress = engine.progress();

    let outcome = OutcomeId::parse("fractions.add").unwrap();
    let mut values = Vec::new();
    for _ in 0..6 {
        let result = progress
            .submit_answer(&submission(AnswerEvent::correct(), 0.9))
            .await
            .unwrap();
        values.push(result.mastery[&outcome].new_value);
    }
    // Bootstrap lands exactly on the score and further equal scores keep it there.
    assert!(values.iter().all(|v| (v - 0.9).abs() < 1e-9));

    let drop = progress
        .submit_answer(&submission(AnswerEvent::incorrect(), 0.0))
        .await
        .unwrap();
    let update = drop.mastery[&outcome];
    assert!((update.effective_alpha - 0.3).abs() < 1e-9);
    assert!((update.new_value - 0.63).abs() < 1e-9);
}

#[tokio::test]
async fn confidence_weighting_speeds_up_confident_streaks() {
    let engine = ProgressEngine::in_memory(
        Clock::fixed(fixed_now()),
        EngineConfig::with_features(false, true),
    )
    .unwrap();
    let progress = engine.progress();

    let fast = AnswerEvent::correct().with_response_time(5.0).with_hints(0);
    let first = progress.submit_answer(&submission(fast, 1.0)).await.unwrap();
    assert_eq!(first.difficulty.confidence_weight, Some(1.5));
    let second = progress.submit_answer(&submission(fast, 1.0)).await.unwrap();
    // 1.5 + 1.5 >= 3 after only two answers.
    assert_eq!(second.difficulty.state.level, DifficultyLevel::Medium);
}
