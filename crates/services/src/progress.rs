use std::collections::BTreeMap;
use std::sync::Arc;

use progress_core::ValidationError;
use progress_core::difficulty::{DifficultyController, DifficultyTransition};
use progress_core::mastery::MasteryUpdate;
use progress_core::model::{
    AnswerEvent, AttemptId, AttemptKey, MasteryRecord, OutcomeId, PracticeBlockId,
};
use storage::repository::{DifficultyRepository, MasteryRepository};

use crate::Clock;
use crate::attempts::AttemptLifecycleService;
use crate::config::EngineConfig;
use crate::error::ProgressError;

/// One graded learner response.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub key: AttemptKey,
    pub practice_block_id: PracticeBlockId,
    /// Score per learning outcome, each in `[0, 1]`.
    pub scores: BTreeMap<OutcomeId, f64>,
    pub answer: AnswerEvent,
}

impl Submission {
    #[must_use]
    pub fn new(key: AttemptKey, practice_block_id: PracticeBlockId, answer: AnswerEvent) -> Self {
        Self {
            key,
            practice_block_id,
            scores: BTreeMap::new(),
            answer,
        }
    }

    #[must_use]
    pub fn with_score(mut self, outcome: OutcomeId, score: f64) -> Self {
        self.scores.insert(outcome, score);
        self
    }
}

/// Everything a submission changed.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionOutcome {
    pub attempt_id: AttemptId,
    pub is_new_attempt: bool,
    pub mastery: BTreeMap<OutcomeId, MasteryUpdate>,
    pub difficulty: DifficultyTransition,
}

/// Feeds graded answers through the estimator and the controller.
///
/// Submissions for one learner must be applied in order by the caller; this
/// service does not serialize them.
#[derive(Clone)]
pub struct ProgressService {
    clock: Clock,
    config: EngineConfig,
    controller: DifficultyController,
    attempts: AttemptLifecycleService,
    mastery: Arc<dyn MasteryRepository>,
    difficulty: Arc<dyn DifficultyRepository>,
}

impl ProgressService {
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidConfig` if `config` is invalid.
    pub fn new(
        clock: Clock,
        config: EngineConfig,
        attempts: AttemptLifecycleService,
        mastery: Arc<dyn MasteryRepository>,
        difficulty: Arc<dyn DifficultyRepository>,
    ) -> Result<Self, ValidationError> {
        config.validate()?;
        Ok(Self {
            clock,
            config,
            controller: DifficultyController::new(config.adaptive)?,
            attempts,
            mastery,
            difficulty,
        })
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Applies one graded answer.
    ///
    /// Resolves (or creates) the active attempt, folds the outcome scores into
    /// the learner's course mastery, steps the practice block's difficulty and
    /// bumps the learner's answer history. Nothing is written unless every
    /// score is valid.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Validation` for an empty or out-of-range score,
    /// `ProgressError::CorruptedState` if stored mastery or difficulty cannot
    /// be read back or a stored estimate lies outside the configured bounds,
    /// and `ProgressError::Storage` if the store fails.
    pub async fn submit_answer(
        &self,
        submission: &Submission,
    ) -> Result<SubmissionOutcome, ProgressError> {
        let key = &submission.key;
        let learner_id = &key.learner_id;
        let block_id = &submission.practice_block_id;
        let now = self.clock.now();

        let mut record = self
            .mastery
            .get_mastery(learner_id, &key.course_id)
            .await?
            .unwrap_or_else(|| MasteryRecord::new(learner_id.clone(), key.course_id.clone()));
        let mastery = record
            .apply_observations(&submission.scores, &self.config.mastery, now)
            .map_err(|err| match err {
                ValidationError::PriorOutOfRange { .. } => {
                    ProgressError::CorruptedState(format!("mastery for {learner_id}: {err}"))
                }
                other => other.into(),
            })?;

        let state = self
            .difficulty
            .get_difficulty(learner_id, block_id)
            .await?
            .unwrap_or_default();
        let mut history = self.difficulty.get_history(learner_id).await?;
        let transition = self
            .controller
            .process_answer(&state, &submission.answer, Some(&history));
        history.record(submission.answer.is_correct);

        let active = self.attempts.ensure_active(key).await?;

        self.mastery.save_mastery(&record).await?;
        self.difficulty
            .save_difficulty(learner_id, block_id, &transition.state)
            .await?;
        self.difficulty.save_history(learner_id, &history).await?;

        if transition.step.did_change {
            tracing::info!(
                %learner_id,
                %block_id,
                from = %transition.previous_level,
                to = %transition.state.level,
                "difficulty changed"
            );
        }
        tracing::debug!(
            attempt_id = %active.attempt_id,
            %learner_id,
            outcomes = mastery.len(),
            correct = submission.answer.is_correct,
            "recorded submission"
        );

        Ok(SubmissionOutcome {
            attempt_id: active.attempt_id,
            is_new_attempt: active.is_new,
            mastery,
            difficulty: transition,
        })
    }
}
