mod attempt;
mod difficulty_state;
mod ids;
mod mastery_record;

pub use ids::{AttemptId, CourseId, LearnerId, LessonId, OutcomeId, PracticeBlockId};

pub use attempt::{AttemptError, AttemptKey, AttemptRecord, AttemptStatus};
pub use difficulty_state::{
    AnswerEvent, DifficultyLevel, DifficultyState, DifficultyStateError, StudentHistory,
};
pub use mastery_record::{MasteryRecord, MasteryRecordError, OutcomeMastery};
