use std::collections::BTreeMap;

use progress_core::model::{
    AttemptId, AttemptRecord, AttemptStatus, CourseId, DifficultyLevel, DifficultyState,
    LearnerId, LessonId, MasteryRecord, OutcomeId, OutcomeMastery, StudentHistory,
};
use serde::{Deserialize, Serialize};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

/// Maps write failures, turning unique-index violations into `Conflict`.
pub(crate) fn write_error(err: sqlx::Error) -> StorageError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => StorageError::Conflict,
        _ => conn(err),
    }
}

fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn map_attempt_row(row: &SqliteRow) -> Result<AttemptRecord, StorageError> {
    let status_str: String = row.try_get("status").map_err(ser)?;
    Ok(AttemptRecord {
        id: AttemptId::parse(row.try_get::<String, _>("id").map_err(ser)?).map_err(ser)?,
        learner_id: LearnerId::parse(row.try_get::<String, _>("learner_id").map_err(ser)?)
            .map_err(ser)?,
        lesson_id: LessonId::parse(row.try_get::<String, _>("lesson_id").map_err(ser)?)
            .map_err(ser)?,
        course_id: CourseId::parse(row.try_get::<String, _>("course_id").map_err(ser)?)
            .map_err(ser)?,
        status: AttemptStatus::parse(&status_str).map_err(ser)?,
        created_at: row.try_get("created_at").map_err(ser)?,
        completed_at: row.try_get("completed_at").map_err(ser)?,
    })
}

/// JSON document stored in `mastery_records.document`.
#[derive(Debug, Serialize, Deserialize)]
struct MasteryDocument {
    version: u32,
    outcomes: BTreeMap<OutcomeId, OutcomeMastery>,
}

const MASTERY_DOCUMENT_VERSION: u32 = 1;

pub(crate) fn encode_mastery(record: &MasteryRecord) -> Result<String, StorageError> {
    serde_json::to_string(&MasteryDocument {
        version: MASTERY_DOCUMENT_VERSION,
        outcomes: record.outcomes().clone(),
    })
    .map_err(ser)
}

pub(crate) fn map_mastery_row(row: &SqliteRow) -> Result<MasteryRecord, StorageError> {
    let raw: String = row.try_get("document").map_err(ser)?;
    let document: MasteryDocument = serde_json::from_str(&raw).map_err(ser)?;
    if document.version != MASTERY_DOCUMENT_VERSION {
        return Err(StorageError::Serialization(format!(
            "unsupported mastery document version: {}",
            document.version
        )));
    }

    MasteryRecord::from_persisted(
        LearnerId::parse(row.try_get::<String, _>("learner_id").map_err(ser)?).map_err(ser)?,
        CourseId::parse(row.try_get::<String, _>("course_id").map_err(ser)?).map_err(ser)?,
        document.outcomes,
        row.try_get("updated_at").map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_difficulty_row(row: &SqliteRow) -> Result<DifficultyState, StorageError> {
    let level_str: String = row.try_get("level").map_err(ser)?;
    DifficultyState::from_persisted(
        DifficultyLevel::parse(&level_str).map_err(ser)?,
        u32_from_i64(
            "consecutive_correct",
            row.try_get("consecutive_correct").map_err(ser)?,
        )?,
        u32_from_i64(
            "consecutive_incorrect",
            row.try_get("consecutive_incorrect").map_err(ser)?,
        )?,
        row.try_get("confidence_score").map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_history_row(row: &SqliteRow) -> Result<StudentHistory, StorageError> {
    StudentHistory::new(
        u32_from_i64("total_questions", row.try_get("total_questions").map_err(ser)?)?,
        u32_from_i64("total_correct", row.try_get("total_correct").map_err(ser)?)?,
    )
    .map_err(ser)
}
