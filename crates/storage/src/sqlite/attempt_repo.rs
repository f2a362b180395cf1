use progress_core::model::{AttemptId, AttemptRecord, LearnerId, LessonId};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{conn, map_attempt_row, ser, write_error};
use crate::repository::{AttemptRepository, CompletedAttempts, StorageError};

const ATTEMPT_COLUMNS: &str =
    "id, learner_id, lesson_id, course_id, status, created_at, completed_at";

#[async_trait::async_trait]
impl AttemptRepository for SqliteRepository {
    async fn find_active_attempts(
        &self,
        learner_id: &LearnerId,
        lesson_id: &LessonId,
    ) -> Result<Vec<AttemptRecord>, StorageError> {
        let rows = sqlx::query(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM attempts
             WHERE learner_id = ?1 AND lesson_id = ?2 AND status = 'active'"
        ))
        .bind(learner_id.as_str())
        .bind(lesson_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_attempt_row).collect()
    }

    async fn completed_attempts(
        &self,
        learner_id: &LearnerId,
        lesson_id: &LessonId,
    ) -> Result<CompletedAttempts, StorageError> {
        let row = sqlx::query(
            r"
            SELECT COUNT(*) AS completed, MAX(completed_at) AS last_completed_at
            FROM attempts
            WHERE learner_id = ?1 AND lesson_id = ?2 AND status = 'completed'
            ",
        )
        .bind(learner_id.as_str())
        .bind(lesson_id.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(conn)?;

        let count: i64 = row.try_get("completed").map_err(ser)?;
        Ok(CompletedAttempts {
            count: u32::try_from(count)
                .map_err(|_| StorageError::Serialization(format!("invalid count: {count}")))?,
            last_completed_at: row.try_get("last_completed_at").map_err(ser)?,
        })
    }

    async fn attempt_history(
        &self,
        learner_id: &LearnerId,
        lesson_id: &LessonId,
    ) -> Result<Vec<AttemptRecord>, StorageError> {
        let rows = sqlx::query(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM attempts
             WHERE learner_id = ?1 AND lesson_id = ?2
             ORDER BY created_at ASC, id ASC"
        ))
        .bind(learner_id.as_str())
        .bind(lesson_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_attempt_row).collect()
    }

    async fn insert_attempt(&self, attempt: &AttemptRecord) -> Result<(), StorageError> {
        let res = sqlx::query(
            r"
            INSERT INTO attempts
                (id, learner_id, lesson_id, course_id, status, created_at, completed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ",
        )
        .bind(attempt.id.to_string())
        .bind(attempt.learner_id.as_str())
        .bind(attempt.lesson_id.as_str())
        .bind(attempt.course_id.as_str())
        .bind(attempt.status.as_str())
        .bind(attempt.created_at)
        .bind(attempt.completed_at)
        .execute(&self.pool)
        .await;

        match res {
            Ok(_) => Ok(()),
            Err(err) => {
                let mapped = write_error(err);
                if matches!(mapped, StorageError::Conflict) {
                    tracing::debug!(
                        attempt_id = %attempt.id,
                        learner_id = %attempt.learner_id,
                        lesson_id = %attempt.lesson_id,
                        "attempt insert rejected by active-attempt index"
                    );
                }
                Err(mapped)
            }
        }
    }

    async fn get_attempt(&self, id: AttemptId) -> Result<Option<AttemptRecord>, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM attempts WHERE id = ?1"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.as_ref().map(map_attempt_row).transpose()
    }

    async fn update_attempt(&self, attempt: &AttemptRecord) -> Result<(), StorageError> {
        let res = sqlx::query(
            r"
            UPDATE attempts
            SET status = ?2, created_at = ?3, completed_at = ?4
            WHERE id = ?1
            ",
        )
        .bind(attempt.id.to_string())
        .bind(attempt.status.as_str())
        .bind(attempt.created_at)
        .bind(attempt.completed_at)
        .execute(&self.pool)
        .await
        .map_err(write_error)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }
}
