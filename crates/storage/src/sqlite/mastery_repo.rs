use progress_core::model::{CourseId, LearnerId, MasteryRecord};

use super::SqliteRepository;
use super::mapping::{conn, encode_mastery, map_mastery_row};
use crate::repository::{MasteryRepository, StorageError};

#[async_trait::async_trait]
impl MasteryRepository for SqliteRepository {
    async fn get_mastery(
        &self,
        learner_id: &LearnerId,
        course_id: &CourseId,
    ) -> Result<Option<MasteryRecord>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT learner_id, course_id, document, updated_at
            FROM mastery_records
            WHERE learner_id = ?1 AND course_id = ?2
            ",
        )
        .bind(learner_id.as_str())
        .bind(course_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.as_ref().map(map_mastery_row).transpose()
    }

    async fn save_mastery(&self, record: &MasteryRecord) -> Result<(), StorageError> {
        let document = encode_mastery(record)?;

        sqlx::query(
            r"
            INSERT INTO mastery_records (learner_id, course_id, document, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(learner_id, course_id) DO UPDATE SET
                document = excluded.document,
                updated_at = excluded.updated_at
            ",
        )
        .bind(record.learner_id().as_str())
        .bind(record.course_id().as_str())
        .bind(document)
        .bind(record.updated_at())
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }
}
