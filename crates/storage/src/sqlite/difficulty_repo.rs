use progress_core::model::{DifficultyState, LearnerId, PracticeBlockId, StudentHistory};

use super::SqliteRepository;
use super::mapping::{conn, map_difficulty_row, map_history_row};
use crate::repository::{DifficultyRepository, StorageError};

#[async_trait::async_trait]
impl DifficultyRepository for SqliteRepository {
    async fn get_difficulty(
        &self,
        learner_id: &LearnerId,
        block_id: &PracticeBlockId,
    ) -> Result<Option<DifficultyState>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT level, consecutive_correct, consecutive_incorrect, confidence_score
            FROM difficulty_states
            WHERE learner_id = ?1 AND practice_block_id = ?2
            ",
        )
        .bind(learner_id.as_str())
        .bind(block_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.as_ref().map(map_difficulty_row).transpose()
    }

    async fn save_difficulty(
        &self,
        learner_id: &LearnerId,
        block_id: &PracticeBlockId,
        state: &DifficultyState,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO difficulty_states
                (learner_id, practice_block_id, level,
                 consecutive_correct, consecutive_incorrect, confidence_score)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(learner_id, practice_block_id) DO UPDATE SET
                level = excluded.level,
                consecutive_correct = excluded.consecutive_correct,
                consecutive_incorrect = excluded.consecutive_incorrect,
                confidence_score = excluded.confidence_score
            ",
        )
        .bind(learner_id.as_str())
        .bind(block_id.as_str())
        .bind(state.level.as_str())
        .bind(i64::from(state.consecutive_correct))
        .bind(i64::from(state.consecutive_incorrect))
        .bind(state.confidence_score)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }

    async fn get_history(&self, learner_id: &LearnerId) -> Result<StudentHistory, StorageError> {
        let row = sqlx::query(
            r"
            SELECT total_questions, total_correct
            FROM student_histories
            WHERE learner_id = ?1
            ",
        )
        .bind(learner_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        match row {
            Some(row) => map_history_row(&row),
            None => Ok(StudentHistory::default()),
        }
    }

    async fn save_history(
        &self,
        learner_id: &LearnerId,
        history: &StudentHistory,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO student_histories (learner_id, total_questions, total_correct)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(learner_id) DO UPDATE SET
                total_questions = excluded.total_questions,
                total_correct = excluded.total_correct
            ",
        )
        .bind(learner_id.as_str())
        .bind(i64::from(history.total_questions))
        .bind(i64::from(history.total_correct))
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }
}
