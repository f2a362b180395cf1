use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Runs the versioned migrations for the progress schema.
///
/// Version 1 creates attempts, mastery records, difficulty states and
/// learner histories. The partial unique index on active attempts is what
/// serializes concurrent attempt creation.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        // created_at stays nullable so rows written by older tooling can be
        // detected as corrupted instead of failing the whole query.
        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS attempts (
                    id TEXT PRIMARY KEY,
                    learner_id TEXT NOT NULL,
                    lesson_id TEXT NOT NULL,
                    course_id TEXT NOT NULL,
                    status TEXT NOT NULL
                        CHECK (status IN ('active', 'completed', 'abandoned')),
                    created_at TEXT,
                    completed_at TEXT
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE UNIQUE INDEX IF NOT EXISTS idx_attempts_one_active
                    ON attempts (learner_id, lesson_id)
                    WHERE status = 'active';
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_attempts_learner_lesson_status
                    ON attempts (learner_id, lesson_id, status, created_at);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS mastery_records (
                    learner_id TEXT NOT NULL,
                    course_id TEXT NOT NULL,
                    document TEXT NOT NULL,
                    updated_at TEXT,
                    PRIMARY KEY (learner_id, course_id)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS difficulty_states (
                    learner_id TEXT NOT NULL,
                    practice_block_id TEXT NOT NULL,
                    level TEXT NOT NULL CHECK (level IN ('easy', 'medium', 'hard')),
                    consecutive_correct INTEGER NOT NULL CHECK (consecutive_correct >= 0),
                    consecutive_incorrect INTEGER NOT NULL CHECK (consecutive_incorrect >= 0),
                    confidence_score REAL NOT NULL,
                    PRIMARY KEY (learner_id, practice_block_id)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS student_histories (
                    learner_id TEXT PRIMARY KEY,
                    total_questions INTEGER NOT NULL CHECK (total_questions >= 0),
                    total_correct INTEGER NOT NULL CHECK (total_correct >= 0)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!(version = 1, "applied schema migration");
    }

    Ok(())
}
