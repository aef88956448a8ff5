use cycle_core::model::{Subject, SubjectId, UserId};

use super::{SqliteRepository, mapping::map_subject_row};
use crate::repository::{StorageError, SubjectRepository};

#[async_trait::async_trait]
impl SubjectRepository for SqliteRepository {
    async fn upsert_subject(&self, user: &UserId, subject: &Subject) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO subjects (
                id, user_id, name, notebook_url, total_hours, frequency,
                is_active, total_correct, total_wrong, created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(id, user_id) DO UPDATE SET
                -- keep created_at from the original insert; only update mutable fields
                name = excluded.name,
                notebook_url = excluded.notebook_url,
                total_hours = excluded.total_hours,
                frequency = excluded.frequency,
                is_active = excluded.is_active,
                total_correct = excluded.total_correct,
                total_wrong = excluded.total_wrong
            ",
        )
        .bind(subject.id().value().to_string())
        .bind(user.as_str())
        .bind(subject.name())
        .bind(subject.notebook_url())
        .bind(subject.total_hours())
        .bind(i64::from(subject.frequency()))
        .bind(subject.is_active())
        .bind(i64::from(subject.total_correct()))
        .bind(i64::from(subject.total_wrong()))
        .bind(subject.created_at())
        .execute(&self.pool)
        .await
        .map_err(super::mapping::map_write_err)?;

        Ok(())
    }

    async fn get_subject(&self, user: &UserId, id: SubjectId) -> Result<Subject, StorageError> {
        let row = sqlx::query(
            r"
            SELECT
                id, user_id, name, notebook_url, total_hours, frequency,
                is_active, total_correct, total_wrong, created_at
            FROM subjects
            WHERE user_id = ?1 AND id = ?2
            ",
        )
        .bind(user.as_str())
        .bind(id.value().to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        match row {
            Some(row) => map_subject_row(&row),
            None => Err(StorageError::NotFound),
        }
    }

    async fn list_subjects(&self, user: &UserId) -> Result<Vec<Subject>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT
                id, user_id, name, notebook_url, total_hours, frequency,
                is_active, total_correct, total_wrong, created_at
            FROM subjects
            WHERE user_id = ?1
            ORDER BY created_at ASC, id ASC
            ",
        )
        .bind(user.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut subjects = Vec::with_capacity(rows.len());
        for row in rows {
            subjects.push(map_subject_row(&row)?);
        }
        Ok(subjects)
    }

    async fn set_all_active(&self, user: &UserId, active: bool) -> Result<u64, StorageError> {
        let result = sqlx::query(
            r"
            UPDATE subjects SET is_active = ?2 WHERE user_id = ?1
            ",
        )
        .bind(user.as_str())
        .bind(active)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(result.rows_affected())
    }

    async fn delete_subject(&self, user: &UserId, id: SubjectId) -> Result<bool, StorageError> {
        let result = sqlx::query(
            r"
            DELETE FROM subjects WHERE user_id = ?1 AND id = ?2
            ",
        )
        .bind(user.as_str())
        .bind(id.value().to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }
}
