use cycle_core::model::{CycleItem, ItemId, SubjectId, UserId};

use super::{
    SqliteRepository,
    mapping::{history_to_json, map_item_row, map_write_err},
};
use crate::repository::{CycleRepository, StorageError};

const INSERT_ITEM_SQL: &str = r"
    INSERT INTO cycle_items (
        id, user_id, subject_id, name, notebook_url, completed,
        completed_at, created_at, correct, wrong, hours_per_session, history
    )
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
";

#[async_trait::async_trait]
impl CycleRepository for SqliteRepository {
    async fn insert_items(&self, user: &UserId, items: &[CycleItem]) -> Result<(), StorageError> {
        if items.is_empty() {
            return Ok(());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        for item in items {
            sqlx::query(INSERT_ITEM_SQL)
                .bind(item.id().value().to_string())
                .bind(user.as_str())
                .bind(item.subject_id().value().to_string())
                .bind(item.name())
                .bind(item.notebook_url())
                .bind(item.completed())
                .bind(item.completed_at())
                .bind(item.created_at())
                .bind(i64::from(item.correct()))
                .bind(i64::from(item.wrong()))
                .bind(item.hours_per_session())
                .bind(history_to_json(item.history())?)
                .execute(&mut *tx)
                .await
                .map_err(map_write_err)?;
        }

        tx.commit()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(())
    }

    async fn insert_items_reduced(
        &self,
        user: &UserId,
        items: &[CycleItem],
    ) -> Result<(), StorageError> {
        if items.is_empty() {
            return Ok(());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        for item in items {
            sqlx::query(
                r"
                INSERT INTO cycle_items (
                    id, user_id, subject_id, name, notebook_url, completed,
                    created_at, correct, wrong, hours_per_session
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                ",
            )
            .bind(item.id().value().to_string())
            .bind(user.as_str())
            .bind(item.subject_id().value().to_string())
            .bind(item.name())
            .bind(item.notebook_url())
            .bind(item.completed())
            .bind(item.created_at())
            .bind(i64::from(item.correct()))
            .bind(i64::from(item.wrong()))
            .bind(item.hours_per_session())
            .execute(&mut *tx)
            .await
            .map_err(map_write_err)?;
        }

        tx.commit()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(())
    }

    async fn upsert_item(&self, user: &UserId, item: &CycleItem) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO cycle_items (
                id, user_id, subject_id, name, notebook_url, completed,
                completed_at, created_at, correct, wrong, hours_per_session, history
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ON CONFLICT(id, user_id) DO UPDATE SET
                -- keep created_at and subject_id from the original insert
                name = excluded.name,
                notebook_url = excluded.notebook_url,
                completed = excluded.completed,
                completed_at = excluded.completed_at,
                correct = excluded.correct,
                wrong = excluded.wrong,
                hours_per_session = excluded.hours_per_session,
                history = excluded.history
            ",
        )
        .bind(item.id().value().to_string())
        .bind(user.as_str())
        .bind(item.subject_id().value().to_string())
        .bind(item.name())
        .bind(item.notebook_url())
        .bind(item.completed())
        .bind(item.completed_at())
        .bind(item.created_at())
        .bind(i64::from(item.correct()))
        .bind(i64::from(item.wrong()))
        .bind(item.hours_per_session())
        .bind(history_to_json(item.history())?)
        .execute(&self.pool)
        .await
        .map_err(map_write_err)?;

        Ok(())
    }

    async fn get_item(&self, user: &UserId, id: ItemId) -> Result<CycleItem, StorageError> {
        let row = sqlx::query(
            r"
            SELECT
                id, user_id, subject_id, name, notebook_url, completed,
                completed_at, created_at, correct, wrong, hours_per_session, history
            FROM cycle_items
            WHERE user_id = ?1 AND id = ?2
            ",
        )
        .bind(user.as_str())
        .bind(id.value().to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        match row {
            Some(row) => map_item_row(&row),
            None => Err(StorageError::NotFound),
        }
    }

    async fn list_items(&self, user: &UserId) -> Result<Vec<CycleItem>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT
                id, user_id, subject_id, name, notebook_url, completed,
                completed_at, created_at, correct, wrong, hours_per_session, history
            FROM cycle_items
            WHERE user_id = ?1
            ORDER BY created_at ASC, id ASC
            ",
        )
        .bind(user.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            items.push(map_item_row(&row)?);
        }
        Ok(items)
    }

    async fn pending_items_for_subject(
        &self,
        user: &UserId,
        subject_id: SubjectId,
    ) -> Result<Vec<CycleItem>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT
                id, user_id, subject_id, name, notebook_url, completed,
                completed_at, created_at, correct, wrong, hours_per_session, history
            FROM cycle_items
            WHERE user_id = ?1 AND subject_id = ?2 AND completed = 0
            ORDER BY created_at ASC, id ASC
            ",
        )
        .bind(user.as_str())
        .bind(subject_id.value().to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            items.push(map_item_row(&row)?);
        }
        Ok(items)
    }

    async fn sync_pending_siblings(
        &self,
        user: &UserId,
        subject_id: SubjectId,
        exclude: ItemId,
        correct: u32,
        wrong: u32,
        notebook_url: Option<&str>,
    ) -> Result<u64, StorageError> {
        // single statement, so the fan-out is atomic on this backend
        let result = sqlx::query(
            r"
            UPDATE cycle_items
            SET correct = ?4, wrong = ?5, notebook_url = ?6
            WHERE user_id = ?1 AND subject_id = ?2 AND id != ?3 AND completed = 0
            ",
        )
        .bind(user.as_str())
        .bind(subject_id.value().to_string())
        .bind(exclude.value().to_string())
        .bind(i64::from(correct))
        .bind(i64::from(wrong))
        .bind(notebook_url)
        .execute(&self.pool)
        .await
        .map_err(map_write_err)?;

        Ok(result.rows_affected())
    }

    async fn delete_item(&self, user: &UserId, id: ItemId) -> Result<bool, StorageError> {
        let result = sqlx::query(
            r"
            DELETE FROM cycle_items WHERE user_id = ?1 AND id = ?2
            ",
        )
        .bind(user.as_str())
        .bind(id.value().to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn clear_cycle(&self, user: &UserId) -> Result<u64, StorageError> {
        let result = sqlx::query(
            r"
            DELETE FROM cycle_items WHERE user_id = ?1
            ",
        )
        .bind(user.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(result.rows_affected())
    }
}
