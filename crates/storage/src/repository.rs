use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use cycle_core::model::{CycleItem, ItemId, Subject, SubjectId, UserId};

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    /// The backing schema does not know the named field.
    ///
    /// Distinct from total failure so callers can retry with a reduced
    /// payload instead of aborting the whole write.
    #[error("unsupported field: {0}")]
    UnsupportedField(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Repository contract for the subject registry.
///
/// Every operation is scoped to the owning user's key.
#[async_trait]
pub trait SubjectRepository: Send + Sync {
    /// Persist or update a subject.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the subject cannot be stored.
    async fn upsert_subject(&self, user: &UserId, subject: &Subject) -> Result<(), StorageError>;

    /// Fetch a subject by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_subject(&self, user: &UserId, id: SubjectId) -> Result<Subject, StorageError>;

    /// List the user's subjects in creation order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the listing fails.
    async fn list_subjects(&self, user: &UserId) -> Result<Vec<Subject>, StorageError>;

    /// Set `is_active` uniformly on every subject; returns the affected count.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the update fails.
    async fn set_all_active(&self, user: &UserId, active: bool) -> Result<u64, StorageError>;

    /// Delete a subject; returns false when the id was unknown.
    ///
    /// Existing cycle items referencing the subject are left in place.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the delete fails.
    async fn delete_subject(&self, user: &UserId, id: SubjectId) -> Result<bool, StorageError>;
}

/// Repository contract for the cycle queue.
#[async_trait]
pub trait CycleRepository: Send + Sync {
    /// Batch-insert freshly generated items in one transaction.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::UnsupportedField` when the schema rejects an
    /// optional field, or other storage errors.
    async fn insert_items(&self, user: &UserId, items: &[CycleItem]) -> Result<(), StorageError>;

    /// Batch-insert writing only the mandatory fields, for schemas that
    /// predate the optional `history` and `completed_at` columns.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if even the reduced write fails.
    async fn insert_items_reduced(
        &self,
        user: &UserId,
        items: &[CycleItem],
    ) -> Result<(), StorageError>;

    /// Persist or update a single item.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the item cannot be stored.
    async fn upsert_item(&self, user: &UserId, item: &CycleItem) -> Result<(), StorageError>;

    /// Fetch an item by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_item(&self, user: &UserId, id: ItemId) -> Result<CycleItem, StorageError>;

    /// List the user's items ordered by creation time ascending, which is
    /// the interleaver's emission order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the listing fails.
    async fn list_items(&self, user: &UserId) -> Result<Vec<CycleItem>, StorageError>;

    /// List a subject's not-completed items in creation order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the listing fails.
    async fn pending_items_for_subject(
        &self,
        user: &UserId,
        subject_id: SubjectId,
    ) -> Result<Vec<CycleItem>, StorageError>;

    /// Overwrite the shared counter fields on every not-completed item of
    /// the subject except `exclude`; completed items are never touched.
    ///
    /// The overwrite is idempotent, so a failed fan-out can simply be
    /// retried. Returns the affected count.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the update fails.
    async fn sync_pending_siblings(
        &self,
        user: &UserId,
        subject_id: SubjectId,
        exclude: ItemId,
        correct: u32,
        wrong: u32,
        notebook_url: Option<&str>,
    ) -> Result<u64, StorageError>;

    /// Delete a single item; returns false when the id was unknown.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the delete fails.
    async fn delete_item(&self, user: &UserId, id: ItemId) -> Result<bool, StorageError>;

    /// Remove every item belonging to the user; subjects are untouched.
    /// Returns the removed count.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the delete fails.
    async fn clear_cycle(&self, user: &UserId) -> Result<u64, StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    subjects: Arc<Mutex<HashMap<(UserId, SubjectId), Subject>>>,
    items: Arc<Mutex<HashMap<(UserId, ItemId), CycleItem>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self {
            subjects: Arc::new(Mutex::new(HashMap::new())),
            items: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl SubjectRepository for InMemoryRepository {
    async fn upsert_subject(&self, user: &UserId, subject: &Subject) -> Result<(), StorageError> {
        let mut guard = self
            .subjects
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert((user.clone(), subject.id()), subject.clone());
        Ok(())
    }

    async fn get_subject(&self, user: &UserId, id: SubjectId) -> Result<Subject, StorageError> {
        let guard = self
            .subjects
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard
            .get(&(user.clone(), id))
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    async fn list_subjects(&self, user: &UserId) -> Result<Vec<Subject>, StorageError> {
        let guard = self
            .subjects
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let mut subjects = Vec::new();
        for ((owner, _), subject) in guard.iter() {
            if owner == user {
                subjects.push(subject.clone());
            }
        }
        subjects.sort_by(|a, b| {
            a.created_at()
                .cmp(&b.created_at())
                .then_with(|| a.id().value().cmp(&b.id().value()))
        });
        Ok(subjects)
    }

    async fn set_all_active(&self, user: &UserId, active: bool) -> Result<u64, StorageError> {
        let mut guard = self
            .subjects
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let mut affected = 0;
        for ((owner, _), subject) in guard.iter_mut() {
            if owner == user {
                subject.set_active(active);
                affected += 1;
            }
        }
        Ok(affected)
    }

    async fn delete_subject(&self, user: &UserId, id: SubjectId) -> Result<bool, StorageError> {
        let mut guard = self
            .subjects
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.remove(&(user.clone(), id)).is_some())
    }
}

#[async_trait]
impl CycleRepository for InMemoryRepository {
    async fn insert_items(&self, user: &UserId, items: &[CycleItem]) -> Result<(), StorageError> {
        let mut guard = self
            .items
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        for item in items {
            guard.insert((user.clone(), item.id()), item.clone());
        }
        Ok(())
    }

    async fn insert_items_reduced(
        &self,
        user: &UserId,
        items: &[CycleItem],
    ) -> Result<(), StorageError> {
        let mut guard = self
            .items
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        for item in items {
            let reduced = CycleItem::from_persisted(
                item.id(),
                item.subject_id(),
                item.name(),
                item.notebook_url().map(str::to_owned),
                false,
                None,
                item.created_at(),
                item.correct(),
                item.wrong(),
                item.hours_per_session(),
                Vec::new(),
            )
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
            guard.insert((user.clone(), item.id()), reduced);
        }
        Ok(())
    }

    async fn upsert_item(&self, user: &UserId, item: &CycleItem) -> Result<(), StorageError> {
        let mut guard = self
            .items
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert((user.clone(), item.id()), item.clone());
        Ok(())
    }

    async fn get_item(&self, user: &UserId, id: ItemId) -> Result<CycleItem, StorageError> {
        let guard = self
            .items
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard
            .get(&(user.clone(), id))
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    async fn list_items(&self, user: &UserId) -> Result<Vec<CycleItem>, StorageError> {
        let guard = self
            .items
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let mut items = Vec::new();
        for ((owner, _), item) in guard.iter() {
            if owner == user {
                items.push(item.clone());
            }
        }
        items.sort_by(|a, b| {
            a.created_at()
                .cmp(&b.created_at())
                .then_with(|| a.id().value().cmp(&b.id().value()))
        });
        Ok(items)
    }

    async fn pending_items_for_subject(
        &self,
        user: &UserId,
        subject_id: SubjectId,
    ) -> Result<Vec<CycleItem>, StorageError> {
        let items = self.list_items(user).await?;
        Ok(items
            .into_iter()
            .filter(|i| i.subject_id() == subject_id && i.is_pending())
            .collect())
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
        let mut guard = self
            .items
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let mut affected = 0;
        for ((owner, id), item) in guard.iter_mut() {
            if owner == user
                && *id != exclude
                && item.subject_id() == subject_id
                && item.is_pending()
            {
                item.set_tally(correct, wrong);
                item.set_notebook_url(notebook_url.map(str::to_owned));
                affected += 1;
            }
        }
        Ok(affected)
    }

    async fn delete_item(&self, user: &UserId, id: ItemId) -> Result<bool, StorageError> {
        let mut guard = self
            .items
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.remove(&(user.clone(), id)).is_some())
    }

    async fn clear_cycle(&self, user: &UserId) -> Result<u64, StorageError> {
        let mut guard = self
            .items
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let before = guard.len();
        guard.retain(|(owner, _), _| owner != user);
        Ok((before - guard.len()) as u64)
    }
}

/// Aggregates both repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub subjects: Arc<dyn SubjectRepository>,
    pub cycle: Arc<dyn CycleRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let subjects: Arc<dyn SubjectRepository> = Arc::new(repo.clone());
        let cycle: Arc<dyn CycleRepository> = Arc::new(repo);
        Self { subjects, cycle }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cycle_core::interleave::{Baseline, SessionSeed, interleave};
    use cycle_core::time::fixed_now;

    fn user() -> UserId {
        UserId::new("user-1")
    }

    fn build_subject(name: &str, frequency: u32) -> Subject {
        Subject::new(SubjectId::generate(), name, None, 2.0, frequency, fixed_now()).unwrap()
    }

    fn build_items(subject: &Subject) -> Vec<CycleItem> {
        interleave(
            &[SessionSeed::from_subject(subject, Baseline::Reset)],
            fixed_now(),
        )
    }

    #[tokio::test]
    async fn subject_round_trip_and_delete() {
        let repo = InMemoryRepository::new();
        let subject = build_subject("Math", 3);
        repo.upsert_subject(&user(), &subject).await.unwrap();

        let fetched = repo.get_subject(&user(), subject.id()).await.unwrap();
        assert_eq!(fetched, subject);

        assert!(repo.delete_subject(&user(), subject.id()).await.unwrap());
        assert!(!repo.delete_subject(&user(), subject.id()).await.unwrap());
        assert!(matches!(
            repo.get_subject(&user(), subject.id()).await,
            Err(StorageError::NotFound)
        ));
    }

    #[tokio::test]
    async fn set_all_active_touches_every_subject() {
        let repo = InMemoryRepository::new();
        repo.upsert_subject(&user(), &build_subject("Math", 1))
            .await
            .unwrap();
        repo.upsert_subject(&user(), &build_subject("History", 2))
            .await
            .unwrap();

        let affected = repo.set_all_active(&user(), false).await.unwrap();
        assert_eq!(affected, 2);

        let subjects = repo.list_subjects(&user()).await.unwrap();
        assert!(subjects.iter().all(|s| !s.is_active()));
    }

    #[tokio::test]
    async fn sibling_sync_skips_completed_and_excluded() {
        let repo = InMemoryRepository::new();
        let subject = build_subject("Math", 3);
        let mut items = build_items(&subject);
        items[2].mark_completed(9, 9, fixed_now());
        repo.insert_items(&user(), &items).await.unwrap();

        let affected = repo
            .sync_pending_siblings(&user(), subject.id(), items[0].id(), 4, 1, None)
            .await
            .unwrap();
        assert_eq!(affected, 1);

        let stored = repo.list_items(&user()).await.unwrap();
        let target = stored.iter().find(|i| i.id() == items[0].id()).unwrap();
        let sibling = stored.iter().find(|i| i.id() == items[1].id()).unwrap();
        let done = stored.iter().find(|i| i.id() == items[2].id()).unwrap();

        // the excluded target is written separately by the synchronizer
        assert_eq!(target.correct(), 0);
        assert_eq!((sibling.correct(), sibling.wrong()), (4, 1));
        assert_eq!((done.correct(), done.wrong()), (9, 9));
    }

    #[tokio::test]
    async fn clear_cycle_is_scoped_to_user() {
        let repo = InMemoryRepository::new();
        let other = UserId::new("user-2");
        let subject = build_subject("Math", 2);
        repo.insert_items(&user(), &build_items(&subject))
            .await
            .unwrap();
        repo.insert_items(&other, &build_items(&subject))
            .await
            .unwrap();

        let removed = repo.clear_cycle(&user()).await.unwrap();
        assert_eq!(removed, 2);
        assert!(repo.list_items(&user()).await.unwrap().is_empty());
        assert_eq!(repo.list_items(&other).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn list_items_orders_by_creation() {
        let repo = InMemoryRepository::new();
        let a = build_subject("A", 2);
        let b = build_subject("B", 2);
        let items = interleave(
            &[
                SessionSeed::from_subject(&a, Baseline::Reset),
                SessionSeed::from_subject(&b, Baseline::Reset),
            ],
            fixed_now(),
        );
        repo.insert_items(&user(), &items).await.unwrap();

        let stored = repo.list_items(&user()).await.unwrap();
        let names: Vec<&str> = stored.iter().map(CycleItem::name).collect();
        assert_eq!(names, vec!["A", "B", "A", "B"]);
    }
}
