use std::sync::Arc;

use cycle_core::Clock;
use cycle_core::model::{CycleItem, ItemId, UserId};
use storage::repository::{CycleRepository, SubjectRepository};

use super::view::order_for_display;
use crate::error::CycleServiceError;

/// Owns the ordered collection of study sessions for one user.
///
/// Generation and the synchronizer live in this service because every edit
/// they make has to land in both repositories: the item being written and
/// the owning subject's aggregate.
#[derive(Clone)]
pub struct CycleService {
    pub(super) clock: Clock,
    pub(super) user: UserId,
    pub(super) subjects: Arc<dyn SubjectRepository>,
    pub(super) items: Arc<dyn CycleRepository>,
}

impl CycleService {
    #[must_use]
    pub fn new(
        clock: Clock,
        user: UserId,
        subjects: Arc<dyn SubjectRepository>,
        items: Arc<dyn CycleRepository>,
    ) -> Self {
        Self {
            clock,
            user,
            subjects,
            items,
        }
    }

    /// List the user's sessions in stored (interleave) order.
    ///
    /// # Errors
    ///
    /// Returns `CycleServiceError::Storage` if repository access fails.
    pub async fn list_items(&self) -> Result<Vec<CycleItem>, CycleServiceError> {
        let items = self.items.list_items(&self.user).await?;
        Ok(items)
    }

    /// List the user's sessions in display order: pending before completed,
    /// newest-created first within each group.
    ///
    /// Recomputed on every read; completion state changes over time, so
    /// this is a read policy, never a storage order.
    ///
    /// # Errors
    ///
    /// Returns `CycleServiceError::Storage` if repository access fails.
    pub async fn display_items(&self) -> Result<Vec<CycleItem>, CycleServiceError> {
        let items = self.items.list_items(&self.user).await?;
        Ok(order_for_display(items))
    }

    /// Fetch a single session.
    ///
    /// # Errors
    ///
    /// Returns `CycleServiceError::Storage` with `NotFound` for an unknown
    /// id.
    pub async fn get_item(&self, id: ItemId) -> Result<CycleItem, CycleServiceError> {
        let item = self.items.get_item(&self.user, id).await?;
        Ok(item)
    }

    /// Remove one session from the queue.
    ///
    /// Deleting an unknown id is a warn-logged no-op.
    ///
    /// # Errors
    ///
    /// Returns `CycleServiceError::Storage` if persistence fails.
    pub async fn delete_item(&self, id: ItemId) -> Result<(), CycleServiceError> {
        let removed = self.items.delete_item(&self.user, id).await?;
        if !removed {
            tracing::warn!(item = %id, "delete ignored: session not found");
        }
        Ok(())
    }

    /// Remove every session belonging to the user.
    ///
    /// Subjects and their aggregates are untouched. Returns the removed
    /// count.
    ///
    /// # Errors
    ///
    /// Returns `CycleServiceError::Storage` if persistence fails.
    pub async fn clear_cycle(&self) -> Result<u64, CycleServiceError> {
        let removed = self.items.clear_cycle(&self.user).await?;
        Ok(removed)
    }
}
