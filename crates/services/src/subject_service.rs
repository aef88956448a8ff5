use std::sync::Arc;

use cycle_core::Clock;
use cycle_core::model::{Subject, SubjectId, SubjectPatch, UserId};
use storage::repository::SubjectRepository;

use crate::error::SubjectServiceError;

/// Owns the catalog of subjects and their aggregate performance counters.
#[derive(Clone)]
pub struct SubjectService {
    clock: Clock,
    user: UserId,
    subjects: Arc<dyn SubjectRepository>,
}

impl SubjectService {
    #[must_use]
    pub fn new(clock: Clock, user: UserId, subjects: Arc<dyn SubjectRepository>) -> Self {
        Self {
            clock,
            user,
            subjects,
        }
    }

    /// Register a new subject with a zeroed tally, active by default.
    ///
    /// # Errors
    ///
    /// Returns `SubjectServiceError::Subject` for validation failures.
    /// Returns `SubjectServiceError::Storage` if persistence fails.
    pub async fn add_subject(
        &self,
        name: impl Into<String>,
        notebook_url: Option<String>,
        total_hours: f64,
        frequency: u32,
    ) -> Result<Subject, SubjectServiceError> {
        let subject = Subject::new(
            SubjectId::generate(),
            name,
            notebook_url,
            total_hours,
            frequency,
            self.clock.now(),
        )?;
        self.subjects.upsert_subject(&self.user, &subject).await?;
        Ok(subject)
    }

    /// Merge a partial update into an existing subject.
    ///
    /// # Errors
    ///
    /// Returns `SubjectServiceError::Subject` if the merged result fails
    /// validation, `SubjectServiceError::Storage` with `NotFound` for an
    /// unknown id, or other persistence failures.
    pub async fn update_subject(
        &self,
        id: SubjectId,
        patch: SubjectPatch,
    ) -> Result<Subject, SubjectServiceError> {
        let mut subject = self.subjects.get_subject(&self.user, id).await?;
        subject.apply_patch(patch)?;
        self.subjects.upsert_subject(&self.user, &subject).await?;
        Ok(subject)
    }

    /// Select or deselect the whole registry for cycle generation in one
    /// step. Returns the affected count.
    ///
    /// # Errors
    ///
    /// Returns `SubjectServiceError::Storage` if persistence fails.
    pub async fn toggle_all(&self, active: bool) -> Result<u64, SubjectServiceError> {
        let affected = self.subjects.set_all_active(&self.user, active).await?;
        Ok(affected)
    }

    /// Remove a subject from the registry.
    ///
    /// Existing cycle items referencing it are left in place and dangle.
    /// Deleting an unknown id is a warn-logged no-op.
    ///
    /// # Errors
    ///
    /// Returns `SubjectServiceError::Storage` if persistence fails.
    pub async fn delete_subject(&self, id: SubjectId) -> Result<(), SubjectServiceError> {
        let removed = self.subjects.delete_subject(&self.user, id).await?;
        if !removed {
            tracing::warn!(subject = %id, "delete ignored: subject not found");
        }
        Ok(())
    }

    /// List the user's subjects in creation order.
    ///
    /// # Errors
    ///
    /// Returns `SubjectServiceError::Storage` if repository access fails.
    pub async fn list_subjects(&self) -> Result<Vec<Subject>, SubjectServiceError> {
        let subjects = self.subjects.list_subjects(&self.user).await?;
        Ok(subjects)
    }

    /// Fetch a single subject.
    ///
    /// # Errors
    ///
    /// Returns `SubjectServiceError::Storage` with `NotFound` for an
    /// unknown id.
    pub async fn get_subject(&self, id: SubjectId) -> Result<Subject, SubjectServiceError> {
        let subject = self.subjects.get_subject(&self.user, id).await?;
        Ok(subject)
    }
}
