use cycle_core::interleave::{Baseline, SessionSeed, interleave};
use cycle_core::model::{CycleItem, HistoryEntry, SubjectId};
use storage::repository::StorageError;

use super::service::CycleService;
use crate::error::CycleServiceError;

/// Result of one cycle generation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedCycle {
    /// The newly created sessions, in interleave order.
    pub items: Vec<CycleItem>,
    /// True when the storage layer rejected an optional field and the batch
    /// was re-written with a reduced payload; `history` and `completed_at`
    /// were not persisted in that case.
    pub degraded: bool,
}

impl CycleService {
    /// Build and persist a new round-robin queue over the selected subjects.
    ///
    /// With `keep_progress` the new sessions are appended to the existing
    /// queue, seeded with each subject's current aggregate as the shared
    /// baseline. Without it the selected subjects' aggregates are reset to
    /// zero and the existing queue is discarded entirely, as a deliberate
    /// full restart.
    ///
    /// Selected ids that no longer resolve are skipped with a warning; the
    /// selection may race a deletion.
    ///
    /// # Errors
    ///
    /// Returns `CycleServiceError::Storage` if persistence fails even after
    /// the reduced-payload retry.
    pub async fn generate_cycle(
        &self,
        selected: &[SubjectId],
        keep_progress: bool,
    ) -> Result<GeneratedCycle, CycleServiceError> {
        let now = self.clock.now();

        // load in selection order; that order is the round-robin tie-break
        let mut subjects = Vec::with_capacity(selected.len());
        for id in selected {
            match self.subjects.get_subject(&self.user, *id).await {
                Ok(subject) => subjects.push(subject),
                Err(StorageError::NotFound) => {
                    tracing::warn!(subject = %id, "selected subject missing; skipping");
                }
                Err(e) => return Err(e.into()),
            }
        }

        if !keep_progress {
            for subject in &mut subjects {
                subject.reset_tally();
                self.subjects.upsert_subject(&self.user, subject).await?;
            }
            let removed = self.items.clear_cycle(&self.user).await?;
            if removed > 0 {
                tracing::debug!(removed, "discarded existing cycle queue");
            }
        }

        let baseline = if keep_progress {
            Baseline::KeepProgress
        } else {
            Baseline::Reset
        };
        let seeds: Vec<SessionSeed> = subjects
            .iter()
            .map(|s| SessionSeed::from_subject(s, baseline))
            .collect();

        let mut items = interleave(&seeds, now);
        for item in &mut items {
            item.push_history(HistoryEntry::system("session initialized", now));
        }

        let degraded = match self.items.insert_items(&self.user, &items).await {
            Ok(()) => false,
            Err(StorageError::UnsupportedField(field)) => {
                tracing::warn!(
                    field = %field,
                    "storage rejected an optional field; retrying with reduced payload"
                );
                self.items.insert_items_reduced(&self.user, &items).await?;
                true
            }
            Err(e) => return Err(e.into()),
        };

        Ok(GeneratedCycle { items, degraded })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cycle_core::model::{CycleItem, Subject, UserId};
    use cycle_core::time::{fixed_clock, fixed_now};
    use std::sync::Arc;
    use storage::repository::{CycleRepository, InMemoryRepository, SubjectRepository};

    fn user() -> UserId {
        UserId::new("user-1")
    }

    fn service(repo: &InMemoryRepository) -> CycleService {
        CycleService::new(
            fixed_clock(),
            user(),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
        )
    }

    async fn seed_subject(repo: &InMemoryRepository, name: &str, frequency: u32) -> Subject {
        let subject = Subject::new(
            SubjectId::generate(),
            name,
            None,
            2.0,
            frequency,
            fixed_now(),
        )
        .unwrap();
        repo.upsert_subject(&user(), &subject).await.unwrap();
        subject
    }

    #[tokio::test]
    async fn generates_interleaved_queue_in_selection_order() {
        let repo = InMemoryRepository::new();
        let a = seed_subject(&repo, "A", 1).await;
        let b = seed_subject(&repo, "B", 3).await;
        let service = service(&repo);

        let generated = service
            .generate_cycle(&[a.id(), b.id()], false)
            .await
            .expect("generate");

        let names: Vec<&str> = generated.items.iter().map(CycleItem::name).collect();
        assert_eq!(names, vec!["A", "B", "B", "B"]);
        assert!(!generated.degraded);
        assert!(
            generated
                .items
                .iter()
                .all(|i| i.history().len() == 1 && i.history()[0].action() == "session initialized")
        );

        let stored = repo.list_items(&user()).await.unwrap();
        assert_eq!(stored.len(), 4);
    }

    #[tokio::test]
    async fn restart_resets_aggregates_and_discards_queue() {
        let repo = InMemoryRepository::new();
        let mut math = seed_subject(&repo, "Math", 3).await;
        math.record_tally(5, 2);
        repo.upsert_subject(&user(), &math).await.unwrap();
        let service = service(&repo);

        // an old queue that must be discarded
        service.generate_cycle(&[math.id()], true).await.unwrap();
        assert_eq!(repo.list_items(&user()).await.unwrap().len(), 3);

        let generated = service.generate_cycle(&[math.id()], false).await.unwrap();
        assert_eq!(generated.items.len(), 3);
        assert!(generated.items.iter().all(|i| i.correct() == 0 && i.wrong() == 0));

        let stored = repo.list_items(&user()).await.unwrap();
        assert_eq!(stored.len(), 3);

        let subject = repo.get_subject(&user(), math.id()).await.unwrap();
        assert_eq!((subject.total_correct(), subject.total_wrong()), (0, 0));
    }

    #[tokio::test]
    async fn keep_progress_appends_and_seeds_from_aggregate() {
        let repo = InMemoryRepository::new();
        let mut math = seed_subject(&repo, "Math", 2).await;
        math.record_tally(5, 2);
        repo.upsert_subject(&user(), &math).await.unwrap();
        let service = service(&repo);

        service.generate_cycle(&[math.id()], true).await.unwrap();
        let second = service.generate_cycle(&[math.id()], true).await.unwrap();

        assert!(second.items.iter().all(|i| i.correct() == 5 && i.wrong() == 2));
        assert_eq!(repo.list_items(&user()).await.unwrap().len(), 4);

        let subject = repo.get_subject(&user(), math.id()).await.unwrap();
        assert_eq!((subject.total_correct(), subject.total_wrong()), (5, 2));
    }

    #[tokio::test]
    async fn missing_selected_subject_is_skipped() {
        let repo = InMemoryRepository::new();
        let a = seed_subject(&repo, "A", 2).await;
        let service = service(&repo);

        let generated = service
            .generate_cycle(&[a.id(), SubjectId::generate()], false)
            .await
            .expect("generate");

        assert_eq!(generated.items.len(), 2);
        assert!(generated.items.iter().all(|i| i.name() == "A"));
    }
}
