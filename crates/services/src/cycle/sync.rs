use cycle_core::model::{CycleItem, HistoryEntry, ItemId};
use storage::repository::StorageError;

use super::service::CycleService;
use crate::error::CycleServiceError;

/// Partial update for one session; `None` fields are left untouched.
///
/// An empty `notebook_url` string clears the stored link.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemPatch {
    pub completed: Option<bool>,
    pub correct: Option<u32>,
    pub wrong: Option<u32>,
    pub notebook_url: Option<String>,
}

/// What one synchronizer pass touched.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncOutcome {
    /// The target item after the merge, history included.
    pub item: CycleItem,
    /// Pending siblings that received the fan-out overwrite.
    pub siblings_updated: u64,
    /// Whether the owning subject's aggregate was rewritten.
    pub aggregate_updated: bool,
}

impl CycleService {
    /// Apply an edit to one session and fan it out consistently.
    ///
    /// Completion transitions append a status history entry; completing
    /// freezes the tally at the owning subject's current aggregate (caller
    /// values are ignored), reopening clears the completion timestamp.
    /// Re-sending the current `completed` value is a no-op and appends no
    /// history.
    ///
    /// Tally and link changes append performance/link history entries and
    /// are then pushed into the subject aggregate and every other pending
    /// session of the same subject. Completed siblings are never touched;
    /// the sibling overwrite is idempotent, so a failed fan-out can be
    /// retried without corrupting frozen records.
    ///
    /// # Errors
    ///
    /// Returns `CycleServiceError::Storage` with `NotFound` for an unknown
    /// id, `CycleServiceError::ItemFrozen` for tally/link edits on a
    /// completed session, or other persistence failures.
    pub async fn apply_update(
        &self,
        id: ItemId,
        patch: ItemPatch,
    ) -> Result<SyncOutcome, CycleServiceError> {
        let mut item = self.items.get_item(&self.user, id).await?;
        let now = self.clock.now();

        let completion_change = patch.completed.filter(|&c| c != item.completed());
        let wants_data_edit =
            patch.correct.is_some() || patch.wrong.is_some() || patch.notebook_url.is_some();

        if item.completed() && completion_change.is_none() && wants_data_edit {
            return Err(CycleServiceError::ItemFrozen(id));
        }

        let mut fan_out = false;

        match completion_change {
            Some(true) => {
                // Freeze at the subject aggregate, not whatever the caller
                // sent alongside the transition.
                let (frozen_correct, frozen_wrong) =
                    match self.subjects.get_subject(&self.user, item.subject_id()).await {
                        Ok(subject) => (subject.total_correct(), subject.total_wrong()),
                        Err(StorageError::NotFound) => {
                            tracing::warn!(
                                item = %id,
                                subject = %item.subject_id(),
                                "subject missing; freezing completion at the item's own tally"
                            );
                            (item.correct(), item.wrong())
                        }
                        Err(e) => return Err(e.into()),
                    };
                item.push_history(HistoryEntry::status("session completed", now));
                item.mark_completed(frozen_correct, frozen_wrong, now);
            }
            Some(false) => {
                item.push_history(HistoryEntry::status("session reopened", now));
                item.reopen();
            }
            None => {}
        }

        // Tally/link edits only ever land on a pending session. A completing
        // patch already froze the record above and skips this entirely.
        if item.is_pending() {
            if let Some(correct) = patch.correct {
                if correct != item.correct() {
                    item.push_history(HistoryEntry::performance(
                        "correct updated",
                        item.correct(),
                        correct,
                        now,
                    ));
                    item.set_tally(correct, item.wrong());
                    fan_out = true;
                }
            }
            if let Some(wrong) = patch.wrong {
                if wrong != item.wrong() {
                    item.push_history(HistoryEntry::performance(
                        "wrong updated",
                        item.wrong(),
                        wrong,
                        now,
                    ));
                    item.set_tally(item.correct(), wrong);
                    fan_out = true;
                }
            }
            if let Some(raw) = patch.notebook_url {
                let link = Some(raw.trim().to_owned()).filter(|l| !l.is_empty());
                if link.as_deref() != item.notebook_url() {
                    item.push_history(HistoryEntry::link("notebook link updated", now));
                    item.set_notebook_url(link);
                    fan_out = true;
                }
            }
        }

        // The primary write lands first; a failed fan-out afterwards leaves
        // frozen records intact and the retry is a pure overwrite.
        self.items.upsert_item(&self.user, &item).await?;

        let mut siblings_updated = 0;
        let mut aggregate_updated = false;
        if fan_out {
            match self.subjects.get_subject(&self.user, item.subject_id()).await {
                Ok(mut subject) => {
                    subject.record_tally(item.correct(), item.wrong());
                    subject.set_notebook_url(item.notebook_url().map(str::to_owned));
                    self.subjects.upsert_subject(&self.user, &subject).await?;
                    aggregate_updated = true;
                }
                Err(StorageError::NotFound) => {
                    tracing::warn!(
                        item = %id,
                        subject = %item.subject_id(),
                        "subject missing; skipping aggregate update"
                    );
                }
                Err(e) => return Err(e.into()),
            }

            siblings_updated = self
                .items
                .sync_pending_siblings(
                    &self.user,
                    item.subject_id(),
                    item.id(),
                    item.correct(),
                    item.wrong(),
                    item.notebook_url(),
                )
                .await?;
        }

        Ok(SyncOutcome {
            item,
            siblings_updated,
            aggregate_updated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cycle_core::model::{HistoryKind, Subject, SubjectId, UserId};
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

    async fn seed_subject_with_items(
        repo: &InMemoryRepository,
        frequency: u32,
    ) -> (Subject, Vec<cycle_core::model::CycleItem>) {
        let subject = Subject::new(
            SubjectId::generate(),
            "Math",
            None,
            2.0,
            frequency,
            fixed_now(),
        )
        .unwrap();
        repo.upsert_subject(&user(), &subject).await.unwrap();

        let items = cycle_core::interleave(
            &[cycle_core::SessionSeed::from_subject(
                &subject,
                cycle_core::Baseline::Reset,
            )],
            fixed_now(),
        );
        repo.insert_items(&user(), &items).await.unwrap();
        (subject, items)
    }

    #[tokio::test]
    async fn tally_edit_fans_out_to_pending_siblings_and_aggregate() {
        let repo = InMemoryRepository::new();
        let (subject, items) = seed_subject_with_items(&repo, 3).await;
        let service = service(&repo);

        let outcome = service
            .apply_update(
                items[0].id(),
                ItemPatch {
                    correct: Some(4),
                    ..ItemPatch::default()
                },
            )
            .await
            .expect("apply update");

        assert_eq!(outcome.siblings_updated, 2);
        assert!(outcome.aggregate_updated);
        assert_eq!(outcome.item.correct(), 4);

        for item in repo.list_items(&user()).await.unwrap() {
            assert_eq!(item.correct(), 4);
            assert_eq!(item.wrong(), 0);
        }

        let subject = repo.get_subject(&user(), subject.id()).await.unwrap();
        assert_eq!((subject.total_correct(), subject.total_wrong()), (4, 0));
    }

    #[tokio::test]
    async fn completion_freezes_at_subject_aggregate_not_caller_values() {
        let repo = InMemoryRepository::new();
        let (subject, items) = seed_subject_with_items(&repo, 3).await;
        let service = service(&repo);

        // bring the shared counter to 4/1 first
        service
            .apply_update(
                items[0].id(),
                ItemPatch {
                    correct: Some(4),
                    wrong: Some(1),
                    ..ItemPatch::default()
                },
            )
            .await
            .unwrap();

        // the caller-supplied tally on the completion patch is ignored
        let outcome = service
            .apply_update(
                items[1].id(),
                ItemPatch {
                    completed: Some(true),
                    correct: Some(99),
                    wrong: Some(99),
                    ..ItemPatch::default()
                },
            )
            .await
            .unwrap();

        assert!(outcome.item.completed());
        assert_eq!(outcome.item.completed_at(), Some(fixed_now()));
        assert_eq!((outcome.item.correct(), outcome.item.wrong()), (4, 1));
        assert_eq!(outcome.siblings_updated, 0);

        // the two remaining pending sessions keep their shared counter
        let pending = repo
            .pending_items_for_subject(&user(), subject.id())
            .await
            .unwrap();
        assert_eq!(pending.len(), 2);
        assert!(pending.iter().all(|i| i.correct() == 4 && i.wrong() == 1));
    }

    #[tokio::test]
    async fn completed_items_survive_later_sibling_edits() {
        let repo = InMemoryRepository::new();
        let (_, items) = seed_subject_with_items(&repo, 3).await;
        let service = service(&repo);

        service
            .apply_update(
                items[0].id(),
                ItemPatch {
                    completed: Some(true),
                    ..ItemPatch::default()
                },
            )
            .await
            .unwrap();
        let frozen = service.get_item(items[0].id()).await.unwrap();

        service
            .apply_update(
                items[1].id(),
                ItemPatch {
                    correct: Some(7),
                    wrong: Some(2),
                    notebook_url: Some("https://example.com/new".into()),
                    ..ItemPatch::default()
                },
            )
            .await
            .unwrap();

        let after = service.get_item(items[0].id()).await.unwrap();
        assert_eq!(after, frozen);

        let third = service.get_item(items[2].id()).await.unwrap();
        assert_eq!((third.correct(), third.wrong()), (7, 2));
        assert_eq!(third.notebook_url(), Some("https://example.com/new"));
    }

    #[tokio::test]
    async fn completing_twice_appends_no_duplicate_history() {
        let repo = InMemoryRepository::new();
        let (_, items) = seed_subject_with_items(&repo, 1).await;
        let service = service(&repo);

        let patch = ItemPatch {
            completed: Some(true),
            ..ItemPatch::default()
        };
        let first = service.apply_update(items[0].id(), patch.clone()).await.unwrap();
        let second = service.apply_update(items[0].id(), patch).await.unwrap();

        assert_eq!(first.item.history().len(), 1);
        assert_eq!(second.item.history().len(), 1);
        assert_eq!(second.item.completed_at(), first.item.completed_at());
    }

    #[tokio::test]
    async fn reopen_then_recomplete_appends_history() {
        let repo = InMemoryRepository::new();
        let (_, items) = seed_subject_with_items(&repo, 1).await;
        let service = service(&repo);
        let id = items[0].id();

        let complete = ItemPatch {
            completed: Some(true),
            ..ItemPatch::default()
        };
        let reopen = ItemPatch {
            completed: Some(false),
            ..ItemPatch::default()
        };

        service.apply_update(id, complete.clone()).await.unwrap();
        let reopened = service.apply_update(id, reopen).await.unwrap();
        assert!(reopened.item.is_pending());
        assert_eq!(reopened.item.completed_at(), None);

        let done = service.apply_update(id, complete).await.unwrap();
        let kinds: Vec<HistoryKind> = done.item.history().iter().map(|e| e.kind()).collect();
        assert_eq!(
            kinds,
            vec![HistoryKind::Status, HistoryKind::Status, HistoryKind::Status]
        );
        assert_eq!(done.item.history().len(), 3);
    }

    #[tokio::test]
    async fn tally_edit_on_completed_item_is_rejected() {
        let repo = InMemoryRepository::new();
        let (_, items) = seed_subject_with_items(&repo, 1).await;
        let service = service(&repo);

        service
            .apply_update(
                items[0].id(),
                ItemPatch {
                    completed: Some(true),
                    ..ItemPatch::default()
                },
            )
            .await
            .unwrap();

        let err = service
            .apply_update(
                items[0].id(),
                ItemPatch {
                    correct: Some(10),
                    ..ItemPatch::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CycleServiceError::ItemFrozen(_)));
    }

    #[tokio::test]
    async fn performance_history_records_before_after_delta() {
        let repo = InMemoryRepository::new();
        let (_, items) = seed_subject_with_items(&repo, 1).await;
        let service = service(&repo);

        service
            .apply_update(
                items[0].id(),
                ItemPatch {
                    correct: Some(3),
                    ..ItemPatch::default()
                },
            )
            .await
            .unwrap();
        let outcome = service
            .apply_update(
                items[0].id(),
                ItemPatch {
                    correct: Some(5),
                    ..ItemPatch::default()
                },
            )
            .await
            .unwrap();

        let last = outcome.item.history().last().unwrap();
        assert_eq!(last.kind(), HistoryKind::Performance);
        assert_eq!(last.details(), Some("3 → 5"));
    }

    #[tokio::test]
    async fn orphaned_item_freezes_at_own_tally_and_still_syncs_siblings() {
        let repo = InMemoryRepository::new();
        let (subject, items) = seed_subject_with_items(&repo, 2).await;
        let service = service(&repo);

        service
            .apply_update(
                items[0].id(),
                ItemPatch {
                    correct: Some(6),
                    ..ItemPatch::default()
                },
            )
            .await
            .unwrap();

        // delete the subject; both sessions now dangle
        repo.delete_subject(&user(), subject.id()).await.unwrap();

        let outcome = service
            .apply_update(
                items[1].id(),
                ItemPatch {
                    wrong: Some(2),
                    ..ItemPatch::default()
                },
            )
            .await
            .unwrap();
        assert!(!outcome.aggregate_updated);
        assert_eq!(outcome.siblings_updated, 1);

        let done = service
            .apply_update(
                items[0].id(),
                ItemPatch {
                    completed: Some(true),
                    ..ItemPatch::default()
                },
            )
            .await
            .unwrap();
        // no aggregate to freeze from; the item's own counter stands
        assert_eq!((done.item.correct(), done.item.wrong()), (6, 2));
    }

    #[tokio::test]
    async fn unknown_item_surfaces_not_found() {
        let repo = InMemoryRepository::new();
        let service = service(&repo);

        let err = service
            .apply_update(cycle_core::model::ItemId::generate(), ItemPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CycleServiceError::Storage(StorageError::NotFound)
        ));
    }
}
