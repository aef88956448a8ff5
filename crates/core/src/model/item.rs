use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::history::HistoryEntry;
use crate::model::ids::{ItemId, SubjectId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CycleItemError {
    #[error("session name cannot be empty")]
    EmptyName,

    #[error("hours per session must be a positive number")]
    InvalidHours,

    #[error("completed flag and completion timestamp disagree")]
    CompletionMismatch,
}

//
// ─── CYCLE ITEM ────────────────────────────────────────────────────────────────
//

/// One scheduled occurrence of studying a subject within a cycle.
///
/// `name`, `notebook_url` and `hours_per_session` are snapshots copied from
/// the subject at generation time; the hours snapshot is never resynced.
/// `subject_id` is a weak reference and may dangle once the subject is
/// deleted; readers must tolerate orphans.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleItem {
    id: ItemId,
    subject_id: SubjectId,
    name: String,
    notebook_url: Option<String>,
    completed: bool,
    completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    correct: u32,
    wrong: u32,
    hours_per_session: f64,
    history: Vec<HistoryEntry>,
}

impl CycleItem {
    /// Synthesize a fresh pending placeholder; used by the interleaver.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn placeholder(
        id: ItemId,
        subject_id: SubjectId,
        name: String,
        notebook_url: Option<String>,
        hours_per_session: f64,
        correct: u32,
        wrong: u32,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            subject_id,
            name,
            notebook_url,
            completed: false,
            completed_at: None,
            created_at,
            correct,
            wrong,
            hours_per_session,
            history: Vec::new(),
        }
    }

    /// Rehydrate a cycle item from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `CycleItemError::EmptyName` for a blank name,
    /// `CycleItemError::InvalidHours` for a non-positive duration, and
    /// `CycleItemError::CompletionMismatch` when `completed` and
    /// `completed_at` disagree.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        id: ItemId,
        subject_id: SubjectId,
        name: impl Into<String>,
        notebook_url: Option<String>,
        completed: bool,
        completed_at: Option<DateTime<Utc>>,
        created_at: DateTime<Utc>,
        correct: u32,
        wrong: u32,
        hours_per_session: f64,
        history: Vec<HistoryEntry>,
    ) -> Result<Self, CycleItemError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(CycleItemError::EmptyName);
        }
        if !hours_per_session.is_finite() || hours_per_session <= 0.0 {
            return Err(CycleItemError::InvalidHours);
        }
        if completed != completed_at.is_some() {
            return Err(CycleItemError::CompletionMismatch);
        }

        Ok(Self {
            id,
            subject_id,
            name: name.trim().to_owned(),
            notebook_url: notebook_url.filter(|l| !l.trim().is_empty()),
            completed,
            completed_at,
            created_at,
            correct,
            wrong,
            hours_per_session,
            history,
        })
    }

    // Accessors
    #[must_use]
    pub fn id(&self) -> ItemId {
        self.id
    }

    #[must_use]
    pub fn subject_id(&self) -> SubjectId {
        self.subject_id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn notebook_url(&self) -> Option<&str> {
        self.notebook_url.as_deref()
    }

    #[must_use]
    pub fn completed(&self) -> bool {
        self.completed
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn correct(&self) -> u32 {
        self.correct
    }

    #[must_use]
    pub fn wrong(&self) -> u32 {
        self.wrong
    }

    #[must_use]
    pub fn hours_per_session(&self) -> f64 {
        self.hours_per_session
    }

    #[must_use]
    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        !self.completed
    }

    // Mutators

    /// Mark the session completed, freezing the tally at the given values.
    ///
    /// The frozen tally is the subject aggregate at the moment of
    /// completion, not whatever a caller happened to submit alongside the
    /// transition.
    pub fn mark_completed(&mut self, frozen_correct: u32, frozen_wrong: u32, at: DateTime<Utc>) {
        self.completed = true;
        self.completed_at = Some(at);
        self.correct = frozen_correct;
        self.wrong = frozen_wrong;
    }

    /// Reopen a completed session, clearing the completion timestamp.
    pub fn reopen(&mut self) {
        self.completed = false;
        self.completed_at = None;
    }

    /// Overwrite the shared pending-tally counter.
    pub fn set_tally(&mut self, correct: u32, wrong: u32) {
        self.correct = correct;
        self.wrong = wrong;
    }

    /// Replace the notebook link; an empty string clears it.
    pub fn set_notebook_url(&mut self, link: Option<String>) {
        self.notebook_url = link.map(|l| l.trim().to_owned()).filter(|l| !l.is_empty());
    }

    /// Append an audit entry. History only ever grows.
    pub fn push_history(&mut self, entry: HistoryEntry) {
        self.history.push(entry);
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
