use chrono::{DateTime, Utc};
use thiserror::Error;
use url::Url;

use crate::model::ids::SubjectId;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SubjectError {
    #[error("subject name cannot be empty")]
    EmptyName,

    #[error("session hours must be a positive number")]
    InvalidHours,

    #[error("repeat frequency must be at least 1")]
    InvalidFrequency,

    #[error("notebook link is not a valid URL: {0}")]
    InvalidNotebookUrl(String),
}

//
// ─── SUBJECT ───────────────────────────────────────────────────────────────────
//

/// A registered study topic with a per-session duration and a cycle repeat
/// frequency.
///
/// `total_correct` / `total_wrong` hold the subject's cumulative quiz tally;
/// the synchronizer keeps them equal to the shared counter carried by the
/// subject's pending sessions, so the next cycle generation starts from the
/// latest known aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct Subject {
    id: SubjectId,
    name: String,
    notebook_url: Option<String>,
    total_hours: f64,
    frequency: u32,
    is_active: bool,
    total_correct: u32,
    total_wrong: u32,
    created_at: DateTime<Utc>,
}

/// Partial update for a subject; `None` fields are left untouched.
///
/// An empty `notebook_url` string clears the stored link.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubjectPatch {
    pub name: Option<String>,
    pub notebook_url: Option<String>,
    pub total_hours: Option<f64>,
    pub frequency: Option<u32>,
    pub is_active: Option<bool>,
}

impl Subject {
    /// Creates a new Subject with a zeroed tally, active by default.
    ///
    /// # Errors
    ///
    /// Returns `SubjectError::EmptyName` if the trimmed name is empty,
    /// `SubjectError::InvalidHours` if hours are not finite and positive,
    /// `SubjectError::InvalidFrequency` if the frequency is zero, and
    /// `SubjectError::InvalidNotebookUrl` if a non-empty link fails to parse.
    pub fn new(
        id: SubjectId,
        name: impl Into<String>,
        notebook_url: Option<String>,
        total_hours: f64,
        frequency: u32,
        created_at: DateTime<Utc>,
    ) -> Result<Self, SubjectError> {
        Self::from_persisted(
            id,
            name,
            notebook_url,
            total_hours,
            frequency,
            true,
            0,
            0,
            created_at,
        )
    }

    /// Rehydrate a subject from persisted storage, re-applying validation.
    ///
    /// # Errors
    ///
    /// Same validation failures as [`Subject::new`].
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        id: SubjectId,
        name: impl Into<String>,
        notebook_url: Option<String>,
        total_hours: f64,
        frequency: u32,
        is_active: bool,
        total_correct: u32,
        total_wrong: u32,
        created_at: DateTime<Utc>,
    ) -> Result<Self, SubjectError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(SubjectError::EmptyName);
        }
        if !total_hours.is_finite() || total_hours <= 0.0 {
            return Err(SubjectError::InvalidHours);
        }
        if frequency == 0 {
            return Err(SubjectError::InvalidFrequency);
        }
        let notebook_url = validate_link(notebook_url)?;

        Ok(Self {
            id,
            name: name.trim().to_owned(),
            notebook_url,
            total_hours,
            frequency,
            is_active,
            total_correct,
            total_wrong,
            created_at,
        })
    }

    // Accessors
    #[must_use]
    pub fn id(&self) -> SubjectId {
        self.id
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
    pub fn total_hours(&self) -> f64 {
        self.total_hours
    }

    #[must_use]
    pub fn frequency(&self) -> u32 {
        self.frequency
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.is_active
    }

    #[must_use]
    pub fn total_correct(&self) -> u32 {
        self.total_correct
    }

    #[must_use]
    pub fn total_wrong(&self) -> u32 {
        self.total_wrong
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    // Mutators

    pub fn set_active(&mut self, active: bool) {
        self.is_active = active;
    }

    /// Overwrite the aggregate tally with the latest shared counter.
    pub fn record_tally(&mut self, correct: u32, wrong: u32) {
        self.total_correct = correct;
        self.total_wrong = wrong;
    }

    /// Zero the aggregate tally ahead of a full cycle restart.
    pub fn reset_tally(&mut self) {
        self.total_correct = 0;
        self.total_wrong = 0;
    }

    /// Replace the notebook link without URL validation.
    ///
    /// Fan-out copies an already-validated link from the edited session; an
    /// empty string clears it.
    pub fn set_notebook_url(&mut self, link: Option<String>) {
        self.notebook_url = link.map(|l| l.trim().to_owned()).filter(|l| !l.is_empty());
    }

    /// Merge a partial update, re-validating the result.
    ///
    /// # Errors
    ///
    /// Same validation failures as [`Subject::new`]; the subject is left
    /// unchanged on error.
    pub fn apply_patch(&mut self, patch: SubjectPatch) -> Result<(), SubjectError> {
        let notebook_url = match patch.notebook_url {
            Some(raw) => Some(raw).filter(|l| !l.trim().is_empty()),
            None => self.notebook_url.clone(),
        };

        let merged = Self::from_persisted(
            self.id,
            patch.name.unwrap_or_else(|| self.name.clone()),
            notebook_url,
            patch.total_hours.unwrap_or(self.total_hours),
            patch.frequency.unwrap_or(self.frequency),
            patch.is_active.unwrap_or(self.is_active),
            self.total_correct,
            self.total_wrong,
            self.created_at,
        )?;
        *self = merged;
        Ok(())
    }
}

fn validate_link(raw: Option<String>) -> Result<Option<String>, SubjectError> {
    let Some(raw) = raw else { return Ok(None) };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    Url::parse(trimmed).map_err(|_| SubjectError::InvalidNotebookUrl(trimmed.to_owned()))?;
    Ok(Some(trimmed.to_owned()))
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
