use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids::EntryId;

/// Category of an audit entry on a cycle item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryKind {
    /// Completion state changed.
    Status,
    /// Quiz tally changed.
    Performance,
    /// Notebook link changed.
    Link,
    /// Lifecycle event emitted by the planner itself.
    System,
}

/// One append-only audit record.
///
/// Entries are never mutated or removed; reopening and re-completing a
/// session appends new entries rather than truncating old ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    id: EntryId,
    timestamp: DateTime<Utc>,
    action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    details: Option<String>,
    kind: HistoryKind,
}

impl HistoryEntry {
    #[must_use]
    pub fn new(
        kind: HistoryKind,
        action: impl Into<String>,
        details: Option<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EntryId::generate(),
            timestamp,
            action: action.into(),
            details,
            kind,
        }
    }

    /// Status entry for a completion-state transition.
    #[must_use]
    pub fn status(action: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self::new(HistoryKind::Status, action, None, timestamp)
    }

    /// Performance entry recording a before → after tally delta.
    #[must_use]
    pub fn performance(
        action: impl Into<String>,
        before: u32,
        after: u32,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self::new(
            HistoryKind::Performance,
            action,
            Some(format!("{before} → {after}")),
            timestamp,
        )
    }

    /// Link entry for a notebook URL change.
    #[must_use]
    pub fn link(action: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self::new(HistoryKind::Link, action, None, timestamp)
    }

    /// System entry for planner-emitted lifecycle events.
    #[must_use]
    pub fn system(action: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self::new(HistoryKind::System, action, None, timestamp)
    }

    // Accessors
    #[must_use]
    pub fn id(&self) -> EntryId {
        self.id
    }

    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    #[must_use]
    pub fn action(&self) -> &str {
        &self.action
    }

    #[must_use]
    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }

    #[must_use]
    pub fn kind(&self) -> HistoryKind {
        self.kind
    }
}
