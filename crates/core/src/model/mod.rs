mod history;
mod ids;
mod item;
mod subject;

pub use history::{HistoryEntry, HistoryKind};
pub use ids::{EntryId, ItemId, ParseIdError, SubjectId, UserId};
pub use item::{CycleItem, CycleItemError};
pub use subject::{Subject, SubjectError, SubjectPatch};
