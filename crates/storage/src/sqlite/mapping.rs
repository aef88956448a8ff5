use cycle_core::model::{CycleItem, HistoryEntry, ItemId, Subject, SubjectId};
use sqlx::Row;
use uuid::Uuid;

use crate::repository::StorageError;

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn subject_id_from_text(v: &str) -> Result<SubjectId, StorageError> {
    Ok(SubjectId::new(Uuid::parse_str(v).map_err(ser)?))
}

pub(crate) fn item_id_from_text(v: &str) -> Result<ItemId, StorageError> {
    Ok(ItemId::new(Uuid::parse_str(v).map_err(ser)?))
}

/// Encode an item's history log for its JSON text column.
pub(crate) fn history_to_json(history: &[HistoryEntry]) -> Result<String, StorageError> {
    serde_json::to_string(history).map_err(ser)
}

pub(crate) fn history_from_json(raw: &str) -> Result<Vec<HistoryEntry>, StorageError> {
    serde_json::from_str(raw).map_err(ser)
}

fn tally_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

/// Map a write-path sqlx error, distinguishing schema drift from plain
/// connection failures so callers can degrade instead of aborting.
pub(crate) fn map_write_err(e: sqlx::Error) -> StorageError {
    if let Some(db) = e.as_database_error() {
        let msg = db.message();
        if let Some(field) = unsupported_field(msg) {
            return StorageError::UnsupportedField(field);
        }
    }
    StorageError::Connection(e.to_string())
}

// SQLite reports an unknown INSERT column as "table t has no column named c"
// and an unknown reference as "no such column: c".
fn unsupported_field(msg: &str) -> Option<String> {
    for marker in ["has no column named ", "no such column: "] {
        if let Some(idx) = msg.find(marker) {
            let field = msg[idx + marker.len()..]
                .split_whitespace()
                .next()?
                .to_owned();
            return Some(field);
        }
    }
    None
}

pub(crate) fn map_subject_row(row: &sqlx::sqlite::SqliteRow) -> Result<Subject, StorageError> {
    let id = subject_id_from_text(&row.try_get::<String, _>("id").map_err(ser)?)?;

    Subject::from_persisted(
        id,
        row.try_get::<String, _>("name").map_err(ser)?,
        row.try_get::<Option<String>, _>("notebook_url").map_err(ser)?,
        row.try_get::<f64, _>("total_hours").map_err(ser)?,
        tally_from_i64("frequency", row.try_get::<i64, _>("frequency").map_err(ser)?)?,
        row.try_get::<bool, _>("is_active").map_err(ser)?,
        tally_from_i64(
            "total_correct",
            row.try_get::<i64, _>("total_correct").map_err(ser)?,
        )?,
        tally_from_i64(
            "total_wrong",
            row.try_get::<i64, _>("total_wrong").map_err(ser)?,
        )?,
        row.try_get("created_at").map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_item_row(row: &sqlx::sqlite::SqliteRow) -> Result<CycleItem, StorageError> {
    let id = item_id_from_text(&row.try_get::<String, _>("id").map_err(ser)?)?;
    let subject_id = subject_id_from_text(&row.try_get::<String, _>("subject_id").map_err(ser)?)?;
    let history = history_from_json(&row.try_get::<String, _>("history").map_err(ser)?)?;

    CycleItem::from_persisted(
        id,
        subject_id,
        row.try_get::<String, _>("name").map_err(ser)?,
        row.try_get::<Option<String>, _>("notebook_url").map_err(ser)?,
        row.try_get::<bool, _>("completed").map_err(ser)?,
        row.try_get("completed_at").map_err(ser)?,
        row.try_get("created_at").map_err(ser)?,
        tally_from_i64("correct", row.try_get::<i64, _>("correct").map_err(ser)?)?,
        tally_from_i64("wrong", row.try_get::<i64, _>("wrong").map_err(ser)?)?,
        row.try_get::<f64, _>("hours_per_session").map_err(ser)?,
        history,
    )
    .map_err(ser)
}
