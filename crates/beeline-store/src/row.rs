//! Row conversion helpers shared by the collection modules.

use chrono::{DateTime, Utc};
use rusqlite::Row;
use uuid::Uuid;

use beeline_shared::UserId;

fn conversion_err(
    idx: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

pub(crate) fn uuid_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let s: String = row.get(idx)?;
    Uuid::parse_str(&s).map_err(|e| conversion_err(idx, e))
}

pub(crate) fn user_id_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<UserId> {
    uuid_col(row, idx).map(UserId)
}

pub(crate) fn opt_user_id_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<UserId>> {
    let s: Option<String> = row.get(idx)?;
    s.map(|s| UserId::parse(&s).map_err(|e| conversion_err(idx, e)))
        .transpose()
}

pub(crate) fn ts_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_err(idx, e))
}

pub(crate) fn opt_ts_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let s: Option<String> = row.get(idx)?;
    s.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| conversion_err(idx, e))
    })
    .transpose()
}
