//! Entity store: schema validation and CRUD for every collection.
//!
//! Functions take a borrowed connection so callers decide pooling and
//! transaction scope. Mutations that depend on ownership re-check the stored
//! owner inside the same transaction as the write.

pub mod comments;
pub mod likes;
pub mod tweets;
pub mod users;
pub mod videos;

use rusqlite::{params, OptionalExtension, Transaction};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Invalid(String),

    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

/// Trim `value` and check it is present and at most `max` characters.
pub(crate) fn required_text(field: &str, value: &str, max: usize) -> StoreResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(StoreError::Invalid(format!("{} is required", field)));
    }
    if value.chars().count() > max {
        return Err(StoreError::Invalid(format!(
            "{} must be {} characters or less",
            field, max
        )));
    }
    Ok(value.to_string())
}

/// Confirm `requester` owns row `id` of `table`. `noun` names the entity in
/// error messages.
pub(crate) fn ensure_owner(
    tx: &Transaction<'_>,
    table: &str,
    id: &str,
    requester: &str,
    noun: &str,
) -> StoreResult<()> {
    let owner: Option<String> = tx
        .query_row(
            &format!("SELECT owner_id FROM {} WHERE id = ?1", table),
            params![id],
            |row| row.get(0),
        )
        .optional()?;

    match owner {
        None => Err(StoreError::NotFound(format!("{} not found", capitalize(noun)))),
        Some(owner) if owner != requester => Err(StoreError::Forbidden(format!(
            "You are not authorized to modify this {}",
            noun
        ))),
        Some(_) => Ok(()),
    }
}

pub(crate) fn exists(conn: &rusqlite::Connection, table: &str, id: &str) -> StoreResult<bool> {
    let found: bool = conn.query_row(
        &format!("SELECT COUNT(*) > 0 FROM {} WHERE id = ?1", table),
        params![id],
        |row| row.get(0),
    )?;
    Ok(found)
}

fn capitalize(noun: &str) -> String {
    let mut chars = noun.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
