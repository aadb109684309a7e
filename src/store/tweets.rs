use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use super::{ensure_owner, required_text, StoreError, StoreResult};
use crate::db::models::Tweet;
use crate::db::now_timestamp;

pub const MAX_CONTENT: usize = 280;

fn map_tweet(row: &rusqlite::Row<'_>) -> rusqlite::Result<Tweet> {
    Ok(Tweet {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        content: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

pub fn find_by_id(conn: &Connection, id: &str) -> StoreResult<Option<Tweet>> {
    let tweet = conn
        .query_row(
            "SELECT id, owner_id, content, created_at, updated_at FROM tweets WHERE id = ?1",
            params![id],
            map_tweet,
        )
        .optional()?;
    Ok(tweet)
}

pub fn create(conn: &Connection, owner_id: &str, content: &str) -> StoreResult<Tweet> {
    let content = required_text("Content", content, MAX_CONTENT)?;

    let id = uuid::Uuid::now_v7().to_string();
    let now = now_timestamp();
    conn.execute(
        "INSERT INTO tweets (id, owner_id, content, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?4)",
        params![id, owner_id, content, now],
    )?;

    find_by_id(conn, &id)?.ok_or_else(|| StoreError::NotFound("Tweet not found".into()))
}

pub fn update(conn: &mut Connection, id: &str, requester: &str, content: &str) -> StoreResult<Tweet> {
    let content = required_text("Content", content, MAX_CONTENT)?;

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    ensure_owner(&tx, "tweets", id, requester, "tweet")?;
    tx.execute(
        "UPDATE tweets SET content = ?1, updated_at = ?2 WHERE id = ?3",
        params![content, now_timestamp(), id],
    )?;
    let tweet = find_by_id(&tx, id)?.ok_or_else(|| StoreError::NotFound("Tweet not found".into()))?;
    tx.commit()?;
    Ok(tweet)
}

/// Delete a tweet owned by `requester` and the likes pointing at it.
pub fn delete(conn: &mut Connection, id: &str, requester: &str) -> StoreResult<Tweet> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    ensure_owner(&tx, "tweets", id, requester, "tweet")?;
    let tweet = find_by_id(&tx, id)?.ok_or_else(|| StoreError::NotFound("Tweet not found".into()))?;

    tx.execute(
        "DELETE FROM likes WHERE target_kind = 'tweet' AND target_id = ?1",
        params![id],
    )?;
    tx.execute("DELETE FROM tweets WHERE id = ?1", params![id])?;
    tx.commit()?;
    Ok(tweet)
}
