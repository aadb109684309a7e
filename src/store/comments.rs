use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use super::{ensure_owner, required_text, StoreError, StoreResult};
use crate::db::models::Comment;
use crate::db::now_timestamp;

pub const MAX_CONTENT: usize = 1000;

fn map_comment(row: &rusqlite::Row<'_>) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: row.get(0)?,
        video_id: row.get(1)?,
        owner_id: row.get(2)?,
        content: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

pub fn find_by_id(conn: &Connection, id: &str) -> StoreResult<Option<Comment>> {
    let comment = conn
        .query_row(
            "SELECT id, video_id, owner_id, content, created_at, updated_at
             FROM comments WHERE id = ?1",
            params![id],
            map_comment,
        )
        .optional()?;
    Ok(comment)
}

/// Whether comment `id` exists and sits on a video `viewer` can see.
pub fn visible_to(conn: &Connection, id: &str, viewer: &str) -> StoreResult<bool> {
    let visible: Option<bool> = conn
        .query_row(
            "SELECT v.is_published OR v.owner_id = ?2
             FROM comments c JOIN videos v ON v.id = c.video_id
             WHERE c.id = ?1",
            params![id, viewer],
            |row| row.get(0),
        )
        .optional()?;
    Ok(visible.unwrap_or(false))
}

pub fn create(conn: &Connection, video_id: &str, owner_id: &str, content: &str) -> StoreResult<Comment> {
    let content = required_text("Content", content, MAX_CONTENT)?;
    if !super::videos::visible_to(conn, video_id, owner_id)? {
        return Err(StoreError::NotFound("Video not found".into()));
    }

    let id = uuid::Uuid::now_v7().to_string();
    let now = now_timestamp();
    conn.execute(
        "INSERT INTO comments (id, video_id, owner_id, content, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
        params![id, video_id, owner_id, content, now],
    )?;

    find_by_id(conn, &id)?.ok_or_else(|| StoreError::NotFound("Comment not found".into()))
}

pub fn update(conn: &mut Connection, id: &str, requester: &str, content: &str) -> StoreResult<Comment> {
    let content = required_text("Content", content, MAX_CONTENT)?;

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    ensure_owner(&tx, "comments", id, requester, "comment")?;
    tx.execute(
        "UPDATE comments SET content = ?1, updated_at = ?2 WHERE id = ?3",
        params![content, now_timestamp(), id],
    )?;
    let comment = find_by_id(&tx, id)?.ok_or_else(|| StoreError::NotFound("Comment not found".into()))?;
    tx.commit()?;
    Ok(comment)
}

/// Delete a comment owned by `requester` and the likes pointing at it.
pub fn delete(conn: &mut Connection, id: &str, requester: &str) -> StoreResult<Comment> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    ensure_owner(&tx, "comments", id, requester, "comment")?;
    let comment = find_by_id(&tx, id)?.ok_or_else(|| StoreError::NotFound("Comment not found".into()))?;

    tx.execute(
        "DELETE FROM likes WHERE target_kind = 'comment' AND target_id = ?1",
        params![id],
    )?;
    tx.execute("DELETE FROM comments WHERE id = ?1", params![id])?;
    tx.commit()?;
    Ok(comment)
}
