use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use super::{ensure_owner, required_text, StoreError, StoreResult};
use crate::assets::AssetRef;
use crate::db::models::Video;
use crate::db::now_timestamp;

const VIDEO_COLUMNS: &str = "id, owner_id, title, description, video_url, video_store_id, \
     thumbnail_url, thumbnail_store_id, duration, views, is_published, created_at, updated_at";

pub const MAX_TITLE: usize = 200;
pub const MAX_DESCRIPTION: usize = 5000;

pub struct NewVideo<'a> {
    pub owner_id: &'a str,
    pub title: &'a str,
    pub description: &'a str,
    pub video: Option<&'a AssetRef>,
    pub thumbnail: Option<&'a AssetRef>,
    pub is_published: bool,
}

/// Partial update of a video's details. `None` leaves a field unchanged.
#[derive(Default)]
pub struct VideoChanges<'a> {
    pub title: Option<&'a str>,
    pub description: Option<&'a str>,
    pub thumbnail: Option<&'a AssetRef>,
}

fn map_video(row: &rusqlite::Row<'_>) -> rusqlite::Result<Video> {
    Ok(Video {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        video_url: row.get(4)?,
        video_store_id: row.get(5)?,
        thumbnail_url: row.get(6)?,
        thumbnail_store_id: row.get(7)?,
        duration: row.get(8)?,
        views: row.get(9)?,
        is_published: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

fn description_text(value: &str) -> StoreResult<String> {
    let value = value.trim();
    if value.chars().count() > MAX_DESCRIPTION {
        return Err(StoreError::Invalid(format!(
            "Description must be {} characters or less",
            MAX_DESCRIPTION
        )));
    }
    Ok(value.to_string())
}

pub fn create(conn: &Connection, new: &NewVideo<'_>) -> StoreResult<Video> {
    let title = required_text("Title", new.title, MAX_TITLE)?;
    let description = description_text(new.description)?;
    let duration = new.video.and_then(|v| v.duration).unwrap_or(0.0);

    let id = uuid::Uuid::now_v7().to_string();
    let now = now_timestamp();
    conn.execute(
        "INSERT INTO videos (id, owner_id, title, description, video_url, video_store_id,
                             thumbnail_url, thumbnail_store_id, duration, is_published,
                             created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
        params![
            id,
            new.owner_id,
            title,
            description,
            new.video.map(|a| a.url.as_str()),
            new.video.map(|a| a.store_id.as_str()),
            new.thumbnail.map(|a| a.url.as_str()),
            new.thumbnail.map(|a| a.store_id.as_str()),
            duration,
            new.is_published,
            now,
        ],
    )?;

    find_by_id(conn, &id)?.ok_or_else(|| StoreError::NotFound("Video not found".into()))
}

pub fn find_by_id(conn: &Connection, id: &str) -> StoreResult<Option<Video>> {
    let video = conn
        .query_row(
            &format!("SELECT {} FROM videos WHERE id = ?1", VIDEO_COLUMNS),
            params![id],
            map_video,
        )
        .optional()?;
    Ok(video)
}

/// Apply `changes` to a video owned by `requester`.
///
/// Returns the row as it was before the update followed by the updated row,
/// so the caller can discard a replaced thumbnail.
pub fn update_details(
    conn: &mut Connection,
    id: &str,
    requester: &str,
    changes: &VideoChanges<'_>,
) -> StoreResult<(Video, Video)> {
    let title = changes
        .title
        .map(|t| required_text("Title", t, MAX_TITLE))
        .transpose()?;
    let description = changes.description.map(description_text).transpose()?;

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    ensure_owner(&tx, "videos", id, requester, "video")?;
    let before = find_by_id(&tx, id)?.ok_or_else(|| StoreError::NotFound("Video not found".into()))?;

    tx.execute(
        "UPDATE videos SET
            title = COALESCE(?1, title),
            description = COALESCE(?2, description),
            thumbnail_url = COALESCE(?3, thumbnail_url),
            thumbnail_store_id = CASE WHEN ?3 IS NULL THEN thumbnail_store_id ELSE ?4 END,
            updated_at = ?5
         WHERE id = ?6",
        params![
            title,
            description,
            changes.thumbnail.map(|a| a.url.as_str()),
            changes.thumbnail.map(|a| a.store_id.as_str()),
            now_timestamp(),
            id,
        ],
    )?;
    let after = find_by_id(&tx, id)?.ok_or_else(|| StoreError::NotFound("Video not found".into()))?;
    tx.commit()?;

    Ok((before, after))
}

pub fn toggle_publish(conn: &mut Connection, id: &str, requester: &str) -> StoreResult<Video> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    ensure_owner(&tx, "videos", id, requester, "video")?;
    tx.execute(
        "UPDATE videos SET is_published = NOT is_published, updated_at = ?1 WHERE id = ?2",
        params![now_timestamp(), id],
    )?;
    let video = find_by_id(&tx, id)?.ok_or_else(|| StoreError::NotFound("Video not found".into()))?;
    tx.commit()?;
    Ok(video)
}

/// Published videos are visible to everyone, drafts only to their owner.
/// A missing video is not visible.
pub fn visible_to(conn: &Connection, id: &str, viewer: &str) -> StoreResult<bool> {
    let visible: Option<bool> = conn
        .query_row(
            "SELECT is_published OR owner_id = ?2 FROM videos WHERE id = ?1",
            params![id, viewer],
            |row| row.get(0),
        )
        .optional()?;
    Ok(visible.unwrap_or(false))
}

pub fn increment_views(conn: &Connection, id: &str) -> StoreResult<()> {
    conn.execute("UPDATE videos SET views = views + 1 WHERE id = ?1", params![id])?;
    Ok(())
}

/// Delete a video owned by `requester` along with its comments and every like
/// pointing at the video or at one of those comments.
///
/// Returns the deleted row so the caller can discard its assets.
pub fn delete(conn: &mut Connection, id: &str, requester: &str) -> StoreResult<Video> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    ensure_owner(&tx, "videos", id, requester, "video")?;
    let video = find_by_id(&tx, id)?.ok_or_else(|| StoreError::NotFound("Video not found".into()))?;

    tx.execute(
        "DELETE FROM likes WHERE target_kind = 'comment'
           AND target_id IN (SELECT id FROM comments WHERE video_id = ?1)",
        params![id],
    )?;
    tx.execute("DELETE FROM comments WHERE video_id = ?1", params![id])?;
    tx.execute(
        "DELETE FROM likes WHERE target_kind = 'video' AND target_id = ?1",
        params![id],
    )?;
    tx.execute("DELETE FROM videos WHERE id = ?1", params![id])?;
    tx.commit()?;

    tracing::info!("Deleted video {} and its comments and likes", id);
    Ok(video)
}
