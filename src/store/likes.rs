use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use super::{comments, exists, is_unique_violation, videos, StoreError, StoreResult};
use crate::db::models::{Like, LikeTarget};
use crate::db::now_timestamp;

/// Result of flipping a user's like on a target.
#[derive(Debug, Clone)]
pub enum ToggleOutcome {
    Added(Like),
    Removed(Like),
}

impl ToggleOutcome {
    pub fn is_added(&self) -> bool {
        matches!(self, ToggleOutcome::Added(_))
    }

    pub fn like(&self) -> &Like {
        match self {
            ToggleOutcome::Added(like) | ToggleOutcome::Removed(like) => like,
        }
    }
}

fn target_table(target: &LikeTarget) -> (&'static str, &'static str) {
    match target {
        LikeTarget::Video(_) => ("videos", "Video"),
        LikeTarget::Comment(_) => ("comments", "Comment"),
        LikeTarget::Tweet(_) => ("tweets", "Tweet"),
    }
}

fn map_like(row: &rusqlite::Row<'_>) -> rusqlite::Result<Like> {
    let kind: String = row.get(2)?;
    let target_id: String = row.get(3)?;
    let target = LikeTarget::from_parts(&kind, target_id).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            format!("unknown like target kind: {}", kind).into(),
        )
    })?;
    Ok(Like {
        id: row.get(0)?,
        user_id: row.get(1)?,
        target,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

pub fn find(conn: &Connection, user_id: &str, target: &LikeTarget) -> StoreResult<Option<Like>> {
    let like = conn
        .query_row(
            "SELECT id, user_id, target_kind, target_id, created_at, updated_at
             FROM likes WHERE user_id = ?1 AND target_kind = ?2 AND target_id = ?3",
            params![user_id, target.kind(), target.id()],
            map_like,
        )
        .optional()?;
    Ok(like)
}

/// Flip `user_id`'s like on `target`: remove it if present, otherwise add it.
///
/// Runs in an immediate transaction so concurrent toggles by the same user
/// serialise instead of racing past the existence check.
pub fn toggle(conn: &mut Connection, user_id: &str, target: &LikeTarget) -> StoreResult<ToggleOutcome> {
    let (table, noun) = target_table(target);
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let reachable = match target {
        LikeTarget::Video(id) => videos::visible_to(&tx, id, user_id)?,
        LikeTarget::Comment(id) => comments::visible_to(&tx, id, user_id)?,
        LikeTarget::Tweet(id) => exists(&tx, table, id)?,
    };
    if !reachable {
        return Err(StoreError::NotFound(format!("{} not found", noun)));
    }

    let outcome = match find(&tx, user_id, target)? {
        Some(like) => {
            tx.execute("DELETE FROM likes WHERE id = ?1", params![like.id])?;
            ToggleOutcome::Removed(like)
        }
        None => {
            let id = uuid::Uuid::now_v7().to_string();
            let now = now_timestamp();
            let inserted = tx.execute(
                "INSERT INTO likes (id, user_id, target_kind, target_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                params![id, user_id, target.kind(), target.id(), now],
            );
            match inserted {
                Ok(_) => {}
                Err(e) if is_unique_violation(&e) => {
                    return Err(StoreError::Conflict("Like already exists".into()))
                }
                Err(e) => return Err(e.into()),
            }
            ToggleOutcome::Added(Like {
                id,
                user_id: user_id.to_string(),
                target: target.clone(),
                created_at: now.clone(),
                updated_at: now,
            })
        }
    };

    tx.commit()?;
    Ok(outcome)
}

pub fn count_for(conn: &Connection, target: &LikeTarget) -> StoreResult<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM likes WHERE target_kind = ?1 AND target_id = ?2",
        params![target.kind(), target.id()],
        |row| row.get(0),
    )?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{seed_user, seed_video, test_pool};

    #[test]
    fn toggle_twice_restores_original_state() {
        let pool = test_pool();
        let mut conn = pool.get().unwrap();
        let owner = seed_user(&conn, "alice");
        let fan = seed_user(&conn, "bob");
        let target = LikeTarget::Video(seed_video(&conn, &owner, "Clip"));

        let first = toggle(&mut conn, &fan, &target).unwrap();
        assert!(first.is_added());
        assert_eq!(count_for(&conn, &target).unwrap(), 1);

        let second = toggle(&mut conn, &fan, &target).unwrap();
        assert!(!second.is_added());
        assert_eq!(second.like().id, first.like().id);
        assert_eq!(count_for(&conn, &target).unwrap(), 0);
        assert!(find(&conn, &fan, &target).unwrap().is_none());
    }

    #[test]
    fn likes_are_per_user() {
        let pool = test_pool();
        let mut conn = pool.get().unwrap();
        let owner = seed_user(&conn, "alice");
        let fan = seed_user(&conn, "bob");
        let target = LikeTarget::Video(seed_video(&conn, &owner, "Clip"));

        toggle(&mut conn, &owner, &target).unwrap();
        toggle(&mut conn, &fan, &target).unwrap();
        assert_eq!(count_for(&conn, &target).unwrap(), 2);
    }

    #[test]
    fn dangling_target_is_not_found() {
        let pool = test_pool();
        let mut conn = pool.get().unwrap();
        let fan = seed_user(&conn, "bob");

        for (target, message) in [
            (LikeTarget::Video("nope".into()), "Video not found"),
            (LikeTarget::Comment("nope".into()), "Comment not found"),
            (LikeTarget::Tweet("nope".into()), "Tweet not found"),
        ] {
            let result = toggle(&mut conn, &fan, &target);
            assert!(matches!(result, Err(StoreError::NotFound(ref m)) if m == message));
        }
        let total: i64 = conn
            .query_row("SELECT COUNT(*) FROM likes", [], |row| row.get(0))
            .unwrap();
        assert_eq!(total, 0);
    }

    #[test]
    fn same_id_different_kind_is_distinct() {
        let pool = test_pool();
        let mut conn = pool.get().unwrap();
        let fan = seed_user(&conn, "bob");
        conn.execute(
            "INSERT INTO tweets (id, owner_id, content) VALUES ('shared', ?1, 't')",
            params![fan],
        )
        .unwrap();
        let vid_owner = seed_user(&conn, "alice");
        conn.execute(
            "INSERT INTO videos (id, owner_id, title, is_published) VALUES ('shared', ?1, 'v', 1)",
            params![vid_owner],
        )
        .unwrap();

        toggle(&mut conn, &fan, &LikeTarget::Tweet("shared".into())).unwrap();
        let video_like = toggle(&mut conn, &fan, &LikeTarget::Video("shared".into())).unwrap();
        assert!(video_like.is_added());
        assert_eq!(count_for(&conn, &LikeTarget::Tweet("shared".into())).unwrap(), 1);
        assert_eq!(count_for(&conn, &LikeTarget::Video("shared".into())).unwrap(), 1);
    }

    #[test]
    fn drafts_and_their_comments_cannot_be_liked_by_others() {
        let pool = test_pool();
        let mut conn = pool.get().unwrap();
        let owner = seed_user(&conn, "alice");
        let fan = seed_user(&conn, "bob");
        let vid = seed_video(&conn, &owner, "Clip");
        let comment = crate::store::comments::create(&conn, &vid, &owner, "hi").unwrap();
        conn.execute("UPDATE videos SET is_published = 0 WHERE id = ?1", params![vid])
            .unwrap();

        assert!(matches!(
            toggle(&mut conn, &fan, &LikeTarget::Video(vid.clone())),
            Err(StoreError::NotFound(msg)) if msg == "Video not found"
        ));
        assert!(matches!(
            toggle(&mut conn, &fan, &LikeTarget::Comment(comment.id.clone())),
            Err(StoreError::NotFound(msg)) if msg == "Comment not found"
        ));
        assert!(toggle(&mut conn, &owner, &LikeTarget::Video(vid)).unwrap().is_added());
        assert_eq!(count_for(&conn, &LikeTarget::Comment(comment.id)).unwrap(), 0);
    }
}
