use rusqlite::{params, Connection, OptionalExtension};

use super::{is_unique_violation, required_text, StoreError, StoreResult};
use crate::assets::AssetRef;
use crate::db::models::User;
use crate::db::now_timestamp;

const USER_COLUMNS: &str = "id, username, email, full_name, password_hash, avatar_url, \
     avatar_store_id, cover_image_url, cover_image_store_id, refresh_token, created_at, updated_at";

pub struct NewUser<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub full_name: &'a str,
    pub password_hash: &'a str,
    pub avatar: Option<&'a AssetRef>,
    pub cover_image: Option<&'a AssetRef>,
}

fn map_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        full_name: row.get(3)?,
        password_hash: row.get(4)?,
        avatar_url: row.get(5)?,
        avatar_store_id: row.get(6)?,
        cover_image_url: row.get(7)?,
        cover_image_store_id: row.get(8)?,
        refresh_token: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

pub fn normalize_username(username: &str) -> String {
    username.trim().to_lowercase()
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn create(conn: &Connection, new: &NewUser<'_>) -> StoreResult<User> {
    let username = normalize_username(&required_text("Username", new.username, 64)?);
    let email = normalize_email(&required_text("Email", new.email, 254)?);
    let full_name = required_text("Full name", new.full_name, 128)?;

    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-')
    {
        return Err(StoreError::Invalid(
            "Username may only contain letters, digits, '.', '_' and '-'".into(),
        ));
    }
    if !is_plausible_email(&email) {
        return Err(StoreError::Invalid("Email is invalid".into()));
    }

    let id = uuid::Uuid::now_v7().to_string();
    let now = now_timestamp();
    let result = conn.execute(
        "INSERT INTO users (id, username, email, full_name, password_hash, avatar_url,
                            avatar_store_id, cover_image_url, cover_image_store_id,
                            created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
        params![
            id,
            username,
            email,
            full_name,
            new.password_hash,
            new.avatar.map(|a| a.url.as_str()),
            new.avatar.map(|a| a.store_id.as_str()),
            new.cover_image.map(|a| a.url.as_str()),
            new.cover_image.map(|a| a.store_id.as_str()),
            now,
        ],
    );

    match result {
        Ok(_) => {}
        Err(e) if is_unique_violation(&e) => {
            return Err(StoreError::Conflict(
                "User with this username or email already exists".into(),
            ))
        }
        Err(e) => return Err(e.into()),
    }

    find_by_id(conn, &id)?.ok_or_else(|| StoreError::NotFound("User not found".into()))
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
        }
        None => false,
    }
}

pub fn find_by_id(conn: &Connection, id: &str) -> StoreResult<Option<User>> {
    let user = conn
        .query_row(
            &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
            params![id],
            map_user,
        )
        .optional()?;
    Ok(user)
}

/// Look a user up by username or email, whichever is given.
pub fn find_by_login(
    conn: &Connection,
    username: Option<&str>,
    email: Option<&str>,
) -> StoreResult<Option<User>> {
    let username = username.map(normalize_username).unwrap_or_default();
    let email = email.map(normalize_email).unwrap_or_default();
    if username.is_empty() && email.is_empty() {
        return Ok(None);
    }

    let user = conn
        .query_row(
            &format!(
                "SELECT {} FROM users WHERE username = ?1 OR email = ?2 LIMIT 1",
                USER_COLUMNS
            ),
            params![username, email],
            map_user,
        )
        .optional()?;
    Ok(user)
}

pub fn exists_with(conn: &Connection, username: &str, email: &str) -> StoreResult<bool> {
    let taken: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM users WHERE username = ?1 OR email = ?2",
        params![normalize_username(username), normalize_email(email)],
        |row| row.get(0),
    )?;
    Ok(taken)
}

/// Store (or clear, with `None`) the refresh token currently issued to a user.
pub fn set_refresh_token(conn: &Connection, id: &str, token: Option<&str>) -> StoreResult<()> {
    let updated = conn.execute(
        "UPDATE users SET refresh_token = ?1, updated_at = ?2 WHERE id = ?3",
        params![token, now_timestamp(), id],
    )?;
    if updated == 0 {
        return Err(StoreError::NotFound("User not found".into()));
    }
    Ok(())
}
