use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Integer,
    Real,
    Bool,
}

#[derive(Debug)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnKind,
    /// Credentials and other internals that must never appear in output.
    pub sensitive: bool,
}

const fn col(name: &'static str, kind: ColumnKind) -> Column {
    Column {
        name,
        kind,
        sensitive: false,
    }
}

const fn secret(name: &'static str) -> Column {
    Column {
        name,
        kind: ColumnKind::Text,
        sensitive: true,
    }
}

use ColumnKind::*;

static USERS: &[Column] = &[
    col("id", Text),
    col("username", Text),
    col("email", Text),
    col("full_name", Text),
    secret("password_hash"),
    col("avatar_url", Text),
    col("avatar_store_id", Text),
    col("cover_image_url", Text),
    col("cover_image_store_id", Text),
    secret("refresh_token"),
    col("created_at", Text),
    col("updated_at", Text),
];

static VIDEOS: &[Column] = &[
    col("id", Text),
    col("owner_id", Text),
    col("title", Text),
    col("description", Text),
    col("video_url", Text),
    col("video_store_id", Text),
    col("thumbnail_url", Text),
    col("thumbnail_store_id", Text),
    col("duration", Real),
    col("views", Integer),
    col("is_published", Bool),
    col("created_at", Text),
    col("updated_at", Text),
];

static COMMENTS: &[Column] = &[
    col("id", Text),
    col("video_id", Text),
    col("owner_id", Text),
    col("content", Text),
    col("created_at", Text),
    col("updated_at", Text),
];

static LIKES: &[Column] = &[
    col("id", Text),
    col("user_id", Text),
    col("target_kind", Text),
    col("target_id", Text),
    col("created_at", Text),
    col("updated_at", Text),
];

static TWEETS: &[Column] = &[
    col("id", Text),
    col("owner_id", Text),
    col("content", Text),
    col("created_at", Text),
    col("updated_at", Text),
];

/// The persisted collections and their column schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Users,
    Videos,
    Comments,
    Likes,
    Tweets,
}

impl Collection {
    pub fn table(self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::Videos => "videos",
            Collection::Comments => "comments",
            Collection::Likes => "likes",
            Collection::Tweets => "tweets",
        }
    }

    pub fn columns(self) -> &'static [Column] {
        match self {
            Collection::Users => USERS,
            Collection::Videos => VIDEOS,
            Collection::Comments => COMMENTS,
            Collection::Likes => LIKES,
            Collection::Tweets => TWEETS,
        }
    }

    pub fn column(self, name: &str) -> Option<&'static Column> {
        self.columns().iter().find(|c| c.name == name)
    }

    /// Every column that may be returned to a client.
    pub fn public_columns(self) -> impl Iterator<Item = &'static Column> {
        self.columns().iter().filter(|c| !c.sensitive)
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

/// `created_at` -> `createdAt`
pub fn output_key(column: &str) -> String {
    let mut out = String::with_capacity(column.len());
    let mut upper = false;
    for ch in column.chars() {
        if ch == '_' {
            upper = true;
        } else if upper {
            out.extend(ch.to_uppercase());
            upper = false;
        } else {
            out.push(ch);
        }
    }
    out
}
