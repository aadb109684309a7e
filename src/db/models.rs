use serde::{Deserialize, Serialize};
use std::fmt;

/// Registered account. Credentials never leave the process: `password_hash`
/// and `refresh_token` are skipped on serialisation, as are asset store ids.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub full_name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub avatar_url: Option<String>,
    #[serde(skip_serializing)]
    pub avatar_store_id: Option<String>,
    pub cover_image_url: Option<String>,
    #[serde(skip_serializing)]
    pub cover_image_store_id: Option<String>,
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub description: String,
    pub video_url: Option<String>,
    #[serde(skip_serializing)]
    pub video_store_id: Option<String>,
    pub thumbnail_url: Option<String>,
    #[serde(skip_serializing)]
    pub thumbnail_store_id: Option<String>,
    pub duration: f64,
    pub views: i64,
    pub is_published: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub video_id: String,
    pub owner_id: String,
    pub content: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tweet {
    pub id: String,
    pub owner_id: String,
    pub content: String,
    pub created_at: String,
    pub updated_at: String,
}

/// What a like points at. Exactly one target per like.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "targetKind", content = "targetId", rename_all = "lowercase")]
pub enum LikeTarget {
    Video(String),
    Comment(String),
    Tweet(String),
}

impl LikeTarget {
    pub fn kind(&self) -> &'static str {
        match self {
            LikeTarget::Video(_) => "video",
            LikeTarget::Comment(_) => "comment",
            LikeTarget::Tweet(_) => "tweet",
        }
    }

    pub fn id(&self) -> &str {
        match self {
            LikeTarget::Video(id) | LikeTarget::Comment(id) | LikeTarget::Tweet(id) => id,
        }
    }

    /// Rebuild a target from its stored `(kind, id)` pair.
    pub fn from_parts(kind: &str, id: String) -> Option<Self> {
        match kind {
            "video" => Some(LikeTarget::Video(id)),
            "comment" => Some(LikeTarget::Comment(id)),
            "tweet" => Some(LikeTarget::Tweet(id)),
            _ => None,
        }
    }
}

impl fmt::Display for LikeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind(), self.id())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Like {
    pub id: String,
    pub user_id: String,
    #[serde(flatten)]
    pub target: LikeTarget,
    pub created_at: String,
    pub updated_at: String,
}
