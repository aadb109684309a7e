//! The read pipelines behind each listing endpoint.

use serde::Deserialize;

use super::{Collection, Filter, Lookup, Pipeline, SortDirection};
use crate::pagination::PageQuery;

/// Public profile fields embedded wherever a document shows its owner.
pub const OWNER_FIELDS: &[&str] = &["id", "username", "full_name", "avatar_url"];

const VIDEO_FIELDS: &[&str] = &[
    "id",
    "title",
    "description",
    "video_url",
    "thumbnail_url",
    "duration",
    "views",
    "is_published",
    "created_at",
    "updated_at",
    "owner",
];

const LIKED_VIDEO_FIELDS: &[&str] = &[
    "id",
    "title",
    "video_url",
    "thumbnail_url",
    "duration",
    "views",
    "owner_id",
];

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("Invalid sortBy `{0}`: expected createdAt, updatedAt, title, duration or views")]
    SortField(String),

    #[error("Invalid sortType `{0}`: expected asc or desc")]
    SortType(String),
}

fn owner_lookup() -> Lookup {
    Lookup::new(Collection::Users, "owner_id", "id", "owner").project(OWNER_FIELDS)
}

/// Comments on one video, newest first, each with its author embedded.
pub fn comments_for_video(video_id: &str) -> Pipeline {
    Pipeline::new(Collection::Comments)
        .matching(Filter::eq("video_id", video_id.to_string()))
        .lookup(owner_lookup())
        .project(&["id", "video_id", "content", "created_at", "updated_at", "owner"])
        .sort("created_at", SortDirection::Desc)
}

/// Tweets posted by one user, newest first.
pub fn tweets_for_owner(owner_id: &str) -> Pipeline {
    Pipeline::new(Collection::Tweets)
        .matching(Filter::eq("owner_id", owner_id.to_string()))
        .lookup(owner_lookup())
        .project(&["id", "content", "created_at", "updated_at", "owner"])
        .sort("created_at", SortDirection::Desc)
}

/// Videos a user liked, most recent like first. The liker reference is only
/// needed for matching and is dropped from the output.
pub fn liked_videos(user_id: &str) -> Pipeline {
    Pipeline::new(Collection::Likes)
        .matching(Filter::eq("user_id", user_id.to_string()))
        .matching(Filter::eq("target_kind", "video".to_string()))
        .lookup(Lookup::new(Collection::Videos, "target_id", "id", "video").project(LIKED_VIDEO_FIELDS))
        .unset(&["user_id"])
        .sort("created_at", SortDirection::Desc)
}

/// One video with its owner embedded.
pub fn video_detail(video_id: &str) -> Pipeline {
    Pipeline::new(Collection::Videos)
        .matching(Filter::eq("id", video_id.to_string()))
        .lookup(owner_lookup())
        .project(VIDEO_FIELDS)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoListQuery {
    #[serde(flatten)]
    pub page: PageQuery,
    pub query: Option<String>,
    pub sort_by: Option<String>,
    pub sort_type: Option<String>,
    pub user_id: Option<String>,
}

impl VideoListQuery {
    pub fn sort(&self) -> Result<(&'static str, SortDirection), QueryError> {
        let field = match self.sort_by.as_deref().map(str::trim) {
            None | Some("") | Some("createdAt") | Some("created_at") => "created_at",
            Some("updatedAt") | Some("updated_at") => "updated_at",
            Some("title") => "title",
            Some("duration") => "duration",
            Some("views") => "views",
            Some(other) => return Err(QueryError::SortField(other.to_string())),
        };
        let direction = match self.sort_type.as_deref().map(str::trim) {
            None | Some("") => SortDirection::Desc,
            Some(t) if t.eq_ignore_ascii_case("desc") || t == "-1" => SortDirection::Desc,
            Some(t) if t.eq_ignore_ascii_case("asc") || t == "1" => SortDirection::Asc,
            Some(other) => return Err(QueryError::SortType(other.to_string())),
        };
        Ok((field, direction))
    }
}

/// Video listing as seen by `viewer_id`: published videos plus the viewer's
/// own drafts, optionally narrowed to one owner and a title/description search.
pub fn video_listing(query: &VideoListQuery, viewer_id: &str) -> Result<Pipeline, QueryError> {
    let (sort_field, direction) = query.sort()?;

    let mut pipeline = Pipeline::new(Collection::Videos).matching(Filter::Or(vec![
        Filter::eq("is_published", true),
        Filter::eq("owner_id", viewer_id.to_string()),
    ]));

    if let Some(owner) = query.user_id.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        pipeline = pipeline.matching(Filter::eq("owner_id", owner.to_string()));
    }
    if let Some(text) = query.query.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        pipeline = pipeline.matching(Filter::Search(
            vec!["title", "description"],
            text.to_string(),
        ));
    }

    Ok(pipeline
        .lookup(owner_lookup())
        .project(VIDEO_FIELDS)
        .sort(sort_field, direction))
}
