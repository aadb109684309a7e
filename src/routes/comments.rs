use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use serde_json::Value;

use crate::db::models::Comment;
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, ValidJson};
use crate::pagination::{Page, PageQuery, PageRequest};
use crate::pipeline::views;
use crate::response::ApiResponse;
use crate::state::AppState;
use crate::store;

/// `GET`/`POST` take a video id; `PATCH`/`DELETE` take a comment id.
pub fn router() -> Router<AppState> {
    Router::new().route(
        "/comments/{id}",
        get(list_comments)
            .post(add_comment)
            .patch(update_comment)
            .delete(delete_comment),
    )
}

#[derive(Deserialize)]
pub struct CommentBody {
    pub content: String,
}

async fn list_comments(
    State(state): State<AppState>,
    CurrentUser(viewer): CurrentUser,
    Path(video_id): Path<String>,
    Query(query): Query<PageQuery>,
) -> AppResult<ApiResponse<Page<Value>>> {
    let conn = state.db.get()?;
    if !store::videos::visible_to(&conn, &video_id, &viewer.id)? {
        return Err(AppError::NotFound("Video not found".into()));
    }

    let request = PageRequest::from_query(&query, &state.config.pagination);
    let page = views::comments_for_video(&video_id).paginate(&conn, request)?;
    Ok(ApiResponse::ok(page, "Comments fetched successfully"))
}

async fn add_comment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(video_id): Path<String>,
    ValidJson(body): ValidJson<CommentBody>,
) -> AppResult<ApiResponse<Comment>> {
    let conn = state.db.get()?;
    let comment = store::comments::create(&conn, &video_id, &user.id, &body.content)?;
    Ok(ApiResponse::created(comment, "Comment added"))
}

async fn update_comment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(comment_id): Path<String>,
    ValidJson(body): ValidJson<CommentBody>,
) -> AppResult<ApiResponse<Comment>> {
    let mut conn = state.db.get()?;
    let comment = store::comments::update(&mut conn, &comment_id, &user.id, &body.content)?;
    Ok(ApiResponse::ok(comment, "Comment updated successfully"))
}

async fn delete_comment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(comment_id): Path<String>,
) -> AppResult<ApiResponse<Comment>> {
    let mut conn = state.db.get()?;
    let comment = store::comments::delete(&mut conn, &comment_id, &user.id)?;
    Ok(ApiResponse::ok(comment, "Comment deleted successfully"))
}
