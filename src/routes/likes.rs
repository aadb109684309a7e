use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use serde_json::Value;

use crate::db::models::{Like, LikeTarget};
use crate::error::AppResult;
use crate::extractors::CurrentUser;
use crate::pipeline::views;
use crate::response::ApiResponse;
use crate::state::AppState;
use crate::store;
use crate::store::likes::ToggleOutcome;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/likes/toggle/video/{id}", post(toggle_video_like))
        .route("/likes/toggle/comment/{id}", post(toggle_comment_like))
        .route("/likes/toggle/tweet/{id}", post(toggle_tweet_like))
        .route("/likes/videos", get(liked_videos))
}

/// 201 with the new like, or 200 with the like that was removed.
fn toggle(state: &AppState, user_id: &str, target: LikeTarget) -> AppResult<ApiResponse<Like>> {
    let mut conn = state.db.get()?;
    let outcome = store::likes::toggle(&mut conn, user_id, &target)?;
    Ok(match outcome {
        ToggleOutcome::Added(like) => ApiResponse::new(StatusCode::CREATED, like, "Like added"),
        ToggleOutcome::Removed(like) => ApiResponse::ok(like, "Like removed"),
    })
}

async fn toggle_video_like(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<Like>> {
    toggle(&state, &user.id, LikeTarget::Video(id))
}

async fn toggle_comment_like(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<Like>> {
    toggle(&state, &user.id, LikeTarget::Comment(id))
}

async fn toggle_tweet_like(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<Like>> {
    toggle(&state, &user.id, LikeTarget::Tweet(id))
}

async fn liked_videos(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<ApiResponse<Vec<Value>>> {
    let conn = state.db.get()?;
    let docs = views::liked_videos(&user.id).run(&conn)?;
    Ok(ApiResponse::ok(docs, "Liked videos fetched successfully"))
}
