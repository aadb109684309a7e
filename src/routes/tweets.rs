use axum::extract::{Path, Query, State};
use axum::routing::{get, patch};
use axum::Router;
use serde::Deserialize;
use serde_json::Value;

use crate::db::models::Tweet;
use crate::error::AppResult;
use crate::extractors::{CurrentUser, ValidJson};
use crate::pagination::{Page, PageQuery, PageRequest};
use crate::pipeline::views;
use crate::response::ApiResponse;
use crate::state::AppState;
use crate::store;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tweets", get(list_tweets).post(create_tweet))
        .route("/tweets/{id}", patch(update_tweet).delete(delete_tweet))
}

#[derive(Deserialize)]
pub struct TweetBody {
    pub content: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TweetListQuery {
    #[serde(flatten)]
    pub page: PageQuery,
    pub user_id: Option<String>,
}

async fn create_tweet(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ValidJson(body): ValidJson<TweetBody>,
) -> AppResult<ApiResponse<Tweet>> {
    let conn = state.db.get()?;
    let tweet = store::tweets::create(&conn, &user.id, &body.content)?;
    Ok(ApiResponse::created(tweet, "Tweet created successfully"))
}

/// GET /tweets?userId&page&limit: defaults to the caller's own tweets.
async fn list_tweets(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<TweetListQuery>,
) -> AppResult<ApiResponse<Page<Value>>> {
    let owner = query
        .user_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(&user.id);
    let request = PageRequest::from_query(&query.page, &state.config.pagination);

    let conn = state.db.get()?;
    let page = views::tweets_for_owner(owner).paginate(&conn, request)?;
    Ok(ApiResponse::ok(page, "Tweets fetched successfully"))
}

async fn update_tweet(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    ValidJson(body): ValidJson<TweetBody>,
) -> AppResult<ApiResponse<Tweet>> {
    let mut conn = state.db.get()?;
    let tweet = store::tweets::update(&mut conn, &id, &user.id, &body.content)?;
    Ok(ApiResponse::ok(tweet, "Tweet updated successfully"))
}

async fn delete_tweet(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<Tweet>> {
    let mut conn = state.db.get()?;
    let tweet = store::tweets::delete(&mut conn, &id, &user.id)?;
    Ok(ApiResponse::ok(tweet, "Tweet deleted successfully"))
}
