use axum::extract::{Path, Query, State};
use axum::routing::{get, patch};
use axum::Router;
use serde_json::Value;

use crate::assets;
use crate::db::models::Video;
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::pagination::{Page, PageRequest};
use crate::pipeline::views::{self, VideoListQuery};
use crate::response::ApiResponse;
use crate::routes::form::{UploadForm, Uploaded};
use crate::state::AppState;
use crate::store;
use crate::store::videos::{NewVideo, VideoChanges};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/videos", get(list_videos).post(publish_video))
        .route(
            "/videos/{id}",
            get(get_video).patch(update_video).delete(delete_video),
        )
        .route("/videos/{id}/toggle-publish", patch(toggle_publish))
}

/// GET /videos?page&limit&query&sortBy&sortType&userId
async fn list_videos(
    State(state): State<AppState>,
    CurrentUser(viewer): CurrentUser,
    Query(query): Query<VideoListQuery>,
) -> AppResult<ApiResponse<Page<Value>>> {
    let pipeline = views::video_listing(&query, &viewer.id)?;
    let request = PageRequest::from_query(&query.page, &state.config.pagination);

    let conn = state.db.get()?;
    let page = pipeline.paginate(&conn, request)?;
    Ok(ApiResponse::ok(page, "Videos fetched successfully"))
}

/// POST /videos: multipart with title, description, videoFile and thumbnail.
async fn publish_video(
    State(state): State<AppState>,
    CurrentUser(owner): CurrentUser,
    mut form: UploadForm,
) -> AppResult<ApiResponse<Video>> {
    let title = form
        .text("title")
        .ok_or_else(|| AppError::BadRequest("Title is required".into()))?
        .to_string();
    let description = form.text("description").unwrap_or_default().to_string();

    let video_file = form
        .take_file("videoFile")
        .ok_or_else(|| AppError::BadRequest("Video file is required".into()))?;
    let thumbnail_file = form
        .take_file("thumbnail")
        .ok_or_else(|| AppError::BadRequest("Thumbnail is required".into()))?;

    let mut uploaded = Uploaded::new(state.assets.clone());
    let result = async {
        let video_asset = uploaded.push(video_file, "video").await?;
        let thumbnail = uploaded.push(thumbnail_file, "thumbnail").await?;

        let conn = state.db.get()?;
        let video = store::videos::create(
            &conn,
            &NewVideo {
                owner_id: &owner.id,
                title: &title,
                description: &description,
                video: Some(&video_asset),
                thumbnail: Some(&thumbnail),
                is_published: true,
            },
        )?;
        Ok::<_, AppError>(video)
    }
    .await;

    match result {
        Ok(video) => {
            uploaded.keep();
            tracing::info!("User {} published video {}", owner.username, video.id);
            Ok(ApiResponse::created(video, "Video uploaded successfully"))
        }
        Err(e) => {
            uploaded.rollback().await;
            Err(e)
        }
    }
}

/// GET /videos/{id}: counts a view. Drafts are only visible to their owner.
async fn get_video(
    State(state): State<AppState>,
    CurrentUser(viewer): CurrentUser,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<Value>> {
    let conn = state.db.get()?;
    let video = store::videos::find_by_id(&conn, &id)?
        .filter(|v| v.is_published || v.owner_id == viewer.id)
        .ok_or_else(|| AppError::NotFound("Video not found".into()))?;

    store::videos::increment_views(&conn, &video.id)?;
    let doc = views::video_detail(&video.id)
        .first(&conn)?
        .ok_or_else(|| AppError::NotFound("Video not found".into()))?;
    Ok(ApiResponse::ok(doc, "Video fetched successfully"))
}

/// PATCH /videos/{id}: multipart with any of title, description, thumbnail.
/// A replaced thumbnail is removed from the asset store afterwards.
async fn update_video(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    mut form: UploadForm,
) -> AppResult<ApiResponse<Video>> {
    let title = form.text("title").map(str::to_string);
    let description = form.text("description").map(str::to_string);
    let thumbnail_file = form.take_file("thumbnail");
    if title.is_none() && description.is_none() && thumbnail_file.is_none() {
        return Err(AppError::BadRequest(
            "Provide a title, description or thumbnail to update".into(),
        ));
    }

    // Check ownership before spending an upload on the thumbnail.
    {
        let conn = state.db.get()?;
        let existing = store::videos::find_by_id(&conn, &id)?
            .ok_or_else(|| AppError::NotFound("Video not found".into()))?;
        if existing.owner_id != user.id {
            return Err(AppError::Forbidden(
                "You are not authorized to modify this video".into(),
            ));
        }
    }

    let mut uploaded = Uploaded::new(state.assets.clone());
    let result = async {
        let thumbnail = match thumbnail_file {
            Some(file) => Some(uploaded.push(file, "thumbnail").await?),
            None => None,
        };

        let mut conn = state.db.get()?;
        let changes = VideoChanges {
            title: title.as_deref(),
            description: description.as_deref(),
            thumbnail: thumbnail.as_ref(),
        };
        let updated = store::videos::update_details(&mut conn, &id, &user.id, &changes)?;
        Ok::<_, AppError>((updated, thumbnail.is_some()))
    }
    .await;

    let ((before, after), replaced_thumbnail) = match result {
        Ok(updated) => {
            uploaded.keep();
            updated
        }
        Err(e) => {
            uploaded.rollback().await;
            return Err(e);
        }
    };

    if replaced_thumbnail {
        assets::discard(
            state.assets.as_ref(),
            before.thumbnail_store_id.as_deref(),
            before.thumbnail_url.as_deref(),
        )
        .await;
    }

    Ok(ApiResponse::ok(after, "Video updated successfully"))
}

/// DELETE /videos/{id}: removes the video, its comments and related likes,
/// then discards its media from the asset store.
async fn delete_video(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<Video>> {
    let video = {
        let mut conn = state.db.get()?;
        store::videos::delete(&mut conn, &id, &user.id)?
    };

    let store = state.assets.as_ref();
    assets::discard(store, video.video_store_id.as_deref(), video.video_url.as_deref()).await;
    assets::discard(
        store,
        video.thumbnail_store_id.as_deref(),
        video.thumbnail_url.as_deref(),
    )
    .await;

    Ok(ApiResponse::ok(video, "Video deleted successfully"))
}

async fn toggle_publish(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<Video>> {
    let mut conn = state.db.get()?;
    let video = store::videos::toggle_publish(&mut conn, &id, &user.id)?;
    let message = if video.is_published {
        "Video published"
    } else {
        "Video unpublished"
    };
    Ok(ApiResponse::ok(video, message))
}
