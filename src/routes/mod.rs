pub mod comments;
pub mod form;
pub mod healthcheck;
pub mod likes;
pub mod tweets;
pub mod users;
pub mod videos;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method, Uri};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::AppError;
use crate::state::AppState;

pub fn api_router() -> Router<AppState> {
    Router::new()
        .merge(healthcheck::router())
        .merge(users::router())
        .merge(videos::router())
        .merge(comments::router())
        .merge(likes::router())
        .merge(tweets::router())
}

/// The full application: every API route under `/api/v1`, the 404 envelope
/// for anything else, body limit, CORS and request tracing.
pub fn app(state: AppState) -> Router {
    let body_limit = state.config.server.max_upload_mb * 1024 * 1024;
    let cors = cors_layer(state.config.server.cors_origin.as_deref());

    let mut app = Router::new()
        .nest("/api/v1", api_router())
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(body_limit));

    if let Some(cors) = cors {
        app = app.layer(cors);
    }

    app.layer(TraceLayer::new_for_http()).with_state(state)
}

fn cors_layer(origin: Option<&str>) -> Option<CorsLayer> {
    let origin = origin?;
    match origin.parse::<HeaderValue>() {
        Ok(origin) => Some(
            CorsLayer::new()
                .allow_origin(origin)
                .allow_credentials(true)
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PATCH,
                    Method::DELETE,
                ])
                .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]),
        ),
        Err(e) => {
            tracing::warn!("Ignoring invalid server.cors_origin {:?}: {}", origin, e);
            None
        }
    }
}

async fn not_found(uri: Uri) -> AppError {
    AppError::NotFound(format!("Route {} not found", uri.path()))
}
