use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, FromRequestParts, Request};
use axum::http::header;
use axum::http::request::Parts;
use axum::Json;
use serde::de::DeserializeOwned;

use crate::auth::cookies::{cookie_value, ACCESS_COOKIE};
use crate::auth::TokenType;
use crate::db::models::User;
use crate::error::AppError;
use crate::state::AppState;
use crate::store;

/// The authenticated caller, loaded fresh from the database.
/// Returns 401 when no valid access token is presented.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_access_token(parts)
            .ok_or_else(|| AppError::Unauthorized("Unauthorized request".into()))?;

        let claims = state
            .tokens
            .verify(token, TokenType::Access)
            .map_err(|_| AppError::Unauthorized("Invalid access token".into()))?;

        let conn = state.db.get()?;
        let user = store::users::find_by_id(&conn, &claims.sub)?
            .ok_or_else(|| AppError::Unauthorized("Invalid access token".into()))?;
        Ok(CurrentUser(user))
    }
}

/// Access token from the `accessToken` cookie, falling back to an
/// `Authorization: Bearer` header.
fn extract_access_token(parts: &Parts) -> Option<&str> {
    cookie_value(&parts.headers, ACCESS_COOKIE).or_else(|| {
        parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
    })
}

/// `Json<T>` whose rejections render as the error envelope instead of
/// axum's plain-text body.
pub struct ValidJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ValidJson(value)),
            Err(rejection) => Err(AppError::BadRequest(rejection.body_text())),
        }
    }
}
