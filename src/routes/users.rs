use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderName};
use axum::response::{AppendHeaders, IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::auth::cookies::{clear_cookie, cookie_value, token_cookie, ACCESS_COOKIE, REFRESH_COOKIE};
use crate::auth::password::{hash_password, verify_password};
use crate::auth::{TokenPair, TokenType};
use crate::db::models::User;
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, ValidJson};
use crate::response::ApiResponse;
use crate::routes::form::{UploadForm, Uploaded};
use crate::state::AppState;
use crate::store;
use crate::store::users::NewUser;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users/register", post(register))
        .route("/users/login", post(login))
        .route("/users/logout", post(logout))
        .route("/users/refresh-token", post(refresh_token))
        .route("/users/current-user", get(current_user))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionData {
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<User>,
    access_token: String,
    refresh_token: String,
}

fn session_cookies(state: &AppState, pair: &TokenPair) -> AppendHeaders<[(HeaderName, String); 2]> {
    let secure = state.config.server.is_production();
    AppendHeaders([
        (
            header::SET_COOKIE,
            token_cookie(
                ACCESS_COOKIE,
                &pair.access_token,
                state.tokens.ttl_secs(TokenType::Access),
                secure,
            ),
        ),
        (
            header::SET_COOKIE,
            token_cookie(
                REFRESH_COOKIE,
                &pair.refresh_token,
                state.tokens.ttl_secs(TokenType::Refresh),
                secure,
            ),
        ),
    ])
}

/// Issue a fresh token pair and record the refresh token on the user row.
fn start_session(state: &AppState, user: &User) -> AppResult<TokenPair> {
    let pair = state.tokens.issue_pair(user)?;
    let conn = state.db.get()?;
    store::users::set_refresh_token(&conn, &user.id, Some(&pair.refresh_token))?;
    Ok(pair)
}

/// POST /users/register: multipart with fullName, email, username, password,
/// avatar (required) and coverImage (optional).
async fn register(
    State(state): State<AppState>,
    mut form: UploadForm,
) -> AppResult<ApiResponse<User>> {
    let (full_name, email, username, password) = match (
        form.text("fullName"),
        form.text("email"),
        form.text("username"),
        form.text("password"),
    ) {
        (Some(f), Some(e), Some(u), Some(p)) => {
            (f.to_string(), e.to_string(), u.to_string(), p.to_string())
        }
        _ => return Err(AppError::BadRequest("All fields are required".into())),
    };

    {
        let conn = state.db.get()?;
        if store::users::exists_with(&conn, &username, &email)? {
            return Err(AppError::Conflict(
                "User with this username or email already exists".into(),
            ));
        }
    }

    let avatar_file = form
        .take_file("avatar")
        .ok_or_else(|| AppError::BadRequest("Avatar file is required".into()))?;
    let cover_file = form.take_file("coverImage");

    let password_hash = hash_password(&password, state.config.auth.bcrypt_cost)?;

    let mut uploaded = Uploaded::new(state.assets.clone());
    let result = async {
        let avatar = uploaded.push(avatar_file, "avatar").await?;
        let cover = match cover_file {
            Some(file) => Some(uploaded.push(file, "cover image").await?),
            None => None,
        };

        let conn = state.db.get()?;
        let user = store::users::create(
            &conn,
            &NewUser {
                username: &username,
                email: &email,
                full_name: &full_name,
                password_hash: &password_hash,
                avatar: Some(&avatar),
                cover_image: cover.as_ref(),
            },
        )?;
        Ok::<_, AppError>(user)
    }
    .await;

    match result {
        Ok(user) => {
            uploaded.keep();
            tracing::info!("Registered user {}", user.username);
            Ok(ApiResponse::created(user, "User registered successfully"))
        }
        Err(e) => {
            uploaded.rollback().await;
            Err(e)
        }
    }
}

/// POST /users/login: JSON with username or email plus password. Sets both
/// token cookies and also returns the tokens in the body.
async fn login(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<LoginRequest>,
) -> AppResult<Response> {
    if req.username.as_deref().map_or(true, |u| u.trim().is_empty())
        && req.email.as_deref().map_or(true, |e| e.trim().is_empty())
    {
        return Err(AppError::BadRequest("Username or email is required".into()));
    }

    let user = {
        let conn = state.db.get()?;
        store::users::find_by_login(&conn, req.username.as_deref(), req.email.as_deref())?
    }
    .ok_or_else(|| AppError::NotFound("User does not exist".into()))?;

    if !verify_password(&req.password, &user.password_hash) {
        return Err(AppError::Unauthorized("Invalid user credentials".into()));
    }

    let pair = start_session(&state, &user)?;
    tracing::info!("User {} logged in", user.username);

    let body = SessionData {
        user: Some(user),
        access_token: pair.access_token.clone(),
        refresh_token: pair.refresh_token.clone(),
    };
    Ok((
        session_cookies(&state, &pair),
        ApiResponse::ok(body, "User logged in successfully"),
    )
        .into_response())
}

/// POST /users/logout: forget the stored refresh token and clear cookies.
async fn logout(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Response> {
    {
        let conn = state.db.get()?;
        store::users::set_refresh_token(&conn, &user.id, None)?;
    }

    let secure = state.config.server.is_production();
    Ok((
        AppendHeaders([
            (header::SET_COOKIE, clear_cookie(ACCESS_COOKIE, secure)),
            (header::SET_COOKIE, clear_cookie(REFRESH_COOKIE, secure)),
        ]),
        ApiResponse::ok(json!({}), "User logged out successfully"),
    )
        .into_response())
}

/// POST /users/refresh-token: exchange a refresh token (cookie, or
/// `refreshToken` in a JSON body) for a new pair. The presented token must be
/// the one currently stored for the user, so each refresh token works once.
async fn refresh_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Response> {
    let from_body = serde_json::from_slice::<RefreshRequest>(&body)
        .ok()
        .and_then(|r| r.refresh_token);
    let incoming = cookie_value(&headers, REFRESH_COOKIE)
        .map(str::to_string)
        .or(from_body)
        .ok_or_else(|| AppError::Unauthorized("Unauthorized request".into()))?;

    let claims = state
        .tokens
        .verify(&incoming, TokenType::Refresh)
        .map_err(|_| AppError::Unauthorized("Invalid refresh token".into()))?;

    let user = {
        let conn = state.db.get()?;
        store::users::find_by_id(&conn, &claims.sub)?
    }
    .ok_or_else(|| AppError::Unauthorized("Invalid refresh token".into()))?;

    if user.refresh_token.as_deref() != Some(incoming.as_str()) {
        return Err(AppError::Unauthorized(
            "Refresh token is expired or used".into(),
        ));
    }

    let pair = start_session(&state, &user)?;
    let body = SessionData {
        user: None,
        access_token: pair.access_token.clone(),
        refresh_token: pair.refresh_token.clone(),
    };
    Ok((
        session_cookies(&state, &pair),
        ApiResponse::ok(body, "Access token refreshed"),
    )
        .into_response())
}

async fn current_user(CurrentUser(user): CurrentUser) -> ApiResponse<User> {
    ApiResponse::ok(user, "Current user fetched successfully")
}
