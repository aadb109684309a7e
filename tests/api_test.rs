use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use rusqlite::params;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use vidshare::assets::LocalAssetStore;
use vidshare::config::Config;
use vidshare::db;
use vidshare::routes;
use vidshare::state::{AppState, DbPool};

const BOUNDARY: &str = "vidshare-test-boundary";

struct TestApp {
    app: Router,
    pool: DbPool,
    config: Config,
    _tmp: TempDir,
}

struct TestResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Value,
}

fn setup() -> TestApp {
    let tmp = TempDir::new().unwrap();
    let config = Config::for_data_dir(tmp.path());
    let pool = db::create_pool(&config.db_path()).unwrap();
    db::run_migrations(&pool).unwrap();

    let store =
        LocalAssetStore::new(config.media_path(), &config.assets.public_base_url).unwrap();
    let state = AppState::new(pool.clone(), config.clone(), Arc::new(store)).unwrap();

    TestApp {
        app: routes::app(state),
        pool,
        config,
        _tmp: tmp,
    }
}

impl TestApp {
    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        TestResponse {
            status,
            headers,
            body,
        }
    }

    async fn json(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }

    async fn multipart(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        fields: &[(&str, &str)],
        files: &[(&str, &str, &[u8])],
    ) -> TestResponse {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            );
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = builder
            .body(Body::from(multipart_body(fields, files)))
            .unwrap();
        self.send(request).await
    }

    /// Register through the API and return the created user document.
    async fn register(&self, username: &str) -> Value {
        let email = format!("{}@example.com", username);
        let response = self
            .multipart(
                Method::POST,
                "/api/v1/users/register",
                None,
                &[
                    ("fullName", "Test User"),
                    ("email", &email),
                    ("username", username),
                    ("password", "hunter22"),
                ],
                &[("avatar", "avatar.png", b"fake-png")],
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
        response.body["data"].clone()
    }

    /// Log in and return the access token.
    async fn login(&self, username: &str) -> String {
        let response = self
            .json(
                Method::POST,
                "/api/v1/users/login",
                None,
                Some(json!({ "username": username, "password": "hunter22" })),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "{}", response.body);
        response.body["data"]["accessToken"]
            .as_str()
            .unwrap()
            .to_string()
    }

    async fn signed_up(&self, username: &str) -> (String, String) {
        let user = self.register(username).await;
        let token = self.login(username).await;
        (user["id"].as_str().unwrap().to_string(), token)
    }

    /// Insert a published video with no media assets.
    fn seed_video(&self, owner_id: &str, title: &str, seq: i64) -> String {
        let id = uuid::Uuid::now_v7().to_string();
        let created_at = format!("2025-01-01T00:00:{:02}.000Z", seq);
        self.pool
            .get()
            .unwrap()
            .execute(
                "INSERT INTO videos (id, owner_id, title, description, is_published, created_at)
                 VALUES (?1, ?2, ?3, '', 1, ?4)",
                params![id, owner_id, title, created_at],
            )
            .unwrap();
        id
    }

    fn count(&self, table: &str) -> i64 {
        self.pool
            .get()
            .unwrap()
            .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                row.get(0)
            })
            .unwrap()
    }
}

fn multipart_body(fields: &[(&str, &str)], files: &[(&str, &str, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
    }
    for (name, file_name, data) in files {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                 Content-Type: application/octet-stream\r\n\r\n",
                BOUNDARY, name, file_name
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn set_cookies(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(str::to_string)
        .collect()
}

#[tokio::test]
async fn healthcheck_returns_envelope() {
    let t = setup();
    let response = t.json(Method::GET, "/api/v1/healthcheck", None, None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["statusCode"], 200);
    assert_eq!(response.body["success"], true);
    assert_eq!(response.body["data"]["status"], "ok");
}

#[tokio::test]
async fn unknown_route_returns_404_envelope() {
    let t = setup();
    let response = t.json(Method::GET, "/api/v1/nope", None, None).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.body["success"], false);
    assert!(response.body["data"].is_null());
}

#[tokio::test]
async fn register_without_avatar_is_rejected_and_creates_nothing() {
    let t = setup();
    let response = t
        .multipart(
            Method::POST,
            "/api/v1/users/register",
            None,
            &[
                ("fullName", "No Avatar"),
                ("email", "na@example.com"),
                ("username", "noavatar"),
                ("password", "hunter22"),
            ],
            &[],
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["message"], "Avatar file is required");
    assert_eq!(t.count("users"), 0);
}

#[tokio::test]
async fn register_with_missing_field_is_rejected() {
    let t = setup();
    let response = t
        .multipart(
            Method::POST,
            "/api/v1/users/register",
            None,
            &[("fullName", "Half"), ("email", "half@example.com")],
            &[("avatar", "a.png", b"img")],
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(t.count("users"), 0);
}

#[tokio::test]
async fn register_hides_credentials_and_rejects_duplicates() {
    let t = setup();
    let user = t.register("alice").await;
    assert_eq!(user["username"], "alice");
    assert!(user["avatarUrl"].as_str().unwrap().contains("/v"));
    assert!(user.get("passwordHash").is_none());
    assert!(user.get("refreshToken").is_none());
    assert!(user.get("avatarStoreId").is_none());

    let again = t
        .multipart(
            Method::POST,
            "/api/v1/users/register",
            None,
            &[
                ("fullName", "Alice Again"),
                ("email", "alice@example.com"),
                ("username", "alice2"),
                ("password", "hunter22"),
            ],
            &[("avatar", "a.png", b"img")],
        )
        .await;
    assert_eq!(again.status, StatusCode::CONFLICT);
    assert_eq!(t.count("users"), 1);
}

#[tokio::test]
async fn login_sets_cookies_and_current_user_works() {
    let t = setup();
    t.register("alice").await;

    let response = t
        .json(
            Method::POST,
            "/api/v1/users/login",
            None,
            Some(json!({ "email": "ALICE@example.com", "password": "hunter22" })),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    let cookies = set_cookies(&response.headers);
    assert!(cookies.iter().any(|c| c.starts_with("accessToken=") && c.contains("HttpOnly")));
    assert!(cookies.iter().any(|c| c.starts_with("refreshToken=")));
    assert!(cookies.iter().all(|c| !c.contains("Secure")));

    let token = response.body["data"]["accessToken"].as_str().unwrap();
    let me = t
        .json(Method::GET, "/api/v1/users/current-user", Some(token), None)
        .await;
    assert_eq!(me.status, StatusCode::OK);
    assert_eq!(me.body["data"]["username"], "alice");

    let cookie_request = Request::builder()
        .uri("/api/v1/users/current-user")
        .header(header::COOKIE, format!("accessToken={}", token))
        .body(Body::empty())
        .unwrap();
    assert_eq!(t.send(cookie_request).await.status, StatusCode::OK);
}

#[tokio::test]
async fn wrong_password_and_missing_token_are_unauthorized() {
    let t = setup();
    t.register("alice").await;

    let response = t
        .json(
            Method::POST,
            "/api/v1/users/login",
            None,
            Some(json!({ "username": "alice", "password": "wrong" })),
        )
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);

    let anonymous = t.json(Method::GET, "/api/v1/videos", None, None).await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);
    assert_eq!(anonymous.body["success"], false);

    let forged = t
        .json(Method::GET, "/api/v1/videos", Some("not-a-jwt"), None)
        .await;
    assert_eq!(forged.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn refresh_token_rotates_and_old_token_is_rejected() {
    let t = setup();
    t.register("alice").await;
    let login = t
        .json(
            Method::POST,
            "/api/v1/users/login",
            None,
            Some(json!({ "username": "alice", "password": "hunter22" })),
        )
        .await;
    let old_refresh = login.body["data"]["refreshToken"].as_str().unwrap().to_string();

    let refresh = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/users/refresh-token")
        .header(header::COOKIE, format!("refreshToken={}", old_refresh))
        .body(Body::empty())
        .unwrap();
    let refreshed = t.send(refresh).await;
    assert_eq!(refreshed.status, StatusCode::OK, "{}", refreshed.body);
    let new_refresh = refreshed.body["data"]["refreshToken"].as_str().unwrap();
    assert_ne!(new_refresh, old_refresh);

    let replay = t
        .json(
            Method::POST,
            "/api/v1/users/refresh-token",
            None,
            Some(json!({ "refreshToken": old_refresh })),
        )
        .await;
    assert_eq!(replay.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_clears_stored_refresh_token() {
    let t = setup();
    let (user_id, token) = t.signed_up("alice").await;

    let response = t
        .json(Method::POST, "/api/v1/users/logout", Some(&token), None)
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(set_cookies(&response.headers)
        .iter()
        .all(|c| c.contains("Max-Age=0")));

    let stored: Option<String> = t
        .pool
        .get()
        .unwrap()
        .query_row(
            "SELECT refresh_token FROM users WHERE id = ?1",
            params![user_id],
            |row| row.get(0),
        )
        .unwrap();
    assert!(stored.is_none());
}

#[tokio::test]
async fn video_listing_second_page_of_seven() {
    let t = setup();
    let (user_id, token) = t.signed_up("alice").await;
    for i in 0..7 {
        t.seed_video(&user_id, &format!("video {}", i), i);
    }

    let response = t
        .json(Method::GET, "/api/v1/videos?page=2&limit=5", Some(&token), None)
        .await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.body);
    let page = &response.body["data"];
    assert_eq!(page["docs"].as_array().unwrap().len(), 2);
    assert_eq!(page["totalDocs"], 7);
    assert_eq!(page["totalPages"], 2);
    assert_eq!(page["hasNextPage"], false);
    assert_eq!(page["hasPrevPage"], true);
    assert_eq!(page["docs"][0]["title"], "video 1");
    assert_eq!(page["docs"][0]["owner"]["username"], "alice");
    assert!(page["docs"][0]["owner"].get("passwordHash").is_none());
}

#[tokio::test]
async fn video_listing_rejects_unknown_sort() {
    let t = setup();
    let (_, token) = t.signed_up("alice").await;
    let response = t
        .json(Method::GET, "/api/v1/videos?sortBy=password", Some(&token), None)
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn publish_then_delete_video_removes_media() {
    let t = setup();
    let (_, token) = t.signed_up("alice").await;

    let published = t
        .multipart(
            Method::POST,
            "/api/v1/videos",
            Some(&token),
            &[("title", "My clip"), ("description", "about it")],
            &[
                ("videoFile", "clip.mp4", b"frames"),
                ("thumbnail", "thumb.png", b"pixels"),
            ],
        )
        .await;
    assert_eq!(published.status, StatusCode::CREATED, "{}", published.body);
    let video = &published.body["data"];
    assert_eq!(video["title"], "My clip");
    assert!(video.get("videoStoreId").is_none());
    let id = video["id"].as_str().unwrap().to_string();

    let media = t.config.media_path();
    let media_files = || std::fs::read_dir(&media).unwrap().count();
    // one avatar plus video and thumbnail
    assert_eq!(media_files(), 3);

    let fetched = t
        .json(Method::GET, &format!("/api/v1/videos/{}", id), Some(&token), None)
        .await;
    assert_eq!(fetched.status, StatusCode::OK);
    assert_eq!(fetched.body["data"]["views"], 1);
    assert_eq!(fetched.body["data"]["owner"]["username"], "alice");

    let deleted = t
        .json(Method::DELETE, &format!("/api/v1/videos/{}", id), Some(&token), None)
        .await;
    assert_eq!(deleted.status, StatusCode::OK);
    assert_eq!(media_files(), 1);
    assert_eq!(t.count("videos"), 0);
    assert_eq!(std::fs::read_dir(t.config.uploads_path()).unwrap().count(), 0);
}

#[tokio::test]
async fn publish_without_thumbnail_is_rejected() {
    let t = setup();
    let (_, token) = t.signed_up("alice").await;
    let response = t
        .multipart(
            Method::POST,
            "/api/v1/videos",
            Some(&token),
            &[("title", "My clip")],
            &[("videoFile", "clip.mp4", b"frames")],
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(t.count("videos"), 0);
}

#[tokio::test]
async fn deleting_video_without_assets_succeeds() {
    let t = setup();
    let (user_id, token) = t.signed_up("alice").await;
    let vid = t.seed_video(&user_id, "bare", 0);

    let response = t
        .json(Method::DELETE, &format!("/api/v1/videos/{}", vid), Some(&token), None)
        .await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.body);
    assert!(response.body["data"]["videoUrl"].is_null());
    assert_eq!(t.count("videos"), 0);
}

#[tokio::test]
async fn liking_twice_adds_then_removes() {
    let t = setup();
    let (user_id, token) = t.signed_up("alice").await;
    let vid = t.seed_video(&user_id, "likeable", 0);
    let uri = format!("/api/v1/likes/toggle/video/{}", vid);

    let first = t.json(Method::POST, &uri, Some(&token), None).await;
    assert_eq!(first.status, StatusCode::CREATED);
    assert_eq!(first.body["data"]["targetKind"], "video");

    let liked = t.json(Method::GET, "/api/v1/likes/videos", Some(&token), None).await;
    assert_eq!(liked.body["data"][0]["video"]["title"], "likeable");
    assert!(liked.body["data"][0].get("userId").is_none());

    let second = t.json(Method::POST, &uri, Some(&token), None).await;
    assert_eq!(second.status, StatusCode::OK);
    assert_eq!(t.count("likes"), 0);
}

#[tokio::test]
async fn liking_missing_target_is_not_found() {
    let t = setup();
    let (_, token) = t.signed_up("alice").await;
    let response = t
        .json(Method::POST, "/api/v1/likes/toggle/tweet/missing", Some(&token), None)
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(t.count("likes"), 0);
}

#[tokio::test]
async fn non_owner_cannot_edit_tweet_or_comment() {
    let t = setup();
    let (alice_id, alice) = t.signed_up("alice").await;
    let (_, mallory) = t.signed_up("mallory").await;

    let tweet = t
        .json(
            Method::POST,
            "/api/v1/tweets",
            Some(&alice),
            Some(json!({ "content": "hello" })),
        )
        .await;
    assert_eq!(tweet.status, StatusCode::CREATED);
    let tweet_id = tweet.body["data"]["id"].as_str().unwrap().to_string();

    let hijack = t
        .json(
            Method::PATCH,
            &format!("/api/v1/tweets/{}", tweet_id),
            Some(&mallory),
            Some(json!({ "content": "pwned" })),
        )
        .await;
    assert_eq!(hijack.status, StatusCode::FORBIDDEN);

    let vid = t.seed_video(&alice_id, "clip", 0);
    let comment = t
        .json(
            Method::POST,
            &format!("/api/v1/comments/{}", vid),
            Some(&alice),
            Some(json!({ "content": "first" })),
        )
        .await;
    assert_eq!(comment.status, StatusCode::CREATED);
    let comment_id = comment.body["data"]["id"].as_str().unwrap().to_string();

    let removal = t
        .json(
            Method::DELETE,
            &format!("/api/v1/comments/{}", comment_id),
            Some(&mallory),
            None,
        )
        .await;
    assert_eq!(removal.status, StatusCode::FORBIDDEN);

    let tweets = t.json(Method::GET, "/api/v1/tweets", Some(&alice), None).await;
    assert_eq!(tweets.body["data"]["docs"][0]["content"], "hello");
    let comments = t
        .json(Method::GET, &format!("/api/v1/comments/{}", vid), Some(&alice), None)
        .await;
    assert_eq!(comments.body["data"]["totalDocs"], 1);
    assert_eq!(comments.body["data"]["docs"][0]["owner"]["username"], "alice");
}

#[tokio::test]
async fn malformed_json_returns_error_envelope() {
    let t = setup();
    let (_, token) = t.signed_up("alice").await;
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/tweets")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = t.send(request).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["success"], false);
}

#[tokio::test]
async fn drafts_are_hidden_from_other_users() {
    let t = setup();
    let (alice_id, alice) = t.signed_up("alice").await;
    let (_, bob) = t.signed_up("bob").await;
    let vid = t.seed_video(&alice_id, "secret cut", 0);

    let toggled = t
        .json(
            Method::PATCH,
            &format!("/api/v1/videos/{}/toggle-publish", vid),
            Some(&alice),
            None,
        )
        .await;
    assert_eq!(toggled.status, StatusCode::OK);
    assert_eq!(toggled.body["data"]["isPublished"], false);

    let comments_uri = format!("/api/v1/comments/{}", vid);
    let listed = t.json(Method::GET, &comments_uri, Some(&bob), None).await;
    assert_eq!(listed.status, StatusCode::NOT_FOUND);
    assert_eq!(listed.body["message"], "Video not found");

    let commented = t
        .json(
            Method::POST,
            &comments_uri,
            Some(&bob),
            Some(json!({ "content": "found it" })),
        )
        .await;
    assert_eq!(commented.status, StatusCode::NOT_FOUND);

    let liked = t
        .json(
            Method::POST,
            &format!("/api/v1/likes/toggle/video/{}", vid),
            Some(&bob),
            None,
        )
        .await;
    assert_eq!(liked.status, StatusCode::NOT_FOUND);
    assert_eq!(t.count("comments"), 0);
    assert_eq!(t.count("likes"), 0);

    let own = t.json(Method::GET, &comments_uri, Some(&alice), None).await;
    assert_eq!(own.status, StatusCode::OK);
}

#[tokio::test]
async fn huge_page_number_returns_empty_page() {
    let t = setup();
    let (user_id, token) = t.signed_up("alice").await;
    t.seed_video(&user_id, "only one", 0);

    let response = t
        .json(
            Method::GET,
            "/api/v1/videos?page=9223372036854775807&limit=10",
            Some(&token),
            None,
        )
        .await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.body);
    let page = &response.body["data"];
    assert!(page["docs"].as_array().unwrap().is_empty());
    assert_eq!(page["totalDocs"], 1);
    assert_eq!(page["pagingCounter"], i64::MAX);
    assert_eq!(page["hasNextPage"], false);
}
