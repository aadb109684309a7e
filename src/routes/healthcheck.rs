use axum::extract::State;
use axum::routing::get;
use axum::Router;
use serde_json::{json, Value};

use crate::error::AppResult;
use crate::response::ApiResponse;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/healthcheck", get(healthcheck))
}

async fn healthcheck(State(state): State<AppState>) -> AppResult<ApiResponse<Value>> {
    let conn = state.db.get()?;
    conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;

    Ok(ApiResponse::ok(
        json!({ "status": "ok", "assets": state.assets.name() }),
        "Server is healthy",
    ))
}
