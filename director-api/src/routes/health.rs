use crate::state::AppState;
use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/health/ready", get(readiness_check))
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses((status = 200, description = "Service is running"))
)]
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "director-api",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "health",
    responses((status = 200, description = "Readiness: database connectivity, async mode and pending operations"))
)]
pub async fn readiness_check(State(state): State<AppState>) -> Json<Value> {
    let db_ok = sqlx::query("SELECT 1")
        .fetch_one(&state.pool)
        .await
        .is_ok();

    let pending: Option<i64> =
        sqlx::query_scalar("SELECT COUNT(*) FROM scheduled_operations WHERE status = 'pending'")
            .fetch_one(&state.pool)
            .await
            .ok();

    Json(json!({
        "status": if db_ok { "ready" } else { "not_ready" },
        "service": "director-api",
        "version": env!("CARGO_PKG_VERSION"),
        "database": if db_ok { "connected" } else { "disconnected" },
        "async_mode": if state.config.disable_async_mode { "disabled" } else { "enabled" },
        "director_url": state.config.director_url(),
        "pending_operations": pending
    }))
}
