//! Common test utilities and helpers for director-api tests
//!
//! Shared setup for the GraphQL, operation and executor test suites.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Request, Response, StatusCode},
    Router,
};
use director_api::Config;
use director_core::test_utils::TENANT;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use std::path::PathBuf;

pub const DIRECTOR_URL: &str = "https://dir/operation";

/// Helper to create an in-memory test database with migrations
pub async fn create_test_db() -> SqlitePool {
    let pool = SqlitePool::connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");

    // Run migrations from director-core
    sqlx::migrate!("../director-core/migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    pool
}

/// Configuration used by every test app. Locations point at `https://dir`.
pub fn test_config() -> Config {
    Config {
        bind_addr: "127.0.0.1:0".to_string(),
        db_path: PathBuf::from(":memory:"),
        app_url: "https://dir".to_string(),
        operation_path: "/operation".to_string(),
        disable_async_mode: false,
        executor_interval_secs: 1,
        webhook_timeout_secs: 2,
    }
}

/// Create a test app with the given database pool
pub async fn create_test_app(pool: SqlitePool, config: Config) -> Router {
    director_api::create_app(pool, config)
        .await
        .expect("Failed to create test app")
}

/// Helper to extract JSON body from axum response
pub async fn extract_json_body<T>(response: Response<Body>) -> T
where
    T: serde::de::DeserializeOwned,
{
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read response body");

    serde_json::from_slice(&body).expect("Failed to deserialize JSON")
}

/// Fixture: insert an application row with explicit lifecycle fields.
/// Timestamps are seconds since the epoch.
pub async fn fixture_application(
    pool: &SqlitePool,
    id: &str,
    ready: bool,
    error: Option<&str>,
    updated_at: Option<i64>,
    deleted_at: Option<i64>,
) {
    sqlx::query(
        "INSERT INTO applications (id, tenant_id, name, ready, error, status_condition, created_at, updated_at, deleted_at)
         VALUES (?, ?, 'fixture', ?, ?, 'INITIAL', ?, ?, ?)",
    )
    .bind(id)
    .bind(TENANT)
    .bind(ready)
    .bind(error)
    .bind(1_700_000_000_i64 * 1_000_000)
    .bind(updated_at.map(|s| s * 1_000_000))
    .bind(deleted_at.map(|s| s * 1_000_000))
    .execute(pool)
    .await
    .expect("Failed to insert fixture application");
}

/// `(ready, error, status_condition)` of an application, `None` once deleted.
pub async fn application_state(
    pool: &SqlitePool,
    id: &str,
) -> Option<(bool, Option<String>, String)> {
    sqlx::query_as("SELECT ready, error, status_condition FROM applications WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .expect("Failed to read application")
}

pub async fn application_ids(pool: &SqlitePool) -> Vec<String> {
    sqlx::query_scalar("SELECT id FROM applications ORDER BY created_at ASC")
        .fetch_all(pool)
        .await
        .expect("Failed to list applications")
}

/// TestClient to encapsulate API interaction logic
pub struct TestClient {
    pub app: Router,
}

impl TestClient {
    pub async fn new(pool: SqlitePool, config: Config) -> Self {
        let app = create_test_app(pool, config).await;
        Self { app }
    }

    /// Create a new TestClient with a new in-memory DB
    pub async fn new_with_db() -> (Self, SqlitePool) {
        let pool = create_test_db().await;
        let client = Self::new(pool.clone(), test_config()).await;
        (client, pool)
    }

    /// Send a request to the API
    pub async fn send_request(&self, request: Request<Body>) -> Response<Body> {
        use tower::ServiceExt;
        self.app.clone().oneshot(request).await.unwrap()
    }

    /// Runs a GraphQL request as `tenant` and returns the decoded response.
    pub async fn graphql(
        &self,
        query: &str,
        variables: Value,
        tenant: Option<&str>,
    ) -> (StatusCode, Value) {
        let body = json!({ "query": query, "variables": variables });
        let mut builder = Request::builder()
            .method("POST")
            .uri("/graphql")
            .header("content-type", "application/json");
        if let Some(tenant) = tenant {
            builder = builder.header("x-tenant-id", tenant);
        }

        let request = builder.body(Body::from(body.to_string())).unwrap();
        let response = self.send_request(request).await;
        let status = response.status();
        (status, extract_json_body(response).await)
    }

    /// Get request to an endpoint
    pub async fn get(&self, uri: &str, headers: Option<Vec<(&str, &str)>>) -> Response<Body> {
        let mut builder = Request::builder().method("GET").uri(uri);

        if let Some(h) = headers {
            for (k, v) in h {
                builder = builder.header(k, v);
            }
        }

        let request = builder.body(Body::empty()).unwrap();
        self.send_request(request).await
    }

    /// Post a raw body to an endpoint
    pub async fn post_raw(&self, uri: &str, body: impl Into<Body>) -> Response<Body> {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(body.into())
            .unwrap();
        self.send_request(request).await
    }

    /// Looks up the last operation on an application as the test tenant.
    pub async fn operation_status(&self, id: &str) -> Response<Body> {
        self.get(
            &format!("/operation/application/{}", id),
            Some(vec![("x-tenant-id", TENANT)]),
        )
        .await
    }
}

/// GraphQL error message and `error_code` extension of the first error.
pub fn first_error(body: &Value) -> (String, String) {
    let error = &body["errors"][0];
    (
        error["message"].as_str().unwrap_or_default().to_string(),
        error["extensions"]["error_code"]
            .as_str()
            .unwrap_or_default()
            .to_string(),
    )
}
