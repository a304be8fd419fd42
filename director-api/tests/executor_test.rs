//! The executor delivering scheduled operations to webhooks served locally.

mod common;

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use common::{application_ids, application_state, extract_json_body, test_config, TestClient};
use director_api::Executor;
use director_core::operation::{ScheduledOperationStatus, ScheduledOperationStore};
use director_core::test_utils::TENANT;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

#[derive(Clone)]
struct HookState {
    received: Arc<Mutex<Vec<Value>>>,
    status: StatusCode,
}

async fn record(State(state): State<HookState>, Json(body): Json<Value>) -> StatusCode {
    state.received.lock().unwrap().push(body);
    state.status
}

/// Serves a webhook answering every call with `status`. Returns its URL and
/// the bodies it received.
async fn spawn_webhook(status: StatusCode) -> (String, Arc<Mutex<Vec<Value>>>) {
    let received = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new().route("/hook", post(record)).with_state(HookState {
        received: received.clone(),
        status,
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}/hook", addr), received)
}

async fn register_async(client: &TestClient, pool: &SqlitePool, webhooks: Value) -> String {
    let (_, body) = client
        .graphql(
            r#"
            mutation Register($webhooks: [WebhookInput!]!) {
                registerApplication(in: { name: "app", webhooks: $webhooks }, mode: ASYNC) { id }
            }
            "#,
            json!({ "webhooks": webhooks }),
            Some(TENANT),
        )
        .await;
    assert!(body.get("errors").is_none(), "unexpected errors: {}", body);

    application_ids(pool).await.remove(0)
}

#[tokio::test]
async fn test_successful_delivery_completes_create() {
    let (client, pool) = TestClient::new_with_db().await;
    let (url, received) = spawn_webhook(StatusCode::OK).await;
    let app_id = register_async(
        &client,
        &pool,
        json!([{ "webhookType": "REGISTER_APPLICATION", "url": url }]),
    )
    .await;
    let store = ScheduledOperationStore::new(pool.clone());
    let operation_id = store.list_pending(1).await.unwrap()[0]
        .operation
        .operation_id
        .clone();

    let executor = Executor::new(pool.clone(), &test_config()).unwrap();
    assert_eq!(executor.process_pending().await.unwrap(), 1);

    let bodies = received.lock().unwrap().clone();
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0]["tenant_id"], TENANT);
    assert_eq!(bodies[0]["application"]["id"], app_id);

    let (ready, error, condition) = application_state(&pool, &app_id).await.unwrap();
    assert!(ready);
    assert!(error.is_none());
    assert_eq!(condition, "CREATE_SUCCEEDED");

    let scheduled = store.get(&operation_id).await.unwrap();
    assert_eq!(scheduled.status, ScheduledOperationStatus::Succeeded);
    assert!(scheduled.completed_at.is_some());

    let status: Value = extract_json_body(client.operation_status(&app_id).await).await;
    assert_eq!(status["status"], "SUCCEEDED");

    // Nothing left to run
    assert_eq!(executor.process_pending().await.unwrap(), 0);
}

#[tokio::test]
async fn test_failing_webhook_fails_operation() {
    let (client, pool) = TestClient::new_with_db().await;
    let (url, _received) = spawn_webhook(StatusCode::INTERNAL_SERVER_ERROR).await;
    let app_id = register_async(
        &client,
        &pool,
        json!([{ "webhookType": "REGISTER_APPLICATION", "url": url }]),
    )
    .await;
    let store = ScheduledOperationStore::new(pool.clone());
    let operation_id = store.list_pending(1).await.unwrap()[0]
        .operation
        .operation_id
        .clone();

    let executor = Executor::new(pool.clone(), &test_config()).unwrap();
    executor.process_pending().await.unwrap();

    let (ready, error, condition) = application_state(&pool, &app_id).await.unwrap();
    assert!(ready);
    assert!(error.unwrap().contains("responded with 500"));
    assert_eq!(condition, "CREATE_FAILED");

    let scheduled = store.get(&operation_id).await.unwrap();
    assert_eq!(scheduled.status, ScheduledOperationStatus::Failed);
    assert!(scheduled.error.unwrap().contains("responded with 500"));

    let status: Value = extract_json_body(client.operation_status(&app_id).await).await;
    assert_eq!(status["operation_type"], "CREATE");
    assert_eq!(status["status"], "FAILED");
}

#[tokio::test]
async fn test_operation_without_webhooks_succeeds() {
    let (client, pool) = TestClient::new_with_db().await;
    let app_id = register_async(&client, &pool, json!([])).await;

    let executor = Executor::new(pool.clone(), &test_config()).unwrap();
    assert_eq!(executor.process_pending().await.unwrap(), 1);

    let (ready, _, condition) = application_state(&pool, &app_id).await.unwrap();
    assert!(ready);
    assert_eq!(condition, "CREATE_SUCCEEDED");
}

#[tokio::test]
async fn test_async_unregister_is_applied_by_executor() {
    let (client, pool) = TestClient::new_with_db().await;
    let (url, received) = spawn_webhook(StatusCode::NO_CONTENT).await;
    let (_, body) = client
        .graphql(
            r#"
            mutation Register($url: String!) {
                registerApplication(
                    in: { name: "app", webhooks: [{ webhookType: UNREGISTER_APPLICATION, url: $url }] }
                ) { id }
            }
            "#,
            json!({ "url": url }),
            Some(TENANT),
        )
        .await;
    let app_id = body["data"]["registerApplication"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    client
        .graphql(
            "mutation U($id: String!) { unregisterApplication(id: $id, mode: ASYNC) { id } }",
            json!({ "id": app_id }),
            Some(TENANT),
        )
        .await;
    assert!(application_state(&pool, &app_id).await.is_some());

    let executor = Executor::new(pool.clone(), &test_config()).unwrap();
    assert_eq!(executor.process_pending().await.unwrap(), 1);

    assert_eq!(received.lock().unwrap().len(), 1);
    assert!(application_state(&pool, &app_id).await.is_none());
}
