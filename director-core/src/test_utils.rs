//! Test doubles for the operation subsystem's collaborators.

use crate::context::{Headers, RequestContext, TenantLoaderFn};
use crate::error::{OperationError, Result};
use crate::operation::{Operation, Scheduler, WebhookFetcher};
use crate::persistence::{PersistenceTx, Transactioner};
use crate::resource::{Lifecycle, ResourceFetcher, ResourceType};
use crate::webhook::Webhook;
use async_trait::async_trait;
use sqlx::SqlitePool;
use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const TENANT: &str = "3e64ebae-38b5-46a0-b1ed-9ccee153a0ae";
pub const CORRELATION_ID: &str = "corr-1";

/// Helper to create an in-memory test database with migrations applied
pub async fn create_test_db() -> SqlitePool {
    let pool = SqlitePool::connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    pool
}

/// Context as the HTTP layer builds it: tenant, correlation ID and headers.
pub fn fixture_context() -> RequestContext {
    let mut headers = Headers::new();
    headers.insert("x-request-id".to_string(), vec![CORRELATION_ID.to_string()]);
    RequestContext::new()
        .with_tenant(TENANT)
        .with_correlation_id(CORRELATION_ID)
        .with_headers(headers)
}

pub fn failing_tenant_loader() -> TenantLoaderFn {
    Arc::new(|_| Err(OperationError::TenantRequired))
}

#[derive(Default)]
pub struct TxCounters {
    pub begins: AtomicUsize,
    pub commits: AtomicUsize,
    pub rollbacks: AtomicUsize,
}

impl TxCounters {
    pub fn begins(&self) -> usize {
        self.begins.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }
}

/// Transactioner that never touches a database.
pub struct MockTransactioner {
    fail_begin: bool,
    fail_commit: bool,
    pub counters: Arc<TxCounters>,
}

impl MockTransactioner {
    pub fn that_succeeds() -> Self {
        Self {
            fail_begin: false,
            fail_commit: false,
            counters: Arc::default(),
        }
    }

    pub fn that_fails_on_begin() -> Self {
        Self {
            fail_begin: true,
            ..Self::that_succeeds()
        }
    }

    pub fn that_fails_on_commit() -> Self {
        Self {
            fail_commit: true,
            ..Self::that_succeeds()
        }
    }
}

#[async_trait]
impl Transactioner for MockTransactioner {
    async fn begin(&self) -> Result<Arc<dyn PersistenceTx>> {
        self.counters.begins.fetch_add(1, Ordering::SeqCst);
        if self.fail_begin {
            return Err(OperationError::internal("test begin error"));
        }
        Ok(Arc::new(MockTx {
            fail_commit: self.fail_commit,
            counters: self.counters.clone(),
        }))
    }
}

pub struct MockTx {
    fail_commit: bool,
    counters: Arc<TxCounters>,
}

#[async_trait]
impl PersistenceTx for MockTx {
    async fn commit(&self) -> Result<()> {
        self.counters.commits.fetch_add(1, Ordering::SeqCst);
        if self.fail_commit {
            return Err(OperationError::internal("test commit error"));
        }
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        self.counters.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Scheduler returning a fixed ID (or error) and recording what it was given.
pub struct StaticScheduler {
    result: std::result::Result<String, String>,
    calls: AtomicUsize,
    scheduled: Mutex<Vec<Operation>>,
}

impl StaticScheduler {
    pub fn returning(id: &str) -> Self {
        Self {
            result: Ok(id.to_string()),
            calls: AtomicUsize::new(0),
            scheduled: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            result: Err(message.to_string()),
            ..Self::returning("")
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn scheduled(&self) -> Vec<Operation> {
        self.scheduled.lock().expect("scheduler mutex poisoned").clone()
    }
}

#[async_trait]
impl Scheduler for StaticScheduler {
    async fn schedule(&self, _ctx: &RequestContext, operation: &Operation) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.scheduled
            .lock()
            .expect("scheduler mutex poisoned")
            .push(operation.clone());
        self.result.clone().map_err(OperationError::Internal)
    }
}

enum FetchOutcome {
    Found(Lifecycle),
    NotFound,
    Failing(String),
}

/// Resource fetcher answering every lookup the same way.
pub struct StaticFetcher {
    outcome: FetchOutcome,
    calls: AtomicUsize,
}

impl StaticFetcher {
    pub fn found(lifecycle: Lifecycle) -> Self {
        Self {
            outcome: FetchOutcome::Found(lifecycle),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn not_found() -> Self {
        Self {
            outcome: FetchOutcome::NotFound,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            outcome: FetchOutcome::Failing(message.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResourceFetcher for StaticFetcher {
    async fn fetch(&self, _ctx: &RequestContext, _tenant: &str, id: &str) -> Result<Lifecycle> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.outcome {
            FetchOutcome::Found(lifecycle) => Ok(lifecycle.clone()),
            FetchOutcome::NotFound => Err(OperationError::not_found(ResourceType::Application, id)),
            FetchOutcome::Failing(message) => Err(OperationError::internal(message.clone())),
        }
    }
}

/// Webhook fetcher returning a fixed list (or error).
pub struct StaticWebhookFetcher {
    result: std::result::Result<Vec<Webhook>, String>,
}

impl StaticWebhookFetcher {
    pub fn returning(webhooks: Vec<Webhook>) -> Self {
        Self {
            result: Ok(webhooks),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            result: Err(message.to_string()),
        }
    }
}

#[async_trait]
impl WebhookFetcher for StaticWebhookFetcher {
    async fn list_webhooks(&self, _ctx: &RequestContext, _resource_id: &str) -> Result<Vec<Webhook>> {
        self.result.clone().map_err(OperationError::Internal)
    }
}

/// Lifecycle of a resource whose last operation completed successfully.
pub fn ready_lifecycle() -> Lifecycle {
    let now = chrono::Utc::now();
    Lifecycle {
        ready: true,
        error: None,
        created_at: Some(now),
        updated_at: Some(now),
        deleted_at: None,
    }
}
