//! Background task driving scheduled operations to completion.
//!
//! Each pending operation's request data is POSTed to the webhooks it lists,
//! in order. The first failing webhook fails the operation. The outcome is
//! then applied to the resource through the same finalize path webhooks can
//! call over HTTP.

use crate::config::Config;
use crate::state::operation_finalizer;
use director_core::operation::{
    OperationFinalizer, ScheduledOperation, ScheduledOperationStatus, ScheduledOperationStore,
};
use director_core::persistence::rollback_unless_committed;
use director_core::{
    OperationRequest, RequestContext, SqliteTransactioner, Transactioner, Webhook,
    WebhookRepository,
};
use reqwest::header::CONTENT_TYPE;
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::{interval, Duration};
use tracing::{error, info, warn};

/// Pending operations picked up per tick.
const BATCH_SIZE: i64 = 50;

#[derive(Debug, Error)]
enum DeliveryError {
    #[error("webhook {url} could not be reached: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("webhook {url} responded with {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
}

#[derive(Clone)]
pub struct Executor {
    store: ScheduledOperationStore,
    transact: Arc<dyn Transactioner>,
    webhooks: WebhookRepository,
    finalizer: Arc<OperationFinalizer>,
    client: reqwest::Client,
}

impl Executor {
    pub fn new(pool: SqlitePool, config: &Config) -> anyhow::Result<Self> {
        let transact: Arc<dyn Transactioner> = Arc::new(SqliteTransactioner::new(pool.clone()));
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.webhook_timeout_secs))
            .build()?;

        Ok(Self {
            store: ScheduledOperationStore::new(pool),
            finalizer: Arc::new(operation_finalizer(transact.clone())),
            transact,
            webhooks: WebhookRepository::new(),
            client,
        })
    }

    /// Runs every pending operation once. Returns how many were processed.
    pub async fn process_pending(&self) -> anyhow::Result<usize> {
        let pending = self.store.list_pending(BATCH_SIZE).await?;

        for scheduled in &pending {
            let operation_id = &scheduled.operation.operation_id;
            match self.execute(scheduled).await {
                Ok(()) => {
                    info!(operation_id = %operation_id, "Operation succeeded");
                    self.store
                        .complete(operation_id, ScheduledOperationStatus::Succeeded, None)
                        .await?;
                }
                Err(e) => {
                    warn!(operation_id = %operation_id, error = %e, "Operation failed");
                    self.store
                        .complete(
                            operation_id,
                            ScheduledOperationStatus::Failed,
                            Some(e.to_string()),
                        )
                        .await?;
                }
            }
        }

        Ok(pending.len())
    }

    async fn execute(&self, scheduled: &ScheduledOperation) -> anyhow::Result<()> {
        let operation = &scheduled.operation;
        let resource_type = operation
            .resource_type
            .ok_or_else(|| anyhow::anyhow!("operation has no resource type"))?;
        let ctx = RequestContext::new().with_correlation_id(operation.correlation_id.clone());

        let webhooks = self.load_webhooks(&ctx, &operation.webhook_ids).await?;
        let delivery = self.deliver(scheduled, &webhooks).await;

        let request = OperationRequest {
            operation_type: operation.operation_type,
            resource_type,
            resource_id: operation.resource_id.clone(),
            error: delivery
                .as_ref()
                .err()
                .map(|e| e.to_string())
                .unwrap_or_default(),
        };
        self.finalizer.finalize(&ctx, &request).await?;

        delivery.map_err(Into::into)
    }

    async fn load_webhooks(
        &self,
        ctx: &RequestContext,
        ids: &[String],
    ) -> director_core::Result<Vec<Webhook>> {
        let tx = self.transact.begin().await?;
        let ctx = ctx.clone().with_transaction(tx.clone());

        let webhooks = match self.webhooks.list_by_ids(&ctx, ids).await {
            Ok(webhooks) => webhooks,
            Err(e) => {
                rollback_unless_committed(&tx).await;
                return Err(e);
            }
        };
        tx.commit().await?;

        // Keep the order the operation listed them in
        Ok(ids
            .iter()
            .filter_map(|id| webhooks.iter().find(|w| &w.id == id).cloned())
            .collect())
    }

    async fn deliver(
        &self,
        scheduled: &ScheduledOperation,
        webhooks: &[Webhook],
    ) -> Result<(), DeliveryError> {
        let operation = &scheduled.operation;

        for webhook in webhooks {
            let response = self
                .client
                .post(&webhook.url)
                .header(CONTENT_TYPE, "application/json")
                .header("x-request-id", &operation.correlation_id)
                .body(operation.request_data.clone())
                .send()
                .await
                .map_err(|source| DeliveryError::Request {
                    url: webhook.url.clone(),
                    source,
                })?;

            let status = response.status();
            if !status.is_success() {
                return Err(DeliveryError::Status {
                    url: webhook.url.clone(),
                    status,
                });
            }
        }

        Ok(())
    }
}

pub async fn start_executor_task(executor: Executor, interval_secs: u64) {
    let mut interval = interval(Duration::from_secs(interval_secs.max(1)));

    info!(
        "Executor task running (checks every {} seconds)",
        interval_secs
    );

    loop {
        interval.tick().await;

        if let Err(e) = executor.process_pending().await {
            error!("Executor error: {}", e);
        }
    }
}
