use crate::context::RequestContext;
use crate::db::{from_micros, to_micros};
use crate::error::{OperationError, Result};
use crate::operation::{Operation, OperationType};
use crate::persistence::sqlite_tx;
use crate::resource::ResourceType;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{error, info, instrument};
use uuid::Uuid;

/// Accepts an asynchronous operation for later execution and returns its ID.
///
/// Called inside the mutation's open transaction; implementations must not
/// commit it.
#[async_trait]
pub trait Scheduler: Send + Sync {
    async fn schedule(&self, ctx: &RequestContext, operation: &Operation) -> Result<String>;
}

/// Scheduler used when asynchronous mode is turned off.
#[derive(Debug, Clone, Default)]
pub struct DisabledScheduler;

#[async_trait]
impl Scheduler for DisabledScheduler {
    async fn schedule(&self, _ctx: &RequestContext, _operation: &Operation) -> Result<String> {
        Err(OperationError::internal("async operations are disabled"))
    }
}

/// Persists operations into `scheduled_operations` through the request
/// transaction, so a rolled back mutation leaves nothing scheduled.
#[derive(Debug, Clone, Default)]
pub struct DatabaseScheduler;

#[async_trait]
impl Scheduler for DatabaseScheduler {
    #[instrument(skip_all, fields(category = %operation.operation_category, resource_id = %operation.resource_id))]
    async fn schedule(&self, ctx: &RequestContext, operation: &Operation) -> Result<String> {
        let resource_type = operation
            .resource_type
            .ok_or_else(|| OperationError::InvalidData("resource_type is required".to_string()))?;
        let id = Uuid::new_v4().to_string();
        let webhook_ids = serde_json::to_string(&operation.webhook_ids)?;

        let tx = sqlite_tx(ctx)?;
        let mut conn = tx.connection().await?;
        sqlx::query(
            r#"
            INSERT INTO scheduled_operations (id, operation_type, operation_category, resource_id, resource_type, correlation_id, webhook_ids, request_data, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(operation.operation_type)
        .bind(&operation.operation_category)
        .bind(&operation.resource_id)
        .bind(resource_type)
        .bind(&operation.correlation_id)
        .bind(webhook_ids)
        .bind(&operation.request_data)
        .bind(ScheduledOperationStatus::Pending)
        .bind(to_micros(Utc::now()))
        .execute(&mut *conn)
        .await?;

        info!(operation_id = %id, "Scheduled operation");
        Ok(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ScheduledOperationStatus {
    Pending,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledOperation {
    pub operation: Operation,
    pub status: ScheduledOperationStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Read/complete side of the scheduled operations table, used by the executor.
#[derive(Clone)]
pub struct ScheduledOperationStore {
    pool: SqlitePool,
}

impl ScheduledOperationStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Oldest pending operations first. A row that cannot be decoded is
    /// marked failed and left out instead of running with partial data.
    pub async fn list_pending(&self, limit: i64) -> Result<Vec<ScheduledOperation>> {
        let rows = sqlx::query_as::<_, ScheduledOperationRow>(
            "SELECT * FROM scheduled_operations WHERE status = ? ORDER BY created_at ASC LIMIT ?",
        )
        .bind(ScheduledOperationStatus::Pending)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut pending = Vec::with_capacity(rows.len());
        for row in rows {
            let id = row.id.clone();
            match ScheduledOperation::try_from(row) {
                Ok(operation) => pending.push(operation),
                Err(e) => {
                    error!(operation_id = %id, error = %e, "Unable to decode scheduled operation");
                    self.complete(&id, ScheduledOperationStatus::Failed, Some(e.to_string()))
                        .await?;
                }
            }
        }

        Ok(pending)
    }

    pub async fn get(&self, id: &str) -> Result<ScheduledOperation> {
        let row = sqlx::query_as::<_, ScheduledOperationRow>(
            "SELECT * FROM scheduled_operations WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| OperationError::internal(format!("scheduled operation {} not found", id)))?;

        row.try_into()
    }

    pub async fn complete(
        &self,
        id: &str,
        status: ScheduledOperationStatus,
        error: Option<String>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE scheduled_operations SET status = ?, error = ?, completed_at = ? WHERE id = ?",
        )
        .bind(status)
        .bind(error)
        .bind(to_micros(Utc::now()))
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct ScheduledOperationRow {
    id: String,
    operation_type: OperationType,
    operation_category: String,
    resource_id: String,
    resource_type: ResourceType,
    correlation_id: String,
    webhook_ids: String,
    request_data: String,
    status: ScheduledOperationStatus,
    error: Option<String>,
    created_at: i64,
    completed_at: Option<i64>,
}

impl TryFrom<ScheduledOperationRow> for ScheduledOperation {
    type Error = OperationError;

    fn try_from(row: ScheduledOperationRow) -> Result<Self> {
        let webhook_ids = serde_json::from_str(&row.webhook_ids).map_err(|e| {
            OperationError::wrap(format!("invalid webhook_ids on operation {}", row.id), e)
        })?;
        let created_at = from_micros(row.created_at);
        Ok(Self {
            operation: Operation {
                operation_id: row.id,
                operation_type: row.operation_type,
                operation_category: row.operation_category,
                resource_id: row.resource_id,
                resource_type: Some(row.resource_type),
                correlation_id: row.correlation_id,
                webhook_ids,
                request_data: row.request_data,
                creation_time: Some(created_at),
            },
            status: row.status,
            error: row.error,
            created_at,
            completed_at: row.completed_at.map(from_micros),
        })
    }
}
