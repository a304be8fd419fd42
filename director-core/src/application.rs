use crate::context::RequestContext;
use crate::db::{from_micros, to_micros};
use crate::error::{OperationError, Result};
use crate::operation::OperationMode;
use crate::persistence::sqlite_tx;
use crate::resource::{
    Entity, Lifecycle, ResourceDeleter, ResourceFetcher, ResourceType, ResourceUpdater,
    StatusCondition,
};
use crate::webhook::{WebhookInput, WebhookRepository};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Application {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub description: Option<String>,
    pub status_condition: StatusCondition,
    #[serde(flatten)]
    pub lifecycle: Lifecycle,
}

impl Entity for Application {
    fn id(&self) -> &str {
        &self.id
    }

    fn resource_type(&self) -> ResourceType {
        ResourceType::Application
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplicationInput {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub webhooks: Vec<WebhookInput>,
}

/// Application persistence. Every call runs in the transaction carried by the
/// request context; writes honour the operation mode stored there.
#[derive(Debug, Clone, Default)]
pub struct ApplicationRepository {
    webhooks: WebhookRepository,
}

impl ApplicationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an application. In ASYNC mode it starts out not ready until its
    /// webhooks report back.
    #[instrument(skip(self, ctx, input), fields(name = %input.name))]
    pub async fn create(
        &self,
        ctx: &RequestContext,
        tenant: &str,
        input: &ApplicationInput,
    ) -> Result<Application> {
        validate_name(&input.name)?;

        let id = Uuid::new_v4().to_string();
        let ready = ctx.mode() == OperationMode::Sync;

        {
            let tx = sqlite_tx(ctx)?;
            let mut conn = tx.connection().await?;
            sqlx::query(
                r#"
                INSERT INTO applications (id, tenant_id, name, description, ready, status_condition, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&id)
            .bind(tenant)
            .bind(&input.name)
            .bind(&input.description)
            .bind(ready)
            .bind(StatusCondition::Initial)
            .bind(to_micros(Utc::now()))
            .execute(&mut *conn)
            .await?;
        }

        for webhook in &input.webhooks {
            self.webhooks.create(ctx, &id, webhook).await?;
        }

        debug!(application_id = %id, ready, "Application created");
        self.get_by_id(ctx, tenant, &id).await
    }

    pub async fn get_by_id(&self, ctx: &RequestContext, tenant: &str, id: &str) -> Result<Application> {
        let tx = sqlite_tx(ctx)?;
        let mut conn = tx.connection().await?;
        let row = sqlx::query_as::<_, ApplicationRow>(
            "SELECT * FROM applications WHERE id = ? AND tenant_id = ?",
        )
        .bind(id)
        .bind(tenant)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| OperationError::not_found(ResourceType::Application, id))?;

        Ok(row.into())
    }

    pub async fn list(&self, ctx: &RequestContext, tenant: &str) -> Result<Vec<Application>> {
        let tx = sqlite_tx(ctx)?;
        let mut conn = tx.connection().await?;
        let rows = sqlx::query_as::<_, ApplicationRow>(
            "SELECT * FROM applications WHERE tenant_id = ? ORDER BY created_at ASC",
        )
        .bind(tenant)
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows.into_iter().map(|row| row.into()).collect())
    }

    /// Updates name and description. A live row also drops any `deleted_at`
    /// left behind by a failed delete.
    #[instrument(skip(self, ctx, input))]
    pub async fn update(
        &self,
        ctx: &RequestContext,
        tenant: &str,
        id: &str,
        input: &ApplicationInput,
    ) -> Result<Application> {
        validate_name(&input.name)?;
        let ready = ctx.mode() == OperationMode::Sync;

        let rows_affected = {
            let tx = sqlite_tx(ctx)?;
            let mut conn = tx.connection().await?;
            sqlx::query(
                "UPDATE applications
                 SET name = ?, description = ?, ready = ?, error = NULL, updated_at = ?, deleted_at = NULL
                 WHERE id = ? AND tenant_id = ?",
            )
            .bind(&input.name)
            .bind(&input.description)
            .bind(ready)
            .bind(to_micros(Utc::now()))
            .bind(id)
            .bind(tenant)
            .execute(&mut *conn)
            .await?
            .rows_affected()
        };

        if rows_affected == 0 {
            return Err(OperationError::not_found(ResourceType::Application, id));
        }

        self.get_by_id(ctx, tenant, id).await
    }

    /// Deletes an application. In ASYNC mode the row is only marked as being
    /// deleted; the finalize callback removes it later.
    ///
    /// Returns the application as it was before the delete.
    #[instrument(skip(self, ctx))]
    pub async fn delete(&self, ctx: &RequestContext, tenant: &str, id: &str) -> Result<Application> {
        let mut app = self.get_by_id(ctx, tenant, id).await?;

        let tx = sqlite_tx(ctx)?;
        let mut conn = tx.connection().await?;
        match ctx.mode() {
            OperationMode::Sync => {
                sqlx::query("DELETE FROM applications WHERE id = ? AND tenant_id = ?")
                    .bind(id)
                    .bind(tenant)
                    .execute(&mut *conn)
                    .await?;
            }
            OperationMode::Async => {
                let now = Utc::now();
                sqlx::query(
                    "UPDATE applications SET ready = 0, error = NULL, deleted_at = ? WHERE id = ? AND tenant_id = ?",
                )
                .bind(to_micros(now))
                .bind(id)
                .bind(tenant)
                .execute(&mut *conn)
                .await?;

                app.lifecycle.ready = false;
                app.lifecycle.error = None;
                app.lifecycle.deleted_at = Some(from_micros(to_micros(now)));
            }
        }

        Ok(app)
    }

    /// Records the outcome of an operation without touching `updated_at`, so
    /// the operation type derived from the row does not change.
    pub async fn technical_update(
        &self,
        ctx: &RequestContext,
        id: &str,
        ready: bool,
        error: Option<String>,
        condition: StatusCondition,
    ) -> Result<()> {
        let tx = sqlite_tx(ctx)?;
        let mut conn = tx.connection().await?;
        let result = sqlx::query(
            "UPDATE applications SET ready = ?, error = ?, status_condition = ? WHERE id = ?",
        )
        .bind(ready)
        .bind(error)
        .bind(condition)
        .bind(id)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(OperationError::not_found(ResourceType::Application, id));
        }
        Ok(())
    }

    pub async fn delete_global(&self, ctx: &RequestContext, id: &str) -> Result<()> {
        let tx = sqlite_tx(ctx)?;
        let mut conn = tx.connection().await?;
        let result = sqlx::query("DELETE FROM applications WHERE id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(OperationError::not_found(ResourceType::Application, id));
        }
        Ok(())
    }
}

#[async_trait]
impl ResourceFetcher for ApplicationRepository {
    async fn fetch(&self, ctx: &RequestContext, tenant: &str, id: &str) -> Result<Lifecycle> {
        Ok(self.get_by_id(ctx, tenant, id).await?.lifecycle)
    }
}

#[async_trait]
impl ResourceUpdater for ApplicationRepository {
    async fn update(
        &self,
        ctx: &RequestContext,
        id: &str,
        ready: bool,
        error: Option<String>,
        condition: StatusCondition,
    ) -> Result<()> {
        self.technical_update(ctx, id, ready, error, condition).await
    }
}

#[async_trait]
impl ResourceDeleter for ApplicationRepository {
    async fn delete(&self, ctx: &RequestContext, id: &str) -> Result<()> {
        self.delete_global(ctx, id).await
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(OperationError::InvalidData(
            "application name must not be empty".to_string(),
        ));
    }
    Ok(())
}

// Internal row type for sqlx
#[derive(sqlx::FromRow)]
struct ApplicationRow {
    id: String,
    tenant_id: String,
    name: String,
    description: Option<String>,
    ready: bool,
    error: Option<String>,
    status_condition: StatusCondition,
    created_at: i64,
    updated_at: Option<i64>,
    deleted_at: Option<i64>,
}

impl From<ApplicationRow> for Application {
    fn from(row: ApplicationRow) -> Self {
        Self {
            id: row.id,
            tenant_id: row.tenant_id,
            name: row.name,
            description: row.description,
            status_condition: row.status_condition,
            lifecycle: Lifecycle {
                ready: row.ready,
                error: row.error,
                created_at: Some(from_micros(row.created_at)),
                updated_at: row.updated_at.map(from_micros),
                deleted_at: row.deleted_at.map(from_micros),
            },
        }
    }
}
