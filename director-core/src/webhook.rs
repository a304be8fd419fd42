use crate::context::RequestContext;
use crate::error::Result;
use crate::operation::WebhookFetcher;
use crate::persistence::sqlite_tx;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WebhookType {
    RegisterApplication,
    UnregisterApplication,
    ConfigurationChanged,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Webhook {
    pub id: String,
    pub application_id: String,
    pub webhook_type: WebhookType,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookInput {
    pub webhook_type: WebhookType,
    pub url: String,
}

/// Webhook persistence. All calls run in the transaction carried by the
/// request context.
#[derive(Debug, Clone, Default)]
pub struct WebhookRepository;

impl WebhookRepository {
    pub fn new() -> Self {
        Self
    }

    pub async fn create(
        &self,
        ctx: &RequestContext,
        application_id: &str,
        input: &WebhookInput,
    ) -> Result<Webhook> {
        let webhook = Webhook {
            id: Uuid::new_v4().to_string(),
            application_id: application_id.to_string(),
            webhook_type: input.webhook_type,
            url: input.url.clone(),
        };

        let tx = sqlite_tx(ctx)?;
        let mut conn = tx.connection().await?;
        sqlx::query("INSERT INTO webhooks (id, application_id, webhook_type, url) VALUES (?, ?, ?, ?)")
            .bind(&webhook.id)
            .bind(&webhook.application_id)
            .bind(webhook.webhook_type)
            .bind(&webhook.url)
            .execute(&mut *conn)
            .await?;

        Ok(webhook)
    }

    pub async fn list_by_application(
        &self,
        ctx: &RequestContext,
        application_id: &str,
    ) -> Result<Vec<Webhook>> {
        let tx = sqlite_tx(ctx)?;
        let mut conn = tx.connection().await?;
        let webhooks = sqlx::query_as::<_, Webhook>(
            "SELECT id, application_id, webhook_type, url FROM webhooks WHERE application_id = ? ORDER BY rowid",
        )
        .bind(application_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(webhooks)
    }

    /// Webhooks with the given IDs, in no particular order. Unknown IDs are skipped.
    pub async fn list_by_ids(&self, ctx: &RequestContext, ids: &[String]) -> Result<Vec<Webhook>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let query = format!(
            "SELECT id, application_id, webhook_type, url FROM webhooks WHERE id IN ({})",
            placeholders
        );
        let mut q = sqlx::query_as::<_, Webhook>(&query);
        for id in ids {
            q = q.bind(id);
        }

        let tx = sqlite_tx(ctx)?;
        let mut conn = tx.connection().await?;
        Ok(q.fetch_all(&mut *conn).await?)
    }
}

#[async_trait]
impl WebhookFetcher for WebhookRepository {
    async fn list_webhooks(&self, ctx: &RequestContext, resource_id: &str) -> Result<Vec<Webhook>> {
        self.list_by_application(ctx, resource_id).await
    }
}
