use crate::context::{RequestContext, TenantLoaderFn};
use crate::error::{OperationError, Result};
use crate::operation::concurrency::ensure_no_concurrent_operation;
use crate::operation::{
    Operation, OperationMode, OperationType, RequestData, ResolverContext, Scheduler,
};
use crate::persistence::{rollback_unless_committed, Transactioner};
use crate::resource::{Entity, ResourceFetcher};
use crate::webhook::{Webhook, WebhookType};
use async_trait::async_trait;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Lists the webhooks registered for a resource.
#[async_trait]
pub trait WebhookFetcher: Send + Sync {
    async fn list_webhooks(&self, ctx: &RequestContext, resource_id: &str)
        -> Result<Vec<Webhook>>;
}

/// How a mutation participates in operation tracking.
#[derive(Debug, Clone)]
pub struct OperationArgs {
    pub operation_type: OperationType,
    pub webhook_type: Option<WebhookType>,
    pub id_field: Option<String>,
}

impl OperationArgs {
    pub fn new(operation_type: OperationType) -> Self {
        Self {
            operation_type,
            webhook_type: None,
            id_field: None,
        }
    }

    pub fn webhook_type(mut self, webhook_type: WebhookType) -> Self {
        self.webhook_type = Some(webhook_type);
        self
    }

    pub fn id_field(mut self, field: impl Into<String>) -> Self {
        self.id_field = Some(field.into());
        self
    }
}

/// Runs a mutation either synchronously or as a scheduled asynchronous
/// operation, depending on its `mode` argument.
#[derive(Clone)]
pub struct Directive {
    transact: Arc<dyn Transactioner>,
    webhook_fetcher: Arc<dyn WebhookFetcher>,
    resource_fetcher: Arc<dyn ResourceFetcher>,
    tenant_loader: TenantLoaderFn,
    scheduler: Arc<dyn Scheduler>,
}

impl Directive {
    pub fn new(
        transact: Arc<dyn Transactioner>,
        webhook_fetcher: Arc<dyn WebhookFetcher>,
        resource_fetcher: Arc<dyn ResourceFetcher>,
        tenant_loader: TenantLoaderFn,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        Self {
            transact,
            webhook_fetcher,
            resource_fetcher,
            tenant_loader,
            scheduler,
        }
    }

    pub async fn handle_operation<T, F, Fut>(
        &self,
        ctx: &RequestContext,
        rctx: &ResolverContext,
        args: &OperationArgs,
        next: F,
    ) -> Result<T>
    where
        T: Entity + Serialize + Send,
        F: FnOnce(RequestContext) -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
    {
        let mode = rctx.mode().map_err(|e| {
            error!(error = %e, field = rctx.field(), "Unable to read operation mode");
            e
        })?;
        let ctx = ctx.clone().with_mode(mode);

        let tx = self.transact.begin().await.map_err(|e| {
            error!(error = %e, "An error occurred while opening database transaction");
            OperationError::wrap("Unable to initialize database operation", e)
        })?;
        let ctx = ctx.with_transaction(tx.clone());

        if mode == OperationMode::Sync {
            debug!(object = rctx.object(), field = rctx.field(), "Executing operation synchronously");
            let value = match self.resolve_sync(&ctx, rctx, args, next).await {
                Ok(value) => value,
                Err(e) => {
                    rollback_unless_committed(&tx).await;
                    return Err(e);
                }
            };
            tx.commit().await.map_err(|e| {
                error!(error = %e, "An error occurred while closing database transaction");
                OperationError::wrap("Unable to finalize database operation", e)
            })?;
            return Ok(value);
        }

        let correlation_id = match ctx.correlation_id() {
            Some(id) => id.to_string(),
            None => {
                rollback_unless_committed(&tx).await;
                return Err(OperationError::internal(
                    "unable to get correlation ID from request context",
                ));
            }
        };

        let operations = ctx.operations().cloned().unwrap_or_default();
        let ctx = ctx.with_operations(operations.clone());

        let mut operation = Operation::new(args.operation_type, rctx.field());
        operation.correlation_id = correlation_id;
        let handle = operations.register(operation.clone());

        let value = match self.resolve_async(&ctx, rctx, args, &mut operation, next).await {
            Ok(value) => value,
            Err(e) => {
                operations.discard(handle);
                rollback_unless_committed(&tx).await;
                return Err(e);
            }
        };

        if let Err(e) = tx.commit().await {
            error!(error = %e, "An error occurred while closing database transaction");
            operations.discard(handle);
            return Err(OperationError::wrap("Unable to finalize database operation", e));
        }

        info!(
            operation_id = %operation.operation_id,
            category = %operation.operation_category,
            resource_id = %operation.resource_id,
            "Asynchronous operation scheduled"
        );
        operations.update(handle, operation);
        Ok(value)
    }

    async fn resolve_sync<T, F, Fut>(
        &self,
        ctx: &RequestContext,
        rctx: &ResolverContext,
        args: &OperationArgs,
        next: F,
    ) -> Result<T>
    where
        T: Send,
        F: FnOnce(RequestContext) -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
    {
        self.check_concurrency(ctx, rctx, args).await?;
        next(ctx.clone()).await
    }

    async fn resolve_async<T, F, Fut>(
        &self,
        ctx: &RequestContext,
        rctx: &ResolverContext,
        args: &OperationArgs,
        operation: &mut Operation,
        next: F,
    ) -> Result<T>
    where
        T: Entity + Serialize + Send,
        F: FnOnce(RequestContext) -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
    {
        self.check_concurrency(ctx, rctx, args).await?;

        let value = next(ctx.clone()).await.map_err(|e| {
            error!(error = %e, field = rctx.field(), "Resolver failed");
            OperationError::wrap("Unable to process operation", e)
        })?;

        let resource_id = value.id().to_string();
        operation.resource_id = resource_id.clone();
        operation.resource_type = Some(value.resource_type());

        let webhooks = self
            .webhook_fetcher
            .list_webhooks(ctx, &resource_id)
            .await
            .map_err(|e| {
                error!(error = %e, resource_id = %resource_id, "Unable to retrieve webhooks");
                OperationError::wrap("Unable to retrieve webhooks", e)
            })?;
        operation.webhook_ids = webhooks
            .into_iter()
            .filter(|w| Some(w.webhook_type) == args.webhook_type)
            .map(|w| w.id)
            .collect();

        operation.request_data = self.prepare_request_data(ctx, &value).map_err(|e| {
            error!(error = %e, "Unable to prepare webhook request data");
            OperationError::wrap("Unable to prepare webhook request data", e)
        })?;

        operation.validate()?;

        let operation_id = self.scheduler.schedule(ctx, operation).await.map_err(|e| {
            error!(error = %e, "Unable to schedule operation");
            OperationError::wrap("Unable to schedule operation", e)
        })?;
        operation.operation_id = operation_id;

        Ok(value)
    }

    /// UPDATE and DELETE must name the target resource and are refused while
    /// another operation on it is pending.
    async fn check_concurrency(
        &self,
        ctx: &RequestContext,
        rctx: &ResolverContext,
        args: &OperationArgs,
    ) -> Result<()> {
        if args.operation_type == OperationType::Create {
            return Ok(());
        }
        let id_field = args
            .id_field
            .as_deref()
            .ok_or_else(|| OperationError::internal("idField from context should not be empty"))?;

        ensure_no_concurrent_operation(
            ctx,
            rctx,
            Some(id_field),
            None,
            self.resource_fetcher.as_ref(),
            &self.tenant_loader,
        )
        .await
    }

    fn prepare_request_data<T: Serialize>(&self, ctx: &RequestContext, value: &T) -> Result<String> {
        let tenant_id = (self.tenant_loader)(ctx)?;
        let headers = ctx
            .headers()
            .cloned()
            .ok_or_else(|| OperationError::internal("failed to retrieve request headers"))?;

        let data = RequestData {
            application: serde_json::to_value(value)?,
            tenant_id,
            headers,
        };
        Ok(serde_json::to_string(&data)?)
    }
}
