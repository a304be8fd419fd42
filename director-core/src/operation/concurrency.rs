use crate::context::{RequestContext, TenantLoaderFn};
use crate::error::{OperationError, Result};
use crate::operation::{OperationType, ResolverContext};
use crate::persistence::{rollback_unless_committed, Transactioner};
use crate::resource::ResourceFetcher;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error};

/// Which resolver argument names the resource a mutation touches.
#[derive(Debug, Clone)]
pub struct ConcurrencyArgs {
    pub operation_type: OperationType,
    pub id_field: Option<String>,
    pub parent_id_field: Option<String>,
}

impl ConcurrencyArgs {
    pub fn new(operation_type: OperationType) -> Self {
        Self {
            operation_type,
            id_field: None,
            parent_id_field: None,
        }
    }

    pub fn id_field(mut self, field: impl Into<String>) -> Self {
        self.id_field = Some(field.into());
        self
    }

    pub fn parent_id_field(mut self, field: impl Into<String>) -> Self {
        self.parent_id_field = Some(field.into());
        self
    }
}

/// Rejects a mutation while another operation on the same resource is still
/// waiting for its webhook to report back.
#[derive(Clone)]
pub struct ConcurrencyDirective {
    transact: Arc<dyn Transactioner>,
    fetcher: Arc<dyn ResourceFetcher>,
    tenant_loader: TenantLoaderFn,
}

impl ConcurrencyDirective {
    pub fn new(
        transact: Arc<dyn Transactioner>,
        fetcher: Arc<dyn ResourceFetcher>,
        tenant_loader: TenantLoaderFn,
    ) -> Self {
        Self {
            transact,
            fetcher,
            tenant_loader,
        }
    }

    pub async fn handle<T, F, Fut>(
        &self,
        ctx: &RequestContext,
        rctx: &ResolverContext,
        args: &ConcurrencyArgs,
        next: F,
    ) -> Result<T>
    where
        T: Send,
        F: FnOnce(RequestContext) -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
    {
        let tx = self.transact.begin().await.map_err(|e| {
            error!(error = %e, "An error occurred while opening database transaction");
            OperationError::wrap("Unable to initialize database operation", e)
        })?;
        let ctx = ctx.clone().with_transaction(tx.clone());

        let result = self.check_and_resolve(&ctx, rctx, args, next).await;
        let value = match result {
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

        Ok(value)
    }

    async fn check_and_resolve<T, F, Fut>(
        &self,
        ctx: &RequestContext,
        rctx: &ResolverContext,
        args: &ConcurrencyArgs,
        next: F,
    ) -> Result<T>
    where
        T: Send,
        F: FnOnce(RequestContext) -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
    {
        if args.operation_type == OperationType::Create && args.parent_id_field.is_none() {
            debug!(object = rctx.object(), field = rctx.field(), "Skipping concurrency check for create operation");
        } else {
            ensure_no_concurrent_operation(
                ctx,
                rctx,
                args.id_field.as_deref(),
                args.parent_id_field.as_deref(),
                self.fetcher.as_ref(),
                &self.tenant_loader,
            )
            .await?;
        }

        next(ctx.clone()).await.map_err(|e| {
            error!(error = %e, field = rctx.field(), "Resolver failed");
            OperationError::wrap("Unable to process operation", e)
        })
    }
}

/// Fails with `ConcurrentOperationInProgress` when the resource named by
/// `id_field` (or `parent_id_field`) has a create or delete in flight.
///
/// Reads through whatever transaction `ctx` carries.
pub async fn ensure_no_concurrent_operation(
    ctx: &RequestContext,
    rctx: &ResolverContext,
    id_field: Option<&str>,
    parent_id_field: Option<&str>,
    fetcher: &dyn ResourceFetcher,
    tenant_loader: &TenantLoaderFn,
) -> Result<()> {
    let resource_id = resolve_resource_id(rctx, id_field, parent_id_field)?;

    let tenant = tenant_loader(ctx).map_err(|e| {
        error!(error = %e, "Unable to load tenant for concurrency check");
        OperationError::TenantRequired
    })?;

    let lifecycle = fetcher
        .fetch(ctx, &tenant, resource_id)
        .await
        .map_err(|e| {
            if e.is_not_found() {
                e
            } else {
                OperationError::wrap(
                    format!("failed to fetch resource with id {}", resource_id),
                    e,
                )
            }
        })?;

    if lifecycle.create_in_progress() {
        return Err(OperationError::concurrent_operation(
            "create operation is in progress",
        ));
    }
    if lifecycle.delete_in_progress() {
        return Err(OperationError::concurrent_operation(
            "delete operation is in progress",
        ));
    }

    Ok(())
}

fn resolve_resource_id<'a, 'f>(
    rctx: &'a ResolverContext,
    id_field: Option<&'f str>,
    parent_id_field: Option<&'f str>,
) -> Result<&'a str> {
    let field = match (id_field, parent_id_field) {
        (Some(field), None) | (None, Some(field)) => field,
        (None, None) => {
            return Err(OperationError::internal(
                "idField or parentIdField must be provided",
            ))
        }
        (Some(_), Some(_)) => {
            return Err(OperationError::internal(
                "only one of idField or parentIdField may be provided",
            ))
        }
    };

    rctx.string_arg(field).ok_or_else(|| {
        OperationError::internal(format!(
            "could not get idField: {:?} from request context",
            field
        ))
    })
}
