use crate::context::{RequestContext, TenantLoaderFn};
use crate::error::{OperationError, Result};
use crate::operation::{Operation, OperationResponse};
use crate::persistence::{rollback_unless_committed, Transactioner};
use crate::resource::{ResourceFetcher, ResourceType};
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

/// Answers "what happened to the last operation on this resource", derived
/// from the resource's lifecycle fields.
#[derive(Clone)]
pub struct OperationStatusReader {
    transact: Arc<dyn Transactioner>,
    fetcher: Arc<dyn ResourceFetcher>,
    tenant_loader: TenantLoaderFn,
}

impl OperationStatusReader {
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

    /// Failures are logged in detail; the returned errors carry messages safe
    /// to show to clients.
    pub async fn last_operation(
        &self,
        ctx: &RequestContext,
        resource_type: &str,
        resource_id: &str,
    ) -> Result<OperationResponse> {
        let tenant = (self.tenant_loader)(ctx).map_err(|e| {
            error!(error = %e, "An error has occurred while loading tenant from context");
            OperationError::internal("Unable to determine tenant for request")
        })?;

        let resource_type = parse_params(resource_type, resource_id).map_err(|e| {
            error!(error = %e, resource_id, "Unexpected resource type and/or GUID");
            OperationError::InvalidData("Unexpected resource type and/or GUID".to_string())
        })?;

        let tx = self.transact.begin().await.map_err(|e| {
            error!(error = %e, "An error has occurred while opening transaction");
            OperationError::internal("Unable to establish connection with database")
        })?;
        let tx_ctx = ctx.clone().with_transaction(tx.clone());

        let lifecycle = match self.fetcher.fetch(&tx_ctx, &tenant, resource_id).await {
            Ok(lifecycle) => lifecycle,
            Err(e) => {
                rollback_unless_committed(&tx).await;
                if e.is_not_found() {
                    return Err(e);
                }
                error!(error = %e, resource_id, "An error has occurred while fetching resource");
                return Err(OperationError::internal(
                    "Unable to execute database operation",
                ));
            }
        };

        tx.commit().await.map_err(|e| {
            error!(error = %e, "An error has occurred while committing transaction");
            OperationError::internal("Unable to finalize database operation")
        })?;

        let mut operation = Operation::new(lifecycle.operation_type(), String::new());
        operation.resource_id = resource_id.to_string();
        operation.resource_type = Some(resource_type);
        operation.creation_time = lifecycle.operation_time();

        Ok(OperationResponse {
            operation,
            status: lifecycle.operation_status(),
            error: lifecycle.error,
        })
    }
}

fn parse_params(resource_type: &str, resource_id: &str) -> Result<ResourceType> {
    Uuid::parse_str(resource_id)
        .map_err(|e| OperationError::InvalidData(format!("invalid resource_id: {}", e)))?;
    let resource_type: ResourceType = resource_type.parse()?;
    if !resource_type.is_supported() {
        return Err(OperationError::InvalidData(format!(
            "resource_type {} is not supported",
            resource_type
        )));
    }
    Ok(resource_type)
}
