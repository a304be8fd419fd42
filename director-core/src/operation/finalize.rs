use crate::context::RequestContext;
use crate::error::{OperationError, Result};
use crate::operation::{OperationRequest, OperationType};
use crate::persistence::{rollback_unless_committed, Transactioner};
use crate::resource::{ResourceDeleter, ResourceType, ResourceUpdater, StatusCondition};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};

/// Updaters and deleters per resource type.
#[derive(Clone, Default)]
pub struct ResourceRegistry {
    updaters: HashMap<ResourceType, Arc<dyn ResourceUpdater>>,
    deleters: HashMap<ResourceType, Arc<dyn ResourceDeleter>>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_updater(mut self, resource_type: ResourceType, updater: Arc<dyn ResourceUpdater>) -> Self {
        self.updaters.insert(resource_type, updater);
        self
    }

    pub fn with_deleter(mut self, resource_type: ResourceType, deleter: Arc<dyn ResourceDeleter>) -> Self {
        self.deleters.insert(resource_type, deleter);
        self
    }

    fn updater(&self, resource_type: ResourceType) -> Result<&Arc<dyn ResourceUpdater>> {
        self.updaters.get(&resource_type).ok_or_else(|| {
            OperationError::internal(format!("no updater registered for resource type {}", resource_type))
        })
    }

    fn deleter(&self, resource_type: ResourceType) -> Result<&Arc<dyn ResourceDeleter>> {
        self.deleters.get(&resource_type).ok_or_else(|| {
            OperationError::internal(format!("no deleter registered for resource type {}", resource_type))
        })
    }
}

/// Applies the outcome reported for an asynchronous operation to the
/// resource it touched.
#[derive(Clone)]
pub struct OperationFinalizer {
    transact: Arc<dyn Transactioner>,
    registry: ResourceRegistry,
}

impl OperationFinalizer {
    pub fn new(transact: Arc<dyn Transactioner>, registry: ResourceRegistry) -> Self {
        Self { transact, registry }
    }

    pub async fn finalize(&self, ctx: &RequestContext, request: &OperationRequest) -> Result<()> {
        request.validate().map_err(|e| {
            error!(error = %e, "Invalid operation properties");
            e
        })?;

        let tx = self.transact.begin().await.map_err(|e| {
            error!(error = %e, "An error has occurred while opening transaction");
            OperationError::internal("Unable to establish connection with database")
        })?;
        let tx_ctx = ctx.clone().with_transaction(tx.clone());

        if let Err(e) = self.apply(&tx_ctx, request).await {
            rollback_unless_committed(&tx).await;
            return Err(e);
        }

        tx.commit().await.map_err(|e| {
            error!(error = %e, "An error has occurred while committing transaction");
            OperationError::internal("Unable to finalize database operation")
        })?;

        info!(
            resource_id = %request.resource_id,
            operation_type = %request.operation_type,
            failed = !request.error.is_empty(),
            "Operation finalized"
        );
        Ok(())
    }

    async fn apply(&self, ctx: &RequestContext, request: &OperationRequest) -> Result<()> {
        let id = request.resource_id.as_str();
        let resource_type = request.resource_type;
        let error = request.error_payload()?;
        let failed = error.is_some();

        let (result, action) = match request.operation_type {
            OperationType::Delete if !failed => {
                let deleter = self.registry.deleter(resource_type)?;
                (deleter.delete(ctx, id).await, "delete")
            }
            OperationType::Delete => {
                let updater = self.registry.updater(resource_type)?;
                (
                    updater
                        .update(ctx, id, true, error, StatusCondition::DeleteFailed)
                        .await,
                    "update",
                )
            }
            OperationType::Create | OperationType::Update => {
                let condition = match (request.operation_type, failed) {
                    (OperationType::Create, false) => StatusCondition::CreateSucceeded,
                    (OperationType::Create, true) => StatusCondition::CreateFailed,
                    (_, false) => StatusCondition::UpdateSucceeded,
                    (_, true) => StatusCondition::UpdateFailed,
                };
                let updater = self.registry.updater(resource_type)?;
                (updater.update(ctx, id, true, error, condition).await, "update")
            }
        };

        result.map_err(|e| {
            if e.is_not_found() {
                return e;
            }
            error!(error = %e, resource_id = id, "Unable to {} resource", action);
            OperationError::internal(format!(
                "Unable to {} resource {} with id {}",
                action, resource_type, id
            ))
        })
    }
}
