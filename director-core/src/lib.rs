//! Director operation tracking
//!
//! This crate contains the asynchronous mutation machinery of the Director:
//! the directives that run a mutation synchronously or schedule it as an
//! operation, the scheduler, the status read path and the finalize path that
//! webhooks report back through. It also holds the application and webhook
//! persistence those paths operate on.
//!
//! It is consumed by the director-api HTTP service.

pub mod application;
pub mod context;
pub mod db;
pub mod error;
pub mod operation;
pub mod persistence;
pub mod resource;
pub mod webhook;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use application::{Application, ApplicationInput, ApplicationRepository};
pub use context::{OperationsCollector, RequestContext, TenantLoaderFn};
pub use error::{ErrorCode, OperationError, Result};
pub use operation::{
    Operation, OperationMode, OperationRequest, OperationResponse, OperationStatus, OperationType,
};
pub use persistence::{PersistenceTx, SqliteTransactioner, Transactioner};
pub use resource::{Entity, Lifecycle, ResourceType, StatusCondition};
pub use webhook::{Webhook, WebhookInput, WebhookRepository, WebhookType};
