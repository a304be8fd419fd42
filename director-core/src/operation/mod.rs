//! Asynchronous operation tracking.
//!
//! A mutation runs either synchronously inside one request or, in ASYNC mode,
//! is recorded as an [`Operation`] that a scheduler hands to webhooks. The
//! resource's lifecycle fields are the source of truth for its status.

pub mod concurrency;
pub mod directive;
pub mod finalize;
pub mod resolver;
pub mod scheduler;
pub mod status;

pub use concurrency::{ensure_no_concurrent_operation, ConcurrencyArgs, ConcurrencyDirective};
pub use directive::{Directive, OperationArgs, WebhookFetcher};
pub use finalize::{OperationFinalizer, ResourceRegistry};
pub use resolver::ResolverContext;
pub use scheduler::{
    DatabaseScheduler, DisabledScheduler, ScheduledOperation, ScheduledOperationStatus,
    ScheduledOperationStore, Scheduler,
};
pub use status::OperationStatusReader;

use crate::context::Headers;
use crate::error::{OperationError, Result};
use crate::resource::ResourceType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;
use uuid::Uuid;

/// Name of the mutation argument selecting the operation mode.
pub const MODE_PARAM: &str = "mode";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationType {
    Create,
    Update,
    Delete,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Create => "CREATE",
            OperationType::Update => "UPDATE",
            OperationType::Delete => "DELETE",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationMode {
    #[default]
    Sync,
    Async,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationStatus {
    Succeeded,
    Failed,
    InProgress,
}

/// Envelope describing one asynchronous mutation.
///
/// `operation_id` stays empty until a scheduler accepts the operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Operation {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub operation_id: String,
    pub operation_type: OperationType,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub operation_category: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub resource_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<ResourceType>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub correlation_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub webhook_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub request_data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_time: Option<DateTime<Utc>>,
}

impl Operation {
    pub fn new(operation_type: OperationType, category: impl Into<String>) -> Self {
        Self {
            operation_id: String::new(),
            operation_type,
            operation_category: category.into(),
            resource_id: String::new(),
            resource_type: None,
            correlation_id: String::new(),
            webhook_ids: Vec::new(),
            request_data: String::new(),
            creation_time: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_resource(&self.resource_id, self.resource_type)
    }
}

fn validate_resource(resource_id: &str, resource_type: Option<ResourceType>) -> Result<()> {
    if Uuid::parse_str(resource_id).is_err() {
        return Err(OperationError::InvalidData(format!(
            "resource_id {:?} is not a valid UUID",
            resource_id
        )));
    }
    match resource_type {
        Some(t) if t.is_supported() => Ok(()),
        Some(t) => Err(OperationError::InvalidData(format!(
            "resource_type {} is not supported",
            t
        ))),
        None => Err(OperationError::InvalidData(
            "resource_type is required".to_string(),
        )),
    }
}

/// Body of the finalize callback. An empty `error` means success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct OperationRequest {
    pub operation_type: OperationType,
    pub resource_type: ResourceType,
    pub resource_id: String,
    #[serde(default)]
    pub error: String,
}

impl OperationRequest {
    pub fn validate(&self) -> Result<()> {
        validate_resource(&self.resource_id, Some(self.resource_type))
    }

    /// Error payload stored on the resource, `None` for a successful operation.
    pub fn error_payload(&self) -> Result<Option<String>> {
        if self.error.is_empty() {
            return Ok(None);
        }
        let payload = serde_json::to_string(&serde_json::json!({ "error": self.error }))?;
        Ok(Some(payload))
    }
}

/// Operation as reported to clients polling for its status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct OperationResponse {
    #[serde(flatten)]
    pub operation: Operation,
    pub status: OperationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Payload handed to webhooks for an asynchronous operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestData {
    pub application: serde_json::Value,
    pub tenant_id: String,
    pub headers: Headers,
}
