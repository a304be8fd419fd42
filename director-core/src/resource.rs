//! Persisted resource kinds and the lifecycle fields every resource carries.

use crate::context::RequestContext;
use crate::error::{OperationError, Result};
use crate::operation::{OperationStatus, OperationType};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ResourceType {
    Application,
    Webhook,
}

impl ResourceType {
    /// Whether asynchronous operations can be tracked for this kind of resource.
    pub fn is_supported(&self) -> bool {
        matches!(self, ResourceType::Application)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Application => "application",
            ResourceType::Webhook => "webhook",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = OperationError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "application" => Ok(ResourceType::Application),
            "webhook" => Ok(ResourceType::Webhook),
            other => Err(OperationError::InvalidData(format!(
                "unknown resource type {:?}",
                other
            ))),
        }
    }
}

/// Lifecycle state of a resource.
///
/// The five fields are only meaningful together: in-progress checks and
/// operation status derivation always look at all of them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Lifecycle {
    pub ready: bool,
    pub error: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Lifecycle {
    /// A create whose asynchronous part has not reported back yet.
    pub fn create_in_progress(&self) -> bool {
        self.deleted_at.is_none()
            && self.updated_at.is_none()
            && !self.ready
            && self.error.is_none()
    }

    /// A delete whose asynchronous part has not reported back yet.
    pub fn delete_in_progress(&self) -> bool {
        self.deleted_at.is_some() && self.error.is_none()
    }

    /// Type of the last operation applied to the resource.
    pub fn operation_type(&self) -> OperationType {
        if self.deleted_at.is_some() {
            return OperationType::Delete;
        }
        match self.updated_at {
            Some(updated_at) if Some(updated_at) != self.created_at => OperationType::Update,
            _ => OperationType::Create,
        }
    }

    /// Status of the last operation. An error always wins: `ready` only says
    /// the operation reached a terminal state.
    pub fn operation_status(&self) -> OperationStatus {
        if self.error.is_some() {
            OperationStatus::Failed
        } else if self.ready {
            OperationStatus::Succeeded
        } else {
            OperationStatus::InProgress
        }
    }

    /// When the last operation was started.
    pub fn operation_time(&self) -> Option<DateTime<Utc>> {
        match self.operation_type() {
            OperationType::Delete => self.deleted_at,
            OperationType::Update => self.updated_at,
            OperationType::Create => self.created_at,
        }
    }
}

/// Anything a mutation resolver can hand back as the subject of an operation.
pub trait Entity {
    fn id(&self) -> &str;
    fn resource_type(&self) -> ResourceType;
}

/// Condition recorded on a resource once an operation is finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusCondition {
    Initial,
    CreateSucceeded,
    CreateFailed,
    UpdateSucceeded,
    UpdateFailed,
    DeleteFailed,
}

/// Loads the lifecycle of a resource owned by `tenant`.
#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    async fn fetch(&self, ctx: &RequestContext, tenant: &str, id: &str) -> Result<Lifecycle>;
}

/// Applies the final state of a CREATE/UPDATE (or failed DELETE) operation.
#[async_trait]
pub trait ResourceUpdater: Send + Sync {
    async fn update(
        &self,
        ctx: &RequestContext,
        id: &str,
        ready: bool,
        error: Option<String>,
        condition: StatusCondition,
    ) -> Result<()>;
}

/// Removes a resource whose DELETE operation finished successfully.
#[async_trait]
pub trait ResourceDeleter: Send + Sync {
    async fn delete(&self, ctx: &RequestContext, id: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_application_is_supported() {
        assert!(ResourceType::Application.is_supported());
        assert!(!ResourceType::Webhook.is_supported());
    }

    #[test]
    fn test_resource_type_from_str() {
        assert_eq!(
            "application".parse::<ResourceType>().unwrap(),
            ResourceType::Application
        );
        assert!("runtime".parse::<ResourceType>().is_err());
        assert!("Application".parse::<ResourceType>().is_err());
    }

    #[test]
    fn test_fresh_unready_resource_is_create_in_progress() {
        let lifecycle = Lifecycle {
            created_at: Some(Utc::now()),
            ..Default::default()
        };

        assert!(lifecycle.create_in_progress());
        assert!(!lifecycle.delete_in_progress());
    }

    #[test]
    fn test_failed_create_is_not_in_progress() {
        let lifecycle = Lifecycle {
            ready: true,
            error: Some("boom".to_string()),
            created_at: Some(Utc::now()),
            ..Default::default()
        };

        assert!(!lifecycle.create_in_progress());
        assert!(!lifecycle.delete_in_progress());
    }

    fn at(secs: i64) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(secs, 0)
    }

    #[test]
    fn test_operation_type_derivation() {
        let created = Lifecycle {
            created_at: at(10),
            ..Default::default()
        };
        assert_eq!(created.operation_type(), OperationType::Create);
        assert_eq!(created.operation_time(), at(10));

        // An update stamp equal to the creation stamp is still a create.
        let touched = Lifecycle {
            created_at: at(10),
            updated_at: at(10),
            ..Default::default()
        };
        assert_eq!(touched.operation_type(), OperationType::Create);

        let updated = Lifecycle {
            created_at: at(10),
            updated_at: at(20),
            ..Default::default()
        };
        assert_eq!(updated.operation_type(), OperationType::Update);
        assert_eq!(updated.operation_time(), at(20));

        let deleted = Lifecycle {
            created_at: at(10),
            updated_at: at(20),
            deleted_at: at(30),
            ..Default::default()
        };
        assert_eq!(deleted.operation_type(), OperationType::Delete);
        assert_eq!(deleted.operation_time(), at(30));
    }

    #[test]
    fn test_operation_status_for_all_combinations() {
        let stamps = [
            (None, None, OperationType::Create),
            (at(20), None, OperationType::Update),
            (at(20), at(30), OperationType::Delete),
        ];
        let states = [
            (false, None, OperationStatus::InProgress),
            (true, None, OperationStatus::Succeeded),
            (true, Some("boom"), OperationStatus::Failed),
        ];

        for (updated_at, deleted_at, expected_type) in stamps {
            for (ready, error, expected_status) in states {
                let lifecycle = Lifecycle {
                    ready,
                    error: error.map(str::to_string),
                    created_at: at(10),
                    updated_at,
                    deleted_at,
                };
                assert_eq!(lifecycle.operation_type(), expected_type);
                assert_eq!(lifecycle.operation_status(), expected_status);
            }
        }
    }

    #[test]
    fn test_error_without_ready_is_failed() {
        let lifecycle = Lifecycle {
            ready: false,
            error: Some("boom".to_string()),
            created_at: at(10),
            ..Default::default()
        };
        assert_eq!(lifecycle.operation_type(), OperationType::Create);
        assert_eq!(lifecycle.operation_status(), OperationStatus::Failed);
    }

    #[test]
    fn test_marked_for_deletion_is_delete_in_progress() {
        let now = Utc::now();
        let lifecycle = Lifecycle {
            created_at: Some(now),
            updated_at: Some(now),
            deleted_at: Some(now),
            ..Default::default()
        };

        assert!(lifecycle.delete_in_progress());
        assert!(!lifecycle.create_in_progress());
    }
}
