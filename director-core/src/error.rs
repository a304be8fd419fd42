use crate::resource::ResourceType;
use std::fmt::Display;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, OperationError>;

#[derive(Error, Debug)]
pub enum OperationError {
    #[error("Internal Server Error: {0}")]
    Internal(String),

    #[error("Object not found [object={resource_type}; id={id}]")]
    NotFound {
        resource_type: ResourceType,
        id: String,
    },

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Concurrent operation [reason={0}]")]
    ConcurrentOperationInProgress(String),

    #[error("Tenant is required")]
    TenantRequired,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Stable, client-facing classification of an [`OperationError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Internal,
    NotFound,
    InvalidData,
    ConcurrentOperation,
    TenantRequired,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Internal => "InternalError",
            ErrorCode::NotFound => "NotFound",
            ErrorCode::InvalidData => "InvalidData",
            ErrorCode::ConcurrentOperation => "ConcurrentOperation",
            ErrorCode::TenantRequired => "TenantRequired",
        }
    }
}

impl OperationError {
    pub fn internal(msg: impl Into<String>) -> Self {
        OperationError::Internal(msg.into())
    }

    /// Wraps `err` as an internal error prefixed with `context`.
    pub fn wrap(context: impl Display, err: impl Display) -> Self {
        OperationError::Internal(format!("{}: {}", context, err))
    }

    pub fn not_found(resource_type: ResourceType, id: impl Into<String>) -> Self {
        OperationError::NotFound {
            resource_type,
            id: id.into(),
        }
    }

    pub fn concurrent_operation(reason: impl Into<String>) -> Self {
        OperationError::ConcurrentOperationInProgress(reason.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, OperationError::NotFound { .. })
    }

    pub fn is_tenant_required(&self) -> bool {
        matches!(self, OperationError::TenantRequired)
    }

    pub fn is_concurrent_operation(&self) -> bool {
        matches!(self, OperationError::ConcurrentOperationInProgress(_))
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            OperationError::NotFound { .. } => ErrorCode::NotFound,
            OperationError::InvalidData(_) => ErrorCode::InvalidData,
            OperationError::ConcurrentOperationInProgress(_) => ErrorCode::ConcurrentOperation,
            OperationError::TenantRequired => ErrorCode::TenantRequired,
            _ => ErrorCode::Internal,
        }
    }
}
