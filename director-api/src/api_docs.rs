use director_core::{
    Operation, OperationRequest, OperationResponse, OperationStatus, OperationType, ResourceType,
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::health::health_check,
        crate::routes::health::readiness_check,
        crate::routes::operations::get_operation,
        crate::routes::operations::get_operation_by_path,
        crate::routes::operations::finalize_operation,
    ),
    components(
        schemas(
            Operation,
            OperationRequest,
            OperationResponse,
            OperationStatus,
            OperationType,
            ResourceType
        )
    ),
    tags(
        (name = "health", description = "Service health"),
        (name = "operations", description = "Asynchronous operation tracking")
    )
)]
pub struct ApiDoc;
