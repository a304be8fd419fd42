//! Operation status polling and the finalize callback webhooks report to.

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Extension, Json, Router,
};
use director_core::{OperationRequest, OperationResponse, RequestContext};
use serde::Deserialize;
use tracing::{error, info};

pub fn routes(operation_path: &str) -> Router<AppState> {
    Router::new()
        .route(
            operation_path,
            get(get_operation).post(finalize_operation),
        )
        .route(
            &format!("{}/{{resource_type}}/{{resource_id}}", operation_path),
            get(get_operation_by_path),
        )
}

#[derive(Debug, Default, Deserialize)]
pub struct OperationQuery {
    #[serde(default)]
    resource_id: String,
    #[serde(default)]
    resource_type: String,
}

#[utoipa::path(
    get,
    path = "/operation",
    tag = "operations",
    params(
        ("resource_id" = String, Query, description = "ID of the resource"),
        ("resource_type" = String, Query, description = "Type of the resource, e.g. application")
    ),
    responses(
        (status = 200, description = "Last operation on the resource", body = OperationResponse),
        (status = 400, description = "Unexpected resource type and/or GUID"),
        (status = 404, description = "Resource not found"),
        (status = 500, description = "Internal error")
    )
)]
pub async fn get_operation(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): Query<OperationQuery>,
) -> ApiResult<Json<OperationResponse>> {
    last_operation(&state, &ctx, &query.resource_type, &query.resource_id).await
}

#[utoipa::path(
    get,
    path = "/operation/{resource_type}/{resource_id}",
    tag = "operations",
    params(
        ("resource_type" = String, Path, description = "Type of the resource, e.g. application"),
        ("resource_id" = String, Path, description = "ID of the resource")
    ),
    responses(
        (status = 200, description = "Last operation on the resource", body = OperationResponse),
        (status = 400, description = "Unexpected resource type and/or GUID"),
        (status = 404, description = "Resource not found"),
        (status = 500, description = "Internal error")
    )
)]
pub async fn get_operation_by_path(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path((resource_type, resource_id)): Path<(String, String)>,
) -> ApiResult<Json<OperationResponse>> {
    last_operation(&state, &ctx, &resource_type, &resource_id).await
}

async fn last_operation(
    state: &AppState,
    ctx: &RequestContext,
    resource_type: &str,
    resource_id: &str,
) -> ApiResult<Json<OperationResponse>> {
    let response = state
        .status_reader
        .last_operation(ctx, resource_type, resource_id)
        .await?;

    Ok(Json(response))
}

#[utoipa::path(
    post,
    path = "/operation",
    tag = "operations",
    request_body = OperationRequest,
    responses(
        (status = 200, description = "Resource finalized"),
        (status = 400, description = "Malformed or invalid operation"),
        (status = 404, description = "Resource not found"),
        (status = 500, description = "Internal error")
    )
)]
pub async fn finalize_operation(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    body: Bytes,
) -> ApiResult<StatusCode> {
    let request: OperationRequest = serde_json::from_slice(&body).map_err(|e| {
        error!(error = %e, "Unable to decode operation request body");
        ApiError::BadRequest("Unable to decode body to JSON".to_string())
    })?;

    request.validate().map_err(|e| {
        error!(error = %e, "Invalid operation request");
        ApiError::BadRequest(format!("Invalid operation properties: {}", e))
    })?;

    state.finalizer.finalize(&ctx, &request).await?;

    info!(
        resource_id = %request.resource_id,
        operation_type = %request.operation_type,
        failed = !request.error.is_empty(),
        "Operation finalized"
    );
    Ok(StatusCode::OK)
}
