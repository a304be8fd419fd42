pub mod graphql;
pub mod health;
pub mod operations;

use crate::{
    api_docs::ApiDoc, config::Config, context::request_context_middleware, state::AppState,
};
use axum::{extract::Request, middleware, Router};
use sqlx::SqlitePool;
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::info_span;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub async fn create_app(pool: SqlitePool, config: Config) -> anyhow::Result<Router> {
    let operation_path = config.operation_path.clone();
    let state = AppState::new(pool, config);

    // Allow CORS for local development (frontend on different port)
    let cors = CorsLayer::permissive();

    let trace = TraceLayer::new_for_http().make_span_with(|req: &Request| {
        let correlation_id = req
            .headers()
            .get("x-request-id")
            .and_then(|h| h.to_str().ok())
            .unwrap_or_default();
        info_span!(
            "http_request",
            method = %req.method(),
            uri = %req.uri(),
            correlation_id = %correlation_id
        )
    });

    let app = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(health::routes())
        .merge(
            graphql::routes()
                .merge(operations::routes(&operation_path))
                .layer(middleware::from_fn(request_context_middleware)),
        )
        .layer(trace)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(cors)
        .with_state(state);

    Ok(app)
}
