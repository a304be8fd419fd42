use crate::state::AppState;
use async_graphql::http::GraphiQLSource;
use axum::{
    extract::State,
    response::{Html, IntoResponse},
    routing::get,
    Extension, Json, Router,
};
use director_core::{OperationsCollector, RequestContext};

pub fn routes() -> Router<AppState> {
    Router::new().route("/graphql", get(graphiql).post(graphql_handler))
}

/// Executes a GraphQL request. Each request collects its own asynchronous
/// operations.
pub async fn graphql_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(request): Json<async_graphql::Request>,
) -> Json<async_graphql::Response> {
    let ctx = ctx.with_operations(OperationsCollector::new());
    Json(state.schema.execute(request.data(ctx)).await)
}

async fn graphiql() -> impl IntoResponse {
    Html(GraphiQLSource::build().endpoint("/graphql").finish())
}
