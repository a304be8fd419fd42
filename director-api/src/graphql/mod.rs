pub mod extension;
pub mod schema;
pub mod types;

pub use extension::OperationsExtension;
pub use schema::{MutationRoot, QueryRoot, Services};

use async_graphql::{EmptySubscription, ErrorExtensions, Schema};
use director_core::OperationError;

pub type DirectorSchema = Schema<QueryRoot, MutationRoot, EmptySubscription>;

pub fn build_schema(services: Services, director_url: impl Into<String>) -> DirectorSchema {
    Schema::build(QueryRoot, MutationRoot, EmptySubscription)
        .data(services)
        .extension(OperationsExtension::new(director_url))
        .finish()
}

/// Converts a core error into a GraphQL error carrying `extensions.error_code`.
pub fn into_graphql_error(err: OperationError) -> async_graphql::Error {
    let code = err.code();
    async_graphql::Error::new(err.to_string()).extend_with(|_, e| e.set("error_code", code.as_str()))
}
