//! Response rewriting for asynchronous operations.
//!
//! Every operation scheduled while executing a request is reported under
//! `extensions.locations`, and the payload of each top-level field that ran in
//! ASYNC mode is removed from `data`. Fields that ran synchronously are left
//! untouched.

use async_graphql::extensions::{
    Extension, ExtensionContext, ExtensionFactory, NextExecute, NextParseQuery,
};
use async_graphql::parser::types::{
    ExecutableDocument, OperationDefinition, OperationType, Selection, VariableDefinition,
};
use async_graphql::{Name, Positioned, Response, ServerError, ServerResult, Value, Variables};
use async_graphql_value::Value as InputValue;
use director_core::operation::MODE_PARAM;
use director_core::RequestContext;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::error;

const ASYNC_MODE: &str = "ASYNC";

pub struct OperationsExtension {
    director_url: Arc<str>,
}

impl OperationsExtension {
    pub fn new(director_url: impl Into<String>) -> Self {
        Self {
            director_url: Arc::from(director_url.into()),
        }
    }
}

impl ExtensionFactory for OperationsExtension {
    fn create(&self) -> Arc<dyn Extension> {
        Arc::new(OperationsResponseExtension {
            director_url: self.director_url.clone(),
            async_fields: Mutex::new(Vec::new()),
        })
    }
}

/// Response keys of ASYNC top-level fields, per operation of the document.
type AsyncFields = Vec<(Option<String>, Vec<String>)>;

struct OperationsResponseExtension {
    director_url: Arc<str>,
    async_fields: Mutex<AsyncFields>,
}

impl OperationsResponseExtension {
    fn async_keys(&self, operation_name: Option<&str>) -> Vec<String> {
        let fields = self
            .async_fields
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        match operation_name {
            Some(name) => fields
                .iter()
                .find(|(op, _)| op.as_deref() == Some(name))
                .map(|(_, keys)| keys.clone())
                .unwrap_or_default(),
            None => fields
                .first()
                .map(|(_, keys)| keys.clone())
                .unwrap_or_default(),
        }
    }
}

#[async_trait::async_trait]
impl Extension for OperationsResponseExtension {
    async fn parse_query(
        &self,
        ctx: &ExtensionContext<'_>,
        query: &str,
        variables: &Variables,
        next: NextParseQuery<'_>,
    ) -> ServerResult<ExecutableDocument> {
        let document = next.run(ctx, query, variables).await?;

        let fields = collect_async_fields(&document, variables);
        *self
            .async_fields
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = fields;

        Ok(document)
    }

    async fn execute(
        &self,
        ctx: &ExtensionContext<'_>,
        operation_name: Option<&str>,
        next: NextExecute<'_>,
    ) -> Response {
        let response = next.run(ctx, operation_name).await;

        let operations = match ctx
            .data_opt::<RequestContext>()
            .and_then(|req| req.operations())
        {
            Some(operations) if !operations.is_empty() => operations.snapshot(),
            _ => return response,
        };

        let locations = operations
            .iter()
            .filter_map(|op| {
                op.resource_type.map(|resource_type| {
                    Value::String(format!(
                        "{}/{}/{}",
                        self.director_url, resource_type, op.resource_id
                    ))
                })
            })
            .collect();

        match strip_async_fields(response, &self.async_keys(operation_name)) {
            Ok(mut response) => {
                response
                    .extensions
                    .insert("locations".to_string(), Value::List(locations));
                response
            }
            Err(e) => {
                error!(error = %e.message, "Unable to rewrite response for asynchronous operations");
                Response::from_errors(vec![e])
            }
        }
    }
}

fn strip_async_fields(mut response: Response, keys: &[String]) -> Result<Response, ServerError> {
    match &mut response.data {
        Value::Object(data) => {
            for key in keys {
                data.shift_remove(key.as_str());
            }
            Ok(response)
        }
        Value::Null => Ok(response),
        _ => Err(ServerError::new("failed to prepare response body", None)),
    }
}

fn collect_async_fields(document: &ExecutableDocument, variables: &Variables) -> AsyncFields {
    document
        .operations
        .iter()
        .filter(|(_, op)| op.node.ty == OperationType::Mutation)
        .map(|(name, op)| {
            (
                name.map(|n| n.to_string()),
                async_response_keys(&op.node, variables),
            )
        })
        .collect()
}

fn async_response_keys(op: &OperationDefinition, variables: &Variables) -> Vec<String> {
    op.selection_set
        .node
        .items
        .iter()
        .filter_map(|item| match &item.node {
            Selection::Field(field) => Some(&field.node),
            _ => None,
        })
        .filter(|field| {
            field
                .arguments
                .iter()
                .find(|(name, _)| name.node.as_str() == MODE_PARAM)
                .map(|(_, value)| {
                    is_async_mode(&value.node, variables, &op.variable_definitions)
                })
                .unwrap_or(false)
        })
        .map(|field| field.response_key().node.to_string())
        .collect()
}

fn is_async_mode(
    value: &InputValue,
    variables: &Variables,
    definitions: &[Positioned<VariableDefinition>],
) -> bool {
    match value {
        InputValue::Enum(name) => name.as_str() == ASYNC_MODE,
        InputValue::Variable(var) => {
            let resolved = variables
                .get(var)
                .or_else(|| variable_default(definitions, var));
            match resolved {
                Some(Value::Enum(name)) => name.as_str() == ASYNC_MODE,
                Some(Value::String(s)) => s == ASYNC_MODE,
                _ => false,
            }
        }
        _ => false,
    }
}

fn variable_default<'a>(
    definitions: &'a [Positioned<VariableDefinition>],
    var: &Name,
) -> Option<&'a Value> {
    definitions
        .iter()
        .find(|def| def.node.name.node == *var)
        .and_then(|def| def.node.default_value.as_ref())
        .map(|value| &value.node)
}
