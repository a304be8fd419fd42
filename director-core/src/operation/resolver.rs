use crate::error::{OperationError, Result};
use crate::operation::{OperationMode, MODE_PARAM};
use serde::Serialize;
use serde_json::{Map, Value};

/// The GraphQL field being resolved and its (defaulted) arguments.
#[derive(Debug, Clone, Default)]
pub struct ResolverContext {
    object: String,
    field: String,
    args: Map<String, Value>,
}

impl ResolverContext {
    pub fn new(object: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            object: object.into(),
            field: field.into(),
            args: Map::new(),
        }
    }

    pub fn with_arg<T: Serialize>(mut self, name: &str, value: T) -> Result<Self> {
        self.args.insert(name.to_string(), serde_json::to_value(value)?);
        Ok(self)
    }

    pub fn object(&self) -> &str {
        &self.object
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn arg(&self, name: &str) -> Option<&Value> {
        self.args.get(name)
    }

    /// A string argument. Absent, null and non-string values all yield `None`.
    pub fn string_arg(&self, name: &str) -> Option<&str> {
        self.arg(name).and_then(Value::as_str)
    }

    pub fn mode(&self) -> Result<OperationMode> {
        let value = self
            .arg(MODE_PARAM)
            .filter(|v| !v.is_null())
            .ok_or_else(|| OperationError::internal("could not get mode parameter"))?;
        serde_json::from_value(value.clone())
            .map_err(|e| OperationError::wrap("could not get mode parameter", e))
    }
}
