pub mod pipeline;

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};

use futures_util::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{SchemaError, ToolError};

#[derive(Clone, Debug, PartialEq)]
pub enum ToolOutcome {
    Text(String),
    Json(Value),
}

impl ToolOutcome {
    pub fn json<T: Serialize>(value: &T) -> Result<Self, ToolError> {
        serde_json::to_value(value)
            .map(ToolOutcome::Json)
            .map_err(|err| ToolError::Execution(err.to_string()))
    }

    /// Text form handed back to the model.
    pub fn render(&self) -> String {
        match self {
            ToolOutcome::Text(text) => text.clone(),
            ToolOutcome::Json(value) => value.to_string(),
        }
    }
}

type DynDependency = Arc<dyn Any + Send + Sync>;
type ToolHandler = dyn Fn(Value, &DependencyMap) -> BoxFuture<'static, Result<ToolOutcome, ToolError>>
    + Send
    + Sync;

/// Type-keyed registry of the services tool handlers need (accessors, config).
#[derive(Clone, Default, Debug)]
pub struct DependencyMap {
    typed: Arc<RwLock<HashMap<TypeId, DynDependency>>>,
}

impl DependencyMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<T>(&self, value: T)
    where
        T: Send + Sync + 'static,
    {
        let mut typed = self
            .typed
            .write()
            .expect("dependency typed map lock poisoned");
        typed.insert(TypeId::of::<T>(), Arc::new(value));
    }

    pub fn get<T>(&self) -> Option<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        let typed = self.typed.read().ok()?;
        let value = typed.get(&TypeId::of::<T>())?.clone();
        Arc::downcast::<T>(value).ok()
    }

    /// Like `get`, but reports the missing type as a tool error.
    pub fn require<T>(&self, name: &'static str) -> Result<Arc<T>, ToolError>
    where
        T: Send + Sync + 'static,
    {
        self.get::<T>().ok_or(ToolError::MissingDependency(name))
    }
}

#[derive(Clone)]
pub struct ToolSpec {
    name: String,
    description: String,
    json_schema: Value,
    handler: Arc<ToolHandler>,
}

impl std::fmt::Debug for ToolSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolSpec")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("json_schema", &self.json_schema)
            .finish()
    }
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            json_schema: serde_json::json!({
                "type": "object",
                "properties": {},
                "required": [],
                "additionalProperties": true,
            }),
            handler: Arc::new(|_args, _deps| {
                Box::pin(async {
                    Err(ToolError::Execution(
                        "tool handler not configured".to_string(),
                    ))
                })
            }),
        }
    }

    pub fn with_schema(mut self, schema: Value) -> Result<Self, SchemaError> {
        validate_schema(&schema)?;
        self.json_schema = schema;
        Ok(self)
    }

    pub fn with_handler<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(Value, &DependencyMap) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolOutcome, ToolError>> + Send + 'static,
    {
        self.handler = Arc::new(move |args, deps| Box::pin(handler(args, deps)));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn json_schema(&self) -> &Value {
        &self.json_schema
    }

    pub async fn execute(
        &self,
        args: Value,
        dependencies: &DependencyMap,
    ) -> Result<ToolOutcome, ToolError> {
        let args = drop_null_optionals(&self.json_schema, args);
        validate_arguments(self.name(), &self.json_schema, &args)?;
        debug!(tool = %self.name, %args, "executing tool");
        (self.handler)(args, dependencies).await
    }
}

/// Deserializes handler arguments, mapping serde failures to `InvalidArguments`.
pub fn parse_args<T: DeserializeOwned>(tool: &str, args: Value) -> Result<T, ToolError> {
    serde_json::from_value(args).map_err(|err| ToolError::InvalidArguments {
        tool: tool.to_string(),
        message: err.to_string(),
    })
}

fn validate_schema(schema: &Value) -> Result<(), SchemaError> {
    let schema_obj = schema.as_object().ok_or(SchemaError::SchemaNotObject)?;

    let root_type = schema_obj
        .get("type")
        .and_then(Value::as_str)
        .ok_or(SchemaError::RootTypeMustBeObject)?;

    if root_type != "object" {
        return Err(SchemaError::RootTypeMustBeObject);
    }

    if let Some(required) = schema_obj.get("required") {
        let required_arr = required.as_array().ok_or(SchemaError::InvalidRequired)?;
        for item in required_arr {
            if !item.is_string() {
                return Err(SchemaError::InvalidRequired);
            }
        }
    }

    Ok(())
}

fn required_fields(schema: &Value) -> Vec<&str> {
    schema
        .get("required")
        .and_then(Value::as_array)
        .map(|fields| fields.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}

// Models send `null` for optional parameters they want left at the default.
fn drop_null_optionals(schema: &Value, args: Value) -> Value {
    let map = match args {
        Value::Object(map) => map,
        other => return other,
    };
    let required = required_fields(schema);
    let kept: Map<String, Value> = map
        .into_iter()
        .filter(|(key, value)| !value.is_null() || required.contains(&key.as_str()))
        .collect();
    Value::Object(kept)
}

fn validate_arguments(tool_name: &str, schema: &Value, args: &Value) -> Result<(), ToolError> {
    let invalid = |message: String| ToolError::InvalidArguments {
        tool: tool_name.to_string(),
        message,
    };

    let args_obj = args
        .as_object()
        .ok_or_else(|| invalid("arguments must be a JSON object".to_string()))?;

    let schema_obj = schema
        .as_object()
        .ok_or_else(|| invalid("tool schema must be a JSON object".to_string()))?;

    for field_name in required_fields(schema) {
        if !args_obj.contains_key(field_name) {
            return Err(invalid(format!("missing required field: {field_name}")));
        }
    }

    let properties = schema_obj
        .get("properties")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    if schema_obj
        .get("additionalProperties")
        .and_then(Value::as_bool)
        == Some(false)
    {
        for key in args_obj.keys() {
            if !properties.contains_key(key) {
                return Err(invalid(format!("unknown field: {key}")));
            }
        }
    }

    for (key, value) in args_obj {
        let Some(field_schema) = properties.get(key) else {
            continue;
        };

        if let Some(type_name) = field_schema.get("type").and_then(Value::as_str) {
            if !value_matches_type(value, type_name) {
                return Err(invalid(format!("field '{key}' must be of type {type_name}")));
            }
        }

        if let Some(item_type) = field_schema
            .get("items")
            .and_then(|items| items.get("type"))
            .and_then(Value::as_str)
        {
            let items = value.as_array().map(Vec::as_slice).unwrap_or_default();
            if items.iter().any(|item| !value_matches_type(item, item_type)) {
                return Err(invalid(format!("items of '{key}' must be of type {item_type}")));
            }
        }

        if let (Some(minimum), Some(number)) = (
            field_schema.get("minimum").and_then(Value::as_f64),
            value.as_f64(),
        ) {
            if number < minimum {
                return Err(invalid(format!("field '{key}' must be >= {minimum}")));
            }
        }

        if let (Some(maximum), Some(number)) = (
            field_schema.get("maximum").and_then(Value::as_f64),
            value.as_f64(),
        ) {
            if number > maximum {
                return Err(invalid(format!("field '{key}' must be <= {maximum}")));
            }
        }
    }

    Ok(())
}

fn value_matches_type(value: &Value, type_name: &str) -> bool {
    match type_name {
        "string" => value.is_string(),
        "integer" => value.as_i64().is_some() || value.as_u64().is_some(),
        "number" => value.as_f64().is_some(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn echo_tool() -> ToolSpec {
        ToolSpec::new("echo", "echo arguments")
            .with_schema(json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string"},
                    "tags": {"type": "array", "items": {"type": "string"}},
                    "limit": {"type": "integer", "minimum": 1, "maximum": 100}
                },
                "required": ["name"],
                "additionalProperties": false
            }))
            .expect("schema valid")
            .with_handler(|args, _deps| async move { Ok(ToolOutcome::Json(args)) })
    }

    #[test]
    fn schema_validation_rejects_non_object_root() {
        let result = ToolSpec::new("bad", "bad").with_schema(json!({"type": "string"}));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn dependencies_resolve_by_type() {
        let deps = DependencyMap::new();
        deps.insert::<u32>(9);

        let tool = ToolSpec::new("read", "read dep").with_handler(|_args, deps| {
            let value = deps.require::<u32>("u32");
            async move { Ok::<_, ToolError>(ToolOutcome::Text(value?.to_string())) }
        });

        let outcome = tool.execute(json!({}), &deps).await.expect("tool executes");
        assert_eq!(outcome, ToolOutcome::Text("9".to_string()));

        let err = tool
            .execute(json!({}), &DependencyMap::new())
            .await
            .expect_err("dependency missing");
        assert!(matches!(err, ToolError::MissingDependency("u32")));
    }

    #[tokio::test]
    async fn argument_validation_reports_missing_required() {
        let err = echo_tool()
            .execute(json!({}), &DependencyMap::new())
            .await
            .expect_err("should fail");
        assert!(err.to_string().contains("missing required field"));
    }

    #[tokio::test]
    async fn null_optionals_are_dropped_before_validation() {
        let outcome = echo_tool()
            .execute(json!({"name": "x", "limit": null}), &DependencyMap::new())
            .await
            .expect("executes");
        assert_eq!(outcome, ToolOutcome::Json(json!({"name": "x"})));
    }

    #[tokio::test]
    async fn item_types_and_bounds_are_enforced() {
        let err = echo_tool()
            .execute(json!({"name": "x", "tags": ["a", 1]}), &DependencyMap::new())
            .await
            .expect_err("bad item");
        assert!(err.to_string().contains("items of 'tags'"));

        let err = echo_tool()
            .execute(json!({"name": "x", "limit": 0}), &DependencyMap::new())
            .await
            .expect_err("below minimum");
        assert!(err.to_string().contains(">= 1"));

        let err = echo_tool()
            .execute(json!({"name": "x", "limit": 101}), &DependencyMap::new())
            .await
            .expect_err("above maximum");
        assert!(err.to_string().contains("<= 100"));
    }

    #[test]
    fn outcome_renders_json_compactly() {
        assert_eq!(ToolOutcome::Json(json!({"a": [1]})).render(), r#"{"a":[1]}"#);
    }
}
