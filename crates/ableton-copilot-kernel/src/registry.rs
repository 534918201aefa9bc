//! Tool registry.
//!
//! Tools are declared as types implementing [`Tool`] and registered once at
//! startup into a [`ToolRegistry`]. The registry is the single table mapping
//! a tool name to its handler, input schema and pipeline policy.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use ableton_copilot_types::HistoryId;

use crate::context::AppContext;
use crate::error::{KernelError, KernelResult};
use crate::snapshot::SnapshotTarget;

/// A typed, externally invocable operation.
#[async_trait]
pub trait Tool: Send + Sync + 'static {
    type Params: DeserializeOwned + JsonSchema + Send + 'static;

    const NAME: &'static str;
    const DESCRIPTION: &'static str;

    /// Refuse to run while Live is disconnected.
    const REQUIRES_LIVE: bool = true;

    /// Record a history row for every call.
    const TRACKED: bool = false;

    /// Checks on parsed parameters that the schema cannot express.
    fn validate(params: &Self::Params) -> KernelResult<()> {
        let _ = params;
        Ok(())
    }

    /// State to capture before the call mutates anything. Only consulted
    /// for tracked tools.
    fn snapshot_target(params: &Self::Params) -> Option<SnapshotTarget> {
        let _ = params;
        None
    }

    async fn call(&self, ctx: &AppContext, params: Self::Params, history_id: Option<HistoryId>) -> KernelResult<Value>;
}

/// Object-safe view of a [`Tool`] used by the pipeline.
pub trait ToolHandler: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn requires_live(&self) -> bool;
    fn tracked(&self) -> bool;
    fn input_schema(&self) -> Arc<Map<String, Value>>;

    /// Parse and validate arguments into a call that is ready to run.
    fn prepare(&self, args: &Value) -> KernelResult<Box<dyn PreparedCall + '_>>;
}

/// A tool call whose arguments have been parsed and validated.
#[async_trait]
pub trait PreparedCall: Send {
    /// State to capture before running. Always `None` for untracked tools.
    fn snapshot_target(&self) -> Option<SnapshotTarget>;

    async fn invoke(self: Box<Self>, ctx: &AppContext, history_id: Option<HistoryId>) -> KernelResult<Value>;
}

struct TypedCall<'a, T: Tool> {
    tool: &'a T,
    params: T::Params,
}

#[async_trait]
impl<'a, T: Tool> PreparedCall for TypedCall<'a, T> {
    fn snapshot_target(&self) -> Option<SnapshotTarget> {
        if T::TRACKED { T::snapshot_target(&self.params) } else { None }
    }

    async fn invoke(self: Box<Self>, ctx: &AppContext, history_id: Option<HistoryId>) -> KernelResult<Value> {
        let TypedCall { tool, params } = *self;
        tool.call(ctx, params, history_id).await
    }
}

struct TypedHandler<T: Tool> {
    tool: T,
    schema: Arc<Map<String, Value>>,
}

impl<T: Tool> TypedHandler<T> {
    fn new(tool: T) -> Self {
        Self {
            tool,
            schema: Arc::new(schema_for::<T::Params>()),
        }
    }

    fn parse(args: &Value) -> KernelResult<T::Params> {
        let args = match args {
            Value::Null => Value::Object(Map::new()),
            other => other.clone(),
        };
        let params: T::Params = serde_json::from_value(args)
            .map_err(|e| KernelError::invalid_argument(format!("invalid arguments for {}: {e}", T::NAME)))?;
        T::validate(&params)?;
        Ok(params)
    }
}

/// JSON schema object for a parameter type.
///
/// Subschemas are inlined; some MCP clients do not resolve `$defs`/`$ref`.
pub fn schema_for<P: JsonSchema>() -> Map<String, Value> {
    let settings = schemars::generate::SchemaSettings::draft07().with(|s| {
        s.inline_subschemas = true;
    });
    let schema = settings.into_generator().into_root_schema_for::<P>();
    match serde_json::to_value(schema) {
        Ok(Value::Object(map)) => map,
        _ => {
            let mut map = Map::new();
            map.insert("type".into(), Value::String("object".into()));
            map
        }
    }
}

impl<T: Tool> ToolHandler for TypedHandler<T> {
    fn name(&self) -> &'static str {
        T::NAME
    }

    fn description(&self) -> &'static str {
        T::DESCRIPTION
    }

    fn requires_live(&self) -> bool {
        T::REQUIRES_LIVE
    }

    fn tracked(&self) -> bool {
        T::TRACKED
    }

    fn input_schema(&self) -> Arc<Map<String, Value>> {
        self.schema.clone()
    }

    fn prepare(&self, args: &Value) -> KernelResult<Box<dyn PreparedCall + '_>> {
        Ok(Box::new(TypedCall {
            tool: &self.tool,
            params: Self::parse(args)?,
        }))
    }
}

/// Name-indexed table of tool handlers.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<&'static str, Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: Tool>(&mut self, tool: T) -> KernelResult<()> {
        if self.tools.contains_key(T::NAME) {
            return Err(KernelError::internal(format!("tool {} registered twice", T::NAME)));
        }
        self.tools.insert(T::NAME, Arc::new(TypedHandler::new(tool)));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.tools.get(name).cloned()
    }

    /// Handlers in name order.
    pub fn handlers(&self) -> impl Iterator<Item = &Arc<dyn ToolHandler>> {
        self.tools.values()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.tools.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, JsonSchema)]
    struct EchoParams {
        /// Text to echo back
        text: String,
    }

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        type Params = EchoParams;
        const NAME: &'static str = "echo";
        const DESCRIPTION: &'static str = "Echo the input";
        const REQUIRES_LIVE: bool = false;

        fn validate(params: &EchoParams) -> KernelResult<()> {
            if params.text.is_empty() {
                return Err(KernelError::invalid_argument("text must not be empty"));
            }
            Ok(())
        }

        async fn call(&self, _ctx: &AppContext, params: EchoParams, _: Option<HistoryId>) -> KernelResult<Value> {
            Ok(json!(params.text))
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register(Echo).unwrap();
        let handler = registry.get("echo").unwrap();
        assert_eq!(handler.description(), "Echo the input");
        assert!(!handler.requires_live());
        assert!(!handler.tracked());
        assert!(registry.get("nope").is_none());
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut registry = ToolRegistry::new();
        registry.register(Echo).unwrap();
        assert!(registry.register(Echo).is_err());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_schema_lists_properties() {
        let mut registry = ToolRegistry::new();
        registry.register(Echo).unwrap();
        let schema = registry.get("echo").unwrap().input_schema();
        assert_eq!(schema.get("type"), Some(&json!("object")));
        assert!(schema["properties"].get("text").is_some());
    }

    #[test]
    fn test_prepare_reports_bad_arguments() {
        let mut registry = ToolRegistry::new();
        registry.register(Echo).unwrap();
        let handler = registry.get("echo").unwrap();

        let err = handler.prepare(&json!({"text": 5})).err().unwrap();
        assert!(matches!(err, KernelError::InvalidArgument(_)));

        let err = handler.prepare(&json!({"text": ""})).err().unwrap();
        assert_eq!(err, KernelError::invalid_argument("text must not be empty"));

        assert!(handler.prepare(&json!({"text": "hi"})).unwrap().snapshot_target().is_none());
    }

    #[tokio::test]
    async fn test_prepared_call_runs_with_parsed_params() {
        let mut registry = ToolRegistry::new();
        registry.register(Echo).unwrap();
        let handler = registry.get("echo").unwrap();
        let ctx = AppContext::in_memory(std::sync::Arc::new(crate::live::MemoryLive::new())).unwrap();

        let call = handler.prepare(&json!({"text": "hi"})).unwrap();
        assert_eq!(call.invoke(&ctx, None).await.unwrap(), json!("hi"));
    }
}
