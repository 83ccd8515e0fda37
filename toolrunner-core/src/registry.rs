//! Tool Registry: append-only catalogue of callable tools plus structural
//! argument validation.
//!
//! Grounded in the reference agent's `Tool` trait usage (`impl Tool for
//! CommandTool` in its command tool) — the trait surface here is inferred
//! from how tools are invoked across the corpus rather than copied from a
//! single file, since the trait definition itself was not part of the
//! retrieved pack.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use crate::types::{ParamType, ToolDefinition, ToolResult};
use toolrunner_commons::{ErrorType, RuntimeError};

/// Capability a registered tool must implement. Kept deliberately small:
/// the registry only needs enough surface to validate and execute.
#[async_trait]
pub trait Tool: Send + Sync {
    fn definition(&self) -> &ToolDefinition;

    async fn execute(&self, args: Value) -> anyhow::Result<ToolResult>;
}

struct Entry {
    def: ToolDefinition,
    tool: Arc<dyn Tool>,
}

/// Read-only after startup; the only interior mutability is a single
/// `RwLock` guarding registration, which in steady state every caller takes
/// for reading only.
#[derive(Default)]
pub struct ToolRegistry {
    entries: RwLock<HashMap<String, Entry>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registration is append-only at startup. A duplicate name overwrites
    /// with a warning — a programming error in a well-formed build, but not
    /// one worth making fatal in release builds.
    pub fn register(&self, tool: Arc<dyn Tool>) {
        let def = tool.definition().clone();
        let mut entries = self.entries.write();
        if entries.contains_key(&def.name) {
            warn!(tool = %def.name, "duplicate tool registration; overwriting");
            debug_assert!(false, "duplicate tool registration for {}", def.name);
        }
        entries.insert(def.name.clone(), Entry { def, tool });
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.entries.read().get(name).map(|e| e.tool.clone())
    }

    pub fn list(&self) -> Vec<ToolDefinition> {
        self.entries.read().values().map(|e| e.def.clone()).collect()
    }

    pub fn describe(&self) -> Vec<Value> {
        self.entries.read().values().map(|e| e.def.describe()).collect()
    }

    /// Structural validation: every required parameter present, every
    /// present parameter's runtime shape matches its declared type, and no
    /// unknown parameters. Never panics; always returns a structured error.
    pub fn validate(&self, name: &str, args: &Value) -> Result<(), RuntimeError> {
        let entries = self.entries.read();
        let entry = entries
            .get(name)
            .ok_or_else(|| RuntimeError::UnknownTool(name.to_string()))?;

        let obj = args.as_object().ok_or_else(|| {
            RuntimeError::validation(format!("arguments for `{name}` must be a JSON object"))
        })?;

        let known: std::collections::HashSet<&str> =
            entry.def.parameters.iter().map(|p| p.name.as_str()).collect();
        for key in obj.keys() {
            if !known.contains(key.as_str()) {
                return Err(RuntimeError::validation(format!(
                    "unknown parameter `{key}` for tool `{name}`"
                )));
            }
        }

        for param in &entry.def.parameters {
            match obj.get(&param.name) {
                Some(value) => {
                    if !param.param_type.matches(value) {
                        return Err(RuntimeError::validation(format!(
                            "parameter `{}` for tool `{name}` must be of type {:?}",
                            param.name, param.param_type
                        )));
                    }
                }
                None if param.required => {
                    return Err(RuntimeError::validation(format!(
                        "missing required parameter `{}` for tool `{name}`",
                        param.name
                    )));
                }
                None => {}
            }
        }

        Ok(())
    }

    /// Materialize declared defaults for any parameter the caller omitted.
    /// Used by the pipeline's cache-key canonicalization.
    pub fn with_defaults(&self, name: &str, args: &Value) -> Value {
        let entries = self.entries.read();
        let Some(entry) = entries.get(name) else {
            return args.clone();
        };
        let mut obj = args.as_object().cloned().unwrap_or_default();
        for param in &entry.def.parameters {
            if !obj.contains_key(&param.name) {
                if let Some(default) = &param.default {
                    obj.insert(param.name.clone(), default.clone());
                }
            }
        }
        Value::Object(obj)
    }
}

#[allow(dead_code)]
fn _assert_param_type_enum_exhaustive(p: ParamType) {
    match p {
        ParamType::String | ParamType::Number | ParamType::Boolean | ParamType::Array | ParamType::Object => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ParameterSpec;

    struct EchoTool(ToolDefinition);

    #[async_trait]
    impl Tool for EchoTool {
        fn definition(&self) -> &ToolDefinition {
            &self.0
        }

        async fn execute(&self, args: Value) -> anyhow::Result<ToolResult> {
            Ok(ToolResult::success("echo", args.to_string()))
        }
    }

    fn echo_def() -> ToolDefinition {
        ToolDefinition {
            name: "echo".into(),
            description: "echoes input".into(),
            category: "test".into(),
            parameters: vec![ParameterSpec {
                name: "text".into(),
                param_type: ParamType::String,
                description: "text to echo".into(),
                required: true,
                default: None,
            }],
        }
    }

    #[test]
    fn rejects_unknown_tool() {
        let registry = ToolRegistry::new();
        let err = registry.validate("missing", &serde_json::json!({})).unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Validation);
    }

    #[test]
    fn rejects_missing_required_parameter() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool(echo_def())));
        let err = registry.validate("echo", &serde_json::json!({})).unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Validation);
    }

    #[test]
    fn rejects_unknown_parameter() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool(echo_def())));
        let err = registry
            .validate("echo", &serde_json::json!({"text": "hi", "bogus": 1}))
            .unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Validation);
    }

    #[test]
    fn accepts_well_formed_args() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool(echo_def())));
        assert!(registry.validate("echo", &serde_json::json!({"text": "hi"})).is_ok());
    }

    #[test]
    fn number_type_accepts_both_int_and_float_shapes() {
        let mut def = echo_def();
        def.parameters[0].param_type = ParamType::Number;
        let registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool(def)));
        assert!(registry.validate("echo", &serde_json::json!({"text": 3})).is_ok());
        assert!(registry.validate("echo", &serde_json::json!({"text": 3.5})).is_ok());
        assert!(registry.validate("echo", &serde_json::json!({"text": "3"})).is_err());
    }

    #[test]
    fn describe_emits_function_calling_shape() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool(echo_def())));
        let described = registry.describe();
        assert_eq!(described.len(), 1);
        assert_eq!(described[0]["type"], "function");
    }
}
