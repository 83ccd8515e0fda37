//! Shared data model: tool definitions, invocations, results, pipeline
//! operations, and recovery strategies.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

pub use toolrunner_commons::ErrorType;

/// Execution priority band. Declared low-to-high so the derived `Ord`
/// orders `Critical > High > Normal > Background`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    Background,
    Normal,
    High,
    Critical,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

/// Declared JSON-schema-ish parameter type for structural validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    Boolean,
    Array,
    Object,
}

impl ParamType {
    /// Structural match against a `serde_json::Value`: `number` accepts
    /// both int and float, `array` requires sequence shape, `object`
    /// requires a string-keyed map.
    pub fn matches(self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Number => value.is_number(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::Array => value.is_array(),
            ParamType::Object => value.is_object(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    pub description: String,
    pub required: bool,
    pub default: Option<Value>,
}

/// Immutable-after-registration description of a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub category: String,
    pub parameters: Vec<ParameterSpec>,
}

impl ToolDefinition {
    /// JSON Schema object suitable for embedding in a function-calling
    /// descriptor.
    pub fn schema(&self) -> Value {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();
        for p in &self.parameters {
            let type_name = match p.param_type {
                ParamType::String => "string",
                ParamType::Number => "number",
                ParamType::Boolean => "boolean",
                ParamType::Array => "array",
                ParamType::Object => "object",
            };
            properties.insert(
                p.name.clone(),
                serde_json::json!({ "type": type_name, "description": p.description }),
            );
            if p.required {
                required.push(p.name.clone());
            }
        }
        serde_json::json!({
            "type": "object",
            "properties": Value::Object(properties),
            "required": required,
        })
    }

    pub fn describe(&self) -> Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.schema(),
            }
        })
    }
}

pub type TaskId = u64;

#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub tool_name: String,
    pub args: Value,
    pub priority: Priority,
    pub task_id: TaskId,
    pub submitted_at_ms: u64,
    pub timeout_ms: Option<u64>,
}

impl ToolInvocation {
    pub fn now_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_name: String,
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
    pub metadata: HashMap<String, Value>,
}

impl ToolResult {
    pub fn success(tool_name: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            success: true,
            output: output.into(),
            error: None,
            metadata: HashMap::new(),
        }
    }

    pub fn failure(tool_name: impl Into<String>, error: impl Into<String>, error_type: ErrorType) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert("error_type".to_string(), Value::String(error_type.to_string()));
        Self {
            tool_name: tool_name.into(),
            success: false,
            output: String::new(),
            error: Some(error.into()),
            metadata,
        }
    }

    pub fn error_type(&self) -> Option<ErrorType> {
        self.metadata.get("error_type").and_then(|v| v.as_str()).and_then(|s| {
            Some(match s {
                "VALIDATION" => ErrorType::Validation,
                "SECURITY" => ErrorType::Security,
                "FILE_NOT_FOUND" => ErrorType::FileNotFound,
                "PERMISSION" => ErrorType::Permission,
                "TIMEOUT" => ErrorType::Timeout,
                "NETWORK" => ErrorType::Network,
                "RESOURCE" => ErrorType::Resource,
                "INTERNAL" => ErrorType::Internal,
                _ => return None,
            })
        })
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Pipeline node kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Read,
    Analyze,
    Write,
}

pub type OperationId = String;

#[derive(Debug, Clone)]
pub struct Operation {
    pub id: OperationId,
    pub kind: OperationKind,
    pub tool_name: String,
    pub args: Value,
    pub priority: i32,
    pub dependencies: Vec<OperationId>,
}

#[derive(Debug, Clone)]
pub struct OperationResult {
    pub operation_id: OperationId,
    pub result: ToolResult,
}

/// Context captured at failure time, used to drive recovery.
#[derive(Debug, Clone)]
pub struct FailureContext {
    pub goal: String,
    pub invocation: ToolInvocation,
    pub result: ToolResult,
    pub working_dir: std::path::PathBuf,
    pub retry_count: u32,
    pub environment: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrategyKind {
    ParameterAdjustment,
    AlternativeCommand,
    Decomposition,
    FallbackTool,
    UserEscalation,
    Abandon,
}

#[derive(Debug, Clone)]
pub struct RecoveryStrategy {
    pub kind: StrategyKind,
    pub description: String,
    confidence: f32,
    pub risk: RiskLevel,
    estimated_success_rate: f32,
    pub adjusted_args: Option<Value>,
    pub alternative_invocations: Vec<(String, Value)>,
    pub rationale: String,
}

impl RecoveryStrategy {
    pub fn new(kind: StrategyKind, description: impl Into<String>, confidence: f32, risk: RiskLevel) -> Self {
        Self {
            kind,
            description: description.into(),
            confidence: confidence.clamp(0.0, 1.0),
            risk,
            estimated_success_rate: confidence.clamp(0.0, 1.0),
            adjusted_args: None,
            alternative_invocations: Vec::new(),
            rationale: String::new(),
        }
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn estimated_success_rate(&self) -> f32 {
        self.estimated_success_rate
    }

    pub fn with_success_rate(mut self, rate: f32) -> Self {
        self.estimated_success_rate = rate.clamp(0.0, 1.0);
        self
    }

    pub fn with_adjusted_args(mut self, args: Value) -> Self {
        self.adjusted_args = Some(args);
        self
    }

    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = rationale.into();
        self
    }

    /// Signature used for per-session loop prevention: the strategy kind
    /// plus a stable fingerprint of its adjusted arguments.
    pub fn signature(&self) -> String {
        let args_fingerprint = self
            .adjusted_args
            .as_ref()
            .map(|v| v.to_string())
            .unwrap_or_default();
        format!("{:?}:{}", self.kind, args_fingerprint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_ordering_is_critical_highest() {
        assert!(Priority::Critical > Priority::High);
        assert!(Priority::High > Priority::Normal);
        assert!(Priority::Normal > Priority::Background);
    }

    #[test]
    fn param_type_number_accepts_int_and_float() {
        assert!(ParamType::Number.matches(&serde_json::json!(1)));
        assert!(ParamType::Number.matches(&serde_json::json!(1.5)));
        assert!(!ParamType::Number.matches(&serde_json::json!("1")));
    }

    #[test]
    fn recovery_strategy_clamps_confidence() {
        let strat = RecoveryStrategy::new(StrategyKind::Abandon, "give up", 1.7, RiskLevel::Low);
        assert_eq!(strat.confidence(), 1.0);
        let strat = RecoveryStrategy::new(StrategyKind::Abandon, "give up", -0.3, RiskLevel::Low);
        assert_eq!(strat.confidence(), 0.0);
    }

    #[test]
    fn tool_definition_describe_matches_function_calling_shape() {
        let def = ToolDefinition {
            name: "grep".into(),
            description: "search".into(),
            category: "search".into(),
            parameters: vec![ParameterSpec {
                name: "pattern".into(),
                param_type: ParamType::String,
                description: "regex".into(),
                required: true,
                default: None,
            }],
        };
        let described = def.describe();
        assert_eq!(described["type"], "function");
        assert_eq!(described["function"]["name"], "grep");
        assert_eq!(described["function"]["parameters"]["required"][0], "pattern");
    }
}
