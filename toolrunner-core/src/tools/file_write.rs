//! `file_write` built-in: write/overwrite a file within an allowed base,
//! with optional parent-directory creation. Grounded in
//! `tools::file_ops::FileOpsTool::write_file`.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::registry::Tool;
use crate::sanitizer::PathValidator;
use crate::types::{ParamType, ParameterSpec, ToolDefinition, ToolResult};
use toolrunner_commons::ErrorType;

pub struct FileWriteTool {
    validator: Arc<PathValidator>,
    def: ToolDefinition,
}

impl FileWriteTool {
    pub fn new(validator: Arc<PathValidator>) -> Self {
        let def = ToolDefinition {
            name: "file_write".into(),
            description: "Write (overwriting) a UTF-8 text file.".into(),
            category: "filesystem".into(),
            parameters: vec![
                ParameterSpec {
                    name: "path".into(),
                    param_type: ParamType::String,
                    description: "Path to write.".into(),
                    required: true,
                    default: None,
                },
                ParameterSpec {
                    name: "content".into(),
                    param_type: ParamType::String,
                    description: "Content to write.".into(),
                    required: true,
                    default: None,
                },
                ParameterSpec {
                    name: "create_parents".into(),
                    param_type: ParamType::Boolean,
                    description: "Create missing parent directories.".into(),
                    required: false,
                    default: Some(Value::Bool(false)),
                },
            ],
        };
        Self { validator, def }
    }
}

#[async_trait]
impl Tool for FileWriteTool {
    fn definition(&self) -> &ToolDefinition {
        &self.def
    }

    async fn execute(&self, args: Value) -> anyhow::Result<ToolResult> {
        let path = args.get("path").and_then(|v| v.as_str()).unwrap_or_default();
        let content = args.get("content").and_then(|v| v.as_str()).unwrap_or_default();
        let create_parents = args.get("create_parents").and_then(|v| v.as_bool()).unwrap_or(false);

        let outcome = match self.validator.validate(path, true) {
            Ok(outcome) => outcome,
            Err(err) => return Ok(ToolResult::failure("file_write", err.to_string(), err.error_type())),
        };

        if create_parents {
            if let Some(parent) = outcome.resolved_path.parent() {
                if let Err(err) = std::fs::create_dir_all(parent) {
                    return Ok(ToolResult::failure("file_write", err.to_string(), ErrorType::Permission));
                }
            }
        }

        match std::fs::write(&outcome.resolved_path, content) {
            Ok(()) => Ok(ToolResult::success(
                "file_write",
                format!("wrote {} bytes to {}", content.len(), outcome.resolved_path.display()),
            )),
            Err(err) => {
                let error_type = match err.kind() {
                    std::io::ErrorKind::NotFound => ErrorType::FileNotFound,
                    std::io::ErrorKind::PermissionDenied => ErrorType::Permission,
                    _ => ErrorType::Internal,
                };
                Ok(ToolResult::failure("file_write", err.to_string(), error_type))
            }
        }
    }
}
