//! `file_read` built-in: read a UTF-8 file within an allowed base, with an
//! optional line range. Grounded in `tools::file_ops::FileOpsTool::read_file`
//! (offset/limit-by-lines shape), simplified to a single mode.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::registry::Tool;
use crate::sanitizer::PathValidator;
use crate::types::{ParamType, ParameterSpec, ToolDefinition, ToolResult};
use toolrunner_commons::ErrorType;

pub struct FileReadTool {
    validator: Arc<PathValidator>,
    def: ToolDefinition,
}

impl FileReadTool {
    pub fn new(validator: Arc<PathValidator>) -> Self {
        let def = ToolDefinition {
            name: "file_read".into(),
            description: "Read a UTF-8 text file, optionally restricted to a line range.".into(),
            category: "filesystem".into(),
            parameters: vec![
                ParameterSpec {
                    name: "path".into(),
                    param_type: ParamType::String,
                    description: "Path to read.".into(),
                    required: true,
                    default: None,
                },
                ParameterSpec {
                    name: "start_line".into(),
                    param_type: ParamType::Number,
                    description: "First line to include, 1-indexed.".into(),
                    required: false,
                    default: None,
                },
                ParameterSpec {
                    name: "end_line".into(),
                    param_type: ParamType::Number,
                    description: "Last line to include, inclusive.".into(),
                    required: false,
                    default: None,
                },
            ],
        };
        Self { validator, def }
    }
}

#[async_trait]
impl Tool for FileReadTool {
    fn definition(&self) -> &ToolDefinition {
        &self.def
    }

    async fn execute(&self, args: Value) -> anyhow::Result<ToolResult> {
        let path = args.get("path").and_then(|v| v.as_str()).unwrap_or_default();
        let outcome = match self.validator.validate(path, false) {
            Ok(outcome) => outcome,
            Err(err) => return Ok(ToolResult::failure("file_read", err.to_string(), err.error_type())),
        };

        let contents = match std::fs::read_to_string(&outcome.resolved_path) {
            Ok(contents) => contents,
            Err(err) => {
                let error_type = match err.kind() {
                    std::io::ErrorKind::NotFound => ErrorType::FileNotFound,
                    std::io::ErrorKind::PermissionDenied => ErrorType::Permission,
                    _ => ErrorType::Internal,
                };
                return Ok(ToolResult::failure("file_read", err.to_string(), error_type));
            }
        };

        let start_line = args.get("start_line").and_then(|v| v.as_u64()).map(|n| n.max(1) as usize);
        let end_line = args.get("end_line").and_then(|v| v.as_u64()).map(|n| n as usize);

        let output = match (start_line, end_line) {
            (None, None) => contents,
            (start, end) => {
                let start = start.unwrap_or(1);
                let lines: Vec<&str> = contents.lines().collect();
                let end = end.unwrap_or(lines.len()).min(lines.len());
                if start > end {
                    String::new()
                } else {
                    lines[start - 1..end].join("\n")
                }
            }
        };

        Ok(ToolResult::success("file_read", output))
    }
}
