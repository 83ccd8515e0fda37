//! `file_list` built-in: non-recursive directory listing with a bounded
//! result size. Grounded in `tools::file_ops::FileOpsTool::execute_basic_list`,
//! simplified to the single non-recursive mode.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::registry::Tool;
use crate::sanitizer::PathValidator;
use crate::types::{ParamType, ParameterSpec, ToolDefinition, ToolResult};
use toolrunner_commons::ErrorType;

const MAX_ENTRIES: usize = 2000;

pub struct FileListTool {
    validator: Arc<PathValidator>,
    def: ToolDefinition,
}

impl FileListTool {
    pub fn new(validator: Arc<PathValidator>) -> Self {
        let def = ToolDefinition {
            name: "file_list".into(),
            description: "List directory entries non-recursively.".into(),
            category: "filesystem".into(),
            parameters: vec![ParameterSpec {
                name: "path".into(),
                param_type: ParamType::String,
                description: "Directory to list.".into(),
                required: true,
                default: None,
            }],
        };
        Self { validator, def }
    }
}

#[async_trait]
impl Tool for FileListTool {
    fn definition(&self) -> &ToolDefinition {
        &self.def
    }

    async fn execute(&self, args: Value) -> anyhow::Result<ToolResult> {
        let path = args.get("path").and_then(|v| v.as_str()).unwrap_or_default();
        let outcome = match self.validator.validate(path, false) {
            Ok(outcome) => outcome,
            Err(err) => return Ok(ToolResult::failure("file_list", err.to_string(), err.error_type())),
        };

        let read_dir = match std::fs::read_dir(&outcome.resolved_path) {
            Ok(rd) => rd,
            Err(err) => {
                let error_type = match err.kind() {
                    std::io::ErrorKind::NotFound => ErrorType::FileNotFound,
                    std::io::ErrorKind::PermissionDenied => ErrorType::Permission,
                    _ => ErrorType::Internal,
                };
                return Ok(ToolResult::failure("file_list", err.to_string(), error_type));
            }
        };

        let mut entries = Vec::new();
        let mut truncated = false;
        for entry in read_dir {
            if entries.len() >= MAX_ENTRIES {
                truncated = true;
                break;
            }
            match entry {
                Ok(entry) => entries.push(entry.file_name().to_string_lossy().into_owned()),
                Err(_) => continue,
            }
        }
        entries.sort();

        let mut result = ToolResult::success("file_list", entries.join("\n"))
            .with_metadata("entry_count", Value::from(entries.len()));
        if truncated {
            result = result.with_metadata("truncated", Value::Bool(true));
        }
        Ok(result)
    }
}
