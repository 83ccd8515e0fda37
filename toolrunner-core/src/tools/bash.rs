//! `bash` built-in: execute a shell command through the Command Sanitizer
//! and Process Manager. Grounded in `tools::command::CommandTool`: inherit
//! the parent environment, override a handful of pager-related variables
//! for deterministic output, and run with a timeout that escalates through
//! the Process Manager rather than leaving an orphaned child behind.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::registry::Tool;
use crate::sanitizer::{CommandSanitizer, PathValidator};
use crate::types::{ParamType, ParameterSpec, ToolDefinition, ToolResult};
use toolrunner_commons::ErrorType;
use toolrunner_exec::{ProcessHandle, ProcessManager};

const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub struct BashTool {
    validator: Arc<PathValidator>,
    sanitizer: CommandSanitizer,
    process_manager: Arc<ProcessManager>,
    strict_mode: bool,
    def: ToolDefinition,
}

impl BashTool {
    pub fn new(validator: Arc<PathValidator>, process_manager: Arc<ProcessManager>, strict_mode: bool) -> Self {
        let def = ToolDefinition {
            name: "bash".into(),
            description: "Run a shell command, subject to the command sanitizer's pattern catalogue.".into(),
            category: "shell".into(),
            parameters: vec![
                ParameterSpec {
                    name: "command".into(),
                    param_type: ParamType::String,
                    description: "Shell command to execute.".into(),
                    required: true,
                    default: None,
                },
                ParameterSpec {
                    name: "cwd".into(),
                    param_type: ParamType::String,
                    description: "Working directory, must lie within an allowed base.".into(),
                    required: false,
                    default: None,
                },
                ParameterSpec {
                    name: "timeout_secs".into(),
                    param_type: ParamType::Number,
                    description: "Seconds to allow before escalating termination.".into(),
                    required: false,
                    default: Some(Value::from(DEFAULT_TIMEOUT_SECS)),
                },
            ],
        };
        Self { validator, sanitizer: CommandSanitizer::new(Vec::new()), process_manager, strict_mode, def }
    }
}

#[async_trait]
impl Tool for BashTool {
    fn definition(&self) -> &ToolDefinition {
        &self.def
    }

    async fn execute(&self, args: Value) -> anyhow::Result<ToolResult> {
        let command = args.get("command").and_then(|v| v.as_str()).unwrap_or_default();
        let timeout_secs = args
            .get("timeout_secs")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let cwd = match args.get("cwd").and_then(|v| v.as_str()) {
            Some(raw) => match self.validator.validate(raw, false) {
                Ok(outcome) => outcome.resolved_path,
                Err(err) => return Ok(ToolResult::failure("bash", err.to_string(), err.error_type())),
            },
            None => std::env::current_dir()?,
        };

        let sanitized = match self.sanitizer.sanitize(command, self.strict_mode, HashMap::new()) {
            Ok(sanitized) => sanitized,
            Err(err) => return Ok(ToolResult::failure("bash", err.to_string(), err.error_type())),
        };

        let id = self.process_manager.next_id();
        let handle = match ProcessHandle::spawn(id, "sh", &["-c".to_string(), sanitized.command], &cwd, sanitized.env) {
            Ok(handle) => Arc::new(handle),
            Err(err) => return Ok(ToolResult::failure("bash", err.to_string(), ErrorType::Internal)),
        };
        self.process_manager.register(handle.clone());

        let outcome = tokio::time::timeout(Duration::from_secs(timeout_secs), handle.wait()).await;

        let result = match outcome {
            Ok(Ok(status)) => {
                let stdout = handle.stdout_snapshot().await;
                let stderr = handle.stderr_snapshot().await;
                self.process_manager.unregister(id);
                if status.success() {
                    ToolResult::success("bash", stdout).with_metadata("stderr", Value::String(stderr))
                } else {
                    ToolResult::failure(
                        "bash",
                        if stderr.is_empty() { format!("exited with status {status}") } else { stderr },
                        ErrorType::Internal,
                    )
                    .with_metadata("stdout", Value::String(stdout))
                    .with_metadata("exit_code", Value::from(status.code().unwrap_or(-1)))
                }
            }
            Ok(Err(err)) => {
                self.process_manager.unregister(id);
                ToolResult::failure("bash", err.to_string(), ErrorType::Internal)
            }
            Err(_) => {
                let _ = self.process_manager.terminate(id).await;
                ToolResult::failure("bash", format!("command timed out after {timeout_secs}s"), ErrorType::Timeout)
            }
        };

        Ok(result)
    }
}
