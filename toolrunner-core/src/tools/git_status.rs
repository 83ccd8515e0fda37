//! `git_status` built-in: runs `git status --porcelain` in the current
//! working directory. Always policy-allowed — it takes no caller-supplied
//! arguments, so there is nothing for the sanitizer or path validator to
//! check. Demonstrates a zero-argument read-only tool.

use async_trait::async_trait;
use serde_json::Value;
use std::process::Command;

use crate::registry::Tool;
use crate::types::ToolDefinition;
use crate::types::ToolResult;
use toolrunner_commons::ErrorType;

pub struct GitStatusTool;

impl GitStatusTool {
    fn definition_static() -> ToolDefinition {
        ToolDefinition {
            name: "git_status".into(),
            description: "Report `git status --porcelain` for the current working directory.".into(),
            category: "vcs".into(),
            parameters: Vec::new(),
        }
    }
}

#[async_trait]
impl Tool for GitStatusTool {
    fn definition(&self) -> &ToolDefinition {
        static DEF: std::sync::OnceLock<ToolDefinition> = std::sync::OnceLock::new();
        DEF.get_or_init(GitStatusTool::definition_static)
    }

    async fn execute(&self, _args: Value) -> anyhow::Result<ToolResult> {
        let output = tokio::task::spawn_blocking(|| Command::new("git").args(["status", "--porcelain"]).output()).await??;

        if output.status.success() {
            Ok(ToolResult::success("git_status", String::from_utf8_lossy(&output.stdout).into_owned()))
        } else {
            Ok(ToolResult::failure(
                "git_status",
                String::from_utf8_lossy(&output.stderr).into_owned(),
                ErrorType::Internal,
            ))
        }
    }
}
