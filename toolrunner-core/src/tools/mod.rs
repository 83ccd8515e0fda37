//! Built-in tool catalogue.
//!
//! spec.md describes the registry's contract but names no concrete tool.
//! Grounded in `tools::file_ops::FileOpsTool` (read/write/list surface) and
//! `tools::command::CommandTool` (sanitizer + process-manager wiring) for
//! shape, each built-in here is a thin [`crate::registry::Tool`] impl
//! registered at startup rather than the teacher's large multi-mode
//! `FileOpsTool` — one tool, one job, matching the registry's one-name-one-
//! `Tool` contract.

mod bash;
mod file_list;
mod file_read;
mod file_write;
mod git_status;
mod grep;

pub use bash::BashTool;
pub use file_list::FileListTool;
pub use file_read::FileReadTool;
pub use file_write::FileWriteTool;
pub use git_status::GitStatusTool;
pub use grep::GrepTool;

use crate::registry::ToolRegistry;
use crate::sanitizer::PathValidator;
use std::sync::Arc;
use toolrunner_exec::ProcessManager;

/// Registers every built-in tool against `registry`, rooted at `allowed_bases`.
pub fn register_builtins(
    registry: &ToolRegistry,
    validator: Arc<PathValidator>,
    process_manager: Arc<ProcessManager>,
    strict_mode: bool,
) {
    registry.register(Arc::new(FileReadTool::new(validator.clone())));
    registry.register(Arc::new(FileWriteTool::new(validator.clone())));
    registry.register(Arc::new(FileListTool::new(validator.clone())));
    registry.register(Arc::new(GrepTool::new(validator.clone())));
    registry.register(Arc::new(BashTool::new(validator, process_manager, strict_mode)));
    registry.register(Arc::new(GitStatusTool));
}
