//! `grep` built-in: regex search across a single file or a directory,
//! bounded match count. Grounded in `execpolicy::validate_rg`'s argument
//! shape (pattern + path + bounded output) without shelling out to an
//! external `rg` binary — implemented directly so the tool has no external
//! dependency beyond the `regex` crate already in the workspace stack.

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use std::sync::Arc;
use walkdir::WalkDir;

use crate::registry::Tool;
use crate::sanitizer::PathValidator;
use crate::types::{ParamType, ParameterSpec, ToolDefinition, ToolResult};
use toolrunner_commons::ErrorType;

const MAX_MATCHES: usize = 500;
const IGNORED_DIRS: &[&str] = &[".git", "target", "node_modules"];

pub struct GrepTool {
    validator: Arc<PathValidator>,
    def: ToolDefinition,
}

impl GrepTool {
    pub fn new(validator: Arc<PathValidator>) -> Self {
        let def = ToolDefinition {
            name: "grep".into(),
            description: "Search for a regular expression across a file or directory.".into(),
            category: "search".into(),
            parameters: vec![
                ParameterSpec {
                    name: "pattern".into(),
                    param_type: ParamType::String,
                    description: "Regular expression to search for.".into(),
                    required: true,
                    default: None,
                },
                ParameterSpec {
                    name: "path".into(),
                    param_type: ParamType::String,
                    description: "File or directory to search.".into(),
                    required: true,
                    default: None,
                },
            ],
        };
        Self { validator, def }
    }
}

#[async_trait]
impl Tool for GrepTool {
    fn definition(&self) -> &ToolDefinition {
        &self.def
    }

    async fn execute(&self, args: Value) -> anyhow::Result<ToolResult> {
        let pattern = args.get("pattern").and_then(|v| v.as_str()).unwrap_or_default();
        let path = args.get("path").and_then(|v| v.as_str()).unwrap_or_default();

        let regex = match Regex::new(pattern) {
            Ok(re) => re,
            Err(err) => return Ok(ToolResult::failure("grep", format!("invalid pattern: {err}"), ErrorType::Validation)),
        };

        let outcome = match self.validator.validate(path, false) {
            Ok(outcome) => outcome,
            Err(err) => return Ok(ToolResult::failure("grep", err.to_string(), err.error_type())),
        };

        let mut matches = Vec::new();
        let mut truncated = false;

        let walker = WalkDir::new(&outcome.resolved_path).into_iter().filter_entry(|e| {
            e.file_name()
                .to_str()
                .map(|name| !IGNORED_DIRS.contains(&name))
                .unwrap_or(true)
        });

        for entry in walker {
            if matches.len() >= MAX_MATCHES {
                truncated = true;
                break;
            }
            let Ok(entry) = entry else { continue };
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(contents) = std::fs::read_to_string(entry.path()) else { continue };
            for (lineno, line) in contents.lines().enumerate() {
                if matches.len() >= MAX_MATCHES {
                    truncated = true;
                    break;
                }
                if regex.is_match(line) {
                    matches.push(format!("{}:{}:{}", entry.path().display(), lineno + 1, line));
                }
            }
        }

        let mut result = ToolResult::success("grep", matches.join("\n"))
            .with_metadata("match_count", Value::from(matches.len()));
        if truncated {
            result = result.with_metadata("truncated", Value::Bool(true));
        }
        Ok(result)
    }
}
