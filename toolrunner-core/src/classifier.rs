//! Query Classifier: maps a free-form prompt to a coarse category, a
//! ranked list of suggested tool names, and a context-assembly strategy.
//!
//! spec.md names this component in its system-overview table but gives it
//! no operations of its own. Grounded in `context::entity_resolver`'s
//! "vague term -> workspace entity" approach: a small, explicit rule set of
//! keyword/regex matchers rather than an embedding model, consistent with
//! that module's own preference for pattern matching over ML.

use regex::Regex;
use std::sync::OnceLock;

use crate::registry::ToolRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryCategory {
    FileOp,
    Search,
    GitOp,
    Analysis,
    Shell,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextStrategy {
    /// No extra context assembly needed; the prompt is self-contained.
    None,
    /// A flat directory listing is enough context.
    FileList,
    /// Run full relevance ranking over the workspace (see `context::rank_files`).
    FullRelevanceRank,
}

#[derive(Debug, Clone)]
pub struct QueryClassification {
    pub category: QueryCategory,
    pub suggested_tools: Vec<String>,
    pub context_strategy: ContextStrategy,
}

struct Rule {
    pattern: fn() -> &'static Regex,
    category: QueryCategory,
    tools: &'static [&'static str],
    strategy: ContextStrategy,
}

macro_rules! regex_fn {
    ($name:ident, $pattern:expr) => {
        fn $name() -> &'static Regex {
            static RE: OnceLock<Regex> = OnceLock::new();
            RE.get_or_init(|| Regex::new($pattern).unwrap())
        }
    };
}

regex_fn!(git_re, r"(?i)\b(git|commit|branch|diff|status|stash|merge)\b");
regex_fn!(search_re, r"(?i)\b(find|search|grep|look for|where is)\b");
regex_fn!(shell_re, r"(?i)\b(run|execute|install|build|test|command)\b");
regex_fn!(fileop_re, r"(?i)\b(read|write|open|edit|create|delete|file|directory|folder)\b");
regex_fn!(analysis_re, r"(?i)\b(analyze|explain|review|summarize|understand)\b");

fn rules() -> &'static [Rule] {
    static RULES: OnceLock<Vec<Rule>> = OnceLock::new();
    RULES.get_or_init(|| {
        vec![
            Rule { pattern: git_re, category: QueryCategory::GitOp, tools: &["git_status"], strategy: ContextStrategy::None },
            Rule {
                pattern: search_re,
                category: QueryCategory::Search,
                tools: &["grep", "file_list"],
                strategy: ContextStrategy::FullRelevanceRank,
            },
            Rule {
                pattern: shell_re,
                category: QueryCategory::Shell,
                tools: &["bash"],
                strategy: ContextStrategy::None,
            },
            Rule {
                pattern: fileop_re,
                category: QueryCategory::FileOp,
                tools: &["file_read", "file_write", "file_list"],
                strategy: ContextStrategy::FileList,
            },
            Rule {
                pattern: analysis_re,
                category: QueryCategory::Analysis,
                tools: &["file_read", "grep"],
                strategy: ContextStrategy::FullRelevanceRank,
            },
        ]
    })
}

/// Classifies `prompt` against the rule set, keeping only suggested tools
/// that are actually registered so the caller never receives a
/// recommendation it cannot act on.
pub fn classify(prompt: &str, registry: &ToolRegistry) -> QueryClassification {
    for rule in rules() {
        if (rule.pattern)().is_match(prompt) {
            let suggested_tools = rule
                .tools
                .iter()
                .filter(|name| registry.lookup(name).is_some())
                .map(|name| name.to_string())
                .collect();
            return QueryClassification { category: rule.category, suggested_tools, context_strategy: rule.strategy };
        }
    }

    QueryClassification {
        category: QueryCategory::Unknown,
        suggested_tools: Vec::new(),
        context_strategy: ContextStrategy::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::register_builtins;
    use crate::sanitizer::PathValidator;
    use std::sync::Arc;
    use toolrunner_exec::ProcessManager;

    fn registry_with_builtins() -> ToolRegistry {
        let registry = ToolRegistry::new();
        let validator = Arc::new(PathValidator::new(vec![std::env::temp_dir()]));
        register_builtins(&registry, validator, Arc::new(ProcessManager::new()), true);
        registry
    }

    #[test]
    fn classifies_git_prompt() {
        let registry = registry_with_builtins();
        let classification = classify("what does git status show right now?", &registry);
        assert_eq!(classification.category, QueryCategory::GitOp);
        assert!(classification.suggested_tools.contains(&"git_status".to_string()));
    }

    #[test]
    fn classifies_file_prompt_with_file_list_strategy() {
        let registry = registry_with_builtins();
        let classification = classify("please read the config file", &registry);
        assert_eq!(classification.category, QueryCategory::FileOp);
        assert_eq!(classification.context_strategy, ContextStrategy::FileList);
    }

    #[test]
    fn unrecognized_prompt_falls_back_to_unknown() {
        let registry = registry_with_builtins();
        let classification = classify("xyzzy plugh", &registry);
        assert_eq!(classification.category, QueryCategory::Unknown);
        assert!(classification.suggested_tools.is_empty());
    }
}
