//! Context Assembly: a lightweight relevance ranking over files under a
//! root directory, used when the Query Classifier's [`ContextStrategy`]
//! calls for more than a flat listing.
//!
//! Grounded in `simple_indexer`'s bounded, ignore-aware directory walk and
//! `context::proactive_gatherer`/`workspace_state`'s recency- and
//! relevance-weighted file selection. Deliberately simple: spec.md treats
//! full relevance ranking as an external collaborator (§1), so this is the
//! seam a real retrieval engine would plug into, not one itself.

use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

use crate::classifier::{QueryCategory, QueryClassification};

const IGNORED_DIRS: &[&str] = &[".git", "target", "node_modules", "dist", "build"];
const RECENCY_HALF_LIFE_SECS: f32 = 7.0 * 24.0 * 3600.0;
/// Extensions associated with each query category, used to bias ranking
/// toward files the classifier's suggested tools would actually act on.
const SHELL_EXTENSIONS: &[&str] = &["sh", "bash", "zsh"];
const SOURCE_EXTENSIONS: &[&str] = &["rs", "py", "js", "ts", "tsx", "jsx", "go", "java", "c", "cpp", "h", "hpp"];
const GIT_FILENAMES: &[&str] = &[".gitignore", ".gitmodules", ".gitattributes"];

#[derive(Debug, Clone)]
pub struct RankedFile {
    pub path: PathBuf,
    pub score: f32,
    pub reason: &'static str,
}

fn tokens(s: &str) -> Vec<String> {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2)
        .map(|t| t.to_lowercase())
        .collect()
}

fn token_overlap_score(path: &Path, query_tokens: &[String]) -> f32 {
    if query_tokens.is_empty() {
        return 0.0;
    }
    let path_tokens = tokens(&path.to_string_lossy());
    let hits = query_tokens.iter().filter(|qt| path_tokens.iter().any(|pt| pt.contains(qt.as_str()))).count();
    hits as f32 / query_tokens.len() as f32
}

fn recency_score(path: &Path, now: SystemTime) -> f32 {
    let Ok(metadata) = std::fs::metadata(path) else { return 0.0 };
    let Ok(modified) = metadata.modified() else { return 0.0 };
    let age_secs = now.duration_since(modified).map(|d| d.as_secs_f32()).unwrap_or(0.0);
    0.5f32.powf(age_secs / RECENCY_HALF_LIFE_SECS)
}

/// Scores `path` against the classified query's category: 1.0 if the file's
/// extension/name is the kind of thing that category's suggested tools
/// would act on, 0.0 otherwise. `GitOp` and `FileOp` carry no extension bias
/// of their own since git and file tools act on any path equally; `GitOp`
/// still rewards the handful of filenames git itself treats specially.
fn category_bias_score(path: &Path, category: QueryCategory) -> f32 {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    match category {
        QueryCategory::Shell => SHELL_EXTENSIONS.contains(&ext) as u8 as f32,
        QueryCategory::Analysis | QueryCategory::Search => SOURCE_EXTENSIONS.contains(&ext) as u8 as f32,
        QueryCategory::GitOp => GIT_FILENAMES.contains(&name) as u8 as f32,
        QueryCategory::FileOp | QueryCategory::Unknown => 0.0,
    }
}

/// Ranks files under `root` by a blend of filename/path token overlap with
/// `query_text`, the classified query's category bias (e.g. a `Shell`
/// classification favors `.sh` files, an `Analysis`/`Search` classification
/// favors source files), and recency of modification as of `now`, penalizing
/// conventionally-ignored directories, and returns the top `limit`.
pub fn rank_files(root: &Path, query: &QueryClassification, limit: usize, query_text: &str, now: SystemTime) -> Vec<RankedFile> {
    let query_tokens = tokens(query_text);

    let mut ranked: Vec<RankedFile> = WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| e.file_name().to_str().map(|n| !IGNORED_DIRS.contains(&n)).unwrap_or(true))
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|entry| {
            let path = entry.path().to_path_buf();
            let overlap = token_overlap_score(&path, &query_tokens);
            let recency = recency_score(&path, now);
            let bias = category_bias_score(&path, query.category);
            let score = 0.55 * overlap + 0.25 * recency + 0.2 * bias;
            let reason = if overlap > 0.0 && bias > 0.0 {
                "name match, matches query category"
            } else if bias > 0.0 {
                "matches query category"
            } else if overlap > 0.0 && recency > 0.5 {
                "name match, recently modified"
            } else if overlap > 0.0 {
                "name match"
            } else {
                "recently modified"
            };
            RankedFile { path, score, reason }
        })
        .collect();

    ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    ranked.truncate(limit);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{ContextStrategy, QueryCategory};

    fn dummy_classification() -> QueryClassification {
        QueryClassification {
            category: QueryCategory::FileOp,
            suggested_tools: Vec::new(),
            context_strategy: ContextStrategy::FileList,
        }
    }

    fn classification_for(category: QueryCategory) -> QueryClassification {
        QueryClassification { category, suggested_tools: Vec::new(), context_strategy: ContextStrategy::FileList }
    }

    #[test]
    fn ranks_name_matching_file_above_unrelated_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("orchestrator.rs"), "fn main() {}").unwrap();
        std::fs::write(dir.path().join("unrelated.txt"), "nothing here").unwrap();

        let ranked = rank_files(dir.path(), &dummy_classification(), 10, "orchestrator scheduling", SystemTime::now());
        assert!(!ranked.is_empty());
        assert_eq!(ranked[0].path.file_name().unwrap(), "orchestrator.rs");
    }

    #[test]
    fn ignored_directories_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let git_dir = dir.path().join(".git");
        std::fs::create_dir(&git_dir).unwrap();
        std::fs::write(git_dir.join("config"), "x").unwrap();
        std::fs::write(dir.path().join("real.rs"), "x").unwrap();

        let ranked = rank_files(dir.path(), &dummy_classification(), 10, "real", SystemTime::now());
        assert!(ranked.iter().all(|r| !r.path.to_string_lossy().contains(".git")));
    }

    #[test]
    fn category_classification_changes_ranking_for_identical_query_text() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("deploy.sh"), "#!/bin/sh").unwrap();
        std::fs::write(dir.path().join(".gitignore"), "target/").unwrap();

        let shell_ranked = rank_files(dir.path(), &classification_for(QueryCategory::Shell), 10, "thing", SystemTime::now());
        assert_eq!(shell_ranked[0].path.file_name().unwrap(), "deploy.sh");

        let git_ranked = rank_files(dir.path(), &classification_for(QueryCategory::GitOp), 10, "thing", SystemTime::now());
        assert_eq!(git_ranked[0].path.file_name().unwrap(), ".gitignore");
    }

    #[test]
    fn respects_limit() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..10 {
            std::fs::write(dir.path().join(format!("f{i}.rs")), "x").unwrap();
        }
        let ranked = rank_files(dir.path(), &dummy_classification(), 3, "f", SystemTime::now());
        assert_eq!(ranked.len(), 3);
    }
}
