//! Runtime configuration: concurrency limits, allowed paths, recovery
//! thresholds. Loaded from an optional TOML file and overridable by
//! environment variables, mirroring the layered config pattern used
//! throughout the reference agent (typed struct with `Default`, a
//! `from_file` loader, and an env-merge pass applied on top).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Maximum number of tool invocations that may run concurrently.
    pub max_concurrency: usize,
    /// Absolute directories invocations are allowed to touch.
    pub allowed_bases: Vec<PathBuf>,
    /// Extra command substrings that are always denied regardless of the
    /// built-in pattern catalogue.
    pub forbidden_patterns: Vec<String>,
    /// When true, any tool not explicitly registered as read-only requires
    /// an explicit `confirm: true` argument for risky commands.
    pub strict_mode: bool,
    pub recovery: RecoveryConfig,
    pub pipeline: PipelineConfig,
    pub logging: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    pub min_confidence: f32,
    pub max_risk: f32,
    pub max_attempts: u32,
    pub min_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_factor: f64,
    pub failure_signature_threshold: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub cache_capacity: usize,
    pub read_concurrency: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Falls back to `RUST_LOG` when unset.
    pub filter: Option<String>,
    /// When set, logs are appended to this file instead of stderr.
    pub file: Option<PathBuf>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_concurrency: num_cpus_fallback(),
            allowed_bases: Vec::new(),
            forbidden_patterns: Vec::new(),
            strict_mode: true,
            recovery: RecoveryConfig::default(),
            pipeline: PipelineConfig::default(),
            logging: LogConfig::default(),
        }
    }
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
            max_risk: 0.5,
            max_attempts: 3,
            min_backoff_ms: 100,
            max_backoff_ms: 10_000,
            backoff_factor: 2.0,
            failure_signature_threshold: 5,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 256,
            read_concurrency: 8,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { filter: None, file: None }
    }
}

fn num_cpus_fallback() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}

impl RuntimeConfig {
    /// Load from a TOML file; missing fields fall back to defaults.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let cfg: RuntimeConfig = toml::from_str(&text)?;
        Ok(cfg)
    }

    /// Overlay a small set of environment variables onto an already-loaded
    /// config. Mirrors the reference agent's "file first, env wins" layering.
    pub fn merge_env(mut self) -> Self {
        if let Ok(v) = std::env::var("TOOLRUNNER_MAX_CONCURRENCY") {
            if let Ok(n) = v.parse() {
                self.max_concurrency = n;
            }
        }
        if let Ok(v) = std::env::var("TOOLRUNNER_STRICT_MODE") {
            self.strict_mode = matches!(v.as_str(), "1" | "true" | "yes");
        }
        if let Ok(v) = std::env::var("RUST_LOG") {
            if self.logging.filter.is_none() {
                self.logging.filter = Some(v);
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = RuntimeConfig::default();
        assert!(cfg.max_concurrency >= 1);
        assert!(cfg.strict_mode);
        assert_eq!(cfg.recovery.max_attempts, 3);
    }

    #[test]
    fn from_file_round_trips_partial_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("toolrunner.toml");
        std::fs::write(&path, "max_concurrency = 2\nstrict_mode = false\n").unwrap();

        let cfg = RuntimeConfig::from_file(&path).unwrap();
        assert_eq!(cfg.max_concurrency, 2);
        assert!(!cfg.strict_mode);
        // Untouched sections keep their defaults.
        assert_eq!(cfg.recovery.max_attempts, 3);
    }

    #[test]
    fn env_override_wins_over_file_value() {
        std::env::set_var("TOOLRUNNER_MAX_CONCURRENCY", "7");
        let cfg = RuntimeConfig::default().merge_env();
        assert_eq!(cfg.max_concurrency, 7);
        std::env::remove_var("TOOLRUNNER_MAX_CONCURRENCY");
    }
}
