//! Cross-recovery failure-signature tracking with exponential backoff.
//!
//! Grounded in the reference agent's `tools::circuit_breaker`: a recurring
//! `(tool_name, error_type)` failure is structurally the same problem that
//! module already solves for "is this target still unhealthy" — reused
//! here to decide when a failure signature has been seen often enough that
//! only `ABANDON`/`USER_ESCALATION` strategies should be considered.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use toolrunner_commons::ErrorType;

#[derive(Debug, Clone)]
struct SignatureState {
    failure_count: u32,
    last_failure: Instant,
    current_backoff: Duration,
}

pub struct FailureSignatureConfig {
    pub threshold: u32,
    pub min_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_factor: f64,
}

impl Default for FailureSignatureConfig {
    fn default() -> Self {
        Self {
            threshold: 5,
            min_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            backoff_factor: 2.0,
        }
    }
}

/// Tracks failures per `(tool_name, error_type)` signature, isolated per
/// signature so one consistently-broken tool never suppresses recovery for
/// an unrelated one.
pub struct FailureSignatureTracker {
    config: FailureSignatureConfig,
    states: RwLock<HashMap<(String, ErrorType), SignatureState>>,
}

impl FailureSignatureTracker {
    pub fn new(config: FailureSignatureConfig) -> Self {
        Self { config, states: RwLock::new(HashMap::new()) }
    }

    fn key(tool_name: &str, error_type: ErrorType) -> (String, ErrorType) {
        (tool_name.to_string(), error_type)
    }

    pub fn record_failure(&self, tool_name: &str, error_type: ErrorType) {
        let key = Self::key(tool_name, error_type);
        let mut states = self.states.write();
        let entry = states.entry(key).or_insert_with(|| SignatureState {
            failure_count: 0,
            last_failure: Instant::now(),
            current_backoff: self.config.min_backoff,
        });
        entry.failure_count += 1;
        entry.last_failure = Instant::now();
        let scaled = entry.current_backoff.mul_f64(self.config.backoff_factor);
        entry.current_backoff = scaled.min(self.config.max_backoff);
    }

    pub fn record_success(&self, tool_name: &str, error_type: ErrorType) {
        self.states.write().remove(&Self::key(tool_name, error_type));
    }

    /// True once a signature has failed at least `threshold` times; callers
    /// should then only consider ABANDON/USER_ESCALATION strategies.
    pub fn exceeds_threshold(&self, tool_name: &str, error_type: ErrorType) -> bool {
        self.states
            .read()
            .get(&Self::key(tool_name, error_type))
            .map(|s| s.failure_count >= self.config.threshold)
            .unwrap_or(false)
    }

    pub fn current_backoff(&self, tool_name: &str, error_type: ErrorType) -> Duration {
        self.states
            .read()
            .get(&Self::key(tool_name, error_type))
            .map(|s| s.current_backoff)
            .unwrap_or(self.config.min_backoff)
    }
}
