//! Error-Recovery Module: turns a failed [`ToolResult`] into a bounded
//! series of resubmission attempts through the [`Orchestrator`].
//!
//! Grounded in the reference agent's `tools::fallback_chains` (ranked
//! chain-of-alternatives execution, confidence thresholds, an explicit
//! stop-reason enum) for the attempt loop, and `tools::circuit_breaker`
//! (reused via [`circuit::FailureSignatureTracker`]) for cross-recovery
//! loop prevention.

pub mod circuit;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::orchestrator::Orchestrator;
use crate::types::{FailureContext, Priority, RecoveryStrategy, RiskLevel, StrategyKind, ToolResult};
use circuit::{FailureSignatureConfig, FailureSignatureTracker};
use toolrunner_commons::ErrorType;

#[async_trait]
pub trait DebuggerPersona: Send + Sync {
    async fn suggest(&self, ctx: &FailureContext) -> anyhow::Result<Vec<RecoveryStrategy>>;
}

/// Always available; used both as the documented fallback when the
/// LLM-backed persona itself fails, and as the default in tests.
pub struct StaticHeuristicDebugger;

#[async_trait]
impl DebuggerPersona for StaticHeuristicDebugger {
    async fn suggest(&self, ctx: &FailureContext) -> anyhow::Result<Vec<RecoveryStrategy>> {
        let error_type = ctx.result.error_type().unwrap_or(ErrorType::Internal);
        let strategies = match error_type {
            ErrorType::FileNotFound => vec![RecoveryStrategy::new(
                StrategyKind::ParameterAdjustment,
                "retry with a corrected or parent directory path",
                0.6,
                RiskLevel::Low,
            )],
            ErrorType::Permission => vec![RecoveryStrategy::new(
                StrategyKind::AlternativeCommand,
                "retry against a location that does not require elevated permission",
                0.5,
                RiskLevel::Medium,
            )],
            ErrorType::Timeout => vec![RecoveryStrategy::new(
                StrategyKind::ParameterAdjustment,
                "retry with a larger timeout",
                0.7,
                RiskLevel::Low,
            )],
            ErrorType::Network => vec![RecoveryStrategy::new(
                StrategyKind::AlternativeCommand,
                "retry after exponential backoff",
                0.6,
                RiskLevel::Low,
            )],
            ErrorType::Resource => vec![RecoveryStrategy::new(
                StrategyKind::FallbackTool,
                "switch to a streaming or chunked variant",
                0.5,
                RiskLevel::Medium,
            )],
            ErrorType::Validation | ErrorType::Security | ErrorType::Internal => {
                vec![RecoveryStrategy::new(StrategyKind::Abandon, "not recoverable", 1.0, RiskLevel::Low)]
            }
        };
        Ok(strategies)
    }
}

/// Exercises the "all strategies exhausted" path in tests: never suggests
/// anything, simulating a Debugger persona that returned no ideas.
pub struct NullDebugger;

#[async_trait]
impl DebuggerPersona for NullDebugger {
    async fn suggest(&self, _ctx: &FailureContext) -> anyhow::Result<Vec<RecoveryStrategy>> {
        Ok(Vec::new())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryState {
    Idle,
    Analyzing,
    Trying,
    Succeeded,
    Exhausted,
}

pub struct RecoveryConfig {
    pub min_confidence: f32,
    pub max_risk: RiskLevel,
    pub max_attempts: u32,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self { min_confidence: 0.5, max_risk: RiskLevel::Medium, max_attempts: 3 }
    }
}

fn risk_rank(risk: RiskLevel) -> u8 {
    match risk {
        RiskLevel::Low => 0,
        RiskLevel::Medium => 1,
        RiskLevel::High => 2,
    }
}

pub struct RecoveryOutcome {
    pub state: RecoveryState,
    pub result: ToolResult,
    pub attempts_made: u32,
    pub strategies_tried: Vec<String>,
}

pub struct RecoveryModule {
    orchestrator: Orchestrator,
    debugger: Arc<dyn DebuggerPersona>,
    config: RecoveryConfig,
    failure_signatures: FailureSignatureTracker,
}

impl RecoveryModule {
    pub fn new(orchestrator: Orchestrator, debugger: Arc<dyn DebuggerPersona>, config: RecoveryConfig) -> Self {
        Self {
            orchestrator,
            debugger,
            config,
            failure_signatures: FailureSignatureTracker::new(FailureSignatureConfig::default()),
        }
    }

    /// Not triggered for VALIDATION or SECURITY errors — callers should
    /// check this before invoking `recover`, but `recover` also enforces it
    /// so a misuse never silently attempts a forbidden recovery.
    pub fn is_recovery_eligible(result: &ToolResult) -> bool {
        result.error_type().map(ErrorType::is_recoverable).unwrap_or(false)
    }

    pub async fn recover(&self, ctx: FailureContext) -> RecoveryOutcome {
        if !Self::is_recovery_eligible(&ctx.result) {
            return RecoveryOutcome {
                state: RecoveryState::Exhausted,
                result: ctx.result,
                attempts_made: 0,
                strategies_tried: Vec::new(),
            };
        }

        let error_type = ctx.result.error_type().unwrap_or(ErrorType::Internal);
        let tool_name = ctx.invocation.tool_name.clone();

        let mut state = RecoveryState::Analyzing;
        let strategies = match self.debugger.suggest(&ctx).await {
            Ok(strategies) => strategies,
            Err(err) => {
                debug!(%err, "debugger persona failed; falling back to static heuristics");
                StaticHeuristicDebugger.suggest(&ctx).await.unwrap_or_default()
            }
        };

        let only_terminal_strategies = self.failure_signatures.exceeds_threshold(&tool_name, error_type);

        let mut filtered: Vec<RecoveryStrategy> = strategies
            .into_iter()
            .filter(|s| s.confidence() >= self.config.min_confidence)
            .filter(|s| risk_rank(s.risk) <= risk_rank(self.config.max_risk))
            .filter(|s| {
                !only_terminal_strategies || matches!(s.kind, StrategyKind::Abandon | StrategyKind::UserEscalation)
            })
            .collect();
        filtered.sort_by(|a, b| b.confidence().partial_cmp(&a.confidence()).unwrap_or(std::cmp::Ordering::Equal));

        state = RecoveryState::Trying;
        let mut seen_signatures: HashSet<String> = HashSet::new();
        let mut attempts_made = 0u32;
        let mut strategies_tried = Vec::new();

        for strategy in filtered.into_iter().take(self.config.max_attempts as usize) {
            if matches!(strategy.kind, StrategyKind::Abandon | StrategyKind::UserEscalation) {
                strategies_tried.push(strategy.description.clone());
                break;
            }
            let signature = strategy.signature();
            if !seen_signatures.insert(signature) {
                continue;
            }

            attempts_made += 1;
            strategies_tried.push(strategy.description.clone());

            let args = strategy.adjusted_args.clone().unwrap_or_else(|| ctx.invocation.args.clone());
            let task_id = self.orchestrator.submit(&tool_name, args, ctx.invocation.priority, ctx.invocation.timeout_ms);
            let result = self.orchestrator.result(task_id, Duration::from_secs(30)).await;

            match result {
                Some(result) if result.success => {
                    self.failure_signatures.record_success(&tool_name, error_type);
                    return RecoveryOutcome {
                        state: RecoveryState::Succeeded,
                        result,
                        attempts_made,
                        strategies_tried,
                    };
                }
                _ => {
                    self.failure_signatures.record_failure(&tool_name, error_type);
                }
            }
        }

        state = RecoveryState::Exhausted;
        info!(tool = %tool_name, attempts_made, ?state, "recovery exhausted");
        let augmented = ctx
            .result
            .with_metadata("recovery_attempts", serde_json::json!(attempts_made))
            .with_metadata("recovery_strategies_tried", serde_json::json!(strategies_tried));

        RecoveryOutcome { state, result: augmented, attempts_made, strategies_tried }
    }
}

#[allow(dead_code)]
fn _assert_priority_used(_: Priority) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Tool, ToolRegistry};
    use crate::types::{ParamType, ParameterSpec, ToolDefinition, ToolInvocation};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyTool {
        def: ToolDefinition,
        failures_remaining: AtomicU32,
    }

    #[async_trait]
    impl Tool for FlakyTool {
        fn definition(&self) -> &ToolDefinition {
            &self.def
        }
        async fn execute(&self, _args: Value) -> anyhow::Result<ToolResult> {
            if self.failures_remaining.fetch_sub(1, Ordering::SeqCst) > 0 {
                Ok(ToolResult::failure("flaky", "transient network blip", ErrorType::Network))
            } else {
                Ok(ToolResult::success("flaky", "ok now"))
            }
        }
    }

    fn flaky_def() -> ToolDefinition {
        ToolDefinition {
            name: "flaky".into(),
            description: "fails a few times then succeeds".into(),
            category: "test".into(),
            parameters: vec![ParameterSpec {
                name: "x".into(),
                param_type: ParamType::Number,
                description: "x".into(),
                required: false,
                default: None,
            }],
        }
    }

    fn make_ctx(result: ToolResult) -> FailureContext {
        FailureContext {
            goal: "do the thing".into(),
            invocation: ToolInvocation {
                tool_name: "flaky".into(),
                args: serde_json::json!({}),
                priority: Priority::Normal,
                task_id: 0,
                submitted_at_ms: 0,
                timeout_ms: None,
            },
            result,
            working_dir: std::env::temp_dir(),
            retry_count: 0,
            environment: Default::default(),
        }
    }

    #[tokio::test]
    async fn recovers_successfully_after_transient_failures() {
        let registry = Arc::new(ToolRegistry::new());
        registry.register(Arc::new(FlakyTool { def: flaky_def(), failures_remaining: AtomicU32::new(1) }));
        let orchestrator = Orchestrator::new(registry, 2);
        orchestrator.start();

        let module = RecoveryModule::new(orchestrator, Arc::new(StaticHeuristicDebugger), RecoveryConfig::default());
        let failing_result = ToolResult::failure("flaky", "transient network blip", ErrorType::Network);
        let outcome = module.recover(make_ctx(failing_result)).await;

        assert_eq!(outcome.state, RecoveryState::Succeeded);
        assert!(outcome.result.success);
        assert!(outcome.attempts_made >= 1);
    }

    #[tokio::test]
    async fn validation_errors_are_never_recovered() {
        let registry = Arc::new(ToolRegistry::new());
        let orchestrator = Orchestrator::new(registry, 1);
        orchestrator.start();
        let module = RecoveryModule::new(orchestrator, Arc::new(NullDebugger), RecoveryConfig::default());
        let result = ToolResult::failure("whatever", "bad args", ErrorType::Validation);
        let outcome = module.recover(make_ctx(result)).await;
        assert_eq!(outcome.state, RecoveryState::Exhausted);
        assert_eq!(outcome.attempts_made, 0);
    }

    #[tokio::test]
    async fn exhausts_when_debugger_suggests_nothing() {
        let registry = Arc::new(ToolRegistry::new());
        registry.register(Arc::new(FlakyTool { def: flaky_def(), failures_remaining: AtomicU32::new(100) }));
        let orchestrator = Orchestrator::new(registry, 1);
        orchestrator.start();
        let module = RecoveryModule::new(orchestrator, Arc::new(NullDebugger), RecoveryConfig::default());
        let result = ToolResult::failure("flaky", "transient network blip", ErrorType::Network);
        let outcome = module.recover(make_ctx(result)).await;
        assert_eq!(outcome.state, RecoveryState::Exhausted);
        assert_eq!(outcome.attempts_made, 0);
    }
}
