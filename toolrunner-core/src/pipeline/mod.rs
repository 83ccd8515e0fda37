//! Stream Pipeline: DAG-ordered execution of read/analyze/write operations
//! with dependency short-circuiting and a read-only result cache.
//!
//! No single file in the reference agent implements DAG scheduling; this
//! module generalizes `tools::async_pipeline::AsyncToolPipeline`'s
//! concurrency idioms (semaphore-gated spawns, an `lru::LruCache` behind a
//! lock) to operate over an explicit dependency graph, per the abstract
//! design's note that the DAG should be an id-to-`Operation` map plus a
//! reverse-edge index, with cycle detection via three-color DFS.

pub mod cache_key;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::Semaphore;

use crate::registry::ToolRegistry;
use crate::types::{Operation, OperationId, OperationKind, OperationResult, ToolResult};
use toolrunner_commons::ErrorType;

#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineSubmitError {
    #[error("duplicate operation id `{0}`")]
    DuplicateId(String),
    #[error("operation `{0}` depends on unknown id `{1}`")]
    UnknownDependency(String, String),
    #[error("dependency cycle detected, involving operation `{0}`")]
    Cycle(String),
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

type ResultCache = Arc<Mutex<LruCache<String, ToolResult>>>;

/// Owns its operation set and result cache exclusively; a pipeline
/// instance is not shared across unrelated submissions.
pub struct Pipeline {
    registry: Arc<ToolRegistry>,
    read_semaphore: Arc<Semaphore>,
    cache: ResultCache,
    stats: Arc<Mutex<CacheStats>>,
}

impl Pipeline {
    pub fn new(registry: Arc<ToolRegistry>, read_concurrency: usize, cache_capacity: usize) -> Self {
        let capacity = std::num::NonZeroUsize::new(cache_capacity.max(1)).unwrap();
        Self {
            registry,
            read_semaphore: Arc::new(Semaphore::new(read_concurrency.max(1))),
            cache: Arc::new(Mutex::new(LruCache::new(capacity))),
            stats: Arc::new(Mutex::new(CacheStats::default())),
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        let mut stats = self.stats.lock().clone();
        stats.size = self.cache.lock().len();
        stats
    }

    /// Validates the operation set forms a well-formed DAG (no unknown
    /// dependency ids, no duplicate ids, no cycles) and, if so, runs every
    /// operation to completion, returning results in completion order.
    pub async fn process(&self, ops: Vec<Operation>) -> Result<Vec<OperationResult>, PipelineSubmitError> {
        let by_id = self.validate(&ops)?;
        Ok(self.execute(by_id).await)
    }

    fn validate(&self, ops: &[Operation]) -> Result<HashMap<OperationId, Operation>, PipelineSubmitError> {
        let mut by_id = HashMap::new();
        for op in ops {
            if by_id.insert(op.id.clone(), op.clone()).is_some() {
                return Err(PipelineSubmitError::DuplicateId(op.id.clone()));
            }
        }
        for op in ops {
            for dep in &op.dependencies {
                if !by_id.contains_key(dep) {
                    return Err(PipelineSubmitError::UnknownDependency(op.id.clone(), dep.clone()));
                }
            }
        }

        let mut colors: HashMap<String, Color> = by_id.keys().map(|id| (id.clone(), Color::White)).collect();
        let ids: Vec<String> = by_id.keys().cloned().collect();
        for id in ids {
            if colors[&id] == Color::White {
                Self::visit(&id, &by_id, &mut colors)?;
            }
        }

        Ok(by_id)
    }

    fn visit(
        id: &str,
        by_id: &HashMap<OperationId, Operation>,
        colors: &mut HashMap<String, Color>,
    ) -> Result<(), PipelineSubmitError> {
        colors.insert(id.to_string(), Color::Gray);
        let op = &by_id[id];
        for dep in &op.dependencies {
            match colors.get(dep.as_str()).copied().unwrap_or(Color::White) {
                Color::White => Self::visit(dep.as_str(), by_id, colors)?,
                Color::Gray => return Err(PipelineSubmitError::Cycle(id.to_string())),
                Color::Black => {}
            }
        }
        colors.insert(id.to_string(), Color::Black);
        Ok(())
    }

    async fn execute(&self, by_id: HashMap<OperationId, Operation>) -> Vec<OperationResult> {
        // Reverse-edge index: for each id, who depends on it.
        let mut dependents: HashMap<OperationId, Vec<OperationId>> = HashMap::new();
        for op in by_id.values() {
            for dep in &op.dependencies {
                dependents.entry(dep.clone()).or_default().push(op.id.clone());
            }
        }

        let mut remaining_deps: HashMap<OperationId, usize> =
            by_id.values().map(|op| (op.id.clone(), op.dependencies.len())).collect();
        let mut failed: HashSet<OperationId> = HashSet::new();
        let mut ordered_results = Vec::with_capacity(by_id.len());

        let mut ready: Vec<OperationId> = by_id
            .values()
            .filter(|op| op.dependencies.is_empty())
            .map(|op| op.id.clone())
            .collect();

        // Every wavefront is driven off the same reverse-edge index, so a
        // read or analyze depending on a write is woken exactly like one
        // depending on a read: no operation kind has a private path into
        // `ready`. Writes within a wavefront still run serially, after the
        // batch's reads/analyzes, preserving write exclusivity without a
        // separate post-pass that bypasses dependency bookkeeping.
        while !ready.is_empty() {
            let batch: Vec<Operation> = ready.drain(..).map(|id| by_id[&id].clone()).collect();
            let (writes, others): (Vec<Operation>, Vec<Operation>) =
                batch.into_iter().partition(|op| op.kind == OperationKind::Write);

            let mut handles = Vec::with_capacity(others.len());
            for op in others {
                if let Some(failed_dep) = op.dependencies.iter().find(|d| failed.contains(d)).cloned() {
                    let tool_name = op.tool_name.clone();
                    handles.push((op.id.clone(), tokio::spawn(async move {
                        ToolResult::failure(tool_name, format!("dependency `{failed_dep}` failed"), ErrorType::Internal)
                            .with_metadata("upstream_operation_id", Value::String(failed_dep))
                            .with_metadata("dependency_failed", Value::Bool(true))
                    })));
                    continue;
                }

                let is_read = op.kind == OperationKind::Read;
                let key = cache_key::canonicalize(&self.registry, &op.tool_name, &op.args);
                if is_read {
                    if let Some(hit) = self.cache.lock().get(&key).cloned() {
                        self.stats.lock().hits += 1;
                        handles.push((op.id.clone(), tokio::spawn(async move { hit })));
                        continue;
                    }
                    self.stats.lock().misses += 1;
                }

                let registry = self.registry.clone();
                let semaphore = self.read_semaphore.clone();
                let cache = self.cache.clone();
                let op_id = op.id.clone();
                handles.push((
                    op_id,
                    tokio::spawn(async move {
                        let _permit = semaphore.acquire_owned().await.expect("semaphore not closed");
                        let result = run_operation(&registry, &op).await;
                        if is_read && result.success {
                            cache.lock().put(key, result.clone());
                        }
                        result
                    }),
                ));
            }

            let mut completed = Vec::with_capacity(handles.len() + writes.len());
            for (id, handle) in handles {
                let result = handle
                    .await
                    .unwrap_or_else(|e| ToolResult::failure("join", e.to_string(), ErrorType::Internal));
                if !result.success {
                    failed.insert(id.clone());
                }
                ordered_results.push(OperationResult { operation_id: id.clone(), result });
                completed.push(id);
            }

            // Writes in this wavefront run one at a time, in submission
            // order, after the batch's reads/analyzes have all completed.
            for op in writes {
                if let Some(failed_dep) = op.dependencies.iter().find(|d| failed.contains(d)) {
                    let result = ToolResult::failure(
                        op.tool_name.clone(),
                        format!("dependency `{failed_dep}` failed"),
                        ErrorType::Internal,
                    )
                    .with_metadata("upstream_operation_id", Value::String(failed_dep.clone()))
                    .with_metadata("dependency_failed", Value::Bool(true));
                    failed.insert(op.id.clone());
                    ordered_results.push(OperationResult { operation_id: op.id.clone(), result });
                    completed.push(op.id.clone());
                    continue;
                }
                let result = run_operation(&self.registry, &op).await;
                if !result.success {
                    failed.insert(op.id.clone());
                }
                ordered_results.push(OperationResult { operation_id: op.id.clone(), result });
                completed.push(op.id.clone());
            }

            for id in completed {
                if let Some(next_ops) = dependents.get(&id) {
                    for next in next_ops {
                        if let Some(count) = remaining_deps.get_mut(next) {
                            *count = count.saturating_sub(1);
                            if *count == 0 {
                                ready.push(next.clone());
                            }
                        }
                    }
                }
            }
        }

        ordered_results
    }
}

async fn run_operation(registry: &ToolRegistry, op: &Operation) -> ToolResult {
    if let Err(err) = registry.validate(&op.tool_name, &op.args) {
        return ToolResult::failure(op.tool_name.clone(), err.to_string(), err.error_type());
    }
    let Some(tool) = registry.lookup(&op.tool_name) else {
        return ToolResult::failure(op.tool_name.clone(), "tool not found", ErrorType::Validation);
    };
    match tool.execute(op.args.clone()).await {
        Ok(result) => result,
        Err(err) => ToolResult::failure(op.tool_name.clone(), err.to_string(), ErrorType::Internal),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Tool;
    use crate::types::{ParamType, ParameterSpec, ToolDefinition};
    use async_trait::async_trait;

    struct EchoTool(ToolDefinition);

    #[async_trait]
    impl Tool for EchoTool {
        fn definition(&self) -> &ToolDefinition {
            &self.0
        }
        async fn execute(&self, args: Value) -> anyhow::Result<ToolResult> {
            Ok(ToolResult::success(self.0.name.clone(), args.to_string()))
        }
    }

    fn def(name: &str) -> ToolDefinition {
        ToolDefinition {
            name: name.into(),
            description: "test".into(),
            category: "test".into(),
            parameters: vec![ParameterSpec {
                name: "v".into(),
                param_type: ParamType::String,
                description: "v".into(),
                required: false,
                default: None,
            }],
        }
    }

    fn registry() -> Arc<ToolRegistry> {
        let r = ToolRegistry::new();
        r.register(Arc::new(EchoTool(def("echo"))));
        Arc::new(r)
    }

    fn op(id: &str, kind: OperationKind, deps: &[&str]) -> Operation {
        Operation {
            id: id.into(),
            kind,
            tool_name: "echo".into(),
            args: serde_json::json!({"v": id}),
            priority: 0,
            dependencies: deps.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn rejects_cycles_at_submission() {
        let pipeline = Pipeline::new(registry(), 4, 16);
        let ops = vec![op("a", OperationKind::Read, &["b"]), op("b", OperationKind::Read, &["a"])];
        let err = pipeline.process(ops).await.unwrap_err();
        assert!(matches!(err, PipelineSubmitError::Cycle(_)));
    }

    #[tokio::test]
    async fn rejects_unknown_dependency() {
        let pipeline = Pipeline::new(registry(), 4, 16);
        let ops = vec![op("a", OperationKind::Read, &["ghost"])];
        let err = pipeline.process(ops).await.unwrap_err();
        assert!(matches!(err, PipelineSubmitError::UnknownDependency(_, _)));
    }

    #[tokio::test]
    async fn rejects_duplicate_ids() {
        let pipeline = Pipeline::new(registry(), 4, 16);
        let ops = vec![op("a", OperationKind::Read, &[]), op("a", OperationKind::Read, &[])];
        let err = pipeline.process(ops).await.unwrap_err();
        assert!(matches!(err, PipelineSubmitError::DuplicateId(_)));
    }

    #[tokio::test]
    async fn happy_path_runs_every_operation() {
        let pipeline = Pipeline::new(registry(), 4, 16);
        let ops = vec![
            op("read1", OperationKind::Read, &[]),
            op("analyze1", OperationKind::Analyze, &["read1"]),
            op("write1", OperationKind::Write, &["analyze1"]),
        ];
        let results = pipeline.process(ops).await.unwrap();
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.result.success));
    }

    #[tokio::test]
    async fn dependency_failure_short_circuits_dependents() {
        struct FailingTool(ToolDefinition);
        #[async_trait]
        impl Tool for FailingTool {
            fn definition(&self) -> &ToolDefinition {
                &self.0
            }
            async fn execute(&self, _args: Value) -> anyhow::Result<ToolResult> {
                Ok(ToolResult::failure("boom", "boom", ErrorType::Internal))
            }
        }
        let r = ToolRegistry::new();
        r.register(Arc::new(FailingTool(def("boom"))));
        r.register(Arc::new(EchoTool(def("echo"))));
        let pipeline = Pipeline::new(Arc::new(r), 4, 16);

        let mut failing = op("fails", OperationKind::Read, &[]);
        failing.tool_name = "boom".into();
        let dependent = op("depends", OperationKind::Analyze, &["fails"]);

        let results = pipeline.process(vec![failing, dependent]).await.unwrap();
        let dependent_result = results.iter().find(|r| r.operation_id == "depends").unwrap();
        assert!(!dependent_result.result.success);
        assert_eq!(
            dependent_result.result.metadata.get("dependency_failed"),
            Some(&Value::Bool(true))
        );
    }

    #[tokio::test]
    async fn read_depending_on_a_write_still_appears_in_the_output() {
        let pipeline = Pipeline::new(registry(), 4, 16);
        let ops = vec![op("w1", OperationKind::Write, &[]), op("r2", OperationKind::Read, &["w1"])];
        let results = pipeline.process(ops).await.unwrap();
        assert_eq!(results.len(), 2);
        let r2 = results.iter().find(|r| r.operation_id == "r2").expect("r2 must appear in the output");
        assert!(r2.result.success);
    }

    #[tokio::test]
    async fn repeated_read_is_served_from_cache() {
        let pipeline = Pipeline::new(registry(), 4, 16);
        let ops = vec![op("r1", OperationKind::Read, &[])];
        let _ = pipeline.process(ops).await.unwrap();
        let ops2 = vec![op("r1", OperationKind::Read, &[])];
        let _ = pipeline.process(ops2).await.unwrap();
        let stats = pipeline.cache_stats();
        assert!(stats.hits >= 1);
    }
}
