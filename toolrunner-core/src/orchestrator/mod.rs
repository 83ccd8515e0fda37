//! Priority-scheduling orchestrator.
//!
//! Generalizes the reference agent's `AsyncToolPipeline` (semaphore-gated
//! batch dispatch loop, `lru`-backed metrics) from a flat FIFO queue into a
//! priority-ordered one: a `BinaryHeap` keyed by `(priority desc,
//! submission order asc)`, drained on a short dispatch tick, with each
//! dispatched task spawned under a capacity-`N` semaphore exactly as
//! `AsyncToolPipeline::process_batch` spawns one task per request.

use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, Notify, RwLock as AsyncRwLock, Semaphore};
use tokio::time::timeout as tokio_timeout;
use tracing::{debug, warn};

use crate::registry::ToolRegistry;
use crate::types::{Priority, TaskId, ToolInvocation, ToolResult};
use toolrunner_commons::ErrorType;
use toolrunner_exec::ProcessManager;

const DISPATCH_TICK: Duration = Duration::from_millis(10);

#[derive(Debug, Default, Clone)]
pub struct OrchestratorMetrics {
    pub submitted: u64,
    pub completed_success: u64,
    pub completed_failure: u64,
    pub cancelled: u64,
    pub in_flight: u64,
    pub queue_depth_by_band: HashMap<Priority, u64>,
}

struct QueuedTask {
    invocation: ToolInvocation,
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.invocation.priority == other.invocation.priority
            && self.invocation.submitted_at_ms == other.invocation.submitted_at_ms
    }
}
impl Eq for QueuedTask {}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedTask {
    /// `BinaryHeap` is a max-heap: higher priority compares greater, and
    /// within equal priority the *earlier* submission compares greater so
    /// FIFO ordering is preserved within a band.
    fn cmp(&self, other: &Self) -> Ordering {
        self.invocation
            .priority
            .cmp(&other.invocation.priority)
            .then_with(|| other.invocation.submitted_at_ms.cmp(&self.invocation.submitted_at_ms))
    }
}

enum TaskSlot {
    Waiting(Vec<oneshot::Sender<ToolResult>>),
    Ready(ToolResult),
}

struct Inner {
    registry: Arc<ToolRegistry>,
    process_manager: Arc<ProcessManager>,
    queue: parking_lot::Mutex<BinaryHeap<QueuedTask>>,
    in_flight: AsyncRwLock<HashMap<TaskId, TaskSlot>>,
    semaphore: Arc<Semaphore>,
    next_task_id: AtomicU64,
    metrics: parking_lot::Mutex<OrchestratorMetrics>,
    shutdown: Arc<AtomicBool>,
    wake: Notify,
}

/// Owns its task queue, in-flight map, and a [`ProcessManager`] — never a
/// process-wide singleton, so tests can construct as many independent
/// orchestrators as they need.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn new(registry: Arc<ToolRegistry>, concurrency: usize) -> Self {
        let concurrency = concurrency.max(1);
        Self {
            inner: Arc::new(Inner {
                registry,
                process_manager: Arc::new(ProcessManager::new()),
                queue: parking_lot::Mutex::new(BinaryHeap::new()),
                in_flight: AsyncRwLock::new(HashMap::new()),
                semaphore: Arc::new(Semaphore::new(concurrency)),
                next_task_id: AtomicU64::new(1),
                metrics: parking_lot::Mutex::new(OrchestratorMetrics::default()),
                shutdown: Arc::new(AtomicBool::new(false)),
                wake: Notify::new(),
            }),
        }
    }

    pub fn process_manager(&self) -> Arc<ProcessManager> {
        self.inner.process_manager.clone()
    }

    /// Spawns the dispatch loop. Safe to call once per orchestrator
    /// instance.
    pub fn start(&self) {
        let inner = self.inner.clone();
        tokio::spawn(async move { dispatch_loop(inner).await });
    }

    pub fn submit(&self, tool_name: &str, args: Value, priority: Priority, timeout_ms: Option<u64>) -> TaskId {
        let task_id = self.inner.next_task_id.fetch_add(1, AtomicOrdering::SeqCst);
        let invocation = ToolInvocation {
            tool_name: tool_name.to_string(),
            args,
            priority,
            task_id,
            submitted_at_ms: ToolInvocation::now_ms(),
            timeout_ms,
        };

        {
            let mut metrics = self.inner.metrics.lock();
            metrics.submitted += 1;
            *metrics.queue_depth_by_band.entry(priority).or_insert(0) += 1;
        }

        self.inner.queue.lock().push(QueuedTask { invocation });
        self.inner.wake.notify_one();
        task_id
    }

    /// Blocks until `task_id`'s result is published or `timeout` elapses.
    pub async fn result(&self, task_id: TaskId, wait: Duration) -> Option<ToolResult> {
        let rx = {
            let mut in_flight = self.inner.in_flight.write().await;
            match in_flight.get_mut(&task_id) {
                Some(TaskSlot::Ready(result)) => return Some(result.clone()),
                Some(TaskSlot::Waiting(waiters)) => {
                    let (tx, rx) = oneshot::channel();
                    waiters.push(tx);
                    rx
                }
                None => {
                    let (tx, rx) = oneshot::channel();
                    in_flight.insert(task_id, TaskSlot::Waiting(vec![tx]));
                    rx
                }
            }
        };
        tokio_timeout(wait, rx).await.ok()?.ok()
    }

    pub fn metrics(&self) -> OrchestratorMetrics {
        self.inner.metrics.lock().clone()
    }

    /// Drains the queue (remaining tasks complete with a cancellation
    /// result), signals the dispatch loop to stop after its current batch,
    /// and terminates every live process.
    pub async fn stop(&self) {
        self.inner.shutdown.store(true, AtomicOrdering::SeqCst);
        self.inner.wake.notify_one();

        let leftover: Vec<QueuedTask> = {
            let mut q = self.inner.queue.lock();
            std::mem::take(&mut *q).into_sorted_vec()
        };
        for task in leftover {
            let result = ToolResult::failure(
                task.invocation.tool_name.clone(),
                "cancelled: orchestrator stopped",
                ErrorType::Internal,
            );
            publish(&self.inner, task.invocation.task_id, result).await;
            self.inner.metrics.lock().cancelled += 1;
        }

        self.inner.process_manager.cleanup_all().await;
    }
}

async fn dispatch_loop(inner: Arc<Inner>) {
    loop {
        if inner.shutdown.load(AtomicOrdering::SeqCst) {
            return;
        }

        let permit = match inner.semaphore.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                tokio::time::sleep(DISPATCH_TICK).await;
                continue;
            }
        };

        let task = inner.queue.lock().pop();
        let Some(task) = task else {
            drop(permit);
            tokio::select! {
                _ = inner.wake.notified() => {}
                _ = tokio::time::sleep(DISPATCH_TICK) => {}
            }
            continue;
        };

        {
            let mut metrics = inner.metrics.lock();
            if let Some(depth) = metrics.queue_depth_by_band.get_mut(&task.invocation.priority) {
                *depth = depth.saturating_sub(1);
            }
            metrics.in_flight += 1;
        }

        let inner2 = inner.clone();
        tokio::spawn(async move {
            let _permit = permit;
            let result = execute(&inner2, &task.invocation).await;
            {
                let mut metrics = inner2.metrics.lock();
                metrics.in_flight = metrics.in_flight.saturating_sub(1);
                if result.success {
                    metrics.completed_success += 1;
                } else {
                    metrics.completed_failure += 1;
                }
            }
            publish(&inner2, task.invocation.task_id, result).await;
        });
    }
}

async fn execute(inner: &Arc<Inner>, invocation: &ToolInvocation) -> ToolResult {
    if let Err(err) = inner.registry.validate(&invocation.tool_name, &invocation.args) {
        return ToolResult::failure(invocation.tool_name.clone(), err.to_string(), err.error_type());
    }

    let Some(tool) = inner.registry.lookup(&invocation.tool_name) else {
        return ToolResult::failure(
            invocation.tool_name.clone(),
            format!("tool `{}` not found", invocation.tool_name),
            ErrorType::Validation,
        );
    };

    let future = tool.execute(invocation.args.clone());
    let outcome = match invocation.timeout_ms {
        Some(ms) => tokio_timeout(Duration::from_millis(ms), future).await,
        None => Ok(future.await),
    };

    match outcome {
        Ok(Ok(result)) => result,
        Ok(Err(err)) => ToolResult::failure(invocation.tool_name.clone(), err.to_string(), ErrorType::Internal),
        Err(_) => {
            warn!(tool = %invocation.tool_name, task_id = invocation.task_id, "tool invocation timed out");
            ToolResult::failure(invocation.tool_name.clone(), "operation timed out", ErrorType::Timeout)
        }
    }
}

async fn publish(inner: &Arc<Inner>, task_id: TaskId, result: ToolResult) {
    let mut in_flight = inner.in_flight.write().await;
    match in_flight.insert(task_id, TaskSlot::Ready(result.clone())) {
        Some(TaskSlot::Waiting(waiters)) => {
            for tx in waiters {
                let _ = tx.send(result.clone());
            }
        }
        _ => {
            debug!(task_id, "published result with no prior waiters");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Tool;
    use crate::types::{ParamType, ParameterSpec, ToolDefinition};
    use async_trait::async_trait;

    struct RecordingTool {
        def: ToolDefinition,
        order: Arc<parking_lot::Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Tool for RecordingTool {
        fn definition(&self) -> &ToolDefinition {
            &self.def
        }

        async fn execute(&self, args: Value) -> anyhow::Result<ToolResult> {
            let label = args.get("label").and_then(|v| v.as_str()).unwrap_or("?").to_string();
            self.order.lock().push(label.clone());
            Ok(ToolResult::success(self.def.name.clone(), label))
        }
    }

    fn def(name: &str) -> ToolDefinition {
        ToolDefinition {
            name: name.into(),
            description: "test".into(),
            category: "test".into(),
            parameters: vec![ParameterSpec {
                name: "label".into(),
                param_type: ParamType::String,
                description: "label".into(),
                required: false,
                default: None,
            }],
        }
    }

    #[tokio::test]
    async fn higher_priority_dispatched_before_lower_with_concurrency_one() {
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let registry = Arc::new(ToolRegistry::new());
        registry.register(Arc::new(RecordingTool { def: def("record"), order: order.clone() }));

        let orchestrator = Orchestrator::new(registry, 1);

        // Submit a low-priority task first, then immediately enqueue a
        // critical one, before starting the dispatcher: the scheduler must
        // still dispatch the critical task first since no worker has woken
        // yet.
        let low = orchestrator.submit("record", serde_json::json!({"label": "low"}), Priority::Background, None);
        let high = orchestrator.submit("record", serde_json::json!({"label": "high"}), Priority::Critical, None);

        orchestrator.start();

        let _ = orchestrator.result(high, Duration::from_secs(2)).await;
        let _ = orchestrator.result(low, Duration::from_secs(2)).await;

        let seen = order.lock().clone();
        assert_eq!(seen, vec!["high".to_string(), "low".to_string()]);
    }

    #[tokio::test]
    async fn unknown_tool_fails_validation_without_panicking() {
        let registry = Arc::new(ToolRegistry::new());
        let orchestrator = Orchestrator::new(registry, 2);
        orchestrator.start();

        let id = orchestrator.submit("nope", serde_json::json!({}), Priority::Normal, None);
        let result = orchestrator.result(id, Duration::from_secs(2)).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.error_type(), Some(ErrorType::Validation));
    }

    #[tokio::test]
    async fn metrics_track_submitted_and_completed() {
        let registry = Arc::new(ToolRegistry::new());
        registry.register(Arc::new(RecordingTool {
            def: def("record"),
            order: Arc::new(parking_lot::Mutex::new(Vec::new())),
        }));
        let orchestrator = Orchestrator::new(registry, 2);
        orchestrator.start();

        let id = orchestrator.submit("record", serde_json::json!({"label": "x"}), Priority::Normal, None);
        let _ = orchestrator.result(id, Duration::from_secs(2)).await;

        let metrics = orchestrator.metrics();
        assert_eq!(metrics.submitted, 1);
        assert_eq!(metrics.completed_success, 1);
    }
}
