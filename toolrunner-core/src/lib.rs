//! Tool registry, sanitizer, priority scheduler, DAG pipeline, and error
//! recovery for the tool-execution runtime.

pub mod classifier;
pub mod context;
pub mod orchestrator;
pub mod pipeline;
pub mod recovery;
pub mod registry;
pub mod sanitizer;
pub mod tools;
pub mod types;

pub use classifier::{classify, QueryCategory, QueryClassification};
pub use context::{rank_files, RankedFile};
pub use orchestrator::{Orchestrator, OrchestratorMetrics};
pub use pipeline::{CacheStats, Pipeline, PipelineSubmitError};
pub use recovery::{DebuggerPersona, NullDebugger, RecoveryConfig, RecoveryModule, RecoveryOutcome, RecoveryState, StaticHeuristicDebugger};
pub use registry::{Tool, ToolRegistry};
pub use sanitizer::{CommandSanitizer, PathValidator};
pub use types::*;
