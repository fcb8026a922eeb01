pub mod agent;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod orchestrator;
pub mod registry;
pub mod subagent;
pub mod tools;

pub use agent::{Agent, ContextStrategy, ModelConfig};
pub use context::{ConversationStore, ModelSummarizer, Summarizer};
pub use dispatch::ToolDispatcher;
pub use error::EngineError;
pub use orchestrator::{SubagentManager, SubagentTask, TaskOutcome};
pub use registry::{ToolRegistry, ToolSource};
pub use subagent::{ExecutionState, Subagent, SubagentConfig, SubagentReport, SubagentStatus, TerminationReason};
