//! Coordination tools built on the shared memory store.

pub mod memory_manager;
pub mod report;
pub mod shared_memory;
pub mod subagent_manager;

use serde_json::Value;

use swarm_core::tools::ToolError;

pub use memory_manager::MemoryManagerTool;
pub use report::{ReportResultsTool, RequestGuidanceTool};
pub use shared_memory::SharedMemoryTool;
pub use subagent_manager::{SubagentDefaults, SubagentManagerTool};

/// Categories an agent may file shared memory entries under.
pub const CATEGORIES: &[&str] = &[
    "research",
    "analysis",
    "forecast_data",
    "decisions",
    "progress",
    "errors",
    "coordination",
];

/// Task id used when nothing more specific is configured.
pub const DEFAULT_TASK_ID: &str = "multi_agent_session";

fn action(args: &Value) -> Result<&str, ToolError> {
    args["action"]
        .as_str()
        .ok_or_else(|| ToolError::InvalidArguments("action is required".into()))
}

fn invalid_action(action: &str) -> ToolError {
    ToolError::InvalidArguments(format!("Invalid action '{action}'"))
}

/// First `max` characters, with `...` appended when anything was cut.
fn preview(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn preview_cuts_on_char_boundaries() {
        assert_eq!(preview("short", 10), "short");
        assert_eq!(preview("abcdef", 3), "abc...");
        assert_eq!(preview("ééééé", 2), "éé...");
        assert_eq!(preview("exact", 5), "exact");
    }

    #[test]
    fn action_is_required() {
        assert_eq!(action(&json!({"action": "get"})).unwrap(), "get");
        assert!(matches!(action(&json!({})), Err(ToolError::InvalidArguments(_))));
        assert_eq!(
            invalid_action("fly").to_string(),
            "invalid arguments: Invalid action 'fly'"
        );
    }
}
