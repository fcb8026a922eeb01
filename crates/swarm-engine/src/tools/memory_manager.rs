use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use swarm_core::tools::{require_str, Tool, ToolError};
use swarm_store::SharedMemory;

use super::{action, invalid_action};

const DEFAULT_DAYS_OLD: u64 = 30;

/// Administrative shared memory operations for the coordinating agent.
pub struct MemoryManagerTool {
    memory: Arc<SharedMemory>,
}

impl MemoryManagerTool {
    pub fn new(memory: Arc<SharedMemory>) -> Self {
        Self { memory }
    }

    fn export_task(&self, args: &Value) -> Result<String, ToolError> {
        let task_id = require_str(args, "target_task_id")?;
        let output = require_str(args, "output_file")?;
        match self.memory.export_task(task_id, Path::new(output)) {
            Ok(true) => Ok(format!("Exported task '{task_id}' to '{output}'")),
            Ok(false) => Ok(format!("Failed to export task '{task_id}' (no entries found)")),
            Err(e) => Err(ToolError::ExecutionFailed(format!(
                "Failed to export task '{task_id}': {e}"
            ))),
        }
    }

    fn clear_task(&self, args: &Value) -> Result<String, ToolError> {
        let task_id = require_str(args, "target_task_id")?;
        let outcome = self
            .memory
            .clear_task(task_id)
            .map_err(|e| ToolError::ExecutionFailed(format!("Failed to clear task '{task_id}': {e}")))?;
        if outcome.matched == 0 {
            return Ok(format!("No entries found for task '{task_id}'"));
        }
        info!(task_id, deleted = outcome.deleted, "task entries cleared");
        Ok(format!(
            "Deleted {}/{} entries for task '{task_id}'",
            outcome.deleted, outcome.matched
        ))
    }

    fn task_summary(&self, args: &Value) -> Result<String, ToolError> {
        let task_id = require_str(args, "target_task_id")?;
        let Some(summary) = self.memory.task_summary(task_id) else {
            return Ok(format!("No entries found for task '{task_id}'"));
        };

        let mut out = format!("Task Summary: {task_id}\n{}\n", "=".repeat(50));
        let _ = writeln!(out, "Total Entries: {}", summary.total_entries);
        let _ = writeln!(out, "Total Content: {} characters", summary.total_content_chars);
        let _ = writeln!(
            out,
            "Time Range: {} -> {}",
            summary.earliest.to_rfc3339(),
            summary.latest.to_rfc3339()
        );
        out.push_str("\nBy Category:\n");
        for (category, count) in &summary.by_category {
            let _ = writeln!(out, "  {category}: {count}");
        }
        out.push_str("\nBy Agent:\n");
        for (agent, count) in &summary.by_agent {
            let _ = writeln!(out, "  {agent}: {count}");
        }
        Ok(out.trim_end().to_string())
    }

    fn cleanup_old(&self, args: &Value) -> Result<String, ToolError> {
        let days = args["days_old"].as_u64().unwrap_or(DEFAULT_DAYS_OLD).max(1);
        let days = u32::try_from(days).unwrap_or(u32::MAX);
        let deleted = self
            .memory
            .cleanup_older_than(days)
            .map_err(|e| ToolError::ExecutionFailed(format!("Cleanup failed: {e}")))?;
        Ok(format!("Removed {deleted} entries older than {days} days"))
    }
}

#[async_trait]
impl Tool for MemoryManagerTool {
    fn name(&self) -> &str {
        "memory_manager"
    }

    fn description(&self) -> &str {
        "Administrative functions for managing the shared memory system. For coordinator use."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["action"],
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["export_task", "clear_task", "get_task_summary", "cleanup_old"],
                    "description": "Administrative action to perform"
                },
                "target_task_id": {
                    "type": "string",
                    "description": "Task to act on (export_task, clear_task, get_task_summary)"
                },
                "output_file": {
                    "type": "string",
                    "description": "Output file path (export_task)"
                },
                "days_old": {
                    "type": "integer",
                    "minimum": 1,
                    "default": DEFAULT_DAYS_OLD,
                    "description": "Age threshold in days (cleanup_old)"
                }
            }
        })
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        match action(&args)? {
            "export_task" => self.export_task(&args),
            "clear_task" => self.clear_task(&args),
            "get_task_summary" => self.task_summary(&args),
            "cleanup_old" => self.cleanup_old(&args),
            other => Err(invalid_action(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swarm_store::{NewEntry, TaskExport};

    fn seeded() -> Arc<SharedMemory> {
        let memory = Arc::new(SharedMemory::in_memory());
        memory.store(NewEntry::new("alice", "t1", "research", "a", "abcd")).unwrap();
        memory.store(NewEntry::new("bob", "t1", "analysis", "b", "ef")).unwrap();
        memory.store(NewEntry::new("bob", "t2", "research", "c", "g")).unwrap();
        memory
    }

    #[tokio::test]
    async fn summary_counts_by_category_and_agent() {
        let tool = MemoryManagerTool::new(seeded());
        let out = tool
            .execute(json!({"action": "get_task_summary", "target_task_id": "t1"}))
            .await
            .unwrap();
        assert!(out.starts_with("Task Summary: t1"));
        assert!(out.contains("Total Entries: 2"));
        assert!(out.contains("Total Content: 6 characters"));
        assert!(out.contains("By Category:\n  analysis: 1\n  research: 1"));
        assert!(out.contains("  alice: 1"));
        assert!(out.contains("  bob: 1"));

        let out = tool
            .execute(json!({"action": "get_task_summary", "target_task_id": "none"}))
            .await
            .unwrap();
        assert_eq!(out, "No entries found for task 'none'");
    }

    #[tokio::test]
    async fn clear_task_only_touches_that_task() {
        let memory = seeded();
        let tool = MemoryManagerTool::new(Arc::clone(&memory));
        let out = tool
            .execute(json!({"action": "clear_task", "target_task_id": "t1"}))
            .await
            .unwrap();
        assert_eq!(out, "Deleted 2/2 entries for task 't1'");
        assert_eq!(memory.len(), 1);

        let out = tool
            .execute(json!({"action": "clear_task", "target_task_id": "t1"}))
            .await
            .unwrap();
        assert_eq!(out, "No entries found for task 't1'");
    }

    #[tokio::test]
    async fn export_writes_task_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t1.json");
        let tool = MemoryManagerTool::new(seeded());

        let out = tool
            .execute(json!({
                "action": "export_task",
                "target_task_id": "t1",
                "output_file": path.to_str().unwrap(),
            }))
            .await
            .unwrap();
        assert!(out.starts_with("Exported task 't1'"));
        let export: TaskExport = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(export.entries.len(), 2);

        let out = tool
            .execute(json!({
                "action": "export_task",
                "target_task_id": "empty",
                "output_file": path.to_str().unwrap(),
            }))
            .await
            .unwrap();
        assert!(out.contains("no entries found"));
    }

    #[tokio::test]
    async fn cleanup_keeps_fresh_entries() {
        let memory = seeded();
        let tool = MemoryManagerTool::new(Arc::clone(&memory));
        let out = tool.execute(json!({"action": "cleanup_old"})).await.unwrap();
        assert_eq!(out, "Removed 0 entries older than 30 days");
        assert_eq!(memory.len(), 3);
    }

    #[tokio::test]
    async fn missing_arguments_and_bad_actions() {
        let tool = MemoryManagerTool::new(seeded());
        assert!(matches!(
            tool.execute(json!({"action": "clear_task"})).await,
            Err(ToolError::InvalidArguments(_))
        ));
        assert!(tool.execute(json!({"action": "drop_all"})).await.is_err());
    }
}
