use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use swarm_core::tools::{optional_str, optional_str_list, require_str, Tool, ToolError};
use swarm_store::{MemoryEntry, MemoryQuery, MemoryUpdate, NewEntry, SharedMemory};

use super::{action, invalid_action, preview, CATEGORIES};

const DEFAULT_LIMIT: u64 = 10;
const MAX_LIMIT: u64 = 50;

/// Read/write access to shared memory for one agent working on one task.
pub struct SharedMemoryTool {
    memory: Arc<SharedMemory>,
    agent_name: String,
    task_id: String,
}

impl SharedMemoryTool {
    pub fn new(memory: Arc<SharedMemory>, agent_name: impl Into<String>, task_id: impl Into<String>) -> Self {
        Self {
            memory,
            agent_name: agent_name.into(),
            task_id: task_id.into(),
        }
    }

    pub fn agent_name(&self) -> &str {
        &self.agent_name
    }

    fn store(&self, args: &Value) -> Result<String, ToolError> {
        let category = require_str(args, "category")?;
        if !CATEGORIES.contains(&category) {
            return Err(ToolError::InvalidArguments(format!(
                "unknown category '{category}', expected one of: {}",
                CATEGORIES.join(", ")
            )));
        }
        let title = require_str(args, "title")?;
        let content = require_str(args, "content")?;
        let tags = optional_str_list(args, "tags").unwrap_or_default();
        let metadata = args["metadata"].as_object().cloned().unwrap_or_default();

        let id = self
            .memory
            .store(
                NewEntry::new(&self.agent_name, &self.task_id, category, title, content)
                    .with_tags(tags.iter().cloned())
                    .with_metadata(metadata),
            )
            .map_err(|e| ToolError::ExecutionFailed(format!("Failed to store entry: {e}")))?;

        Ok(format!(
            "Stored information in shared memory:\n\
             ID: {id}\n\
             Category: {category}\n\
             Title: {title}\n\
             Tags: {}\n\
             Content length: {} characters\n\
             Agent: {}\n\
             Task: {}",
            tags.join(", "),
            content.chars().count(),
            self.agent_name,
            self.task_id,
        ))
    }

    fn search(&self, args: &Value) -> String {
        let mut query = MemoryQuery::new().limit(limit(args));
        if let Some(category) = optional_str(args, "search_category") {
            query = query.category(category);
        }
        if let Some(tags) = optional_str_list(args, "search_tags").filter(|t| !t.is_empty()) {
            query = query.tags(tags);
        }
        if let Some(needle) = optional_str(args, "search_content") {
            query = query.content(needle);
        }
        if let Some(agent) = optional_str(args, "search_agent") {
            query = query.agent(agent);
        }

        let results = self.memory.search(&query);
        if results.is_empty() {
            return "No matching entries found in shared memory.".into();
        }
        let blocks: Vec<String> = results
            .iter()
            .map(|e| {
                format!(
                    "ID: {}\nAgent: {}\nCategory: {}\nTitle: {}\nTags: {}\nTime: {}\nContent: {}\n{}",
                    e.id,
                    e.agent_name,
                    e.category,
                    e.title,
                    join_tags(e),
                    e.timestamp.to_rfc3339(),
                    preview(&e.content, 200),
                    "-".repeat(50),
                )
            })
            .collect();
        format!("Found {} matching entries:\n\n{}", results.len(), blocks.join("\n\n"))
    }

    fn get(&self, args: &Value) -> Result<String, ToolError> {
        let id = require_str(args, "entry_id")?;
        let Some(e) = self.memory.get(id) else {
            return Ok(format!("Entry with ID '{id}' not found."));
        };
        Ok(format!(
            "Memory Entry: {}\nAgent: {}\nTask: {}\nCategory: {}\nTitle: {}\nTags: {}\nTimestamp: {}\nMetadata: {}\nContent:\n{}",
            e.id,
            e.agent_name,
            e.task_id,
            e.category,
            e.title,
            join_tags(&e),
            e.timestamp.to_rfc3339(),
            Value::Object(e.metadata.clone()),
            e.content,
        ))
    }

    fn recent(&self, args: &Value) -> String {
        let results = self.memory.recent(limit(args));
        if results.is_empty() {
            return "No entries found in shared memory.".into();
        }
        let blocks: Vec<String> = results
            .iter()
            .map(|e| {
                format!(
                    "{} | {} | {}\n{}\n{}",
                    e.id,
                    e.agent_name,
                    e.category,
                    e.title,
                    preview(&e.content, 150)
                )
            })
            .collect();
        format!("{} most recent entries:\n\n{}", results.len(), blocks.join("\n\n"))
    }

    fn task_history(&self) -> String {
        let results = self.memory.task_history(&self.task_id);
        if results.is_empty() {
            return format!("No entries found for task '{}'.", self.task_id);
        }
        let blocks: Vec<String> = results
            .iter()
            .map(|e| {
                format!(
                    "{} | {} | {}\n{}\n{}\n{}",
                    e.id,
                    e.agent_name,
                    e.category,
                    e.title,
                    e.timestamp.to_rfc3339(),
                    preview(&e.content, 200)
                )
            })
            .collect();
        format!(
            "Task '{}' history ({} entries):\n\n{}",
            self.task_id,
            results.len(),
            blocks.join("\n\n")
        )
    }

    fn update(&self, args: &Value) -> Result<String, ToolError> {
        let id = require_str(args, "entry_id")?;
        let update = MemoryUpdate {
            title: optional_str(args, "title").map(str::to_string),
            content: optional_str(args, "content").map(str::to_string),
            metadata: args["metadata"].as_object().cloned(),
            tags: optional_str_list(args, "tags"),
        };
        let fields = update.changed_fields();
        if fields.is_empty() {
            return Err(ToolError::InvalidArguments(
                "update needs at least one of title, content, metadata, tags".into(),
            ));
        }
        let found = self
            .memory
            .update(id, update)
            .map_err(|e| ToolError::ExecutionFailed(format!("Failed to update entry: {e}")))?;
        if !found {
            return Ok(format!("Failed to update entry '{id}' (not found)."));
        }
        Ok(format!("Updated entry '{id}' with changes: {}", fields.join(", ")))
    }

    fn stats(&self) -> String {
        let stats = self.memory.stats();
        let mut out = String::from("Shared Memory Statistics:\n\n");
        let _ = writeln!(out, "Total Entries: {}", stats.total_entries);
        let _ = writeln!(out, "Estimated Size: {} bytes", stats.estimated_size_bytes);
        let location = stats
            .memory_dir
            .as_ref()
            .map_or_else(|| "in memory".to_string(), |d| d.display().to_string());
        let _ = writeln!(out, "Storage Location: {location}");
        out.push_str("\nBy Category:\n");
        for (category, count) in &stats.categories {
            let _ = writeln!(out, "  {category}: {count}");
        }
        out.push_str("\nBy Agent:\n");
        for (agent, count) in &stats.agents {
            let _ = writeln!(out, "  {agent}: {count}");
        }
        out.trim_end().to_string()
    }
}

fn limit(args: &Value) -> usize {
    args["limit"].as_u64().unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT) as usize
}

fn join_tags(entry: &MemoryEntry) -> String {
    entry.tags.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}

#[async_trait]
impl Tool for SharedMemoryTool {
    fn name(&self) -> &str {
        "shared_memory"
    }

    fn description(&self) -> &str {
        "Store and retrieve information from shared memory accessible to all agents. \
         Use for coordination, handoffs, and persistent data storage."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["action"],
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["store", "search", "get", "get_recent", "get_task_history", "update", "get_stats"],
                    "description": "The action to perform on shared memory"
                },
                "category": {
                    "type": "string",
                    "enum": CATEGORIES,
                    "description": "Category of the information (required for store)"
                },
                "title": {"type": "string", "description": "Brief title (required for store)"},
                "content": {"type": "string", "description": "Main content (required for store)"},
                "tags": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Tags for categorization and search"
                },
                "metadata": {
                    "type": "object",
                    "additionalProperties": true,
                    "description": "Additional structured metadata"
                },
                "entry_id": {"type": "string", "description": "Entry to get or update"},
                "search_category": {"type": "string", "description": "Category to search within"},
                "search_tags": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Match entries sharing any of these tags"
                },
                "search_content": {"type": "string", "description": "Case-insensitive text to find in content"},
                "search_agent": {"type": "string", "description": "Only entries written by this agent"},
                "limit": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": MAX_LIMIT,
                    "default": DEFAULT_LIMIT,
                    "description": "Maximum number of results (search, get_recent)"
                }
            }
        })
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        let action = action(&args)?;
        debug!(agent = %self.agent_name, action, "shared memory action");
        match action {
            "store" => self.store(&args),
            "search" => Ok(self.search(&args)),
            "get" => self.get(&args),
            "get_recent" => Ok(self.recent(&args)),
            "get_task_history" => Ok(self.task_history()),
            "update" => self.update(&args),
            "get_stats" => Ok(self.stats()),
            other => Err(invalid_action(other)),
        }
    }
}
