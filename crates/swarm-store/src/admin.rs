//! Administrative operations over [`SharedMemory`].
//!
//! Everything here is built from `search` and `delete`, so each step goes
//! through the store's lock like any other caller.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;
use crate::memory::{MemoryEntry, MemoryQuery, SharedMemory};

/// File written by [`SharedMemory::export_task`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskExport {
    pub task_id: String,
    pub export_timestamp: DateTime<Utc>,
    pub entries: Vec<MemoryEntry>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TaskSummary {
    pub task_id: String,
    pub total_entries: usize,
    pub total_content_chars: usize,
    pub by_category: BTreeMap<String, usize>,
    pub by_agent: BTreeMap<String, usize>,
    pub earliest: DateTime<Utc>,
    pub latest: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClearOutcome {
    pub matched: usize,
    pub deleted: usize,
}

impl SharedMemory {
    /// Write every entry of a task to `path`. `Ok(false)` when the task has no entries.
    pub fn export_task(&self, task_id: &str, path: &Path) -> Result<bool> {
        let entries = self.task_history(task_id);
        if entries.is_empty() {
            return Ok(false);
        }
        let export = TaskExport {
            task_id: task_id.to_string(),
            export_timestamp: Utc::now(),
            entries,
        };
        std::fs::write(path, serde_json::to_vec_pretty(&export)?)?;
        info!(task_id, path = %path.display(), count = export.entries.len(), "task exported");
        Ok(true)
    }

    /// Delete every entry of a task.
    pub fn clear_task(&self, task_id: &str) -> Result<ClearOutcome> {
        let entries = self.task_history(task_id);
        let mut deleted = 0;
        for entry in &entries {
            if self.delete(&entry.id)? {
                deleted += 1;
            }
        }
        Ok(ClearOutcome {
            matched: entries.len(),
            deleted,
        })
    }

    pub fn task_summary(&self, task_id: &str) -> Option<TaskSummary> {
        let entries = self.task_history(task_id);
        let latest = entries.first()?.timestamp;
        let earliest = entries.last()?.timestamp;

        let mut by_category = BTreeMap::new();
        let mut by_agent = BTreeMap::new();
        let mut total_content_chars = 0;
        for entry in &entries {
            *by_category.entry(entry.category.clone()).or_insert(0) += 1;
            *by_agent.entry(entry.agent_name.clone()).or_insert(0) += 1;
            total_content_chars += entry.content.chars().count();
        }

        Some(TaskSummary {
            task_id: task_id.to_string(),
            total_entries: entries.len(),
            total_content_chars,
            by_category,
            by_agent,
            earliest,
            latest,
        })
    }

    /// Delete entries last touched more than `days` days ago. Returns how many went.
    pub fn cleanup_older_than(&self, days: u32) -> Result<usize> {
        self.cleanup_before(Utc::now() - Duration::days(i64::from(days)))
    }

    pub fn cleanup_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let stale: Vec<String> = self
            .search(&MemoryQuery::new())
            .into_iter()
            .filter(|e| e.timestamp < cutoff)
            .map(|e| e.id)
            .collect();
        let mut deleted = 0;
        for id in &stale {
            if self.delete(id)? {
                deleted += 1;
            }
        }
        if deleted > 0 {
            info!(deleted, cutoff = %cutoff, "old memory entries removed");
        }
        Ok(deleted)
    }
}
