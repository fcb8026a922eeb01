use std::sync::Arc;

use dashmap::DashMap;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};

use crate::error::EngineError;
use crate::subagent::{Subagent, SubagentReport};

/// One unit of work for [`SubagentManager::run_parallel`] or [`SubagentManager::run_batch`].
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct SubagentTask {
    pub name: String,
    pub task: String,
}

impl SubagentTask {
    pub fn new(name: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            task: task.into(),
        }
    }
}

/// Result of one task in a fan-out. Failures are values, not errors.
#[derive(Debug)]
pub struct TaskOutcome {
    pub name: String,
    pub result: Result<SubagentReport, String>,
}

impl TaskOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(&self.result, Ok(report) if report.completed_successfully())
    }

    pub fn render(&self) -> String {
        match &self.result {
            Ok(report) => render_report(&self.name, report),
            Err(e) => format!("Subagent '{}' failed: {e}", self.name),
        }
    }
}

/// Human-readable summary of a finished run.
pub fn render_report(name: &str, report: &SubagentReport) -> String {
    let mut out = format!(
        "Subagent '{name}' finished\n\
         - Reason: {}\n\
         - Success: {}\n\
         - Iterations: {}\n\
         - Tokens: {}",
        report.termination_reason(),
        report.completed_successfully(),
        report.state.iteration_count,
        report.state.total_tokens_used,
    );
    let text = report.final_text().trim();
    if !text.is_empty() {
        out.push_str("\n- Final message: ");
        out.push_str(text);
    }
    out
}

/// Named subagents owned by the orchestrator.
///
/// Each subagent sits behind its own async mutex so different subagents run
/// concurrently while one subagent never runs twice at once.
#[derive(Default)]
pub struct SubagentManager {
    subagents: DashMap<String, Arc<Mutex<Subagent>>>,
}

impl SubagentManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, subagent: Subagent) -> Result<(), EngineError> {
        let name = subagent.name().to_string();
        match self.subagents.entry(name.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(EngineError::SubagentExists(name)),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Arc::new(Mutex::new(subagent)));
                info!(subagent = %name, "subagent created");
                Ok(())
            }
        }
    }

    pub fn delete(&self, name: &str) -> bool {
        let removed = self.subagents.remove(name).is_some();
        if removed {
            info!(subagent = %name, "subagent deleted");
        }
        removed
    }

    pub fn contains(&self, name: &str) -> bool {
        self.subagents.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.subagents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subagents.is_empty()
    }

    /// Names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.subagents.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn get(&self, name: &str) -> Option<Arc<Mutex<Subagent>>> {
        self.subagents.get(name).map(|e| Arc::clone(e.value()))
    }

    /// Run one subagent on `task`.
    #[instrument(skip(self, task))]
    pub async fn run(&self, name: &str, task: &str) -> Result<SubagentReport, EngineError> {
        let subagent = self
            .get(name)
            .ok_or_else(|| EngineError::UnknownSubagent(name.to_string()))?;
        let mut guard = subagent.lock().await;
        guard.run(task).await
    }

    /// Run every task concurrently. All names are checked before anything
    /// starts; outcomes come back in task order.
    pub async fn run_parallel(&self, tasks: Vec<SubagentTask>) -> Result<Vec<TaskOutcome>, EngineError> {
        let resolved = self.resolve(&tasks)?;
        info!(tasks = tasks.len(), "running subagents in parallel");

        let handles: Vec<_> = tasks
            .iter()
            .zip(resolved)
            .map(|(task, subagent)| {
                let input = task.task.clone();
                tokio::spawn(async move { subagent.lock().await.run(&input).await })
            })
            .collect();

        let mut outcomes = Vec::with_capacity(tasks.len());
        for (task, handle) in tasks.into_iter().zip(handles) {
            let result = match handle.await {
                Ok(Ok(report)) => Ok(report),
                Ok(Err(e)) => {
                    warn!(subagent = %task.name, kind = e.kind(), error = %e, "subagent run failed");
                    Err(e.to_string())
                }
                Err(join_err) => {
                    error!(subagent = %task.name, error = %join_err, "subagent task aborted");
                    Err(format!("subagent task aborted: {join_err}"))
                }
            };
            outcomes.push(TaskOutcome {
                name: task.name,
                result,
            });
        }
        Ok(outcomes)
    }

    /// Run every task one after another; a failure does not stop the rest.
    pub async fn run_batch(&self, tasks: Vec<SubagentTask>) -> Result<Vec<TaskOutcome>, EngineError> {
        let resolved = self.resolve(&tasks)?;
        info!(tasks = tasks.len(), "running subagents in sequence");

        let mut outcomes = Vec::with_capacity(tasks.len());
        for (task, subagent) in tasks.into_iter().zip(resolved) {
            let result = subagent.lock().await.run(&task.task).await.map_err(|e| {
                warn!(subagent = %task.name, kind = e.kind(), error = %e, "subagent run failed");
                e.to_string()
            });
            outcomes.push(TaskOutcome {
                name: task.name,
                result,
            });
        }
        Ok(outcomes)
    }

    /// Look up every task's subagent, reporting all unknown names together.
    fn resolve(&self, tasks: &[SubagentTask]) -> Result<Vec<Arc<Mutex<Subagent>>>, EngineError> {
        let mut found = Vec::with_capacity(tasks.len());
        let mut missing = Vec::new();
        for task in tasks {
            match self.get(&task.name) {
                Some(subagent) => found.push(subagent),
                None if !missing.contains(&task.name) => missing.push(task.name.clone()),
                None => {}
            }
        }
        if missing.is_empty() {
            Ok(found)
        } else {
            Err(EngineError::MissingSubagents(missing))
        }
    }
}
