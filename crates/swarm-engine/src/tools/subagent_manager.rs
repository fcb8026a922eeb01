use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use swarm_core::provider::ChatModel;
use swarm_core::tools::{optional_str, require_str, Tool, ToolError};
use swarm_store::SharedMemory;

use super::{action, invalid_action, preview, ReportResultsTool, RequestGuidanceTool, SharedMemoryTool, DEFAULT_TASK_ID};
use crate::agent::{Agent, ModelConfig};
use crate::dispatch::ToolDispatcher;
use crate::error::EngineError;
use crate::orchestrator::{render_report, SubagentManager, SubagentTask, TaskOutcome};
use crate::registry::{ToolRegistry, ToolSource};
use crate::subagent::{Subagent, SubagentConfig};

const RUN_PROMPT: &str =
    "Run with the task you have been given. Return the relevant information using the memory tool.";
const TERMINATION_TOOL: &str = "report_results";
const SHARED_MEMORY_TOOL: &str = "shared_memory";
const GUIDANCE_TOOL: &str = "request_guidance";

/// Settings applied to every subagent the tool creates.
#[derive(Clone, Debug)]
pub struct SubagentDefaults {
    pub model: ModelConfig,
    pub limits: SubagentConfig,
    pub task_id: String,
    pub dispatcher: ToolDispatcher,
}

impl Default for SubagentDefaults {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            limits: SubagentConfig::default(),
            task_id: DEFAULT_TASK_ID.into(),
            dispatcher: ToolDispatcher::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TaskArg {
    name: String,
    #[serde(default)]
    task: Option<String>,
}

/// Lets the orchestrator create, run and remove subagents.
pub struct SubagentManagerTool {
    manager: Arc<SubagentManager>,
    model: Arc<dyn ChatModel>,
    memory: Arc<SharedMemory>,
    catalog: ToolRegistry,
    defaults: SubagentDefaults,
}

impl SubagentManagerTool {
    pub fn new(
        manager: Arc<SubagentManager>,
        model: Arc<dyn ChatModel>,
        memory: Arc<SharedMemory>,
        catalog: ToolRegistry,
    ) -> Self {
        Self {
            manager,
            model,
            memory,
            catalog,
            defaults: SubagentDefaults::default(),
        }
    }

    pub fn with_defaults(mut self, defaults: SubagentDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn manager(&self) -> &Arc<SubagentManager> {
        &self.manager
    }

    /// Tool names a subagent may be granted.
    pub fn available_tools(&self) -> Vec<String> {
        let mut names = self.catalog.names();
        names.push(GUIDANCE_TOOL.into());
        names.push(SHARED_MEMORY_TOOL.into());
        names.sort();
        names.dedup();
        names
    }

    /// Tools for a new subagent: the requested catalog tools plus its own
    /// shared memory handle and the termination tool.
    fn tools_for(&self, name: &str, requested: &[String]) -> Result<ToolRegistry, ToolError> {
        let task_id = &self.defaults.task_id;
        let mut registry = ToolRegistry::new();
        for tool in requested {
            match tool.as_str() {
                SHARED_MEMORY_TOOL | TERMINATION_TOOL => {}
                GUIDANCE_TOOL => registry.register(
                    Arc::new(RequestGuidanceTool::new(Arc::clone(&self.memory), name, task_id)),
                    ToolSource::Coordination,
                ),
                other => {
                    let found = self
                        .catalog
                        .get(other)
                        .ok_or_else(|| ToolError::ExecutionFailed(format!("Tool '{other}' not available")))?;
                    registry.register(found, ToolSource::BuiltIn);
                }
            }
        }
        registry.register(
            Arc::new(SharedMemoryTool::new(Arc::clone(&self.memory), name, task_id)),
            ToolSource::Coordination,
        );
        registry.register(
            Arc::new(ReportResultsTool::new(Arc::clone(&self.memory), name, task_id)),
            ToolSource::Coordination,
        );
        Ok(registry)
    }

    fn create(&self, args: &Value) -> Result<String, ToolError> {
        let name = require_str(args, "name")?;
        let system_prompt = require_str(args, "system_prompt")?;
        if self.manager.contains(name) {
            return Err(ToolError::ExecutionFailed(format!("Subagent '{name}' already exists")));
        }
        let requested: Vec<String> = match &args["tools"] {
            Value::Null => Vec::new(),
            value => serde_json::from_value(value.clone())
                .map_err(|e| ToolError::InvalidArguments(format!("tools: {e}")))?,
        };
        let tools = self.tools_for(name, &requested)?;
        let tool_count = tools.count();

        let mut model = self.defaults.model.clone();
        if let Some(id) = optional_str(args, "model") {
            model.model = id.to_string();
        }
        let mut limits = self.defaults.limits.clone();
        if let Some(n) = args["max_iterations"].as_u64() {
            limits.max_iterations = u32::try_from(n).unwrap_or(u32::MAX);
        }
        if let Some(n) = args["max_total_tokens"].as_u64() {
            limits.max_total_tokens = n;
        }
        if !limits.termination_tools.iter().any(|t| t == TERMINATION_TOOL) {
            limits.termination_tools.push(TERMINATION_TOOL.into());
        }

        let agent = Agent::new(name, system_prompt, Arc::clone(&self.model), model)
            .with_tools(tools)
            .with_dispatcher(self.defaults.dispatcher.clone());
        self.manager
            .create(Subagent::new(agent, limits))
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;

        info!(subagent = %name, tools = tool_count, "subagent created by orchestrator");
        Ok(format!("Successfully created subagent '{name}' with {tool_count} tools"))
    }

    async fn run(&self, args: &Value) -> Result<String, ToolError> {
        let name = require_str(args, "name")?;
        let task = optional_str(args, "task").unwrap_or(RUN_PROMPT);
        match self.manager.run(name, task).await {
            Ok(report) => Ok(render_report(name, &report)),
            Err(e @ EngineError::UnknownSubagent(_)) => Err(ToolError::ExecutionFailed(e.to_string())),
            Err(e) => Err(ToolError::ExecutionFailed(format!(
                "Failed to run subagent '{name}': {e}"
            ))),
        }
    }

    async fn run_many(&self, args: &Value, parallel: bool) -> Result<String, ToolError> {
        let raw: Vec<TaskArg> = serde_json::from_value(args["tasks"].clone())
            .map_err(|e| ToolError::InvalidArguments(format!("tasks: {e}")))?;
        if raw.is_empty() {
            return Err(ToolError::InvalidArguments("tasks must not be empty".into()));
        }
        let tasks: Vec<SubagentTask> = raw
            .into_iter()
            .map(|t| SubagentTask::new(t.name, t.task.unwrap_or_else(|| RUN_PROMPT.into())))
            .collect();

        let outcomes = if parallel {
            self.manager.run_parallel(tasks).await
        } else {
            self.manager.run_batch(tasks).await
        }
        .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;

        Ok(render_outcomes(&outcomes, parallel))
    }

    fn delete(&self, args: &Value) -> Result<String, ToolError> {
        let name = require_str(args, "name")?;
        if self.manager.delete(name) {
            Ok(format!("Successfully deleted subagent '{name}'"))
        } else {
            Err(ToolError::ExecutionFailed(
                EngineError::UnknownSubagent(name.to_string()).to_string(),
            ))
        }
    }

    fn list(&self) -> String {
        let names = self.manager.names();
        if names.is_empty() {
            return "No subagents exist".into();
        }
        let lines: Vec<String> = names
            .iter()
            .filter_map(|name| {
                let subagent = self.manager.get(name)?;
                let line = match subagent.try_lock() {
                    Ok(guard) => format!("- {name}: {}", preview(guard.agent().system(), 100)),
                    Err(_) => format!("- {name}: (running)"),
                };
                Some(line)
            })
            .collect();
        format!("Existing subagents:\n{}", lines.join("\n"))
    }
}

fn render_outcomes(outcomes: &[TaskOutcome], parallel: bool) -> String {
    let succeeded = outcomes.iter().filter(|o| o.succeeded()).count();
    let mode = if parallel { "in parallel" } else { "in sequence" };
    let blocks: Vec<String> = outcomes.iter().map(TaskOutcome::render).collect();
    format!(
        "Ran {} subagents {mode} ({succeeded} succeeded):\n\n{}",
        outcomes.len(),
        blocks.join("\n\n")
    )
}

#[async_trait]
impl Tool for SubagentManagerTool {
    fn name(&self) -> &str {
        "subagent_manager"
    }

    fn description(&self) -> &str {
        "Manage subagents with specific capabilities and goals. Create them with a system prompt and \
         tools, run them alone, in parallel or in sequence, list them and delete them. Every subagent \
         gets shared_memory and finishes by calling report_results."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["action"],
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["create", "run", "run_parallel", "run_batch", "delete", "list"],
                    "description": "The action to perform on subagents"
                },
                "name": {
                    "type": "string",
                    "description": "Unique subagent name (create, run, delete)"
                },
                "system_prompt": {
                    "type": "string",
                    "description": "The subagent's role and goals (create)"
                },
                "tools": {
                    "type": "array",
                    "items": {"type": "string", "enum": self.available_tools()},
                    "description": "Tools the subagent may use (create)"
                },
                "model": {
                    "type": "string",
                    "description": "Model override for this subagent (create)"
                },
                "max_iterations": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "Iteration limit override (create)"
                },
                "max_total_tokens": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "Token budget override (create)"
                },
                "task": {
                    "type": "string",
                    "description": "Input for the run (run); without it the subagent is told to work on the task in its system prompt and report through shared memory"
                },
                "tasks": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "required": ["name"],
                        "properties": {
                            "name": {"type": "string"},
                            "task": {"type": "string"}
                        }
                    },
                    "description": "Subagents to run with their tasks (run_parallel, run_batch)"
                }
            }
        })
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        match action(&args)? {
            "create" => self.create(&args),
            "run" => self.run(&args).await,
            "run_parallel" => self.run_many(&args, true).await,
            "run_batch" => self.run_many(&args, false).await,
            "delete" => self.delete(&args),
            "list" => Ok(self.list()),
            other => Err(invalid_action(other)),
        }
    }
}
