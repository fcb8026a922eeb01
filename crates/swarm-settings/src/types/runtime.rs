//! Model, agent and subagent settings.

use serde::{Deserialize, Serialize};

/// Chat-completion parameters and endpoint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelSettings {
    /// Provider model id, e.g. `openai/gpt-5`.
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    /// Context budget enforced by truncation and compaction.
    pub context_window_tokens: i64,
    /// OpenAI-compatible API root.
    pub base_url: String,
    /// Per-request HTTP timeout.
    pub request_timeout_secs: u64,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model: "openai/gpt-5".to_string(),
            max_tokens: 8192,
            temperature: 1.0,
            context_window_tokens: 80_000,
            base_url: "https://openrouter.ai/api/v1".to_string(),
            request_timeout_secs: 600,
        }
    }
}

/// Top-level agent settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentSettings {
    /// Name used in logs and as the coordination-store author.
    pub name: String,
    /// Task id the agent records coordination entries under.
    pub task_id: String,
    /// Prompt sent on each cycle when none is given on the command line.
    pub default_prompt: String,
    /// Run the tool calls of one turn concurrently.
    pub parallel_tools: bool,
    /// Upper bound for a single tool invocation.
    pub tool_timeout_secs: u64,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            name: "Orchestrator".to_string(),
            task_id: "multi_agent_session".to_string(),
            default_prompt: "Be creative in how you forecast!".to_string(),
            parallel_tools: true,
            tool_timeout_secs: 600,
        }
    }
}

/// Defaults for subagents created through the management tool.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubagentSettings {
    pub max_iterations: u32,
    pub max_total_tokens: u64,
    pub max_tokens: u32,
    /// Require the report tool before a run counts as successful.
    pub require_termination_tool: bool,
}

impl Default for SubagentSettings {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            max_total_tokens: 50_000,
            max_tokens: 4096,
            require_termination_tool: false,
        }
    }
}
