//! Settings type definitions.
//!
//! Field names are camelCase on disk. Every section is `#[serde(default)]`,
//! so a partial settings file only needs the keys it overrides.

mod runtime;
mod storage;

pub use runtime::*;
pub use storage::*;

use serde::{Deserialize, Serialize};

/// Root settings type.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SwarmSettings {
    /// Model and endpoint used by the top-level agent.
    pub model: ModelSettings,
    /// Top-level agent behavior.
    pub agent: AgentSettings,
    /// Defaults applied to subagents created at runtime.
    pub subagent: SubagentSettings,
    /// Coordination store location and persistence.
    pub memory: MemorySettings,
    /// Log output.
    pub logging: LoggingSettings,
}
