use std::collections::HashMap;
use std::sync::Arc;

use swarm_core::tools::{Tool, ToolDefinition};

/// Where a registered tool came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToolSource {
    BuiltIn,
    /// Backed by the shared coordination store.
    Coordination,
    /// Granted for a single run only.
    Transient,
}

impl ToolSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BuiltIn => "built_in",
            Self::Coordination => "coordination",
            Self::Transient => "transient",
        }
    }
}

#[derive(Clone)]
struct ToolEntry {
    tool: Arc<dyn Tool>,
    source: ToolSource,
}

/// Name-keyed set of tools an agent may call.
///
/// Cloning is cheap: entries share the underlying `Arc<dyn Tool>`.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolEntry>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any tool of the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>, source: ToolSource) {
        let name = tool.name().to_string();
        self.tools.insert(name, ToolEntry { tool, source });
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).map(|e| Arc::clone(&e.tool))
    }

    pub fn source(&self, name: &str) -> Option<ToolSource> {
        self.tools.get(name).map(|e| e.source)
    }

    /// A copy with `extra` registered as [`ToolSource::Transient`] on top.
    pub fn with_transient(&self, extra: Vec<Arc<dyn Tool>>) -> Self {
        let mut tools = self.clone();
        for tool in extra {
            tools.register(tool, ToolSource::Transient);
        }
        tools
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Tool names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Definitions advertised to the model, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .tools
            .values()
            .map(|e| e.tool.to_definition())
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    pub fn count(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
