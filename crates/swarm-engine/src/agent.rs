use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use swarm_core::messages::{
    extract_text_reasoning, AssistantMessage, Message, MessageInput, Role, ToolCall, ToolResult,
};
use swarm_core::provider::{ChatModel, ChatRequest, ChatResponse};
use swarm_core::tools::Tool;

use crate::context::history::DEFAULT_KEEP_RECENT;
use crate::context::{ConversationStore, ModelSummarizer, Summarizer};
use crate::dispatch::ToolDispatcher;
use crate::error::EngineError;
use crate::registry::ToolRegistry;

/// Model parameters sent with every request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub context_window_tokens: i64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: "openai/gpt-5".into(),
            max_tokens: 8192,
            temperature: 1.0,
            context_window_tokens: 80_000,
        }
    }
}

/// How history is brought back under budget before each turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContextStrategy {
    /// Summarize older history past 90% of the window.
    Compact { keep_recent: usize },
    /// Drop the oldest messages once over the window.
    Truncate,
}

impl Default for ContextStrategy {
    fn default() -> Self {
        Self::Compact {
            keep_recent: DEFAULT_KEEP_RECENT,
        }
    }
}

/// One model-driven agent: its prompt, tools and conversation.
pub struct Agent {
    name: String,
    config: ModelConfig,
    model: Arc<dyn ChatModel>,
    tools: ToolRegistry,
    history: ConversationStore,
    dispatcher: ToolDispatcher,
    strategy: ContextStrategy,
    summarizer: Arc<dyn Summarizer>,
}

impl Agent {
    pub fn new(
        name: impl Into<String>,
        system: impl Into<String>,
        model: Arc<dyn ChatModel>,
        config: ModelConfig,
    ) -> Self {
        let summarizer = Arc::new(ModelSummarizer::new(Arc::clone(&model), config.clone()));
        Self {
            name: name.into(),
            history: ConversationStore::new(system, config.context_window_tokens),
            config,
            model,
            tools: ToolRegistry::new(),
            dispatcher: ToolDispatcher::default(),
            strategy: ContextStrategy::default(),
            summarizer,
        }
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: ToolDispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn with_strategy(mut self, strategy: ContextStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = summarizer;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn system(&self) -> &str {
        self.history.system()
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn history(&self) -> &ConversationStore {
        &self.history
    }

    pub fn strategy(&self) -> ContextStrategy {
        self.strategy
    }

    /// Run until the model answers without tool calls; returns that answer.
    pub async fn run(&mut self, input: &str) -> Result<AssistantMessage, EngineError> {
        self.run_with(input, Vec::new()).await
    }

    /// Like [`run`](Self::run), with extra tools granted for this call only.
    ///
    /// The extras live in a per-run copy of the registry, so the agent's own
    /// tools are untouched however the run ends.
    pub async fn run_with(
        &mut self,
        input: &str,
        extra_tools: Vec<Arc<dyn Tool>>,
    ) -> Result<AssistantMessage, EngineError> {
        let tools = self.tools.with_transient(extra_tools);
        self.drive(input, &tools).await
    }

    #[instrument(skip_all, fields(agent = %self.name))]
    async fn drive(&mut self, input: &str, tools: &ToolRegistry) -> Result<AssistantMessage, EngineError> {
        debug!(input_chars = input.len(), "task received");
        self.push_user(input);

        let mut turn = 0u32;
        loop {
            turn += 1;
            self.prepare_context().await;
            let message = self.complete_turn(turn, tools).await?.message;
            if !message.has_tool_calls() {
                info!(turn, "agent finished");
                return Ok(message);
            }
            let results = self.execute_tools(tools, &message.tool_calls).await;
            self.push_tool_results(results);
        }
    }

    pub(crate) fn push_user(&mut self, input: &str) {
        self.history
            .add(MessageInput::Text(Role::User, input.to_string()), None);
    }

    pub(crate) fn push_tool_results(&mut self, results: Vec<ToolResult>) {
        self.history.add(MessageInput::ToolResults(results), None);
    }

    /// Bring history under budget according to the configured strategy.
    pub(crate) async fn prepare_context(&mut self) {
        match self.strategy {
            ContextStrategy::Compact { keep_recent } => {
                let summarizer = Arc::clone(&self.summarizer);
                self.history.compact(summarizer.as_ref(), keep_recent).await;
            }
            ContextStrategy::Truncate => {
                self.history.truncate();
            }
        }
    }

    pub(crate) fn build_request(&self, tools: &ToolRegistry) -> ChatRequest {
        let mut messages = self.history.format_for_api();
        if messages.first().map(|m| m.role) != Some(Role::System) {
            messages.insert(0, Message::system(self.history.system()).to_wire());
        }
        ChatRequest {
            model: self.config.model.clone(),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            messages,
            tools: tools.definitions(),
        }
    }

    /// Call the model once and append its reply, reasoning metadata included.
    pub(crate) async fn complete_turn(
        &mut self,
        turn: u32,
        tools: &ToolRegistry,
    ) -> Result<ChatResponse, EngineError> {
        let request = self.build_request(tools);
        debug!(
            turn,
            messages = request.messages.len(),
            estimated_tokens = self.history.total_tokens(),
            "calling model"
        );
        let response = self.model.complete(&request).await?;

        if let Some(reasoning) = response
            .message
            .reasoning_details
            .as_ref()
            .and_then(extract_text_reasoning)
        {
            debug!(turn, %reasoning, "model reasoning");
        }
        if response.message.has_tool_calls() {
            let names: Vec<&str> = response.message.tool_calls.iter().map(|tc| tc.name.as_str()).collect();
            debug!(turn, tools = ?names, "model requested tools");
        }

        self.history
            .add(MessageInput::ModelReply(response.message.clone()), response.usage);
        Ok(response)
    }

    pub(crate) async fn execute_tools(&self, tools: &ToolRegistry, calls: &[ToolCall]) -> Vec<ToolResult> {
        self.dispatcher.dispatch(tools, calls).await
    }
}
