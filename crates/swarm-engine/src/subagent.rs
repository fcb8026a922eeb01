use std::fmt;

use serde::Serialize;
use tracing::{info, instrument};

use swarm_core::messages::{AssistantMessage, ToolCall};

use crate::agent::{Agent, ContextStrategy};
use crate::error::EngineError;
use crate::registry::ToolRegistry;

const TERMINATION_TOOL_MISSING: &str = "termination_tool_required_but_not_called";

/// Limits a subagent runs under.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SubagentConfig {
    pub max_iterations: u32,
    pub max_total_tokens: u64,
    /// Calling any of these ends the run successfully.
    pub termination_tools: Vec<String>,
    /// Treat every other ending as a failure when termination tools are set.
    pub require_termination_tool: bool,
}

impl Default for SubagentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            max_total_tokens: 50_000,
            termination_tools: Vec::new(),
            require_termination_tool: false,
        }
    }
}

/// Why a subagent run stopped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TerminationReason {
    MaxIterations(u32),
    MaxTokens { used: u64, limit: u64 },
    TerminationTool(String),
    NaturalCompletion,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MaxIterations(limit) => write!(f, "max_iterations_reached ({limit})"),
            Self::MaxTokens { used, limit } => write!(f, "max_tokens_reached ({used}/{limit})"),
            Self::TerminationTool(name) => write!(f, "termination_tool_called ({name})"),
            Self::NaturalCompletion => f.write_str("natural_completion"),
        }
    }
}

/// Counters of one run. Reset at the start of every run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExecutionState {
    pub iteration_count: u32,
    pub total_tokens_used: u64,
    pub termination_reason: Option<TerminationReason>,
    pub completed_successfully: bool,
    pub termination_tool_missing: bool,
}

impl ExecutionState {
    /// Reason text, with the missing-termination-tool suffix when it applies.
    pub fn reason_text(&self) -> Option<String> {
        self.termination_reason.as_ref().map(|reason| {
            if self.termination_tool_missing {
                format!("{reason} ({TERMINATION_TOOL_MISSING})")
            } else {
                reason.to_string()
            }
        })
    }
}

/// Outcome of [`Subagent::run`].
#[derive(Clone, Debug)]
pub struct SubagentReport {
    /// Last reply of the model; `None` if a limit hit before the first call.
    pub final_message: Option<AssistantMessage>,
    pub state: ExecutionState,
}

impl SubagentReport {
    pub fn completed_successfully(&self) -> bool {
        self.state.completed_successfully
    }

    pub fn termination_reason(&self) -> String {
        self.state.reason_text().unwrap_or_default()
    }

    pub fn final_text(&self) -> &str {
        self.final_message
            .as_ref()
            .map(AssistantMessage::text_content)
            .unwrap_or_default()
    }
}

/// Snapshot returned by [`Subagent::status`].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SubagentStatus {
    pub iteration_count: u32,
    pub total_tokens_used: u64,
    pub termination_reason: Option<String>,
    pub completed_successfully: bool,
    pub max_iterations: u32,
    pub max_total_tokens: u64,
    pub termination_tools: Vec<String>,
    pub require_termination_tool: bool,
}

/// An agent run under iteration, token and termination-tool limits.
pub struct Subagent {
    agent: Agent,
    config: SubagentConfig,
    state: ExecutionState,
}

impl Subagent {
    /// Wrap an agent. Subagents truncate history instead of compacting it.
    pub fn new(agent: Agent, config: SubagentConfig) -> Self {
        Self {
            agent: agent.with_strategy(ContextStrategy::Truncate),
            config,
            state: ExecutionState::default(),
        }
    }

    pub fn name(&self) -> &str {
        self.agent.name()
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    pub fn config(&self) -> &SubagentConfig {
        &self.config
    }

    pub fn status(&self) -> SubagentStatus {
        SubagentStatus {
            iteration_count: self.state.iteration_count,
            total_tokens_used: self.state.total_tokens_used,
            termination_reason: self.state.reason_text(),
            completed_successfully: self.state.completed_successfully,
            max_iterations: self.config.max_iterations,
            max_total_tokens: self.config.max_total_tokens,
            termination_tools: self.config.termination_tools.clone(),
            require_termination_tool: self.config.require_termination_tool,
        }
    }

    /// Run one task. Remote failures are returned as errors; every limit
    /// ending is a report.
    #[instrument(skip_all, fields(subagent = %self.agent.name()))]
    pub async fn run(&mut self, input: &str) -> Result<SubagentReport, EngineError> {
        self.state = ExecutionState::default();
        let tools = self.agent.tools().clone();
        let final_message = self.drive(input, &tools).await?;

        let fired_tool = matches!(
            self.state.termination_reason,
            Some(TerminationReason::TerminationTool(_))
        );
        if self.config.require_termination_tool
            && !self.config.termination_tools.is_empty()
            && !fired_tool
        {
            self.state.completed_successfully = false;
            self.state.termination_tool_missing = true;
        }

        info!(
            reason = %self.state.reason_text().unwrap_or_default(),
            success = self.state.completed_successfully,
            iterations = self.state.iteration_count,
            tokens = self.state.total_tokens_used,
            "subagent finished"
        );
        Ok(SubagentReport {
            final_message,
            state: self.state.clone(),
        })
    }

    async fn drive(
        &mut self,
        input: &str,
        tools: &ToolRegistry,
    ) -> Result<Option<AssistantMessage>, EngineError> {
        self.agent.push_user(input);

        let mut last = None;
        let mut turn = 0u32;
        loop {
            if let Some(reason) = self.limit_reached() {
                self.state.termination_reason = Some(reason);
                return Ok(last);
            }

            turn += 1;
            self.agent.prepare_context().await;
            let response = self.agent.complete_turn(turn, tools).await?;
            if let Some(usage) = response.usage {
                self.state.total_tokens_used += usage.total_tokens;
            }
            let message = response.message;

            if !message.has_tool_calls() {
                self.state.completed_successfully = true;
                self.state.termination_reason = Some(TerminationReason::NaturalCompletion);
                return Ok(Some(message));
            }

            let stop = self
                .limit_reached()
                .or_else(|| self.termination_tool(&message.tool_calls));
            let results = self.agent.execute_tools(tools, &message.tool_calls).await;
            self.agent.push_tool_results(results);

            if let Some(reason) = stop {
                self.state.completed_successfully =
                    matches!(reason, TerminationReason::TerminationTool(_));
                self.state.termination_reason = Some(reason);
                return Ok(Some(message));
            }
            self.state.iteration_count += 1;
            last = Some(message);
        }
    }

    fn limit_reached(&self) -> Option<TerminationReason> {
        if self.state.iteration_count >= self.config.max_iterations {
            return Some(TerminationReason::MaxIterations(self.config.max_iterations));
        }
        if self.state.total_tokens_used >= self.config.max_total_tokens {
            return Some(TerminationReason::MaxTokens {
                used: self.state.total_tokens_used,
                limit: self.config.max_total_tokens,
            });
        }
        None
    }

    fn termination_tool(&self, calls: &[ToolCall]) -> Option<TerminationReason> {
        self.config
            .termination_tools
            .iter()
            .find(|name| calls.iter().any(|c| &c.name == *name))
            .map(|name| TerminationReason::TerminationTool(name.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::{json, Value};
    use swarm_core::errors::GatewayError;
    use swarm_core::messages::Message;
    use swarm_core::tools::{Tool, ToolError};
    use swarm_llm::{MockModel, MockResponse};

    use crate::agent::ModelConfig;
    use crate::registry::ToolSource;

    struct Named(&'static str);

    #[async_trait]
    impl Tool for Named {
        fn name(&self) -> &str {
            self.0
        }
        fn description(&self) -> &str {
            "test tool"
        }
        fn input_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, _args: Value) -> Result<String, ToolError> {
            Ok(format!("{} ran", self.0))
        }
    }

    fn subagent(model: Arc<MockModel>, config: SubagentConfig) -> Subagent {
        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(Named("search")), ToolSource::BuiltIn);
        tools.register(Arc::new(Named("report_results")), ToolSource::Coordination);
        let agent = Agent::new("researcher", "Find things.", model, ModelConfig::default())
            .with_tools(tools);
        Subagent::new(agent, config)
    }

    fn always_searching() -> MockResponse {
        MockResponse::tool_calls(vec![("search", json!({"q": "x"}))])
    }

    #[tokio::test]
    async fn stops_at_max_iterations() {
        let model = Arc::new(MockModel::repeating(always_searching()));
        let config = SubagentConfig {
            max_iterations: 2,
            ..SubagentConfig::default()
        };
        let mut sub = subagent(model.clone(), config);

        let report = sub.run("go").await.unwrap();
        assert_eq!(report.state.iteration_count, 2);
        assert_eq!(report.termination_reason(), "max_iterations_reached (2)");
        assert!(!report.completed_successfully());
        assert_eq!(model.call_count(), 2);
        assert!(report.final_message.is_some());
    }

    #[tokio::test]
    async fn termination_tool_ends_successfully_after_running() {
        let model = Arc::new(MockModel::new(vec![
            always_searching(),
            MockResponse::tool_calls(vec![
                ("search", json!({})),
                ("report_results", json!({"task_status": "completed", "findings": "x"})),
            ]),
        ]));
        let config = SubagentConfig {
            termination_tools: vec!["report_results".into()],
            ..SubagentConfig::default()
        };
        let mut sub = subagent(model.clone(), config);

        let report = sub.run("go").await.unwrap();
        assert!(report.completed_successfully());
        assert_eq!(report.termination_reason(), "termination_tool_called (report_results)");
        assert_eq!(report.state.iteration_count, 1);
        assert_eq!(model.call_count(), 2);

        let last = sub.agent().history().messages().last().unwrap();
        assert!(matches!(last, Message::Tool(t) if t.content == "report_results ran"));
    }

    #[tokio::test]
    async fn token_budget_is_checked_after_each_call() {
        let model = Arc::new(MockModel::repeating(always_searching().with_usage(20, 10)));
        let config = SubagentConfig {
            max_total_tokens: 50,
            ..SubagentConfig::default()
        };
        let mut sub = subagent(model.clone(), config);

        let report = sub.run("go").await.unwrap();
        assert_eq!(report.termination_reason(), "max_tokens_reached (60/50)");
        assert_eq!(report.state.total_tokens_used, 60);
        assert_eq!(report.state.iteration_count, 1);
        assert!(!report.completed_successfully());
        // the second batch of calls still ran
        assert!(matches!(
            sub.agent().history().messages().last(),
            Some(Message::Tool(_))
        ));
    }

    #[tokio::test]
    async fn natural_completion() {
        let model = Arc::new(MockModel::new(vec![always_searching(), MockResponse::text("all done")]));
        let mut sub = subagent(model, SubagentConfig::default());

        let report = sub.run("go").await.unwrap();
        assert!(report.completed_successfully());
        assert_eq!(report.termination_reason(), "natural_completion");
        assert_eq!(report.final_text(), "all done");
    }

    #[tokio::test]
    async fn required_termination_tool_downgrades_other_endings() {
        let model = Arc::new(MockModel::new(vec![MockResponse::text("finished early")]));
        let config = SubagentConfig {
            termination_tools: vec!["report_results".into()],
            require_termination_tool: true,
            ..SubagentConfig::default()
        };
        let mut sub = subagent(model, config);

        let report = sub.run("go").await.unwrap();
        assert!(!report.completed_successfully());
        assert_eq!(
            report.termination_reason(),
            "natural_completion (termination_tool_required_but_not_called)"
        );
    }

    #[tokio::test]
    async fn counters_reset_between_runs() {
        let model = Arc::new(MockModel::new(vec![
            always_searching().with_usage(100, 5),
            MockResponse::text("one").with_usage(200, 5),
            MockResponse::text("two").with_usage(300, 5),
        ]));
        let mut sub = subagent(model, SubagentConfig::default());

        let first = sub.run("a").await.unwrap();
        assert_eq!(first.state.iteration_count, 1);
        assert_eq!(first.state.total_tokens_used, 310);

        let second = sub.run("b").await.unwrap();
        assert_eq!(second.state.iteration_count, 0);
        assert_eq!(second.state.total_tokens_used, 305);

        let status = sub.status();
        assert_eq!(status.iteration_count, 0);
        assert_eq!(status.total_tokens_used, 305);
        assert_eq!(status.termination_reason.as_deref(), Some("natural_completion"));
        assert_eq!(status.max_iterations, 10);
        assert_eq!(status.max_total_tokens, 50_000);
    }

    #[tokio::test]
    async fn zero_token_budget_never_calls_the_model() {
        let model = Arc::new(MockModel::repeating(MockResponse::text("unused")));
        let config = SubagentConfig {
            max_total_tokens: 0,
            ..SubagentConfig::default()
        };
        let mut sub = subagent(model.clone(), config);

        let report = sub.run("go").await.unwrap();
        assert_eq!(report.termination_reason(), "max_tokens_reached (0/0)");
        assert!(report.final_message.is_none());
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test]
    async fn remote_failures_propagate() {
        let model = Arc::new(MockModel::new(vec![MockResponse::Error(GatewayError::ServerError {
            status: 502,
            body: "bad gateway".into(),
        })]));
        let mut sub = subagent(model, SubagentConfig::default());
        assert!(matches!(sub.run("go").await, Err(EngineError::Gateway(_))));
        assert_eq!(sub.agent().tools().count(), 2);
    }

    #[test]
    fn subagents_truncate_instead_of_compacting() {
        let model = Arc::new(MockModel::new(Vec::new()));
        let sub = subagent(model, SubagentConfig::default());
        assert_eq!(sub.agent().strategy(), ContextStrategy::Truncate);
    }
}
