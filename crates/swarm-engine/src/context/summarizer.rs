use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;

use swarm_core::messages::Message;
use swarm_core::provider::{ChatModel, ChatRequest};

use crate::agent::ModelConfig;
use crate::error::EngineError;

const SUMMARY_INSTRUCTIONS: &str = "You compress agent conversations. Summarize the transcript \
you are given so the agent can continue its task without it: keep goals, decisions, findings, \
entry ids and open questions. Reply with the summary only.";

/// Produces the text that replaces older history during compaction.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, messages: &[Message]) -> Result<String, EngineError>;
}

/// Summarizes with one extra call to the agent's own model.
pub struct ModelSummarizer {
    model: Arc<dyn ChatModel>,
    config: ModelConfig,
}

impl ModelSummarizer {
    pub fn new(model: Arc<dyn ChatModel>, config: ModelConfig) -> Self {
        Self { model, config }
    }
}

#[async_trait]
impl Summarizer for ModelSummarizer {
    async fn summarize(&self, messages: &[Message]) -> Result<String, EngineError> {
        let request = ChatRequest {
            model: self.config.model.clone(),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            messages: vec![
                Message::system(SUMMARY_INSTRUCTIONS).to_wire(),
                Message::user(render_transcript(messages)).to_wire(),
            ],
            tools: Vec::new(),
        };
        let response = self.model.complete(&request).await?;
        let summary = response.message.text_content().trim();
        if summary.is_empty() {
            return Err(EngineError::Summarization("model returned an empty summary".into()));
        }
        Ok(summary.to_string())
    }
}

/// Plain-text transcript, one block per message.
pub fn render_transcript(messages: &[Message]) -> String {
    let mut out = String::new();
    for message in messages {
        let _ = writeln!(out, "{}: {}", message.role(), message.content().unwrap_or_default());
        if let Message::Assistant(a) = message {
            for call in &a.tool_calls {
                let _ = writeln!(out, "  -> {}({})", call.name, call.arguments);
            }
        }
    }
    out
}
