use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use swarm_core::errors::GatewayError;
use swarm_core::messages::{AssistantMessage, ToolCall};
use swarm_core::provider::{ChatModel, ChatRequest, ChatResponse};
use swarm_core::tokens::Usage;

/// Pre-programmed replies for deterministic testing without API calls.
#[derive(Clone, Debug)]
pub enum MockResponse {
    Reply(ChatResponse),
    Error(GatewayError),
    /// Wait a duration, then yield the inner response.
    Delay(Duration, Box<MockResponse>),
}

impl MockResponse {
    pub fn text(text: &str) -> Self {
        Self::Reply(ChatResponse::new(AssistantMessage::text(text), None))
    }

    /// Tool calls with freshly minted ids, arguments given as JSON values.
    pub fn tool_calls(calls: Vec<(&str, Value)>) -> Self {
        let calls = calls
            .into_iter()
            .map(|(name, args)| ToolCall::with_args(name, args))
            .collect();
        Self::Reply(ChatResponse::new(AssistantMessage::with_tool_calls(None, calls), None))
    }

    /// Tool calls whose argument strings are passed through untouched.
    pub fn raw_tool_calls(calls: Vec<ToolCall>) -> Self {
        Self::Reply(ChatResponse::new(AssistantMessage::with_tool_calls(None, calls), None))
    }

    /// Attach provider usage to a reply. No-op for errors.
    pub fn with_usage(self, prompt_tokens: u64, completion_tokens: u64) -> Self {
        match self {
            Self::Reply(mut resp) => {
                resp.usage = Some(Usage::new(prompt_tokens, completion_tokens));
                Self::Reply(resp)
            }
            Self::Delay(d, inner) => Self::Delay(d, Box::new(inner.with_usage(prompt_tokens, completion_tokens))),
            other => other,
        }
    }

    pub fn delayed(delay: Duration, inner: MockResponse) -> Self {
        Self::Delay(delay, Box::new(inner))
    }
}

/// Scripted model: replies in order, then falls back to `repeat` if set.
/// Every request is recorded for inspection.
pub struct MockModel {
    script: Mutex<VecDeque<MockResponse>>,
    repeat: Option<MockResponse>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl MockModel {
    pub fn new(responses: Vec<MockResponse>) -> Self {
        Self {
            script: Mutex::new(responses.into()),
            repeat: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answer every call with the same response.
    pub fn repeating(response: MockResponse) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            repeat: Some(response),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().clone()
    }

    pub fn last_request(&self) -> Option<ChatRequest> {
        self.requests.lock().last().cloned()
    }

    fn next_response(&self, call: usize) -> Result<MockResponse, GatewayError> {
        if let Some(next) = self.script.lock().pop_front() {
            return Ok(next);
        }
        self.repeat.clone().ok_or_else(|| {
            GatewayError::InvalidRequest(format!("MockModel: no response configured for call {call}"))
        })
    }
}

#[async_trait]
impl ChatModel for MockModel {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, GatewayError> {
        let call = {
            let mut requests = self.requests.lock();
            requests.push(request.clone());
            requests.len() - 1
        };

        // Unroll nested delays iteratively to avoid recursive async.
        let mut current = self.next_response(call)?;
        loop {
            match current {
                MockResponse::Reply(resp) => return Ok(resp),
                MockResponse::Error(e) => return Err(e),
                MockResponse::Delay(duration, inner) => {
                    tokio::time::sleep(duration).await;
                    current = *inner;
                }
            }
        }
    }
}
