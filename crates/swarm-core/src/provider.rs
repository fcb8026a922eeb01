use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::GatewayError;
use crate::messages::{AssistantMessage, WireMessage};
use crate::tokens::Usage;
use crate::tools::ToolDefinition;

/// One chat-completion request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub messages: Vec<WireMessage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
}

/// The first choice of a chat-completion response.
#[derive(Clone, Debug, PartialEq)]
pub struct ChatResponse {
    pub message: AssistantMessage,
    pub usage: Option<Usage>,
    /// Model name echoed by the provider, when present.
    pub model: Option<String>,
}

impl ChatResponse {
    pub fn new(message: AssistantMessage, usage: Option<Usage>) -> Self {
        Self {
            message,
            usage,
            model: None,
        }
    }
}

/// A remote chat-completion endpoint, treated as an opaque RPC.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::Message;

    #[test]
    fn request_omits_empty_tools() {
        let req = ChatRequest {
            model: "m".into(),
            temperature: 1.0,
            max_tokens: 10,
            messages: vec![Message::user("hi").to_wire()],
            tools: Vec::new(),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("tools").is_none());
        assert_eq!(json["messages"][0]["role"], "user");
    }
}
