use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use swarm_core::errors::GatewayError;
use swarm_core::provider::{ChatModel, ChatRequest, ChatResponse};

use crate::converter;

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug)]
pub struct ClientConfig {
    pub base_url: String,
    pub api_key: SecretString,
    pub request_timeout: Duration,
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: SecretString::from(api_key.into()),
            request_timeout: Duration::from_secs(600),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Chat-completions client for OpenRouter or any OpenAI-compatible endpoint.
pub struct OpenRouterClient {
    client: Client,
    endpoint: String,
    api_key: SecretString,
    timeout: Duration,
}

impl OpenRouterClient {
    pub fn new(config: ClientConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| GatewayError::NetworkError(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: config.api_key,
            timeout: config.request_timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ChatModel for OpenRouterClient {
    fn name(&self) -> &str {
        "openrouter"
    }

    #[instrument(skip(self, request), fields(model = %request.model, messages = request.messages.len()))]
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, GatewayError> {
        let body = converter::build_request_body(request);

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Timeout(self.timeout)
                } else {
                    GatewayError::NetworkError(e.to_string())
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "model request rejected");
            return Err(GatewayError::from_status(status.as_u16(), body));
        }

        let payload: Value = resp
            .json()
            .await
            .map_err(|e| GatewayError::MalformedResponse(e.to_string()))?;
        let parsed = converter::parse_response(&payload)?;

        debug!(
            tool_calls = parsed.message.tool_calls.len(),
            prompt_tokens = parsed.usage.map(|u| u.prompt_tokens),
            completion_tokens = parsed.usage.map(|u| u.completion_tokens),
            "model responded"
        );
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use swarm_core::messages::Message;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> ChatRequest {
        ChatRequest {
            model: "openai/gpt-5".into(),
            temperature: 1.0,
            max_tokens: 64,
            messages: vec![Message::user("ping").to_wire()],
            tools: Vec::new(),
        }
    }

    fn client_for(server: &MockServer) -> OpenRouterClient {
        OpenRouterClient::new(ClientConfig::new("test-key").with_base_url(server.uri())).unwrap()
    }

    #[test]
    fn endpoint_joins_base_url() {
        let client =
            OpenRouterClient::new(ClientConfig::new("k").with_base_url("http://localhost:1/v1/"))
                .unwrap();
        assert_eq!(client.endpoint(), "http://localhost:1/v1/chat/completions");
    }

    #[tokio::test]
    async fn posts_with_bearer_and_parses_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "pong"}}],
                "usage": {"prompt_tokens": 5, "completion_tokens": 1, "total_tokens": 6}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let resp = client_for(&server).complete(&request()).await.unwrap();
        assert_eq!(resp.message.content.as_deref(), Some("pong"));
        assert_eq!(resp.usage.map(|u| u.total_tokens), Some(6));
    }

    #[tokio::test]
    async fn http_status_is_classified() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let err = client_for(&server).complete(&request()).await.unwrap_err();
        assert!(matches!(err, GatewayError::AuthenticationFailed(ref b) if b == "bad key"));
    }

    #[tokio::test]
    async fn non_json_body_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = client_for(&server).complete(&request()).await.unwrap_err();
        assert!(matches!(err, GatewayError::MalformedResponse(_)));
    }
}
