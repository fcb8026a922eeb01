use serde_json::{json, Value};

use swarm_core::errors::GatewayError;
use swarm_core::ids::ToolCallId;
use swarm_core::messages::{AssistantMessage, ToolCall};
use swarm_core::provider::{ChatRequest, ChatResponse};
use swarm_core::tokens::Usage;

/// Convert a ChatRequest into an OpenAI-compatible chat-completions body.
pub fn build_request_body(request: &ChatRequest) -> Value {
    let mut body = json!({
        "model": request.model,
        "max_tokens": request.max_tokens,
        "temperature": request.temperature,
        "messages": request.messages,
    });

    if !request.tools.is_empty() {
        let tools: Vec<Value> = request
            .tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.input_schema,
                    }
                })
            })
            .collect();
        body["tools"] = json!(tools);
    }

    body
}

/// Parse a chat-completions response body, keeping only the first choice.
pub fn parse_response(body: &Value) -> Result<ChatResponse, GatewayError> {
    if let Some(err) = body.get("error").filter(|_| body.get("choices").is_none()) {
        return Err(embedded_error(err));
    }

    let message = body
        .pointer("/choices/0/message")
        .ok_or_else(|| GatewayError::MalformedResponse("response has no choices".into()))?;

    let content = message
        .get("content")
        .and_then(Value::as_str)
        .map(str::to_string);

    let tool_calls = match message.get("tool_calls") {
        Some(Value::Array(calls)) => calls
            .iter()
            .map(parse_tool_call)
            .collect::<Result<Vec<_>, _>>()?,
        _ => Vec::new(),
    };

    let reasoning_details = message
        .get("reasoning_details")
        .filter(|v| !v.is_null())
        .cloned()
        .or_else(|| {
            message
                .get("reasoning")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(|s| Value::String(s.to_string()))
        });

    let usage = body
        .get("usage")
        .filter(|v| v.is_object())
        .map(|u| serde_json::from_value::<Usage>(u.clone()))
        .transpose()
        .map_err(|e| GatewayError::MalformedResponse(format!("usage: {e}")))?;

    Ok(ChatResponse {
        message: AssistantMessage {
            content,
            tool_calls,
            reasoning_details,
        },
        usage,
        model: body.get("model").and_then(Value::as_str).map(str::to_string),
    })
}

fn parse_tool_call(call: &Value) -> Result<ToolCall, GatewayError> {
    let id = call
        .get("id")
        .and_then(Value::as_str)
        .map(ToolCallId::from_raw)
        .unwrap_or_default();
    let name = call
        .pointer("/function/name")
        .and_then(Value::as_str)
        .ok_or_else(|| GatewayError::MalformedResponse("tool call without function name".into()))?;
    // Some providers send arguments as an object instead of a string.
    let arguments = match call.pointer("/function/arguments") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };
    Ok(ToolCall::new(id, name, arguments))
}

fn embedded_error(err: &Value) -> GatewayError {
    let message = err
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("unknown provider error")
        .to_string();
    match err.get("code").and_then(Value::as_u64) {
        Some(code) => GatewayError::from_status(code as u16, message),
        None => GatewayError::InvalidRequest(message),
    }
}
