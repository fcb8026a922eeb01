use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ids::ToolCallId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a conversation log.
///
/// A `Tool` message always answers a call emitted by the assistant message
/// that precedes it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    System { content: String },
    User { content: String },
    Assistant(AssistantMessage),
    Tool(ToolResultMessage),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessage {
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Provider reasoning metadata, kept verbatim so it can be echoed back.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_details: Option<Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolResultMessage {
    pub tool_call_id: ToolCallId,
    pub content: String,
}

/// A tool invocation requested by the model.
///
/// `arguments` is the JSON-encoded string exactly as the model produced it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: ToolCallId,
    pub name: String,
    pub arguments: String,
}

impl ToolCall {
    pub fn new(id: ToolCallId, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    /// Build a call from structured arguments, minting a fresh id.
    pub fn with_args(name: impl Into<String>, args: Value) -> Self {
        Self::new(ToolCallId::new(), name, args.to_string())
    }

    /// Decode the argument string into an object.
    ///
    /// Blank input is an empty object. Anything that is not a JSON object is
    /// an error; callers decide whether to degrade to an empty argument set.
    pub fn decode_arguments(&self) -> Result<Map<String, Value>, serde_json::Error> {
        if self.arguments.trim().is_empty() {
            return Ok(Map::new());
        }
        serde_json::from_str::<Map<String, Value>>(&self.arguments)
    }
}

/// Outcome of one tool call. Produced exactly once per call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_call_id: ToolCallId,
    pub content: String,
    #[serde(default)]
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(tool_call_id: ToolCallId, content: impl Into<String>) -> Self {
        Self {
            tool_call_id,
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(tool_call_id: ToolCallId, content: impl Into<String>) -> Self {
        Self {
            tool_call_id,
            content: content.into(),
            is_error: true,
        }
    }
}

/// The shapes a conversation accepts at its boundary.
#[derive(Clone, Debug)]
pub enum MessageInput {
    /// Plain text under the given role.
    Text(Role, String),
    /// A model reply, possibly carrying tool calls.
    ModelReply(AssistantMessage),
    /// Results of a dispatched batch; each becomes its own `tool` message.
    ToolResults(Vec<ToolResult>),
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self::System {
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: content.into(),
        }
    }

    pub fn assistant_text(content: impl Into<String>) -> Self {
        Self::Assistant(AssistantMessage::text(content))
    }

    pub fn tool(tool_call_id: ToolCallId, content: impl Into<String>) -> Self {
        Self::Tool(ToolResultMessage {
            tool_call_id,
            content: content.into(),
        })
    }

    pub fn role(&self) -> Role {
        match self {
            Self::System { .. } => Role::System,
            Self::User { .. } => Role::User,
            Self::Assistant(_) => Role::Assistant,
            Self::Tool(_) => Role::Tool,
        }
    }

    /// Text body, if any.
    pub fn content(&self) -> Option<&str> {
        match self {
            Self::System { content } | Self::User { content } => Some(content),
            Self::Assistant(a) => a.content.as_deref(),
            Self::Tool(t) => Some(&t.content),
        }
    }

    /// Character count used for token estimation: body plus tool call payloads.
    pub fn char_len(&self) -> usize {
        let body = self.content().map_or(0, |c| c.chars().count());
        match self {
            Self::Assistant(a) => {
                body + a
                    .tool_calls
                    .iter()
                    .map(|tc| tc.name.chars().count() + tc.arguments.chars().count())
                    .sum::<usize>()
            }
            _ => body,
        }
    }

    /// Project onto the chat-completions wire shape.
    pub fn to_wire(&self) -> WireMessage {
        match self {
            Self::Assistant(a) => WireMessage {
                role: Role::Assistant,
                content: a.content.clone(),
                tool_calls: (!a.tool_calls.is_empty())
                    .then(|| a.tool_calls.iter().map(WireToolCall::from).collect()),
                tool_call_id: None,
                reasoning_details: a.reasoning_details.clone(),
            },
            Self::Tool(t) => WireMessage {
                role: Role::Tool,
                content: Some(t.content.clone()),
                tool_calls: None,
                tool_call_id: Some(t.tool_call_id.to_string()),
                reasoning_details: None,
            },
            other => WireMessage {
                role: other.role(),
                content: other.content().map(str::to_string),
                tool_calls: None,
                tool_call_id: None,
                reasoning_details: None,
            },
        }
    }
}

impl AssistantMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
            reasoning_details: None,
        }
    }

    pub fn with_tool_calls(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content,
            tool_calls,
            reasoning_details: None,
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    pub fn text_content(&self) -> &str {
        self.content.as_deref().unwrap_or_default()
    }
}

// --- Wire shape ---

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: Role,
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<WireToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_details: Option<Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WireToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub function: WireFunction,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WireFunction {
    pub name: String,
    pub arguments: String,
}

impl From<&ToolCall> for WireToolCall {
    fn from(tc: &ToolCall) -> Self {
        Self {
            id: tc.id.to_string(),
            kind: "function".into(),
            function: WireFunction {
                name: tc.name.clone(),
                arguments: tc.arguments.clone(),
            },
        }
    }
}

impl From<WireToolCall> for ToolCall {
    fn from(w: WireToolCall) -> Self {
        Self::new(ToolCallId::from_raw(w.id), w.function.name, w.function.arguments)
    }
}

/// Pull the human-readable part out of provider reasoning metadata.
///
/// Lists contribute their `reasoning.text` blocks joined by blank lines; a bare
/// string is returned as-is. Encrypted or unknown blocks are ignored.
pub fn extract_text_reasoning(details: &Value) -> Option<String> {
    match details {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Array(items) => {
            let parts: Vec<&str> = items
                .iter()
                .filter(|item| item.get("type").and_then(Value::as_str) == Some("reasoning.text"))
                .filter_map(|item| item.get("text").and_then(Value::as_str))
                .filter(|text| !text.is_empty())
                .collect();
            (!parts.is_empty()).then(|| parts.join("\n\n"))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn message_serializes_with_role_tag() {
        let json = serde_json::to_value(Message::user("hello")).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(json["content"], "hello");

        let json = serde_json::to_value(Message::tool(ToolCallId::from_raw("c1"), "ok")).unwrap();
        assert_eq!(json["role"], "tool");
        assert_eq!(json["tool_call_id"], "c1");
    }

    #[test]
    fn decode_arguments_handles_blank_and_garbage() {
        let blank = ToolCall::new(ToolCallId::new(), "t", "  ");
        assert!(blank.decode_arguments().unwrap().is_empty());

        let garbage = ToolCall::new(ToolCallId::new(), "t", "{not json");
        assert!(garbage.decode_arguments().is_err());

        let array = ToolCall::new(ToolCallId::new(), "t", "[1,2]");
        assert!(array.decode_arguments().is_err());

        let ok = ToolCall::with_args("t", json!({"q": "rust"}));
        assert_eq!(ok.decode_arguments().unwrap()["q"], "rust");
    }

    #[test]
    fn wire_projection_of_assistant_with_calls() {
        let call = ToolCall::new(ToolCallId::from_raw("call_1"), "search", r#"{"q":"x"}"#);
        let msg = Message::Assistant(AssistantMessage::with_tool_calls(None, vec![call]));
        let wire = msg.to_wire();

        assert_eq!(wire.role, Role::Assistant);
        assert_eq!(wire.content, None);
        let calls = wire.tool_calls.unwrap();
        assert_eq!(calls[0].id, "call_1");
        assert_eq!(calls[0].kind, "function");
        assert_eq!(calls[0].function.arguments, r#"{"q":"x"}"#);
    }

    #[test]
    fn wire_json_omits_absent_fields_but_keeps_null_content() {
        let wire = Message::assistant_text("done").to_wire();
        let json = serde_json::to_value(&wire).unwrap();
        assert_eq!(json, json!({"role": "assistant", "content": "done"}));

        let msg = Message::Assistant(AssistantMessage::with_tool_calls(
            None,
            vec![ToolCall::new(ToolCallId::from_raw("a"), "t", "{}")],
        ));
        let json = serde_json::to_value(msg.to_wire()).unwrap();
        assert!(json["content"].is_null());
        assert!(json.get("tool_call_id").is_none());
    }

    #[test]
    fn char_len_counts_tool_call_payloads() {
        let msg = Message::Assistant(AssistantMessage::with_tool_calls(
            Some("ab".into()),
            vec![ToolCall::new(ToolCallId::new(), "abc", "{}")],
        ));
        assert_eq!(msg.char_len(), 2 + 3 + 2);
    }

    #[test]
    fn reasoning_text_blocks_are_joined() {
        let details = json!([
            {"type": "reasoning.text", "text": "first"},
            {"type": "reasoning.encrypted", "data": "opaque"},
            {"type": "reasoning.text", "text": "second"},
        ]);
        assert_eq!(extract_text_reasoning(&details).as_deref(), Some("first\n\nsecond"));
    }

    #[test]
    fn reasoning_without_text_is_none() {
        assert_eq!(extract_text_reasoning(&json!([{"type": "reasoning.encrypted"}])), None);
        assert_eq!(extract_text_reasoning(&json!({"type": "reasoning.text"})), None);
        assert_eq!(extract_text_reasoning(&json!("plain")).as_deref(), Some("plain"));
    }
}
