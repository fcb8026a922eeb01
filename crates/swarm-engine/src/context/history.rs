use std::collections::VecDeque;

use tracing::{debug, info, warn};

use swarm_core::messages::{Message, MessageInput, Role, WireMessage};
use swarm_core::tokens::{estimate_chars, estimate_text, Usage};

use super::summarizer::Summarizer;

pub const TRUNCATION_MARKER: &str = "[Earlier history has been truncated.]";
pub const TRUNCATION_MARKER_TOKENS: i64 = 25;
pub const SUMMARY_HEADER: &str = "[Summary of earlier conversation]";
pub const DEFAULT_KEEP_RECENT: usize = 3;

/// Fraction of the context window above which compaction kicks in.
const COMPACTION_THRESHOLD: f64 = 0.9;

/// Token cost attributed to one assistant turn.
///
/// `input` is the growth of the prompt since the previous turn, not the
/// provider's cumulative prompt count.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TurnTokens {
    pub input: i64,
    pub output: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompactOutcome {
    /// Below the threshold, nothing done.
    Skipped,
    Compacted,
    /// Summarization was impossible or failed; history was truncated instead.
    Truncated,
}

/// Ordered message log of one agent plus a running token estimate.
///
/// The system prompt is kept out of the log and only counted; requests get
/// it prepended when the log does not start with a system message.
pub struct ConversationStore {
    system: String,
    messages: Vec<Message>,
    total_tokens: i64,
    /// Estimates charged since the last reported usage.
    unreported: i64,
    turns: VecDeque<TurnTokens>,
    context_window_tokens: i64,
}

impl ConversationStore {
    pub fn new(system: impl Into<String>, context_window_tokens: i64) -> Self {
        let system = system.into();
        let total_tokens = estimate_text(&system);
        Self {
            system,
            messages: Vec::new(),
            total_tokens,
            unreported: 0,
            turns: VecDeque::new(),
            context_window_tokens,
        }
    }

    pub fn system(&self) -> &str {
        &self.system
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn total_tokens(&self) -> i64 {
        self.total_tokens
    }

    pub fn context_window_tokens(&self) -> i64 {
        self.context_window_tokens
    }

    pub fn turns(&self) -> &VecDeque<TurnTokens> {
        &self.turns
    }

    /// Append one input. Tool result batches become one `tool` message each.
    ///
    /// `usage` only counts for assistant messages: the prompt growth since the
    /// last recorded turn plus the completion tokens are added to the total.
    /// Everything else is charged its estimate until the next usage report
    /// replaces the estimates with measured counts.
    pub fn add(&mut self, input: MessageInput, usage: Option<Usage>) {
        match input {
            MessageInput::Text(role, content) => {
                let message = match role {
                    Role::System => Message::system(content),
                    Role::Assistant => Message::assistant_text(content),
                    // a tool message needs a call id; bare text goes in as user text
                    Role::User | Role::Tool => Message::user(content),
                };
                self.push(message, usage);
            }
            MessageInput::ModelReply(reply) => self.push(Message::Assistant(reply), usage),
            MessageInput::ToolResults(results) => {
                for result in results {
                    self.push(Message::tool(result.tool_call_id, result.content), None);
                }
            }
        }
    }

    fn push(&mut self, message: Message, usage: Option<Usage>) {
        match (&message, usage) {
            (Message::Assistant(_), Some(usage)) => {
                let input = usage.prompt_tokens as i64 - (self.total_tokens - self.unreported);
                let output = usage.completion_tokens as i64;
                self.turns.push_back(TurnTokens { input, output });
                let total = self.total_tokens + input + output - self.unreported;
                self.total_tokens = total.max(self.floor());
                self.unreported = 0;
            }
            _ => {
                let cost = message_cost(&message);
                self.total_tokens += cost;
                self.unreported += cost;
            }
        }
        self.messages.push(message);
    }

    pub fn over_budget(&self) -> bool {
        self.total_tokens > self.context_window_tokens
    }

    /// Drop the oldest messages two at a time, together with any tool results
    /// that would be left without their call, until the estimate fits the
    /// window. A leading system message and the newest message are never
    /// removed. Returns how many messages were dropped.
    pub fn truncate(&mut self) -> usize {
        if !self.over_budget() {
            return 0;
        }
        let base = self.protected_prefix();
        let before = self.total_tokens;
        let mut dropped = 0;

        while self.over_budget() {
            let mut end = base + 2;
            while matches!(self.messages.get(end), Some(Message::Tool(_))) {
                end += 1;
            }
            if end >= self.messages.len() {
                break;
            }

            let removed: Vec<Message> = self.messages.drain(base..end).collect();
            dropped += removed.len();
            match self.turns.pop_front() {
                Some(turn) => self.total_tokens -= turn.input + turn.output,
                None => {
                    let cost = removed.iter().map(message_cost).sum::<i64>();
                    self.total_tokens -= cost;
                    self.unreported = (self.unreported - cost).max(0);
                }
            }
            self.place_marker(base);
        }
        self.total_tokens = self.total_tokens.max(self.floor());

        debug!(
            dropped,
            tokens_before = before,
            tokens_after = self.total_tokens,
            window = self.context_window_tokens,
            "history truncated"
        );
        dropped
    }

    /// Put the truncation marker at `at`, replacing a user message or
    /// preceding anything else. The newest message is never replaced.
    fn place_marker(&mut self, at: usize) {
        let marker = Message::user(TRUNCATION_MARKER);
        let is_last = at + 1 == self.messages.len();
        let replaced = if !is_last && matches!(self.messages[at], Message::User { .. }) {
            Some(std::mem::replace(&mut self.messages[at], marker))
        } else {
            self.messages.insert(at, marker);
            None
        };

        match self.turns.front_mut() {
            Some(turn) => {
                self.total_tokens += TRUNCATION_MARKER_TOKENS - turn.input;
                turn.input = TRUNCATION_MARKER_TOKENS;
            }
            None => {
                let delta = TRUNCATION_MARKER_TOKENS - replaced.as_ref().map_or(0, message_cost);
                self.total_tokens += delta;
                self.unreported = (self.unreported + delta).max(0);
            }
        }
    }

    /// Replace older history with a model-written summary once usage passes
    /// 90% of the window, keeping the last `keep_recent` messages verbatim.
    ///
    /// Token accounting is re-estimated from scratch afterwards and the
    /// per-turn ledger is reset. Any failure falls back to [`truncate`](Self::truncate).
    pub async fn compact(&mut self, summarizer: &dyn Summarizer, keep_recent: usize) -> CompactOutcome {
        if (self.total_tokens as f64) <= self.context_window_tokens as f64 * COMPACTION_THRESHOLD {
            return CompactOutcome::Skipped;
        }

        let base = self.protected_prefix();
        let mut split = self.messages.len().saturating_sub(keep_recent).max(base);
        // Keep tool results next to the call that produced them.
        while split > base && matches!(self.messages.get(split), Some(Message::Tool(_))) {
            split -= 1;
        }
        if split == base {
            self.truncate();
            return CompactOutcome::Truncated;
        }

        match summarizer.summarize(&self.messages[base..split]).await {
            Ok(summary) => {
                let replaced = split - base;
                let note = Message::user(format!("{SUMMARY_HEADER}\n{summary}"));
                self.messages.splice(base..split, std::iter::once(note));
                self.turns.clear();
                self.recompute_tokens();
                info!(
                    replaced,
                    kept = self.messages.len() - base - 1,
                    tokens = self.total_tokens,
                    "history compacted"
                );
                if self.over_budget() {
                    self.truncate();
                }
                CompactOutcome::Compacted
            }
            Err(e) => {
                warn!(error = %e, "summarization failed, truncating instead");
                self.truncate();
                CompactOutcome::Truncated
            }
        }
    }

    /// Wire projection of the log, in order.
    pub fn format_for_api(&self) -> Vec<WireMessage> {
        self.messages.iter().map(Message::to_wire).collect()
    }

    fn recompute_tokens(&mut self) {
        self.unreported = self.messages.iter().map(message_cost).sum::<i64>();
        self.total_tokens = estimate_text(&self.system) + self.unreported;
    }

    /// The estimate never drops below what the system prompt alone costs.
    fn floor(&self) -> i64 {
        estimate_text(&self.system)
    }

    fn protected_prefix(&self) -> usize {
        usize::from(matches!(self.messages.first(), Some(Message::System { .. })))
    }
}

/// Estimated cost of a message; markers cost what they were charged.
fn message_cost(message: &Message) -> i64 {
    match message {
        Message::User { content } if content == TRUNCATION_MARKER => TRUNCATION_MARKER_TOKENS,
        other => estimate_chars(other.char_len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use proptest::prelude::*;
    use serde_json::json;
    use swarm_core::ids::ToolCallId;
    use swarm_core::messages::{AssistantMessage, ToolCall, ToolResult};

    use crate::error::EngineError;

    /// Returns a canned summary and records each batch size it was given.
    struct FixedSummary {
        text: &'static str,
        seen: Mutex<Vec<usize>>,
    }

    impl FixedSummary {
        fn new(text: &'static str) -> Self {
            Self {
                text,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Summarizer for FixedSummary {
        async fn summarize(&self, messages: &[Message]) -> Result<String, EngineError> {
            self.seen.lock().unwrap().push(messages.len());
            Ok(self.text.to_string())
        }
    }

    struct FailingSummary;

    #[async_trait]
    impl Summarizer for FailingSummary {
        async fn summarize(&self, _messages: &[Message]) -> Result<String, EngineError> {
            Err(EngineError::Summarization("model unavailable".into()))
        }
    }

    fn user(text: &str) -> MessageInput {
        MessageInput::Text(Role::User, text.to_string())
    }

    fn reply(text: &str) -> MessageInput {
        MessageInput::ModelReply(AssistantMessage::text(text))
    }

    #[test]
    fn starts_with_system_estimate() {
        let store = ConversationStore::new("x".repeat(400), 1000);
        assert_eq!(store.total_tokens(), 100);
        assert!(store.is_empty());
    }

    #[test]
    fn usage_records_incremental_input() {
        let mut store = ConversationStore::new("x".repeat(40), 10_000);
        store.add(user("hi"), None);
        store.add(reply("hello"), Some(Usage::new(110, 20)));
        assert_eq!(store.turns()[0], TurnTokens { input: 100, output: 20 });
        assert_eq!(store.total_tokens(), 130);

        store.add(user("more"), None);
        store.add(reply("sure"), Some(Usage::new(180, 5)));
        assert_eq!(store.turns()[1], TurnTokens { input: 50, output: 5 });
        assert_eq!(store.total_tokens(), 185);
    }

    #[test]
    fn usage_on_user_messages_is_ignored() {
        let mut store = ConversationStore::new("", 10_000);
        store.add(user("hi"), Some(Usage::new(500, 10)));
        assert!(store.turns().is_empty());
        assert_eq!(store.total_tokens(), 0);
    }

    #[test]
    fn tool_results_expand_to_one_message_each() {
        let mut store = ConversationStore::new("", 10_000);
        let calls = vec![
            ToolCall::new(ToolCallId::from_raw("a"), "search", "{}"),
            ToolCall::new(ToolCallId::from_raw("b"), "fetch", "{}"),
        ];
        store.add(
            MessageInput::ModelReply(AssistantMessage::with_tool_calls(None, calls)),
            None,
        );
        store.add(
            MessageInput::ToolResults(vec![
                ToolResult::success(ToolCallId::from_raw("a"), "one"),
                ToolResult::error(ToolCallId::from_raw("b"), "two"),
            ]),
            None,
        );
        assert_eq!(store.len(), 3);
        assert!(matches!(&store.messages()[1], Message::Tool(t) if t.tool_call_id.as_str() == "a"));
        assert!(matches!(&store.messages()[2], Message::Tool(t) if t.content == "two"));
    }

    #[test]
    fn format_for_api_preserves_fields() {
        let mut store = ConversationStore::new("", 10_000);
        store.add(user("find it"), None);
        let mut msg = AssistantMessage::with_tool_calls(
            None,
            vec![ToolCall::new(ToolCallId::from_raw("c1"), "search", r#"{"q":"x"}"#)],
        );
        msg.reasoning_details = Some(json!([{"type": "reasoning.text", "text": "hm"}]));
        store.add(MessageInput::ModelReply(msg), None);
        store.add(
            MessageInput::ToolResults(vec![ToolResult::success(ToolCallId::from_raw("c1"), "found")]),
            None,
        );

        let wire = store.format_for_api();
        assert_eq!(wire.len(), 3);
        assert_eq!(wire[0].role, Role::User);
        assert_eq!(wire[0].content.as_deref(), Some("find it"));
        assert!(wire[0].tool_calls.is_none() && wire[0].tool_call_id.is_none());

        let calls = wire[1].tool_calls.as_ref().unwrap();
        assert_eq!(wire[1].content, None);
        assert_eq!(calls[0].id, "c1");
        assert_eq!(calls[0].function.name, "search");
        assert_eq!(calls[0].function.arguments, r#"{"q":"x"}"#);
        assert!(wire[1].reasoning_details.is_some());

        assert_eq!(wire[2].role, Role::Tool);
        assert_eq!(wire[2].tool_call_id.as_deref(), Some("c1"));
        assert_eq!(wire[2].content.as_deref(), Some("found"));
    }

    #[test]
    fn truncate_is_noop_under_budget() {
        let mut store = ConversationStore::new("", 1000);
        store.add(user("a"), None);
        store.add(reply("b"), Some(Usage::new(10, 2)));
        assert_eq!(store.truncate(), 0);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn truncate_rolls_back_ledger_and_places_marker() {
        let mut store = ConversationStore::new("", 250);
        for (i, prompt) in [100u64, 220, 340].into_iter().enumerate() {
            store.add(user(&format!("q{i}")), None);
            store.add(reply(&format!("a{i}")), Some(Usage::new(prompt, 10)));
        }
        // turns: (100,10) (110,10) (110,10) -> 350
        assert_eq!(store.total_tokens(), 350);

        store.truncate();
        // first pair gone (-110), q1 replaced by marker: 240 + 25 - 110 = 155
        assert_eq!(store.total_tokens(), 155);
        assert_eq!(store.len(), 4);
        assert_eq!(store.messages()[0].content(), Some(TRUNCATION_MARKER));
        assert_eq!(store.turns()[0], TurnTokens { input: 25, output: 10 });
    }

    #[test]
    fn truncate_keeps_leading_system_message() {
        let mut store = ConversationStore::new("", 10);
        store.add(MessageInput::Text(Role::System, "rules".into()), None);
        for i in 0..4 {
            store.add(user(&"u".repeat(200 + i)), None);
            store.add(reply(&"a".repeat(200)), None);
        }
        store.add(reply("last"), Some(Usage::new(1000, 0)));
        assert!(store.truncate() > 0);
        assert!(matches!(store.messages()[0], Message::System { .. }));
    }

    #[test]
    fn messages_without_usage_are_charged_estimates() {
        let mut store = ConversationStore::new("s".repeat(40), 10_000);
        store.add(user(&"x".repeat(400)), None);
        store.add(reply(&"y".repeat(80)), None);
        assert_eq!(store.total_tokens(), 10 + 100 + 20);
        assert!(store.turns().is_empty());

        // a usage report replaces the estimates with the measured prompt
        store.add(user(&"z".repeat(40)), None);
        store.add(reply("ok"), Some(Usage::new(150, 5)));
        assert_eq!(store.total_tokens(), 155);
        assert_eq!(store.turns()[0], TurnTokens { input: 140, output: 5 });
    }

    #[test]
    fn truncate_without_ledger_uses_estimates() {
        let mut store = ConversationStore::new("", 0);
        store.add(user(&"x".repeat(400)), None);
        store.add(reply(&"y".repeat(400)), None);
        store.add(user(&"z".repeat(40)), None);
        assert_eq!(store.total_tokens(), 210);

        assert_eq!(store.truncate(), 2);
        // the newest message stays, preceded by the marker
        assert_eq!(store.len(), 2);
        assert_eq!(store.messages()[0].content(), Some(TRUNCATION_MARKER));
        assert_eq!(store.messages()[1].content(), Some("z".repeat(40).as_str()));
        assert_eq!(store.total_tokens(), 10 + TRUNCATION_MARKER_TOKENS);
    }

    #[test]
    fn truncate_keeps_newest_message_when_system_prompt_fills_window() {
        let system = "s".repeat(8000);
        let mut store = ConversationStore::new(system.as_str(), 900);
        store.add(user(&"x".repeat(400)), None);
        store.add(reply(&"y".repeat(400)), None);
        store.add(user("newest question"), None);
        assert!(store.over_budget());

        store.truncate();
        assert!(!store.is_empty());
        assert_eq!(store.messages().last().unwrap().content(), Some("newest question"));
        assert!(store.total_tokens() >= estimate_text(&system));
        // a second pass has nothing left to drop
        assert_eq!(store.truncate(), 0);
        assert_eq!(store.messages().last().unwrap().content(), Some("newest question"));
    }

    #[test]
    fn truncate_never_leaves_the_newest_tool_result_orphaned() {
        let mut store = ConversationStore::new("s".repeat(4000), 500);
        store.add(user("look it up"), None);
        store.add(
            MessageInput::ModelReply(AssistantMessage::with_tool_calls(
                None,
                vec![ToolCall::new(ToolCallId::from_raw("c1"), "search", "{}")],
            )),
            None,
        );
        store.add(
            MessageInput::ToolResults(vec![ToolResult::success(ToolCallId::from_raw("c1"), "r")]),
            None,
        );
        assert!(store.over_budget());

        assert_eq!(store.truncate(), 0);
        assert_eq!(store.len(), 3);
        assert!(matches!(store.messages()[2], Message::Tool(_)));
    }

    #[test]
    fn truncate_drops_orphaned_tool_results() {
        let mut store = ConversationStore::new("", 100);
        store.add(user("start"), None);
        store.add(
            MessageInput::ModelReply(AssistantMessage::with_tool_calls(
                None,
                vec![ToolCall::new(ToolCallId::from_raw("c1"), "search", "{}")],
            )),
            Some(Usage::new(90, 10)),
        );
        store.add(
            MessageInput::ToolResults(vec![ToolResult::success(ToolCallId::from_raw("c1"), "r")]),
            None,
        );
        store.add(reply("done"), Some(Usage::new(150, 10)));
        assert!(store.over_budget());

        store.truncate();
        assert!(!matches!(store.messages().first(), Some(Message::Tool(_))));
    }

    #[tokio::test]
    async fn compact_is_noop_below_threshold() {
        let mut store = ConversationStore::new("", 1000);
        store.add(user("a"), None);
        store.add(reply("b"), Some(Usage::new(800, 100)));
        let summarizer = FixedSummary::new("short");
        assert_eq!(store.compact(&summarizer, 3).await, CompactOutcome::Skipped);
        assert_eq!(store.len(), 2);
        assert_eq!(store.total_tokens(), 900);
        assert!(summarizer.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn compact_summarizes_older_history() {
        let mut store = ConversationStore::new("", 1000);
        for i in 0..4u64 {
            store.add(user(&format!("question {i}")), None);
            store.add(reply(&format!("answer {i}")), Some(Usage::new(300 * (i + 1), 10)));
        }
        let summarizer = FixedSummary::new("they asked four questions");
        assert_eq!(store.compact(&summarizer, 3).await, CompactOutcome::Compacted);

        assert_eq!(*summarizer.seen.lock().unwrap(), vec![5]);
        assert_eq!(store.len(), 4);
        let head = store.messages()[0].content().unwrap();
        assert!(head.starts_with(SUMMARY_HEADER));
        assert!(head.contains("four questions"));
        assert_eq!(store.messages()[3].content(), Some("answer 3"));
        assert!(store.turns().is_empty());
        let expected: i64 = store.messages().iter().map(message_cost).sum();
        assert_eq!(store.total_tokens(), expected);
    }

    #[tokio::test]
    async fn compact_never_splits_tool_results_from_their_call() {
        let mut store = ConversationStore::new("", 100);
        store.add(user("go"), None);
        store.add(
            MessageInput::ModelReply(AssistantMessage::with_tool_calls(
                None,
                vec![
                    ToolCall::new(ToolCallId::from_raw("a"), "search", "{}"),
                    ToolCall::new(ToolCallId::from_raw("b"), "search", "{}"),
                ],
            )),
            Some(Usage::new(95, 5)),
        );
        store.add(
            MessageInput::ToolResults(vec![
                ToolResult::success(ToolCallId::from_raw("a"), "1"),
                ToolResult::success(ToolCallId::from_raw("b"), "2"),
            ]),
            None,
        );
        let summarizer = FixedSummary::new("started");
        // keep_recent = 2 would start the tail on a tool result
        assert_eq!(store.compact(&summarizer, 2).await, CompactOutcome::Compacted);
        assert_eq!(*summarizer.seen.lock().unwrap(), vec![1]);
        assert!(matches!(store.messages()[1], Message::Assistant(_)));
    }

    #[tokio::test]
    async fn compact_failure_falls_back_to_truncation() {
        let mut store = ConversationStore::new("", 100);
        for i in 0..3u64 {
            store.add(user("q"), None);
            store.add(reply("a"), Some(Usage::new(50 * (i + 1), 10)));
        }
        assert!(store.over_budget());
        assert_eq!(store.compact(&FailingSummary, 3).await, CompactOutcome::Truncated);
        assert!(!store.over_budget());
        assert!(store.len() < 6);
    }

    proptest! {
        #[test]
        fn truncate_always_fits_or_exhausts(
            window in 0i64..2_000,
            turns in prop::collection::vec((0usize..800, 0usize..800, prop::option::of(0u64..400)), 0..12),
        ) {
            let mut store = ConversationStore::new("system prompt", window);
            let mut prompt = 0u64;
            for (user_len, reply_len, usage) in turns {
                store.add(user(&"u".repeat(user_len)), None);
                let usage = usage.map(|growth| {
                    prompt += growth;
                    Usage::new(prompt, (reply_len / 4) as u64)
                });
                store.add(reply(&"a".repeat(reply_len)), usage);
            }
            let newest = store.messages().last().map(|m| m.content().map(str::to_owned));
            store.truncate();
            prop_assert!(store.total_tokens() <= window || store.len() <= 2);
            prop_assert!(store.total_tokens() >= estimate_text("system prompt"));
            prop_assert_eq!(store.messages().last().map(|m| m.content().map(str::to_owned)), newest);
        }
    }
}
