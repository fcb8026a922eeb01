pub mod history;
pub mod summarizer;

pub use history::{CompactOutcome, ConversationStore, TurnTokens};
pub use summarizer::{ModelSummarizer, Summarizer};
