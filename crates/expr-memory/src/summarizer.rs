use std::sync::Arc;

use async_trait::async_trait;
use expr_core::{Message, Role};
use expr_llm::LLMProvider;

use crate::error::{MemoryError, MemoryResult};

const SUMMARY_INSTRUCTION: &str = "You maintain a running summary of a chat between a user and a \
Riot Games / League of Legends assistant. Merge the previous summary with the new messages. \
Keep the user's goals, established facts, and named champions, players, or matches. \
Drop pleasantries. Reply with the summary text only.";

/// Everything the summarizer sees for one exchange.
#[derive(Debug, Clone, Copy)]
pub struct SummaryInput<'a> {
    pub prior_summary: &'a str,
    pub recent: &'a [Message],
    pub prompt: &'a str,
    pub reply: &'a str,
    pub max_chars: usize,
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, input: SummaryInput<'_>) -> MemoryResult<String>;
}

/// Summarizes with a non-streaming completion from the chat model.
pub struct LlmSummarizer {
    llm: Arc<dyn LLMProvider>,
}

impl LlmSummarizer {
    pub fn new(llm: Arc<dyn LLMProvider>) -> Self {
        Self { llm }
    }

    pub fn build_request(input: &SummaryInput<'_>) -> Vec<Message> {
        let mut transcript = String::new();

        if !input.prior_summary.trim().is_empty() {
            transcript.push_str("Previous summary:\n");
            transcript.push_str(input.prior_summary.trim());
            transcript.push_str("\n\n");
        }

        let recent: Vec<&Message> = input.recent.iter().filter(|m| m.is_dialogue()).collect();
        if !recent.is_empty() {
            transcript.push_str("Earlier messages:\n");
            for message in recent {
                transcript.push_str(&format!("{}: {}\n", message.role.as_str(), message.content));
            }
            transcript.push('\n');
        }

        transcript.push_str("Latest exchange:\n");
        transcript.push_str(&format!("{}: {}\n", Role::User.as_str(), input.prompt));
        transcript.push_str(&format!("{}: {}", Role::Assistant.as_str(), input.reply));

        vec![
            Message::system(format!(
                "{} Stay under {} characters.",
                SUMMARY_INSTRUCTION, input.max_chars
            )),
            Message::user(transcript),
        ]
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize(&self, input: SummaryInput<'_>) -> MemoryResult<String> {
        let request = Self::build_request(&input);
        self.llm
            .complete(&request)
            .await
            .map_err(|error| MemoryError::Summarizer(error.to_string()))
    }
}

/// Trims and cuts `summary` to at most `max_chars` characters.
pub fn clip_summary(summary: &str, max_chars: usize) -> String {
    let trimmed = summary.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    trimmed.chars().take(max_chars).collect::<String>().trim_end().to_string()
}
