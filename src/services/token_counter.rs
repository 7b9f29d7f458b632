// Character-count token estimation. This is an approximation, not exact
// tokenization: budget decisions treat it as such and keep generous slack
// via the summary threshold.

use crate::models::ChatMessage;

/// Flat cost charged per message for role tags and separators.
pub const PER_MESSAGE_OVERHEAD_TOKENS: usize = 3;
/// Rough characters-per-token ratio for natural language.
pub const CHARS_PER_TOKEN: usize = 4;

#[must_use]
pub fn estimate_text_tokens(text: &str) -> usize {
    text.chars().count() / CHARS_PER_TOKEN
}

#[must_use]
pub fn estimate_message_tokens(message: &ChatMessage) -> usize {
    PER_MESSAGE_OVERHEAD_TOKENS + estimate_text_tokens(&message.content.flatten_text())
}

#[must_use]
pub fn estimate_history_tokens(history: &[ChatMessage]) -> usize {
    history.iter().map(estimate_message_tokens).sum()
}
