use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role of a history item. `Summary` items are produced by background
/// summarization and are never sent to the model directly; the request
/// assembler folds them into the system prompt position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    #[default]
    User,
    Assistant,
    System,
    Summary,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::System => write!(f, "system"),
            Self::Summary => write!(f, "summary"),
        }
    }
}

/// Kind discriminator for structured content parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentPartKind {
    Text,
    Image,
}

/// One part of a structured message body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentPart {
    pub kind: ContentPartKind,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// Message body: either a plain string or a list of typed parts. Chat
/// platforms deliver both shapes, so the distinction is kept explicit and
/// every consumer pattern-matches it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl Default for MessageContent {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl MessageContent {
    /// Collapses the content to plain text for matching and prompt
    /// construction. Non-text parts and parts without a text payload
    /// contribute nothing.
    #[must_use]
    pub fn flatten_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Parts(parts) => {
                let mut flattened = String::new();
                for part in parts {
                    if part.kind == ContentPartKind::Text {
                        if let Some(text) = &part.text {
                            flattened.push_str(text);
                        }
                    }
                }
                flattened
            }
        }
    }

    #[must_use]
    pub fn is_empty_text(&self) -> bool {
        self.flatten_text().is_empty()
    }
}

/// One item of a session's conversation history.
///
/// The sequence is append-only; the context manager is the sole mutator.
/// A truncation marker is a sentinel boundary and never carries
/// conversation content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: MessageContent,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_truncation_marker: bool,
}

impl ChatMessage {
    #[must_use]
    pub fn new(role: MessageRole, content: MessageContent) -> Self {
        Self {
            role,
            content,
            created_at: Utc::now(),
            is_truncation_marker: false,
        }
    }

    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(MessageRole::User, MessageContent::Text(text.into()))
    }

    #[must_use]
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, MessageContent::Text(text.into()))
    }

    #[must_use]
    pub fn system(text: impl Into<String>) -> Self {
        Self::new(MessageRole::System, MessageContent::Text(text.into()))
    }

    #[must_use]
    pub fn summary(text: impl Into<String>) -> Self {
        Self::new(MessageRole::Summary, MessageContent::Text(text.into()))
    }

    #[must_use]
    pub fn truncation_marker() -> Self {
        Self {
            role: MessageRole::System,
            content: MessageContent::Text(String::new()),
            created_at: Utc::now(),
            is_truncation_marker: true,
        }
    }

    /// True for user/assistant items that take part in the conversation
    /// flow (markers excluded).
    #[must_use]
    pub fn is_conversation(&self) -> bool {
        !self.is_truncation_marker
            && matches!(self.role, MessageRole::User | MessageRole::Assistant)
    }
}

/// Identity of one independent history stream. Sessions are created lazily
/// on first message; deletion is a management-API operation, not ours.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub chat_id: i64,
    pub bot_id: i64,
    pub user_id: Option<i64>,
    pub thread_id: Option<i64>,
}

impl SessionKey {
    #[must_use]
    pub const fn new(chat_id: i64, bot_id: i64) -> Self {
        Self {
            chat_id,
            bot_id,
            user_id: None,
            thread_id: None,
        }
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "chat={}/bot={}", self.chat_id, self.bot_id)?;
        if let Some(user_id) = self.user_id {
            write!(f, "/user={user_id}")?;
        }
        if let Some(thread_id) = self.thread_id {
            write!(f, "/thread={thread_id}")?;
        }
        Ok(())
    }
}
