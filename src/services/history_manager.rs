// Owns the conversation history: append, clear, build view, and
// threshold-triggered background summarization.
//
// All mutation serializes on a per-session async mutex, so two concurrent
// writers cannot interleave a read-modify-write and drop each other's
// change. The summarizer's LLM call runs outside the lock; the rewrite at
// the end re-reads the current history, so messages that arrived during
// the call are retained, and a clear that happened in between discards the
// stale summary.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::errors::Result;
use crate::llm::{AiClient, generate_simple_response};
use crate::models::{ChatMessage, MessageRole, SessionKey};
use crate::services::token_counter::estimate_history_tokens;
use crate::storage::ChatStore;

#[derive(Clone)]
pub struct HistoryManager {
    store: Arc<dyn ChatStore>,
    ai_client: Arc<dyn AiClient>,
    config: Arc<Config>,
    session_locks: Arc<DashMap<SessionKey, Arc<Mutex<()>>>>,
    summaries_in_flight: Arc<DashMap<SessionKey, ()>>,
}

impl HistoryManager {
    #[must_use]
    pub fn new(store: Arc<dyn ChatStore>, ai_client: Arc<dyn AiClient>, config: Arc<Config>) -> Self {
        Self {
            store,
            ai_client,
            config,
            session_locks: Arc::new(DashMap::new()),
            summaries_in_flight: Arc::new(DashMap::new()),
        }
    }

    fn session_lock(&self, session: &SessionKey) -> Arc<Mutex<()>> {
        self.session_locks
            .entry(session.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Appends one message and, when the build view crosses the summary
    /// threshold, kicks off a detached summarization. The caller never
    /// waits on summarization and never sees its errors.
    ///
    /// # Errors
    ///
    /// Returns storage errors surfaced by the persistence collaborator.
    #[tracing::instrument(skip_all, err, fields(session = %session))]
    pub async fn add_message(&self, session: &SessionKey, message: ChatMessage) -> Result<()> {
        let lock = self.session_lock(session);
        let _guard = lock.lock().await;

        self.store.append_message(session, message).await?;

        let history = self.store.get_history(session).await?;
        let view = build_view(&history);
        let estimated = estimate_history_tokens(&view);
        let threshold = summary_trigger_tokens(&self.config);
        debug!(estimated, threshold, "post-append context estimate");
        if estimated > threshold {
            self.spawn_summarization(session.clone());
        }
        Ok(())
    }

    /// Appends a truncation marker. Nothing is deleted; the build view
    /// restarts empty until new messages arrive.
    ///
    /// # Errors
    ///
    /// Returns storage errors surfaced by the persistence collaborator.
    #[tracing::instrument(skip_all, err, fields(session = %session))]
    pub async fn clear(&self, session: &SessionKey) -> Result<()> {
        let lock = self.session_lock(session);
        let _guard = lock.lock().await;
        self.store
            .append_message(session, ChatMessage::truncation_marker())
            .await
    }

    /// The build view: everything after the most recent truncation marker,
    /// with system and summary items floated to the front.
    ///
    /// # Errors
    ///
    /// Returns storage errors surfaced by the persistence collaborator.
    pub async fn build_history(&self, session: &SessionKey) -> Result<Vec<ChatMessage>> {
        let history = self.store.get_history(session).await?;
        Ok(build_view(&history))
    }

    /// Conversation items only, truncation and summary structure ignored.
    /// Intended for export and sharing, not request building.
    ///
    /// # Errors
    ///
    /// Returns storage errors surfaced by the persistence collaborator.
    pub async fn full_history(&self, session: &SessionKey) -> Result<Vec<ChatMessage>> {
        let history = self.store.get_history(session).await?;
        Ok(history
            .into_iter()
            .filter(ChatMessage::is_conversation)
            .collect())
    }

    // At most one summarization in flight per session; a second trigger
    // while one runs is dropped and the next threshold crossing retries.
    fn spawn_summarization(&self, session: SessionKey) {
        match self.summaries_in_flight.entry(session.clone()) {
            Entry::Occupied(_) => {
                debug!(%session, "summarization already in flight, skipping trigger");
                return;
            }
            Entry::Vacant(vacant) => {
                vacant.insert(());
            }
        }
        let manager = self.clone();
        tokio::spawn(async move {
            if let Err(error) = manager.summarize_session(&session).await {
                warn!(%session, %error, "background summarization failed");
            }
            manager.summaries_in_flight.remove(&session);
        });
    }

    /// Collapses the older part of the conversation into one summary item.
    ///
    /// No-op when the build view holds `2 × min_recent_pairs` conversation
    /// items or fewer. LLM failure or timeout skips the summarization
    /// (retried on the next threshold crossing) and leaves history
    /// untouched.
    ///
    /// # Errors
    ///
    /// Returns storage errors surfaced by the persistence collaborator.
    #[tracing::instrument(skip_all, err, fields(session = %session))]
    pub async fn summarize_session(&self, session: &SessionKey) -> Result<()> {
        let lock = self.session_lock(session);

        // Snapshot under the lock, then release it for the LLM call so
        // message appends keep flowing while the model works.
        let (snapshot_markers, to_summarize) = {
            let _guard = lock.lock().await;
            let history = self.store.get_history(session).await?;
            let view = build_view(&history);
            let conversation: Vec<ChatMessage> = view
                .iter()
                .filter(|m| m.is_conversation())
                .cloned()
                .collect();
            let keep = 2 * self.config.min_recent_pairs;
            if conversation.len() <= keep {
                debug!(
                    conversation_items = conversation.len(),
                    keep, "not enough conversation to summarize"
                );
                return Ok(());
            }
            let cut = conversation.len() - keep;
            (marker_count(&history), conversation[..cut].to_vec())
        };

        let prompt = build_summary_prompt(&to_summarize);
        let timeout = Duration::from_secs(self.config.summarization_timeout_secs);
        let response = tokio::time::timeout(
            timeout,
            generate_simple_response(
                self.ai_client.as_ref(),
                prompt,
                &self.config.summary_model,
            ),
        )
        .await;
        let summary_text = match response {
            Ok(Ok(text)) => text,
            Ok(Err(error)) => {
                warn!(%error, "summarization request failed, skipping");
                return Ok(());
            }
            Err(_) => {
                warn!(timeout_secs = self.config.summarization_timeout_secs, "summarization timed out, skipping");
                return Ok(());
            }
        };

        let _guard = lock.lock().await;
        let current = self.store.get_history(session).await?;
        if marker_count(&current) != snapshot_markers {
            info!("history cleared during summarization, discarding stale summary");
            return Ok(());
        }

        let rebuilt = rebuild_history(
            &current,
            to_summarize.len(),
            ChatMessage::summary(summary_text),
        );
        self.store.replace_history(session, rebuilt).await?;
        info!(
            summarized_items = to_summarize.len(),
            "history summarized"
        );
        Ok(())
    }
}

fn summary_trigger_tokens(config: &Config) -> usize {
    // Precision loss is irrelevant at context-window magnitudes.
    (config.max_context_tokens as f32 * config.summary_threshold) as usize
}

/// Everything strictly after the most recent truncation marker, recombined
/// as `[system…, summary…, conversation…]`.
#[must_use]
pub fn build_view(history: &[ChatMessage]) -> Vec<ChatMessage> {
    let start = history
        .iter()
        .rposition(|m| m.is_truncation_marker)
        .map_or(0, |i| i + 1);
    let tail = &history[start..];

    let mut system_items = Vec::new();
    let mut summary_items = Vec::new();
    let mut conversation = Vec::new();
    for message in tail {
        match message.role {
            MessageRole::System => system_items.push(message.clone()),
            MessageRole::Summary => summary_items.push(message.clone()),
            MessageRole::User | MessageRole::Assistant => conversation.push(message.clone()),
        }
    }

    let mut view = system_items;
    view.append(&mut summary_items);
    view.append(&mut conversation);
    view
}

fn marker_count(history: &[ChatMessage]) -> usize {
    history.iter().filter(|m| m.is_truncation_marker).count()
}

// Rewritten history: the prefix up to and including the last truncation
// marker verbatim, then system items, pre-existing summaries, the new
// summary, and the conversation minus the summarized head. Items appended
// while the LLM call ran fall into the retained set.
fn rebuild_history(
    current: &[ChatMessage],
    summarized_count: usize,
    new_summary: ChatMessage,
) -> Vec<ChatMessage> {
    let boundary = current
        .iter()
        .rposition(|m| m.is_truncation_marker)
        .map_or(0, |i| i + 1);

    let mut rebuilt: Vec<ChatMessage> = current[..boundary].to_vec();
    let tail = &current[boundary..];

    for message in tail {
        if message.role == MessageRole::System {
            rebuilt.push(message.clone());
        }
    }
    for message in tail {
        if message.role == MessageRole::Summary {
            rebuilt.push(message.clone());
        }
    }
    rebuilt.push(new_summary);
    rebuilt.extend(
        tail.iter()
            .filter(|m| m.is_conversation())
            .skip(summarized_count)
            .cloned(),
    );
    rebuilt
}

fn build_summary_prompt(messages: &[ChatMessage]) -> String {
    let mut prompt = String::from(
        "Condense the conversation below into a brief summary that preserves \
         the established facts, events, and tone. Respond with only the \
         summary text.\n\n",
    );
    for message in messages {
        prompt.push_str(&format!(
            "{}: {}\n",
            message.role,
            message.content.flatten_text()
        ));
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_view_without_marker_is_whole_history() {
        let history = vec![ChatMessage::user("a"), ChatMessage::assistant("b")];
        assert_eq!(build_view(&history).len(), 2);
    }

    #[test]
    fn test_build_view_cuts_at_last_marker() {
        let history = vec![
            ChatMessage::user("old"),
            ChatMessage::truncation_marker(),
            ChatMessage::user("older"),
            ChatMessage::truncation_marker(),
            ChatMessage::user("new"),
        ];
        let view = build_view(&history);
        assert_eq!(view.len(), 1);
        assert_eq!(view[0].content.flatten_text(), "new");
    }

    #[test]
    fn test_build_view_floats_system_and_summary_front() {
        let history = vec![
            ChatMessage::user("one"),
            ChatMessage::summary("past events"),
            ChatMessage::assistant("two"),
            ChatMessage::system("note"),
        ];
        let view = build_view(&history);
        let roles: Vec<MessageRole> = view.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![
                MessageRole::System,
                MessageRole::Summary,
                MessageRole::User,
                MessageRole::Assistant
            ]
        );
    }

    #[test]
    fn test_rebuild_preserves_marker_prefix() {
        let current = vec![
            ChatMessage::user("before clear"),
            ChatMessage::truncation_marker(),
            ChatMessage::user("one"),
            ChatMessage::assistant("two"),
            ChatMessage::user("three"),
        ];
        let rebuilt = rebuild_history(&current, 2, ChatMessage::summary("condensed"));
        assert_eq!(rebuilt[0].content.flatten_text(), "before clear");
        assert!(rebuilt[1].is_truncation_marker);
        assert_eq!(rebuilt[2].role, MessageRole::Summary);
        assert_eq!(rebuilt[3].content.flatten_text(), "three");
        assert_eq!(rebuilt.len(), 4);
    }

    #[test]
    fn test_summary_prompt_lines() {
        let prompt = build_summary_prompt(&[
            ChatMessage::user("Hello there"),
            ChatMessage::assistant("Well met"),
        ]);
        assert!(prompt.contains("user: Hello there\n"));
        assert!(prompt.contains("assistant: Well met\n"));
    }
}
