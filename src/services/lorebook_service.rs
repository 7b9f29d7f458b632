// Keyword-triggered lore activation and placement-aware injection.

use std::sync::Arc;

use regex::RegexBuilder;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::models::characters::CharacterBook;
use crate::models::{ChatMessage, Lorebook, LorebookEntry, LorePlacement, MessageRole};
use crate::storage::LorebookStore;

#[derive(Clone)]
pub struct LorebookService {
    store: Arc<dyn LorebookStore>,
}

impl LorebookService {
    #[must_use]
    pub fn new(store: Arc<dyn LorebookStore>) -> Self {
        Self { store }
    }

    /// The active lorebook for the scope; missing selection is "feature
    /// absent".
    ///
    /// # Errors
    ///
    /// Returns storage errors surfaced by the persistence collaborator.
    pub async fn load_active(&self, scope: Option<i64>) -> Result<Option<Lorebook>> {
        match self.store.get_active_lorebook(scope).await {
            Ok(lorebook) => Ok(lorebook),
            Err(error) if error.is_not_found() => Ok(None),
            Err(error) => Err(error),
        }
    }

    /// Entries of `lorebook_id` activated by the conversation, ordered
    /// ascending by `(insertion_order, id)`.
    ///
    /// # Errors
    ///
    /// Returns storage errors surfaced by the persistence collaborator.
    #[tracing::instrument(skip(self, history), err)]
    pub async fn triggered_entries(
        &self,
        lorebook_id: i64,
        history: &[ChatMessage],
    ) -> Result<Vec<LorebookEntry>> {
        let entries = self.store.list_entries(lorebook_id).await?;
        Ok(trigger_from_entries(entries, history))
    }
}

/// Pure trigger evaluation over an entry set. Also used for lore embedded
/// in a character card.
#[must_use]
pub fn trigger_from_entries(
    entries: Vec<LorebookEntry>,
    history: &[ChatMessage],
) -> Vec<LorebookEntry> {
    let corpus = build_corpus(history);

    let mut activated: Vec<LorebookEntry> = entries
        .into_iter()
        .filter(|entry| entry.is_enabled && entry_activates(entry, &corpus))
        .collect();
    activated.sort_by_key(|entry| (entry.insertion_order, entry.id));
    debug!(activated = activated.len(), "lore trigger evaluation complete");
    activated
}

// Case-folded matching corpus: the textual content of every history item,
// newline-joined so keys cannot match across message boundaries.
fn build_corpus(history: &[ChatMessage]) -> String {
    let mut corpus = String::new();
    for message in history {
        let text = message.content.flatten_text();
        if text.is_empty() {
            continue;
        }
        if !corpus.is_empty() {
            corpus.push('\n');
        }
        corpus.push_str(&text.to_lowercase());
    }
    corpus
}

fn entry_activates(entry: &LorebookEntry, corpus: &str) -> bool {
    if entry.is_constant {
        return true;
    }
    if entry.keys.iter().any(|key| key_matches(key, corpus)) {
        return true;
    }
    // Selective entries get a second chance on their secondary keys; a
    // secondary match alone is sufficient.
    entry.is_selective
        && entry
            .secondary_keys
            .iter()
            .any(|key| key_matches(key, corpus))
}

// A key wrapped in `/…/` is a regular expression; anything else is a
// case-insensitive substring. The corpus is already folded, but regex keys
// still compile case-insensitively so uppercase-authored patterns match.
fn key_matches(key: &str, corpus: &str) -> bool {
    if key.is_empty() {
        return false;
    }
    if key.len() >= 2 && key.starts_with('/') && key.ends_with('/') {
        let inner = &key[1..key.len() - 1];
        match RegexBuilder::new(inner).case_insensitive(true).build() {
            Ok(compiled) => compiled.is_match(corpus),
            Err(error) => {
                warn!(%error, key, "invalid regex lore key, treating as non-match");
                false
            }
        }
    } else {
        corpus.contains(&key.to_lowercase())
    }
}

/// Inserts activated entries into a build-view history as synthetic
/// system items.
///
/// `BeforeCharacter` entries go immediately after the leading run of
/// system/summary items; `AfterCharacter` entries go immediately before
/// the trailing run of user items (at the very end when the tail is not
/// user-role). Both groups keep their internal priority order.
#[must_use]
pub fn inject_entries(
    entries: &[LorebookEntry],
    history: Vec<ChatMessage>,
) -> Vec<ChatMessage> {
    if entries.is_empty() {
        return history;
    }

    let before: Vec<ChatMessage> = entries
        .iter()
        .filter(|entry| entry.placement == LorePlacement::BeforeCharacter)
        .map(|entry| ChatMessage::system(entry.content.clone()))
        .collect();
    let after: Vec<ChatMessage> = entries
        .iter()
        .filter(|entry| entry.placement == LorePlacement::AfterCharacter)
        .map(|entry| ChatMessage::system(entry.content.clone()))
        .collect();

    let mut result = history;

    let leading_end = result
        .iter()
        .position(|m| !matches!(m.role, MessageRole::System | MessageRole::Summary))
        .unwrap_or(result.len());
    result.splice(leading_end..leading_end, before);

    let trailing_start = result
        .iter()
        .rposition(|m| m.role != MessageRole::User)
        .map_or(0, |i| i + 1);
    result.splice(trailing_start..trailing_start, after);

    result
}

/// Converts a card's embedded lore into regular entries so it participates
/// in triggering alongside the active lorebook. Synthetic entries carry
/// `lorebook_id` 0 and index-based ids for deterministic tie ordering.
#[must_use]
pub fn entries_from_character_book(book: &CharacterBook) -> Vec<LorebookEntry> {
    book.entries
        .iter()
        .enumerate()
        .map(|(index, entry)| LorebookEntry {
            id: entry.id.map_or(index as i64, i64::from),
            lorebook_id: 0,
            external_uid: entry.id,
            title: entry.comment.clone(),
            keys: entry.keys.clone(),
            secondary_keys: entry.secondary_keys.clone(),
            content: entry.content.clone(),
            is_constant: entry.constant,
            is_selective: entry.selective,
            insertion_order: entry.insertion_order,
            placement: entry.position.unwrap_or_default(),
            is_enabled: entry.enabled,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: i64, keys: &[&str], insertion_order: i32) -> LorebookEntry {
        LorebookEntry {
            id,
            lorebook_id: 1,
            external_uid: None,
            title: None,
            keys: keys.iter().map(ToString::to_string).collect(),
            secondary_keys: Vec::new(),
            content: format!("entry {id}"),
            is_constant: false,
            is_selective: false,
            insertion_order,
            placement: LorePlacement::BeforeCharacter,
            is_enabled: true,
        }
    }

    fn history_mentioning(text: &str) -> Vec<ChatMessage> {
        vec![ChatMessage::user(text)]
    }

    #[test]
    fn test_constant_entry_always_triggers() {
        let mut constant = entry(1, &[], 100);
        constant.is_constant = true;
        let triggered = trigger_from_entries(vec![constant], &history_mentioning("nothing"));
        assert_eq!(triggered.len(), 1);
    }

    #[test]
    fn test_disabled_entry_never_triggers() {
        let mut disabled = entry(1, &["dragon"], 100);
        disabled.is_enabled = false;
        let mut disabled_constant = entry(2, &[], 100);
        disabled_constant.is_constant = true;
        disabled_constant.is_enabled = false;
        let triggered = trigger_from_entries(
            vec![disabled, disabled_constant],
            &history_mentioning("a dragon appears"),
        );
        assert!(triggered.is_empty());
    }

    #[test]
    fn test_substring_match_is_case_insensitive() {
        let triggered = trigger_from_entries(
            vec![entry(1, &["Dragon"], 100)],
            &history_mentioning("the DRAGONS circle above"),
        );
        assert_eq!(triggered.len(), 1);
    }

    #[test]
    fn test_priority_orders_matches() {
        let low_priority = entry(1, &["dragon"], 200);
        let high_priority = entry(2, &["dragon"], 50);
        let triggered = trigger_from_entries(
            vec![low_priority, high_priority],
            &history_mentioning("dragons everywhere"),
        );
        let orders: Vec<i32> = triggered.iter().map(|e| e.insertion_order).collect();
        assert_eq!(orders, vec![50, 200]);
    }

    #[test]
    fn test_regex_key() {
        let triggered = trigger_from_entries(
            vec![entry(1, &[r"/drag(on|oness)\b/"], 100)],
            &history_mentioning("a dragon lands"),
        );
        assert_eq!(triggered.len(), 1);

        let not_triggered = trigger_from_entries(
            vec![entry(1, &[r"/drag(on|oness)\b/"], 100)],
            &history_mentioning("dragging a cart"),
        );
        assert!(not_triggered.is_empty());
    }

    #[test]
    fn test_invalid_regex_key_is_non_match() {
        let triggered = trigger_from_entries(
            vec![entry(1, &["/([unclosed/"], 100)],
            &history_mentioning("([unclosed"),
        );
        assert!(triggered.is_empty());
    }

    #[test]
    fn test_selective_entry_secondary_keys() {
        let mut selective = entry(1, &["queen"], 100);
        selective.is_selective = true;
        selective.secondary_keys = vec!["castle".to_string()];

        // Secondary match alone activates a selective entry.
        let triggered = trigger_from_entries(
            vec![selective.clone()],
            &history_mentioning("we approach the castle"),
        );
        assert_eq!(triggered.len(), 1);

        // A non-selective entry gets no second chance.
        let mut plain = selective;
        plain.is_selective = false;
        let not_triggered =
            trigger_from_entries(vec![plain], &history_mentioning("we approach the castle"));
        assert!(not_triggered.is_empty());
    }

    #[test]
    fn test_corpus_ignores_non_text_parts() {
        use crate::models::{ContentPart, ContentPartKind, MessageContent};
        let message = ChatMessage::new(
            MessageRole::User,
            MessageContent::Parts(vec![ContentPart {
                kind: ContentPartKind::Image,
                text: Some("dragon".to_string()),
                image_url: Some("https://example.com/dragon.png".to_string()),
            }]),
        );
        let triggered = trigger_from_entries(vec![entry(1, &["dragon"], 100)], &[message]);
        assert!(triggered.is_empty());
    }

    #[test]
    fn test_inject_before_character_placement() {
        let entries = vec![entry(1, &[], 100)];
        let history = vec![
            ChatMessage::system("persona"),
            ChatMessage::summary("earlier events"),
            ChatMessage::user("hi"),
            ChatMessage::assistant("hello"),
        ];
        let injected = inject_entries(&entries, history);
        assert_eq!(injected.len(), 5);
        // After the leading system/summary run, before the conversation.
        assert_eq!(injected[2].content.flatten_text(), "entry 1");
        assert_eq!(injected[2].role, MessageRole::System);
    }

    #[test]
    fn test_inject_after_character_placement() {
        let mut after = entry(1, &[], 100);
        after.placement = LorePlacement::AfterCharacter;
        let history = vec![
            ChatMessage::user("hi"),
            ChatMessage::assistant("hello"),
            ChatMessage::user("tell me more"),
            ChatMessage::user("please"),
        ];
        let injected = inject_entries(&[after], history);
        // Before the trailing run of user items.
        assert_eq!(injected[2].content.flatten_text(), "entry 1");
        assert_eq!(injected[3].content.flatten_text(), "tell me more");
    }

    #[test]
    fn test_inject_after_character_at_end_when_tail_not_user() {
        let mut after = entry(1, &[], 100);
        after.placement = LorePlacement::AfterCharacter;
        let history = vec![ChatMessage::user("hi"), ChatMessage::assistant("hello")];
        let injected = inject_entries(&[after], history);
        assert_eq!(injected.last().unwrap().content.flatten_text(), "entry 1");
    }

    #[test]
    fn test_inject_preserves_group_order() {
        let first = entry(1, &[], 50);
        let second = entry(2, &[], 100);
        let injected = inject_entries(&[first, second], vec![ChatMessage::user("hi")]);
        assert_eq!(injected[0].content.flatten_text(), "entry 1");
        assert_eq!(injected[1].content.flatten_text(), "entry 2");
    }

    #[test]
    fn test_entries_from_character_book() {
        use crate::models::characters::{CharacterBook, CharacterBookEntry};
        let book = CharacterBook {
            name: Some("Embedded".to_string()),
            entries: vec![CharacterBookEntry {
                id: Some(7),
                keys: vec!["tavern".to_string()],
                content: "The Gilded Flagon".to_string(),
                ..CharacterBookEntry::default()
            }],
        };
        let entries = entries_from_character_book(&book);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].external_uid, Some(7));
        assert!(entries[0].is_enabled);
        assert_eq!(entries[0].content, "The Gilded Flagon");
    }
}
