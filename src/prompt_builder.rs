// Assembles the outbound AI request: rewritten input, persona system
// prompt, triggered lore, alternation-repaired history, and preset
// parameters. Every optional feature degrades by omission; a build never
// hard-fails because one optional piece is broken or absent.

use serde::Serialize;
use tracing::warn;

use crate::errors::Result;
use crate::models::{ChatMessage, MessageRole, RewriteDirection};
use crate::services::character_service::build_system_prompt;
use crate::services::lorebook_service::{
    entries_from_character_book, inject_entries, trigger_from_entries,
};
use crate::services::preset_service::apply_preset;
use crate::services::{CharacterService, LorebookService, PresetService, RewriteService};

/// Stand-in user opener when the first real item is assistant-role.
pub const CONVERSATION_START_PLACEHOLDER: &str = "[conversation start]";

/// One message of the outbound request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptMessage {
    pub role: MessageRole,
    pub content: String,
}

impl PromptMessage {
    #[must_use]
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// The assembled request: ordered messages plus optional parameter
/// overrides for the caller's wire client.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AiRequest {
    pub messages: Vec<PromptMessage>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub top_k: Option<i32>,
    pub max_tokens: Option<u32>,
    pub presence_penalty: Option<f64>,
    pub frequency_penalty: Option<f64>,
    pub stop_sequences: Option<Vec<String>>,
}

/// Inputs for one build: owner scope, the context manager's build view,
/// the current raw input, and the target API family.
#[derive(Debug, Clone)]
pub struct BuildContext {
    pub user_id: Option<i64>,
    pub history: Vec<ChatMessage>,
    pub current_input: String,
    pub api_family: String,
}

#[derive(Clone)]
pub struct PromptBuilder {
    characters: CharacterService,
    lorebooks: LorebookService,
    presets: PresetService,
    rewriter: RewriteService,
}

impl PromptBuilder {
    #[must_use]
    pub fn new(
        characters: CharacterService,
        lorebooks: LorebookService,
        presets: PresetService,
        rewriter: RewriteService,
    ) -> Self {
        Self {
            characters,
            lorebooks,
            presets,
            rewriter,
        }
    }

    /// Builds the outbound request.
    ///
    /// # Errors
    ///
    /// Currently infallible in practice: every collaborator failure on this
    /// path degrades to omitting its feature. The `Result` stays in the
    /// signature because it is the contract boundary the bot layer calls.
    #[tracing::instrument(skip(self, context), err, fields(api_family = %context.api_family))]
    pub async fn build(&self, context: &BuildContext) -> Result<AiRequest> {
        // 1. Rewrite the current input; failure falls back internally.
        let rewritten_input = self
            .rewriter
            .apply(
                RewriteDirection::Input,
                context.user_id,
                &context.current_input,
            )
            .await;

        // 2. Persona system prompt.
        let character = match self.characters.load_active(context.user_id).await {
            Ok(character) => character,
            Err(error) => {
                warn!(%error, "character load failed, building without persona");
                None
            }
        };
        let persona_prompt = character
            .as_ref()
            .map(|c| build_system_prompt(&c.card.data))
            .unwrap_or_default();

        // 3. Trigger and inject lore: the active lorebook plus any lore
        //    embedded in the character card.
        let mut history = context.history.clone();
        let mut lore_entries = Vec::new();
        match self.lorebooks.load_active(context.user_id).await {
            Ok(Some(lorebook)) => {
                match self.lorebooks.triggered_entries(lorebook.id, &history).await {
                    Ok(mut triggered) => lore_entries.append(&mut triggered),
                    Err(error) => warn!(%error, "lore trigger failed, building without lore"),
                }
            }
            Ok(None) => {}
            Err(error) => warn!(%error, "lorebook load failed, building without lore"),
        }
        if let Some(character) = &character {
            if let Some(book) = &character.card.data.character_book {
                let embedded = trigger_from_entries(entries_from_character_book(book), &history);
                lore_entries.extend(embedded);
            }
        }
        if !lore_entries.is_empty() {
            // Stable by insertion order across both sources; the active
            // lorebook's entries keep precedence on ties.
            lore_entries.sort_by_key(|entry| entry.insertion_order);
            history = inject_entries(&lore_entries, history);
        }

        // 4. Message 0 absorbs every system-level section: the persona
        //    prompt, then the augmented history's system and summary
        //    content in list order (pre-existing system items, summaries,
        //    then injected lore by placement). The outbound protocol
        //    carries one system message, so the flat conversation below
        //    drops those roles.
        let mut system_content = persona_prompt;
        for message in &history {
            if message.is_truncation_marker {
                continue;
            }
            if matches!(message.role, MessageRole::System | MessageRole::Summary) {
                append_section(&mut system_content, &message.content.flatten_text());
            }
        }

        // 4–5. Flatten the conversation and repair alternation.
        let mut messages = Vec::new();
        if !system_content.is_empty() {
            messages.push(PromptMessage::new(MessageRole::System, system_content));
        }
        messages.extend(fold_alternating(
            &history,
            &rewritten_input,
            &context.current_input,
        ));

        // 6. Preset parameters.
        let mut request = AiRequest {
            messages,
            ..AiRequest::default()
        };
        match self.presets.load(context.user_id, &context.api_family).await {
            Ok(Some(preset)) => apply_preset(&preset.parameters, &mut request),
            Ok(None) => {}
            Err(error) => warn!(%error, "preset load failed, using request defaults"),
        }
        Ok(request)
    }
}

// Appends one section to the system message, separated by a blank line
// unless the text so far already ends with one.
fn append_section(target: &mut String, section: &str) {
    if section.is_empty() {
        return;
    }
    if !target.is_empty() && !target.ends_with("\n\n") {
        target.push_str("\n\n");
    }
    target.push_str(section);
}

// One deterministic fold over the source sequence, carrying the output
// tail role. Produces: length ≥ 1, first and last user-role, no two
// adjacent items with the same role. Consecutive same-role items merge
// with a blank-line separator; system/summary items and truncation markers
// are dropped (message 0 already represents them); a leading assistant
// item gains a synthetic user opener; a non-user tail is patched with the
// raw input.
fn fold_alternating(
    history: &[ChatMessage],
    rewritten_input: &str,
    raw_input: &str,
) -> Vec<PromptMessage> {
    let source = history
        .iter()
        .filter(|m| m.is_conversation())
        .map(|m| (m.role, m.content.flatten_text()))
        .chain(if rewritten_input.is_empty() {
            None
        } else {
            Some((MessageRole::User, rewritten_input.to_string()))
        });

    let mut output: Vec<PromptMessage> = Vec::new();
    for (role, text) in source {
        if text.is_empty() {
            continue;
        }
        if output.is_empty() && role == MessageRole::Assistant {
            output.push(PromptMessage::new(
                MessageRole::User,
                CONVERSATION_START_PLACEHOLDER,
            ));
        }
        match output.last_mut() {
            Some(last) if last.role == role => {
                last.content.push_str("\n\n");
                last.content.push_str(&text);
            }
            _ => output.push(PromptMessage::new(role, text)),
        }
    }

    let tail_is_user = output.last().is_some_and(|m| m.role == MessageRole::User);
    if !tail_is_user {
        let patch = if raw_input.is_empty() {
            CONVERSATION_START_PLACEHOLDER
        } else {
            raw_input
        };
        output.push(PromptMessage::new(MessageRole::User, patch));
    }
    output
}
