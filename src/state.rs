use std::sync::Arc;

use crate::config::Config;
use crate::llm::AiClient;
use crate::prompt_builder::PromptBuilder;
use crate::services::{
    CharacterService, HistoryManager, LorebookService, PresetService, RewriteService,
};
use crate::storage::{CharacterStore, ChatStore, LorebookStore, PresetStore, RewriteRuleStore};

/// Composition root handed to the embedding layer (the chat-platform bot).
/// Everything inside is cheaply cloneable.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub characters: CharacterService,
    pub lorebooks: LorebookService,
    pub presets: PresetService,
    pub rewriter: RewriteService,
    pub history: HistoryManager,
    pub prompt_builder: PromptBuilder,
}

impl AppState {
    #[must_use]
    pub fn new(
        config: Config,
        character_store: Arc<dyn CharacterStore>,
        lorebook_store: Arc<dyn LorebookStore>,
        preset_store: Arc<dyn PresetStore>,
        rewrite_rule_store: Arc<dyn RewriteRuleStore>,
        chat_store: Arc<dyn ChatStore>,
        ai_client: Arc<dyn AiClient>,
    ) -> Self {
        let config = Arc::new(config);
        let characters = CharacterService::new(character_store);
        let lorebooks = LorebookService::new(lorebook_store);
        let presets = PresetService::new(preset_store);
        let rewriter = RewriteService::new(rewrite_rule_store);
        let history = HistoryManager::new(chat_store, ai_client, config.clone());
        let prompt_builder = PromptBuilder::new(
            characters.clone(),
            lorebooks.clone(),
            presets.clone(),
            rewriter.clone(),
        );
        Self {
            config,
            characters,
            lorebooks,
            presets,
            rewriter,
            history,
            prompt_builder,
        }
    }
}
