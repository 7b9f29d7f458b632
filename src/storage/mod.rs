// Persistence contracts. The relational implementation lives with an
// external collaborator; this crate only consumes these traits. "Scope" in
// the list operations means global resources (owner = None) plus the given
// user's personal resources. Not-found surfaces as `AppError::NotFound`.

use async_trait::async_trait;

use crate::errors::Result;
use crate::models::{
    Character, ChatMessage, GenerationPreset, Lorebook, LorebookEntry, NewCharacter,
    NewGenerationPreset, NewLorebook, NewLorebookEntry, NewRewriteRule, RewriteRule, SessionKey,
};

pub mod memory;

pub use memory::MemoryStore;

#[async_trait]
pub trait CharacterStore: Send + Sync {
    async fn create_character(&self, character: NewCharacter) -> Result<Character>;
    async fn get_character(&self, id: i64) -> Result<Character>;
    async fn list_characters(&self, scope: Option<i64>) -> Result<Vec<Character>>;
    async fn update_character(&self, character: Character) -> Result<Character>;
    async fn delete_character(&self, id: i64) -> Result<()>;
    /// The character currently selected for the scope, if any.
    async fn get_active_character(&self, scope: Option<i64>) -> Result<Option<Character>>;
    async fn set_active_character(&self, scope: Option<i64>, id: i64) -> Result<()>;
}

#[async_trait]
pub trait LorebookStore: Send + Sync {
    async fn create_lorebook(&self, lorebook: NewLorebook) -> Result<Lorebook>;
    async fn get_lorebook(&self, id: i64) -> Result<Lorebook>;
    async fn list_lorebooks(&self, scope: Option<i64>) -> Result<Vec<Lorebook>>;
    async fn delete_lorebook(&self, id: i64) -> Result<()>;
    async fn get_active_lorebook(&self, scope: Option<i64>) -> Result<Option<Lorebook>>;
    async fn set_active_lorebook(&self, scope: Option<i64>, id: i64) -> Result<()>;

    async fn create_entry(&self, entry: NewLorebookEntry) -> Result<LorebookEntry>;
    async fn update_entry(&self, entry: LorebookEntry) -> Result<LorebookEntry>;
    async fn delete_entry(&self, id: i64) -> Result<()>;
    async fn list_entries(&self, lorebook_id: i64) -> Result<Vec<LorebookEntry>>;
}

#[async_trait]
pub trait PresetStore: Send + Sync {
    async fn create_preset(&self, preset: NewGenerationPreset) -> Result<GenerationPreset>;
    async fn get_preset(&self, id: i64) -> Result<GenerationPreset>;
    async fn list_presets(&self, scope: Option<i64>) -> Result<Vec<GenerationPreset>>;
    async fn delete_preset(&self, id: i64) -> Result<()>;
    /// The preset currently selected for the scope and API family, if any.
    async fn get_active_preset(
        &self,
        scope: Option<i64>,
        api_family: &str,
    ) -> Result<Option<GenerationPreset>>;
    async fn set_active_preset(&self, scope: Option<i64>, id: i64) -> Result<()>;
}

#[async_trait]
pub trait RewriteRuleStore: Send + Sync {
    async fn create_rule(&self, rule: NewRewriteRule) -> Result<RewriteRule>;
    async fn get_rule(&self, id: i64) -> Result<RewriteRule>;
    async fn list_rules(&self, scope: Option<i64>) -> Result<Vec<RewriteRule>>;
    async fn update_rule(&self, rule: RewriteRule) -> Result<RewriteRule>;
    async fn delete_rule(&self, id: i64) -> Result<()>;
}

/// History persistence. The context manager is the sole caller of the
/// mutating operations; per-session serialization happens above this
/// trait, so implementations only need individually consistent calls.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Full ordered history; empty for a session never written to
    /// (sessions are created lazily on first append).
    async fn get_history(&self, session: &SessionKey) -> Result<Vec<ChatMessage>>;
    async fn append_message(&self, session: &SessionKey, message: ChatMessage) -> Result<()>;
    /// Atomically replaces the whole history (summarization rewrite).
    async fn replace_history(
        &self,
        session: &SessionKey,
        history: Vec<ChatMessage>,
    ) -> Result<()>;
}

/// Visibility rule shared by every resource type: global resources belong
/// to everyone, personal resources only to their owner's scope.
#[must_use]
pub fn visible_to(owner: Option<i64>, scope: Option<i64>) -> bool {
    owner.is_none() || owner == scope
}
