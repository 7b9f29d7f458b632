pub mod characters;
pub mod chats;
pub mod lorebooks;
pub mod presets;
pub mod rewrite_rules;

pub use characters::{Character, CharacterBook, CharacterBookEntry, CharacterCardDataV2, CharacterCardV2, NewCharacter};
pub use chats::{ChatMessage, ContentPart, ContentPartKind, MessageContent, MessageRole, SessionKey};
pub use lorebooks::{Lorebook, LorebookEntry, LorePlacement, NewLorebook, NewLorebookEntry};
pub use presets::{GenerationPreset, NewGenerationPreset, PresetParameters};
pub use rewrite_rules::{NewRewriteRule, RewriteDirection, RewriteRule};
