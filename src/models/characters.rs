use serde::{Deserialize, Serialize};

use crate::models::lorebooks::LorePlacement;

/// Card documents must carry this spec identifier.
pub const SUPPORTED_CARD_SPEC: &str = "chara_card_v2";
/// Supported major version of the card document. Other majors are rejected,
/// not coerced.
pub const SUPPORTED_CARD_MAJOR_VERSION: u32 = 2;

/// A persona as stored: ownership wrapper plus the raw versioned document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub id: i64,
    /// `None` marks a global character visible to every scope.
    pub user_id: Option<i64>,
    pub name: String,
    pub card: CharacterCardV2,
}

/// Payload for creating a character through the persistence contract.
#[derive(Debug, Clone)]
pub struct NewCharacter {
    pub user_id: Option<i64>,
    pub name: String,
    pub card: CharacterCardV2,
}

/// Versioned character card document.
#[derive(Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct CharacterCardV2 {
    #[serde(default)]
    pub spec: String,
    #[serde(default)]
    pub spec_version: String,
    #[serde(default)]
    pub data: CharacterCardDataV2,
}

impl std::fmt::Debug for CharacterCardV2 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CharacterCardV2")
            .field("spec", &self.spec)
            .field("spec_version", &self.spec_version)
            .field("data", &self.data)
            .finish()
    }
}

/// Card data payload. Free-text fields are user-authored and redacted from
/// Debug output.
#[derive(Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct CharacterCardDataV2 {
    pub name: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub personality: String,
    #[serde(default)]
    pub scenario: String,
    #[serde(default)]
    pub first_mes: String,
    #[serde(default)]
    pub mes_example: String,
    #[serde(default)]
    pub creator_notes: String,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default)]
    pub post_history_instructions: String,
    #[serde(default)]
    pub alternate_greetings: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub creator: String,
    #[serde(default)]
    pub character_version: String,
    /// Optional embedded lore shipped inside the card.
    pub character_book: Option<CharacterBook>,
}

impl std::fmt::Debug for CharacterCardDataV2 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CharacterCardDataV2")
            .field("name", &self.name)
            .field("description", &"[REDACTED]")
            .field("personality", &"[REDACTED]")
            .field("scenario", &"[REDACTED]")
            .field("first_mes", &"[REDACTED]")
            .field("system_prompt", &"[REDACTED]")
            .field("post_history_instructions", &"[REDACTED]")
            .field("tags", &self.tags)
            .field("character_version", &self.character_version)
            .field("character_book", &self.character_book.is_some())
            .finish_non_exhaustive()
    }
}

/// Lore embedded in a character card.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct CharacterBook {
    pub name: Option<String>,
    #[serde(default)]
    pub entries: Vec<CharacterBookEntry>,
}

/// One embedded lore entry, in the card document's own shape. Converted to
/// a regular lorebook entry before triggering.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct CharacterBookEntry {
    pub id: Option<i32>,
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(default)]
    pub secondary_keys: Vec<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub constant: bool,
    #[serde(default)]
    pub selective: bool,
    #[serde(default)]
    pub insertion_order: i32,
    #[serde(default = "default_entry_enabled")]
    pub enabled: bool,
    pub position: Option<LorePlacement>,
    pub comment: Option<String>,
}

const fn default_entry_enabled() -> bool {
    true
}
