use std::sync::Arc;

use tracing::debug;

use crate::errors::{AppError, Result};
use crate::models::characters::{
    Character, CharacterCardDataV2, CharacterCardV2, SUPPORTED_CARD_MAJOR_VERSION,
    SUPPORTED_CARD_SPEC,
};
use crate::storage::CharacterStore;

#[derive(Clone)]
pub struct CharacterService {
    store: Arc<dyn CharacterStore>,
}

impl CharacterService {
    #[must_use]
    pub fn new(store: Arc<dyn CharacterStore>) -> Self {
        Self { store }
    }

    /// The active character for the scope. A missing selection is a normal
    /// "feature absent" outcome, not an error.
    ///
    /// # Errors
    ///
    /// Returns storage errors surfaced by the persistence collaborator.
    pub async fn load_active(&self, scope: Option<i64>) -> Result<Option<Character>> {
        match self.store.get_active_character(scope).await {
            Ok(character) => Ok(character),
            Err(error) if error.is_not_found() => Ok(None),
            Err(error) => Err(error),
        }
    }
}

/// Parses and version-gates a raw card document. Unsupported versions are
/// rejected, never coerced.
///
/// # Errors
///
/// Returns `AppError::InvalidInput` for malformed JSON and
/// `AppError::UnsupportedCardVersion` for a wrong spec or major version.
pub fn parse_character_card(raw: &[u8]) -> Result<CharacterCardV2> {
    let card: CharacterCardV2 = serde_json::from_slice(raw)
        .map_err(|e| AppError::InvalidInput(format!("malformed character card: {e}")))?;

    if card.spec != SUPPORTED_CARD_SPEC {
        return Err(AppError::UnsupportedCardVersion(format!(
            "expected spec '{SUPPORTED_CARD_SPEC}', found '{}'",
            card.spec
        )));
    }
    let major = card
        .spec_version
        .split('.')
        .next()
        .and_then(|m| m.parse::<u32>().ok());
    if major != Some(SUPPORTED_CARD_MAJOR_VERSION) {
        return Err(AppError::UnsupportedCardVersion(format!(
            "expected major version {SUPPORTED_CARD_MAJOR_VERSION}, found '{}'",
            card.spec_version
        )));
    }
    debug!(character = ?card.data.name, "parsed character card");
    Ok(card)
}

/// Builds the system prompt from card data.
///
/// An explicit system-prompt override wins verbatim; otherwise the prompt
/// concatenates description, personality, and scenario sections, each
/// followed by a blank line, skipping empty fields. Post-history
/// instructions are always appended on a new line when present. An empty
/// card yields an empty string.
#[must_use]
pub fn build_system_prompt(data: &CharacterCardDataV2) -> String {
    let mut prompt = String::new();

    if data.system_prompt.is_empty() {
        if !data.description.is_empty() {
            prompt.push_str(&data.description);
            prompt.push_str("\n\n");
        }
        if !data.personality.is_empty() {
            prompt.push_str(&format!("Personality: {}", data.personality));
            prompt.push_str("\n\n");
        }
        if !data.scenario.is_empty() {
            prompt.push_str(&format!("Scenario: {}", data.scenario));
            prompt.push_str("\n\n");
        }
    } else {
        prompt.push_str(&data.system_prompt);
    }

    if !data.post_history_instructions.is_empty() {
        prompt.push('\n');
        prompt.push_str(&data.post_history_instructions);
    }

    prompt
}

/// The card's opening message, if it has one.
#[must_use]
pub fn greeting(data: &CharacterCardDataV2) -> Option<&str> {
    if data.first_mes.is_empty() {
        None
    } else {
        Some(&data.first_mes)
    }
}

/// One of the card's alternate openings.
#[must_use]
pub fn alternate_greeting(data: &CharacterCardDataV2, index: usize) -> Option<&str> {
    data.alternate_greetings.get(index).map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card_json(spec: &str, version: &str) -> Vec<u8> {
        format!(
            r#"{{"spec":"{spec}","spec_version":"{version}","data":{{"name":"Mira","description":"A wandering bard"}}}}"#
        )
        .into_bytes()
    }

    #[test]
    fn test_parse_accepts_supported_version() {
        let card = parse_character_card(&card_json("chara_card_v2", "2.0")).unwrap();
        assert_eq!(card.data.name.as_deref(), Some("Mira"));
    }

    #[test]
    fn test_parse_rejects_wrong_spec() {
        let err = parse_character_card(&card_json("chara_card_v3", "3.0")).unwrap_err();
        assert!(matches!(err, AppError::UnsupportedCardVersion(_)));
    }

    #[test]
    fn test_parse_rejects_wrong_major() {
        let err = parse_character_card(&card_json("chara_card_v2", "1.0")).unwrap_err();
        assert!(matches!(err, AppError::UnsupportedCardVersion(_)));
    }

    #[test]
    fn test_parse_rejects_missing_version() {
        let err = parse_character_card(&card_json("chara_card_v2", "")).unwrap_err();
        assert!(matches!(err, AppError::UnsupportedCardVersion(_)));
    }

    #[test]
    fn test_parse_rejects_malformed_json() {
        let err = parse_character_card(b"not json").unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[test]
    fn test_prompt_description_only() {
        let data = CharacterCardDataV2 {
            description: "A friendly bot".to_string(),
            ..CharacterCardDataV2::default()
        };
        assert_eq!(build_system_prompt(&data), "A friendly bot\n\n");
    }

    #[test]
    fn test_prompt_all_sections() {
        let data = CharacterCardDataV2 {
            description: "A bard".to_string(),
            personality: "cheerful".to_string(),
            scenario: "a tavern".to_string(),
            ..CharacterCardDataV2::default()
        };
        assert_eq!(
            build_system_prompt(&data),
            "A bard\n\nPersonality: cheerful\n\nScenario: a tavern\n\n"
        );
    }

    #[test]
    fn test_prompt_override_wins_verbatim() {
        let data = CharacterCardDataV2 {
            description: "ignored".to_string(),
            system_prompt: "You are Mira.".to_string(),
            ..CharacterCardDataV2::default()
        };
        assert_eq!(build_system_prompt(&data), "You are Mira.");
    }

    #[test]
    fn test_prompt_post_history_appended_in_both_branches() {
        let with_override = CharacterCardDataV2 {
            system_prompt: "You are Mira.".to_string(),
            post_history_instructions: "Stay in character.".to_string(),
            ..CharacterCardDataV2::default()
        };
        assert_eq!(
            build_system_prompt(&with_override),
            "You are Mira.\nStay in character."
        );

        let without_override = CharacterCardDataV2 {
            description: "A bard".to_string(),
            post_history_instructions: "Stay in character.".to_string(),
            ..CharacterCardDataV2::default()
        };
        assert_eq!(
            build_system_prompt(&without_override),
            "A bard\n\n\nStay in character."
        );
    }

    #[test]
    fn test_prompt_empty_card_is_empty_string() {
        assert_eq!(build_system_prompt(&CharacterCardDataV2::default()), "");
    }

    #[test]
    fn test_greetings() {
        let data = CharacterCardDataV2 {
            first_mes: "Well met!".to_string(),
            alternate_greetings: vec!["Oh, hello.".to_string()],
            ..CharacterCardDataV2::default()
        };
        assert_eq!(greeting(&data), Some("Well met!"));
        assert_eq!(alternate_greeting(&data, 0), Some("Oh, hello."));
        assert_eq!(alternate_greeting(&data, 1), None);
        assert_eq!(greeting(&CharacterCardDataV2::default()), None);
    }
}
