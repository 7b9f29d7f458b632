use serde::{Deserialize, Serialize};

// --------------------
// --- Lorebook Model ---
// --------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Lorebook {
    pub id: i64,
    /// `None` marks a global lorebook visible to every scope.
    pub user_id: Option<i64>,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewLorebook {
    pub user_id: Option<i64>,
    pub name: String,
    pub description: Option<String>,
}

// -------------------------
// --- LorebookEntry Model ---
// -------------------------

/// Where an activated entry is injected relative to the persona definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LorePlacement {
    #[default]
    #[serde(rename = "before_char")]
    BeforeCharacter,
    #[serde(rename = "after_char")]
    AfterCharacter,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LorebookEntry {
    pub id: i64,
    pub lorebook_id: i64,
    /// Import-time reference for idempotent re-import; uniqueness is the
    /// importer's concern, not enforced here.
    pub external_uid: Option<i32>,
    pub title: Option<String>,
    pub keys: Vec<String>,
    pub secondary_keys: Vec<String>,
    pub content: String,
    /// Constant entries activate unconditionally; keys are ignored.
    pub is_constant: bool,
    /// Selective entries get a second chance on their secondary keys when
    /// no primary key matched.
    pub is_selective: bool,
    /// Lower value = higher priority = emitted first.
    pub insertion_order: i32,
    pub placement: LorePlacement,
    pub is_enabled: bool,
}

#[derive(Debug, Clone)]
pub struct NewLorebookEntry {
    pub lorebook_id: i64,
    pub external_uid: Option<i32>,
    pub title: Option<String>,
    pub keys: Vec<String>,
    pub secondary_keys: Vec<String>,
    pub content: String,
    pub is_constant: bool,
    pub is_selective: bool,
    pub insertion_order: i32,
    pub placement: LorePlacement,
    pub is_enabled: bool,
}

impl Default for NewLorebookEntry {
    fn default() -> Self {
        Self {
            lorebook_id: 0,
            external_uid: None,
            title: None,
            keys: Vec::new(),
            secondary_keys: Vec::new(),
            content: String::new(),
            is_constant: false,
            is_selective: false,
            insertion_order: 100,
            placement: LorePlacement::default(),
            is_enabled: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placement_serde_names() {
        assert_eq!(
            serde_json::to_string(&LorePlacement::BeforeCharacter).unwrap(),
            "\"before_char\""
        );
        let placement: LorePlacement = serde_json::from_str("\"after_char\"").unwrap();
        assert_eq!(placement, LorePlacement::AfterCharacter);
    }

    #[test]
    fn test_new_entry_defaults() {
        let entry = NewLorebookEntry::default();
        assert!(entry.is_enabled);
        assert!(!entry.is_constant);
        assert_eq!(entry.placement, LorePlacement::BeforeCharacter);
    }
}
