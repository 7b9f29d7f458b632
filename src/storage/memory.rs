// In-memory store backing tests and embedded single-process use. Each
// collection sits behind its own RwLock; ids come from one shared counter.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;

use crate::errors::{AppError, Result};
use crate::models::{
    Character, ChatMessage, GenerationPreset, Lorebook, LorebookEntry, NewCharacter,
    NewGenerationPreset, NewLorebook, NewLorebookEntry, NewRewriteRule, RewriteRule, SessionKey,
};

use super::{
    CharacterStore, ChatStore, LorebookStore, PresetStore, RewriteRuleStore, visible_to,
};

#[derive(Default)]
pub struct MemoryStore {
    next_id: AtomicI64,
    characters: RwLock<HashMap<i64, Character>>,
    active_characters: RwLock<HashMap<Option<i64>, i64>>,
    lorebooks: RwLock<HashMap<i64, Lorebook>>,
    active_lorebooks: RwLock<HashMap<Option<i64>, i64>>,
    lorebook_entries: RwLock<HashMap<i64, LorebookEntry>>,
    presets: RwLock<HashMap<i64, GenerationPreset>>,
    active_presets: RwLock<HashMap<(Option<i64>, String), i64>>,
    rewrite_rules: RwLock<HashMap<i64, RewriteRule>>,
    histories: RwLock<HashMap<SessionKey, Vec<ChatMessage>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            ..Self::default()
        }
    }

    fn allocate_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

// Lock poisoning only happens after a panic in another accessor.
fn lock_error<T>(_: T) -> AppError {
    AppError::StorageError("memory store lock poisoned".to_string())
}

#[async_trait]
impl CharacterStore for MemoryStore {
    async fn create_character(&self, character: NewCharacter) -> Result<Character> {
        let created = Character {
            id: self.allocate_id(),
            user_id: character.user_id,
            name: character.name,
            card: character.card,
        };
        self.characters
            .write()
            .map_err(lock_error)?
            .insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_character(&self, id: i64) -> Result<Character> {
        self.characters
            .read()
            .map_err(lock_error)?
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("character {id}")))
    }

    async fn list_characters(&self, scope: Option<i64>) -> Result<Vec<Character>> {
        let mut visible: Vec<Character> = self
            .characters
            .read()
            .map_err(lock_error)?
            .values()
            .filter(|c| visible_to(c.user_id, scope))
            .cloned()
            .collect();
        visible.sort_by_key(|c| c.id);
        Ok(visible)
    }

    async fn update_character(&self, character: Character) -> Result<Character> {
        let mut characters = self.characters.write().map_err(lock_error)?;
        if !characters.contains_key(&character.id) {
            return Err(AppError::NotFound(format!("character {}", character.id)));
        }
        characters.insert(character.id, character.clone());
        Ok(character)
    }

    async fn delete_character(&self, id: i64) -> Result<()> {
        self.characters
            .write()
            .map_err(lock_error)?
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(format!("character {id}")))
    }

    async fn get_active_character(&self, scope: Option<i64>) -> Result<Option<Character>> {
        let active_id = self
            .active_characters
            .read()
            .map_err(lock_error)?
            .get(&scope)
            .copied();
        match active_id {
            Some(id) => Ok(self.characters.read().map_err(lock_error)?.get(&id).cloned()),
            None => Ok(None),
        }
    }

    async fn set_active_character(&self, scope: Option<i64>, id: i64) -> Result<()> {
        if !self.characters.read().map_err(lock_error)?.contains_key(&id) {
            return Err(AppError::NotFound(format!("character {id}")));
        }
        self.active_characters
            .write()
            .map_err(lock_error)?
            .insert(scope, id);
        Ok(())
    }
}

#[async_trait]
impl LorebookStore for MemoryStore {
    async fn create_lorebook(&self, lorebook: NewLorebook) -> Result<Lorebook> {
        let created = Lorebook {
            id: self.allocate_id(),
            user_id: lorebook.user_id,
            name: lorebook.name,
            description: lorebook.description,
        };
        self.lorebooks
            .write()
            .map_err(lock_error)?
            .insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_lorebook(&self, id: i64) -> Result<Lorebook> {
        self.lorebooks
            .read()
            .map_err(lock_error)?
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("lorebook {id}")))
    }

    async fn list_lorebooks(&self, scope: Option<i64>) -> Result<Vec<Lorebook>> {
        let mut visible: Vec<Lorebook> = self
            .lorebooks
            .read()
            .map_err(lock_error)?
            .values()
            .filter(|l| visible_to(l.user_id, scope))
            .cloned()
            .collect();
        visible.sort_by_key(|l| l.id);
        Ok(visible)
    }

    async fn delete_lorebook(&self, id: i64) -> Result<()> {
        self.lorebooks
            .write()
            .map_err(lock_error)?
            .remove(&id)
            .ok_or_else(|| AppError::NotFound(format!("lorebook {id}")))?;
        self.lorebook_entries
            .write()
            .map_err(lock_error)?
            .retain(|_, entry| entry.lorebook_id != id);
        Ok(())
    }

    async fn get_active_lorebook(&self, scope: Option<i64>) -> Result<Option<Lorebook>> {
        let active_id = self
            .active_lorebooks
            .read()
            .map_err(lock_error)?
            .get(&scope)
            .copied();
        match active_id {
            Some(id) => Ok(self.lorebooks.read().map_err(lock_error)?.get(&id).cloned()),
            None => Ok(None),
        }
    }

    async fn set_active_lorebook(&self, scope: Option<i64>, id: i64) -> Result<()> {
        if !self.lorebooks.read().map_err(lock_error)?.contains_key(&id) {
            return Err(AppError::NotFound(format!("lorebook {id}")));
        }
        self.active_lorebooks
            .write()
            .map_err(lock_error)?
            .insert(scope, id);
        Ok(())
    }

    async fn create_entry(&self, entry: NewLorebookEntry) -> Result<LorebookEntry> {
        if !self
            .lorebooks
            .read()
            .map_err(lock_error)?
            .contains_key(&entry.lorebook_id)
        {
            return Err(AppError::NotFound(format!("lorebook {}", entry.lorebook_id)));
        }
        let created = LorebookEntry {
            id: self.allocate_id(),
            lorebook_id: entry.lorebook_id,
            external_uid: entry.external_uid,
            title: entry.title,
            keys: entry.keys,
            secondary_keys: entry.secondary_keys,
            content: entry.content,
            is_constant: entry.is_constant,
            is_selective: entry.is_selective,
            insertion_order: entry.insertion_order,
            placement: entry.placement,
            is_enabled: entry.is_enabled,
        };
        self.lorebook_entries
            .write()
            .map_err(lock_error)?
            .insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_entry(&self, entry: LorebookEntry) -> Result<LorebookEntry> {
        let mut entries = self.lorebook_entries.write().map_err(lock_error)?;
        if !entries.contains_key(&entry.id) {
            return Err(AppError::NotFound(format!("lorebook entry {}", entry.id)));
        }
        entries.insert(entry.id, entry.clone());
        Ok(entry)
    }

    async fn delete_entry(&self, id: i64) -> Result<()> {
        self.lorebook_entries
            .write()
            .map_err(lock_error)?
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(format!("lorebook entry {id}")))
    }

    async fn list_entries(&self, lorebook_id: i64) -> Result<Vec<LorebookEntry>> {
        let mut entries: Vec<LorebookEntry> = self
            .lorebook_entries
            .read()
            .map_err(lock_error)?
            .values()
            .filter(|entry| entry.lorebook_id == lorebook_id)
            .cloned()
            .collect();
        entries.sort_by_key(|entry| entry.id);
        Ok(entries)
    }
}

#[async_trait]
impl PresetStore for MemoryStore {
    async fn create_preset(&self, preset: NewGenerationPreset) -> Result<GenerationPreset> {
        let created = GenerationPreset {
            id: self.allocate_id(),
            user_id: preset.user_id,
            name: preset.name,
            api_family: preset.api_family,
            parameters: preset.parameters,
        };
        self.presets
            .write()
            .map_err(lock_error)?
            .insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_preset(&self, id: i64) -> Result<GenerationPreset> {
        self.presets
            .read()
            .map_err(lock_error)?
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("preset {id}")))
    }

    async fn list_presets(&self, scope: Option<i64>) -> Result<Vec<GenerationPreset>> {
        let mut visible: Vec<GenerationPreset> = self
            .presets
            .read()
            .map_err(lock_error)?
            .values()
            .filter(|p| visible_to(p.user_id, scope))
            .cloned()
            .collect();
        visible.sort_by_key(|p| p.id);
        Ok(visible)
    }

    async fn delete_preset(&self, id: i64) -> Result<()> {
        self.presets
            .write()
            .map_err(lock_error)?
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(format!("preset {id}")))
    }

    async fn get_active_preset(
        &self,
        scope: Option<i64>,
        api_family: &str,
    ) -> Result<Option<GenerationPreset>> {
        let active_id = self
            .active_presets
            .read()
            .map_err(lock_error)?
            .get(&(scope, api_family.to_string()))
            .copied();
        match active_id {
            Some(id) => Ok(self.presets.read().map_err(lock_error)?.get(&id).cloned()),
            None => Ok(None),
        }
    }

    async fn set_active_preset(&self, scope: Option<i64>, id: i64) -> Result<()> {
        let api_family = self
            .presets
            .read()
            .map_err(lock_error)?
            .get(&id)
            .map(|p| p.api_family.clone())
            .ok_or_else(|| AppError::NotFound(format!("preset {id}")))?;
        self.active_presets
            .write()
            .map_err(lock_error)?
            .insert((scope, api_family), id);
        Ok(())
    }
}

#[async_trait]
impl RewriteRuleStore for MemoryStore {
    async fn create_rule(&self, rule: NewRewriteRule) -> Result<RewriteRule> {
        let created = RewriteRule {
            id: self.allocate_id(),
            user_id: rule.user_id,
            name: rule.name,
            pattern: rule.pattern,
            replacement: rule.replacement,
            direction: rule.direction,
            sort_order: rule.sort_order,
            is_enabled: rule.is_enabled,
        };
        self.rewrite_rules
            .write()
            .map_err(lock_error)?
            .insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_rule(&self, id: i64) -> Result<RewriteRule> {
        self.rewrite_rules
            .read()
            .map_err(lock_error)?
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("rewrite rule {id}")))
    }

    async fn list_rules(&self, scope: Option<i64>) -> Result<Vec<RewriteRule>> {
        let mut visible: Vec<RewriteRule> = self
            .rewrite_rules
            .read()
            .map_err(lock_error)?
            .values()
            .filter(|r| visible_to(r.user_id, scope))
            .cloned()
            .collect();
        visible.sort_by_key(|r| r.id);
        Ok(visible)
    }

    async fn update_rule(&self, rule: RewriteRule) -> Result<RewriteRule> {
        let mut rules = self.rewrite_rules.write().map_err(lock_error)?;
        if !rules.contains_key(&rule.id) {
            return Err(AppError::NotFound(format!("rewrite rule {}", rule.id)));
        }
        rules.insert(rule.id, rule.clone());
        Ok(rule)
    }

    async fn delete_rule(&self, id: i64) -> Result<()> {
        self.rewrite_rules
            .write()
            .map_err(lock_error)?
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(format!("rewrite rule {id}")))
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn get_history(&self, session: &SessionKey) -> Result<Vec<ChatMessage>> {
        Ok(self
            .histories
            .read()
            .map_err(lock_error)?
            .get(session)
            .cloned()
            .unwrap_or_default())
    }

    async fn append_message(&self, session: &SessionKey, message: ChatMessage) -> Result<()> {
        self.histories
            .write()
            .map_err(lock_error)?
            .entry(session.clone())
            .or_default()
            .push(message);
        Ok(())
    }

    async fn replace_history(
        &self,
        session: &SessionKey,
        history: Vec<ChatMessage>,
    ) -> Result<()> {
        self.histories
            .write()
            .map_err(lock_error)?
            .insert(session.clone(), history);
        Ok(())
    }
}
