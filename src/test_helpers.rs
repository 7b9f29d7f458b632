// Shared test scaffolding: a hand-rolled mock AI client plus canned data
// builders and a fully wired in-memory AppState.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use genai::ModelIden;
use genai::adapter::AdapterKind;
use genai::chat::{ChatOptions, ChatRequest, ChatResponse, MessageContent};

use crate::config::Config;
use crate::errors::AppError;
use crate::llm::AiClient;
use crate::models::{
    CharacterCardDataV2, CharacterCardV2, LorePlacement, NewCharacter, NewGenerationPreset,
    NewLorebook, NewLorebookEntry, NewRewriteRule, PresetParameters, RewriteDirection,
};
use crate::state::AppState;
use crate::storage::MemoryStore;

#[derive(Clone)]
pub struct MockAiClient {
    last_request: Arc<Mutex<Option<ChatRequest>>>,
    last_options: Arc<Mutex<Option<ChatOptions>>>,
    response_to_return: Arc<Mutex<Result<ChatResponse, AppError>>>,
    call_count: Arc<AtomicUsize>,
}

impl MockAiClient {
    #[must_use]
    pub fn new() -> Self {
        Self {
            last_request: Arc::new(Mutex::new(None)),
            last_options: Arc::new(Mutex::new(None)),
            response_to_return: Arc::new(Mutex::new(Ok(make_text_response(
                "Mock AI response",
            )))),
            call_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    #[must_use]
    pub fn get_last_request(&self) -> Option<ChatRequest> {
        self.last_request.lock().unwrap().clone()
    }

    #[must_use]
    pub fn get_last_options(&self) -> Option<ChatOptions> {
        self.last_options.lock().unwrap().clone()
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    pub fn set_response(&self, response: Result<ChatResponse, AppError>) {
        *self.response_to_return.lock().unwrap() = response;
    }

    /// Convenience for the common case: respond with plain text.
    pub fn set_response_text(&self, text: &str) {
        self.set_response(Ok(make_text_response(text)));
    }
}

impl Default for MockAiClient {
    fn default() -> Self {
        Self::new()
    }
}

fn make_text_response(text: &str) -> ChatResponse {
    ChatResponse {
        model_iden: ModelIden::new(AdapterKind::Gemini, "gemini/mock-model"),
        provider_model_iden: ModelIden::new(AdapterKind::Gemini, "gemini/mock-model"),
        content: Some(MessageContent::Text(text.to_string())),
        reasoning_content: None,
        usage: Default::default(),
    }
}

#[async_trait]
impl AiClient for MockAiClient {
    async fn exec_chat(
        &self,
        _model_name: &str,
        request: ChatRequest,
        config_override: Option<ChatOptions>,
    ) -> Result<ChatResponse, AppError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request);
        *self.last_options.lock().unwrap() = config_override;
        self.response_to_return.lock().unwrap().clone()
    }
}

// --- Canned data builders ---

#[must_use]
pub fn sample_card(name: &str, description: &str) -> CharacterCardV2 {
    CharacterCardV2 {
        spec: "chara_card_v2".to_string(),
        spec_version: "2.0".to_string(),
        data: CharacterCardDataV2 {
            name: Some(name.to_string()),
            description: description.to_string(),
            ..CharacterCardDataV2::default()
        },
    }
}

#[must_use]
pub fn new_character(user_id: Option<i64>, name: &str, description: &str) -> NewCharacter {
    NewCharacter {
        user_id,
        name: name.to_string(),
        card: sample_card(name, description),
    }
}

#[must_use]
pub fn new_lorebook(user_id: Option<i64>, name: &str) -> NewLorebook {
    NewLorebook {
        user_id,
        name: name.to_string(),
        description: None,
    }
}

#[must_use]
pub fn new_entry(
    lorebook_id: i64,
    keys: &[&str],
    content: &str,
    insertion_order: i32,
) -> NewLorebookEntry {
    NewLorebookEntry {
        lorebook_id,
        keys: keys.iter().map(ToString::to_string).collect(),
        content: content.to_string(),
        insertion_order,
        placement: LorePlacement::BeforeCharacter,
        ..NewLorebookEntry::default()
    }
}

#[must_use]
pub fn new_rule(
    user_id: Option<i64>,
    pattern: &str,
    replacement: &str,
    sort_order: i32,
) -> NewRewriteRule {
    NewRewriteRule {
        user_id,
        name: format!("{pattern} -> {replacement}"),
        pattern: pattern.to_string(),
        replacement: replacement.to_string(),
        direction: RewriteDirection::Input,
        sort_order,
        is_enabled: true,
    }
}

#[must_use]
pub fn new_preset(
    user_id: Option<i64>,
    api_family: &str,
    parameters: PresetParameters,
) -> NewGenerationPreset {
    NewGenerationPreset {
        user_id,
        name: format!("{api_family} preset"),
        api_family: api_family.to_string(),
        parameters,
    }
}

// --- Wired application fixture ---

pub struct TestApp {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub mock_ai_client: Arc<MockAiClient>,
}

#[must_use]
pub fn test_app() -> TestApp {
    test_app_with_config(Config::default())
}

#[must_use]
pub fn test_app_with_config(config: Config) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let mock_ai_client = Arc::new(MockAiClient::new());
    let state = AppState::new(
        config,
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        mock_ai_client.clone(),
    );
    TestApp {
        state,
        store,
        mock_ai_client,
    }
}
