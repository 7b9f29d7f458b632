pub mod character_service;
pub mod history_manager;
pub mod lorebook_service;
pub mod preset_service;
pub mod rewrite_service;
pub mod token_counter;

pub use character_service::CharacterService;
pub use history_manager::HistoryManager;
pub use lorebook_service::LorebookService;
pub use preset_service::PresetService;
pub use rewrite_service::RewriteService;
