use async_trait::async_trait;
use genai::chat::{ChatOptions, ChatRequest, ChatResponse};

use crate::errors::AppError;

pub mod gemini_client;

pub use gemini_client::{FabulaGeminiClient, build_gemini_client, generate_simple_response};

/// Trait defining the interface for AI client operations.
///
/// This core performs exactly one kind of call: a blocking one-shot chat
/// request, used by background summarization.
#[async_trait]
pub trait AiClient: Send + Sync {
    /// Executes a chat request with the AI model.
    ///
    /// # Errors
    ///
    /// Returns `AppError::LlmClientError` when the underlying client fails.
    async fn exec_chat(
        &self,
        model_name: &str,
        request: ChatRequest,
        config_override: Option<ChatOptions>,
    ) -> Result<ChatResponse, AppError>;
}
