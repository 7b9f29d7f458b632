use std::sync::Arc;

use async_trait::async_trait;
use genai::chat::{ChatMessage, ChatOptions, ChatRequest, ChatResponse};
use genai::{Client, ClientBuilder};

use super::AiClient;
use crate::errors::AppError;

/// Wrapper struct around the genai::Client to implement our AiClient trait.
pub struct FabulaGeminiClient {
    inner: Client,
}

#[async_trait]
impl AiClient for FabulaGeminiClient {
    async fn exec_chat(
        &self,
        model_name: &str,
        request: ChatRequest,
        config_override: Option<ChatOptions>,
    ) -> Result<ChatResponse, AppError> {
        self.inner
            .exec_chat(model_name, request, config_override.as_ref())
            .await
            .map_err(AppError::from)
    }
}

/// Builds the client wrapper. Credentials resolve from the environment the
/// way the genai crate expects (`GEMINI_API_KEY`).
pub fn build_gemini_client() -> Arc<FabulaGeminiClient> {
    let client = ClientBuilder::default().build();
    Arc::new(FabulaGeminiClient { inner: client })
}

/// One user message in, first response text out. This is the whole LLM
/// surface the summarizer needs.
///
/// # Errors
///
/// Returns `AppError::LlmClientError` on transport failure and
/// `AppError::GenerationError` when the response carries no text content.
pub async fn generate_simple_response(
    client: &dyn AiClient,
    user_message: String,
    model_name: &str,
) -> Result<String, AppError> {
    let chat_request = ChatRequest::default().append_message(ChatMessage::user(user_message));
    tracing::debug!(%model_name, "Executing one-shot chat via trait");
    let response = client.exec_chat(model_name, chat_request, None).await?;
    let content = response
        .content_text_as_str()
        .ok_or_else(|| {
            AppError::GenerationError("No text content in LLM response".to_string())
        })?
        .to_string();
    Ok(content)
}
