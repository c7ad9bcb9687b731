//! services/api/src/adapters/openai_llm.rs
//!
//! Text generation through an OpenAI-compatible chat completion endpoint.
//! It implements the `TextGenerationService` port from the `core` crate.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use study_deck_core::ports::{PortError, PortResult, TextGenerationService};

const SYSTEM_PROMPT: &str = "You write content for an educational learning app. \
When asked for JSON, reply with the raw JSON only.";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `TextGenerationService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiTextAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiTextAdapter {
    /// Creates a new `OpenAiTextAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }
}

//=========================================================================================
// `TextGenerationService` Trait Implementation
//=========================================================================================

#[async_trait]
impl TextGenerationService for OpenAiTextAdapter {
    async fn generate_text(&self, prompt: &str) -> PortResult<String> {
        let messages = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(SYSTEM_PROMPT)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(prompt)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .n(1)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        // Map the error by hand; the orphan rule rules out a From impl.
        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| {
                PortError::Unexpected("Text LLM returned no choices in its response.".to_string())
            })?
            .message
            .content
            .ok_or_else(|| {
                PortError::Unexpected("Text LLM response contained no text content.".to_string())
            })
    }
}
