//! services/api/src/adapters/gemini.rs
//!
//! Adapter for the Gemini `generateContent` REST endpoint. Implements both
//! `TextGenerationService` and `MultimodalGenerationService`; each request is
//! routed to the model configured for its purpose.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use study_deck_core::ports::{
    GeneratedAsset, MultimodalGenerationService, MultimodalRequest, MultimodalResponse,
    PortError, PortResult, TextGenerationService,
};
use tracing::debug;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// Model names per use.
#[derive(Debug, Clone)]
pub struct GeminiModels {
    /// Plain prompts: planning, segmentation and card content.
    pub text: String,
    /// Prompts carrying document attachments.
    pub document: String,
    /// Image generation.
    pub image: String,
}

#[derive(Clone)]
pub struct GeminiAdapter {
    client: Client,
    api_key: String,
    base_url: String,
    models: GeminiModels,
}

impl GeminiAdapter {
    pub fn new(client: Client, api_key: String, base_url: String, models: GeminiModels) -> Self {
        Self {
            client,
            api_key: api_key.trim().to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            models,
        }
    }

    fn model_for(&self, request: &MultimodalRequest) -> &str {
        if request.wants_image {
            &self.models.image
        } else if !request.attachments.is_empty() {
            &self.models.document
        } else {
            &self.models.text
        }
    }

    async fn generate_content(
        &self,
        model: &str,
        body: serde_json::Value,
    ) -> PortResult<GenerateContentResponse> {
        let url = format!("{}/models/{}:generateContent", self.base_url, model);
        debug!("Calling Gemini model {}", model);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| PortError::Unexpected(format!("Gemini request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(PortError::Unexpected(format!(
                "Gemini returned {}: {}",
                status.as_u16(),
                text
            )));
        }

        response
            .json::<GenerateContentResponse>()
            .await
            .map_err(|e| PortError::Unexpected(format!("Invalid Gemini response: {}", e)))
    }
}

//=========================================================================================
// Wire Types
//=========================================================================================

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    text: Option<String>,
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

impl GenerateContentResponse {
    /// Concatenated text parts of the first candidate, plus its first inline asset.
    fn into_output(self) -> PortResult<MultimodalResponse> {
        let parts = self
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts)
            .ok_or_else(|| PortError::Unexpected("Gemini returned no candidates".to_string()))?;

        let mut output = MultimodalResponse::default();
        for part in parts {
            if let Some(text) = part.text {
                output.text.push_str(&text);
            }
            let Some(inline) = part.inline_data else {
                continue;
            };
            if output.asset.is_none() {
                let data = STANDARD.decode(inline.data.as_bytes()).map_err(|e| {
                    PortError::Unexpected(format!("Gemini asset is not valid base64: {}", e))
                })?;
                output.asset = Some(GeneratedAsset {
                    mime_type: inline.mime_type,
                    data,
                });
            }
        }
        Ok(output)
    }
}

fn request_body(request: &MultimodalRequest) -> serde_json::Value {
    let mut parts: Vec<serde_json::Value> = request
        .attachments
        .iter()
        .map(|a| json!({ "inlineData": { "mimeType": a.mime_type, "data": a.data_base64 } }))
        .collect();
    parts.push(json!({ "text": request.prompt }));

    let mut body = json!({ "contents": [{ "role": "user", "parts": parts }] });
    if request.wants_image {
        body["generationConfig"] = json!({ "responseModalities": ["TEXT", "IMAGE"] });
    }
    body
}

//=========================================================================================
// Port Implementations
//=========================================================================================

#[async_trait]
impl TextGenerationService for GeminiAdapter {
    async fn generate_text(&self, prompt: &str) -> PortResult<String> {
        let request = MultimodalRequest {
            prompt: prompt.to_string(),
            ..Default::default()
        };
        let response = self
            .generate_content(&self.models.text, request_body(&request))
            .await?;
        Ok(response.into_output()?.text)
    }
}

#[async_trait]
impl MultimodalGenerationService for GeminiAdapter {
    async fn generate_multimodal(
        &self,
        request: MultimodalRequest,
    ) -> PortResult<MultimodalResponse> {
        let response = self
            .generate_content(self.model_for(&request), request_body(&request))
            .await?;
        response.into_output()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use study_deck_core::ports::Attachment;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn adapter(server: &MockServer) -> GeminiAdapter {
        GeminiAdapter::new(
            Client::new(),
            " test-key ".to_string(),
            format!("{}/v1beta/", server.uri()),
            GeminiModels {
                text: "text-model".to_string(),
                document: "doc-model".to_string(),
                image: "image-model".to_string(),
            },
        )
    }

    #[tokio::test]
    async fn text_prompts_go_to_the_text_model() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/text-model:generateContent"))
            .and(header("x-goog-api-key", "test-key"))
            .and(body_partial_json(json!({
                "contents": [{ "role": "user", "parts": [{ "text": "hello" }] }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{ "content": { "parts": [{ "text": "Hi " }, { "text": "there" }] } }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let text = adapter(&server).generate_text("hello").await.unwrap();
        assert_eq!(text, "Hi there");
    }

    #[tokio::test]
    async fn attachments_are_sent_inline_to_the_document_model() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/doc-model:generateContent"))
            .and(body_partial_json(json!({
                "contents": [{ "parts": [
                    { "inlineData": { "mimeType": "application/pdf", "data": "JVBERi0xLjc=" } },
                    { "text": "extract" }
                ] }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{ "content": { "parts": [{ "text": "[\"page\"]" }] } }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = adapter(&server)
            .generate_multimodal(MultimodalRequest {
                prompt: "extract".to_string(),
                attachments: vec![Attachment::from_bytes("application/pdf", b"%PDF-1.7")],
                wants_image: false,
            })
            .await
            .unwrap();
        assert_eq!(response.text, "[\"page\"]");
        assert!(response.asset.is_none());
    }

    #[tokio::test]
    async fn image_requests_decode_the_inline_asset() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/image-model:generateContent"))
            .and(body_partial_json(json!({
                "generationConfig": { "responseModalities": ["TEXT", "IMAGE"] }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{ "content": { "parts": [
                    { "text": "Here you go" },
                    { "inlineData": { "mimeType": "image/png", "data": "iVBORw==" } }
                ] } }]
            })))
            .mount(&server)
            .await;

        let response = adapter(&server)
            .generate_multimodal(MultimodalRequest {
                prompt: "draw".to_string(),
                attachments: Vec::new(),
                wants_image: true,
            })
            .await
            .unwrap();
        let asset = response.asset.unwrap();
        assert_eq!(asset.mime_type, "image/png");
        assert_eq!(asset.data, vec![0x89, b'P', b'N', b'G']);
    }

    #[tokio::test]
    async fn http_errors_become_port_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("quota exceeded"))
            .mount(&server)
            .await;

        let err = adapter(&server).generate_text("hello").await.unwrap_err();
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("quota exceeded"));
    }

    #[tokio::test]
    async fn empty_candidates_are_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "candidates": [] })))
            .mount(&server)
            .await;

        assert!(adapter(&server).generate_text("hello").await.is_err());
    }
}
