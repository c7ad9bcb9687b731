//! services/api/src/adapters/scripted_llm.rs
//!
//! A deterministic stand-in for the generative model, used when running
//! offline and by the integration tests. Replies are chosen by the first rule
//! whose needle occurs in the prompt.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::collections::VecDeque;
use std::sync::Mutex;
use study_deck_core::ports::{
    GeneratedAsset, MultimodalGenerationService, MultimodalRequest, MultimodalResponse,
    PortError, PortResult, TextGenerationService,
};
use tracing::debug;

/// Smallest valid PNG: a 1x1 transparent pixel.
const PLACEHOLDER_PNG: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
    0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0A, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00,
    0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49,
    0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
];

#[derive(Debug, Clone)]
enum Reply {
    Text(String),
    Fail(String),
}

/// Prompts retained by `ScriptedGenerator::prompts`.
pub const PROMPT_HISTORY: usize = 32;

#[derive(Debug, Clone)]
struct Rule {
    needle: String,
    reply: Reply,
}

pub struct ScriptedGenerator {
    rules: Vec<Rule>,
    default_reply: String,
    image: Option<Vec<u8>>,
    prompts: Mutex<VecDeque<String>>,
}

impl Default for ScriptedGenerator {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            default_reply: "{}".to_string(),
            image: Some(PLACEHOLDER_PNG.to_vec()),
            prompts: Mutex::new(VecDeque::new()),
        }
    }
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replies for local runs: two generic lessons per document; every card
    /// prompt gets an unusable reply, so each kind serves its fallback.
    pub fn offline() -> Self {
        Self::new().respond_when(
            "lesson titles",
            r#"[{"title": "Overview", "description": "The big picture of the material"},
                {"title": "Key Details", "description": "The specifics worth remembering"}]"#,
        )
    }

    pub fn respond_when(mut self, needle: &str, reply: &str) -> Self {
        self.rules.push(Rule {
            needle: needle.to_string(),
            reply: Reply::Text(reply.to_string()),
        });
        self
    }

    pub fn fail_when(mut self, needle: &str, message: &str) -> Self {
        self.rules.push(Rule {
            needle: needle.to_string(),
            reply: Reply::Fail(message.to_string()),
        });
        self
    }

    pub fn with_default_reply(mut self, reply: &str) -> Self {
        self.default_reply = reply.to_string();
        self
    }

    /// Image requests return text only.
    pub fn without_images(mut self) -> Self {
        self.image = None;
        self
    }

    /// The most recent prompts received, oldest first. At most
    /// `PROMPT_HISTORY` are kept.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .map(|p| p.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn reply_to(&self, prompt: &str) -> PortResult<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            if prompts.len() == PROMPT_HISTORY {
                prompts.pop_front();
            }
            prompts.push_back(prompt.to_string());
        }
        let rule = self.rules.iter().find(|r| prompt.contains(&r.needle));
        debug!(
            "Scripted reply for prompt via rule {:?}",
            rule.map(|r| r.needle.as_str())
        );
        match rule.map(|r| &r.reply) {
            Some(Reply::Text(text)) => Ok(text.clone()),
            Some(Reply::Fail(message)) => Err(PortError::Unexpected(message.clone())),
            None => Ok(self.default_reply.clone()),
        }
    }
}

/// Splits text attachments into pages on form feeds; other formats become a
/// single placeholder page.
fn pages_from_attachment(mime_type: &str, data_base64: &str) -> Vec<String> {
    let bytes = STANDARD.decode(data_base64).unwrap_or_default();
    if mime_type.starts_with("text/") {
        String::from_utf8_lossy(&bytes)
            .split('\u{c}')
            .map(str::trim)
            .filter(|page| !page.is_empty())
            .map(str::to_string)
            .collect()
    } else {
        vec![format!("# Document\n\nA {} document of {} bytes.", mime_type, bytes.len())]
    }
}

#[async_trait]
impl TextGenerationService for ScriptedGenerator {
    async fn generate_text(&self, prompt: &str) -> PortResult<String> {
        self.reply_to(prompt)
    }
}

#[async_trait]
impl MultimodalGenerationService for ScriptedGenerator {
    async fn generate_multimodal(
        &self,
        request: MultimodalRequest,
    ) -> PortResult<MultimodalResponse> {
        if request.wants_image {
            self.reply_to(&request.prompt)?;
            return Ok(MultimodalResponse {
                text: String::new(),
                asset: self.image.clone().map(|data| GeneratedAsset {
                    mime_type: "image/png".to_string(),
                    data,
                }),
            });
        }

        // Scripted rules take precedence over splitting the attachment.
        if self.rules.iter().any(|r| request.prompt.contains(&r.needle))
            || request.attachments.is_empty()
        {
            return Ok(MultimodalResponse {
                text: self.reply_to(&request.prompt)?,
                asset: None,
            });
        }

        self.reply_to(&request.prompt)?;
        let pages: Vec<String> = request
            .attachments
            .iter()
            .flat_map(|a| pages_from_attachment(&a.mime_type, &a.data_base64))
            .collect();
        let text = serde_json::to_string(&pages)
            .map_err(|e| PortError::Unexpected(format!("Failed to encode pages: {}", e)))?;
        Ok(MultimodalResponse { text, asset: None })
    }
}
