//! Infographic card: a generated image stored in the object store.
//!
//! Two model calls: text generation for the image prompt and captions, then
//! multimodal generation for the image itself. Only the storage path is kept
//! in the card. When no image can be produced or stored, the card is
//! downgraded to a text card built from the same metadata.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use super::text::{self, TextContent};
use crate::cards::{CardDescriptor, CardKind, GeneratedCard, GeneratorContext};
use crate::json::{excerpt, parse_model_json};
use crate::ports::{MultimodalRequest, PortError, PortResult};

pub const KIND: &str = "infographic";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfographicContent {
    pub title: String,
    /// Object store path of the generated image.
    pub image_path: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InfographicMetadata {
    title: String,
    image_prompt: String,
    description: String,
    #[serde(default)]
    caption: Option<String>,
}

pub struct InfographicCard;

#[async_trait]
impl CardKind for InfographicCard {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn descriptor(&self) -> CardDescriptor {
        CardDescriptor {
            kind: KIND,
            name: "Infographic",
            description: "A visually generated infographic that illustrates a concept. Uses AI image generation to create educational visuals.",
            best_used_for: "Visualizing complex concepts, showing relationships, illustrating processes, or making abstract ideas concrete. Great for visual learners.",
            default_focus: "visualize key concepts and relationships",
            example_output: serde_json::json!({
                "title": "The Power Rule Visualized",
                "imagePath": "cards/lesson-123/infographic-abc.png",
                "description": "An infographic showing how the power rule works with visual examples",
                "caption": "The power rule: derivative of x^n = nx^(n-1)"
            }),
        }
    }

    async fn generate(&self, ctx: &GeneratorContext<'_>) -> PortResult<GeneratedCard> {
        let metadata = self.metadata(ctx).await?;

        match self.render_and_store(ctx, &metadata).await {
            Ok(image_path) => {
                let content = InfographicContent {
                    title: metadata.title,
                    image_path,
                    description: metadata.description,
                    caption: metadata.caption,
                };
                GeneratedCard::new(KIND, &content)
            }
            Err(e) => {
                warn!("[Infographic] Image generation failed, downgrading to text: {}", e);
                let content = TextContent {
                    body: format!(
                        "**Visual Concept: {}**\n\n{}\n\n_{}_",
                        metadata.title,
                        metadata.description,
                        metadata.caption.as_deref().unwrap_or_default()
                    ),
                    title: metadata.title,
                };
                GeneratedCard::new(text::KIND, &content)
            }
        }
    }
}

impl InfographicCard {
    async fn metadata(&self, ctx: &GeneratorContext<'_>) -> PortResult<InfographicMetadata> {
        let prompt = format!(
            "You are creating an educational infographic for a learning app.\n\n\
             Lesson: {title}\n{description}\n\n\
             Content to visualize:\n{content}\n\n\
             Your task: Create an infographic that {focus}\n\n\
             Provide a short title, a detailed image generation prompt (clean educational \
             style, clear hierarchy, labelled diagrams, professional colours), a description \
             of what the image shows, and a short caption.\n\n\
             Return ONLY a JSON object with \"title\", \"imagePrompt\", \"description\" and \"caption\".\n\
             No markdown code blocks, just the raw JSON.",
            title = ctx.lesson.title,
            description = ctx.lesson.description_line(),
            content = excerpt(&ctx.lesson.content, 6_000),
            focus = ctx.focus,
        );

        let raw = ctx.services.text.generate_text(&prompt).await?;
        Ok(match parse_model_json::<InfographicMetadata>(&raw) {
            Ok(metadata) if !metadata.image_prompt.trim().is_empty() => metadata,
            Ok(_) | Err(_) => {
                warn!("[Infographic] Failed to parse metadata, using template");
                InfographicMetadata {
                    title: ctx.lesson.title.clone(),
                    image_prompt: format!(
                        "Create an educational infographic about {}. Use a clean, modern style with clear visuals and labels.",
                        ctx.focus
                    ),
                    description: format!("An infographic about {}", ctx.focus),
                    caption: Some(ctx.lesson.title.clone()),
                }
            }
        })
    }

    /// Generates the image and uploads it under a fresh path.
    async fn render_and_store(
        &self,
        ctx: &GeneratorContext<'_>,
        metadata: &InfographicMetadata,
    ) -> PortResult<String> {
        let response = ctx
            .services
            .multimodal
            .generate_multimodal(MultimodalRequest {
                prompt: metadata.image_prompt.clone(),
                attachments: Vec::new(),
                wants_image: true,
            })
            .await?;

        let asset = response
            .asset
            .ok_or_else(|| PortError::Unexpected("No image generated".to_string()))?;

        let extension = match asset.mime_type.as_str() {
            "image/jpeg" => "jpg",
            "image/webp" => "webp",
            _ => "png",
        };
        let path = format!(
            "cards/{}/infographic-{}.{}",
            ctx.lesson.lesson_id,
            Uuid::new_v4(),
            extension
        );
        ctx.services
            .object_store
            .upload(&path, &asset.data, &asset.mime_type)
            .await?;
        info!("[Infographic] Stored image at {}", path);
        Ok(path)
    }
}
