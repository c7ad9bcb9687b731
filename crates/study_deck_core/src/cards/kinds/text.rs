//! Text card: a title plus a short markdown body.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cards::{CardDescriptor, CardKind, GeneratedCard, GeneratorContext};
use crate::json::{excerpt, parse_model_json, string_or_joined};
use crate::ports::PortResult;

pub const KIND: &str = "text";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextContent {
    #[serde(deserialize_with = "string_or_joined")]
    pub title: String,
    /// Markdown with LaTeX.
    #[serde(deserialize_with = "string_or_joined")]
    pub body: String,
}

pub struct TextCard;

#[async_trait]
impl CardKind for TextCard {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn descriptor(&self) -> CardDescriptor {
        CardDescriptor {
            kind: KIND,
            name: "Text Card",
            description: "An informational card that presents content to the user. Displays a title and markdown-formatted body text.",
            best_used_for: "Introducing new concepts, explaining details, providing examples, or summarizing key points. Good for teaching before testing.",
            default_focus: "introduce the main concept of this lesson",
            example_output: serde_json::json!({
                "title": "Understanding Derivatives",
                "body": "A **derivative** represents the rate of change of a function. For $f(x) = x^2$, the derivative is $f'(x) = 2x$."
            }),
        }
    }

    async fn generate(&self, ctx: &GeneratorContext<'_>) -> PortResult<GeneratedCard> {
        let prompt = format!(
            "You are creating an educational text card for a learning app.\n\n\
             Lesson: {title}\n{description}\n\n\
             Content to teach from:\n{content}\n\n\
             Your task: Create a text card that {focus}\n\n\
             Requirements:\n\
             - Title: short and descriptive (3-6 words)\n\
             - Body: 2-4 sentences OR 3-5 bullet points, **bold** key terms, $LaTeX$ for math\n\n\
             Return ONLY a JSON object with \"title\" and \"body\" fields.\n\
             No markdown code blocks, just the raw JSON.",
            title = ctx.lesson.title,
            description = ctx.lesson.description_line(),
            content = excerpt(&ctx.lesson.content, 8_000),
            focus = ctx.focus,
        );

        let raw = ctx.services.text.generate_text(&prompt).await?;
        let content = match parse_model_json::<TextContent>(&raw) {
            Ok(content) if !content.body.trim().is_empty() => content,
            Ok(_) => {
                warn!("[Text] Model returned an empty body, using fallback");
                fallback(ctx)
            }
            Err(e) => {
                warn!("[Text] Failed to parse response, using fallback: {}", e);
                fallback(ctx)
            }
        };
        GeneratedCard::new(KIND, &content)
    }
}

fn fallback(ctx: &GeneratorContext<'_>) -> TextContent {
    TextContent {
        title: ctx.lesson.title.clone(),
        body: format!("Let's learn about {}.", ctx.focus),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards::test_support::{lesson, services, FixedMultimodal, MemoryObjects, QueuedText};
    use std::sync::Arc;

    async fn run(response: &str) -> GeneratedCard {
        let text = Arc::new(QueuedText::new(response));
        let services = services(
            text,
            Arc::new(FixedMultimodal::text("")),
            Arc::new(MemoryObjects::default()),
        );
        let lesson = lesson();
        let ctx = GeneratorContext {
            lesson: &lesson,
            focus: "explain the power rule",
            services: &services,
        };
        TextCard.generate(&ctx).await.unwrap()
    }

    #[tokio::test]
    async fn parses_a_well_formed_response() {
        let card = run(r#"{"title": "Power Rule", "body": "Multiply by the exponent."}"#).await;
        assert_eq!(card.kind, "text");
        assert_eq!(card.content["title"], "Power Rule");
    }

    #[tokio::test]
    async fn falls_back_on_unparseable_output() {
        let card = run("Sure! Here's a card about derivatives.").await;
        assert_eq!(card.kind, "text");
        assert_eq!(card.content["title"], "Derivatives");
        assert_eq!(card.content["body"], "Let's learn about explain the power rule.");
    }
}
