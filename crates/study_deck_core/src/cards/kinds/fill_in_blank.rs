//! Fill-in-the-blank card: text with `{{blank_id}}` markers, each blank
//! offering a handful of options.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

use crate::cards::{CardDescriptor, CardKind, GeneratedCard, GeneratorContext};
use crate::json::{excerpt, parse_model_json, string_or_joined};
use crate::ports::PortResult;

pub const KIND: &str = "fill_in_blank";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlankOption {
    pub text: String,
    #[serde(rename = "isCorrect")]
    pub is_correct: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillInBlankContent {
    /// Blanks are marked as `{{blank_id}}`.
    #[serde(deserialize_with = "string_or_joined")]
    pub text: String,
    pub blanks: BTreeMap<String, Vec<BlankOption>>,
    #[serde(deserialize_with = "string_or_joined")]
    pub explanation: String,
}

impl FillInBlankContent {
    fn is_valid(&self) -> bool {
        if self.text.trim().is_empty() || self.blanks.is_empty() {
            return false;
        }
        let options_ok = self
            .blanks
            .values()
            .all(|options| options.iter().any(|o| o.is_correct));
        options_ok
            && placeholders(&self.text)
                .iter()
                .all(|id| self.blanks.contains_key(*id))
    }
}

/// Ids of every `{{id}}` marker in `text`.
fn placeholders(text: &str) -> Vec<&str> {
    let mut ids = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                ids.push(after[..end].trim());
                rest = &after[end + 2..];
            }
            None => break,
        }
    }
    ids
}

pub struct FillInBlankCard;

#[async_trait]
impl CardKind for FillInBlankCard {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn descriptor(&self) -> CardDescriptor {
        CardDescriptor {
            kind: KIND,
            name: "Fill in the Blank",
            description: "A sentence or paragraph with missing words. Each blank has 3-4 options to choose from, and the user must select the correct word for each blank.",
            best_used_for: "Testing recall of key terms, formulas, or definitions. Good for vocabulary and concept reinforcement.",
            default_focus: "practice applying the concept",
            example_output: serde_json::json!({
                "text": "The derivative of $x^n$ is {{blank1}}, which is known as the {{blank2}}.",
                "blanks": {
                    "blank1": [
                        { "text": "$nx^{n-1}$", "isCorrect": true },
                        { "text": "$x^{n+1}$", "isCorrect": false },
                        { "text": "$nx^n$", "isCorrect": false }
                    ],
                    "blank2": [
                        { "text": "power rule", "isCorrect": true },
                        { "text": "chain rule", "isCorrect": false },
                        { "text": "product rule", "isCorrect": false }
                    ]
                },
                "explanation": "The power rule states that the derivative of $x^n$ is $nx^{n-1}$."
            }),
        }
    }

    async fn generate(&self, ctx: &GeneratorContext<'_>) -> PortResult<GeneratedCard> {
        let prompt = format!(
            "You are creating a fill-in-the-blank exercise for a learning app.\n\n\
             Lesson: {title}\n{description}\n\n\
             Content to test:\n{content}\n\n\
             Your task: Create a fill-in-the-blank that {focus}\n\n\
             Requirements:\n\
             - A sentence or short paragraph with 1-3 blanks marked {{{{blank1}}}}, {{{{blank2}}}}, ...\n\
             - Each blank has 3-4 options, exactly one correct, wrong ones plausible\n\
             - Blanks test KEY terms or concepts; $inline$ LaTeX for math\n\
             - A brief explanation\n\n\
             Return ONLY a JSON object with \"text\", \"blanks\" (map of blank id to a list of \
             {{\"text\", \"isCorrect\"}}) and \"explanation\".\n\
             No markdown code blocks, just the raw JSON.",
            title = ctx.lesson.title,
            description = ctx.lesson.description_line(),
            content = excerpt(&ctx.lesson.content, 8_000),
            focus = ctx.focus,
        );

        let raw = ctx.services.text.generate_text(&prompt).await?;
        let content = match parse_model_json::<FillInBlankContent>(&raw) {
            Ok(content) if content.is_valid() => content,
            Ok(_) => {
                warn!("[FillInBlank] Blanks do not match the text, using fallback");
                fallback()
            }
            Err(e) => {
                warn!("[FillInBlank] Failed to parse response, using fallback: {}", e);
                fallback()
            }
        };
        GeneratedCard::new(KIND, &content)
    }
}

fn fallback() -> FillInBlankContent {
    let option = |text: &str, is_correct: bool| BlankOption {
        text: text.to_string(),
        is_correct,
    };
    FillInBlankContent {
        text: "The key concept here is {{blank1}}.".to_string(),
        blanks: BTreeMap::from([(
            "blank1".to_string(),
            vec![
                option("understanding", true),
                option("confusion", false),
                option("complexity", false),
            ],
        )]),
        explanation: "Review the lesson content for more details.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_every_placeholder() {
        assert_eq!(
            placeholders("A {{blank1}} and {{ blank2 }} and {{unclosed"),
            vec!["blank1", "blank2"]
        );
    }

    #[test]
    fn text_referencing_a_missing_blank_is_invalid() {
        let raw = r#"{
            "text": "The {{blank1}} measures {{blank2}}.",
            "blanks": {"blank1": [{"text": "derivative", "isCorrect": true}]},
            "explanation": "x"
        }"#;
        let parsed: FillInBlankContent = parse_model_json(raw).unwrap();
        assert!(!parsed.is_valid());
    }

    #[test]
    fn blank_without_a_correct_option_is_invalid() {
        let raw = r#"{
            "text": "The {{blank1}}.",
            "blanks": {"blank1": [{"text": "a", "isCorrect": false}]},
            "explanation": "x"
        }"#;
        let parsed: FillInBlankContent = parse_model_json(raw).unwrap();
        assert!(!parsed.is_valid());
    }

    #[test]
    fn fallback_is_always_valid_and_keeps_wire_names() {
        let content = fallback();
        assert!(content.is_valid());
        let json = serde_json::to_value(&content).unwrap();
        assert_eq!(json["blanks"]["blank1"][0]["isCorrect"], true);
    }
}
