//! Multiple choice question card: four options, exactly one correct.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cards::{CardDescriptor, CardKind, GeneratedCard, GeneratorContext};
use crate::json::{excerpt, parse_model_json, string_or_joined};
use crate::ports::PortResult;

pub const KIND: &str = "mc_question";
const OPTION_COUNT: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McQuestionContent {
    #[serde(deserialize_with = "string_or_joined")]
    pub question: String,
    pub options: Vec<String>,
    pub correct_index: usize,
    #[serde(deserialize_with = "string_or_joined")]
    pub explanation: String,
}

impl McQuestionContent {
    fn is_valid(&self) -> bool {
        !self.question.trim().is_empty()
            && self.options.len() == OPTION_COUNT
            && self.correct_index < OPTION_COUNT
    }
}

pub struct McQuestionCard;

#[async_trait]
impl CardKind for McQuestionCard {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn descriptor(&self) -> CardDescriptor {
        CardDescriptor {
            kind: KIND,
            name: "Multiple Choice Question",
            description: "A question with 4 answer options where exactly one is correct. Includes an explanation shown after answering.",
            best_used_for: "Testing understanding, checking recall, verifying comprehension of concepts. Good after teaching content.",
            default_focus: "test basic understanding",
            example_output: serde_json::json!({
                "question": "What is the derivative of $x^3$?",
                "options": ["$x^2$", "$3x^2$", "$3x$", "$x^3$"],
                "correct_index": 1,
                "explanation": "Using the power rule, $\\frac{d}{dx}(x^3) = 3x^2$."
            }),
        }
    }

    async fn generate(&self, ctx: &GeneratorContext<'_>) -> PortResult<GeneratedCard> {
        let prompt = format!(
            "You are creating a multiple choice question for a learning app.\n\n\
             Lesson: {title}\n{description}\n\n\
             Content to test:\n{content}\n\n\
             Your task: Create a question that {focus}\n\n\
             Requirements:\n\
             - Tests understanding, not just recall\n\
             - Exactly 4 plausible options, one correct; distractors are common misconceptions\n\
             - $inline$ LaTeX for any math\n\
             - A brief explanation of WHY the answer is correct\n\n\
             Return ONLY a JSON object with \"question\" (string), \"options\" (array of 4 strings), \
             \"correct_index\" (0-3) and \"explanation\" (string).\n\
             No markdown code blocks, just the raw JSON.",
            title = ctx.lesson.title,
            description = ctx.lesson.description_line(),
            content = excerpt(&ctx.lesson.content, 8_000),
            focus = ctx.focus,
        );

        let raw = ctx.services.text.generate_text(&prompt).await?;
        let content = match parse_model_json::<McQuestionContent>(&raw) {
            Ok(content) if content.is_valid() => content,
            Ok(content) => {
                warn!(
                    "[McQuestion] Invalid question shape ({} options, correct_index {}), using fallback",
                    content.options.len(),
                    content.correct_index
                );
                fallback(ctx.focus)
            }
            Err(e) => {
                warn!("[McQuestion] Failed to parse response, using fallback: {}", e);
                fallback(ctx.focus)
            }
        };
        GeneratedCard::new(KIND, &content)
    }
}

fn fallback(focus: &str) -> McQuestionContent {
    McQuestionContent {
        question: format!("Which statement about {} is correct?", focus),
        options: vec![
            "All of the above".to_string(),
            "None of the above".to_string(),
            "It depends on the context".to_string(),
            "The first option is correct".to_string(),
        ],
        correct_index: 0,
        explanation: "Review the lesson content for more details.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_options_are_not_a_valid_question() {
        let raw = r#"{"question": "q", "options": ["a", "b", "c"], "correct_index": 0, "explanation": "e"}"#;
        let parsed: McQuestionContent = parse_model_json(raw).unwrap();
        assert!(!parsed.is_valid());
    }

    #[test]
    fn out_of_range_answers_are_not_valid() {
        let raw = r#"{"question": "q", "options": ["a", "b", "c", "d"], "correct_index": 4, "explanation": "e"}"#;
        let parsed: McQuestionContent = parse_model_json(raw).unwrap();
        assert!(!parsed.is_valid());
    }

    #[test]
    fn list_valued_question_text_is_joined() {
        let raw = r#"{"question": ["What is", "2+2?"], "options": ["1","2","3","4"], "correct_index": 3, "explanation": ["Four", "is right."]}"#;
        let parsed: McQuestionContent = parse_model_json(raw).unwrap();
        assert!(parsed.is_valid());
        assert_eq!(parsed.question, "What is 2+2?");
        assert_eq!(parsed.explanation, "Four is right.");
    }

    #[test]
    fn fallback_is_always_valid() {
        assert!(fallback("limits").is_valid());
    }
}
