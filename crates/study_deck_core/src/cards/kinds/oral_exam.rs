//! Oral exam card: configuration for a live, voice-based examiner session.
//!
//! The card carries everything the client needs to open the session: the
//! examiner's system prompt and the `end_exam` tool declaration it must call
//! to report a pass/fail result.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;

use crate::cards::{CardDescriptor, CardKind, GeneratedCard, GeneratorContext};
use crate::json::{excerpt, parse_model_json, string_or_joined};
use crate::ports::PortResult;

pub const KIND: &str = "oral_exam";

const MIN_QUESTIONS: u8 = 3;
const MAX_QUESTIONS: u8 = 5;
const MAX_CONTEXT_CHARS: usize = 1_500;
const FALLBACK_CONTEXT_CHARS: usize = 1_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OralExamContent {
    pub topic: String,
    /// Lesson facts the examiner grades against.
    pub context: String,
    pub question_count: u8,
    pub system_prompt: String,
    pub tools: Vec<Value>,
}

impl OralExamContent {
    fn new(topic: &str, context: &str, question_count: u8) -> Self {
        let context = excerpt(context, MAX_CONTEXT_CHARS).to_string();
        let question_count = question_count.clamp(MIN_QUESTIONS, MAX_QUESTIONS);
        Self {
            system_prompt: examiner_prompt(topic, &context, question_count),
            topic: topic.to_string(),
            context,
            question_count,
            tools: vec![end_exam_tool()],
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExamPlan {
    #[serde(deserialize_with = "string_or_joined")]
    topic: String,
    #[serde(deserialize_with = "string_or_joined")]
    context: String,
    question_count: f64,
}

pub struct OralExamCard;

#[async_trait]
impl CardKind for OralExamCard {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn descriptor(&self) -> CardDescriptor {
        CardDescriptor {
            kind: KIND,
            name: "Oral Exam",
            description: "A real-time voice-based examination where an AI examiner asks questions verbally and evaluates spoken responses. Results in pass/fail.",
            best_used_for: "Final assessment of understanding and practicing verbal explanation of concepts. Best placed at the end of a lesson as a capstone evaluation.",
            default_focus: "assess understanding of the lesson's core ideas",
            example_output: json!({
                "topic": "The Power Rule for Derivatives",
                "context": "The power rule states that d/dx(x^n) = nx^(n-1)...",
                "questionCount": 3,
                "systemPrompt": "You are a friendly oral examiner...",
                "tools": [end_exam_tool()]
            }),
        }
    }

    async fn generate(&self, ctx: &GeneratorContext<'_>) -> PortResult<GeneratedCard> {
        let prompt = format!(
            "You are preparing an oral exam for a learning app.\n\n\
             Lesson: {title}\n{description}\n\n\
             Content to examine:\n{content}\n\n\
             Your task: {focus}\n\n\
             Create the exam configuration with a clear, specific topic, the key context an \
             examiner needs to evaluate answers (main concepts, facts, formulas), and how many \
             questions to ask.\n\n\
             Return ONLY a JSON object with \"topic\" (string), \"context\" (string, max 1000 chars) \
             and \"questionCount\" (number, 3-5).\n\
             No markdown code blocks, just the raw JSON.",
            title = ctx.lesson.title,
            description = ctx.lesson.description_line(),
            content = excerpt(&ctx.lesson.content, 6_000),
            focus = ctx.focus,
        );

        let raw = ctx.services.text.generate_text(&prompt).await?;
        let content = match parse_model_json::<ExamPlan>(&raw) {
            Ok(plan)
                if !plan.topic.trim().is_empty()
                    && !plan.context.trim().is_empty()
                    && plan.question_count >= 1.0 =>
            {
                let count = plan.question_count.round().min(f64::from(MAX_QUESTIONS)) as u8;
                OralExamContent::new(&plan.topic, &plan.context, count)
            }
            Ok(_) => {
                warn!("[OralExam] Incomplete exam configuration, using fallback");
                fallback(ctx)
            }
            Err(e) => {
                warn!("[OralExam] Failed to parse response, using fallback: {}", e);
                fallback(ctx)
            }
        };
        GeneratedCard::new(KIND, &content)
    }
}

fn fallback(ctx: &GeneratorContext<'_>) -> OralExamContent {
    let topic = if ctx.focus.trim().is_empty() {
        ctx.lesson.title.as_str()
    } else {
        ctx.focus
    };
    OralExamContent::new(
        topic,
        excerpt(&ctx.lesson.content, FALLBACK_CONTEXT_CHARS),
        MIN_QUESTIONS,
    )
}

fn examiner_prompt(topic: &str, context: &str, question_count: u8) -> String {
    format!(
        "You are a friendly oral examiner for a learning app. Your job is to assess the student's understanding of: {topic}\n\n\
         Context from the lesson:\n{context}\n\n\
         Instructions:\n\
         1. Start with a friendly greeting. Introduce yourself briefly and explain you'll ask a few questions about {topic}.\n\
         2. Ask {question_count} questions, starting with easier ones and gradually increasing difficulty.\n\
         3. Listen carefully to their answers. Provide brief, encouraging feedback after each response.\n\
         4. If they struggle, offer a hint or rephrase the question, but don't give away the answer.\n\
         5. After asking all questions (or if it becomes clear they pass/fail early), call the end_exam function with:\n   \
         - passed: true if they demonstrated reasonable understanding of the core concepts\n   \
         - feedback: 2-3 sentences of constructive feedback on their performance\n\
         6. Be encouraging but honest. It's okay to fail them if they clearly don't understand the material.\n\
         7. Keep your responses concise and conversational. This is a spoken exam, not a lecture.\n\n\
         Remember: You MUST call the end_exam function to conclude the exam. Do not end without calling it."
    )
}

fn end_exam_tool() -> Value {
    json!({
        "functionDeclarations": [{
            "name": "end_exam",
            "description": "Call this function when the oral exam should end. Call after asking all planned questions OR when it becomes clear the student has passed or failed.",
            "parameters": {
                "type": "object",
                "properties": {
                    "passed": {
                        "type": "boolean",
                        "description": "Whether the student passed the exam. Pass if they demonstrated reasonable understanding of the core concepts."
                    },
                    "feedback": {
                        "type": "string",
                        "description": "2-3 sentences of constructive feedback for the student about their performance."
                    }
                },
                "required": ["passed", "feedback"]
            }
        }]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards::test_support::{lesson, services, FixedMultimodal, MemoryObjects, QueuedText};
    use std::sync::Arc;

    async fn run(response: &str, focus: &str) -> GeneratedCard {
        let services = services(
            Arc::new(QueuedText::new(response)),
            Arc::new(FixedMultimodal::text("")),
            Arc::new(MemoryObjects::default()),
        );
        let lesson = lesson();
        let ctx = GeneratorContext {
            lesson: &lesson,
            focus,
            services: &services,
        };
        OralExamCard.generate(&ctx).await.unwrap()
    }

    #[tokio::test]
    async fn clamps_question_count_and_truncates_context() {
        let long_context = "x".repeat(2_000);
        let response = format!(
            r#"{{"topic": "Power rule", "context": "{}", "questionCount": 9}}"#,
            long_context
        );
        let card = run(&response, "assess").await;

        assert_eq!(card.kind, "oral_exam");
        assert_eq!(card.content["questionCount"], 5);
        assert_eq!(card.content["context"].as_str().unwrap().len(), 1_500);
        let prompt = card.content["systemPrompt"].as_str().unwrap();
        assert!(prompt.contains("Ask 5 questions"));
        assert_eq!(card.content["tools"][0]["functionDeclarations"][0]["name"], "end_exam");
    }

    #[tokio::test]
    async fn low_question_counts_are_raised_to_three() {
        let card = run(r#"{"topic": "t", "context": "c", "questionCount": 1}"#, "assess").await;
        assert_eq!(card.content["questionCount"], 3);
    }

    #[tokio::test]
    async fn fallback_examines_the_focus_with_lesson_content() {
        let card = run("I'd be happy to help!", "explain the power rule").await;
        assert_eq!(card.content["topic"], "explain the power rule");
        assert_eq!(card.content["questionCount"], 3);
        assert_eq!(
            card.content["context"],
            "The derivative of x^n is n x^(n-1)."
        );
    }

    #[tokio::test]
    async fn fallback_uses_the_title_without_a_focus() {
        let card = run(r#"{"topic": "", "context": "", "questionCount": 0}"#, " ").await;
        assert_eq!(card.content["topic"], "Derivatives");
    }
}
