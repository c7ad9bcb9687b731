//! Lesson planner: step one of card generation.
//!
//! Asks the model which card kinds to produce and what each should focus on,
//! then validates the answer against the registry. Planning never fails: any
//! upstream or parse error yields the deterministic default plan.

use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

use super::registry::CardRegistry;
use super::LessonContext;
use crate::json::{excerpt, parse_model_json};
use crate::ports::TextGenerationService;

const PLANNER_CONTENT_CHARS: usize = 10_000;

/// One card the planner intends to generate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedCard {
    pub kind: String,
    pub focus: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanSource {
    Model,
    Default,
}

/// An ordered, validated list of planned cards. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LessonPlan {
    pub cards: Vec<PlannedCard>,
    pub source: PlanSource,
}

impl LessonPlan {
    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }
}

/// Size and coverage rules a model-proposed plan must satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannerPolicy {
    pub max_cards: usize,
    pub min_cards: usize,
    /// Every registered kind must appear at least once.
    pub require_all_kinds: bool,
}

impl Default for PlannerPolicy {
    fn default() -> Self {
        Self {
            max_cards: 8,
            min_cards: 3,
            require_all_kinds: true,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawPlan {
    Wrapped { cards: Vec<serde_json::Value> },
    Bare(Vec<serde_json::Value>),
}

impl RawPlan {
    fn into_entries(self) -> Vec<serde_json::Value> {
        match self {
            RawPlan::Wrapped { cards } => cards,
            RawPlan::Bare(cards) => cards,
        }
    }
}

pub struct LessonPlanner {
    registry: Arc<CardRegistry>,
    text: Arc<dyn TextGenerationService>,
    policy: PlannerPolicy,
}

impl LessonPlanner {
    pub fn new(
        registry: Arc<CardRegistry>,
        text: Arc<dyn TextGenerationService>,
        policy: PlannerPolicy,
    ) -> Self {
        Self {
            registry,
            text,
            policy,
        }
    }

    /// Plans the cards for one lesson.
    pub async fn plan(&self, lesson: &LessonContext) -> LessonPlan {
        let prompt = self.build_prompt(lesson);
        let raw = match self.text.generate_text(&prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("[Planner] Model call failed, using default plan: {}", e);
                return self.default_plan();
            }
        };

        match self.validate(&raw) {
            Some(plan) => {
                info!("[Planner] Plan created with {} cards", plan.len());
                plan
            }
            None => self.default_plan(),
        }
    }

    /// Validates raw model output. `None` means the default plan must be used.
    pub fn validate(&self, raw: &str) -> Option<LessonPlan> {
        let entries = match parse_model_json::<RawPlan>(raw) {
            Ok(plan) => plan.into_entries(),
            Err(e) => {
                warn!("[Planner] Failed to parse plan: {}", e);
                return None;
            }
        };

        let cards: Vec<PlannedCard> = entries
            .iter()
            .filter_map(|entry| self.planned_card_from(entry))
            .take(self.policy.max_cards)
            .collect();

        if cards.len() < self.required_minimum() {
            warn!(
                "[Planner] Plan has {} valid cards, fewer than the required {}",
                cards.len(),
                self.required_minimum()
            );
            return None;
        }

        if self.coverage_enforced() {
            let missing: Vec<&str> = self
                .registry
                .list_names()
                .into_iter()
                .filter(|name| !cards.iter().any(|c| c.kind == *name))
                .collect();
            if !missing.is_empty() {
                warn!("[Planner] Plan is missing card kinds: {:?}", missing);
                return None;
            }
        }

        Some(LessonPlan {
            cards,
            source: PlanSource::Model,
        })
    }

    /// One card per registered kind with the kind's generic focus.
    pub fn default_plan(&self) -> LessonPlan {
        let cards = self
            .registry
            .descriptors()
            .into_iter()
            .take(self.policy.max_cards.max(1))
            .map(|d| PlannedCard {
                kind: d.kind.to_string(),
                focus: d.default_focus.to_string(),
            })
            .collect();
        LessonPlan {
            cards,
            source: PlanSource::Default,
        }
    }

    fn planned_card_from(&self, entry: &serde_json::Value) -> Option<PlannedCard> {
        let kind = entry
            .get("type")
            .or_else(|| entry.get("kind"))
            .and_then(|v| v.as_str())?;
        let card_kind = match self.registry.get(kind) {
            Some(card_kind) => card_kind,
            None => {
                warn!("[Planner] Dropping unknown card kind '{}'", kind);
                return None;
            }
        };
        let focus = entry
            .get("focus")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| card_kind.descriptor().default_focus.to_string());
        Some(PlannedCard {
            kind: kind.to_string(),
            focus,
        })
    }

    fn coverage_enforced(&self) -> bool {
        self.policy.require_all_kinds && self.registry.len() <= self.policy.max_cards
    }

    fn required_minimum(&self) -> usize {
        let minimum = if self.coverage_enforced() {
            self.policy.min_cards.max(self.registry.len())
        } else {
            self.policy.min_cards
        };
        minimum.clamp(1, self.policy.max_cards.max(1))
    }

    fn build_prompt(&self, lesson: &LessonContext) -> String {
        let names = self.registry.list_names().join(", ");
        let coverage = if self.coverage_enforced() {
            format!(
                "- You MUST include at least one card of each of these types: {}\n",
                names
            )
        } else {
            String::new()
        };

        format!(
            "You are a curriculum designer creating a lesson plan for a bite-sized learning app.\n\n\
             ## Lesson Information\nTitle: {title}\n{description}\n\n\
             ## Content to Teach\n{content}\n\n\
             ## Available Card Types\n{catalog}\n\n\
             ## Requirements\n\
             - Use ONLY these card types: {names}\n\
             {coverage}\
             - Between {min} and {max} cards in total\n\
             - Start by introducing concepts, alternate teaching and testing, end with a final check\n\
             - Each card focuses on ONE specific concept; make the focus specific and actionable\n\n\
             ## Output Format\n\
             Return ONLY a JSON object: {{\"cards\": [{{\"type\": \"text\", \"focus\": \"...\"}}]}}\n\
             No markdown code blocks. Just the raw JSON.",
            title = lesson.title,
            description = lesson.description_line(),
            content = excerpt(&lesson.content, PLANNER_CONTENT_CHARS),
            catalog = self.registry.describe_all(),
            names = names,
            coverage = coverage,
            min = self.required_minimum(),
            max = self.policy.max_cards,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards::test_support::{lesson, QueuedText};

    fn planner_with(text: Arc<QueuedText>, policy: PlannerPolicy) -> LessonPlanner {
        LessonPlanner::new(Arc::new(CardRegistry::with_builtin_kinds()), text, policy)
    }

    fn relaxed() -> PlannerPolicy {
        PlannerPolicy {
            require_all_kinds: false,
            ..PlannerPolicy::default()
        }
    }

    #[tokio::test]
    async fn unknown_kinds_are_dropped_before_generation() {
        let text = Arc::new(QueuedText::new(""));
        text.push(
            r#"```json
            {"cards": [
                {"type": "text", "focus": "introduce limits"},
                {"type": "video_learning", "focus": "animate a tangent"},
                {"type": "mc_question", "focus": "check limits"},
                {"type": "fill_in_blank", "focus": "recall the notation"}
            ]}
            ```"#,
        );
        let plan = planner_with(text, relaxed()).plan(&lesson()).await;

        assert_eq!(plan.source, PlanSource::Model);
        let kinds: Vec<&str> = plan.cards.iter().map(|c| c.kind.as_str()).collect();
        assert_eq!(kinds, vec!["text", "mc_question", "fill_in_blank"]);
    }

    #[tokio::test]
    async fn plans_are_truncated_to_the_maximum() {
        let text = Arc::new(QueuedText::new(""));
        let entries: Vec<String> = (0..12)
            .map(|i| format!(r#"{{"type": "text", "focus": "point {}"}}"#, i))
            .collect();
        text.push(&format!("[{}]", entries.join(",")));

        let plan = planner_with(text, relaxed()).plan(&lesson()).await;
        assert_eq!(plan.len(), 8);
        assert_eq!(plan.cards[7].focus, "point 7");
    }

    #[tokio::test]
    async fn garbage_output_yields_the_default_plan() {
        let text = Arc::new(QueuedText::new("I'd suggest starting with a text card!"));
        let planner = planner_with(text, PlannerPolicy::default());
        let plan = planner.plan(&lesson()).await;

        assert_eq!(plan.source, PlanSource::Default);
        assert_eq!(plan, planner.default_plan());
        assert_eq!(plan.len(), 6);
    }

    #[tokio::test]
    async fn upstream_errors_yield_the_default_plan() {
        let text = Arc::new(QueuedText::new(""));
        text.push_error("quota exceeded");
        let plan = planner_with(text, relaxed()).plan(&lesson()).await;
        assert_eq!(plan.source, PlanSource::Default);
    }

    #[test]
    fn under_minimum_plans_are_rejected() {
        let planner = planner_with(Arc::new(QueuedText::new("")), relaxed());
        let raw = r#"{"cards": [{"type": "text", "focus": "a"}, {"type": "nope", "focus": "b"}]}"#;
        assert!(planner.validate(raw).is_none());
    }

    #[test]
    fn full_coverage_requires_every_kind() {
        let planner = planner_with(Arc::new(QueuedText::new("")), PlannerPolicy::default());
        let partial = r#"[
            {"type": "text", "focus": "a"}, {"type": "mc_question", "focus": "b"},
            {"type": "fill_in_blank", "focus": "c"}, {"type": "infographic", "focus": "d"},
            {"type": "interactive_visual", "focus": "e"}, {"type": "text", "focus": "f"}
        ]"#;
        assert!(planner.validate(partial).is_none());

        let complete = r#"[
            {"type": "text", "focus": "a"}, {"type": "mc_question", "focus": "b"},
            {"type": "fill_in_blank", "focus": "c"}, {"type": "infographic", "focus": "d"},
            {"type": "interactive_visual", "focus": "e"}, {"type": "oral_exam", "focus": "f"}
        ]"#;
        assert_eq!(planner.validate(complete).map(|p| p.len()), Some(6));
    }

    #[test]
    fn missing_focus_falls_back_to_the_kind_default() {
        let planner = planner_with(Arc::new(QueuedText::new("")), relaxed());
        let raw = r#"[{"type": "text"}, {"type": "text", "focus": "  "}, {"type": "mc_question", "focus": "x"}]"#;
        let plan = planner.validate(raw).unwrap();
        assert_eq!(plan.cards[0].focus, "introduce the main concept of this lesson");
        assert_eq!(plan.cards[1].focus, plan.cards[0].focus);
    }

    #[tokio::test]
    async fn prompt_carries_catalog_and_constraints() {
        let text = Arc::new(QueuedText::new("[]"));
        planner_with(text.clone(), PlannerPolicy::default())
            .plan(&lesson())
            .await;
        let prompts = text.prompts.lock().unwrap();
        assert!(prompts[0].contains("Title: Derivatives"));
        assert!(prompts[0].contains("(type: \"oral_exam\")"));
        assert!(prompts[0].contains("Between 6 and 8 cards"));
    }
}
