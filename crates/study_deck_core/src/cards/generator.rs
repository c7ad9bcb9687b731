//! Card generator: step two of card generation.
//!
//! Fans out one task per planned card, waits for every task to settle, then
//! restores plan order. A failing card is reported as an indexed error and
//! left out; it never aborts the rest of the batch.

use futures::{stream, FutureExt, StreamExt};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, info};

use super::planner::{LessonPlan, PlannedCard};
use super::registry::CardRegistry;
use super::{GeneratedCard, GenerationServices, GeneratorContext, LessonContext};

/// Diagnostic for one plan slot that produced no card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardError {
    pub index: usize,
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct GenerationResult {
    /// In plan order, minus failed slots.
    pub cards: Vec<GeneratedCard>,
    pub errors: Vec<CardError>,
}

pub struct CardGenerator {
    registry: Arc<CardRegistry>,
    services: GenerationServices,
    max_concurrency: usize,
}

impl CardGenerator {
    pub fn new(
        registry: Arc<CardRegistry>,
        services: GenerationServices,
        max_concurrency: usize,
    ) -> Self {
        Self {
            registry,
            services,
            max_concurrency: max_concurrency.max(1),
        }
    }

    pub async fn generate(&self, plan: &LessonPlan, lesson: &LessonContext) -> GenerationResult {
        let total = plan.len();
        let tasks: Vec<_> = plan
            .cards
            .iter()
            .enumerate()
            .map(|(index, planned)| self.generate_one(index, total, planned, lesson))
            .collect();

        // Completion order is arbitrary; the index restores plan order.
        let mut outcomes: Vec<(usize, Result<GeneratedCard, CardError>)> = stream::iter(tasks)
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await;
        outcomes.sort_by_key(|(index, _)| *index);

        let mut result = GenerationResult::default();
        for (_, outcome) in outcomes {
            match outcome {
                Ok(card) => result.cards.push(card),
                Err(e) => result.errors.push(e),
            }
        }
        info!(
            "[Generator] Generated {} cards, {} errors",
            result.cards.len(),
            result.errors.len()
        );
        result
    }

    async fn generate_one(
        &self,
        index: usize,
        total: usize,
        planned: &PlannedCard,
        lesson: &LessonContext,
    ) -> (usize, Result<GeneratedCard, CardError>) {
        let fail = |message: String| CardError {
            index,
            kind: planned.kind.clone(),
            message,
        };

        let Some(kind) = self.registry.get(&planned.kind) else {
            error!("[Generator] Unknown card kind at {}: {}", index, planned.kind);
            return (index, Err(fail(format!("Unknown card kind: {}", planned.kind))));
        };

        let ctx = GeneratorContext {
            lesson,
            focus: &planned.focus,
            services: &self.services,
        };
        info!(
            "[Generator] Generating card {}/{}: {} - {}",
            index + 1,
            total,
            planned.kind,
            planned.focus
        );

        let outcome = match AssertUnwindSafe(kind.generate(&ctx)).catch_unwind().await {
            Ok(Ok(card)) if self.registry.contains(&card.kind) => Ok(card),
            Ok(Ok(card)) => Err(fail(format!("Generator returned unregistered kind: {}", card.kind))),
            Ok(Err(e)) => Err(fail(e.to_string())),
            Err(_) => Err(fail("Card generator panicked".to_string())),
        };
        if let Err(e) = &outcome {
            error!("[Generator] Failed to generate card {}: {}", index + 1, e.message);
        }
        (index, outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards::planner::PlanSource;
    use crate::cards::test_support::{lesson, services, FixedMultimodal, MemoryObjects, QueuedText};
    use crate::cards::{CardDescriptor, CardKind};
    use crate::ports::{PortError, PortResult};
    use async_trait::async_trait;
    use std::time::Duration;

    /// Echoes its focus back after a delay derived from it.
    struct SlowEcho;

    #[async_trait]
    impl CardKind for SlowEcho {
        fn kind(&self) -> &'static str {
            "echo"
        }

        fn descriptor(&self) -> CardDescriptor {
            CardDescriptor {
                kind: "echo",
                name: "Echo",
                description: "test",
                best_used_for: "test",
                default_focus: "echo",
                example_output: serde_json::json!({}),
            }
        }

        async fn generate(&self, ctx: &GeneratorContext<'_>) -> PortResult<GeneratedCard> {
            let delay: u64 = ctx.focus.parse().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok(GeneratedCard {
                kind: "echo".to_string(),
                content: serde_json::json!({ "focus": ctx.focus }),
            })
        }
    }

    struct Broken;

    #[async_trait]
    impl CardKind for Broken {
        fn kind(&self) -> &'static str {
            "broken"
        }

        fn descriptor(&self) -> CardDescriptor {
            CardDescriptor {
                kind: "broken",
                name: "Broken",
                description: "test",
                best_used_for: "test",
                default_focus: "break",
                example_output: serde_json::json!({}),
            }
        }

        async fn generate(&self, _ctx: &GeneratorContext<'_>) -> PortResult<GeneratedCard> {
            Err(PortError::Unexpected("model exploded".to_string()))
        }
    }

    fn generator() -> CardGenerator {
        let mut registry = CardRegistry::new();
        registry.register(Arc::new(SlowEcho));
        registry.register(Arc::new(Broken));
        CardGenerator::new(
            Arc::new(registry),
            services(
                Arc::new(QueuedText::new("")),
                Arc::new(FixedMultimodal::text("")),
                Arc::new(MemoryObjects::default()),
            ),
            4,
        )
    }

    fn plan(entries: &[(&str, &str)]) -> LessonPlan {
        LessonPlan {
            cards: entries
                .iter()
                .map(|(kind, focus)| PlannedCard {
                    kind: kind.to_string(),
                    focus: focus.to_string(),
                })
                .collect(),
            source: PlanSource::Model,
        }
    }

    #[tokio::test]
    async fn output_follows_plan_order_not_completion_order() {
        let plan = plan(&[("echo", "40"), ("echo", "0"), ("echo", "20"), ("echo", "5")]);
        let result = generator().generate(&plan, &lesson()).await;

        let focuses: Vec<&str> = result
            .cards
            .iter()
            .map(|c| c.content["focus"].as_str().unwrap())
            .collect();
        assert_eq!(focuses, vec!["40", "0", "20", "5"]);
        assert!(result.errors.is_empty());
    }

    #[tokio::test]
    async fn one_failing_card_does_not_poison_the_batch() {
        let plan = plan(&[("echo", "1"), ("broken", "x"), ("echo", "2")]);
        let result = generator().generate(&plan, &lesson()).await;

        assert_eq!(result.cards.len(), 2);
        assert_eq!(
            result.errors,
            vec![CardError {
                index: 1,
                kind: "broken".to_string(),
                message: "An unexpected error occurred: model exploded".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn unknown_kinds_are_reported_per_index() {
        let plan = plan(&[("echo", "1"), ("hologram", "x")]);
        let result = generator().generate(&plan, &lesson()).await;

        assert_eq!(result.cards.len(), 1);
        assert_eq!(result.errors[0].index, 1);
        assert_eq!(result.errors[0].message, "Unknown card kind: hologram");
    }
}
