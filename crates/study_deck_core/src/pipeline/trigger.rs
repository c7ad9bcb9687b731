//! Lesson generation trigger: plans and generates the cards of one lesson.
//!
//! `pending -> generating -> ready`, and back to `pending` when anything
//! fails. A `ready` lesson is never regenerated by the trigger.

use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use uuid::Uuid;

use super::stale_cutoff;
use crate::cards::{CardError, CardGenerator, LessonContext, LessonPlanner};
use crate::domain::{Card, Lesson, LessonStatus, NewCard};
use crate::ports::{DatabaseService, PortError, PortResult};

const CHUNK_SEPARATOR: &str = "\n\n---\n\n";

#[derive(Debug, Clone)]
pub enum TriggerOutcome {
    Generated {
        cards: Vec<Card>,
        errors: Vec<CardError>,
    },
    /// The lesson was already `ready`.
    Cached,
    /// Another run holds the lesson.
    InProgress,
}

pub struct LessonGenerationTrigger {
    db: Arc<dyn DatabaseService>,
    planner: LessonPlanner,
    generator: CardGenerator,
    stale_after: Duration,
}

impl LessonGenerationTrigger {
    pub fn new(
        db: Arc<dyn DatabaseService>,
        planner: LessonPlanner,
        generator: CardGenerator,
        stale_after: Duration,
    ) -> Self {
        Self {
            db,
            planner,
            generator,
            stale_after,
        }
    }

    /// Generates the lesson's cards unless they exist or are being generated.
    ///
    /// Returns `NotFound` for an unknown id. Any error after the claim resets
    /// the lesson to `pending`.
    pub async fn trigger(&self, lesson_id: Uuid) -> PortResult<TriggerOutcome> {
        info!("[Generate] Starting card generation for lesson: {}", lesson_id);

        let lesson = self.db.get_lesson(lesson_id).await?;
        if lesson.status == LessonStatus::Ready {
            info!("[Generate] Cards already exist, skipping generation");
            return Ok(TriggerOutcome::Cached);
        }

        let claimed = self
            .db
            .claim_lesson_for_generation(lesson_id, stale_cutoff(self.stale_after))
            .await?;
        let Some(lesson) = claimed else {
            // Lost the race: the other run may already have finished.
            let current = self.db.get_lesson(lesson_id).await?;
            return Ok(if current.status == LessonStatus::Ready {
                TriggerOutcome::Cached
            } else {
                TriggerOutcome::InProgress
            });
        };
        info!(
            "[Generate] Lesson: {}, chunks {}-{}",
            lesson.title, lesson.start_chunk_index, lesson.end_chunk_index
        );

        match self.run(&lesson).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                error!("[Generate] Generation error: {}", e);
                if let Err(status_err) = self
                    .db
                    .set_lesson_status(lesson_id, LessonStatus::Pending)
                    .await
                {
                    error!("[Generate] Failed to reset lesson status: {}", status_err);
                }
                Err(e)
            }
        }
    }

    async fn run(&self, lesson: &Lesson) -> PortResult<TriggerOutcome> {
        let chunks = self
            .db
            .get_chunks_in_range(
                lesson.document_id,
                lesson.start_chunk_index,
                lesson.end_chunk_index,
            )
            .await?;
        if chunks.is_empty() {
            return Err(PortError::Unexpected(
                "No chunks found for this lesson".to_string(),
            ));
        }

        let content = chunks
            .iter()
            .map(|c| c.content.as_str())
            .collect::<Vec<_>>()
            .join(CHUNK_SEPARATOR);
        let context = LessonContext {
            lesson_id: lesson.id,
            title: lesson.title.clone(),
            description: lesson.description.clone(),
            content,
        };

        let plan = self.planner.plan(&context).await;
        let result = self.generator.generate(&plan, &context).await;
        if result.cards.is_empty() {
            return Err(PortError::Unexpected(format!(
                "All {} planned cards failed to generate",
                plan.len()
            )));
        }

        let new_cards = result
            .cards
            .into_iter()
            .enumerate()
            .map(|(order_index, card)| NewCard {
                order_index: order_index as i32,
                kind: card.kind,
                content: card.content,
            })
            .collect();
        let cards = self.db.store_generated_cards(lesson.id, new_cards).await?;
        info!(
            "[Generate] Card generation complete for lesson {}: {} cards, {} errors",
            lesson.id,
            cards.len(),
            result.errors.len()
        );

        Ok(TriggerOutcome::Generated {
            cards,
            errors: result.errors,
        })
    }
}
