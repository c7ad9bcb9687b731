//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::adapters::storage::UrlSigner;
use crate::config::Config;
use std::sync::Arc;
use study_deck_core::cards::{
    CardGenerator, CardRegistry, GenerationServices, LessonPlanner, PlannerPolicy,
};
use study_deck_core::pipeline::{DocumentProcessor, LessonGenerationTrigger};
use study_deck_core::ports::{DatabaseService, ObjectStore};

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn DatabaseService>,
    pub object_store: Arc<dyn ObjectStore>,
    pub url_signer: UrlSigner,
    pub processor: Arc<DocumentProcessor>,
    pub trigger: Arc<LessonGenerationTrigger>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wires the pipeline over the given adapters, with the built-in card kinds.
    pub fn new(
        config: Arc<Config>,
        db: Arc<dyn DatabaseService>,
        services: GenerationServices,
        url_signer: UrlSigner,
    ) -> Self {
        let registry = Arc::new(CardRegistry::with_builtin_kinds());
        let policy = PlannerPolicy {
            max_cards: config.planner_max_cards,
            min_cards: config.planner_min_cards,
            require_all_kinds: config.planner_require_all_kinds,
        };
        let planner = LessonPlanner::new(registry.clone(), services.text.clone(), policy);
        let generator =
            CardGenerator::new(registry, services.clone(), config.generation_concurrency);

        let processor = DocumentProcessor::new(
            db.clone(),
            services.object_store.clone(),
            services.multimodal.clone(),
            services.text.clone(),
            config.stale_status_after,
        );
        let trigger =
            LessonGenerationTrigger::new(db.clone(), planner, generator, config.stale_status_after);

        Self {
            db,
            object_store: services.object_store,
            url_signer,
            processor: Arc::new(processor),
            trigger: Arc::new(trigger),
            config,
        }
    }
}
