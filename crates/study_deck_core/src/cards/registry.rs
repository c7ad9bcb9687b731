//! The catalog of card kinds known to the planner and generator.

use std::sync::Arc;
use tracing::warn;

use super::kinds::{
    FillInBlankCard, InfographicCard, InteractiveVisualCard, McQuestionCard, OralExamCard,
    TextCard,
};
use super::{CardDescriptor, CardKind};

/// Registered card kinds, in registration order.
#[derive(Clone, Default)]
pub struct CardRegistry {
    kinds: Vec<Arc<dyn CardKind>>,
}

impl CardRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The catalog shipped with the application.
    pub fn with_builtin_kinds() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(TextCard));
        registry.register(Arc::new(McQuestionCard));
        registry.register(Arc::new(FillInBlankCard));
        registry.register(Arc::new(InfographicCard));
        registry.register(Arc::new(InteractiveVisualCard));
        registry.register(Arc::new(OralExamCard));
        registry
    }

    /// Adds a kind. A kind registered under an existing name replaces it in place.
    pub fn register(&mut self, kind: Arc<dyn CardKind>) {
        if let Some(slot) = self.kinds.iter_mut().find(|k| k.kind() == kind.kind()) {
            warn!("Card kind '{}' registered twice; replacing", kind.kind());
            *slot = kind;
        } else {
            self.kinds.push(kind);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn CardKind>> {
        self.kinds.iter().find(|k| k.kind() == name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.kinds.iter().any(|k| k.kind() == name)
    }

    pub fn list_names(&self) -> Vec<&'static str> {
        self.kinds.iter().map(|k| k.kind()).collect()
    }

    pub fn descriptors(&self) -> Vec<CardDescriptor> {
        self.kinds.iter().map(|k| k.descriptor()).collect()
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// Human-readable catalog used to prompt the planner.
    pub fn describe_all(&self) -> String {
        self.descriptors()
            .iter()
            .map(|d| {
                let example = serde_json::to_string_pretty(&d.example_output)
                    .unwrap_or_else(|_| d.example_output.to_string());
                format!(
                    "## {} (type: \"{}\")\n{}\nBest used for: {}\nOutput format: {}\n",
                    d.name, d.kind, d.description, d.best_used_for, example
                )
            })
            .collect::<Vec<_>>()
            .join("\n---\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_lists_kinds_in_registration_order() {
        let registry = CardRegistry::with_builtin_kinds();
        assert_eq!(
            registry.list_names(),
            vec![
                "text",
                "mc_question",
                "fill_in_blank",
                "infographic",
                "interactive_visual",
                "oral_exam"
            ]
        );
        assert!(registry.get("mc_question").is_some());
        assert!(registry.get("video_learning").is_none());
    }

    #[test]
    fn registering_an_existing_name_replaces_it() {
        let mut registry = CardRegistry::new();
        registry.register(Arc::new(TextCard));
        registry.register(Arc::new(TextCard));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn catalog_description_mentions_every_kind() {
        let registry = CardRegistry::with_builtin_kinds();
        let catalog = registry.describe_all();
        for name in registry.list_names() {
            assert!(catalog.contains(&format!("(type: \"{}\")", name)));
        }
        assert!(catalog.contains("Best used for:"));
    }
}
