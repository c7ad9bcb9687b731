//! The card system: a registry of pluggable card kinds, the lesson planner
//! that decides which kinds to produce, and the generator that fans out one
//! task per planned card.
//!
//! Adding a card kind means implementing [`CardKind`] in `kinds/` and
//! registering it in [`CardRegistry::with_builtin_kinds`]. Neither the planner
//! nor the generator needs to change.

pub mod generator;
pub mod kinds;
pub mod planner;
pub mod registry;

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::ports::{
    MultimodalGenerationService, ObjectStore, PortError, PortResult, TextGenerationService,
};

pub use generator::{CardError, CardGenerator, GenerationResult};
pub use planner::{LessonPlan, LessonPlanner, PlannedCard, PlannerPolicy};
pub use registry::CardRegistry;

/// The lesson-level inputs shared by every card of one generation run.
#[derive(Debug, Clone)]
pub struct LessonContext {
    pub lesson_id: Uuid,
    pub title: String,
    pub description: String,
    /// Concatenated text of the lesson's chunk range.
    pub content: String,
}

impl LessonContext {
    /// The optional "Description: ..." line used in prompts.
    pub fn description_line(&self) -> String {
        if self.description.trim().is_empty() {
            String::new()
        } else {
            format!("Description: {}", self.description)
        }
    }
}

/// External capabilities a card kind may use while generating.
#[derive(Clone)]
pub struct GenerationServices {
    pub text: Arc<dyn TextGenerationService>,
    pub multimodal: Arc<dyn MultimodalGenerationService>,
    pub object_store: Arc<dyn ObjectStore>,
}

/// Everything one card kind receives for one planned card.
pub struct GeneratorContext<'a> {
    pub lesson: &'a LessonContext,
    pub focus: &'a str,
    pub services: &'a GenerationServices,
}

/// The output of a card kind, before it gains identity in the datastore.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedCard {
    pub kind: String,
    pub content: serde_json::Value,
}

impl GeneratedCard {
    pub fn new<T: Serialize>(kind: &str, content: &T) -> PortResult<Self> {
        let content = serde_json::to_value(content)
            .map_err(|e| PortError::Unexpected(format!("Failed to encode {} card: {}", kind, e)))?;
        Ok(Self {
            kind: kind.to_string(),
            content,
        })
    }
}

/// Metadata describing a card kind to the planner.
#[derive(Debug, Clone)]
pub struct CardDescriptor {
    pub kind: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub best_used_for: &'static str,
    /// Focus used for this kind in the default plan.
    pub default_focus: &'static str,
    pub example_output: serde_json::Value,
}

/// A pluggable card kind.
///
/// Implementations own their fallback: a malformed model response should
/// produce a minimal valid card of the same kind rather than an error.
#[async_trait]
pub trait CardKind: Send + Sync {
    /// The stable tag stored in `cards.type`.
    fn kind(&self) -> &'static str;

    fn descriptor(&self) -> CardDescriptor;

    async fn generate(&self, ctx: &GeneratorContext<'_>) -> PortResult<GeneratedCard>;
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Hand-written fakes shared by the card and pipeline unit tests.

    use super::*;
    use crate::ports::{GeneratedAsset, MultimodalRequest, MultimodalResponse};
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Returns queued responses in order, then a fixed default.
    #[derive(Default)]
    pub struct QueuedText {
        responses: Mutex<VecDeque<PortResult<String>>>,
        pub prompts: Mutex<Vec<String>>,
        default: String,
    }

    impl QueuedText {
        pub fn new(default: &str) -> Self {
            Self {
                default: default.to_string(),
                ..Default::default()
            }
        }

        pub fn push(&self, response: &str) {
            self.responses
                .lock()
                .unwrap()
                .push_back(Ok(response.to_string()));
        }

        pub fn push_error(&self, message: &str) {
            self.responses
                .lock()
                .unwrap()
                .push_back(Err(PortError::Unexpected(message.to_string())));
        }
    }

    #[async_trait]
    impl TextGenerationService for QueuedText {
        async fn generate_text(&self, prompt: &str) -> PortResult<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(self.default.clone()))
        }
    }

    /// Multimodal fake returning a fixed response (or error) every call.
    pub struct FixedMultimodal {
        pub text: String,
        pub asset: Option<GeneratedAsset>,
        pub fail: bool,
        pub requests: Mutex<Vec<MultimodalRequest>>,
    }

    impl FixedMultimodal {
        pub fn text(text: &str) -> Self {
            Self {
                text: text.to_string(),
                asset: None,
                fail: false,
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn image(bytes: &[u8]) -> Self {
            Self {
                asset: Some(GeneratedAsset {
                    mime_type: "image/png".to_string(),
                    data: bytes.to_vec(),
                }),
                ..Self::text("")
            }
        }

        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::text("")
            }
        }
    }

    #[async_trait]
    impl MultimodalGenerationService for FixedMultimodal {
        async fn generate_multimodal(
            &self,
            request: MultimodalRequest,
        ) -> PortResult<MultimodalResponse> {
            self.requests.lock().unwrap().push(request);
            if self.fail {
                return Err(PortError::Unexpected("model unavailable".to_string()));
            }
            Ok(MultimodalResponse {
                text: self.text.clone(),
                asset: self.asset.clone(),
            })
        }
    }

    #[derive(Default)]
    pub struct MemoryObjects {
        pub objects: Mutex<HashMap<String, Vec<u8>>>,
        pub fail_uploads: bool,
    }

    #[async_trait]
    impl ObjectStore for MemoryObjects {
        async fn upload(&self, path: &str, bytes: &[u8], _content_type: &str) -> PortResult<()> {
            if self.fail_uploads {
                return Err(PortError::Unexpected("bucket unavailable".to_string()));
            }
            self.objects
                .lock()
                .unwrap()
                .insert(path.to_string(), bytes.to_vec());
            Ok(())
        }

        async fn download(&self, path: &str) -> PortResult<Vec<u8>> {
            self.objects
                .lock()
                .unwrap()
                .get(path)
                .cloned()
                .ok_or_else(|| PortError::NotFound(path.to_string()))
        }

        async fn create_signed_url(&self, path: &str, _ttl: Duration) -> PortResult<String> {
            Ok(format!("memory://{}", path))
        }
    }

    pub fn services(
        text: Arc<dyn TextGenerationService>,
        multimodal: Arc<dyn MultimodalGenerationService>,
        object_store: Arc<dyn ObjectStore>,
    ) -> GenerationServices {
        GenerationServices {
            text,
            multimodal,
            object_store,
        }
    }

    pub fn lesson() -> LessonContext {
        LessonContext {
            lesson_id: Uuid::new_v4(),
            title: "Derivatives".to_string(),
            description: "Rates of change".to_string(),
            content: "The derivative of x^n is n x^(n-1).".to_string(),
        }
    }
}
