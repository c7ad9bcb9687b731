pub mod cards;
pub mod domain;
pub mod json;
pub mod pipeline;
pub mod ports;

pub use cards::{
    CardGenerator, CardRegistry, GenerationServices, LessonContext, LessonPlanner, PlannerPolicy,
};
pub use domain::{
    Card, Chunk, Document, DocumentStatus, Lesson, LessonProgressUpdate, LessonStatus, NewCard,
    NewDocument, NewLesson,
};
pub use pipeline::{DocumentProcessor, LessonGenerationTrigger, ProcessOutcome, TriggerOutcome};
pub use ports::{
    DatabaseService, MultimodalGenerationService, ObjectStore, PortError, PortResult,
    TextGenerationService,
};
