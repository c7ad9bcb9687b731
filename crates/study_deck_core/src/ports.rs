//! crates/study_deck_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or model APIs.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use std::time::Duration;
use uuid::Uuid;

use crate::domain::{
    Card, Chunk, Document, DocumentStatus, Lesson, LessonProgressUpdate, LessonStatus, NewCard,
    NewDocument, NewLesson,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Datastore
//=========================================================================================

#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- Documents ---
    async fn create_document(&self, document: NewDocument) -> PortResult<Document>;

    async fn get_document(&self, document_id: Uuid) -> PortResult<Document>;

    /// Atomically moves a document into `processing`.
    ///
    /// Succeeds from `pending` or `failed`, and from a `processing` row whose
    /// `updated_at` is older than `stale_before`. Returns `None` when the row
    /// exists but is not claimable.
    async fn claim_document_for_processing(
        &self,
        document_id: Uuid,
        stale_before: DateTime<Utc>,
    ) -> PortResult<Option<Document>>;

    async fn set_document_status(
        &self,
        document_id: Uuid,
        status: DocumentStatus,
    ) -> PortResult<()>;

    /// Deletes the chunks and lessons (and their cards) left by an earlier run.
    async fn reset_document_content(&self, document_id: Uuid) -> PortResult<()>;

    // --- Chunks ---
    /// Inserts one chunk per page, indexed `0..pages.len()`.
    async fn insert_chunks(&self, document_id: Uuid, pages: &[String]) -> PortResult<Vec<Chunk>>;

    /// Returns chunks with `start <= chunk_index <= end`, ascending.
    async fn get_chunks_in_range(
        &self,
        document_id: Uuid,
        start: i32,
        end: i32,
    ) -> PortResult<Vec<Chunk>>;

    // --- Lessons ---
    async fn insert_lesson(&self, lesson: NewLesson) -> PortResult<Lesson>;

    async fn get_lesson(&self, lesson_id: Uuid) -> PortResult<Lesson>;

    /// Lessons of a document ordered by `order_index`.
    async fn list_lessons(&self, document_id: Uuid) -> PortResult<Vec<Lesson>>;

    /// Atomically moves a lesson into `generating`.
    ///
    /// Succeeds from `pending`, and from a `generating` row whose `updated_at`
    /// is older than `stale_before`. Returns `None` when the row is not claimable.
    async fn claim_lesson_for_generation(
        &self,
        lesson_id: Uuid,
        stale_before: DateTime<Utc>,
    ) -> PortResult<Option<Lesson>>;

    async fn set_lesson_status(&self, lesson_id: Uuid, status: LessonStatus) -> PortResult<()>;

    async fn update_lesson_progress(
        &self,
        lesson_id: Uuid,
        update: LessonProgressUpdate,
    ) -> PortResult<()>;

    // --- Cards ---
    /// Replaces every card of the lesson with `cards` and marks the lesson `ready`,
    /// as a single unit of work.
    async fn store_generated_cards(
        &self,
        lesson_id: Uuid,
        cards: Vec<NewCard>,
    ) -> PortResult<Vec<Card>>;

    /// Cards of a lesson ordered by `order_index`.
    async fn list_cards(&self, lesson_id: Uuid) -> PortResult<Vec<Card>>;
}

//=========================================================================================
// Object storage
//=========================================================================================

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stores `bytes` at `path`. Existing objects are never overwritten.
    async fn upload(&self, path: &str, bytes: &[u8], content_type: &str) -> PortResult<()>;

    async fn download(&self, path: &str) -> PortResult<Vec<u8>>;

    /// Creates a time-limited URL granting read access to `path`.
    async fn create_signed_url(&self, path: &str, ttl: Duration) -> PortResult<String>;
}

//=========================================================================================
// Generative model
//=========================================================================================

/// An inline payload sent alongside a multimodal prompt, already in the
/// base64 encoding generative services expect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub mime_type: String,
    pub data_base64: String,
}

impl Attachment {
    pub fn from_bytes(mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            mime_type: mime_type.into(),
            data_base64: STANDARD.encode(bytes),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MultimodalRequest {
    pub prompt: String,
    pub attachments: Vec<Attachment>,
    /// Ask the model to produce an image alongside its text.
    pub wants_image: bool,
}

/// A binary asset produced by the model, decoded from its transport encoding.
#[derive(Debug, Clone)]
pub struct GeneratedAsset {
    pub mime_type: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct MultimodalResponse {
    pub text: String,
    pub asset: Option<GeneratedAsset>,
}

#[async_trait]
pub trait TextGenerationService: Send + Sync {
    /// Sends a single self-contained prompt and returns the model's text.
    async fn generate_text(&self, prompt: &str) -> PortResult<String>;
}

#[async_trait]
pub trait MultimodalGenerationService: Send + Sync {
    /// Sends a prompt with optional inline attachments; may return an asset.
    async fn generate_multimodal(&self, request: MultimodalRequest)
        -> PortResult<MultimodalResponse>;
}
