//! services/api/src/web/protocol.rs
//!
//! Defines the JSON payloads exchanged over the REST API. Field names are
//! camelCase on the wire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use study_deck_core::cards::CardError;
use study_deck_core::domain::{Card, Document, Lesson};
use utoipa::ToSchema;
use uuid::Uuid;

//=========================================================================================
// Shared
//=========================================================================================

/// Body of every non-2xx response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

//=========================================================================================
// Documents
//=========================================================================================

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSummary {
    pub id: Uuid,
    pub name: String,
    pub storage_path: String,
    pub size_bytes: i64,
    pub mime_type: String,
    /// One of `pending`, `processing`, `completed`, `failed`.
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl From<&Document> for DocumentSummary {
    fn from(document: &Document) -> Self {
        Self {
            id: document.id,
            name: document.name.clone(),
            storage_path: document.storage_path.clone(),
            size_bytes: document.size_bytes,
            mime_type: document.mime_type.clone(),
            status: document.status.to_string(),
            created_at: document.created_at,
        }
    }
}

/// Sent after a successful upload.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: bool,
    pub document: DocumentSummary,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DocumentResponse {
    pub document: DocumentSummary,
    /// Ordered by `orderIndex`; empty until processing completes.
    pub lessons: Vec<LessonSummary>,
}

#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProcessResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_progress: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunks: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lessons: Option<usize>,
}

//=========================================================================================
// Lessons and Cards
//=========================================================================================

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LessonSummary {
    pub id: Uuid,
    pub document_id: Uuid,
    pub prev_lesson_id: Option<Uuid>,
    pub title: String,
    pub description: String,
    pub order_index: i32,
    pub start_chunk_index: i32,
    pub end_chunk_index: i32,
    /// One of `pending`, `generating`, `ready`.
    pub status: String,
    pub is_completed: bool,
    pub best_score: Option<i32>,
}

impl From<&Lesson> for LessonSummary {
    fn from(lesson: &Lesson) -> Self {
        Self {
            id: lesson.id,
            document_id: lesson.document_id,
            prev_lesson_id: lesson.prev_lesson_id,
            title: lesson.title.clone(),
            description: lesson.description.clone(),
            order_index: lesson.order_index,
            start_chunk_index: lesson.start_chunk_index,
            end_chunk_index: lesson.end_chunk_index,
            status: lesson.status.to_string(),
            is_completed: lesson.is_completed,
            best_score: lesson.best_score,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CardDto {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: String,
    pub order_index: i32,
    /// Kind-specific payload.
    #[schema(value_type = Object)]
    pub content: serde_json::Value,
    /// Signed URL of the generated image, for infographic cards.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl From<&Card> for CardDto {
    fn from(card: &Card) -> Self {
        Self {
            id: card.id,
            kind: card.kind.clone(),
            order_index: card.order_index,
            content: card.content.clone(),
            image_url: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LessonDetailResponse {
    pub lesson: LessonSummary,
    /// Ordered by `orderIndex`; empty until the lesson is `ready`.
    pub cards: Vec<CardDto>,
}

/// A plan slot that produced no card.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CardErrorDto {
    pub index: usize,
    #[serde(rename = "type")]
    pub kind: String,
    pub error: String,
}

impl From<CardError> for CardErrorDto {
    fn from(e: CardError) -> Self {
        Self {
            index: e.index,
            kind: e.kind,
            error: e.message,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cards_generated: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_progress: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<CardErrorDto>>,
}

//=========================================================================================
// Completion
//=========================================================================================

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CompleteRequest {
    /// Percentage in `0..=100`.
    pub score: f64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompleteResponse {
    pub success: bool,
    pub passed: bool,
    pub score: f64,
    pub new_best_score: bool,
}

//=========================================================================================
// Storage
//=========================================================================================

/// Query string of a signed storage URL.
#[derive(Debug, Deserialize)]
pub struct SignedQuery {
    pub expires: u64,
    pub signature: String,
}
