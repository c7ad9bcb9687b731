//! crates/study_deck_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or transport format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

//=========================================================================================
// Statuses
//=========================================================================================

/// Lifecycle of an uploaded document.
///
/// `pending -> processing -> completed`, or `processing -> failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Completed => "completed",
            DocumentStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DocumentStatus::Completed | DocumentStatus::Failed)
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DocumentStatus::Pending),
            "processing" => Ok(DocumentStatus::Processing),
            "completed" => Ok(DocumentStatus::Completed),
            "failed" => Ok(DocumentStatus::Failed),
            other => Err(format!("unknown document status '{}'", other)),
        }
    }
}

/// Lifecycle of a lesson's card deck.
///
/// `pending -> generating -> ready`; a failed run goes back to `pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LessonStatus {
    Pending,
    Generating,
    Ready,
}

impl LessonStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LessonStatus::Pending => "pending",
            LessonStatus::Generating => "generating",
            LessonStatus::Ready => "ready",
        }
    }
}

impl fmt::Display for LessonStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LessonStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(LessonStatus::Pending),
            "generating" => Ok(LessonStatus::Generating),
            "ready" => Ok(LessonStatus::Ready),
            other => Err(format!("unknown lesson status '{}'", other)),
        }
    }
}

//=========================================================================================
// Entities
//=========================================================================================

/// An uploaded source document.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: Uuid,
    pub name: String,
    pub storage_path: String,
    pub size_bytes: i64,
    pub mime_type: String,
    pub status: DocumentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Data needed to register a freshly uploaded document.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub name: String,
    pub storage_path: String,
    pub size_bytes: i64,
    pub mime_type: String,
}

/// One extracted unit (nominally a page) of document text.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: Uuid,
    pub document_id: Uuid,
    pub chunk_index: i32,
    pub content: String,
}

/// A contiguous range of chunks presented as one learning unit.
#[derive(Debug, Clone)]
pub struct Lesson {
    pub id: Uuid,
    pub document_id: Uuid,
    pub prev_lesson_id: Option<Uuid>,
    pub title: String,
    pub description: String,
    pub order_index: i32,
    /// Inclusive.
    pub start_chunk_index: i32,
    /// Inclusive.
    pub end_chunk_index: i32,
    pub status: LessonStatus,
    pub is_completed: bool,
    pub best_score: Option<i32>,
    pub updated_at: DateTime<Utc>,
}

/// Insert payload for a lesson produced by the document processor.
#[derive(Debug, Clone)]
pub struct NewLesson {
    pub document_id: Uuid,
    pub prev_lesson_id: Option<Uuid>,
    pub title: String,
    pub description: String,
    pub order_index: i32,
    pub start_chunk_index: i32,
    pub end_chunk_index: i32,
}

/// A persisted lesson card. Identity is assigned at the batch insert.
#[derive(Debug, Clone)]
pub struct Card {
    pub id: Uuid,
    pub lesson_id: Uuid,
    pub order_index: i32,
    pub kind: String,
    pub content: serde_json::Value,
}

/// Insert payload for one card; `order_index` is its position in the batch.
#[derive(Debug, Clone)]
pub struct NewCard {
    pub order_index: i32,
    pub kind: String,
    pub content: serde_json::Value,
}

/// Changes to a lesson's learner progress after a completed attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LessonProgressUpdate {
    pub is_completed: Option<bool>,
    pub best_score: Option<i32>,
}

impl LessonProgressUpdate {
    pub fn is_empty(&self) -> bool {
        self.is_completed.is_none() && self.best_score.is_none()
    }
}
