//! Document processor: turns an uploaded document into chunks and lessons.
//!
//! `pending -> processing -> completed`, and `processing -> failed` when any
//! step errors. A failed or abandoned document can be processed again; the
//! previous run's chunks and lessons are removed first.

use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::extraction::extract_pages;
use super::segmentation::{compute_chunk_ranges, segment_lessons};
use super::stale_cutoff;
use crate::domain::{Document, DocumentStatus, NewLesson};
use crate::ports::{
    DatabaseService, MultimodalGenerationService, ObjectStore, PortResult, TextGenerationService,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    Completed { chunks: usize, lessons: usize },
    /// The document was already `completed`; nothing ran.
    AlreadyCompleted,
    /// Another run holds the document.
    InProgress,
}

pub struct DocumentProcessor {
    db: Arc<dyn DatabaseService>,
    object_store: Arc<dyn ObjectStore>,
    multimodal: Arc<dyn MultimodalGenerationService>,
    text: Arc<dyn TextGenerationService>,
    stale_after: Duration,
}

impl DocumentProcessor {
    pub fn new(
        db: Arc<dyn DatabaseService>,
        object_store: Arc<dyn ObjectStore>,
        multimodal: Arc<dyn MultimodalGenerationService>,
        text: Arc<dyn TextGenerationService>,
        stale_after: Duration,
    ) -> Self {
        Self {
            db,
            object_store,
            multimodal,
            text,
            stale_after,
        }
    }

    /// Processes a document if it is claimable.
    ///
    /// Returns `NotFound` for an unknown id. Any error after the claim leaves
    /// the document `failed`.
    pub async fn process(&self, document_id: Uuid) -> PortResult<ProcessOutcome> {
        info!("[Process] Starting processing for document: {}", document_id);

        let document = self.db.get_document(document_id).await?;
        if document.status == DocumentStatus::Completed {
            info!("[Process] Document already completed, skipping");
            return Ok(ProcessOutcome::AlreadyCompleted);
        }

        let Some(document) = self
            .db
            .claim_document_for_processing(document_id, stale_cutoff(self.stale_after))
            .await?
        else {
            info!("[Process] Document {} is being processed by another run", document_id);
            return Ok(ProcessOutcome::InProgress);
        };
        info!("[Process] Claimed document: {}", document.name);

        match self.run(&document).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                error!("[Process] Processing error: {}", e);
                if let Err(status_err) = self
                    .db
                    .set_document_status(document_id, DocumentStatus::Failed)
                    .await
                {
                    error!("[Process] Failed to mark document as failed: {}", status_err);
                }
                Err(e)
            }
        }
    }

    async fn run(&self, document: &Document) -> PortResult<ProcessOutcome> {
        self.db.reset_document_content(document.id).await?;

        let bytes = self.object_store.download(&document.storage_path).await?;
        info!("[Process] Downloaded document, size: {} bytes", bytes.len());

        let pages = extract_pages(self.multimodal.as_ref(), &bytes, &document.mime_type).await?;

        let chunks = self.db.insert_chunks(document.id, &pages).await?;
        info!("[Process] Inserted {} chunks", chunks.len());

        let outlines = segment_lessons(self.text.as_ref(), &pages).await?;
        let ranges = compute_chunk_ranges(chunks.len(), outlines.len());
        if ranges.len() < outlines.len() {
            warn!(
                "[Process] {} lessons for {} chunks, keeping the first {}",
                outlines.len(),
                chunks.len(),
                ranges.len()
            );
        }

        let mut prev_lesson_id = None;
        for (order_index, (outline, range)) in outlines.into_iter().zip(&ranges).enumerate() {
            let lesson = self
                .db
                .insert_lesson(NewLesson {
                    document_id: document.id,
                    prev_lesson_id,
                    title: outline.title,
                    description: outline.description,
                    order_index: order_index as i32,
                    start_chunk_index: range.start,
                    end_chunk_index: range.end,
                })
                .await?;
            info!(
                "[Process] Inserted lesson {}: {} (chunks {}-{})",
                order_index + 1,
                lesson.title,
                range.start,
                range.end
            );
            prev_lesson_id = Some(lesson.id);
        }

        self.db
            .set_document_status(document.id, DocumentStatus::Completed)
            .await?;
        info!("[Process] Processing complete for document: {}", document.id);
        Ok(ProcessOutcome::Completed {
            chunks: chunks.len(),
            lessons: ranges.len(),
        })
    }
}
