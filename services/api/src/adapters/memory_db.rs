//! services/api/src/adapters/memory_db.rs
//!
//! An in-memory `DatabaseService` for local development without Postgres and
//! for tests. A single lock guards every table, which makes each claim an
//! atomic check-and-set exactly like the conditional updates in `db.rs`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use study_deck_core::domain::{
    Card, Chunk, Document, DocumentStatus, Lesson, LessonProgressUpdate, LessonStatus, NewCard,
    NewDocument, NewLesson,
};
use study_deck_core::ports::{DatabaseService, PortError, PortResult};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    documents: HashMap<Uuid, Document>,
    chunks: Vec<Chunk>,
    lessons: HashMap<Uuid, Lesson>,
    cards: Vec<Card>,
}

impl Tables {
    fn document_mut(&mut self, id: Uuid) -> PortResult<&mut Document> {
        self.documents
            .get_mut(&id)
            .ok_or_else(|| PortError::NotFound(format!("Document {} not found", id)))
    }

    fn lesson_mut(&mut self, id: Uuid) -> PortResult<&mut Lesson> {
        self.lessons
            .get_mut(&id)
            .ok_or_else(|| PortError::NotFound(format!("Lesson {} not found", id)))
    }
}

#[derive(Clone, Default)]
pub struct InMemoryDatabase {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored cards across all lessons.
    pub async fn card_count(&self) -> usize {
        self.tables.read().await.cards.len()
    }

    /// Moves a lesson's `updated_at` into the past (used to simulate an abandoned run).
    pub async fn backdate_lesson(&self, lesson_id: Uuid, updated_at: DateTime<Utc>) -> PortResult<()> {
        self.tables.write().await.lesson_mut(lesson_id)?.updated_at = updated_at;
        Ok(())
    }

    /// Moves a document's `updated_at` into the past.
    pub async fn backdate_document(
        &self,
        document_id: Uuid,
        updated_at: DateTime<Utc>,
    ) -> PortResult<()> {
        self.tables.write().await.document_mut(document_id)?.updated_at = updated_at;
        Ok(())
    }
}

#[async_trait]
impl DatabaseService for InMemoryDatabase {
    async fn create_document(&self, document: NewDocument) -> PortResult<Document> {
        let mut tables = self.tables.write().await;
        if tables
            .documents
            .values()
            .any(|d| d.storage_path == document.storage_path)
        {
            return Err(PortError::InvalidInput(format!(
                "A document is already stored at {}",
                document.storage_path
            )));
        }
        let now = Utc::now();
        let document = Document {
            id: Uuid::new_v4(),
            name: document.name,
            storage_path: document.storage_path,
            size_bytes: document.size_bytes,
            mime_type: document.mime_type,
            status: DocumentStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        tables.documents.insert(document.id, document.clone());
        Ok(document)
    }

    async fn get_document(&self, document_id: Uuid) -> PortResult<Document> {
        self.tables
            .read()
            .await
            .documents
            .get(&document_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Document {} not found", document_id)))
    }

    async fn claim_document_for_processing(
        &self,
        document_id: Uuid,
        stale_before: DateTime<Utc>,
    ) -> PortResult<Option<Document>> {
        let mut tables = self.tables.write().await;
        let document = tables.document_mut(document_id)?;
        let claimable = match document.status {
            DocumentStatus::Pending | DocumentStatus::Failed => true,
            DocumentStatus::Processing => document.updated_at < stale_before,
            DocumentStatus::Completed => false,
        };
        if !claimable {
            return Ok(None);
        }
        document.status = DocumentStatus::Processing;
        document.updated_at = Utc::now();
        Ok(Some(document.clone()))
    }

    async fn set_document_status(
        &self,
        document_id: Uuid,
        status: DocumentStatus,
    ) -> PortResult<()> {
        let mut tables = self.tables.write().await;
        let document = tables.document_mut(document_id)?;
        document.status = status;
        document.updated_at = Utc::now();
        Ok(())
    }

    async fn reset_document_content(&self, document_id: Uuid) -> PortResult<()> {
        let mut tables = self.tables.write().await;
        let lesson_ids: Vec<Uuid> = tables
            .lessons
            .values()
            .filter(|l| l.document_id == document_id)
            .map(|l| l.id)
            .collect();
        tables.cards.retain(|c| !lesson_ids.contains(&c.lesson_id));
        tables.lessons.retain(|_, l| l.document_id != document_id);
        tables.chunks.retain(|c| c.document_id != document_id);
        Ok(())
    }

    async fn insert_chunks(&self, document_id: Uuid, pages: &[String]) -> PortResult<Vec<Chunk>> {
        let mut tables = self.tables.write().await;
        if !tables.documents.contains_key(&document_id) {
            return Err(PortError::NotFound(format!("Document {} not found", document_id)));
        }
        let chunks: Vec<Chunk> = pages
            .iter()
            .enumerate()
            .map(|(index, content)| Chunk {
                id: Uuid::new_v4(),
                document_id,
                chunk_index: index as i32,
                content: content.clone(),
            })
            .collect();
        tables.chunks.extend(chunks.iter().cloned());
        Ok(chunks)
    }

    async fn get_chunks_in_range(
        &self,
        document_id: Uuid,
        start: i32,
        end: i32,
    ) -> PortResult<Vec<Chunk>> {
        let tables = self.tables.read().await;
        let mut chunks: Vec<Chunk> = tables
            .chunks
            .iter()
            .filter(|c| c.document_id == document_id && (start..=end).contains(&c.chunk_index))
            .cloned()
            .collect();
        chunks.sort_by_key(|c| c.chunk_index);
        Ok(chunks)
    }

    async fn insert_lesson(&self, lesson: NewLesson) -> PortResult<Lesson> {
        let mut tables = self.tables.write().await;
        if !tables.documents.contains_key(&lesson.document_id) {
            return Err(PortError::NotFound(format!(
                "Document {} not found",
                lesson.document_id
            )));
        }
        let lesson = Lesson {
            id: Uuid::new_v4(),
            document_id: lesson.document_id,
            prev_lesson_id: lesson.prev_lesson_id,
            title: lesson.title,
            description: lesson.description,
            order_index: lesson.order_index,
            start_chunk_index: lesson.start_chunk_index,
            end_chunk_index: lesson.end_chunk_index,
            status: LessonStatus::Pending,
            is_completed: false,
            best_score: None,
            updated_at: Utc::now(),
        };
        tables.lessons.insert(lesson.id, lesson.clone());
        Ok(lesson)
    }

    async fn get_lesson(&self, lesson_id: Uuid) -> PortResult<Lesson> {
        self.tables
            .read()
            .await
            .lessons
            .get(&lesson_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Lesson {} not found", lesson_id)))
    }

    async fn list_lessons(&self, document_id: Uuid) -> PortResult<Vec<Lesson>> {
        let tables = self.tables.read().await;
        let mut lessons: Vec<Lesson> = tables
            .lessons
            .values()
            .filter(|l| l.document_id == document_id)
            .cloned()
            .collect();
        lessons.sort_by_key(|l| l.order_index);
        Ok(lessons)
    }

    async fn claim_lesson_for_generation(
        &self,
        lesson_id: Uuid,
        stale_before: DateTime<Utc>,
    ) -> PortResult<Option<Lesson>> {
        let mut tables = self.tables.write().await;
        let lesson = tables.lesson_mut(lesson_id)?;
        let claimable = match lesson.status {
            LessonStatus::Pending => true,
            LessonStatus::Generating => lesson.updated_at < stale_before,
            LessonStatus::Ready => false,
        };
        if !claimable {
            return Ok(None);
        }
        lesson.status = LessonStatus::Generating;
        lesson.updated_at = Utc::now();
        Ok(Some(lesson.clone()))
    }

    async fn set_lesson_status(&self, lesson_id: Uuid, status: LessonStatus) -> PortResult<()> {
        let mut tables = self.tables.write().await;
        let lesson = tables.lesson_mut(lesson_id)?;
        lesson.status = status;
        lesson.updated_at = Utc::now();
        Ok(())
    }

    async fn update_lesson_progress(
        &self,
        lesson_id: Uuid,
        update: LessonProgressUpdate,
    ) -> PortResult<()> {
        let mut tables = self.tables.write().await;
        let lesson = tables.lesson_mut(lesson_id)?;
        if let Some(is_completed) = update.is_completed {
            lesson.is_completed = is_completed;
        }
        if let Some(best_score) = update.best_score {
            lesson.best_score = Some(best_score);
        }
        Ok(())
    }

    async fn store_generated_cards(
        &self,
        lesson_id: Uuid,
        cards: Vec<NewCard>,
    ) -> PortResult<Vec<Card>> {
        let mut tables = self.tables.write().await;
        let lesson = tables.lesson_mut(lesson_id)?;
        lesson.status = LessonStatus::Ready;
        lesson.updated_at = Utc::now();

        let stored: Vec<Card> = cards
            .into_iter()
            .map(|card| Card {
                id: Uuid::new_v4(),
                lesson_id,
                order_index: card.order_index,
                kind: card.kind,
                content: card.content,
            })
            .collect();
        tables.cards.retain(|c| c.lesson_id != lesson_id);
        tables.cards.extend(stored.iter().cloned());
        Ok(stored)
    }

    async fn list_cards(&self, lesson_id: Uuid) -> PortResult<Vec<Card>> {
        let tables = self.tables.read().await;
        let mut cards: Vec<Card> = tables
            .cards
            .iter()
            .filter(|c| c.lesson_id == lesson_id)
            .cloned()
            .collect();
        cards.sort_by_key(|c| c.order_index);
        Ok(cards)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn seeded() -> (InMemoryDatabase, Document) {
        let db = InMemoryDatabase::new();
        let document = db
            .create_document(NewDocument {
                name: "calculus.pdf".to_string(),
                storage_path: "documents/calculus.pdf".to_string(),
                size_bytes: 42,
                mime_type: "application/pdf".to_string(),
            })
            .await
            .unwrap();
        (db, document)
    }

    #[tokio::test]
    async fn a_fresh_processing_claim_blocks_a_second_one() {
        let (db, document) = seeded().await;
        let stale_before = Utc::now() - Duration::minutes(15);

        assert!(db
            .claim_document_for_processing(document.id, stale_before)
            .await
            .unwrap()
            .is_some());
        assert!(db
            .claim_document_for_processing(document.id, stale_before)
            .await
            .unwrap()
            .is_none());

        db.backdate_document(document.id, Utc::now() - Duration::hours(1))
            .await
            .unwrap();
        assert!(db
            .claim_document_for_processing(document.id, stale_before)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn reset_removes_chunks_lessons_and_cards() {
        let (db, document) = seeded().await;
        db.insert_chunks(document.id, &["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        let lesson = db
            .insert_lesson(NewLesson {
                document_id: document.id,
                prev_lesson_id: None,
                title: "Limits".to_string(),
                description: String::new(),
                order_index: 0,
                start_chunk_index: 0,
                end_chunk_index: 1,
            })
            .await
            .unwrap();
        db.store_generated_cards(
            lesson.id,
            vec![NewCard {
                order_index: 0,
                kind: "text".to_string(),
                content: serde_json::json!({"title": "t", "body": "b"}),
            }],
        )
        .await
        .unwrap();

        db.reset_document_content(document.id).await.unwrap();

        assert!(db.list_lessons(document.id).await.unwrap().is_empty());
        assert!(db.get_chunks_in_range(document.id, 0, 10).await.unwrap().is_empty());
        assert_eq!(db.card_count().await, 0);
    }

    #[tokio::test]
    async fn storing_cards_replaces_earlier_ones_and_marks_ready() {
        let (db, document) = seeded().await;
        let lesson = db
            .insert_lesson(NewLesson {
                document_id: document.id,
                prev_lesson_id: None,
                title: "Limits".to_string(),
                description: String::new(),
                order_index: 0,
                start_chunk_index: 0,
                end_chunk_index: 0,
            })
            .await
            .unwrap();
        let card = |i: i32| NewCard {
            order_index: i,
            kind: "text".to_string(),
            content: serde_json::json!({ "n": i }),
        };

        db.store_generated_cards(lesson.id, vec![card(0), card(1)])
            .await
            .unwrap();
        db.store_generated_cards(lesson.id, vec![card(0)]).await.unwrap();

        assert_eq!(db.list_cards(lesson.id).await.unwrap().len(), 1);
        assert_eq!(
            db.get_lesson(lesson.id).await.unwrap().status,
            LessonStatus::Ready
        );
    }
}
