//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.
//!
//! Status transitions are single conditional `UPDATE ... RETURNING` statements,
//! so two concurrent triggers can never both claim the same row.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use study_deck_core::domain::{
    Card, Chunk, Document, DocumentStatus, Lesson, LessonProgressUpdate, LessonStatus, NewCard,
    NewDocument, NewLesson,
};
use study_deck_core::ports::{DatabaseService, PortError, PortResult};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn begin(&self) -> PortResult<Transaction<'_, Postgres>> {
        self.pool.begin().await.map_err(unexpected)
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

fn not_found_or_unexpected(what: String) -> impl FnOnce(sqlx::Error) -> PortError {
    move |e| match e {
        sqlx::Error::RowNotFound => PortError::NotFound(what),
        _ => PortError::Unexpected(e.to_string()),
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

const DOCUMENT_COLUMNS: &str =
    "id, name, storage_path, size_bytes, mime_type, status, created_at, updated_at";
const LESSON_COLUMNS: &str = "id, document_id, prev_lesson_id, title, description, order_index, \
     start_chunk_index, end_chunk_index, status, is_completed, best_score, updated_at";

#[derive(FromRow)]
struct DocumentRecord {
    id: Uuid,
    name: String,
    storage_path: String,
    size_bytes: i64,
    mime_type: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl DocumentRecord {
    fn to_domain(self) -> PortResult<Document> {
        Ok(Document {
            id: self.id,
            name: self.name,
            storage_path: self.storage_path,
            size_bytes: self.size_bytes,
            mime_type: self.mime_type,
            status: self.status.parse().map_err(PortError::Unexpected)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(FromRow)]
struct ChunkRecord {
    id: Uuid,
    document_id: Uuid,
    chunk_index: i32,
    content: String,
}
impl ChunkRecord {
    fn to_domain(self) -> Chunk {
        Chunk {
            id: self.id,
            document_id: self.document_id,
            chunk_index: self.chunk_index,
            content: self.content,
        }
    }
}

#[derive(FromRow)]
struct LessonRecord {
    id: Uuid,
    document_id: Uuid,
    prev_lesson_id: Option<Uuid>,
    title: String,
    description: String,
    order_index: i32,
    start_chunk_index: i32,
    end_chunk_index: i32,
    status: String,
    is_completed: bool,
    best_score: Option<i32>,
    updated_at: DateTime<Utc>,
}
impl LessonRecord {
    fn to_domain(self) -> PortResult<Lesson> {
        Ok(Lesson {
            id: self.id,
            document_id: self.document_id,
            prev_lesson_id: self.prev_lesson_id,
            title: self.title,
            description: self.description,
            order_index: self.order_index,
            start_chunk_index: self.start_chunk_index,
            end_chunk_index: self.end_chunk_index,
            status: self.status.parse().map_err(PortError::Unexpected)?,
            is_completed: self.is_completed,
            best_score: self.best_score,
            updated_at: self.updated_at,
        })
    }
}

#[derive(FromRow)]
struct CardRecord {
    id: Uuid,
    lesson_id: Uuid,
    order_index: i32,
    #[sqlx(rename = "type")]
    kind: String,
    content: serde_json::Value,
}
impl CardRecord {
    fn to_domain(self) -> Card {
        Card {
            id: self.id,
            lesson_id: self.lesson_id,
            order_index: self.order_index,
            kind: self.kind,
            content: self.content,
        }
    }
}

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    async fn create_document(&self, document: NewDocument) -> PortResult<Document> {
        let sql = format!(
            "INSERT INTO documents (id, name, storage_path, size_bytes, mime_type) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            DOCUMENT_COLUMNS
        );
        sqlx::query_as::<_, DocumentRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(&document.name)
            .bind(&document.storage_path)
            .bind(document.size_bytes)
            .bind(&document.mime_type)
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)?
            .to_domain()
    }

    async fn get_document(&self, document_id: Uuid) -> PortResult<Document> {
        let sql = format!("SELECT {} FROM documents WHERE id = $1", DOCUMENT_COLUMNS);
        sqlx::query_as::<_, DocumentRecord>(&sql)
            .bind(document_id)
            .fetch_one(&self.pool)
            .await
            .map_err(not_found_or_unexpected(format!(
                "Document {} not found",
                document_id
            )))?
            .to_domain()
    }

    async fn claim_document_for_processing(
        &self,
        document_id: Uuid,
        stale_before: DateTime<Utc>,
    ) -> PortResult<Option<Document>> {
        let sql = format!(
            "UPDATE documents SET status = 'processing', updated_at = now() \
             WHERE id = $1 AND (status IN ('pending', 'failed') \
                 OR (status = 'processing' AND updated_at < $2)) \
             RETURNING {}",
            DOCUMENT_COLUMNS
        );
        sqlx::query_as::<_, DocumentRecord>(&sql)
            .bind(document_id)
            .bind(stale_before)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?
            .map(DocumentRecord::to_domain)
            .transpose()
    }

    async fn set_document_status(
        &self,
        document_id: Uuid,
        status: DocumentStatus,
    ) -> PortResult<()> {
        let result =
            sqlx::query("UPDATE documents SET status = $1, updated_at = now() WHERE id = $2")
                .bind(status.as_str())
                .bind(document_id)
                .execute(&self.pool)
                .await
                .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Document {} not found", document_id)));
        }
        Ok(())
    }

    async fn reset_document_content(&self, document_id: Uuid) -> PortResult<()> {
        let mut tx = self.begin().await?;
        // Cards go with their lessons through ON DELETE CASCADE.
        sqlx::query("DELETE FROM lessons WHERE document_id = $1")
            .bind(document_id)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;
        sqlx::query("DELETE FROM chunks WHERE document_id = $1")
            .bind(document_id)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;
        tx.commit().await.map_err(unexpected)
    }

    async fn insert_chunks(&self, document_id: Uuid, pages: &[String]) -> PortResult<Vec<Chunk>> {
        let mut tx = self.begin().await?;
        let mut chunks = Vec::with_capacity(pages.len());
        for (index, content) in pages.iter().enumerate() {
            let record = sqlx::query_as::<_, ChunkRecord>(
                "INSERT INTO chunks (id, document_id, chunk_index, content) VALUES ($1, $2, $3, $4) \
                 RETURNING id, document_id, chunk_index, content",
            )
            .bind(Uuid::new_v4())
            .bind(document_id)
            .bind(index as i32)
            .bind(content)
            .fetch_one(&mut *tx)
            .await
            .map_err(unexpected)?;
            chunks.push(record.to_domain());
        }
        tx.commit().await.map_err(unexpected)?;
        Ok(chunks)
    }

    async fn get_chunks_in_range(
        &self,
        document_id: Uuid,
        start: i32,
        end: i32,
    ) -> PortResult<Vec<Chunk>> {
        let records = sqlx::query_as::<_, ChunkRecord>(
            "SELECT id, document_id, chunk_index, content FROM chunks \
             WHERE document_id = $1 AND chunk_index >= $2 AND chunk_index <= $3 \
             ORDER BY chunk_index ASC",
        )
        .bind(document_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(ChunkRecord::to_domain).collect())
    }

    async fn insert_lesson(&self, lesson: NewLesson) -> PortResult<Lesson> {
        let sql = format!(
            "INSERT INTO lessons (id, document_id, prev_lesson_id, title, description, order_index, \
                 start_chunk_index, end_chunk_index) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {}",
            LESSON_COLUMNS
        );
        sqlx::query_as::<_, LessonRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(lesson.document_id)
            .bind(lesson.prev_lesson_id)
            .bind(&lesson.title)
            .bind(&lesson.description)
            .bind(lesson.order_index)
            .bind(lesson.start_chunk_index)
            .bind(lesson.end_chunk_index)
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)?
            .to_domain()
    }

    async fn get_lesson(&self, lesson_id: Uuid) -> PortResult<Lesson> {
        let sql = format!("SELECT {} FROM lessons WHERE id = $1", LESSON_COLUMNS);
        sqlx::query_as::<_, LessonRecord>(&sql)
            .bind(lesson_id)
            .fetch_one(&self.pool)
            .await
            .map_err(not_found_or_unexpected(format!("Lesson {} not found", lesson_id)))?
            .to_domain()
    }

    async fn list_lessons(&self, document_id: Uuid) -> PortResult<Vec<Lesson>> {
        let sql = format!(
            "SELECT {} FROM lessons WHERE document_id = $1 ORDER BY order_index ASC",
            LESSON_COLUMNS
        );
        sqlx::query_as::<_, LessonRecord>(&sql)
            .bind(document_id)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?
            .into_iter()
            .map(LessonRecord::to_domain)
            .collect()
    }

    async fn claim_lesson_for_generation(
        &self,
        lesson_id: Uuid,
        stale_before: DateTime<Utc>,
    ) -> PortResult<Option<Lesson>> {
        let sql = format!(
            "UPDATE lessons SET status = 'generating', updated_at = now() \
             WHERE id = $1 AND (status = 'pending' \
                 OR (status = 'generating' AND updated_at < $2)) \
             RETURNING {}",
            LESSON_COLUMNS
        );
        sqlx::query_as::<_, LessonRecord>(&sql)
            .bind(lesson_id)
            .bind(stale_before)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?
            .map(LessonRecord::to_domain)
            .transpose()
    }

    async fn set_lesson_status(&self, lesson_id: Uuid, status: LessonStatus) -> PortResult<()> {
        let result = sqlx::query("UPDATE lessons SET status = $1, updated_at = now() WHERE id = $2")
            .bind(status.as_str())
            .bind(lesson_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Lesson {} not found", lesson_id)));
        }
        Ok(())
    }

    async fn update_lesson_progress(
        &self,
        lesson_id: Uuid,
        update: LessonProgressUpdate,
    ) -> PortResult<()> {
        let result = sqlx::query(
            "UPDATE lessons SET is_completed = COALESCE($2, is_completed), \
                 best_score = COALESCE($3, best_score) \
             WHERE id = $1",
        )
        .bind(lesson_id)
        .bind(update.is_completed)
        .bind(update.best_score)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Lesson {} not found", lesson_id)));
        }
        Ok(())
    }

    async fn store_generated_cards(
        &self,
        lesson_id: Uuid,
        cards: Vec<NewCard>,
    ) -> PortResult<Vec<Card>> {
        let mut tx = self.begin().await?;

        sqlx::query("DELETE FROM cards WHERE lesson_id = $1")
            .bind(lesson_id)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;

        let mut stored = Vec::with_capacity(cards.len());
        for card in cards {
            let record = sqlx::query_as::<_, CardRecord>(
                "INSERT INTO cards (id, lesson_id, order_index, type, content) \
                 VALUES ($1, $2, $3, $4, $5) \
                 RETURNING id, lesson_id, order_index, type, content",
            )
            .bind(Uuid::new_v4())
            .bind(lesson_id)
            .bind(card.order_index)
            .bind(&card.kind)
            .bind(&card.content)
            .fetch_one(&mut *tx)
            .await
            .map_err(unexpected)?;
            stored.push(record.to_domain());
        }

        let result =
            sqlx::query("UPDATE lessons SET status = 'ready', updated_at = now() WHERE id = $1")
                .bind(lesson_id)
                .execute(&mut *tx)
                .await
                .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Lesson {} not found", lesson_id)));
        }

        tx.commit().await.map_err(unexpected)?;
        Ok(stored)
    }

    async fn list_cards(&self, lesson_id: Uuid) -> PortResult<Vec<Card>> {
        let records = sqlx::query_as::<_, CardRecord>(
            "SELECT id, lesson_id, order_index, type, content FROM cards \
             WHERE lesson_id = $1 ORDER BY order_index ASC",
        )
        .bind(lesson_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(CardRecord::to_domain).collect())
    }
}
