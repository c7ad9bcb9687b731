//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::error::ApiError;
use crate::web::protocol::{
    CardDto, CardErrorDto, CompleteRequest, CompleteResponse, DocumentResponse, DocumentSummary,
    ErrorResponse, GenerateResponse, HealthResponse, LessonDetailResponse, LessonSummary,
    ProcessResponse, SignedQuery, UploadResponse,
};
use crate::web::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json},
};
use std::sync::Arc;
use study_deck_core::cards::kinds::infographic;
use study_deck_core::domain::{Card, LessonStatus, NewDocument};
use study_deck_core::pipeline::{complete_lesson, ProcessOutcome, TriggerOutcome};
use tracing::{info, warn};
use utoipa::OpenApi;
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        upload_document_handler,
        get_document_handler,
        process_document_handler,
        generate_lesson_handler,
        get_lesson_handler,
        complete_lesson_handler,
        storage_handler,
        health_handler,
    ),
    components(schemas(
        ErrorResponse,
        HealthResponse,
        DocumentSummary,
        UploadResponse,
        DocumentResponse,
        ProcessResponse,
        LessonSummary,
        CardDto,
        CardErrorDto,
        LessonDetailResponse,
        GenerateResponse,
        CompleteRequest,
        CompleteResponse,
    )),
    tags(
        (name = "Study Deck API", description = "Turns uploaded documents into lessons made of study cards.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Documents
//=========================================================================================

/// Upload a document.
///
/// Accepts a multipart/form-data request with a single file part. The file is
/// stored and a `pending` document is created; processing is a separate call.
#[utoipa::path(
    post,
    path = "/documents",
    request_body(content_type = "multipart/form-data", description = "The document to upload."),
    responses(
        (status = 201, description = "Document stored", body = UploadResponse),
        (status = 400, description = "Missing or empty file", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn upload_document_handler(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let field = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Failed to read multipart data: {}", e)))?
        .ok_or_else(|| ApiError::BadRequest("Multipart form must include a file".to_string()))?;

    let name = field.file_name().unwrap_or("document").to_string();
    let mime_type = field
        .content_type()
        .map(str::to_string)
        .unwrap_or_else(|| content_type_for(&name).to_string());
    let data = field
        .bytes()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Failed to read file bytes: {}", e)))?;
    if data.is_empty() {
        return Err(ApiError::BadRequest("Uploaded file is empty".to_string()));
    }

    let storage_path = format!("documents/{}-{}", Uuid::new_v4(), safe_file_name(&name));
    state
        .object_store
        .upload(&storage_path, &data, &mime_type)
        .await?;
    let document = state
        .db
        .create_document(NewDocument {
            name,
            storage_path,
            size_bytes: data.len() as i64,
            mime_type,
        })
        .await?;
    info!("[Upload] Created document {} ({})", document.id, document.name);

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            success: true,
            document: DocumentSummary::from(&document),
        }),
    ))
}

/// Get a document and its lessons.
#[utoipa::path(
    get,
    path = "/documents/{document_id}",
    params(("document_id" = Uuid, Path, description = "Document id")),
    responses(
        (status = 200, description = "The document", body = DocumentResponse),
        (status = 404, description = "No such document", body = ErrorResponse)
    )
)]
pub async fn get_document_handler(
    State(state): State<Arc<AppState>>,
    Path(document_id): Path<Uuid>,
) -> Result<Json<DocumentResponse>, ApiError> {
    let document = state.db.get_document(document_id).await?;
    let lessons = state.db.list_lessons(document_id).await?;
    Ok(Json(DocumentResponse {
        document: DocumentSummary::from(&document),
        lessons: lessons.iter().map(LessonSummary::from).collect(),
    }))
}

/// Split a document into chunks and lessons.
///
/// Idempotent by status: a completed document answers `cached`, a document
/// being processed by another request answers 202 `inProgress`.
#[utoipa::path(
    post,
    path = "/process/{document_id}",
    params(("document_id" = Uuid, Path, description = "Document id")),
    responses(
        (status = 200, description = "Processed, or already completed", body = ProcessResponse),
        (status = 202, description = "Another run is in progress", body = ProcessResponse),
        (status = 404, description = "No such document", body = ErrorResponse),
        (status = 500, description = "Processing failed; the document is left failed", body = ErrorResponse)
    )
)]
pub async fn process_document_handler(
    State(state): State<Arc<AppState>>,
    Path(document_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    // The run is detached from the request so a dropped client cannot cancel it.
    let processor = state.processor.clone();
    let outcome = tokio::spawn(async move { processor.process(document_id).await })
        .await
        .map_err(|e| ApiError::Internal(format!("Processing task failed: {}", e)))??;

    let (status, body) = match outcome {
        ProcessOutcome::Completed { chunks, lessons } => (
            StatusCode::OK,
            ProcessResponse {
                success: true,
                chunks: Some(chunks),
                lessons: Some(lessons),
                ..Default::default()
            },
        ),
        ProcessOutcome::AlreadyCompleted => (
            StatusCode::OK,
            ProcessResponse {
                success: true,
                cached: Some(true),
                ..Default::default()
            },
        ),
        ProcessOutcome::InProgress => (
            StatusCode::ACCEPTED,
            ProcessResponse {
                success: true,
                in_progress: Some(true),
                ..Default::default()
            },
        ),
    };
    Ok((status, Json(body)))
}

//=========================================================================================
// Lessons
//=========================================================================================

/// Generate the cards of a lesson.
///
/// Idempotent by status: a ready lesson answers `cached`, a lesson being
/// generated by another request answers 202 `inProgress`.
#[utoipa::path(
    post,
    path = "/lessons/{lesson_id}/generate",
    params(("lesson_id" = Uuid, Path, description = "Lesson id")),
    responses(
        (status = 200, description = "Cards generated, or already ready", body = GenerateResponse),
        (status = 202, description = "Another run is in progress", body = GenerateResponse),
        (status = 404, description = "No such lesson", body = ErrorResponse),
        (status = 500, description = "Generation failed; the lesson is back to pending", body = ErrorResponse)
    )
)]
pub async fn generate_lesson_handler(
    State(state): State<Arc<AppState>>,
    Path(lesson_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let trigger = state.trigger.clone();
    let outcome = tokio::spawn(async move { trigger.trigger(lesson_id).await })
        .await
        .map_err(|e| ApiError::Internal(format!("Generation task failed: {}", e)))??;

    let (status, body) = match outcome {
        TriggerOutcome::Generated { cards, errors } => (
            StatusCode::OK,
            GenerateResponse {
                success: true,
                cards_generated: Some(cards.len()),
                errors: (!errors.is_empty())
                    .then(|| errors.into_iter().map(CardErrorDto::from).collect()),
                ..Default::default()
            },
        ),
        TriggerOutcome::Cached => (
            StatusCode::OK,
            GenerateResponse {
                success: true,
                cached: Some(true),
                ..Default::default()
            },
        ),
        TriggerOutcome::InProgress => (
            StatusCode::ACCEPTED,
            GenerateResponse {
                success: true,
                in_progress: Some(true),
                ..Default::default()
            },
        ),
    };
    Ok((status, Json(body)))
}

/// Get a lesson and, once it is ready, its cards.
#[utoipa::path(
    get,
    path = "/lessons/{lesson_id}",
    params(("lesson_id" = Uuid, Path, description = "Lesson id")),
    responses(
        (status = 200, description = "The lesson", body = LessonDetailResponse),
        (status = 404, description = "No such lesson", body = ErrorResponse)
    )
)]
pub async fn get_lesson_handler(
    State(state): State<Arc<AppState>>,
    Path(lesson_id): Path<Uuid>,
) -> Result<Json<LessonDetailResponse>, ApiError> {
    let lesson = state.db.get_lesson(lesson_id).await?;
    let cards = if lesson.status == LessonStatus::Ready {
        state.db.list_cards(lesson_id).await?
    } else {
        Vec::new()
    };

    let mut dtos = Vec::with_capacity(cards.len());
    for card in &cards {
        dtos.push(card_dto(&state, card).await);
    }
    Ok(Json(LessonDetailResponse {
        lesson: LessonSummary::from(&lesson),
        cards: dtos,
    }))
}

async fn card_dto(state: &AppState, card: &Card) -> CardDto {
    let mut dto = CardDto::from(card);
    if card.kind != infographic::KIND {
        return dto;
    }
    let Some(path) = card.content.get("imagePath").and_then(|v| v.as_str()) else {
        return dto;
    };
    match state
        .object_store
        .create_signed_url(path, state.config.signed_url_ttl)
        .await
    {
        Ok(url) => dto.image_url = Some(url),
        Err(e) => warn!("Could not sign image URL for card {}: {}", card.id, e),
    }
    dto
}

/// Record a finished attempt at a lesson.
///
/// A score of 70 or more passes and marks the lesson completed; the best
/// score is kept.
#[utoipa::path(
    post,
    path = "/lessons/{lesson_id}/complete",
    params(("lesson_id" = Uuid, Path, description = "Lesson id")),
    request_body = CompleteRequest,
    responses(
        (status = 200, description = "Attempt recorded", body = CompleteResponse),
        (status = 400, description = "Invalid score, or the lesson is not ready", body = ErrorResponse),
        (status = 404, description = "No such lesson", body = ErrorResponse)
    )
)]
pub async fn complete_lesson_handler(
    State(state): State<Arc<AppState>>,
    Path(lesson_id): Path<Uuid>,
    payload: Result<Json<CompleteRequest>, JsonRejection>,
) -> Result<Json<CompleteResponse>, ApiError> {
    let Json(request) = payload.map_err(|_| {
        ApiError::BadRequest("Invalid score. Must be a number between 0 and 100.".to_string())
    })?;

    let attempt = complete_lesson(state.db.as_ref(), lesson_id, request.score).await?;
    Ok(Json(CompleteResponse {
        success: true,
        passed: attempt.passed,
        score: attempt.score,
        new_best_score: attempt.new_best_score,
    }))
}

//=========================================================================================
// Storage and Health
//=========================================================================================

/// Serve a stored object through a signed URL.
#[utoipa::path(
    get,
    path = "/storage/{path}",
    params(
        ("path" = String, Path, description = "Object path"),
        ("expires" = u64, Query, description = "Unix time the URL expires at"),
        ("signature" = String, Query, description = "Hex HMAC-SHA256 signature")
    ),
    responses(
        (status = 200, description = "The object bytes"),
        (status = 403, description = "Invalid or expired signature", body = ErrorResponse),
        (status = 404, description = "No such object", body = ErrorResponse)
    )
)]
pub async fn storage_handler(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    Query(query): Query<SignedQuery>,
) -> Result<impl IntoResponse, ApiError> {
    if !state
        .url_signer
        .verify(&path, query.expires, &query.signature)
    {
        return Err(ApiError::Forbidden(
            "Invalid or expired signature".to_string(),
        ));
    }
    let bytes = state.object_store.download(&path).await?;
    Ok(([(header::CONTENT_TYPE, content_type_for(&path))], bytes))
}

#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = HealthResponse))
)]
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

//=========================================================================================
// Helpers
//=========================================================================================

/// Keeps a file name usable as the last segment of an object path.
fn safe_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "document".to_string()
    } else {
        cleaned.to_string()
    }
}

fn content_type_for(path: &str) -> &'static str {
    let extension = path
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "md" => "text/markdown",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}
