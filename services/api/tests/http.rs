//! Drives the axum router in-process with `tower::ServiceExt::oneshot`.

use api_lib::adapters::{InMemoryDatabase, LocalObjectStore, ScriptedGenerator, UrlSigner};
use api_lib::config::Config;
use api_lib::web::{router, state::AppState};
use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use study_deck_core::cards::GenerationServices;
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "study-deck-boundary";

struct TestApp {
    router: Router,
    _dir: TempDir,
}

fn app() -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let vars: HashMap<&str, String> = HashMap::from([
        ("GENERATIVE_PROVIDER", "scripted".to_string()),
        ("STORAGE_SIGNING_SECRET", "test-secret".to_string()),
        ("STORAGE_ROOT", dir.path().display().to_string()),
    ]);
    let config = Arc::new(Config::from_lookup(|key| vars.get(key).cloned()).unwrap());

    let url_signer = UrlSigner::new(&config.storage_signing_secret);
    let scripted = Arc::new(ScriptedGenerator::offline());
    let store = Arc::new(LocalObjectStore::new(
        config.storage_root.clone(),
        &config.public_base_url,
        url_signer.clone(),
    ));
    let state = AppState::new(
        config,
        Arc::new(InMemoryDatabase::new()),
        GenerationServices {
            text: scripted.clone(),
            multimodal: scripted,
            object_store: store,
        },
        url_signer,
    );

    TestApp {
        router: router(Arc::new(state)),
        _dir: dir,
    }
}

impl TestApp {
    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    async fn post(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::post(uri).body(Body::empty()).unwrap())
            .await
    }

    async fn post_json(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(
            Request::post(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    async fn upload(&self, file_name: &str, content: &str) -> (StatusCode, Value) {
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{f}\"\r\n\
             Content-Type: text/plain\r\n\r\n{c}\r\n--{b}--\r\n",
            b = BOUNDARY,
            f = file_name,
            c = content
        );
        self.send(
            Request::post("/documents")
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={}", BOUNDARY),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
    }

    /// Uploads and processes a four-page document; returns its lessons.
    async fn processed_lessons(&self) -> Vec<Value> {
        let pages = "Limits\u{c}Derivatives\u{c}Integrals\u{c}Series";
        let (_, uploaded) = self.upload("calculus notes.txt", pages).await;
        let document_id = uploaded["document"]["id"].as_str().unwrap().to_string();
        self.post(&format!("/process/{}", document_id)).await;
        let (_, document) = self.get(&format!("/documents/{}", document_id)).await;
        document["lessons"].as_array().unwrap().clone()
    }
}

#[tokio::test]
async fn health_reports_ok() {
    let (status, body) = app().get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok" }));
}

#[tokio::test]
async fn uploading_creates_a_pending_document() {
    let app = app();
    let (status, body) = app.upload("calculus notes.txt", "Limits\u{c}Derivatives").await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["document"]["name"], "calculus notes.txt");
    assert_eq!(body["document"]["status"], "pending");
    assert_eq!(body["document"]["mimeType"], "text/plain");
    let path = body["document"]["storagePath"].as_str().unwrap();
    assert!(path.starts_with("documents/"));
    assert!(path.ends_with("-calculus_notes.txt"));
}

#[tokio::test]
async fn uploading_without_a_file_is_rejected() {
    let app = app();
    let request = Request::post("/documents")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(format!("--{}--\r\n", BOUNDARY)))
        .unwrap();
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn processing_is_idempotent_by_status() {
    let app = app();
    let (_, uploaded) = app
        .upload("notes.txt", "Limits\u{c}Derivatives\u{c}Integrals\u{c}Series")
        .await;
    let document_id = uploaded["document"]["id"].as_str().unwrap();

    let (status, body) = app.post(&format!("/process/{}", document_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true, "chunks": 4, "lessons": 2 }));

    let (status, body) = app.post(&format!("/process/{}", document_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true, "cached": true }));

    let (status, document) = app.get(&format!("/documents/{}", document_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(document["document"]["status"], "completed");
    let lessons = document["lessons"].as_array().unwrap();
    assert_eq!(lessons.len(), 2);
    assert_eq!(lessons[0]["title"], "Overview");
    assert_eq!(lessons[1]["prevLessonId"], lessons[0]["id"]);
    assert_eq!(lessons[1]["startChunkIndex"], 2);
    assert_eq!(lessons[1]["endChunkIndex"], 3);
}

#[tokio::test]
async fn unknown_ids_are_not_found() {
    let app = app();
    let id = uuid::Uuid::new_v4();

    for (status, body) in [
        app.get(&format!("/documents/{}", id)).await,
        app.post(&format!("/process/{}", id)).await,
        app.get(&format!("/lessons/{}", id)).await,
        app.post(&format!("/lessons/{}/generate", id)).await,
        app.post_json(&format!("/lessons/{}/complete", id), json!({ "score": 80 }))
            .await,
    ] {
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains(&id.to_string()));
    }
}

#[tokio::test]
async fn generating_a_lesson_stores_its_cards_once() {
    let app = app();
    let lessons = app.processed_lessons().await;
    let lesson_id = lessons[0]["id"].as_str().unwrap();

    let (status, lesson) = app.get(&format!("/lessons/{}", lesson_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(lesson["lesson"]["status"], "pending");
    assert_eq!(lesson["cards"], json!([]));

    let (status, body) = app.post(&format!("/lessons/{}/generate", lesson_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true, "cardsGenerated": 6 }));

    let (status, body) = app.post(&format!("/lessons/{}/generate", lesson_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true, "cached": true }));

    let (_, lesson) = app.get(&format!("/lessons/{}", lesson_id)).await;
    assert_eq!(lesson["lesson"]["status"], "ready");
    let cards = lesson["cards"].as_array().unwrap();
    let kinds: Vec<&str> = cards.iter().map(|c| c["type"].as_str().unwrap()).collect();
    assert_eq!(
        kinds,
        vec![
            "text",
            "mc_question",
            "fill_in_blank",
            "infographic",
            "interactive_visual",
            "oral_exam"
        ]
    );
    assert!(cards[0].get("imageUrl").is_none());
    assert!(cards[3]["imageUrl"]
        .as_str()
        .unwrap()
        .starts_with("http://localhost:3000/storage/cards/"));
}

#[tokio::test]
async fn signed_image_urls_serve_the_stored_image() {
    let app = app();
    let lessons = app.processed_lessons().await;
    let lesson_id = lessons[0]["id"].as_str().unwrap();
    app.post(&format!("/lessons/{}/generate", lesson_id)).await;
    let (_, lesson) = app.get(&format!("/lessons/{}", lesson_id)).await;

    let url = lesson["cards"][3]["imageUrl"].as_str().unwrap();
    let local = url.trim_start_matches("http://localhost:3000");
    let response = app
        .router
        .clone()
        .oneshot(Request::get(local).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(bytes.starts_with(b"\x89PNG"));

    let tampered = local.replace("signature=", "signature=00");
    let (status, _) = app.get(&tampered).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn completing_a_lesson_tracks_pass_and_best_score() {
    let app = app();
    let lessons = app.processed_lessons().await;
    let lesson_id = lessons[0]["id"].as_str().unwrap();
    let complete = format!("/lessons/{}/complete", lesson_id);

    // Cards must exist before an attempt can be recorded.
    let (status, _) = app.post_json(&complete, json!({ "score": 90 })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    app.post(&format!("/lessons/{}/generate", lesson_id)).await;

    let (status, body) = app.post_json(&complete, json!({ "score": 60 })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({ "success": true, "passed": false, "score": 60.0, "newBestScore": true })
    );

    let (_, body) = app.post_json(&complete, json!({ "score": 85.4 })).await;
    assert_eq!(body["passed"], true);
    assert_eq!(body["newBestScore"], true);

    let (_, body) = app.post_json(&complete, json!({ "score": 70 })).await;
    assert_eq!(body["passed"], true);
    assert_eq!(body["newBestScore"], false);

    let (_, lesson) = app.get(&format!("/lessons/{}", lesson_id)).await;
    assert_eq!(lesson["lesson"]["isCompleted"], true);
    assert_eq!(lesson["lesson"]["bestScore"], 85);
}

#[tokio::test]
async fn invalid_scores_are_rejected() {
    let app = app();
    let lessons = app.processed_lessons().await;
    let lesson_id = lessons[0]["id"].as_str().unwrap();
    app.post(&format!("/lessons/{}/generate", lesson_id)).await;
    let complete = format!("/lessons/{}/complete", lesson_id);

    for body in [
        json!({ "score": 101 }),
        json!({ "score": -1 }),
        json!({ "score": "ninety" }),
        json!({}),
    ] {
        let (status, response) = app.post_json(&complete, body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            response["error"],
            "Invalid score. Must be a number between 0 and 100."
        );
    }
}
