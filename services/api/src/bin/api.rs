//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{
        DbAdapter, GeminiAdapter, GeminiModels, InMemoryDatabase, LocalObjectStore,
        OpenAiTextAdapter, ScriptedGenerator, UrlSigner,
    },
    config::{Config, GenerativeProvider, TextProvider},
    error::ApiError,
    web::{rest::ApiDoc, router, state::AppState},
};
use async_openai::{config::OpenAIConfig, Client};
use axum::http::{
    header::{ACCEPT, CONTENT_TYPE},
    Method,
};
use axum::Router;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use study_deck_core::cards::GenerationServices;
use study_deck_core::ports::{
    DatabaseService, MultimodalGenerationService, ObjectStore, TextGenerationService,
};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

type GenerativeServices = (
    Arc<dyn MultimodalGenerationService>,
    Arc<dyn TextGenerationService>,
);

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    let db: Arc<dyn DatabaseService> = match &config.database_url {
        Some(url) => {
            info!("Connecting to database...");
            let db_pool = PgPoolOptions::new().max_connections(5).connect(url).await?;
            let db_adapter = DbAdapter::new(db_pool);
            info!("Running database migrations...");
            db_adapter.run_migrations().await?;
            info!("Database migrations complete.");
            Arc::new(db_adapter)
        }
        None => {
            warn!("DATABASE_URL is not set; data lives in memory and is lost on exit");
            Arc::new(InMemoryDatabase::new())
        }
    };

    // --- 3. Initialize Service Adapters ---
    let (multimodal, text) = generative_services(&config)?;
    let url_signer = UrlSigner::new(&config.storage_signing_secret);
    let object_store: Arc<dyn ObjectStore> = Arc::new(LocalObjectStore::new(
        config.storage_root.clone(),
        &config.public_base_url,
        url_signer.clone(),
    ));
    info!("Storing objects under {}", config.storage_root.display());

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState::new(
        config.clone(),
        db,
        GenerationServices {
            text,
            multimodal,
            object_store,
        },
        url_signer,
    ));

    // --- 5. Create the Web Router ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, ACCEPT]);

    let app = Router::new()
        .merge(router(app_state))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors);

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn generative_services(config: &Config) -> Result<GenerativeServices, ApiError> {
    match config.generative_provider {
        GenerativeProvider::Scripted => {
            warn!("Using the scripted generative service; cards will be placeholders");
            let scripted = Arc::new(ScriptedGenerator::offline());
            let multimodal: Arc<dyn MultimodalGenerationService> = scripted.clone();
            let text: Arc<dyn TextGenerationService> = scripted;
            Ok((multimodal, text))
        }
        GenerativeProvider::Gemini => {
            let api_key = config
                .gemini_api_key
                .clone()
                .ok_or_else(|| ApiError::Internal("GEMINI_API_KEY is required".to_string()))?;
            let gemini = Arc::new(GeminiAdapter::new(
                reqwest::Client::new(),
                api_key,
                config.gemini_base_url.clone(),
                GeminiModels {
                    text: config.gemini_text_model.clone(),
                    document: config.gemini_document_model.clone(),
                    image: config.gemini_image_model.clone(),
                },
            ));

            let text: Arc<dyn TextGenerationService> = match config.text_provider {
                TextProvider::Gemini => gemini.clone(),
                TextProvider::OpenAi => {
                    let api_key = config.openai_api_key.as_ref().ok_or_else(|| {
                        ApiError::Internal("OPENAI_API_KEY is required".to_string())
                    })?;
                    let client = Client::with_config(OpenAIConfig::new().with_api_key(api_key));
                    Arc::new(OpenAiTextAdapter::new(
                        client,
                        config.openai_text_model.clone(),
                    ))
                }
            };
            let multimodal: Arc<dyn MultimodalGenerationService> = gemini;
            Ok((multimodal, text))
        }
    }
}
