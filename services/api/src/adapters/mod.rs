pub mod db;
pub mod gemini;
pub mod memory_db;
pub mod openai_llm;
pub mod scripted_llm;
pub mod storage;

pub use db::DbAdapter;
pub use gemini::{GeminiAdapter, GeminiModels};
pub use memory_db::InMemoryDatabase;
pub use openai_llm::OpenAiTextAdapter;
pub use scripted_llm::ScriptedGenerator;
pub use storage::{LocalObjectStore, UrlSigner};
