pub mod chain;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod ingest;
pub mod models;
pub mod ollama;
pub mod pipeline;
pub mod prompt;
pub mod qdrant_store;
pub mod retrieval;
pub mod server;
pub mod tantivy_store;
pub mod vector_db;

pub use config::AppConfig;
pub use server::{build_router, run_server, AppState};
