use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    PlainText,
    Markdown,
    DocxText,
    PdfText,
}

impl SourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceType::PlainText => "plain_text",
            SourceType::Markdown => "markdown",
            SourceType::DocxText => "docx_text",
            SourceType::PdfText => "pdf_text",
        }
    }

    pub fn from_db(value: &str) -> Self {
        match value {
            "markdown" => SourceType::Markdown,
            "docx_text" => SourceType::DocxText,
            "pdf_text" => SourceType::PdfText,
            _ => SourceType::PlainText,
        }
    }
}

/// One cleaned unit of source text: a whole text file, a docx section, or a pdf page.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub path: String,
    pub title: String,
    pub kind: SourceType,
    pub section: Option<String>,
    pub page: Option<i64>,
    pub content: String,
    pub source_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub content: String,
    pub kind: SourceType,
    pub source_path: String,
    pub title: String,
    pub section: Option<String>,
    pub page: Option<i64>,
    pub token_count: i64,
    pub source_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexManifest {
    pub corpus_hash: String,
    pub embedding_model: String,
    pub vector_size: i64,
    pub chunk_count: i64,
    pub document_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RetrievalResult {
    pub chunk: Chunk,
    pub score: f32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub query: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub response: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub initialized: bool,
}
