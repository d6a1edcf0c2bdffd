use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::prompt::SYSTEM_PROMPT;

#[derive(Clone, Debug)]
pub struct ModelConfig {
    pub answer_model: String,
    pub embedding_model: String,
    pub answer_temperature: f32,
}

#[derive(Clone, Debug)]
pub struct TokenConfig {
    pub retrieval_top_k: usize,
    pub max_context_tokens: usize,
    pub max_output_tokens: usize,
    pub chunk_target_tokens: usize,
    pub chunk_overlap_tokens: usize,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub bind_addr: String,
    pub docs_dir: PathBuf,
    pub db_dir: PathBuf,
    pub eager_init: bool,
    pub expose_errors: bool,
    pub system_prompt_path: Option<PathBuf>,
    pub ollama_base_url: String,
    pub qdrant_base_url: String,
    pub qdrant_collection: String,
    pub models: ModelConfig,
    pub tokens: TokenConfig,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            bind_addr: env::var("ENDOSCOPY_BOT_BIND")
                .unwrap_or_else(|_| "127.0.0.1:5000".to_string()),
            docs_dir: env::var("ENDOSCOPY_BOT_DOCS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("Endoscopy_Bot_New/data_endoscopy")),
            db_dir: env::var("ENDOSCOPY_BOT_DB_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("db")),
            eager_init: env_flag("ENDOSCOPY_BOT_EAGER_INIT", false),
            expose_errors: env_flag("ENDOSCOPY_BOT_EXPOSE_ERRORS", true),
            system_prompt_path: env::var("SYSTEM_PROMPT_PATH").ok().map(PathBuf::from),
            ollama_base_url: env::var("OLLAMA_BASE_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:11434".to_string()),
            qdrant_base_url: env::var("QDRANT_BASE_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:6333".to_string()),
            qdrant_collection: env::var("QDRANT_COLLECTION")
                .unwrap_or_else(|_| "endoscopy_chunks".to_string()),
            models: ModelConfig {
                answer_model: env::var("ANSWER_MODEL")
                    .unwrap_or_else(|_| "endoscopy-zephyr".to_string()),
                embedding_model: env::var("EMBEDDING_MODEL")
                    .unwrap_or_else(|_| "bge-base-en-v1.5".to_string()),
                answer_temperature: env_parse("ANSWER_TEMPERATURE", 0.2),
            },
            tokens: TokenConfig {
                retrieval_top_k: env_parse("RETRIEVAL_TOP_K", 4),
                max_context_tokens: env_parse("MAX_CONTEXT_TOKENS", 2_400),
                max_output_tokens: env_parse("MAX_OUTPUT_TOKENS", 512),
                chunk_target_tokens: env_parse("CHUNK_TARGET_TOKENS", 180),
                chunk_overlap_tokens: env_parse("CHUNK_OVERLAP_TOKENS", 30),
            },
        }
    }

    /// The built-in prompt unless `SYSTEM_PROMPT_PATH` points at a replacement.
    pub async fn load_system_prompt(&self) -> Result<String> {
        let Some(path) = &self.system_prompt_path else {
            return Ok(SYSTEM_PROMPT.to_string());
        };

        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed reading system prompt: {}", path.display()))?;
        if prompt.trim().is_empty() {
            anyhow::bail!("system prompt file is empty: {}", path.display());
        }
        Ok(prompt)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(value) => parse_flag(&value).unwrap_or(default),
        Err(_) => default,
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_accept_common_spellings() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag(" on "), Some(true));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("nope"), None);
    }

    #[tokio::test]
    async fn prompt_file_overrides_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompt.txt");
        std::fs::write(&path, "Answer briefly.").unwrap();

        let mut config = AppConfig::from_env();
        config.system_prompt_path = Some(path);
        assert_eq!(config.load_system_prompt().await.unwrap(), "Answer briefly.");

        config.system_prompt_path = None;
        assert_eq!(config.load_system_prompt().await.unwrap(), SYSTEM_PROMPT);
    }
}
