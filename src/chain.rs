use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use tokio::sync::Semaphore;

use crate::config::TokenConfig;
use crate::models::RetrievalResult;
use crate::ollama::{GenerateOptions, OllamaClient};
use crate::retrieval::Retriever;
use crate::vector_db::VectorDb;

const NO_CONTEXT_NOTE: &str = "No reference passages matched this question.";

/// Anything that turns a question into an answer.
#[async_trait]
pub trait QueryChain: Send + Sync {
    async fn run(&self, query: &str) -> Result<String>;
}

/// Retrieve, build a numbered context, and ask the answer model with the
/// system prompt attached.
#[derive(Clone)]
pub struct RetrievalChain {
    retriever: Retriever,
    ollama: OllamaClient,
    llm_model: String,
    system_prompt: String,
    options: GenerateOptions,
    max_context_tokens: usize,
    generation_limit: Arc<Semaphore>,
}

pub fn create_retrieval_chain(
    vector_db: &VectorDb,
    ollama: OllamaClient,
    llm_model_name: &str,
    system_prompt: &str,
    tokens: &TokenConfig,
    temperature: f32,
) -> RetrievalChain {
    tracing::debug!(
        "retrieval chain over {} chunks (corpus {})",
        vector_db.manifest().chunk_count,
        vector_db.manifest().corpus_hash
    );
    RetrievalChain {
        retriever: vector_db.as_retriever(tokens.retrieval_top_k),
        ollama,
        llm_model: llm_model_name.to_string(),
        system_prompt: system_prompt.to_string(),
        options: GenerateOptions {
            num_predict: tokens.max_output_tokens,
            temperature,
        },
        max_context_tokens: tokens.max_context_tokens,
        generation_limit: Arc::new(Semaphore::new(1)),
    }
}

impl RetrievalChain {
    /// Shares one generation permit pool across chains.
    pub fn with_generation_limit(mut self, generation_limit: Arc<Semaphore>) -> Self {
        self.generation_limit = generation_limit;
        self
    }
}

#[async_trait]
impl QueryChain for RetrievalChain {
    async fn run(&self, query: &str) -> Result<String> {
        let started = Instant::now();

        let retrieved = self.retriever.retrieve(query).await?;
        let selected = trim_to_context_budget(retrieved, self.max_context_tokens);
        let context = build_context(&selected);
        let prompt = build_answer_prompt(query, &context);

        let _permit = self.generation_limit.acquire().await?;
        let answer = self
            .ollama
            .generate_text(
                &self.llm_model,
                Some(&self.system_prompt),
                &prompt,
                self.options,
            )
            .await?;
        let answer = sanitize_model_output(answer);

        if answer.is_empty() {
            anyhow::bail!("model {} returned an empty answer", self.llm_model);
        }

        tracing::info!(
            "answered query with {} context chunks in {} ms",
            selected.len(),
            started.elapsed().as_millis()
        );
        Ok(answer)
    }
}

/// Keeps results in score order until the word budget is spent; the first
/// result is always kept.
fn trim_to_context_budget(
    retrieved: Vec<RetrievalResult>,
    max_context_tokens: usize,
) -> Vec<RetrievalResult> {
    let mut used = 0usize;
    let mut out = Vec::with_capacity(retrieved.len());

    for result in retrieved {
        let cost = result.chunk.token_count.max(0) as usize;
        if !out.is_empty() && used + cost > max_context_tokens {
            break;
        }
        used += cost;
        out.push(result);
    }

    out
}

fn build_context(results: &[RetrievalResult]) -> String {
    if results.is_empty() {
        return NO_CONTEXT_NOTE.to_string();
    }

    let mut context = String::new();
    for (idx, result) in results.iter().enumerate() {
        let chunk = &result.chunk;
        let mut label = chunk.title.clone();
        if let Some(section) = &chunk.section {
            label.push_str(" / ");
            label.push_str(section);
        }
        if let Some(page) = chunk.page {
            label.push_str(&format!(" (page {page})"));
        }

        context.push_str(&format!("[S{}] {}\n{}\n\n", idx + 1, label, chunk.content));
    }

    context.trim_end().to_string()
}

fn build_answer_prompt(question: &str, context: &str) -> String {
    format!(
        "Use the reference passages below when they are relevant to the question. \
         If they do not cover it, answer from standard medical guidance.\n\n\
         Reference passages:\n{context}\n\nQuestion:\n{question}\n\nAnswer:"
    )
}

fn sanitize_model_output(answer: String) -> String {
    let fence = Regex::new(r"(?m)^```[a-zA-Z]*\s*$").unwrap_or_else(|_| Regex::new("$^").unwrap());
    let stripped = fence.replace_all(&answer, "");
    let trimmed = stripped.trim();
    trimmed
        .strip_prefix("Answer:")
        .map(str::trim_start)
        .unwrap_or(trimmed)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chunk, SourceType};

    fn result(id: &str, words: usize, score: f32) -> RetrievalResult {
        RetrievalResult {
            chunk: Chunk {
                id: id.to_string(),
                content: vec!["fluid"; words].join(" "),
                kind: SourceType::PdfText,
                source_path: "prep.pdf".to_string(),
                title: "prep".to_string(),
                section: Some("Diet".to_string()),
                page: Some(2),
                token_count: words as i64,
                source_hash: "h".to_string(),
            },
            score,
        }
    }

    #[test]
    fn budget_keeps_leading_results_only() {
        let kept = trim_to_context_budget(
            vec![result("a", 60, 0.9), result("b", 30, 0.8), result("c", 30, 0.7)],
            100,
        );
        let ids: Vec<&str> = kept.iter().map(|r| r.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn budget_always_keeps_first_result() {
        let kept = trim_to_context_budget(vec![result("big", 500, 0.9)], 100);
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn context_numbers_sources_with_labels() {
        let context = build_context(&[result("a", 2, 0.9), result("b", 1, 0.5)]);
        assert!(context.starts_with("[S1] prep / Diet (page 2)\nfluid fluid"));
        assert!(context.contains("[S2] prep / Diet (page 2)\nfluid"));
    }

    #[test]
    fn empty_context_says_so() {
        assert_eq!(build_context(&[]), NO_CONTEXT_NOTE);
    }

    #[test]
    fn prompt_contains_question_and_context() {
        let prompt = build_answer_prompt("Can I eat before endoscopy?", "[S1] prep\nfast");
        assert!(prompt.contains("[S1] prep\nfast"));
        assert!(prompt.contains("Question:\nCan I eat before endoscopy?"));
        assert!(prompt.ends_with("Answer:"));
    }

    #[test]
    fn strips_code_fences_and_answer_prefix() {
        assert_eq!(
            sanitize_model_output("```markdown\nAnswer: Avoid solids.\n```".to_string()),
            "Avoid solids."
        );
        assert_eq!(sanitize_model_output("  plain  ".to_string()), "plain");
    }
}
