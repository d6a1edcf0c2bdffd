use anyhow::{Context, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Word caps tried, longest first, when an input overflows the embedding
/// model's context window.
const EMBED_TRUNCATION_STEPS: [usize; 5] = [400, 320, 240, 180, 120];

#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
}

/// Sampling settings for one `/api/generate` call.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct GenerateOptions {
    pub num_predict: usize,
    pub temperature: f32,
}

#[derive(Debug, Clone, Copy)]
enum EmbedEndpoint {
    /// `/api/embed`, batch-shaped.
    Embed,
    /// `/api/embeddings`, served by older Ollama builds.
    Embeddings,
}

impl EmbedEndpoint {
    fn path(self) -> &'static str {
        match self {
            EmbedEndpoint::Embed => "/api/embed",
            EmbedEndpoint::Embeddings => "/api/embeddings",
        }
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Embeds `text`, shortening it step by step if the model rejects it as
    /// too long.
    pub async fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>> {
        let input = text.trim();
        if input.is_empty() {
            anyhow::bail!("cannot embed empty text input");
        }

        let first_err = match self.embed_any_endpoint(model, input).await {
            Ok(vector) => return Ok(vector),
            Err(err) if is_context_length_error(&err) => err,
            Err(err) => return Err(err),
        };

        let word_count = input.split_whitespace().count();
        let mut last_err = first_err;
        for max_words in EMBED_TRUNCATION_STEPS
            .into_iter()
            .filter(|&max_words| max_words < word_count)
        {
            tracing::debug!(model, word_count, max_words, "retrying embedding with truncated input");
            let truncated = truncate_to_word_limit(input, max_words);
            match self.embed_any_endpoint(model, &truncated).await {
                Ok(vector) => return Ok(vector),
                Err(err) if is_context_length_error(&err) => last_err = err,
                Err(err) => return Err(err),
            }
        }

        anyhow::bail!(
            "embedding input of {word_count} words still exceeds the context length of {model}: {last_err}"
        )
    }

    async fn embed_any_endpoint(&self, model: &str, text: &str) -> Result<Vec<f32>> {
        let current = match self.embed_via(EmbedEndpoint::Embed, model, text).await {
            Ok(vector) => return Ok(vector),
            Err(err) => err,
        };

        self.embed_via(EmbedEndpoint::Embeddings, model, text)
            .await
            .map_err(|legacy| {
                anyhow::anyhow!(
                    "ollama embedding failed via /api/embed ({current}) and /api/embeddings \
                     ({legacy}); is `{model}` pulled?"
                )
            })
    }

    async fn embed_via(&self, endpoint: EmbedEndpoint, model: &str, text: &str) -> Result<Vec<f32>> {
        match endpoint {
            EmbedEndpoint::Embed => {
                let response: EmbedResponse = self
                    .post_json(endpoint.path(), &EmbedRequest { model, input: text })
                    .await?;
                response
                    .embeddings
                    .into_iter()
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("ollama /api/embed returned no embeddings"))
            }
            EmbedEndpoint::Embeddings => {
                let response: EmbeddingsResponse = self
                    .post_json(endpoint.path(), &EmbeddingsRequest { model, prompt: text })
                    .await?;
                Ok(response.embedding)
            }
        }
    }

    /// Non-streaming completion. `system` replaces the model's default system
    /// prompt when given.
    pub async fn generate_text(
        &self,
        model: &str,
        system: Option<&str>,
        prompt: &str,
        options: GenerateOptions,
    ) -> Result<String> {
        let response: GenerateResponse = self
            .post_json(
                "/api/generate",
                &GenerateRequest {
                    model,
                    system,
                    prompt,
                    stream: false,
                    options,
                },
            )
            .await?;

        Ok(response.response.trim().to_string())
    }

    async fn post_json<Req, Resp>(&self, path: &str, body: &Req) -> Result<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .send()
            .await
            .with_context(|| format!("failed to call ollama {path}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("ollama {path} returned {status}: {}", normalize_err_body(&body));
        }

        response
            .json::<Resp>()
            .await
            .with_context(|| format!("failed to decode ollama {path} response"))
    }
}

fn normalize_err_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty body>".to_string();
    }

    serde_json::from_str::<serde_json::Value>(trimmed)
        .ok()
        .and_then(|json| json.get("error")?.as_str().map(str::to_string))
        .unwrap_or_else(|| trimmed.to_string())
}

fn is_context_length_error(err: &anyhow::Error) -> bool {
    let msg = format!("{err:#}").to_ascii_lowercase();
    msg.contains("context length") && (msg.contains("input length") || msg.contains("exceeds"))
}

fn truncate_to_word_limit(text: &str, max_words: usize) -> String {
    text.split_whitespace()
        .take(max_words)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_body_prefers_json_error_field() {
        assert_eq!(
            normalize_err_body(r#"{"error":"model 'x' not found"}"#),
            "model 'x' not found"
        );
        assert_eq!(normalize_err_body(r#"{"detail":"x"}"#), r#"{"detail":"x"}"#);
        assert_eq!(normalize_err_body("  plain failure "), "plain failure");
        assert_eq!(normalize_err_body(""), "<empty body>");
    }

    #[test]
    fn detects_context_length_errors() {
        let err = anyhow::anyhow!("the input length exceeds the context length");
        assert!(is_context_length_error(&err));
        assert!(!is_context_length_error(&anyhow::anyhow!("connection refused")));
    }

    #[test]
    fn truncation_keeps_leading_words() {
        assert_eq!(truncate_to_word_limit("fast for  eight hours", 2), "fast for");
    }

    #[test]
    fn base_url_drops_trailing_slash() {
        let client = OllamaClient::new("http://localhost:11434/");
        assert_eq!(client.base_url(), "http://localhost:11434");
    }

    #[test]
    fn generate_request_omits_missing_system() {
        let options = GenerateOptions {
            num_predict: 64,
            temperature: 0.2,
        };
        let body = serde_json::to_value(GenerateRequest {
            model: "m",
            system: None,
            prompt: "p",
            stream: false,
            options,
        })
        .unwrap();
        assert!(body.get("system").is_none());
        assert_eq!(body["options"]["num_predict"], 64);
    }
}
