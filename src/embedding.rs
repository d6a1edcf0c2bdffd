use anyhow::{Context, Result};

use crate::ollama::OllamaClient;

const DIMENSION_PROBE: &str = "endoscopy preparation";

/// A named Ollama embedding model with a known output dimension.
#[derive(Clone)]
pub struct EmbeddingModel {
    ollama: OllamaClient,
    name: String,
    dimension: usize,
}

impl EmbeddingModel {
    /// Binds `name` and embeds a probe string to learn the vector size.
    pub async fn load(ollama: OllamaClient, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let probe = ollama
            .embed(&name, DIMENSION_PROBE)
            .await
            .with_context(|| format!("failed to load embedding model {name}"))?;

        if probe.is_empty() {
            anyhow::bail!("embedding model {name} returned an empty vector");
        }

        tracing::info!("embedding model {} ready (dimension {})", name, probe.len());
        Ok(Self {
            ollama,
            name,
            dimension: probe.len(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let vector = self.ollama.embed(&self.name, text).await?;
        if vector.len() != self.dimension {
            anyhow::bail!(
                "embedding model {} returned {} dimensions, expected {}",
                self.name,
                vector.len(),
                self.dimension
            );
        }
        Ok(vector)
    }
}

pub async fn load_embedding_model(
    ollama: OllamaClient,
    model_name: &str,
) -> Result<EmbeddingModel> {
    EmbeddingModel::load(ollama, model_name).await
}
