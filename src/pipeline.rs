use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::{OnceCell, Semaphore};

use crate::chain::{create_retrieval_chain, QueryChain, RetrievalChain};
use crate::config::AppConfig;
use crate::embedding::{load_embedding_model, EmbeddingModel};
use crate::ingest::{chunk_documents, corpus_hash, get_cleaned_documents};
use crate::models::IndexManifest;
use crate::ollama::OllamaClient;
use crate::qdrant_store::QdrantStore;
use crate::vector_db::{create_vector_db, load_vector_db, CorpusStats};

/// Produces a ready query chain; called at most once per successful init.
#[async_trait]
pub trait PipelineBuilder: Send + Sync {
    async fn build(&self) -> Result<Arc<dyn QueryChain>>;
}

/// Builds the chain from the document folder: load, chunk, embed, index,
/// reload the index, then wire the retrieval chain.
#[derive(Clone)]
pub struct IndexingPipeline {
    config: AppConfig,
    ollama: OllamaClient,
    qdrant: QdrantStore,
    generation_limit: Arc<Semaphore>,
}

impl IndexingPipeline {
    pub fn new(config: AppConfig) -> Self {
        let ollama = OllamaClient::new(config.ollama_base_url.clone());
        let qdrant = QdrantStore::new(
            config.qdrant_base_url.clone(),
            config.qdrant_collection.clone(),
        );

        Self {
            config,
            ollama,
            qdrant,
            generation_limit: Arc::new(Semaphore::new(1)),
        }
    }

    /// Load, clean, chunk, embed and persist the corpus.
    pub async fn build_index(&self) -> Result<(EmbeddingModel, IndexManifest)> {
        tracing::info!(
            "loading and cleaning documents from {}",
            self.config.docs_dir.display()
        );
        let documents = get_cleaned_documents(&self.config.docs_dir).await?;

        tracing::info!("chunking {} documents", documents.len());
        let chunks = chunk_documents(
            &documents,
            self.config.tokens.chunk_target_tokens,
            self.config.tokens.chunk_overlap_tokens,
        );

        tracing::info!(
            "loading embedding model {}",
            self.config.models.embedding_model
        );
        let embedding =
            load_embedding_model(self.ollama.clone(), &self.config.models.embedding_model)
                .await?;

        tracing::info!(
            "creating vector database from {} chunks in {}",
            chunks.len(),
            self.config.db_dir.display()
        );
        let manifest = create_vector_db(
            &chunks,
            &embedding,
            &self.config.db_dir,
            &self.qdrant,
            CorpusStats {
                corpus_hash: corpus_hash(&documents),
                document_count: documents.len(),
            },
        )
        .await?;

        Ok((embedding, manifest))
    }

    /// Full initialization sequence, rebuilding the index first.
    pub async fn build_chain(&self) -> Result<RetrievalChain> {
        let (embedding, _) = self.build_index().await?;
        self.chain_from_index(embedding).await
    }

    /// Skips indexing and reuses whatever is persisted under the db directory.
    pub async fn load_chain(&self) -> Result<RetrievalChain> {
        tracing::info!(
            "loading embedding model {}",
            self.config.models.embedding_model
        );
        let embedding =
            load_embedding_model(self.ollama.clone(), &self.config.models.embedding_model)
                .await?;
        self.chain_from_index(embedding).await
    }

    async fn chain_from_index(&self, embedding: EmbeddingModel) -> Result<RetrievalChain> {
        tracing::info!("loading vector database from {}", self.config.db_dir.display());
        let vector_db = load_vector_db(&self.config.db_dir, self.qdrant.clone(), embedding).await?;

        tracing::info!(
            "initializing retrieval chain with {}",
            self.config.models.answer_model
        );
        let system_prompt = self.config.load_system_prompt().await?;
        let chain = create_retrieval_chain(
            &vector_db,
            self.ollama.clone(),
            &self.config.models.answer_model,
            &system_prompt,
            &self.config.tokens,
            self.config.models.answer_temperature,
        )
        .with_generation_limit(self.generation_limit.clone());

        Ok(chain)
    }
}

#[async_trait]
impl PipelineBuilder for IndexingPipeline {
    async fn build(&self) -> Result<Arc<dyn QueryChain>> {
        let chain = self.build_chain().await?;
        Ok(Arc::new(chain))
    }
}

/// Process-wide handle to the query chain.
///
/// Concurrent callers of [`PipelineState::ensure_initialized`] share a single
/// build. A failed build leaves the handle empty, so the next call retries.
pub struct PipelineState {
    builder: Arc<dyn PipelineBuilder>,
    chain: OnceCell<Arc<dyn QueryChain>>,
}

impl PipelineState {
    pub fn new(builder: Arc<dyn PipelineBuilder>) -> Self {
        Self {
            builder,
            chain: OnceCell::new(),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.chain.initialized()
    }

    pub async fn ensure_initialized(&self) -> Result<Arc<dyn QueryChain>> {
        let chain = self
            .chain
            .get_or_try_init(|| async {
                tracing::info!("initializing query pipeline");
                let started = Instant::now();
                let chain = self.builder.build().await?;
                tracing::info!(
                    "query pipeline ready in {} ms",
                    started.elapsed().as_millis()
                );
                Ok::<_, anyhow::Error>(chain)
            })
            .await?;

        Ok(chain.clone())
    }
}
