use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;

use crate::db::Database;
use crate::embedding::EmbeddingModel;
use crate::models::{Chunk, IndexManifest};
use crate::qdrant_store::{QdrantPoint, QdrantStore, UPSERT_BATCH_SIZE};
use crate::retrieval::Retriever;
use crate::tantivy_store::TantivyStore;

const SQLITE_FILE: &str = "chunks.sqlite3";
const TANTIVY_DIR: &str = "tantivy";

pub fn sqlite_path(persist_directory: &Path) -> PathBuf {
    persist_directory.join(SQLITE_FILE)
}

pub fn tantivy_dir(persist_directory: &Path) -> PathBuf {
    persist_directory.join(TANTIVY_DIR)
}

/// Corpus facts recorded alongside an index build.
#[derive(Debug, Clone)]
pub struct CorpusStats {
    pub corpus_hash: String,
    pub document_count: usize,
}

/// A loaded index: chunk text in SQLite, vectors in Qdrant, BM25 in Tantivy.
#[derive(Clone)]
pub struct VectorDb {
    pub(crate) db: Database,
    pub(crate) qdrant: QdrantStore,
    pub(crate) tantivy: TantivyStore,
    pub(crate) embedding: EmbeddingModel,
    manifest: IndexManifest,
}

impl VectorDb {
    pub fn manifest(&self) -> &IndexManifest {
        &self.manifest
    }

    pub fn as_retriever(&self, top_k: usize) -> Retriever {
        Retriever::new(self.clone(), top_k)
    }
}

/// Embeds every chunk and replaces all three stores under `persist_directory`.
pub async fn create_vector_db(
    chunks: &[Chunk],
    embedding: &EmbeddingModel,
    persist_directory: &Path,
    qdrant: &QdrantStore,
    corpus: CorpusStats,
) -> Result<IndexManifest> {
    if chunks.is_empty() {
        anyhow::bail!("no chunks to index");
    }

    tokio::fs::create_dir_all(persist_directory)
        .await
        .with_context(|| format!("failed creating {}", persist_directory.display()))?;

    // Without a manifest a half-finished rebuild refuses to load.
    let db = Database::open(&sqlite_path(persist_directory)).await?;
    db.clear_manifests().await?;

    let mut points = Vec::with_capacity(chunks.len());
    for (idx, chunk) in chunks.iter().enumerate() {
        let vector = embedding
            .embed(&chunk.content)
            .await
            .with_context(|| format!("failed embedding for chunk {}", chunk.id))?;
        points.push(QdrantPoint::for_chunk(chunk, vector));

        if (idx + 1) % 50 == 0 {
            tracing::info!("embedded {}/{} chunks", idx + 1, chunks.len());
        }
    }

    qdrant.recreate_collection(embedding.dimension()).await?;
    for batch in points.chunks(UPSERT_BATCH_SIZE) {
        qdrant.upsert_points(batch).await?;
    }

    let tantivy = TantivyStore::new(tantivy_dir(persist_directory));
    let chunks_for_index = chunks.to_vec();
    tokio::task::spawn_blocking(move || tantivy.rebuild(&chunks_for_index))
        .await
        .context("tantivy rebuild task panicked")??;

    db.replace_chunks(chunks).await?;

    let manifest = IndexManifest {
        corpus_hash: corpus.corpus_hash,
        embedding_model: embedding.name().to_string(),
        vector_size: embedding.dimension() as i64,
        chunk_count: chunks.len() as i64,
        document_count: corpus.document_count as i64,
        created_at: Utc::now(),
    };
    db.record_manifest(&manifest).await?;

    tracing::info!(
        "indexed {} chunks into {} and qdrant collection {}",
        manifest.chunk_count,
        persist_directory.display(),
        qdrant.collection()
    );

    Ok(manifest)
}

/// Reopens an index built by [`create_vector_db`], checking it matches `embedding`.
pub async fn load_vector_db(
    persist_directory: &Path,
    qdrant: QdrantStore,
    embedding: EmbeddingModel,
) -> Result<VectorDb> {
    let sqlite = sqlite_path(persist_directory);
    if !sqlite.exists() {
        anyhow::bail!(
            "vector database not found at {}",
            persist_directory.display()
        );
    }

    let db = Database::open(&sqlite).await?;
    let manifest = db.latest_manifest().await?.ok_or_else(|| {
        anyhow::anyhow!(
            "vector database at {} has no index manifest",
            persist_directory.display()
        )
    })?;

    if manifest.embedding_model != embedding.name() {
        anyhow::bail!(
            "vector database was built with {} but {} is loaded",
            manifest.embedding_model,
            embedding.name()
        );
    }
    if manifest.vector_size != embedding.dimension() as i64 {
        anyhow::bail!(
            "vector database stores {}-dimensional vectors but the embedding model produces {}",
            manifest.vector_size,
            embedding.dimension()
        );
    }

    let stored = db.chunk_count().await?;
    if stored != manifest.chunk_count {
        anyhow::bail!(
            "vector database holds {} chunks but its manifest lists {}; rebuild the index",
            stored,
            manifest.chunk_count
        );
    }

    let Some(stats) = qdrant.collection_stats().await? else {
        anyhow::bail!("qdrant collection {} does not exist", qdrant.collection());
    };
    if stats.vector_size as i64 != manifest.vector_size {
        anyhow::bail!(
            "qdrant collection {} has {}-dimensional vectors, manifest says {}",
            qdrant.collection(),
            stats.vector_size,
            manifest.vector_size
        );
    }
    match stats.points_count {
        Some(points) if points as i64 != manifest.chunk_count => anyhow::bail!(
            "qdrant collection {} holds {} points but the manifest lists {} chunks; rebuild the index",
            qdrant.collection(),
            points,
            manifest.chunk_count
        ),
        Some(_) => {}
        None => tracing::warn!(
            "qdrant did not report a point count for {}; skipping the check",
            qdrant.collection()
        ),
    }

    let tantivy = TantivyStore::new(tantivy_dir(persist_directory));
    if !tantivy.exists() {
        tracing::warn!(
            "no lexical index under {}; retrieval will use vectors only",
            tantivy.index_dir().display()
        );
    }

    tracing::info!(
        "loaded vector database: {} chunks from {} documents (built {})",
        manifest.chunk_count,
        manifest.document_count,
        manifest.created_at
    );

    Ok(VectorDb {
        db,
        qdrant,
        tantivy,
        embedding,
        manifest,
    })
}
