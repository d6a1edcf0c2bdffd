use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool, Transaction};

use crate::models::{Chunk, IndexManifest, SourceType};

const CHUNK_COLUMNS: &str =
    "id, content, kind, source_path, title, section, page, token_count, source_hash";

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens (creating if needed) the chunk store at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("failed to open sqlite store: {}", path.display()))?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                kind TEXT NOT NULL,
                source_path TEXT NOT NULL,
                title TEXT NOT NULL,
                section TEXT,
                page INTEGER,
                token_count INTEGER NOT NULL,
                source_hash TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS manifests (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                corpus_hash TEXT NOT NULL,
                embedding_model TEXT NOT NULL,
                vector_size INTEGER NOT NULL,
                chunk_count INTEGER NOT NULL,
                document_count INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Swaps the whole chunk table for `chunks` in one transaction.
    pub async fn replace_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM chunks").execute(&mut *tx).await?;
        for chunk in chunks {
            insert_chunk_tx(&mut tx, chunk).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn chunk_count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<i64, _>("n"))
    }

    /// Fetches chunks in the order of `ids`; unknown ids are skipped.
    pub async fn get_chunks_by_ids(&self, ids: &[String]) -> Result<Vec<Chunk>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {CHUNK_COLUMNS} FROM chunks WHERE id IN ("));
        let mut separated = qb.separated(",");
        for id in ids {
            separated.push_bind(id);
        }
        separated.push_unseparated(")");

        let rows: Vec<SqliteRow> = qb.build().fetch_all(&self.pool).await?;
        let mut chunks: Vec<Chunk> = rows.into_iter().map(row_to_chunk).collect();

        chunks.sort_by_key(|chunk| {
            ids.iter()
                .position(|id| id == &chunk.id)
                .unwrap_or(usize::MAX)
        });

        Ok(chunks)
    }

    /// Forgets every recorded build, so the store reads as unbuilt until the
    /// next [`Database::record_manifest`].
    pub async fn clear_manifests(&self) -> Result<()> {
        sqlx::query("DELETE FROM manifests")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn record_manifest(&self, manifest: &IndexManifest) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO manifests (corpus_hash, embedding_model, vector_size, chunk_count, document_count, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&manifest.corpus_hash)
        .bind(&manifest.embedding_model)
        .bind(manifest.vector_size)
        .bind(manifest.chunk_count)
        .bind(manifest.document_count)
        .bind(manifest.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn latest_manifest(&self) -> Result<Option<IndexManifest>> {
        let row = sqlx::query(
            r#"
            SELECT corpus_hash, embedding_model, vector_size, chunk_count, document_count, created_at
            FROM manifests
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| IndexManifest {
            corpus_hash: r.get("corpus_hash"),
            embedding_model: r.get("embedding_model"),
            vector_size: r.get("vector_size"),
            chunk_count: r.get("chunk_count"),
            document_count: r.get("document_count"),
            created_at: chrono::DateTime::parse_from_rfc3339(&r.get::<String, _>("created_at"))
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        }))
    }
}

async fn insert_chunk_tx(tx: &mut Transaction<'_, Sqlite>, chunk: &Chunk) -> Result<()> {
    sqlx::query(&format!(
        "INSERT INTO chunks ({CHUNK_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"
    ))
    .bind(&chunk.id)
    .bind(&chunk.content)
    .bind(chunk.kind.as_str())
    .bind(&chunk.source_path)
    .bind(&chunk.title)
    .bind(&chunk.section)
    .bind(chunk.page)
    .bind(chunk.token_count)
    .bind(&chunk.source_hash)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

fn row_to_chunk(row: SqliteRow) -> Chunk {
    Chunk {
        id: row.get("id"),
        content: row.get("content"),
        kind: SourceType::from_db(&row.get::<String, _>("kind")),
        source_path: row.get("source_path"),
        title: row.get("title"),
        section: row.get("section"),
        page: row.get("page"),
        token_count: row.get("token_count"),
        source_hash: row.get("source_hash"),
    }
}
