use std::sync::Arc;

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::models::Chunk;

pub const UPSERT_BATCH_SIZE: usize = 64;

#[derive(Debug, Clone)]
pub struct VectorHit {
    pub chunk_id: String,
    pub score: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionStats {
    pub vector_size: usize,
    /// Absent while Qdrant is still counting after a large write.
    pub points_count: Option<u64>,
}

#[derive(Clone)]
pub struct QdrantStore {
    client: Client,
    base_url: String,
    collection: String,
    known_vector_size: Arc<RwLock<Option<usize>>>,
}

impl QdrantStore {
    pub fn new(base_url: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            collection: collection.into(),
            known_vector_size: Arc::new(RwLock::new(None)),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn collection_url(&self) -> String {
        format!("{}/collections/{}", self.base_url, self.collection)
    }

    /// Drops the collection (if any) and creates it empty at `vector_size`.
    pub async fn recreate_collection(&self, vector_size: usize) -> Result<()> {
        let response = self
            .client
            .delete(self.collection_url())
            .send()
            .await
            .context("failed to contact qdrant while dropping collection")?;
        if !response.status().is_success() && response.status() != StatusCode::NOT_FOUND {
            tracing::warn!(
                "qdrant refused to drop collection {}: {}",
                self.collection,
                response.status()
            );
        }
        *self.known_vector_size.write().await = None;

        self.ensure_collection(vector_size).await
    }

    pub async fn ensure_collection(&self, vector_size: usize) -> Result<()> {
        if *self.known_vector_size.read().await == Some(vector_size) {
            return Ok(());
        }

        let request = CreateCollection {
            vectors: VectorParams {
                size: vector_size,
                distance: "Cosine",
            },
        };
        let response = self
            .client
            .put(self.collection_url())
            .json(&request)
            .send()
            .await;
        checked(response, "create collection").await?;

        *self.known_vector_size.write().await = Some(vector_size);
        Ok(())
    }

    /// Size and point count of the existing collection, or `None` when it does
    /// not exist.
    pub async fn collection_stats(&self) -> Result<Option<CollectionStats>> {
        let response = self
            .client
            .get(self.collection_url())
            .send()
            .await
            .context("failed to contact qdrant while reading collection info")?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let info: QdrantCollectionResponse = checked(Ok(response), "collection info")
            .await?
            .json()
            .await
            .context("failed to decode qdrant collection info")?;

        let stats = CollectionStats {
            vector_size: info.result.config.params.vectors.size,
            points_count: info.result.points_count,
        };
        *self.known_vector_size.write().await = Some(stats.vector_size);
        Ok(Some(stats))
    }

    pub async fn upsert_points(&self, points: &[QdrantPoint]) -> Result<()> {
        let Some(first) = points.first() else {
            return Ok(());
        };
        self.ensure_collection(first.vector.len()).await?;

        let response = self
            .client
            .put(format!("{}/points?wait=true", self.collection_url()))
            .json(&UpsertPoints { points })
            .send()
            .await;
        checked(response, "upsert").await?;
        Ok(())
    }

    pub async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<VectorHit>> {
        if vector.is_empty() || limit == 0 {
            return Ok(vec![]);
        }

        let response = self
            .client
            .post(format!("{}/points/search", self.collection_url()))
            .json(&SearchPoints {
                vector,
                limit,
                with_payload: true,
            })
            .send()
            .await;
        let found: QdrantSearchResponse = checked(response, "search")
            .await?
            .json()
            .await
            .context("failed to decode qdrant search response")?;

        Ok(found
            .result
            .into_iter()
            .filter_map(|point| {
                point.payload.map(|payload| VectorHit {
                    chunk_id: payload.chunk_id,
                    score: point.score,
                })
            })
            .collect())
    }
}

/// Turns transport failures and non-2xx replies into errors naming `action`.
async fn checked(
    response: reqwest::Result<reqwest::Response>,
    action: &str,
) -> Result<reqwest::Response> {
    let response = response.with_context(|| format!("failed to contact qdrant during {action}"))?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    anyhow::bail!("qdrant {action} returned {status}: {}", body.trim())
}

#[derive(Serialize)]
struct CreateCollection {
    vectors: VectorParams,
}

#[derive(Serialize)]
struct VectorParams {
    size: usize,
    distance: &'static str,
}

#[derive(Serialize)]
struct UpsertPoints<'a> {
    points: &'a [QdrantPoint],
}

#[derive(Serialize)]
struct SearchPoints<'a> {
    vector: &'a [f32],
    limit: usize,
    with_payload: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct QdrantPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: QdrantPayload,
}

impl QdrantPoint {
    pub fn for_chunk(chunk: &Chunk, vector: Vec<f32>) -> Self {
        Self {
            id: chunk.id.clone(),
            vector,
            payload: QdrantPayload {
                chunk_id: chunk.id.clone(),
                kind: chunk.kind.as_str().to_string(),
                source_path: chunk.source_path.clone(),
                section: chunk.section.clone(),
                page: chunk.page,
            },
        }
    }
}

/// Only `chunk_id` is read back; the other fields make the collection readable
/// when browsed directly in Qdrant.
#[derive(Debug, Clone, Serialize)]
pub struct QdrantPayload {
    pub chunk_id: String,
    pub kind: String,
    pub source_path: String,
    pub section: Option<String>,
    pub page: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct QdrantSearchResponse {
    result: Vec<QdrantResultPoint>,
}

#[derive(Debug, Deserialize)]
struct QdrantResultPoint {
    score: f32,
    payload: Option<HitPayload>,
}

#[derive(Debug, Deserialize)]
struct HitPayload {
    chunk_id: String,
}

#[derive(Debug, Deserialize)]
struct QdrantCollectionResponse {
    result: QdrantCollectionInfo,
}

#[derive(Debug, Deserialize)]
struct QdrantCollectionInfo {
    #[serde(default)]
    points_count: Option<u64>,
    config: QdrantCollectionConfig,
}

#[derive(Debug, Deserialize)]
struct QdrantCollectionConfig {
    params: QdrantCollectionParams,
}

#[derive(Debug, Deserialize)]
struct QdrantCollectionParams {
    vectors: QdrantVectorParams,
}

#[derive(Debug, Deserialize)]
struct QdrantVectorParams {
    size: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceType;

    #[test]
    fn point_payload_carries_chunk_metadata() {
        let chunk = Chunk {
            id: "3f1c2a4e-0000-4000-8000-000000000001".to_string(),
            content: "Clear fluids are allowed up to two hours before.".to_string(),
            kind: SourceType::PdfText,
            source_path: "prep/guide.pdf".to_string(),
            title: "guide".to_string(),
            section: None,
            page: Some(4),
            token_count: 9,
            source_hash: "h".to_string(),
        };

        let point = QdrantPoint::for_chunk(&chunk, vec![0.1, 0.2]);
        let value = serde_json::to_value(&point).unwrap();
        assert_eq!(value["id"], chunk.id.as_str());
        assert_eq!(value["payload"]["chunk_id"], chunk.id.as_str());
        assert_eq!(value["payload"]["kind"], "pdf_text");
        assert_eq!(value["payload"]["page"], 4);
    }

    #[test]
    fn create_collection_uses_cosine_distance() {
        let value = serde_json::to_value(CreateCollection {
            vectors: VectorParams {
                size: 768,
                distance: "Cosine",
            },
        })
        .unwrap();
        assert_eq!(
            value,
            serde_json::json!({ "vectors": { "size": 768, "distance": "Cosine" } })
        );
    }

    #[test]
    fn decodes_collection_size_and_point_count() {
        let body = r#"{"result":{"status":"green","points_count":42,"config":{"params":{"vectors":{"size":768,"distance":"Cosine"}}}},"status":"ok","time":0.001}"#;
        let parsed: QdrantCollectionResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.result.config.params.vectors.size, 768);
        assert_eq!(parsed.result.points_count, Some(42));

        let uncounted = r#"{"result":{"config":{"params":{"vectors":{"size":8}}}}}"#;
        let parsed: QdrantCollectionResponse = serde_json::from_str(uncounted).unwrap();
        assert_eq!(parsed.result.points_count, None);
    }

    #[test]
    fn search_hits_need_only_chunk_id() {
        let body = r#"{"result":[{"id":"p1","score":0.8,"payload":{"chunk_id":"c1"}},{"id":"p2","score":0.5}]}"#;
        let parsed: QdrantSearchResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.result[0].payload.as_ref().map(|p| p.chunk_id.as_str()), Some("c1"));
        assert!(parsed.result[1].payload.is_none());
    }
}
