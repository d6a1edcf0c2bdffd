use std::cmp::Ordering;
use std::collections::HashMap;

use anyhow::Result;

use crate::models::RetrievalResult;
use crate::qdrant_store::VectorHit;
use crate::vector_db::VectorDb;

const MIN_RECALL_K: usize = 24;
const RRF_K: f32 = 60.0;

/// Hybrid retriever: Qdrant vector recall and Tantivy BM25 recall fused by
/// reciprocal rank.
#[derive(Clone)]
pub struct Retriever {
    vector_db: VectorDb,
    top_k: usize,
}

impl Retriever {
    pub fn new(vector_db: VectorDb, top_k: usize) -> Self {
        Self {
            vector_db,
            top_k: top_k.max(1),
        }
    }

    pub async fn retrieve(&self, query: &str) -> Result<Vec<RetrievalResult>> {
        let embedding = self.vector_db.embedding.embed(query).await?;
        let recall_k = self.top_k.saturating_mul(3).max(MIN_RECALL_K);
        let qdrant_fut = self.vector_db.qdrant.search(&embedding, recall_k);

        let tantivy = self.vector_db.tantivy.clone();
        let query_text = query.to_string();
        let bm25_fut = tokio::task::spawn_blocking(move || tantivy.search(&query_text, recall_k));

        let (vector_hits, bm25_hits) = tokio::join!(qdrant_fut, bm25_fut);

        let vector_hits = vector_hits.unwrap_or_else(|err| {
            tracing::warn!("vector recall failed: {:#}", err);
            vec![]
        });
        let bm25_hits = match bm25_hits {
            Ok(Ok(hits)) => hits,
            Ok(Err(err)) => {
                tracing::warn!("bm25 recall failed: {:#}", err);
                vec![]
            }
            Err(err) => {
                tracing::warn!("bm25 recall task panicked: {}", err);
                vec![]
            }
        };

        let ranked = fuse_rankings(&vector_hits, &bm25_hits, fusion_weights_for_query(query));
        let selected_ids: Vec<String> = ranked
            .iter()
            .take(self.top_k)
            .map(|(chunk_id, _)| chunk_id.clone())
            .collect();

        let chunks = self.vector_db.db.get_chunks_by_ids(&selected_ids).await?;
        let score_map: HashMap<&str, f32> = ranked
            .iter()
            .map(|(chunk_id, score)| (chunk_id.as_str(), *score))
            .collect();

        let mut out: Vec<RetrievalResult> = chunks
            .into_iter()
            .map(|chunk| RetrievalResult {
                score: *score_map.get(chunk.id.as_str()).unwrap_or(&0.0),
                chunk,
            })
            .collect();

        out.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        tracing::debug!(
            "retrieved {} chunks (vector={}, bm25={})",
            out.len(),
            vector_hits.len(),
            bm25_hits.len()
        );
        Ok(out)
    }
}

/// Weighted reciprocal-rank fusion, best first.
fn fuse_rankings(
    vector_hits: &[VectorHit],
    bm25_hits: &[(String, f32)],
    (vector_weight, bm25_weight): (f32, f32),
) -> Vec<(String, f32)> {
    let mut fused_scores: HashMap<String, f32> = HashMap::new();

    for (rank, hit) in vector_hits.iter().enumerate() {
        let rank_score = vector_weight / (RRF_K + (rank + 1) as f32);
        let similarity_bonus = hit.score.clamp(0.0, 1.0) * 0.04;
        *fused_scores.entry(hit.chunk_id.clone()).or_insert(0.0) += rank_score + similarity_bonus;
    }

    for (rank, (chunk_id, raw_score)) in bm25_hits.iter().enumerate() {
        let rank_score = bm25_weight / (RRF_K + (rank + 1) as f32);
        let lexical_bonus = raw_score.max(0.0).ln_1p() * 0.012;
        *fused_scores.entry(chunk_id.clone()).or_insert(0.0) += rank_score + lexical_bonus;
    }

    let mut ranked: Vec<(String, f32)> = fused_scores.into_iter().collect();
    ranked.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    ranked
}

/// Exact-detail questions (timings, doses, drug names) lean on BM25; questions
/// about feelings or reasons lean on vectors.
fn fusion_weights_for_query(query: &str) -> (f32, f32) {
    let lower = query.to_ascii_lowercase();
    let lexical_intent = [
        "how long",
        "how many",
        "how much",
        "hours",
        "days",
        "minutes",
        "mg",
        "dose",
        "dosage",
        "medication",
        "aspirin",
        "metformin",
        "insulin",
        "warfarin",
        "clopidogrel",
        "laxative",
        "bowel prep",
        "when can",
        "when should",
    ]
    .iter()
    .any(|term| lower.contains(term));

    let semantic_intent = [
        "why",
        "feel",
        "nervous",
        "anxious",
        "worried",
        "scared",
        "afraid",
        "pain",
        "normal",
        "safe",
    ]
    .iter()
    .any(|term| lower.contains(term));

    let entity_signal = query.chars().any(|c| c.is_ascii_digit())
        || query
            .split_whitespace()
            .any(|tok| tok.chars().skip(1).any(|c| c.is_ascii_uppercase()));

    if lexical_intent || entity_signal {
        (0.95, 1.35)
    } else if semantic_intent {
        (1.2, 0.95)
    } else {
        (1.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(id: &str, score: f32) -> VectorHit {
        VectorHit {
            chunk_id: id.to_string(),
            score,
        }
    }

    #[test]
    fn chunks_found_by_both_retrievers_rank_first() {
        let vector = vec![hit("a", 0.82), hit("shared", 0.80)];
        let bm25 = vec![("b".to_string(), 7.5), ("shared".to_string(), 6.0)];

        let ranked = fuse_rankings(&vector, &bm25, (1.0, 1.0));
        assert_eq!(ranked[0].0, "shared");
        assert_eq!(ranked.len(), 3);
    }

    #[test]
    fn empty_inputs_fuse_to_nothing() {
        assert!(fuse_rankings(&[], &[], (1.0, 1.0)).is_empty());
    }

    #[test]
    fn weights_follow_query_intent() {
        assert_eq!(
            fusion_weights_for_query("How long should I fast before a colonoscopy?"),
            (0.95, 1.35)
        );
        assert_eq!(
            fusion_weights_for_query("I'm nervous about my endoscopy"),
            (1.2, 0.95)
        );
        assert_eq!(
            fusion_weights_for_query("what is an endoscopy"),
            (1.0, 1.0)
        );
    }

    #[test]
    fn bm25_weight_breaks_single_source_ties() {
        let vector = vec![hit("v", 0.0)];
        let bm25 = vec![("l".to_string(), 0.0)];

        let ranked = fuse_rankings(&vector, &bm25, (0.95, 1.35));
        assert_eq!(ranked[0].0, "l");
    }
}
