use crate::corpus::CorpusSnapshot;
use crate::embeddings::EmbeddingClient;
use crate::error::QueryError;
use crate::models::Chunk;
use tracing::{debug, warn};

/// Embeds `query`, searches the snapshot's index, and maps the returned
/// positions back to chunk records. Positions outside the chunk sequence are
/// skipped rather than faulting.
///
/// Callers are responsible for checking that a document is loaded; this
/// function operates on a snapshot that already exists.
pub async fn retrieve(
    embedder: &impl EmbeddingClient,
    snapshot: &CorpusSnapshot,
    query: &str,
    top_k: usize,
) -> Result<Vec<Chunk>, QueryError> {
    let query_vector = embedder.embed_one(query).await?;
    let hits = snapshot
        .index
        .search(&query_vector, top_k.min(snapshot.chunks.len()))?;

    debug!(hits = hits.len(), top_k, "vector search complete");

    let mut retrieved = Vec::with_capacity(hits.len());
    for (position, distance) in hits {
        match snapshot.chunks.get(position) {
            Some(chunk) => retrieved.push(chunk.clone()),
            None => warn!(position, distance, "index position outside chunk sequence"),
        }
    }

    Ok(retrieved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EmbeddingError;
    use crate::index::FlatL2Index;
    use async_trait::async_trait;

    struct FixedEmbedder {
        vector: Vec<f32>,
    }

    #[async_trait]
    impl EmbeddingClient for FixedEmbedder {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok(texts.iter().map(|_| self.vector.clone()).collect())
        }
    }

    fn chunk(id: usize) -> Chunk {
        Chunk {
            text: format!("passage {id}"),
            doc_title: "manual".to_string(),
            chunk_id: id,
            token_count: 2,
        }
    }

    fn snapshot(vectors: Vec<Vec<f32>>) -> CorpusSnapshot {
        let chunks = (0..vectors.len()).map(chunk).collect();
        CorpusSnapshot {
            index: FlatL2Index::build(vectors).expect("build"),
            chunks,
            doc_title: "manual".to_string(),
        }
    }

    #[tokio::test]
    async fn returns_all_chunks_ordered_by_distance_when_top_k_exceeds_corpus() {
        let snapshot = snapshot(vec![
            vec![4.0, 0.0],
            vec![1.0, 0.0],
            vec![2.0, 0.0],
        ]);
        let embedder = FixedEmbedder {
            vector: vec![0.0, 0.0],
        };

        let retrieved = retrieve(&embedder, &snapshot, "question", 5)
            .await
            .expect("retrieve");

        let ids: Vec<usize> = retrieved.iter().map(|chunk| chunk.chunk_id).collect();
        assert_eq!(ids, vec![1, 2, 0]);
    }

    #[tokio::test]
    async fn respects_top_k_bound() {
        let snapshot = snapshot(vec![vec![1.0], vec![2.0], vec![3.0], vec![4.0]]);
        let embedder = FixedEmbedder { vector: vec![0.0] };

        let retrieved = retrieve(&embedder, &snapshot, "question", 2)
            .await
            .expect("retrieve");
        assert_eq!(retrieved.len(), 2);
    }

    #[tokio::test]
    async fn empty_snapshot_yields_empty_result_without_error() {
        let snapshot = snapshot(Vec::new());
        let embedder = FixedEmbedder { vector: vec![0.0] };

        let retrieved = retrieve(&embedder, &snapshot, "question", 5)
            .await
            .expect("retrieve");
        assert!(retrieved.is_empty());
    }
}
