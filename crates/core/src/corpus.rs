use crate::chunking::TokenChunker;
use crate::embeddings::EmbeddingClient;
use crate::error::{IndexError, QueryError, UploadError};
use crate::index::FlatL2Index;
use crate::models::{Chunk, ChunkingOptions, CorpusStatus, QueryOutcome, UploadReceipt};
use crate::retrieval;
use crate::synthesis::{self, ChatClient, FALLBACK_ANSWER};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

/// Immutable view of one fully ingested document: the chunk records, the
/// vector index built over them, and the title. Queries run against a clone
/// of the `Arc` without further locking.
#[derive(Debug)]
pub struct CorpusSnapshot {
    pub index: FlatL2Index,
    pub chunks: Vec<Chunk>,
    pub doc_title: String,
}

/// Decodes uploaded document bytes, rejecting anything that is not UTF-8.
pub fn decode_document(bytes: Vec<u8>) -> Result<String, UploadError> {
    Ok(String::from_utf8(bytes)?)
}

/// Orchestrates the single-document corpus: uploads stage a complete new
/// snapshot and swap it in atomically; queries read whichever snapshot is
/// current.
///
/// Uploads are mutually exclusive with each other via an internal gate, but
/// external calls never run under the state lock, so a failing embedding
/// request cannot wedge concurrent queries. A failed upload leaves the
/// previous snapshot untouched.
pub struct RagEngine<E, C> {
    embedder: E,
    chat: C,
    chunker: TokenChunker,
    options: ChunkingOptions,
    upload_gate: Mutex<()>,
    state: RwLock<Option<Arc<CorpusSnapshot>>>,
}

impl<E, C> RagEngine<E, C>
where
    E: EmbeddingClient,
    C: ChatClient,
{
    pub fn new(embedder: E, chat: C, options: ChunkingOptions) -> Result<Self, UploadError> {
        Ok(Self {
            embedder,
            chat,
            chunker: TokenChunker::new()?,
            options,
            upload_gate: Mutex::new(()),
            state: RwLock::new(None),
        })
    }

    /// Replaces the corpus with `text` under `title`: chunk, embed, build
    /// the index, then swap. Any failure before the swap leaves the prior
    /// document loaded and queryable.
    pub async fn upload(&self, text: &str, title: &str) -> Result<UploadReceipt, UploadError> {
        let _gate = self.upload_gate.lock().await;

        let chunks = self.chunker.chunk(text, title, &self.options)?;
        info!(title, chunks = chunks.len(), "document chunked");

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;

        if embeddings.len() != chunks.len() {
            return Err(UploadError::IndexBuild(IndexError::CountMismatch {
                vectors: embeddings.len(),
                chunks: chunks.len(),
            }));
        }

        let index = FlatL2Index::build(embeddings)?;
        info!(
            title,
            vectors = index.len(),
            dimension = index.dimension(),
            "vector index built"
        );

        let snapshot = Arc::new(CorpusSnapshot {
            index,
            chunks,
            doc_title: title.to_string(),
        });

        let receipt = UploadReceipt {
            document_title: snapshot.doc_title.clone(),
            chunks_count: snapshot.chunks.len(),
            uploaded_at: Utc::now(),
        };

        // The only write-lock section: queries see either the old snapshot
        // or this one, never a mix.
        *self.state.write().await = Some(snapshot);

        Ok(receipt)
    }

    /// Answers `query` from the loaded document. Rejected before any
    /// external call when no document is loaded; an empty retrieval yields
    /// the fixed fallback answer without invoking the language model.
    pub async fn query(&self, query: &str, top_k: usize) -> Result<QueryOutcome, QueryError> {
        let snapshot = self
            .snapshot()
            .await
            .ok_or(QueryError::NoDocumentLoaded)?;

        let retrieved = retrieval::retrieve(&self.embedder, &snapshot, query, top_k).await?;
        debug!(retrieved = retrieved.len(), "chunks retrieved");

        if retrieved.is_empty() {
            return Ok(QueryOutcome {
                answer: FALLBACK_ANSWER.to_string(),
                retrieved_chunks: Vec::new(),
            });
        }

        let answer = synthesis::synthesize(&self.chat, query, &retrieved).await?;
        Ok(QueryOutcome {
            answer,
            retrieved_chunks: retrieved,
        })
    }

    /// The current snapshot, if a document is loaded.
    pub async fn snapshot(&self) -> Option<Arc<CorpusSnapshot>> {
        self.state.read().await.clone()
    }

    pub async fn status(&self) -> CorpusStatus {
        match self.snapshot().await {
            Some(snapshot) => CorpusStatus {
                document_loaded: true,
                chunks_count: snapshot.chunks.len(),
                document_title: snapshot.doc_title.clone(),
            },
            None => CorpusStatus {
                document_loaded: false,
                chunks_count: 0,
                document_title: String::new(),
            },
        }
    }
}
