use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A token-bounded excerpt of the loaded document.
///
/// Chunks are immutable once produced and owned by the corpus snapshot;
/// they are replaced wholesale when a new document is uploaded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    pub doc_title: String,
    /// 0-based position within the document, contiguous for one upload.
    pub chunk_id: usize,
    pub token_count: usize,
}

/// Token-window parameters for the chunker.
#[derive(Debug, Clone, Copy)]
pub struct ChunkingOptions {
    pub min_tokens: usize,
    pub max_tokens: usize,
    pub overlap: usize,
}

impl Default for ChunkingOptions {
    fn default() -> Self {
        Self {
            min_tokens: 300,
            max_tokens: 500,
            overlap: 50,
        }
    }
}

impl ChunkingOptions {
    /// Window stride between consecutive chunks.
    pub fn stride(&self) -> usize {
        self.max_tokens.saturating_sub(self.overlap)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub document_title: String,
    pub chunks_count: usize,
    pub uploaded_at: DateTime<Utc>,
}

/// Read-only view of the corpus used by the health endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusStatus {
    pub document_loaded: bool,
    pub chunks_count: usize,
    pub document_title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryOutcome {
    pub answer: String,
    pub retrieved_chunks: Vec<Chunk>,
}
