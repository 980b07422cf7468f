use thiserror::Error;

/// Failures while loading a document into the corpus. None of these leave
/// the previously loaded document mutated.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("document bytes are not valid utf-8: {0}")]
    Decode(#[from] std::string::FromUtf8Error),

    #[error("tokenizer unavailable: {0}")]
    Tokenizer(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    IndexBuild(#[from] IndexError),
}

/// Failures while answering a query. The corpus is never mutated by a query.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("no document loaded")]
    NoDocumentLoaded,

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Synthesis(#[from] SynthesisError),
}

/// Any embedding call failure, including a partial-batch failure, aborts the
/// whole embedding operation. No retries happen at this layer.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("embedding service rejected request ({status}): {detail}")]
    Service { status: u16, detail: String },

    #[error("embedding response malformed: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("chat service rejected request ({status}): {detail}")]
    Service { status: u16, detail: String },

    #[error("chat response malformed: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("embedding dimension {found} does not match expected {expected}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("index holds {vectors} vectors for {chunks} chunks")]
    CountMismatch { vectors: usize, chunks: usize },
}

pub type Result<T, E = UploadError> = std::result::Result<T, E>;
