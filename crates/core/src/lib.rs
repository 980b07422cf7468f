pub mod chunking;
pub mod corpus;
pub mod embeddings;
pub mod error;
pub mod index;
pub mod models;
pub mod retrieval;
pub mod synthesis;

pub use chunking::{window_ranges, TokenChunker};
pub use corpus::{decode_document, CorpusSnapshot, RagEngine};
pub use embeddings::{EmbeddingClient, OpenAiEmbedder, EMBED_BATCH_SIZE};
pub use error::{EmbeddingError, IndexError, QueryError, SynthesisError, UploadError};
pub use index::FlatL2Index;
pub use models::{
    Chunk, ChunkingOptions, CorpusStatus, QueryOutcome, UploadReceipt,
};
pub use retrieval::retrieve;
pub use synthesis::{
    build_prompt, synthesize, ChatClient, OpenAiChatClient, ANSWER_MAX_TOKENS,
    ANSWER_TEMPERATURE, FALLBACK_ANSWER,
};
