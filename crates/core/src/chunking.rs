use crate::error::UploadError;
use crate::models::{Chunk, ChunkingOptions};
use tiktoken_rs::{cl100k_base, CoreBPE};

/// Splits raw document text into overlapping, token-bounded chunks.
///
/// Tokenization uses the cl100k BPE vocabulary so that token counts line up
/// with what the embedding model sees.
pub struct TokenChunker {
    bpe: CoreBPE,
}

impl TokenChunker {
    pub fn new() -> Result<Self, UploadError> {
        let bpe = cl100k_base().map_err(|error| UploadError::Tokenizer(error.to_string()))?;
        Ok(Self { bpe })
    }

    /// Tokenizes `text` and walks it with a window of `max_tokens` and a
    /// stride of `max_tokens - overlap`, decoding each emitted window back
    /// to text. A trailing window shorter than `min_tokens` is kept only at
    /// the true end of the text.
    pub fn chunk(
        &self,
        text: &str,
        doc_title: &str,
        options: &ChunkingOptions,
    ) -> Result<Vec<Chunk>, UploadError> {
        validate_options(options)?;

        let tokens = self.bpe.encode_ordinary(text);
        let mut chunks = Vec::new();

        for (chunk_id, (start, end)) in window_ranges(tokens.len(), options).into_iter().enumerate()
        {
            let window = tokens[start..end].to_vec();
            let token_count = window.len();
            let text = self
                .bpe
                .decode(window)
                .map_err(|error| UploadError::Tokenizer(error.to_string()))?;

            chunks.push(Chunk {
                text,
                doc_title: doc_title.to_string(),
                chunk_id,
                token_count,
            });
        }

        Ok(chunks)
    }
}

fn validate_options(options: &ChunkingOptions) -> Result<(), UploadError> {
    if options.max_tokens == 0 {
        return Err(UploadError::InvalidChunkConfig(
            "max_tokens must be positive".to_string(),
        ));
    }
    if options.min_tokens > options.max_tokens {
        return Err(UploadError::InvalidChunkConfig(format!(
            "min_tokens {} exceeds max_tokens {}",
            options.min_tokens, options.max_tokens
        )));
    }
    // overlap >= max - min would make the stride drop or starve the short
    // tail; rejecting it also guarantees a strictly positive stride.
    if options.overlap >= options.max_tokens - options.min_tokens && options.overlap != 0 {
        return Err(UploadError::InvalidChunkConfig(format!(
            "overlap {} must stay below max_tokens - min_tokens ({})",
            options.overlap,
            options.max_tokens - options.min_tokens
        )));
    }
    Ok(())
}

/// The pure window walk over a token sequence of length `len`.
///
/// Returns `[start, end)` token ranges in emission order. A window shorter
/// than `min_tokens` that is not the final one is skipped while the cursor
/// still advances by the stride.
pub fn window_ranges(len: usize, options: &ChunkingOptions) -> Vec<(usize, usize)> {
    let stride = options.stride().max(1);
    let mut ranges = Vec::new();
    let mut start = 0;

    while start < len {
        let end = (start + options.max_tokens).min(len);
        if end - start >= options.min_tokens || end == len {
            ranges.push((start, end));
        }
        start += stride;
    }

    ranges
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(min_tokens: usize, max_tokens: usize, overlap: usize) -> ChunkingOptions {
        ChunkingOptions {
            min_tokens,
            max_tokens,
            overlap,
        }
    }

    #[test]
    fn default_windows_over_1200_tokens() {
        let ranges = window_ranges(1200, &ChunkingOptions::default());
        assert_eq!(ranges, vec![(0, 500), (450, 950), (900, 1200)]);
    }

    #[test]
    fn short_final_window_is_kept() {
        let ranges = window_ranges(520, &options(300, 500, 50));
        assert_eq!(ranges, vec![(0, 500), (450, 520)]);
    }

    #[test]
    fn zero_length_input_yields_no_windows() {
        assert!(window_ranges(0, &ChunkingOptions::default()).is_empty());
    }

    #[test]
    fn windows_cover_every_token() {
        let opts = options(300, 500, 50);
        for len in [1, 299, 300, 500, 501, 950, 1200, 4999] {
            let ranges = window_ranges(len, &opts);
            let mut covered = 0usize;
            for (start, end) in ranges {
                assert!(start <= covered, "gap before token {start} at len {len}");
                covered = covered.max(end);
            }
            assert_eq!(covered, len, "tail uncovered at len {len}");
        }
    }

    #[test]
    fn overlap_at_least_window_spread_is_rejected() {
        let chunker = TokenChunker::new().expect("tokenizer");
        let result = chunker.chunk("some text", "doc", &options(300, 500, 200));
        assert!(matches!(result, Err(UploadError::InvalidChunkConfig(_))));
    }

    #[test]
    fn zero_max_tokens_is_rejected() {
        let chunker = TokenChunker::new().expect("tokenizer");
        let result = chunker.chunk("some text", "doc", &options(0, 0, 0));
        assert!(matches!(result, Err(UploadError::InvalidChunkConfig(_))));
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        let chunker = TokenChunker::new().expect("tokenizer");
        let chunks = chunker
            .chunk("", "doc", &ChunkingOptions::default())
            .expect("chunking");
        assert!(chunks.is_empty());
    }

    #[test]
    fn chunk_ids_are_contiguous_and_token_counts_match() {
        let chunker = TokenChunker::new().expect("tokenizer");
        let text = "The pressure relief valve opens at 350 bar. ".repeat(200);
        let opts = options(20, 40, 8);
        let chunks = chunker.chunk(&text, "manual", &opts).expect("chunking");

        assert!(chunks.len() > 1);
        for (position, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_id, position);
            assert_eq!(chunk.doc_title, "manual");
            assert!(chunk.token_count >= 1);
            assert!(chunk.token_count <= opts.max_tokens);
        }
    }

    #[test]
    fn tiny_document_becomes_one_chunk() {
        let chunker = TokenChunker::new().expect("tokenizer");
        let chunks = chunker
            .chunk("hello world", "note", &ChunkingOptions::default())
            .expect("chunking");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_id, 0);
        assert_eq!(chunks[0].text, "hello world");
    }
}
