use crate::error::EmbeddingError;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Inputs per upstream embedding request.
pub const EMBED_BATCH_SIZE: usize = 100;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Maps text to fixed-dimension dense vectors via an external service.
///
/// The output dimension is whatever the model returns; callers must read it
/// from the first vector rather than assume it.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Embeds every text, preserving input order. Any upstream failure
    /// aborts the whole operation; no partial results are returned.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| EmbeddingError::Malformed("service returned no vector".to_string()))
    }
}

/// Embedding client for OpenAI-compatible `/embeddings` endpoints.
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl OpenAiEmbedder {
    pub fn new(
        api_key: &str,
        base_url: &str,
        model: &str,
        timeout: Option<Duration>,
    ) -> Result<Self, EmbeddingError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key.trim())).map_err(|_| {
                EmbeddingError::Malformed("api key is not a valid header value".to_string())
            })?,
        );

        let client = reqwest::Client::builder()
            .timeout(timeout.unwrap_or(DEFAULT_TIMEOUT))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model: model.to_string(),
        })
    }

    async fn embed_group(&self, group: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: group,
        };

        let response = self.client.post(&self.endpoint).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let detail = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(EmbeddingError::Service {
                status: status.as_u16(),
                detail,
            });
        }

        let mut parsed: EmbeddingResponse = response.json().await?;
        if parsed.data.len() != group.len() {
            return Err(EmbeddingError::Malformed(format!(
                "{} vectors returned for {} inputs",
                parsed.data.len(),
                group.len()
            )));
        }
        parsed.data.sort_by_key(|entry| entry.index);

        Ok(parsed.data.into_iter().map(|entry| entry.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        embed_in_groups(texts, EMBED_BATCH_SIZE, |group| async move {
            self.embed_group(&group).await
        })
        .await
    }
}

/// Embeds `texts` in fixed-size groups through `embed_group`, concatenating
/// the results in input order. The first failing group aborts the whole
/// operation; later groups are never attempted.
async fn embed_in_groups<C, Fut>(
    texts: &[String],
    group_size: usize,
    mut embed_group: C,
) -> Result<Vec<Vec<f32>>, EmbeddingError>
where
    C: FnMut(Vec<String>) -> Fut,
    Fut: std::future::Future<Output = Result<Vec<Vec<f32>>, EmbeddingError>>,
{
    let mut vectors = Vec::with_capacity(texts.len());
    for group in texts.chunks(group_size.max(1)) {
        vectors.extend(embed_group(group.to_vec()).await?);
    }
    Ok(vectors)
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingEntry>,
}

#[derive(Deserialize)]
struct EmbeddingEntry {
    embedding: Vec<f32>,
    index: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[tokio::test]
    async fn grouping_splits_at_batch_size_and_preserves_input_order() {
        let texts: Vec<String> = (0..250).map(|value| value.to_string()).collect();
        let group_sizes = RefCell::new(Vec::new());

        let vectors = embed_in_groups(&texts, EMBED_BATCH_SIZE, |group| {
            group_sizes.borrow_mut().push(group.len());
            async move {
                Ok(group
                    .iter()
                    .map(|text| vec![text.parse::<f32>().expect("numeric input")])
                    .collect())
            }
        })
        .await
        .expect("embedding");

        assert_eq!(group_sizes.into_inner(), vec![100, 100, 50]);
        assert_eq!(vectors.len(), texts.len());
        for (position, vector) in vectors.iter().enumerate() {
            assert_eq!(vector, &vec![position as f32]);
        }
    }

    #[tokio::test]
    async fn failing_group_aborts_the_whole_operation() {
        let texts: Vec<String> = (0..250).map(|value| value.to_string()).collect();
        let calls = RefCell::new(0usize);

        let result = embed_in_groups(&texts, EMBED_BATCH_SIZE, |group| {
            *calls.borrow_mut() += 1;
            async move {
                if group.iter().any(|text| text == "150") {
                    return Err(EmbeddingError::Service {
                        status: 500,
                        detail: "synthetic outage".to_string(),
                    });
                }
                Ok(group.iter().map(|_| vec![0.0]).collect())
            }
        })
        .await;

        assert!(matches!(result, Err(EmbeddingError::Service { .. })));
        // First group succeeded, second failed, third never attempted.
        assert_eq!(calls.into_inner(), 2);
    }

    #[tokio::test]
    async fn empty_input_makes_no_group_calls() {
        let calls = RefCell::new(0usize);

        let vectors = embed_in_groups(&[], EMBED_BATCH_SIZE, |_group| {
            *calls.borrow_mut() += 1;
            async move { Ok(Vec::new()) }
        })
        .await
        .expect("embedding");

        assert!(vectors.is_empty());
        assert_eq!(calls.into_inner(), 0);
    }
}
