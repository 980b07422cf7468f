use crate::error::SynthesisError;
use crate::models::Chunk;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Returned verbatim when retrieval produced nothing; the language model is
/// not called in that case.
pub const FALLBACK_ANSWER: &str = "I cannot find relevant information in the document.";

pub const ANSWER_TEMPERATURE: f32 = 0.3;
pub const ANSWER_MAX_TOKENS: u32 = 200;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Single-prompt chat completion against an external language model.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete(
        &self,
        prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, SynthesisError>;
}

/// Builds the grounded prompt: every retrieved chunk labeled with its
/// document title and chunk id, the verbatim question, then the fixed
/// instruction block constraining the model to the supplied context.
pub fn build_prompt(query: &str, retrieved: &[Chunk]) -> String {
    let context = retrieved
        .iter()
        .map(|chunk| {
            format!(
                "[{} - Chunk {}]\n{}",
                chunk.doc_title, chunk.chunk_id, chunk.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "You are a helpful assistant that answers questions based ONLY on the provided context.\n\
         \n\
         Context:\n\
         {context}\n\
         \n\
         Question: {query}\n\
         \n\
         Instructions:\n\
         - Answer the question using ONLY information from the context above.\n\
         - If the answer cannot be found in the context, say \"I cannot find this information in the provided document.\"\n\
         - Be concise, clear, and accurate.\n\
         - Keep your answer conversational and natural for voice output.\n\
         - Keep responses under 100 words.\n\
         \n\
         Answer:"
    )
}

/// Produces a grounded answer for `query` from the retrieved chunks.
///
/// Callers must not invoke this with an empty `retrieved` slice; substitute
/// [`FALLBACK_ANSWER`] instead of spending a model call.
pub async fn synthesize(
    chat: &impl ChatClient,
    query: &str,
    retrieved: &[Chunk],
) -> Result<String, SynthesisError> {
    let prompt = build_prompt(query, retrieved);
    chat.complete(&prompt, ANSWER_TEMPERATURE, ANSWER_MAX_TOKENS)
        .await
}

/// Chat client for OpenAI-compatible `/chat/completions` endpoints.
pub struct OpenAiChatClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl OpenAiChatClient {
    pub fn new(
        api_key: &str,
        base_url: &str,
        model: &str,
        timeout: Option<Duration>,
    ) -> Result<Self, SynthesisError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key.trim())).map_err(|_| {
                SynthesisError::Malformed("api key is not a valid header value".to_string())
            })?,
        );

        let client = reqwest::Client::builder()
            .timeout(timeout.unwrap_or(DEFAULT_TIMEOUT))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl ChatClient for OpenAiChatClient {
    async fn complete(
        &self,
        prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, SynthesisError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature,
            max_tokens,
        };

        let response = self.client.post(&self.endpoint).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let detail = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(SynthesisError::Service {
                status: status.as_u16(),
                detail,
            });
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| SynthesisError::Malformed("response carried no choices".to_string()))
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}
