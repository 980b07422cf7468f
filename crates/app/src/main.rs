use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::header::{AUTHORIZATION, CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use voicerag_core::{
    decode_document, ChunkingOptions, OpenAiChatClient, OpenAiEmbedder, QueryError, RagEngine,
    UploadError,
};

/// Timeout retries for the speech proxy. Retry policy lives only here, the
/// core pipeline never retries.
const TTS_MAX_RETRIES: usize = 2;

#[derive(Parser)]
#[command(name = "voicerag-api", version)]
struct Cli {
    /// Address to bind the HTTP server to (host:port).
    #[arg(long, env = "VOICERAG_BIND", default_value = "0.0.0.0:8000")]
    bind: String,

    /// OpenAI API key used for embeddings and chat completions.
    #[arg(long, env = "OPENAI_API_KEY")]
    openai_api_key: String,

    /// Base URL for OpenAI-compatible endpoints.
    #[arg(long, env = "VOICERAG_OPENAI_BASE", default_value = "https://api.openai.com/v1")]
    openai_base_url: String,

    /// Embedding model identifier.
    #[arg(long, env = "VOICERAG_EMBEDDING_MODEL", default_value = "text-embedding-3-small")]
    embedding_model: String,

    /// Chat completion model identifier.
    #[arg(long, env = "VOICERAG_CHAT_MODEL", default_value = "gpt-3.5-turbo")]
    chat_model: String,

    /// Seconds before embedding/chat requests time out.
    #[arg(long, env = "VOICERAG_OPENAI_TIMEOUT_SECS", default_value_t = 30)]
    openai_timeout_secs: u64,

    /// Deepgram API key handed to the voice frontend and used by the TTS proxy.
    #[arg(long, env = "DEEPGRAM_API_KEY")]
    deepgram_api_key: Option<String>,

    /// Deepgram speak endpoint base URL.
    #[arg(long, env = "VOICERAG_DEEPGRAM_BASE", default_value = "https://api.deepgram.com")]
    deepgram_base_url: String,

    /// Default top-k when the client does not override it.
    #[arg(long, default_value_t = 5)]
    default_top_k: usize,
}

#[derive(Clone)]
struct AppState {
    engine: Arc<RagEngine<OpenAiEmbedder, OpenAiChatClient>>,
    deepgram_key: Option<String>,
    deepgram_base_url: String,
    tts_client: reqwest::Client,
    default_top_k: usize,
}

#[derive(Debug, Deserialize)]
struct UploadParams {
    title: String,
}

#[derive(Debug, Serialize)]
struct UploadResponse {
    status: String,
    document_title: String,
    chunks_count: usize,
    message: String,
}

#[derive(Debug, Deserialize)]
struct QueryRequest {
    query: String,
    #[serde(default)]
    top_k: Option<usize>,
}

#[derive(Debug, Serialize)]
struct QueryResponse {
    answer: String,
    retrieved_chunks: Vec<voicerag_core::Chunk>,
}

#[derive(Debug, Deserialize)]
struct TtsRequest {
    text: String,
    #[serde(default = "default_tts_model")]
    model: String,
}

fn default_tts_model() -> String {
    "aura-asteria-en".to_string()
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    detail: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let timeout = Duration::from_secs(cli.openai_timeout_secs.max(1));

    let embedder = OpenAiEmbedder::new(
        &cli.openai_api_key,
        &cli.openai_base_url,
        &cli.embedding_model,
        Some(timeout),
    )?;
    let chat = OpenAiChatClient::new(
        &cli.openai_api_key,
        &cli.openai_base_url,
        &cli.chat_model,
        Some(timeout),
    )?;
    let engine = RagEngine::new(embedder, chat, ChunkingOptions::default())?;

    // Longer budget than the core clients: spoken audio for a full answer
    // takes a while to render.
    let tts_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(60))
        .build()
        .context("failed to build TTS HTTP client")?;

    let state = AppState {
        engine: Arc::new(engine),
        deepgram_key: cli.deepgram_api_key,
        deepgram_base_url: cli.deepgram_base_url.trim_end_matches('/').to_string(),
        tts_client,
        default_top_k: cli.default_top_k.max(1),
    };

    let app = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/upload-document", post(upload_document))
        .route("/query", post(query_document))
        .route("/api-keys", get(api_keys))
        .route("/tts", post(text_to_speech))
        .with_state(state);

    let addr: SocketAddr = cli
        .bind
        .parse()
        .with_context(|| format!("invalid bind address {}", cli.bind))?;
    info!(%addr, version = env!("CARGO_PKG_VERSION"), "voicerag-api boot");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app).await.context("server shutdown")?;
    Ok(())
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({ "message": "Voice RAG API is running" }))
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let status = state.engine.status().await;
    Json(json!({
        "status": "healthy",
        "document_loaded": status.document_loaded,
        "chunks_count": status.chunks_count,
        "document_title": status.document_title,
    }))
}

async fn upload_document(
    State(state): State<AppState>,
    Query(params): Query<UploadParams>,
    body: Bytes,
) -> Result<Json<UploadResponse>, (StatusCode, Json<ErrorBody>)> {
    let title = params
        .title
        .trim_end_matches(".txt")
        .trim()
        .to_string();
    info!(title = %title, bytes = body.len(), "processing document upload");

    let text = decode_document(body.to_vec()).map_err(upload_error)?;
    let receipt = state
        .engine
        .upload(&text, &title)
        .await
        .map_err(upload_error)?;

    info!(
        title = %receipt.document_title,
        chunks = receipt.chunks_count,
        "document indexed"
    );

    Ok(Json(UploadResponse {
        status: "success".to_string(),
        document_title: receipt.document_title.clone(),
        chunks_count: receipt.chunks_count,
        message: format!("Successfully processed {}", receipt.document_title),
    }))
}

async fn query_document(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, (StatusCode, Json<ErrorBody>)> {
    info!(query = %request.query, "received query");
    let top_k = request.top_k.unwrap_or(state.default_top_k).max(1);

    let outcome = state
        .engine
        .query(&request.query, top_k)
        .await
        .map_err(query_error)?;

    Ok(Json(QueryResponse {
        answer: outcome.answer,
        retrieved_chunks: outcome.retrieved_chunks,
    }))
}

async fn api_keys(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<ErrorBody>)> {
    let key = state
        .deepgram_key
        .clone()
        .ok_or_else(|| internal_error("Deepgram API key not found"))?;
    Ok(Json(json!({ "deepgram_api_key": key })))
}

async fn text_to_speech(
    State(state): State<AppState>,
    Json(request): Json<TtsRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorBody>)> {
    let key = state
        .deepgram_key
        .clone()
        .ok_or_else(|| internal_error("Deepgram API key not found"))?;

    let url = format!(
        "{}/v1/speak?model={}&encoding=linear16&container=wav",
        state.deepgram_base_url, request.model
    );

    let mut attempt = 0usize;
    loop {
        info!(
            attempt = attempt + 1,
            text_len = request.text.len(),
            "proxying TTS request"
        );

        let response = state
            .tts_client
            .post(&url)
            .header(AUTHORIZATION, format!("Token {key}"))
            .json(&json!({ "text": request.text }))
            .send()
            .await;

        match response {
            Ok(response) => {
                let status = response.status();
                if !status.is_success() {
                    let detail = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "<body unavailable>".to_string());
                    warn!(status = status.as_u16(), "speech service rejected TTS request");
                    return Err((
                        StatusCode::from_u16(status.as_u16())
                            .unwrap_or(StatusCode::BAD_GATEWAY),
                        Json(ErrorBody {
                            detail: format!("TTS error: {detail}"),
                        }),
                    ));
                }

                let audio = response
                    .bytes()
                    .await
                    .map_err(|error| internal_error(format!("TTS body error: {error}")))?;
                info!(bytes = audio.len(), "TTS audio generated");

                return Ok((
                    [
                        (CONTENT_TYPE, "audio/wav"),
                        (CONTENT_DISPOSITION, "inline; filename=speech.wav"),
                    ],
                    audio,
                ));
            }
            Err(error) if error.is_timeout() && attempt < TTS_MAX_RETRIES => {
                attempt += 1;
                warn!(attempt, "TTS request timed out, retrying");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
            Err(error) if error.is_timeout() => {
                return Err((
                    StatusCode::GATEWAY_TIMEOUT,
                    Json(ErrorBody {
                        detail: "TTS request timed out after multiple attempts".to_string(),
                    }),
                ));
            }
            Err(error) => {
                return Err(internal_error(format!("TTS error: {error}")));
            }
        }
    }
}

fn upload_error(error: UploadError) -> (StatusCode, Json<ErrorBody>) {
    let status = match &error {
        UploadError::Decode(_) | UploadError::InvalidChunkConfig(_) => StatusCode::BAD_REQUEST,
        UploadError::Embedding(_) => StatusCode::BAD_GATEWAY,
        UploadError::Tokenizer(_) | UploadError::IndexBuild(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    warn!(%error, "upload failed");
    (
        status,
        Json(ErrorBody {
            detail: error.to_string(),
        }),
    )
}

fn query_error(error: QueryError) -> (StatusCode, Json<ErrorBody>) {
    let (status, detail) = match &error {
        QueryError::NoDocumentLoaded => (
            StatusCode::BAD_REQUEST,
            "No document loaded. Please upload a document first.".to_string(),
        ),
        QueryError::Embedding(_) | QueryError::Synthesis(_) => {
            (StatusCode::BAD_GATEWAY, error.to_string())
        }
        QueryError::Index(_) => (StatusCode::INTERNAL_SERVER_ERROR, error.to_string()),
    };
    warn!(%error, "query failed");
    (status, Json(ErrorBody { detail }))
}

fn internal_error(detail: impl Into<String>) -> (StatusCode, Json<ErrorBody>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody {
            detail: detail.into(),
        }),
    )
}
