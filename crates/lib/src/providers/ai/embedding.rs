//! # Embeddings Provider
//!
//! Ad hoc (single-text) embeddings, used at query time. Bulk embeddings go
//! through the batch service instead; both must use the same model so query
//! vectors are comparable with indexed ones.
//!
//! Three request shapes are supported, chosen from the endpoint URL:
//! Vertex AI `:predict`, Gemini `embedContent` and OpenAI-compatible `/embeddings`.

use crate::errors::PromptError;
use async_trait::async_trait;
use dyn_clone::DynClone;
use reqwest::Client as ReqwestClient;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use tracing::debug;

// --- Vertex AI predict structures ---

#[derive(Serialize, Debug)]
struct VertexPredictRequest<'a> {
    instances: Vec<VertexInstance<'a>>,
}

#[derive(Serialize, Debug)]
struct VertexInstance<'a> {
    content: &'a str,
}

#[derive(Deserialize, Debug)]
struct VertexPredictResponse {
    predictions: Vec<VertexPrediction>,
}

#[derive(Deserialize, Debug)]
struct VertexPrediction {
    embeddings: EmbeddingValues,
}

#[derive(Deserialize, Debug)]
struct EmbeddingValues {
    values: Vec<f32>,
}

// --- Gemini structures ---

#[derive(Serialize, Debug)]
struct GeminiEmbeddingRequest<'a> {
    model: String,
    content: GeminiEmbeddingContent<'a>,
}

#[derive(Serialize, Debug)]
struct GeminiEmbeddingContent<'a> {
    parts: Vec<GeminiEmbeddingPart<'a>>,
}

#[derive(Serialize, Debug)]
struct GeminiEmbeddingPart<'a> {
    text: &'a str,
}

#[derive(Deserialize, Debug)]
struct GeminiEmbeddingResponse {
    embedding: EmbeddingValues,
}

// --- OpenAI-compatible structures ---

#[derive(Serialize, Debug)]
struct OpenAIEmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize, Debug)]
struct OpenAIEmbeddingResponse {
    data: Vec<OpenAIEmbeddingData>,
}

#[derive(Deserialize, Debug)]
struct OpenAIEmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingApi {
    VertexPredict,
    Gemini,
    OpenAi,
}

impl EmbeddingApi {
    pub fn from_url(api_url: &str) -> Self {
        if api_url.ends_with(":predict") {
            EmbeddingApi::VertexPredict
        } else if api_url.contains("generativelanguage.googleapis.com")
            || api_url.ends_with(":embedContent")
        {
            EmbeddingApi::Gemini
        } else {
            EmbeddingApi::OpenAi
        }
    }
}

/// Generates a vector embedding for `input`.
///
/// `api_key` is sent as a bearer token for Vertex and OpenAI-compatible
/// endpoints, and as `x-goog-api-key` for Gemini.
pub async fn generate_embedding(
    client: &ReqwestClient,
    api_url: &str,
    model: &str,
    input: &str,
    api_key: Option<&str>,
) -> Result<Vec<f32>, PromptError> {
    let api = EmbeddingApi::from_url(api_url);
    let mut request_builder = client.post(api_url);

    request_builder = match api {
        EmbeddingApi::VertexPredict => {
            let body = VertexPredictRequest {
                instances: vec![VertexInstance { content: input }],
            };
            debug!(payload = ?body, "--> Sending request to Vertex AI predict");
            request_builder.json(&body)
        }
        EmbeddingApi::Gemini => {
            let model = if model.starts_with("models/") {
                model.to_string()
            } else {
                format!("models/{model}")
            };
            let body = GeminiEmbeddingRequest {
                model,
                content: GeminiEmbeddingContent {
                    parts: vec![GeminiEmbeddingPart { text: input }],
                },
            };
            debug!(payload = ?body, "--> Sending request to Gemini embedContent");
            request_builder.json(&body)
        }
        EmbeddingApi::OpenAi => {
            let body = OpenAIEmbeddingRequest { model, input };
            debug!(payload = ?body, "--> Sending request to OpenAI-compatible embeddings");
            request_builder.json(&body)
        }
    };

    if let Some(key) = api_key.filter(|k| !k.is_empty()) {
        request_builder = match api {
            EmbeddingApi::Gemini => request_builder.header("x-goog-api-key", key),
            _ => request_builder.bearer_auth(key),
        };
    }

    let response = request_builder
        .send()
        .await
        .map_err(PromptError::AiRequest)?;

    if !response.status().is_success() {
        let error_text = response.text().await.unwrap_or_default();
        return Err(PromptError::AiApi(error_text));
    }

    match api {
        EmbeddingApi::VertexPredict => {
            let parsed: VertexPredictResponse = response
                .json()
                .await
                .map_err(PromptError::AiDeserialization)?;
            parsed
                .predictions
                .into_iter()
                .next()
                .map(|p| p.embeddings.values)
                .ok_or_else(|| PromptError::AiApi("Vertex AI returned no predictions".into()))
        }
        EmbeddingApi::Gemini => {
            let parsed: GeminiEmbeddingResponse = response
                .json()
                .await
                .map_err(PromptError::AiDeserialization)?;
            Ok(parsed.embedding.values)
        }
        EmbeddingApi::OpenAi => {
            let parsed: OpenAIEmbeddingResponse = response
                .json()
                .await
                .map_err(PromptError::AiDeserialization)?;
            parsed
                .data
                .into_iter()
                .next()
                .map(|d| d.embedding)
                .ok_or_else(|| {
                    PromptError::AiApi("OpenAI-compatible API returned no embeddings".into())
                })
        }
    }
}

/// Anything that turns a single text into a vector.
#[async_trait]
pub trait Embedder: Send + Sync + Debug + DynClone {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, PromptError>;
}

dyn_clone::clone_trait_object!(Embedder);

/// An [`Embedder`] backed by [`generate_embedding`].
#[derive(Clone, Debug)]
pub struct EmbeddingClient {
    client: ReqwestClient,
    api_url: String,
    model: String,
    api_key: Option<String>,
}

impl EmbeddingClient {
    pub fn new(
        api_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
    ) -> Result<Self, PromptError> {
        let client = ReqwestClient::builder()
            .build()
            .map_err(PromptError::ReqwestClientBuild)?;
        Ok(Self {
            client,
            api_url: api_url.into(),
            model: model.into(),
            api_key,
        })
    }
}

#[async_trait]
impl Embedder for EmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, PromptError> {
        generate_embedding(
            &self.client,
            &self.api_url,
            &self.model,
            text,
            self.api_key.as_deref(),
        )
        .await
    }
}
