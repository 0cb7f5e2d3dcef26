//! Embedding and chat-completion providers
//!
//! The OpenAI implementation speaks the `/embeddings` and
//! `/chat/completions` endpoints, so any compatible server can be used by
//! pointing the base URL at it.

use crate::coach::{CoachError, CoachResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_TEMPERATURE: f32 = 0.1;

/// Inputs per embeddings request
const EMBEDDING_BATCH: usize = 64;

const PROVIDER: &str = "openai";

/// Turns text into vectors
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed one text
    async fn embed(&self, text: &str) -> CoachResult<Vec<f32>>;

    /// Embed several texts, preserving order
    async fn embed_batch(&self, texts: &[&str]) -> CoachResult<Vec<Vec<f32>>>;

    /// Model identifier stored alongside built indexes
    fn model_id(&self) -> &str;
}

/// Completes a single-prompt conversation
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> CoachResult<String>;

    fn model_id(&self) -> &str;
}

#[derive(Debug, Clone, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Debug, Clone, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Clone, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    temperature: f32,
}

#[derive(Debug, Clone, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Clone, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiError {
    error: ErrorDetail,
}

#[derive(Debug, Clone, Deserialize)]
struct ErrorDetail {
    message: String,
}

fn invalid_response(message: impl Into<String>) -> CoachError {
    CoachError::InvalidResponse {
        provider: PROVIDER.to_string(),
        message: message.into(),
    }
}

/// HTTP client for an OpenAI-compatible API
#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAiClient {
    /// Create a client; the base URL must include the version path
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> CoachResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CoachError::Unavailable(format!("HTTP client: {}", e)))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// POST a JSON body and decode the JSON reply
    pub async fn request<Req: Serialize + Sync, Res: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &Req,
    ) -> CoachResult<Res> {
        let url = format!("{}/{}", self.base_url, endpoint);
        debug!("POST {}", url);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(body)
            .send()
            .await
            .map_err(|e| CoachError::RequestFailed {
                provider: PROVIDER.to_string(),
                status: 0,
                message: format!("HTTP request failed: {}", e),
            })?;

        let status = response.status();
        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| invalid_response(format!("Failed to parse response: {}", e)));
        }

        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        let message = match serde_json::from_str::<ApiError>(&text) {
            Ok(api_error) => api_error.error.message,
            Err(_) => text,
        };
        Err(CoachError::RequestFailed {
            provider: PROVIDER.to_string(),
            status: status.as_u16(),
            message,
        })
    }
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

/// Embeddings through `/embeddings`
#[derive(Debug, Clone)]
pub struct OpenAiEmbeddings {
    client: OpenAiClient,
    model: String,
}

impl OpenAiEmbeddings {
    pub fn new(client: OpenAiClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddings {
    async fn embed(&self, text: &str) -> CoachResult<Vec<f32>> {
        self.embed_batch(&[text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| invalid_response("No embedding data in response"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> CoachResult<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(EMBEDDING_BATCH) {
            let request = EmbeddingRequest {
                model: &self.model,
                input: batch.to_vec(),
            };
            let mut response: EmbeddingResponse = self.client.request("embeddings", &request).await?;
            if response.data.len() != batch.len() {
                return Err(invalid_response(format!(
                    "Expected {} embeddings but got {}",
                    batch.len(),
                    response.data.len()
                )));
            }
            response.data.sort_by_key(|d| d.index);
            embeddings.extend(response.data.into_iter().map(|d| d.embedding));
        }
        Ok(embeddings)
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

/// Chat model through `/chat/completions`
#[derive(Debug, Clone)]
pub struct OpenAiChat {
    client: OpenAiClient,
    model: String,
    temperature: f32,
}

impl OpenAiChat {
    pub fn new(client: OpenAiClient, model: impl Into<String>, temperature: f32) -> Self {
        Self {
            client,
            model: model.into(),
            temperature,
        }
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    async fn complete(&self, prompt: &str) -> CoachResult<String> {
        let request = CompletionRequest {
            model: &self.model,
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature: self.temperature,
        };
        let response: CompletionResponse =
            self.client.request("chat/completions", &request).await?;
        response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .ok_or_else(|| invalid_response("No choices in response"))
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Deterministic bag-of-keywords embeddings
    pub(crate) struct KeywordEmbeddings {
        pub keywords: Vec<&'static str>,
    }

    impl KeywordEmbeddings {
        pub(crate) fn health() -> Self {
            Self {
                keywords: vec!["salt", "sodium", "exercise", "walk", "sleep", "stress", "smok"],
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for KeywordEmbeddings {
        async fn embed(&self, text: &str) -> CoachResult<Vec<f32>> {
            let lower = text.to_lowercase();
            let mut v: Vec<f32> = self
                .keywords
                .iter()
                .map(|k| lower.matches(k).count() as f32)
                .collect();
            // constant component keeps the vector non-zero
            v.push(0.1);
            Ok(v)
        }

        async fn embed_batch(&self, texts: &[&str]) -> CoachResult<Vec<Vec<f32>>> {
            let mut out = Vec::new();
            for text in texts {
                out.push(self.embed(text).await?);
            }
            Ok(out)
        }

        fn model_id(&self) -> &str {
            "keyword-test"
        }
    }

    /// Chat model that records prompts and returns a canned reply
    pub(crate) struct EchoChat {
        pub reply: Result<String, CoachError>,
        pub prompts: Mutex<Vec<String>>,
    }

    impl EchoChat {
        pub(crate) fn replying(reply: &str) -> Self {
            Self {
                reply: Ok(reply.to_string()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn failing(error: CoachError) -> Self {
            Self {
                reply: Err(error),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn last_prompt(&self) -> Option<String> {
            self.prompts.lock().unwrap().last().cloned()
        }
    }

    #[async_trait]
    impl ChatModel for EchoChat {
        async fn complete(&self, prompt: &str) -> CoachResult<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.reply.clone()
        }

        fn model_id(&self) -> &str {
            "echo-test"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    /// Minimal stand-in for the hosted API on a random local port
    async fn spawn_api() -> String {
        async fn embeddings(Json(body): Json<Value>) -> Json<Value> {
            let inputs = body["input"].as_array().cloned().unwrap_or_default();
            // reply out of order to exercise index sorting
            let data: Vec<Value> = inputs
                .iter()
                .enumerate()
                .rev()
                .map(|(i, text)| {
                    let len = text.as_str().unwrap_or("").len() as f32;
                    json!({"index": i, "embedding": [len, 1.0]})
                })
                .collect();
            Json(json!({"data": data, "usage": {"prompt_tokens": 1, "total_tokens": 1}}))
        }

        async fn completions(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
            if body["model"] == "broken" {
                return (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({"error": {"message": "Incorrect API key", "type": "auth"}})),
                );
            }
            let prompt = body["messages"][0]["content"].as_str().unwrap_or("");
            (
                StatusCode::OK,
                Json(json!({"choices": [{"message": {"role": "assistant",
                    "content": format!(" echo: {} ", prompt)}, "finish_reason": "stop"}]})),
            )
        }

        let app = Router::new()
            .route("/v1/embeddings", post(embeddings))
            .route("/v1/chat/completions", post(completions));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/v1/", addr)
    }

    fn client(base_url: &str) -> OpenAiClient {
        OpenAiClient::new("test-key", base_url, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_embeddings_keep_input_order() {
        let base = spawn_api().await;
        let provider = OpenAiEmbeddings::new(client(&base), DEFAULT_EMBEDDING_MODEL);

        let vectors = provider.embed_batch(&["a", "abc", "ab"]).await.unwrap();
        assert_eq!(vectors, vec![vec![1.0, 1.0], vec![3.0, 1.0], vec![2.0, 1.0]]);
        assert_eq!(provider.embed("abcd").await.unwrap(), vec![4.0, 1.0]);
    }

    #[tokio::test]
    async fn test_chat_completion() {
        let base = spawn_api().await;
        let chat = OpenAiChat::new(client(&base), DEFAULT_CHAT_MODEL, DEFAULT_TEMPERATURE);
        assert_eq!(chat.complete("hi").await.unwrap(), "echo: hi");
    }

    #[tokio::test]
    async fn test_api_error_message_surfaces() {
        let base = spawn_api().await;
        let chat = OpenAiChat::new(client(&base), "broken", 0.0);
        match chat.complete("hi").await {
            Err(CoachError::RequestFailed { status, message, .. }) => {
                assert_eq!(status, 401);
                assert_eq!(message, "Incorrect API key");
            }
            other => panic!("expected request failure, got {:?}", other),
        }
    }

    #[test]
    fn test_debug_redacts_key() {
        let text = format!("{:?}", client("http://localhost/v1"));
        assert!(!text.contains("test-key"));
    }
}
