use std::fmt;

use serde::Deserialize;
use serde_json::json;

use crate::error::LlmError;
use crate::provider::{
    EmbeddingProvider, GenerationProvider, GenerationStream, Message, RerankProvider, Usage,
};
use crate::sse::openai_sse_to_stream;

/// Provider speaking the OpenAI-compatible HTTP surface: `/chat/completions`
/// (blocking and SSE-streamed), `/embeddings`, and `/rerank`.
///
/// Works against any backend exposing that surface (DashScope compatible
/// mode, DeepSeek, vLLM, ...).
#[derive(Clone)]
pub struct OpenAiCompatibleProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    embedding_model: String,
    rerank_model: String,
    temperature: f32,
    embed_batch_limit: usize,
}

impl fmt::Debug for OpenAiCompatibleProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiCompatibleProvider")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("embedding_model", &self.embedding_model)
            .field("rerank_model", &self.rerank_model)
            .finish_non_exhaustive()
    }
}

impl OpenAiCompatibleProvider {
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key: api_key.into(),
            model: "qwen-plus".to_owned(),
            embedding_model: "text-embedding-v2".to_owned(),
            rerank_model: "gte-rerank".to_owned(),
            temperature: 0.5,
            embed_batch_limit: 25,
        }
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    #[must_use]
    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }

    #[must_use]
    pub fn with_rerank_model(mut self, model: impl Into<String>) -> Self {
        self.rerank_model = model.into();
        self
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    #[must_use]
    pub fn with_embed_batch_limit(mut self, limit: usize) -> Self {
        self.embed_batch_limit = limit.max(1);
        self
    }

    async fn post(
        &self,
        endpoint: &str,
        body: serde_json::Value,
    ) -> Result<reqwest::Response, LlmError> {
        let response = self
            .client
            .post(format!("{}{endpoint}", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<crate::sse::WireUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankItem>,
}

#[derive(Deserialize)]
struct RerankItem {
    index: usize,
}

impl GenerationProvider for OpenAiCompatibleProvider {
    async fn generate(&self, messages: &[Message]) -> Result<(String, Usage), LlmError> {
        let body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
            "stream": false,
        });
        let parsed: ChatResponse = self.post("/chat/completions", body).await?.json().await?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| LlmError::EmptyResponse {
                provider: self.model.clone(),
            })?;

        let usage = parsed.usage.map_or_else(Usage::default, |u| Usage {
            total_tokens: u.total_tokens,
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        });
        Ok((content, usage))
    }

    async fn generate_stream(&self, messages: &[Message]) -> Result<GenerationStream, LlmError> {
        let body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
            "stream": true,
            "stream_options": {"include_usage": true},
        });
        let response = self.post("/chat/completions", body).await?;
        Ok(openai_sse_to_stream(response))
    }

    fn name(&self) -> &str {
        &self.model
    }
}

impl EmbeddingProvider for OpenAiCompatibleProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = json!({
            "model": self.embedding_model,
            "input": texts,
        });
        let parsed: EmbeddingsResponse = self.post("/embeddings", body).await?.json().await?;

        if parsed.data.len() != texts.len() {
            return Err(LlmError::EmbedCountMismatch {
                expected: texts.len(),
                got: parsed.data.len(),
            });
        }

        // The backend reports an index per item; restore input order.
        let mut vectors: Vec<Vec<f32>> = vec![Vec::new(); texts.len()];
        for item in parsed.data {
            let slot = vectors.get_mut(item.index).ok_or(LlmError::EmbedCountMismatch {
                expected: texts.len(),
                got: item.index + 1,
            })?;
            *slot = item.embedding;
        }
        Ok(vectors)
    }

    fn batch_limit(&self) -> usize {
        self.embed_batch_limit
    }
}

impl RerankProvider for OpenAiCompatibleProvider {
    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
        top_n: usize,
    ) -> Result<Vec<usize>, LlmError> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }
        let body = json!({
            "model": self.rerank_model,
            "query": query,
            "documents": documents,
            "top_n": top_n,
        });
        let parsed: RerankResponse = self.post("/rerank", body).await?.json().await?;
        Ok(parsed.results.into_iter().map(|r| r.index).collect())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn provider(uri: &str) -> OpenAiCompatibleProvider {
        OpenAiCompatibleProvider::new(uri, "test-key")
    }

    #[tokio::test]
    async fn generate_parses_content_and_usage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "answer"}}],
                "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
            })))
            .mount(&server)
            .await;

        let (content, usage) = provider(&server.uri())
            .generate(&[Message::user("q")])
            .await
            .unwrap();
        assert_eq!(content, "answer");
        assert_eq!(usage.total_tokens, 15);
    }

    #[tokio::test]
    async fn generate_empty_content_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": ""}}]
            })))
            .mount(&server)
            .await;

        let result = provider(&server.uri()).generate(&[Message::user("q")]).await;
        assert!(matches!(result, Err(LlmError::EmptyResponse { .. })));
    }

    #[tokio::test]
    async fn generate_maps_api_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let result = provider(&server.uri()).generate(&[Message::user("q")]).await;
        match result {
            Err(LlmError::Api { status, message }) => {
                assert_eq!(status, 429);
                assert_eq!(message, "rate limited");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn embed_batch_restores_input_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {"index": 1, "embedding": [0.2, 0.2]},
                    {"index": 0, "embedding": [0.1, 0.1]}
                ]
            })))
            .mount(&server)
            .await;

        let vectors = provider(&server.uri())
            .embed_batch(&["a".into(), "b".into()])
            .await
            .unwrap();
        assert_eq!(vectors[0], vec![0.1, 0.1]);
        assert_eq!(vectors[1], vec![0.2, 0.2]);
    }

    #[tokio::test]
    async fn embed_batch_count_mismatch_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"index": 0, "embedding": [0.1]}]
            })))
            .mount(&server)
            .await;

        let result = provider(&server.uri())
            .embed_batch(&["a".into(), "b".into()])
            .await;
        assert!(matches!(
            result,
            Err(LlmError::EmbedCountMismatch {
                expected: 2,
                got: 1
            })
        ));
    }

    #[tokio::test]
    async fn embed_batch_empty_input_short_circuits() {
        // No mock mounted: an HTTP call would fail the test.
        let vectors = provider("http://127.0.0.1:1").embed_batch(&[]).await.unwrap();
        assert!(vectors.is_empty());
    }

    #[tokio::test]
    async fn rerank_returns_indices() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rerank"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    {"index": 2, "relevance_score": 0.9},
                    {"index": 0, "relevance_score": 0.4}
                ]
            })))
            .mount(&server)
            .await;

        let indices = provider(&server.uri())
            .rerank("q", &["a".into(), "b".into(), "c".into()], 2)
            .await
            .unwrap();
        assert_eq!(indices, vec![2, 0]);
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let p = OpenAiCompatibleProvider::new("http://host/v1/", "k");
        assert_eq!(p.base_url, "http://host/v1");
    }
}
