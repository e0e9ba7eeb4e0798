//! Test-only mock collaborators.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::LlmError;
use crate::provider::{
    EmbeddingProvider, GenerationProvider, GenerationStream, Message, RerankProvider, StreamDelta,
    Usage,
};

/// Scripted provider implementing every collaborator trait, with per-call
/// failure toggles so each fallback branch can be exercised deterministically.
#[derive(Debug, Clone)]
pub struct MockProvider {
    responses: Arc<Mutex<Vec<String>>>,
    pub default_response: String,
    /// Embeddings returned for exact input texts; anything else gets a
    /// constant vector of `embedding_dims` values.
    pub embeddings_by_text: HashMap<String, Vec<f32>>,
    pub embedding_dims: usize,
    /// When set, `embed_batch` returns this many vectors regardless of the
    /// input count (to exercise the mismatch fallback).
    pub embed_count_override: Option<usize>,
    /// Permutation handed back by `rerank` (clipped to `top_n`).
    pub rerank_order: Option<Vec<usize>>,
    pub usage: Usage,
    pub fail_generate: bool,
    pub fail_embed: bool,
    pub fail_rerank: bool,
    /// Yield this many text deltas, then fail mid-stream.
    pub fail_stream_after: Option<usize>,
    batch_limit: usize,
    embed_calls: Arc<AtomicUsize>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            responses: Arc::new(Mutex::new(Vec::new())),
            default_response: "mock response".into(),
            embeddings_by_text: HashMap::new(),
            embedding_dims: 4,
            embed_count_override: None,
            rerank_order: None,
            usage: Usage {
                total_tokens: 42,
                input_tokens: 30,
                output_tokens: 12,
            },
            fail_generate: false,
            fail_embed: false,
            fail_rerank: false,
            fail_stream_after: None,
            batch_limit: 25,
            embed_calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl MockProvider {
    #[must_use]
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail_generate: true,
            fail_embed: true,
            fail_rerank: true,
            ..Self::default()
        }
    }

    /// Register the embedding returned for one exact input text.
    #[must_use]
    pub fn with_embedding(mut self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        self.embeddings_by_text.insert(text.into(), vector);
        self
    }

    #[must_use]
    pub fn with_fail_generate(mut self) -> Self {
        self.fail_generate = true;
        self
    }

    #[must_use]
    pub fn with_fail_embed(mut self) -> Self {
        self.fail_embed = true;
        self
    }

    #[must_use]
    pub fn with_fail_rerank(mut self) -> Self {
        self.fail_rerank = true;
        self
    }

    #[must_use]
    pub fn with_fail_stream_after(mut self, deltas: usize) -> Self {
        self.fail_stream_after = Some(deltas);
        self
    }

    #[must_use]
    pub fn with_embed_count_override(mut self, count: usize) -> Self {
        self.embed_count_override = Some(count);
        self
    }

    #[must_use]
    pub fn with_rerank_order(mut self, order: Vec<usize>) -> Self {
        self.rerank_order = Some(order);
        self
    }

    #[must_use]
    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = usage;
        self
    }

    #[must_use]
    pub fn with_batch_limit(mut self, limit: usize) -> Self {
        self.batch_limit = limit.max(1);
        self
    }

    /// How many times `embed_batch` has been called.
    #[must_use]
    pub fn embed_calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }

    fn next_response(&self) -> String {
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            self.default_response.clone()
        } else {
            responses.remove(0)
        }
    }
}

impl GenerationProvider for MockProvider {
    async fn generate(&self, _messages: &[Message]) -> Result<(String, Usage), LlmError> {
        if self.fail_generate {
            return Err(LlmError::Other("mock generation error".into()));
        }
        Ok((self.next_response(), self.usage))
    }

    async fn generate_stream(&self, _messages: &[Message]) -> Result<GenerationStream, LlmError> {
        if self.fail_generate {
            return Err(LlmError::Other("mock generation error".into()));
        }
        let response = self.next_response();
        let mut items: Vec<Result<StreamDelta, LlmError>> = response
            .chars()
            .map(|c| Ok(StreamDelta::Text(c.to_string())))
            .collect();
        if let Some(after) = self.fail_stream_after {
            items.truncate(after);
            items.push(Err(LlmError::Other("mock mid-stream error".into())));
        } else {
            items.push(Ok(StreamDelta::Usage(self.usage)));
        }
        Ok(Box::pin(tokio_stream::iter(items)))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

impl EmbeddingProvider for MockProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_embed {
            return Err(LlmError::Other("mock embedding error".into()));
        }
        if let Some(count) = self.embed_count_override {
            return Ok(vec![vec![0.0; self.embedding_dims]; count]);
        }
        Ok(texts
            .iter()
            .map(|t| {
                self.embeddings_by_text
                    .get(t)
                    .cloned()
                    .unwrap_or_else(|| vec![0.1; self.embedding_dims])
            })
            .collect())
    }

    fn batch_limit(&self) -> usize {
        self.batch_limit
    }
}

impl RerankProvider for MockProvider {
    async fn rerank(
        &self,
        _query: &str,
        documents: &[String],
        top_n: usize,
    ) -> Result<Vec<usize>, LlmError> {
        if self.fail_rerank {
            return Err(LlmError::Other("mock rerank error".into()));
        }
        match &self.rerank_order {
            Some(order) => Ok(order
                .iter()
                .copied()
                .filter(|&i| i < documents.len())
                .take(top_n)
                .collect()),
            None => Ok((0..documents.len().min(top_n)).collect()),
        }
    }
}
