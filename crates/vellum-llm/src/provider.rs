use std::future::Future;
use std::pin::Pin;

use futures_core::Stream;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Token accounting reported by a generation call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub total_tokens: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// One item of a generation stream: either an incremental text fragment in
/// generation order, or the final token accounting.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamDelta {
    Text(String),
    Usage(Usage),
}

pub type GenerationStream = Pin<Box<dyn Stream<Item = Result<StreamDelta, LlmError>> + Send>>;

/// Batched text embedding. One vector per input, same order; the whole batch
/// fails together.
pub trait EmbeddingProvider: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the provider call fails or returns a vector count
    /// different from the input count.
    fn embed_batch(
        &self,
        texts: &[String],
    ) -> impl Future<Output = Result<Vec<Vec<f32>>, LlmError>> + Send;

    /// Maximum items accepted per call.
    fn batch_limit(&self) -> usize;
}

/// Secondary relevance model reordering a candidate set.
pub trait RerankProvider: Send + Sync {
    /// Returns indices into `documents`, most relevant first, at most
    /// `top_n` of them.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider call fails.
    fn rerank(
        &self,
        query: &str,
        documents: &[String],
        top_n: usize,
    ) -> impl Future<Output = Result<Vec<usize>, LlmError>> + Send;
}

/// Answer generation, blocking or streamed.
pub trait GenerationProvider: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the provider fails or the response is invalid.
    fn generate(
        &self,
        messages: &[Message],
    ) -> impl Future<Output = Result<(String, Usage), LlmError>> + Send;

    /// # Errors
    ///
    /// Returns an error if the stream cannot be established. Errors after
    /// that point surface as items of the stream itself.
    fn generate_stream(
        &self,
        messages: &[Message],
    ) -> impl Future<Output = Result<GenerationStream, LlmError>> + Send;

    fn name(&self) -> &str;
}
