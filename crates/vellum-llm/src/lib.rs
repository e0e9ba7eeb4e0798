//! Collaborator abstractions for the model calls the retrieval pipeline
//! consumes: batched embeddings, document reranking, and (streamed) answer
//! generation, plus an OpenAI-compatible HTTP backend.

pub mod compatible;
pub mod error;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod provider;
mod sse;

pub use compatible::OpenAiCompatibleProvider;
pub use error::LlmError;
pub use provider::{
    EmbeddingProvider, GenerationProvider, GenerationStream, Message, RerankProvider, Role,
    StreamDelta, Usage,
};
