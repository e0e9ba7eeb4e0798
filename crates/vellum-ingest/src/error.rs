use vellum_index::IndexError;
use vellum_llm::LlmError;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("embedding failed: {0}")]
    Embed(#[from] LlmError),

    #[error("index store failed: {0}")]
    Index(#[from] IndexError),

    #[error("ingestion queue is closed")]
    QueueClosed,
}
