//! Shared data model and configuration for the vellum retrieval pipeline.

pub mod config;
pub mod types;

pub use config::VellumConfig;
pub use types::{
    Chunk, ChunkId, Citation, ConversationTurn, IngestionTask, KbId, RetrievalHit, Role,
    SourceBlock, TaskId, TaskState,
};
