//! Ingest path of the vellum pipeline: cleaning extracted text, splitting it
//! into semantically coherent fragments, writing the parent/child record set
//! to the index store, and running file ingestion as retried background work.

pub mod chunker;
pub mod error;
pub mod executor;
pub mod normalize;
pub mod task;
pub mod writer;

pub use chunker::{ChunkMode, Chunker};
pub use error::IngestError;
pub use executor::{IngestionExecutor, IngestionJob};
pub use normalize::normalize;
pub use task::TaskRegistry;
pub use writer::IndexWriter;
