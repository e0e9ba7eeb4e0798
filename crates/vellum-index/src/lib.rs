//! Knowledge-base-scoped index store for the vellum pipeline.
//!
//! The [`IndexStore`] trait is the boundary to the vector/keyword engine.
//! Every operation carries its knowledge-base id explicitly; nothing in this
//! crate holds a mutable "current collection" pointer, so concurrent requests
//! against different knowledge bases never interfere.

pub mod error;
mod fusion;
pub mod memory;
pub mod qdrant;
pub mod store;
pub mod tokenize;

pub use error::IndexError;
pub use memory::InMemoryIndex;
pub use qdrant::QdrantIndex;
pub use store::{ChunkRecord, HybridQuery, IndexStore};
pub use tokenize::cjk_unigrams;
