use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use vellum_core::types::{Chunk, ChunkId, KbId, RetrievalHit};

use crate::error::IndexError;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One chunk plus its dense embedding, ready for storage.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// A hybrid search request against one knowledge base.
#[derive(Debug, Clone)]
pub struct HybridQuery {
    /// Query text for the keyword leg, already unigram-spaced for CJK.
    pub keyword_text: String,
    /// Dense query embedding; `None` when `alpha` is 0 and the embedding
    /// call was skipped.
    pub vector: Option<Vec<f32>>,
    /// Blending weight: 0 = keyword only, 1 = vector only.
    pub alpha: f32,
    pub limit: usize,
}

/// The index-store collaborator boundary.
///
/// Implementations blend keyword and vector scores per query; chunks,
/// scores, and metadata round-trip through here but the engine internals
/// (ANN structures, tokenizer, scoring primitives) stay on the other side.
///
/// Every method takes the knowledge-base id it operates on. Implementations
/// must not keep a mutable "current knowledge base"; two concurrent calls
/// scoped to different ids must not observe each other.
pub trait IndexStore: Send + Sync {
    /// Create the knowledge base if it does not exist. Idempotent.
    fn ensure_kb(&self, kb: &KbId) -> BoxFuture<'_, Result<(), IndexError>>;

    /// Drop a knowledge base and every chunk in it.
    fn delete_kb(&self, kb: &KbId) -> BoxFuture<'_, Result<(), IndexError>>;

    fn list_kbs(&self) -> BoxFuture<'_, Result<Vec<KbId>, IndexError>>;

    fn upsert_batch(
        &self,
        kb: &KbId,
        records: Vec<ChunkRecord>,
    ) -> BoxFuture<'_, Result<(), IndexError>>;

    /// Ranked hits under blended keyword+vector scoring weighted by
    /// `query.alpha`.
    fn hybrid_query(
        &self,
        kb: &KbId,
        query: HybridQuery,
    ) -> BoxFuture<'_, Result<Vec<RetrievalHit>, IndexError>>;

    fn fetch_by_id(
        &self,
        kb: &KbId,
        id: ChunkId,
    ) -> BoxFuture<'_, Result<Option<Chunk>, IndexError>>;

    /// Remove every chunk of one source file; returns how many went away.
    fn delete_where_source(
        &self,
        kb: &KbId,
        source_file: &str,
    ) -> BoxFuture<'_, Result<u64, IndexError>>;

    /// Chunk counts grouped by source file, sorted by filename.
    fn aggregate_count_by_source(
        &self,
        kb: &KbId,
    ) -> BoxFuture<'_, Result<BTreeMap<String, u64>, IndexError>>;

    /// Replace the tag set on every chunk of one source file; returns how
    /// many chunks were touched.
    fn update_tags(
        &self,
        kb: &KbId,
        source_file: &str,
        tags: Vec<String>,
    ) -> BoxFuture<'_, Result<u64, IndexError>>;
}

impl ChunkRecord {
    /// Hit view of a stored chunk, used by store implementations when
    /// mapping scored points back out.
    #[must_use]
    pub fn to_hit(chunk: &Chunk, score: f32) -> RetrievalHit {
        RetrievalHit {
            text: chunk.text.clone(),
            score,
            source_file: chunk.source_file.clone(),
            file_type: chunk.file_type.clone(),
            page: chunk.page,
            parent_id: chunk.parent_id,
            image_ref: chunk.image_ref.clone(),
        }
    }
}
